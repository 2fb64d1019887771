//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::routing::{IntentCategory, TradeIntent};
use crate::runtime::{Sentinel, SystemClock};
use crate::venue::TradingMode;

fn build(config: &Config) -> Result<Sentinel> {
    Sentinel::build(config.clone(), Arc::new(SystemClock)).context("Failed to assemble components")
}

/// Run the scheduler until Ctrl-C, or a fixed number of sequential cycles
pub async fn run(config: &Config, cycles: Option<u32>) -> Result<()> {
    let sentinel = build(config)?;

    let reconciled = sentinel.dispatcher.reconcile().await;
    if !reconciled.orders.is_empty() {
        info!(open_orders = reconciled.orders.len(), "Resuming with open orders");
    }

    if let Some(cycles) = cycles {
        for cycle in 1..=cycles {
            let summary = sentinel.run_cycle().await;
            println!(
                "cycle {}: composite={} signals={} new_opportunities={} decisions={} executions={}",
                cycle,
                summary
                    .risk
                    .as_ref()
                    .map(|m| format!("{:.1}", m.composite))
                    .unwrap_or_else(|| "n/a".to_string()),
                summary.signals,
                summary.opportunities_added,
                summary.decisions.len(),
                summary.executions.len(),
            );
            for report in &summary.executions {
                println!("  {} -> {} ({}): {:?}", report.decision_id, report.venue, report.mode, report.status);
            }
        }
        return Ok(());
    }

    let scheduler = Arc::new(sentinel.scheduler());
    let handle = scheduler.start(std::time::Duration::from_millis(config.schedule.tick_ms));
    info!("Running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    scheduler.stop();
    if let Err(e) = handle.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }
    Ok(())
}

/// Guardrail flags, routing table and latest risk state
pub async fn status(config: &Config) -> Result<()> {
    let sentinel = build(config)?;
    let status = sentinel.router.status();

    println!("\n=== GUARDRAIL ===\n");
    println!("Kill switch:          {}", status.flags.kill_switch);
    println!("Allow live exchange:  {}", status.flags.allow_live_exchange);
    println!("Allow DeFi actions:   {}", status.flags.allow_defi_actions);
    println!("Requested mode:       {}", config.execution.requested_mode);

    println!("\n=== ROUTING ===\n");
    for (category, venue) in &status.default_venues {
        println!("  {:<10} -> {}", category.as_str(), venue);
    }
    for (family, venue) in &status.wallet_rails {
        println!("  {:<10} -> {} (wallet rail)", family.as_str(), venue);
    }
    if status.registered_venues.is_empty() {
        println!("  No real adapters registered; every route is simulated.");
    }
    for (venue, mode) in &status.registered_venues {
        println!("  registered: {} ({})", venue, mode);
    }

    println!("\n=== RISK ===\n");
    match sentinel.risk.assess().await {
        Ok(metrics) => {
            println!("Portfolio value:  {:.2}", metrics.portfolio_value);
            println!("Composite score:  {:.1}", metrics.composite);
            println!("VaR ({:.0}%):        {:.2}%", config.risk.metrics.var_confidence * 100.0, metrics.var_pct * 100.0);
            println!("Max drawdown:     {:.2}%", metrics.max_drawdown * 100.0);
        }
        Err(e) => {
            println!("Assessment failed: {}", e);
            println!("Stale cycles:     {}", sentinel.risk.stale_cycles().await);
        }
    }
    for protection in sentinel.risk.protection_status().await {
        println!("  protection {:?}: {:?}", protection.kind, protection.state);
    }

    Ok(())
}

/// Resolve one intent and show where it would go
pub fn resolve(config: &Config, intent: &str, chain: Option<&str>, mode: &str) -> Result<()> {
    let sentinel = build(config)?;
    let requested: TradingMode = mode.parse().context("Invalid mode")?;
    let route = sentinel.router.resolve_named(intent, chain, requested);

    println!("Intent:     {}", intent);
    if let Some(chain) = chain {
        println!("Chain:      {}", chain);
    }
    println!("Requested:  {}", requested);
    println!("Venue:      {}", route.venue);
    println!("Mode:       {}", route.mode);
    if let Some(reason) = &route.degraded {
        println!("Degraded:   {}", reason);
    }
    Ok(())
}

/// Run one risk assessment and print the full snapshot as JSON
pub async fn assess(config: &Config) -> Result<()> {
    let sentinel = build(config)?;
    let metrics = sentinel.risk.assess().await.context("Risk assessment failed")?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    let breached: Vec<_> = sentinel.risk.limits().await.into_iter().filter(|l| l.breached()).collect();
    if !breached.is_empty() {
        println!("\nBreached limits:");
        for limit in breached {
            println!("  {}", serde_json::to_string(&limit)?);
        }
    }
    for alert in sentinel.risk.active_alerts().await {
        println!("Alert [{}] {}", alert.severity, alert.message);
    }
    Ok(())
}

/// Probe every default venue
pub async fn health(config: &Config) -> Result<()> {
    let sentinel = build(config)?;
    println!("\n=== VENUE HEALTH ===\n");

    let mut all_healthy = true;
    for category in IntentCategory::CENTRALIZED {
        let route = sentinel.router.resolve(&TradeIntent::new(category), config.execution.requested_mode);
        let health = route.adapter.health().await;
        all_healthy &= health.alive;
        println!(
            "{:<10} {:<14} {:<10} {} ({}ms)",
            category.as_str(),
            route.venue,
            health.mode,
            if health.alive { "OK" } else { "DOWN" },
            health.latency_ms
        );
    }

    if !all_healthy {
        anyhow::bail!("One or more venues are unhealthy");
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.summary());
    Ok(())
}
