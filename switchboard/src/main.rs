//! Operator entry point
//!
//! Boots the switchboard from environment configuration, runs periodic
//! health sweeps, and logs per-provider analytics so an operator can watch
//! selection and failover decisions without the web tier.

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::signal;

use switchboard::{Switchboard, SwitchboardConfig, TransactionLedger};

/// Provider orchestration for external service integrations
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Selects, monitors, and fails over external service providers")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Seconds between health sweeps
    #[arg(long, default_value = "300")]
    pub health_interval: u64,

    /// Analytics window in days for the periodic summary
    #[arg(long, default_value = "7")]
    pub window_days: i64,

    /// Run a single health sweep and summary, then exit
    #[arg(long)]
    pub once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    shared::logging::init_tracing(Some(&args.log_level));

    let config = SwitchboardConfig::from_env().context("loading provider configuration")?;
    if config.providers.is_empty() {
        tracing::warn!("no providers configured; set at least one credential (e.g. SENDGRID_API_KEY)");
    }

    let switchboard = Switchboard::from_config(config)
        .await
        .context("building switchboard")?;

    if args.once {
        switchboard.check_health().await;
        log_summary(&switchboard, args.window_days).await;
        return Ok(());
    }

    let mut sweep = tokio::time::interval(Duration::from_secs(args.health_interval));
    loop {
        tokio::select! {
            _ = sweep.tick() => {
                switchboard.check_health().await;
                log_summary(&switchboard, args.window_days).await;
            }
            _ = signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn log_summary(switchboard: &Switchboard, window_days: i64) {
    for capability in switchboard.capabilities() {
        let Some(registry) = switchboard.registry(capability) else {
            continue;
        };

        let active = registry
            .active_provider_name()
            .await
            .map(|name| name.to_string())
            .unwrap_or_else(|| "none".to_string());
        tracing::info!(capability = %capability, active = %active, "category status");

        for view in registry.provider_health().await {
            let analytics = switchboard
                .ledger()
                .provider_analytics(&view.name, window_days)
                .await;
            tracing::info!(
                provider = %view.name,
                priority = view.priority,
                status = %view.status,
                requests = analytics.total_requests,
                success_rate = %format!("{:.2}", analytics.success_rate),
                avg_response_ms = %format!("{:.0}", analytics.average_response_time_ms),
                cost_cents = analytics.total_cost_cents,
                failovers = analytics.failover_count,
                uptime = %format!("{:.2}", analytics.health_uptime),
                "provider summary"
            );
        }
    }
}
