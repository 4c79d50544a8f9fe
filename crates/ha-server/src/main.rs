//! Household apps server
//!
//! Loads `apps.yaml`, builds the in-process host and runs the apps until
//! Ctrl-C. The config directory is the first argument, `HA_CONFIG_DIR`, or
//! `./config`.

mod host;
mod runtime;

use anyhow::{Context as _, Result};
use ha_config::AppsConfig;
use ha_scheduler::Scheduler;
use host::Host;
use runtime::AppRuntime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HA_CONFIG_DIR").ok())
        .unwrap_or_else(|| "config".to_string());

    info!("Starting household apps");
    let config = AppsConfig::load(&config_dir)
        .with_context(|| format!("failed to load apps configuration from {config_dir}"))?;

    let host = Host::new();
    host.seed_entities(&config);
    host.register_services(&config);

    let (scheduler, timers) = Scheduler::new();
    let runtime = AppRuntime::new(&config, &host, scheduler, timers);

    runtime
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Household apps stopped");
    Ok(())
}
