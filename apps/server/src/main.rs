mod config;
mod main_lib;
mod scheduler;

use config::Config;
use main_lib::{build_context, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    let context = build_context(&config).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };
    scheduler::run_sync_scheduler(context.clone(), config.sync_interval, shutdown).await;

    context.shutdown();
    Ok(())
}
