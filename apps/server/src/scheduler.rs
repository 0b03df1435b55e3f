//! Background scheduler for periodic stock synchronization.
//!
//! Fires the sweep on a fixed interval until the shutdown future resolves.
//! The daily budget inside the orchestrator decides how much work a sweep
//! actually does.

use std::future::Future;
use std::sync::Arc;

use rottenstocks_core::sync::SweepStatus;
use rottenstocks_core::ServiceContext;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs sweeps every `period` until `shutdown` completes.
///
/// The first sweep runs immediately. A sweep in progress is allowed to
/// finish before shutdown is observed.
pub async fn run_sync_scheduler<F>(context: Arc<ServiceContext>, period: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    info!(
        "Sync scheduler started ({} minute interval)",
        period.as_secs() / 60
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Sync scheduler stopping");
                break;
            }
            _ = ticker.tick() => run_scheduled_sync(&context).await,
        }
    }
}

/// Runs a single scheduled sweep and logs its outcome.
async fn run_scheduled_sync(context: &ServiceContext) {
    debug!("Running scheduled sync sweep...");
    let result = context.run_synchronization_sweep().await;

    match result.status {
        SweepStatus::Completed => info!("Scheduled sync completed: {}", result.summary()),
        SweepStatus::SkippedBudget | SweepStatus::AlreadyRunning => {
            info!(
                "Scheduled sync skipped: {}",
                result.skipped_reason.as_deref().unwrap_or("no reason given")
            );
        }
        SweepStatus::PartialFailure | SweepStatus::Failed => {
            warn!("Scheduled sync finished with errors: {}", result.summary());
            for error in &result.errors {
                warn!("  {}: {}", error.symbol, error.message);
            }
        }
    }

    if let Ok(json) = serde_json::to_string(&result) {
        debug!("Sweep result: {}", json);
    }

    let usage = context.usage_snapshot();
    let circuit = context.circuit_state();
    debug!(
        "Provider {}: {}/{} requests in window, circuit {:?}",
        context.provider_id(),
        usage.count,
        usage.max,
        circuit.state
    );
}
