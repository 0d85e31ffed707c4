use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{error::SweepError, sweep::Sweeper};

/// What the periodic loop does when a full sweep fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Return the error and stop ticking. A supervisor restarts the process.
    #[default]
    Stop,
    /// Log the error and wait for the next tick.
    Continue,
}

/// Run a full sweep every `period` until `cancel` fires. The first sweep
/// happens one period after start.
pub async fn run_periodic(
    sweeper: Arc<Sweeper>,
    period: Duration,
    on_error: FailurePolicy,
    cancel: CancellationToken,
) -> Result<(), SweepError> {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("stopping periodic cleanup");
                return Ok(());
            }
            _ = interval.tick() => {
                info!("running periodic orphaned volume cleanup");
                match sweeper.run_full_sweep(&cancel).await {
                    Ok(_) => {}
                    Err(SweepError::Cancelled) => {
                        info!("stopping periodic cleanup");
                        return Ok(());
                    }
                    Err(err) => match on_error {
                        FailurePolicy::Stop => return Err(err),
                        FailurePolicy::Continue => {
                            warn!(%err, "periodic cleanup failed, retrying on next tick");
                        }
                    },
                }
            }
        }
    }
}

/// Spawn [`run_periodic`] and log its failure.
pub fn spawn_periodic(
    sweeper: Arc<Sweeper>,
    period: Duration,
    on_error: FailurePolicy,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = run_periodic(sweeper, period, on_error, cancel).await {
            error!(%err, "periodic cleanup stopped");
        }
    })
}
