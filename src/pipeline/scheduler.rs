//! Coalesces bursts of mutation signals into debounced passes and runs a
//! periodic fallback pass to recover from missed observations.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Notify,
    time::{Instant, Interval, MissedTickBehavior, interval, sleep},
};

use crate::infrastructure::shutdown::ShutdownListener;

use super::Pipeline;

pub(crate) async fn run(
    pipeline: Pipeline,
    signal: Arc<Notify>,
    quiet_interval: Duration,
    fallback_interval: Duration,
    shutdown: ShutdownListener,
) {
    let mut outer_shutdown = shutdown.clone();
    let mut quiet_shutdown = shutdown;
    // The first tick completes immediately, which doubles as the initial
    // pass after startup.
    let mut fallback = interval(fallback_interval);
    fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = signal.notified() => {
                if !wait_for_quiet(
                    &pipeline,
                    &signal,
                    quiet_interval,
                    &mut fallback,
                    &mut quiet_shutdown,
                )
                .await
                {
                    break;
                }
                pipeline.run_pass();
            }
            _ = fallback.tick() => {
                pipeline.run_pass();
            }
            _ = outer_shutdown.notified() => break,
        }
    }
    tracing::info!(target: "scheduler", "scheduler stopped");
}

/// Trailing-edge debounce: restarts the quiet timer on every further signal
/// and returns once a full quiet interval passes without one. The fallback
/// cadence keeps ticking while the wait lasts, so a sustained signal storm
/// still gets its periodic passes. Returns false on shutdown.
async fn wait_for_quiet(
    pipeline: &Pipeline,
    signal: &Notify,
    quiet_interval: Duration,
    fallback: &mut Interval,
    shutdown: &mut ShutdownListener,
) -> bool {
    let quiet = sleep(quiet_interval);
    tokio::pin!(quiet);
    loop {
        tokio::select! {
            _ = &mut quiet => return true,
            _ = signal.notified() => {
                quiet.as_mut().reset(Instant::now() + quiet_interval);
            }
            _ = fallback.tick() => pipeline.run_pass(),
            _ = shutdown.notified() => return false,
        }
    }
}
