//! Fixed-interval driver for ingestion cycles.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Run `cycle` immediately and then once per `interval` tick until
/// `shutdown` resolves.
///
/// - A failing cycle is logged and the loop carries on with the next tick.
/// - Cycles never overlap: the next one starts only after the previous one
///   returned.
/// - Ticks missed while a cycle overran collapse into one immediate tick;
///   after that the regular cadence resumes. Ticks never pile up.
/// - `shutdown` is only observed between cycles; a cycle in flight is not
///   interrupted.
///
/// Returns the number of cycles that ran.
pub async fn run<F, Fut, T, E>(
    interval: Duration,
    shutdown: impl Future<Output = ()>,
    mut cycle: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: std::fmt::Debug,
    E: Display,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!(cycles, "Scheduler stopping");
                break;
            }

            _ = ticker.tick() => {
                cycles += 1;
                match cycle().await {
                    Ok(outcome) => tracing::debug!(cycle = cycles, ?outcome, "Cycle finished"),
                    Err(e) => tracing::warn!(cycle = cycles, error = %e, "Cycle failed, continuing"),
                }
            }
        }
    }

    cycles
}
