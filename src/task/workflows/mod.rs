//! Multi-step stateful workflows over the PHD2 façade (§4.8): each is a
//! [`crate::task::Task`] whose body drives its own sub-state-machine instead
//! of wrapping a single RPC.

mod auto_config;
mod diagnostics;
mod guide_setup;
mod guided_exposure;
mod guided_session;
mod meridian_flip;

pub use auto_config::AutoGuideConfig;
pub use diagnostics::Phd2HealthCheck;
pub use guide_setup::CompleteGuideSetup;
pub use guided_exposure::{GuidedExposure, GuidedSequence};
pub use guided_session::GuidedSession;
pub use meridian_flip::MeridianFlipWorkflow;

use crate::phd2::{AppState, Client};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::task::TaskContext;
use std::time::Duration;

/// Polls `AppState` every 500 ms until `predicate` accepts it or `timeout`
/// elapses (§4.8.1 "wait up to N s for AppState == ...").
pub(super) async fn wait_for_state(
    client: &Client,
    predicate: impl Fn(AppState) -> bool,
    timeout: Duration,
) -> Result<AppState, TaskError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let state = client.get_app_state().await?;
        if predicate(state) {
            return Ok(state);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(TaskError::new(
                TaskErrorKind::TimeoutError,
                format!("timed out waiting for app state, last observed {state:?}"),
            ));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Runs `attempt` up to `retry_count` times, sleeping `backoff` between
/// failures, naming `state_name` in the final failure's message (§4.8.1
/// "on final attempt failure the workflow fails ... naming the state").
pub(super) async fn retry_state<T, F, Fut>(
    ctx: &TaskContext<'_>,
    state_name: &str,
    retry_count: u32,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TaskError>>,
{
    let mut last_error = None;
    for try_index in 1..=retry_count.max(1) {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                ctx.log(format!(
                    "{state_name}: attempt {try_index}/{retry_count} failed: {error}"
                ))
                .await;
                last_error = Some(error);
                if try_index < retry_count {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(TaskError::new(
        TaskErrorKind::DeviceError,
        format!(
            "{state_name}: exhausted {retry_count} attempts: {}",
            last_error.map_or_else(|| "unknown error".to_owned(), |error| error.to_string())
        ),
    ))
}

/// Converts a task-parameter duration/count to `f64` without an `as` cast,
/// saturating instead of wrapping if ever handed something outside
/// `u32`'s range (every caller's value is already schema-bounded well
/// under it, e.g. `settle_time`/`calibration_timeout` in seconds).
pub(super) fn u64_as_f64(value: u64) -> f64 {
    u32::try_from(value).map_or(f64::from(u32::MAX), f64::from)
}

/// As [`u64_as_f64`], for small in-process counts such as health-check
/// probe totals.
pub(super) fn usize_as_f64(value: usize) -> f64 {
    u32::try_from(value).map_or(f64::from(u32::MAX), f64::from)
}

/// As [`u64_as_f64`], for signed quantities (e.g. exposure milliseconds)
/// that are never negative in practice but are typed `i64` by the PHD2
/// façade.
pub(super) fn i64_as_f64(value: i64) -> f64 {
    u32::try_from(value).map_or_else(|_| if value < 0 { 0.0 } else { f64::from(u32::MAX) }, f64::from)
}
