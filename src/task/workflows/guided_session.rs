//! `GuidedSession` (§4.8.3): monitors `AppState` on a fixed interval for a
//! bounded or unlimited duration, with bounded lost-lock auto-recovery.

use crate::phd2::{AppState, Client, SettleParameters};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct GuidedSession {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuidedSession {
    fn name(&self) -> &str {
        "guided_session"
    }

    fn type_tag(&self) -> &str {
        "workflow"
    }

    fn timeout(&self) -> Duration {
        // Unbounded sessions (duration_minutes = 0) still need a ceiling on
        // the task's own ceiling; 24h comfortably covers any real session
        // and the loop itself still exits on `duration_minutes` or a fatal
        // error well before then.
        Duration::from_secs(24 * 60 * 60)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("duration_minutes", ParamType::Integer)
                .default(0)
                .bounds(0.0, 10_080.0),
            ParameterSchema::new("monitor_interval", ParamType::Integer)
                .default(30)
                .bounds(1.0, 3600.0),
            ParameterSchema::new("auto_recovery", ParamType::Boolean).default(true),
            ParameterSchema::new("recovery_attempts", ParamType::Integer)
                .default(3)
                .bounds(0.0, 100.0),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let duration_minutes = params["duration_minutes"].as_u64().unwrap_or(0);
        let monitor_interval = params["monitor_interval"].as_u64().unwrap_or(30).max(1);
        let auto_recovery = params["auto_recovery"].as_bool().unwrap_or(true);
        let recovery_attempts_limit = params["recovery_attempts"].as_u64().unwrap_or(3);

        let client = &*self.client;
        let started_at = Instant::now();
        let deadline = (duration_minutes > 0)
            .then(|| started_at + Duration::from_secs(duration_minutes * 60));

        let mut total_corrections: u64 = 0;
        let mut recovery_attempts: u64 = 0;
        let mut final_state;

        loop {
            tokio::time::sleep(Duration::from_secs(monitor_interval)).await;

            final_state = client.get_app_state().await?;

            match final_state {
                AppState::Guiding => {
                    total_corrections += 1;
                }
                AppState::LostLock => {
                    if auto_recovery && recovery_attempts < recovery_attempts_limit {
                        recovery_attempts += 1;
                        ctx.log(format!(
                            "LostLock: attempting recovery {recovery_attempts}/{recovery_attempts_limit}"
                        ))
                        .await;
                        self.perform_recovery().await?;
                    } else {
                        return Err(TaskError::new(
                            TaskErrorKind::SystemError,
                            format!(
                                "LostLock with auto_recovery={auto_recovery} and \
                                 {recovery_attempts}/{recovery_attempts_limit} attempts used"
                            ),
                        ));
                    }
                }
                AppState::Stopped => {
                    return Err(TaskError::new(TaskErrorKind::SystemError, "guiding stopped unexpectedly"));
                }
                _ => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    ctx.log("duration expired").await;
                    break;
                }
            }
        }

        Ok(json!({
            "duration_minutes": duration_minutes,
            "total_corrections": total_corrections,
            "recovery_attempts": recovery_attempts,
            "final_state": format!("{final_state:?}"),
        }))
    }
}

impl GuidedSession {
    /// Issues a fresh `start_guiding` with recalibration, per §4.8.3's
    /// `perform_recovery()` contract.
    async fn perform_recovery(&self) -> Result<(), TaskError> {
        let settle = SettleParameters {
            pixels: 2.0,
            time_s: 3.0,
            timeout_s: 60.0,
        };
        let future = self.client.start_guiding(settle, true, None).await?;
        let result = future.wait(Duration::from_secs(70)).await?;
        if !result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, "recovery settle failed"));
        }
        Ok(())
    }
}
