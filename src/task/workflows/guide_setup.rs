//! `CompleteGuideSetup` (§4.8.1): connect, loop, optionally select a star,
//! calibrate, and start guiding, with a bounded retry loop per state.

use crate::phd2::{AppState, Client, SettleParameters};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use crate::task::workflows::{retry_state, u64_as_f64, wait_for_state};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct CompleteGuideSetup {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for CompleteGuideSetup {
    fn name(&self) -> &str {
        "complete_guide_setup"
    }

    fn type_tag(&self) -> &str {
        "workflow"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(600)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("auto_find_star", ParamType::Boolean).default(true),
            ParameterSchema::new("calibration_timeout", ParamType::Integer)
                .default(120)
                .bounds(1.0, 3600.0),
            ParameterSchema::new("settle_time", ParamType::Integer)
                .default(3)
                .bounds(1.0, 300.0),
            ParameterSchema::new("retry_count", ParamType::Integer)
                .default(3)
                .bounds(1.0, 100.0),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let started_at = Instant::now();
        let auto_find_star = params["auto_find_star"].as_bool().unwrap_or(true);
        let calibration_timeout = params["calibration_timeout"].as_u64().unwrap_or(120);
        let settle_time = params["settle_time"].as_u64().unwrap_or(3);
        let retry_count = u32::try_from(params["retry_count"].as_u64().unwrap_or(3)).unwrap_or(3);

        let client = &*self.client;

        retry_state(ctx, "EnsureConnected", retry_count, Duration::from_secs(2), || async {
            if !client.is_connected() {
                client.connect().await?;
            }
            wait_for_state(client, |state| state == AppState::Looping, Duration::from_secs(30)).await?;
            Ok(())
        })
        .await?;

        retry_state(ctx, "StartLooping", retry_count, Duration::from_secs(2), || async {
            client.start_loop().await?;
            wait_for_state(client, |state| state == AppState::Looping, Duration::from_secs(30)).await?;
            Ok(())
        })
        .await?;

        if auto_find_star {
            retry_state(ctx, "AutoSelectStar", retry_count, Duration::from_secs(3), || async {
                let [x, y] = client.find_star(None).await?;
                client.set_lock_position(x, y, true).await?;
                wait_for_state(client, |state| state == AppState::Selected, Duration::from_secs(15)).await?;
                Ok(())
            })
            .await?;
        }

        retry_state(ctx, "Calibrate", retry_count, Duration::from_secs(5), || async {
            let settle = SettleParameters {
                pixels: 2.0,
                time_s: u64_as_f64(settle_time),
                timeout_s: u64_as_f64(calibration_timeout),
            };
            let future = client.start_guiding(settle, false, None).await?;
            let result = future
                .wait(Duration::from_secs(calibration_timeout + 10))
                .await?;
            if !result.success {
                return Err(TaskError::new(TaskErrorKind::DeviceError, "calibration settle failed"));
            }
            Ok(())
        })
        .await?;

        retry_state(ctx, "StartGuiding", retry_count, Duration::from_secs(5), || async {
            let settle = SettleParameters {
                pixels: 1.5,
                time_s: u64_as_f64(settle_time),
                timeout_s: 60.0,
            };
            let future = client.start_guiding(settle, true, None).await?;
            let result = future.wait(Duration::from_secs(70)).await?;
            if !result.success {
                return Err(TaskError::new(TaskErrorKind::DeviceError, "guide-start settle failed"));
            }
            Ok(())
        })
        .await?;

        let final_state = client.get_app_state().await?;
        if final_state != AppState::Guiding {
            return Err(TaskError::new(
                TaskErrorKind::DeviceError,
                format!("setup completed but app state is {final_state:?}, not Guiding"),
            ));
        }
        ctx.log("guide setup complete").await;

        Ok(json!({
            "status": "ok",
            "final_state": format!("{final_state:?}"),
            "setup_time_s": started_at.elapsed().as_secs_f64(),
        }))
    }
}
