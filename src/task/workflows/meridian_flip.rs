//! `MeridianFlipWorkflow` (§4.8.2): snapshot, stop guiding, flip
//! calibration, wait out the mount's physical flip, then optionally
//! recalibrate and resume guiding.

use crate::phd2::{AppState, Client, SettleParameters};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use crate::task::workflows::{u64_as_f64, wait_for_state};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct MeridianFlipWorkflow {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for MeridianFlipWorkflow {
    fn name(&self) -> &str {
        "meridian_flip"
    }

    fn type_tag(&self) -> &str {
        "workflow"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(900)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("recalibrate", ParamType::Boolean).default(true),
            ParameterSchema::new("settle_time", ParamType::Integer)
                .default(5)
                .bounds(1.0, 300.0),
            ParameterSchema::new("timeout", ParamType::Integer)
                .default(300)
                .bounds(30.0, 3600.0),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let recalibrate = params["recalibrate"].as_bool().unwrap_or(true);
        let settle_time = params["settle_time"].as_u64().unwrap_or(5);
        let calibration_timeout = params["timeout"].as_u64().unwrap_or(300);

        let client = &*self.client;

        // SnapshotPreFlipState (§4.8.2): advisory only, not restored later.
        let pre_flip_state = client.get_app_state().await?;
        let pre_flip_exposure = client.get_exposure_ms().await.ok();
        let pre_flip_dec_guide_mode = client.get_dec_guide_mode().await.ok();
        let pre_flip_guide_output_enabled = client.get_guide_output_enabled().await.ok();
        let pre_flip_lock_position = client.get_lock_position().await.ok().flatten();
        ctx.log(format!("SnapshotPreFlipState: app_state={pre_flip_state:?}"))
            .await;

        // StopGuiding: failing to stop cleanly is non-fatal (proceed).
        if let Err(error) = client.stop_capture().await {
            ctx.log(format!("StopGuiding: non-fatal failure: {error}")).await;
        }

        // FlipCalibration: non-fatal, warn only.
        if let Err(error) = client.flip_calibration().await {
            ctx.log(format!("FlipCalibration: non-fatal failure: {error}")).await;
        }

        // WaitForMountFlipBlocking(settle_time s): a plain sleep, the mount's
        // physical flip is not observable through any PHD2 RPC.
        ctx.log(format!("WaitForMountFlipBlocking: sleeping {settle_time}s")).await;
        tokio::time::sleep(Duration::from_secs(settle_time)).await;

        if !recalibrate {
            ctx.log("recalibrate=false: flip workflow ends without resuming guiding")
                .await;
            return Ok(json!({
                "status": "ok",
                "recalibrated": false,
                "pre_flip_state": format!("{pre_flip_state:?}"),
                "pre_flip_exposure_ms": pre_flip_exposure,
                "pre_flip_dec_guide_mode": pre_flip_dec_guide_mode,
                "pre_flip_guide_output_enabled": pre_flip_guide_output_enabled,
                "pre_flip_lock_position": pre_flip_lock_position,
            }));
        }

        // LoopAndSelectStar: fatal if it fails.
        client.start_loop().await?;
        wait_for_state(client, |state| state == AppState::Looping, Duration::from_secs(30)).await?;
        let [x, y] = client.find_star(None).await?;
        client.set_lock_position(x, y, true).await?;
        ctx.log(format!("LoopAndSelectStar: locked onto star at ({x}, {y})")).await;

        // Calibrate(timeout): fatal.
        let calibrate_settle = SettleParameters {
            pixels: 2.0,
            time_s: u64_as_f64(settle_time),
            timeout_s: u64_as_f64(calibration_timeout),
        };
        let calibrate_future = client.start_guiding(calibrate_settle, true, None).await?;
        let calibrate_result = calibrate_future
            .wait(Duration::from_secs(calibration_timeout + 10))
            .await?;
        if !calibrate_result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, "Calibrate: settle failed"));
        }
        ctx.log("Calibrate: settled").await;

        // StartGuiding(60 s): fatal.
        let guide_settle = SettleParameters {
            pixels: 1.5,
            time_s: u64_as_f64(settle_time),
            timeout_s: 60.0,
        };
        let guide_future = client.start_guiding(guide_settle, false, None).await?;
        let guide_result = guide_future.wait(Duration::from_secs(70)).await?;
        if !guide_result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, "StartGuiding: settle failed"));
        }

        // AssertGuiding: fatal.
        let final_state = client.get_app_state().await?;
        if final_state != AppState::Guiding {
            return Err(TaskError::new(
                TaskErrorKind::DeviceError,
                format!("AssertGuiding: app state is {final_state:?}, not Guiding"),
            ));
        }
        ctx.log("AssertGuiding: confirmed Guiding").await;

        Ok(json!({
            "status": "ok",
            "recalibrated": true,
            "pre_flip_state": format!("{pre_flip_state:?}"),
            "pre_flip_exposure_ms": pre_flip_exposure,
            "pre_flip_dec_guide_mode": pre_flip_dec_guide_mode,
            "pre_flip_guide_output_enabled": pre_flip_guide_output_enabled,
            "pre_flip_lock_position": pre_flip_lock_position,
            "final_state": format!("{final_state:?}"),
        }))
    }
}
