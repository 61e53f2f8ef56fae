//! `GuidedExposure` / `GuidedSequence` (§4.8.4): a single guided sub-exposure
//! with optional before/after dithers, and a bounded repetition of it.

use crate::phd2::{AppState, Client, SettleParameters};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use crate::task::workflows::u64_as_f64;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// The interval at which [`GuidedExposure::sleep_with_state_check`] samples
/// `AppState` during the exposure's own sleep.
const STATE_CHECK_INTERVAL: Duration = Duration::from_secs(2);

pub struct GuidedExposure {
    pub client: Arc<Client>,
}

impl GuidedExposure {
    async fn dither(&self, ctx: &TaskContext<'_>, amount: f64, settle: SettleParameters, label: &str) -> Result<(), TaskError> {
        ctx.log(format!("{label}: dithering {amount}px")).await;
        let future = self.client.dither(amount, false, settle).await?;
        let result = future.wait(Duration::from_secs_f64(settle.timeout_s + 30.0)).await?;
        if !result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, format!("{label}: dither settle failed")));
        }
        Ok(())
    }

    /// Sleeps in `STATE_CHECK_INTERVAL` slices for `duration`, failing early
    /// if `AppState` drifts away from `Guiding` partway through (§4.8.4).
    async fn sleep_with_state_check(&self, duration: Duration) -> Result<(), TaskError> {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            tokio::time::sleep(remaining.min(STATE_CHECK_INTERVAL)).await;
            if tokio::time::Instant::now() >= deadline {
                return Ok(());
            }
            let state = self.client.get_app_state().await?;
            if state != AppState::Guiding {
                return Err(TaskError::new(
                    TaskErrorKind::DeviceError,
                    format!("app state dropped to {state:?} during exposure"),
                ));
            }
        }
    }
}

#[async_trait]
impl TaskBody for GuidedExposure {
    fn name(&self) -> &str {
        "guided_exposure"
    }

    fn type_tag(&self) -> &str {
        "workflow"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(3600 + 600)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("exposure_time", ParamType::Number)
                .required()
                .bounds(0.1, 3600.0),
            ParameterSchema::new("dither_before", ParamType::Boolean).default(false),
            ParameterSchema::new("dither_after", ParamType::Boolean).default(false),
            ParameterSchema::new("dither_amount", ParamType::Number)
                .default(5.0)
                .bounds(1.0, 50.0),
            ParameterSchema::new("settle_tolerance", ParamType::Number)
                .default(1.5)
                .bounds(0.1, 10.0),
            ParameterSchema::new("settle_time", ParamType::Integer)
                .default(10)
                .bounds(1.0, 300.0),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let exposure_time = params["exposure_time"].as_f64().unwrap_or(1.0);
        let dither_before = params["dither_before"].as_bool().unwrap_or(false);
        let dither_after = params["dither_after"].as_bool().unwrap_or(false);
        let dither_amount = params["dither_amount"].as_f64().unwrap_or(5.0);
        let settle_tolerance = params["settle_tolerance"].as_f64().unwrap_or(1.5);
        let settle_time = params["settle_time"].as_u64().unwrap_or(10);

        let settle = SettleParameters {
            pixels: settle_tolerance,
            time_s: u64_as_f64(settle_time),
            timeout_s: 60.0,
        };

        let state = self.client.get_app_state().await?;
        if state != AppState::Guiding {
            return Err(TaskError::new(
                TaskErrorKind::DeviceError,
                format!("precondition failed: app state is {state:?}, not Guiding"),
            ));
        }

        if dither_before {
            self.dither(ctx, dither_amount, settle, "dither_before").await?;
        }

        ctx.log(format!("exposing for {exposure_time}s")).await;
        self.sleep_with_state_check(Duration::from_secs_f64(exposure_time)).await?;

        if dither_after {
            self.dither(ctx, dither_amount, settle, "dither_after").await?;
        }

        Ok(json!({ "exposure_time": exposure_time, "status": "ok" }))
    }
}

pub struct GuidedSequence {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuidedSequence {
    fn name(&self) -> &str {
        "guided_sequence"
    }

    fn type_tag(&self) -> &str {
        "workflow"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("exposure_time", ParamType::Number)
                .required()
                .bounds(0.1, 3600.0),
            ParameterSchema::new("count", ParamType::Integer)
                .required()
                .bounds(1.0, 1000.0),
            ParameterSchema::new("dither_interval", ParamType::Integer)
                .default(1)
                .bounds(0.0, 1000.0),
            ParameterSchema::new("dither_amount", ParamType::Number)
                .default(5.0)
                .bounds(1.0, 50.0),
            ParameterSchema::new("settle_tolerance", ParamType::Number)
                .default(1.5)
                .bounds(0.1, 10.0),
            ParameterSchema::new("settle_time", ParamType::Integer)
                .default(10)
                .bounds(1.0, 300.0),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let exposure_time = params["exposure_time"].as_f64().unwrap_or(1.0);
        let count = params["count"].as_u64().unwrap_or(1);
        let dither_interval = params["dither_interval"].as_u64().unwrap_or(1);
        let dither_amount = params["dither_amount"].as_f64().unwrap_or(5.0);
        let settle_tolerance = params["settle_tolerance"].as_f64().unwrap_or(1.5);
        let settle_time = params["settle_time"].as_u64().unwrap_or(10);

        let exposure = GuidedExposure {
            client: Arc::clone(&self.client),
        };

        let mut completed = 0_u64;
        for index in 0..count {
            // Dither before every Nth exposure where N = dither_interval and
            // i > 0 (§4.8.4); `dither_interval == 0` means never.
            let dither_before = dither_interval > 0 && index > 0 && index % dither_interval == 0;

            let exposure_params = json!({
                "exposure_time": exposure_time,
                "dither_before": dither_before,
                "dither_after": false,
                "dither_amount": dither_amount,
                "settle_tolerance": settle_tolerance,
                "settle_time": settle_time,
            });

            exposure.run(ctx, &exposure_params).await?;
            completed += 1;
            ctx.log(format!("completed exposure {completed}/{count}")).await;
        }

        Ok(json!({ "count": count, "completed": completed }))
    }
}
