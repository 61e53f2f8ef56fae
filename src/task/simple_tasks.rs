//! Thin single-purpose PHD2 tasks (SPEC_FULL.md §10): each wraps exactly
//! one façade call in the uniform [`crate::task::Task`] contract.

use crate::phd2::{Client, SettleParameters};
use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn settle_from(params: &Value) -> SettleParameters {
    SettleParameters {
        pixels: params["settle_pixels"].as_f64().unwrap_or(2.0),
        time_s: params["settle_time"].as_f64().unwrap_or(3.0),
        timeout_s: params["settle_timeout"].as_f64().unwrap_or(60.0),
    }
}

/// -> [`Client::connect`].
pub struct Phd2ConnectTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for Phd2ConnectTask {
    fn name(&self) -> &str {
        "phd2_connect"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        ctx.log("connecting to PHD2").await;
        self.client.connect().await?;
        Ok(json!({ "connected": true }))
    }
}

/// -> [`Client::disconnect`].
pub struct Phd2DisconnectTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for Phd2DisconnectTask {
    fn name(&self) -> &str {
        "phd2_disconnect"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        self.client.disconnect().await;
        ctx.log("disconnected from PHD2").await;
        Ok(json!({ "connected": false }))
    }
}

/// -> [`Client::start_guiding`].
pub struct GuiderStartTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuiderStartTask {
    fn name(&self) -> &str {
        "guider_start"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("recalibrate", ParamType::Boolean).default(false),
            ParameterSchema::new("settle_pixels", ParamType::Number).default(2.0),
            ParameterSchema::new("settle_time", ParamType::Number).default(3.0),
            ParameterSchema::new("settle_timeout", ParamType::Number).default(60.0),
        ]
    }
    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let recalibrate = params["recalibrate"].as_bool().unwrap_or(false);
        let settle = settle_from(params);
        ctx.log("starting guiding").await;
        let future = self.client.start_guiding(settle, recalibrate, None).await?;
        let result = future.wait(Duration::from_secs_f64(settle.timeout_s + 30.0)).await?;
        if !result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, "guide settle failed"));
        }
        Ok(json!({ "settled": true }))
    }
}

/// -> [`Client::stop_capture`].
pub struct GuiderStopTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuiderStopTask {
    fn name(&self) -> &str {
        "guider_stop"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        self.client.stop_capture().await?;
        ctx.log("stopped capture").await;
        Ok(json!({ "stopped": true }))
    }
}

/// -> [`Client::set_paused`] with `paused = true`.
pub struct GuiderPauseTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuiderPauseTask {
    fn name(&self) -> &str {
        "guider_pause"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    fn schema(&self) -> Vec<ParameterSchema> {
        vec![ParameterSchema::new("full", ParamType::Boolean).default(false)]
    }
    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let full = params["full"].as_bool().unwrap_or(false);
        self.client.set_paused(true, full).await?;
        ctx.log("paused guiding").await;
        Ok(json!({ "paused": true }))
    }
}

/// -> [`Client::set_paused`] with `paused = false`.
pub struct GuiderResumeTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for GuiderResumeTask {
    fn name(&self) -> &str {
        "guider_resume"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        self.client.set_paused(false, false).await?;
        ctx.log("resumed guiding").await;
        Ok(json!({ "paused": false }))
    }
}

/// -> [`Client::clear_calibration`].
pub struct ClearCalibrationTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for ClearCalibrationTask {
    fn name(&self) -> &str {
        "clear_calibration"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    fn schema(&self) -> Vec<ParameterSchema> {
        vec![ParameterSchema::new("which", ParamType::String).default("both")]
    }
    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let which = params["which"].as_str().unwrap_or("both");
        self.client.clear_calibration(which).await?;
        ctx.log(format!("cleared calibration ({which})")).await;
        Ok(json!({ "cleared": which }))
    }
}

/// -> [`Client::flip_calibration`].
pub struct FlipCalibrationTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for FlipCalibrationTask {
    fn name(&self) -> &str {
        "flip_calibration"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        self.client.flip_calibration().await?;
        ctx.log("flipped calibration").await;
        Ok(json!({ "flipped": true }))
    }
}

/// -> [`Client::dither`].
pub struct DitherTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for DitherTask {
    fn name(&self) -> &str {
        "dither"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(90)
    }
    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("amount", ParamType::Number)
                .required()
                .bounds(1.0, 50.0),
            ParameterSchema::new("ra_only", ParamType::Boolean).default(false),
            ParameterSchema::new("settle_pixels", ParamType::Number).default(2.0),
            ParameterSchema::new("settle_time", ParamType::Number).default(3.0),
            ParameterSchema::new("settle_timeout", ParamType::Number).default(60.0),
        ]
    }
    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let amount = params["amount"].as_f64().unwrap_or(5.0);
        let ra_only = params["ra_only"].as_bool().unwrap_or(false);
        let settle = settle_from(params);
        ctx.log(format!("dithering by {amount} px")).await;
        let future = self.client.dither(amount, ra_only, settle).await?;
        let result = future.wait(Duration::from_secs_f64(settle.timeout_s + 30.0)).await?;
        if !result.success {
            return Err(TaskError::new(TaskErrorKind::DeviceError, "dither settle failed"));
        }
        Ok(json!({ "settled": true }))
    }
}

/// -> [`Client::find_star`] then [`Client::set_lock_position`].
pub struct FindStarTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for FindStarTask {
    fn name(&self) -> &str {
        "find_star"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        let [x, y] = self.client.find_star(None).await?;
        self.client.set_lock_position(x, y, true).await?;
        ctx.log(format!("locked onto star at ({x}, {y})")).await;
        Ok(json!({ "x": x, "y": y }))
    }
}

/// -> [`Client::set_algo_param`].
pub struct SetAlgoParamTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for SetAlgoParamTask {
    fn name(&self) -> &str {
        "set_algo_param"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("axis", ParamType::String).required(),
            ParameterSchema::new("name", ParamType::String).required(),
            ParameterSchema::new("value", ParamType::Number).required(),
        ]
    }
    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let axis = params["axis"].as_str().unwrap_or_default();
        let name = params["name"].as_str().unwrap_or_default();
        let value = params["value"].as_f64().unwrap_or_default();
        self.client.set_algo_param(axis, name, value).await?;
        ctx.log(format!("set {axis}.{name} = {value}")).await;
        Ok(json!({ "axis": axis, "name": name, "value": value }))
    }
}

/// -> [`Client::shutdown`].
pub struct Phd2ShutdownTask {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for Phd2ShutdownTask {
    fn name(&self) -> &str {
        "phd2_shutdown"
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn run(&self, ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
        self.client.shutdown().await?;
        ctx.log("sent PHD2 shutdown").await;
        Ok(json!({ "shutdown": true }))
    }
}
