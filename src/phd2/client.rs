//! The PHD2 client façade (§4.6): RPC wrappers over `send_rpc`, and the
//! settle-completion future with its "single settle in progress" bit.

use crate::config::Phd2ClientConfig;
use crate::phd2::error::Phd2Error;
use crate::phd2::events::{AppState, Event};
use crate::phd2::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Settling parameters bounding a guide-start or dither completion
/// (§3 `SettleParameters`).
#[derive(Debug, Clone, Copy)]
pub struct SettleParameters {
    pub pixels: f64,
    pub time_s: f64,
    pub timeout_s: f64,
}

impl SettleParameters {
    fn to_json(self) -> Value {
        json!({ "pixels": self.pixels, "time": self.time_s, "timeout": self.timeout_s })
    }
}

/// Outcome of a settle-completion future (§4.6 "Settle contract").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleResult {
    pub success: bool,
}

/// An equipment profile (§4.6 "Equipment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i32,
    pub name: String,
}

/// A future resolved exactly once, by the first `SettleDone` event arriving
/// after `start_guiding`/`dither` registered it (§4.6, §5 "Ordering
/// guarantees").
pub struct SettleFuture(oneshot::Receiver<SettleResult>);

impl SettleFuture {
    /// Waits up to `timeout` for the settle to complete. A connection drop
    /// while waiting resolves `success: false` (§4.6).
    pub async fn wait(self, timeout: Duration) -> Result<SettleResult, Phd2Error> {
        match tokio::time::timeout(timeout, self.0).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Ok(SettleResult { success: false }),
            Err(_) => Err(Phd2Error::Timeout("settle".to_owned())),
        }
    }
}

/// High-level PHD2 client: one façade instance per connection, backed by a
/// [`Transport`] (§2 "PHD2 client facade").
pub struct Client {
    transport: Arc<Transport>,
    config: Phd2ClientConfig,
    pending_settle: Arc<Mutex<Option<oneshot::Sender<SettleResult>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn new(config: Phd2ClientConfig) -> Self {
        Self {
            transport: Arc::new(Transport::new()),
            config,
            pending_settle: Arc::new(Mutex::new(None)),
            dispatcher: Mutex::new(None),
        }
    }

    /// Subscribes to the raw decoded event stream, for callers that want to
    /// observe PHD2 events beyond settle completion.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.transport.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connects to the configured host/port and starts the settle
    /// dispatcher (§4.5 `connect`).
    pub async fn connect(&self) -> Result<(), Phd2Error> {
        self.connect_to(
            &self.config.host.clone(),
            self.config.port,
            self.config.connect_timeout,
        )
        .await
    }

    /// Connects to an explicit host/port/timeout, overriding the configured
    /// defaults.
    pub async fn connect_to(&self, host: &str, port: u16, timeout: Duration) -> Result<(), Phd2Error> {
        self.transport.connect(host, port, timeout).await?;
        self.start_dispatcher().await;
        Ok(())
    }

    async fn start_dispatcher(&self) {
        let mut events = self.transport.subscribe();
        let mut connected = self.transport.connected_watch();
        let pending_settle = Arc::clone(&self.pending_settle);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => {
                        match received {
                            Ok(Event::SettleDone { status, .. }) => {
                                if let Some(sender) = pending_settle.lock().await.take() {
                                    let _ignored = sender.send(SettleResult { success: status == 0 });
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Closed) => break,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        }
                    }
                    changed = connected.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*connected.borrow() {
                            if let Some(sender) = pending_settle.lock().await.take() {
                                let _ignored = sender.send(SettleResult { success: false });
                            }
                        }
                    }
                }
            }
        });
        *self.dispatcher.lock().await = Some(handle);
    }

    /// Closes the connection and fails any still-pending settle
    /// (§4.5 `disconnect`).
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
        if let Some(handle) = self.dispatcher.lock().await.take() {
            handle.abort();
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, Phd2Error> {
        self.transport.send_rpc(method, params, self.config.rpc_timeout).await
    }

    async fn begin_settle(&self) -> Result<oneshot::Receiver<SettleResult>, Phd2Error> {
        let mut guard = self.pending_settle.lock().await;
        if guard.is_some() {
            return Err(Phd2Error::SettleInProgress);
        }
        let (sender, receiver) = oneshot::channel();
        *guard = Some(sender);
        Ok(receiver)
    }

    async fn abort_settle(&self) {
        self.pending_settle.lock().await.take();
    }

    // -- Application control -------------------------------------------

    pub async fn shutdown(&self) -> Result<(), Phd2Error> {
        self.call("shutdown", None).await?;
        Ok(())
    }

    // -- Camera ----------------------------------------------------------

    pub async fn get_exposure_ms(&self) -> Result<i64, Phd2Error> {
        parse_i64(self.call("get_exposure", None).await?)
    }

    pub async fn set_exposure_ms(&self, exposure_ms: i64) -> Result<(), Phd2Error> {
        self.call("set_exposure", Some(json!([exposure_ms]))).await?;
        Ok(())
    }

    pub async fn get_exposure_durations(&self) -> Result<Vec<i64>, Phd2Error> {
        let value = self.call("get_exposure_durations", None).await?;
        serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("get_exposure_durations"))
    }

    pub async fn get_use_subframes(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_use_subframes", None).await?)
    }

    /// `subframe` is `[x, y, width, height]` when a region of interest is
    /// requested.
    pub async fn capture_single_frame(
        &self,
        exposure_ms: Option<i64>,
        subframe: Option<[i32; 4]>,
    ) -> Result<(), Phd2Error> {
        let mut params = json!({});
        if let Some(exposure_ms) = exposure_ms {
            params["exposure"] = json!(exposure_ms);
        }
        if let Some(subframe) = subframe {
            params["subframe"] = json!(subframe);
        }
        self.call("capture_single_frame", Some(params)).await?;
        Ok(())
    }

    pub async fn get_camera_frame_size(&self) -> Result<(i64, i64), Phd2Error> {
        let value = self.call("get_camera_frame_size", None).await?;
        let pair: (i64, i64) =
            serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("get_camera_frame_size"))?;
        Ok(pair)
    }

    pub async fn get_ccd_temperature(&self) -> Result<f64, Phd2Error> {
        let value = self.call("get_ccd_temperature", None).await?;
        value
            .get("temperature")
            .and_then(Value::as_f64)
            .ok_or(Phd2Error::InvalidResponse("get_ccd_temperature"))
    }

    pub async fn get_cooler_status(&self) -> Result<Value, Phd2Error> {
        self.call("get_cooler_status", None).await
    }

    pub async fn save_image(&self) -> Result<Value, Phd2Error> {
        self.call("save_image", None).await
    }

    pub async fn get_star_image(&self, size: Option<i64>) -> Result<Value, Phd2Error> {
        let params = size.map(|size| json!({ "size": size }));
        self.call("get_star_image", params).await
    }

    // -- Equipment ---------------------------------------------------------

    pub async fn get_connected(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_connected", None).await?)
    }

    pub async fn set_connected(&self, connected: bool) -> Result<(), Phd2Error> {
        self.call("set_connected", Some(json!(connected))).await?;
        Ok(())
    }

    pub async fn get_current_equipment(&self) -> Result<Value, Phd2Error> {
        self.call("get_current_equipment", None).await
    }

    pub async fn get_profile(&self) -> Result<Profile, Phd2Error> {
        let value = self.call("get_profile", None).await?;
        serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("get_profile"))
    }

    pub async fn set_profile(&self, profile_id: i32) -> Result<(), Phd2Error> {
        self.call("set_profile", Some(json!({ "id": profile_id }))).await?;
        Ok(())
    }

    pub async fn get_profiles(&self) -> Result<Vec<Profile>, Phd2Error> {
        let value = self.call("get_profiles", None).await?;
        serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("get_profiles"))
    }

    // -- Guiding -------------------------------------------------------------

    /// Starts guiding. Returns a [`SettleFuture`] resolved by the first
    /// `SettleDone` after this call (§4.6). Fails locally with
    /// [`Phd2Error::SettleInProgress`] if another settle is already
    /// outstanding.
    pub async fn start_guiding(
        &self,
        settle: SettleParameters,
        recalibrate: bool,
        roi: Option<[f64; 4]>,
    ) -> Result<SettleFuture, Phd2Error> {
        let receiver = self.begin_settle().await?;
        let mut params = json!({ "settle": settle.to_json(), "recalibrate": recalibrate });
        if let Some(roi) = roi {
            params["roi"] = json!(roi);
        }
        if let Err(err) = self.call("guide", Some(params)).await {
            self.abort_settle().await;
            return Err(err);
        }
        Ok(SettleFuture(receiver))
    }

    pub async fn stop_capture(&self) -> Result<(), Phd2Error> {
        self.call("stop_capture", None).await?;
        Ok(())
    }

    /// Stops guiding but keeps the camera looping exposures.
    pub async fn start_loop(&self) -> Result<(), Phd2Error> {
        self.call("loop", None).await?;
        Ok(())
    }

    /// Shifts the lock position by up to `amount` pixels and waits for the
    /// next settle (§4.6).
    pub async fn dither(
        &self,
        amount: f64,
        ra_only: bool,
        settle: SettleParameters,
    ) -> Result<SettleFuture, Phd2Error> {
        let receiver = self.begin_settle().await?;
        let params = json!({ "amount": amount, "raOnly": ra_only, "settle": settle.to_json() });
        if let Err(err) = self.call("dither", Some(params)).await {
            self.abort_settle().await;
            return Err(err);
        }
        Ok(SettleFuture(receiver))
    }

    pub async fn get_app_state(&self) -> Result<AppState, Phd2Error> {
        let value = self.call("get_app_state", None).await?;
        let raw = value.as_str().ok_or(Phd2Error::InvalidResponse("get_app_state"))?;
        serde_json::from_value(json!(raw)).map_err(|_| Phd2Error::InvalidResponse("get_app_state"))
    }

    pub async fn guide_pulse(&self, amount_ms: i64, direction: &str, which: &str) -> Result<(), Phd2Error> {
        self.call("guide_pulse", Some(json!([amount_ms, direction, which])))
            .await?;
        Ok(())
    }

    pub async fn get_paused(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_paused", None).await?)
    }

    /// `full = true` pauses looping entirely; otherwise exposures continue
    /// without guide corrections.
    pub async fn set_paused(&self, paused: bool, full: bool) -> Result<(), Phd2Error> {
        let params = if full {
            json!({ "paused": paused, "full": "full" })
        } else {
            json!({ "paused": paused })
        };
        self.call("set_paused", Some(params)).await?;
        Ok(())
    }

    pub async fn get_guide_output_enabled(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_guide_output_enabled", None).await?)
    }

    pub async fn set_guide_output_enabled(&self, enabled: bool) -> Result<(), Phd2Error> {
        self.call("set_guide_output_enabled", Some(json!(enabled))).await?;
        Ok(())
    }

    pub async fn get_variable_delay_settings(&self) -> Result<Value, Phd2Error> {
        self.call("get_variable_delay_settings", None).await
    }

    pub async fn set_variable_delay_settings(&self, settings: Value) -> Result<(), Phd2Error> {
        self.call("set_variable_delay_settings", Some(settings)).await?;
        Ok(())
    }

    // -- Calibration ---------------------------------------------------------

    pub async fn is_calibrated(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_calibrated", None).await?)
    }

    pub async fn clear_calibration(&self, which: &str) -> Result<(), Phd2Error> {
        self.call("clear_calibration", Some(json!([which]))).await?;
        Ok(())
    }

    pub async fn flip_calibration(&self) -> Result<(), Phd2Error> {
        self.call("flip_calibration", None).await?;
        Ok(())
    }

    pub async fn get_calibration_data(&self, which: &str) -> Result<Value, Phd2Error> {
        self.call("get_calibration_data", Some(json!([which]))).await
    }

    // -- Algorithm -------------------------------------------------------

    pub async fn get_dec_guide_mode(&self) -> Result<String, Phd2Error> {
        let value = self.call("get_dec_guide_mode", None).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or(Phd2Error::InvalidResponse("get_dec_guide_mode"))
    }

    pub async fn set_dec_guide_mode(&self, mode: &str) -> Result<(), Phd2Error> {
        self.call("set_dec_guide_mode", Some(json!(mode))).await?;
        Ok(())
    }

    pub async fn get_algo_param(&self, axis: &str, name: &str) -> Result<f64, Phd2Error> {
        let value = self
            .call("get_algo_param", Some(json!([axis, name])))
            .await?;
        value.as_f64().ok_or(Phd2Error::InvalidResponse("get_algo_param"))
    }

    pub async fn set_algo_param(&self, axis: &str, name: &str, value: f64) -> Result<(), Phd2Error> {
        self.call("set_algo_param", Some(json!([axis, name, value]))).await?;
        Ok(())
    }

    pub async fn get_algo_param_names(&self, axis: &str) -> Result<Vec<String>, Phd2Error> {
        let value = self.call("get_algo_param_names", Some(json!([axis]))).await?;
        serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("get_algo_param_names"))
    }

    // -- Star selection ----------------------------------------------------

    pub async fn find_star(&self, roi: Option<[f64; 4]>) -> Result<[f64; 2], Phd2Error> {
        let params = roi.map(|roi| json!({ "roi": roi }));
        let value = self.call("find_star", params).await?;
        serde_json::from_value(value).map_err(|_| Phd2Error::InvalidResponse("find_star"))
    }

    pub async fn get_lock_position(&self) -> Result<Option<[f64; 2]>, Phd2Error> {
        let value = self.call("get_lock_position", None).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|_| Phd2Error::InvalidResponse("get_lock_position"))
    }

    pub async fn set_lock_position(&self, x: f64, y: f64, exact: bool) -> Result<(), Phd2Error> {
        self.call("set_lock_position", Some(json!([x, y, exact]))).await?;
        Ok(())
    }

    pub async fn get_search_region(&self) -> Result<f64, Phd2Error> {
        let value = self.call("get_search_region", None).await?;
        value.as_f64().ok_or(Phd2Error::InvalidResponse("get_search_region"))
    }

    pub async fn get_pixel_scale(&self) -> Result<f64, Phd2Error> {
        let value = self.call("get_pixel_scale", None).await?;
        value.as_f64().ok_or(Phd2Error::InvalidResponse("get_pixel_scale"))
    }

    // -- Lock shift ------------------------------------------------------

    pub async fn get_lock_shift_enabled(&self) -> Result<bool, Phd2Error> {
        parse_bool(self.call("get_lock_shift_enabled", None).await?)
    }

    pub async fn set_lock_shift_enabled(&self, enabled: bool) -> Result<(), Phd2Error> {
        self.call("set_lock_shift_enabled", Some(json!(enabled))).await?;
        Ok(())
    }

    pub async fn get_lock_shift_params(&self) -> Result<Value, Phd2Error> {
        self.call("get_lock_shift_params", None).await
    }

    pub async fn set_lock_shift_params(&self, params: Value) -> Result<(), Phd2Error> {
        self.call("set_lock_shift_params", Some(params)).await?;
        Ok(())
    }
}

fn parse_bool(value: Value) -> Result<bool, Phd2Error> {
    value.as_bool().ok_or(Phd2Error::InvalidResponse("expected boolean"))
}

fn parse_i64(value: Value) -> Result<i64, Phd2Error> {
    value.as_i64().ok_or(Phd2Error::InvalidResponse("expected integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_parameters_encode_expected_keys() {
        let settle = SettleParameters {
            pixels: 2.0,
            time_s: 3.0,
            timeout_s: 60.0,
        };
        let value = settle.to_json();
        assert_eq!(value["pixels"], json!(2.0));
        assert_eq!(value["time"], json!(3.0));
        assert_eq!(value["timeout"], json!(60.0));
    }
}
