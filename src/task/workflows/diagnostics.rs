//! `Phd2HealthCheck` (§4.8.5): runs a fixed set of live probes and
//! classifies the pass ratio into a coarse health grade.

use crate::phd2::Client;
use crate::task::error::TaskError;
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use crate::task::workflows::usize_as_f64;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Probe {
    name: &'static str,
    passed: bool,
    detail: String,
}

pub struct Phd2HealthCheck {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for Phd2HealthCheck {
    fn name(&self) -> &str {
        "phd2_health_check"
    }

    fn type_tag(&self) -> &str {
        "diagnostic"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("check_calibration", ParamType::Boolean).default(true),
            ParameterSchema::new("check_system_params", ParamType::Boolean).default(true),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let check_calibration = params["check_calibration"].as_bool().unwrap_or(true);
        let check_system_params = params["check_system_params"].as_bool().unwrap_or(true);
        let client = &*self.client;

        let mut probes = Vec::new();

        // Connectivity.
        probes.push(Probe {
            name: "connectivity",
            passed: client.is_connected(),
            detail: if client.is_connected() {
                "connected".to_owned()
            } else {
                "not connected".to_owned()
            },
        });

        // Camera configuration.
        match client.get_camera_frame_size().await {
            Ok((width, height)) => probes.push(Probe {
                name: "camera_config",
                passed: width > 0 && height > 0,
                detail: format!("{width}x{height}"),
            }),
            Err(error) => probes.push(Probe {
                name: "camera_config",
                passed: false,
                detail: error.to_string(),
            }),
        }

        // Guide-output status.
        match client.get_guide_output_enabled().await {
            Ok(enabled) => probes.push(Probe {
                name: "guide_output",
                passed: enabled,
                detail: format!("enabled={enabled}"),
            }),
            Err(error) => probes.push(Probe {
                name: "guide_output",
                passed: false,
                detail: error.to_string(),
            }),
        }

        if check_calibration {
            match client.is_calibrated().await {
                Ok(calibrated) => probes.push(Probe {
                    name: "calibration",
                    passed: calibrated,
                    detail: format!("calibrated={calibrated}"),
                }),
                Err(error) => probes.push(Probe {
                    name: "calibration",
                    passed: false,
                    detail: error.to_string(),
                }),
            }
        }

        if check_system_params {
            match client.get_dec_guide_mode().await {
                Ok(mode) => probes.push(Probe {
                    name: "system_params",
                    passed: true,
                    detail: format!("dec_guide_mode={mode}"),
                }),
                Err(error) => probes.push(Probe {
                    name: "system_params",
                    passed: false,
                    detail: error.to_string(),
                }),
            }
        }

        let total = probes.len();
        let passed = probes.iter().filter(|probe| probe.passed).count();
        let ratio = if total == 0 { 0.0 } else { usize_as_f64(passed) / usize_as_f64(total) };
        let grade = if ratio >= 0.90 {
            "EXCELLENT"
        } else if ratio >= 0.75 {
            "GOOD"
        } else if ratio >= 0.50 {
            "WARNING"
        } else {
            "CRITICAL"
        };

        for probe in &probes {
            ctx.log(format!(
                "probe {}: {} ({})",
                probe.name,
                if probe.passed { "pass" } else { "fail" },
                probe.detail
            ))
            .await;
        }

        Ok(json!({
            "grade": grade,
            "passed": passed,
            "total": total,
            "probes": probes.iter().map(|probe| json!({
                "name": probe.name,
                "passed": probe.passed,
                "detail": probe.detail,
            })).collect::<Vec<_>>(),
        }))
    }
}
