//! `AutoGuideConfig` (§4.8.5): applies a coefficient-adjustment policy over
//! `{exposure, algo params, dither amount}` scaled by an aggressiveness
//! factor. The exact numeric policy is intentionally underdetermined by the
//! spec; what's guaranteed is parameter validation at the stated bounds, a
//! no-op run changing nothing, and every applied change logged.

use crate::phd2::Client;
use crate::task::error::TaskError;
use crate::task::schema::{ParamType, ParameterSchema};
use crate::task::task::{TaskBody, TaskContext};
use crate::task::workflows::i64_as_f64;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Algorithm parameter this policy tunes, when the connected PHD2 profile
/// exposes it for a given axis.
const TUNED_ALGO_PARAM: &str = "MinMove";

pub struct AutoGuideConfig {
    pub client: Arc<Client>,
}

#[async_trait]
impl TaskBody for AutoGuideConfig {
    fn name(&self) -> &str {
        "auto_guide_config"
    }

    fn type_tag(&self) -> &str {
        "diagnostic"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn schema(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("aggressiveness", ParamType::Number)
                .default(0.5)
                .bounds(0.1, 1.0),
            ParameterSchema::new("dry_run", ParamType::Boolean).default(false),
            ParameterSchema::new("apply_exposure", ParamType::Boolean).default(true),
            ParameterSchema::new("apply_algo_params", ParamType::Boolean).default(true),
        ]
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
        let aggressiveness = params["aggressiveness"].as_f64().unwrap_or(0.5);
        let dry_run = params["dry_run"].as_bool().unwrap_or(false);
        let apply_exposure = params["apply_exposure"].as_bool().unwrap_or(true);
        let apply_algo_params = params["apply_algo_params"].as_bool().unwrap_or(true);

        let client = &*self.client;
        let mut changes = Vec::new();

        if apply_exposure {
            if let Some(change) = self
                .adjust_exposure(ctx, client, aggressiveness, dry_run)
                .await?
            {
                changes.push(change);
            }
        }

        if apply_algo_params {
            for axis in ["ra", "dec"] {
                if let Some(change) = self
                    .adjust_algo_param(ctx, client, axis, aggressiveness, dry_run)
                    .await?
                {
                    changes.push(change);
                }
            }
        }

        // Dither amount is a per-call parameter, not a settable PHD2
        // property, so this policy only records a suggestion rather than
        // applying it through a façade call.
        let suggested_dither_amount = (5.0 * (0.5 + aggressiveness)).clamp(1.0, 50.0);
        ctx.log(format!("suggested dither_amount = {suggested_dither_amount:.2}px"))
            .await;

        Ok(json!({
            "aggressiveness": aggressiveness,
            "dry_run": dry_run,
            "changes_applied": changes.len(),
            "changes": changes,
            "suggested_dither_amount": suggested_dither_amount,
        }))
    }
}

impl AutoGuideConfig {
    async fn adjust_exposure(
        &self,
        ctx: &TaskContext<'_>,
        client: &Client,
        aggressiveness: f64,
        dry_run: bool,
    ) -> Result<Option<Value>, TaskError> {
        let current_ms = client.get_exposure_ms().await?;
        let available = client.get_exposure_durations().await.unwrap_or_default();

        // Higher aggressiveness -> shorter exposures -> faster corrections.
        let raw_target = i64_as_f64(current_ms) * (1.5 - aggressiveness);
        let target_ms = available
            .iter()
            .copied()
            .min_by(|a, b| {
                (i64_as_f64(*a) - raw_target)
                    .abs()
                    .total_cmp(&(i64_as_f64(*b) - raw_target).abs())
            })
            .unwrap_or(current_ms);

        if target_ms == current_ms {
            ctx.log(format!("exposure: no change needed ({current_ms}ms)")).await;
            return Ok(None);
        }

        if dry_run {
            ctx.log(format!("exposure: would change {current_ms}ms -> {target_ms}ms (dry run)"))
                .await;
            return Ok(Some(json!({
                "parameter": "exposure_ms",
                "from": current_ms,
                "to": target_ms,
                "applied": false,
            })));
        }

        client.set_exposure_ms(target_ms).await?;
        ctx.log(format!("exposure: changed {current_ms}ms -> {target_ms}ms")).await;
        Ok(Some(json!({
            "parameter": "exposure_ms",
            "from": current_ms,
            "to": target_ms,
            "applied": true,
        })))
    }

    async fn adjust_algo_param(
        &self,
        ctx: &TaskContext<'_>,
        client: &Client,
        axis: &str,
        aggressiveness: f64,
        dry_run: bool,
    ) -> Result<Option<Value>, TaskError> {
        let names = client.get_algo_param_names(axis).await.unwrap_or_default();
        if !names.iter().any(|name| name == TUNED_ALGO_PARAM) {
            return Ok(None);
        }

        let current = client.get_algo_param(axis, TUNED_ALGO_PARAM).await?;
        // Higher aggressiveness -> smaller MinMove -> the guider reacts to
        // smaller star movements.
        let target = (current * (1.0 - 0.3 * aggressiveness)).max(0.01);
        let rounded_target = (target * 100.0).round() / 100.0;

        if (rounded_target - current).abs() < f64::EPSILON {
            ctx.log(format!("{axis}.{TUNED_ALGO_PARAM}: no change needed ({current})"))
                .await;
            return Ok(None);
        }

        if dry_run {
            ctx.log(format!(
                "{axis}.{TUNED_ALGO_PARAM}: would change {current} -> {rounded_target} (dry run)"
            ))
            .await;
            return Ok(Some(json!({
                "parameter": format!("{axis}.{TUNED_ALGO_PARAM}"),
                "from": current,
                "to": rounded_target,
                "applied": false,
            })));
        }

        client.set_algo_param(axis, TUNED_ALGO_PARAM, rounded_target).await?;
        ctx.log(format!("{axis}.{TUNED_ALGO_PARAM}: changed {current} -> {rounded_target}"))
            .await;
        Ok(Some(json!({
            "parameter": format!("{axis}.{TUNED_ALGO_PARAM}"),
            "from": current,
            "to": rounded_target,
            "applied": true,
        })))
    }
}
