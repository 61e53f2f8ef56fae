//! Builds the process-wide task registry (§3 `TaskFactory registry`,
//! §4.9): every task this crate ships, registered under its own name
//! against a single dependency-injected `phd2::Client` handle rather than
//! a true global singleton (§9 "Global mutable state").

use crate::phd2::Client;
use crate::task::factory::TaskFactory;
use crate::task::simple_tasks::{
    ClearCalibrationTask, DitherTask, FindStarTask, FlipCalibrationTask, GuiderPauseTask,
    GuiderResumeTask, GuiderStartTask, GuiderStopTask, Phd2ConnectTask, Phd2DisconnectTask,
    Phd2ShutdownTask, SetAlgoParamTask,
};
use crate::task::task::Task;
use crate::task::workflows::{
    AutoGuideConfig, CompleteGuideSetup, GuidedExposure, GuidedSequence, GuidedSession,
    MeridianFlipWorkflow, Phd2HealthCheck,
};
use std::sync::Arc;

/// Populates a fresh [`TaskFactory`] with every task and workflow this
/// crate ships, all sharing one `Arc<Client>` handle (§4.9: "Inserted at
/// startup; never mutated concurrently with lookup").
///
/// # Panics
///
/// Never, in practice: the registered names below are all distinct
/// literals, so `TaskFactory::register`'s duplicate-name error (§8
/// invariant 9) cannot actually trigger here. It is only reachable if this
/// function is edited to register the same name twice.
#[must_use]
pub fn build_registry(client: &Arc<Client>) -> TaskFactory {
    let mut factory = TaskFactory::new();

    macro_rules! register {
        ($name:literal, $ctor:expr) => {{
            let client = Arc::clone(client);
            factory
                .register($name, move || Task::new(Box::new(($ctor)(Arc::clone(&client)))))
                .expect("task names registered here are distinct literals");
        }};
    }

    // Single-purpose PHD2 tasks (SPEC_FULL.md §10).
    register!("phd2_connect", |client| Phd2ConnectTask { client });
    register!("phd2_disconnect", |client| Phd2DisconnectTask { client });
    register!("guider_start", |client| GuiderStartTask { client });
    register!("guider_stop", |client| GuiderStopTask { client });
    register!("guider_pause", |client| GuiderPauseTask { client });
    register!("guider_resume", |client| GuiderResumeTask { client });
    register!("clear_calibration", |client| ClearCalibrationTask { client });
    register!("flip_calibration", |client| FlipCalibrationTask { client });
    register!("dither", |client| DitherTask { client });
    register!("find_star", |client| FindStarTask { client });
    register!("set_algo_param", |client| SetAlgoParamTask { client });
    register!("phd2_shutdown", |client| Phd2ShutdownTask { client });

    // Composite workflows (§4.8).
    register!("complete_guide_setup", |client| CompleteGuideSetup { client });
    register!("meridian_flip", |client| MeridianFlipWorkflow { client });
    register!("guided_session", |client| GuidedSession { client });
    register!("guided_exposure", |client| GuidedExposure { client });
    register!("guided_sequence", |client| GuidedSequence { client });

    // Diagnostics / auto-config (§4.8.5).
    register!("phd2_health_check", |client| Phd2HealthCheck { client });
    register!("auto_guide_config", |client| AutoGuideConfig { client });

    factory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Phd2ClientConfig;

    #[test]
    fn registers_every_shipped_task_exactly_once() {
        let client = Arc::new(Client::new(Phd2ClientConfig::default()));
        let factory = build_registry(&client);

        for name in [
            "phd2_connect",
            "phd2_disconnect",
            "guider_start",
            "guider_stop",
            "guider_pause",
            "guider_resume",
            "clear_calibration",
            "flip_calibration",
            "dither",
            "find_star",
            "set_algo_param",
            "phd2_shutdown",
            "complete_guide_setup",
            "meridian_flip",
            "guided_session",
            "guided_exposure",
            "guided_sequence",
            "phd2_health_check",
            "auto_guide_config",
        ] {
            assert!(factory.is_registered(name), "{name} should be registered");
            assert!(factory.create(name).is_some());
        }
    }
}
