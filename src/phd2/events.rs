//! The PHD2 server-initiated event stream (§3 "PHD2 Event", §4.6).
//!
//! Modeled as a single internally-tagged enum matched on the wire `Event`
//! field, the direct Rust translation of a tagged union rather than a
//! handler-base-class hierarchy (§9 "Dynamic dispatch").

use serde::{Deserialize, Serialize};

/// Fields common to every PHD2 event envelope (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCommon {
    #[serde(rename = "Timestamp")]
    pub timestamp: f64,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Inst")]
    pub inst: i32,
}

/// PHD2's reported guiding-pipeline mode (§3 `AppState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    Stopped,
    Selected,
    Calibrating,
    Guiding,
    LostLock,
    Paused,
    Looping,
    #[serde(other)]
    Unknown,
}

/// A decoded PHD2 event (§3). `Generic` absorbs any `Event` tag this crate
/// doesn't model explicitly; common fields are not preserved for it since
/// nothing in this core's workflows inspects an unrecognized event's body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Event")]
pub enum Event {
    Version {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "PHDVersion")]
        phd_version: String,
        #[serde(rename = "PHDSubver")]
        phd_subver: String,
        #[serde(rename = "MsgVersion")]
        msg_version: i32,
        #[serde(rename = "OverlapSupport")]
        overlap: bool,
    },
    LockPositionSet {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },
    StarSelected {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },
    Calibrating {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Mount")]
        mount: String,
        dir: String,
        dist: f64,
        dx: f64,
        dy: f64,
        pos: [f64; 2],
        step: i32,
        #[serde(rename = "State")]
        state: String,
    },
    CalibrationComplete {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Mount")]
        mount: String,
    },
    CalibrationFailed {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Reason")]
        reason: String,
    },
    CalibrationDataFlipped {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Mount")]
        mount: String,
    },
    StartGuiding {
        #[serde(flatten)]
        common: EventCommon,
    },
    StartCalibration {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Mount")]
        mount: String,
    },
    AppState {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "State")]
        state: AppState,
    },
    Paused {
        #[serde(flatten)]
        common: EventCommon,
    },
    Resumed {
        #[serde(flatten)]
        common: EventCommon,
    },
    LoopingExposures {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Frame")]
        frame: u32,
    },
    LoopingExposuresStopped {
        #[serde(flatten)]
        common: EventCommon,
    },
    SettleBegin {
        #[serde(flatten)]
        common: EventCommon,
    },
    Settling {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Distance")]
        distance: f64,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "SettleTime")]
        settle_time: f64,
        #[serde(rename = "StarLocked")]
        star_locked: bool,
    },
    /// Resolves at most one pending settle future (§4.6 "Settle contract"):
    /// `status == 0` means settling succeeded.
    SettleDone {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Status")]
        status: i32,
        #[serde(rename = "Error", default)]
        error: String,
        #[serde(rename = "TotalFrames")]
        total_frames: u32,
        #[serde(rename = "DroppedFrames")]
        dropped_frames: u32,
    },
    StarLost {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Frame")]
        frame: u32,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "StarMass")]
        star_mass: f64,
        #[serde(rename = "SNR")]
        snr: f64,
        #[serde(rename = "AvgDist")]
        avg_dist: f64,
        #[serde(rename = "ErrorCode")]
        error_code: i32,
        #[serde(rename = "Status")]
        status: String,
    },
    GuidingStopped {
        #[serde(flatten)]
        common: EventCommon,
    },
    GuideStep {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Frame")]
        frame: u32,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "Mount")]
        mount: String,
        dx: f64,
        dy: f64,
        #[serde(rename = "RADistanceRaw")]
        ra_distance_raw: f64,
        #[serde(rename = "DECDistanceRaw")]
        dec_distance_raw: f64,
        #[serde(rename = "RADuration", default)]
        ra_duration: Option<f64>,
        #[serde(rename = "DECDuration", default)]
        dec_duration: Option<f64>,
        #[serde(rename = "StarMass")]
        star_mass: f64,
        #[serde(rename = "SNR")]
        snr: f64,
    },
    GuidingDithered {
        #[serde(flatten)]
        common: EventCommon,
        dx: f64,
        dy: f64,
    },
    LockPositionLost {
        #[serde(flatten)]
        common: EventCommon,
    },
    LockPositionShiftLimitReached {
        #[serde(flatten)]
        common: EventCommon,
    },
    Alert {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Msg")]
        msg: String,
        #[serde(rename = "Type")]
        alert_type: String,
    },
    GuideParamChange {
        #[serde(flatten)]
        common: EventCommon,
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Value")]
        value: String,
    },
    ConfigurationChange {
        #[serde(flatten)]
        common: EventCommon,
    },
    #[serde(other)]
    Generic,
}

impl Event {
    /// Whether this event, per §4.8.2's terminal-transition rule, should be
    /// treated as moving the guider into `Guiding`.
    #[must_use]
    pub const fn is_guiding_resumed(&self) -> bool {
        matches!(self, Self::StartGuiding { .. } | Self::Resumed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_event_parses() {
        let line = r#"{"Event":"AppState","Timestamp":1.0,"Host":"h","Inst":1,"State":"Guiding"}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert!(matches!(
            event,
            Event::AppState {
                state: AppState::Guiding,
                ..
            }
        ));
    }

    #[test]
    fn settle_done_parses_failure() {
        let line = r#"{"Event":"SettleDone","Timestamp":1.0,"Host":"h","Inst":1,"Status":1,"Error":"Star lost","TotalFrames":10,"DroppedFrames":3}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        match event {
            Event::SettleDone { status, error, .. } => {
                assert_eq!(status, 1);
                assert_eq!(error, "Star lost");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_event_falls_back_to_generic() {
        let line = r#"{"Event":"SomeFutureEvent","Timestamp":1.0}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert!(matches!(event, Event::Generic));
    }
}
