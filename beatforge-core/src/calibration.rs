//! Calibration profile — an opaque, caller-supplied set of per-class
//! threshold multipliers produced offline (e.g. by averaging labeled
//! feature samples). The core never trains or mutates this; it is read
//! once at entry and treated as immutable for the rest of the run, per §5.

use crate::model::EventClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-class multiplicative bias on classifier thresholds, plus an optional
/// bias on the onset-detector's peak-picking threshold (key `"onset"`).
///
/// Unknown keys are ignored; missing keys default to 1.0 (§9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationProfile {
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: String,
}

impl CalibrationProfile {
    pub fn multiplier_for(&self, class: EventClass) -> f64 {
        self.key_multiplier(class_key(class))
    }

    pub fn onset_multiplier(&self) -> f64 {
        self.key_multiplier("onset")
    }

    fn key_multiplier(&self, key: &str) -> f64 {
        *self.thresholds.get(key).unwrap_or(&1.0)
    }
}

fn class_key(class: EventClass) -> &'static str {
    match class {
        EventClass::BilabialPlosive => "bilabial_plosive",
        EventClass::HihatNoise => "hihat_noise",
        EventClass::Click => "click",
        EventClass::HumVoiced => "hum_voiced",
    }
}
