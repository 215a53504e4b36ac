//! 4.D Classifier — fixed rule cascade with explicit precedence, never
//! failing (fallback to `HumVoiced` guarantees totality).
//!
//! Thresholds are grounded on nothing in the teacher (its classifier is a
//! numeric-feature library, not a rule engine) and instead follow the
//! distilled numbers directly; the calibration-multiplier plumbing reuses
//! `calibration.rs`, grounded on the teacher's threshold-as-data style in
//! `fingerprint_compute.rs`.

use crate::calibration::CalibrationProfile;
use crate::model::{EventClass, FeatureVector};

const LOW_BAND_THRESHOLD: f64 = 0.55;
const BILABIAL_CENTROID_MAX_HZ: f64 = 700.0;
const BILABIAL_PEAK_MIN: f64 = 0.15;

const HIHAT_HIGH_BAND_THRESHOLD: f64 = 0.45;
const HIHAT_ZCR_MIN: f64 = 0.30;

const CLICK_MID_BAND_THRESHOLD: f64 = 0.40;
const CLICK_ZCR_MIN: f64 = 0.08;
const CLICK_ZCR_MAX: f64 = 0.30;
const CLICK_CENTROID_MIN_HZ: f64 = 700.0;
const CLICK_CENTROID_MAX_HZ: f64 = 3500.0;

const HUM_ZCR_MAX: f64 = 0.05;
const HUM_LOW_MID_SUM_MIN: f64 = 0.7;

const CONFIDENCE_MIN: f64 = 0.5;
const CONFIDENCE_MAX: f64 = 0.99;

pub fn classify(features: &FeatureVector, calibration: &CalibrationProfile) -> (EventClass, f64) {
    let bilabial_low = LOW_BAND_THRESHOLD * calibration.multiplier_for(EventClass::BilabialPlosive);
    let bilabial_peak = BILABIAL_PEAK_MIN * calibration.multiplier_for(EventClass::BilabialPlosive);
    if features.low_band_energy >= bilabial_low
        && features.spectral_centroid < BILABIAL_CENTROID_MAX_HZ
        && features.peak_amplitude >= bilabial_peak
    {
        let distance = (features.low_band_energy - bilabial_low) / bilabial_low.max(1e-9);
        return (EventClass::BilabialPlosive, clamp_confidence(distance));
    }

    let hihat_high = HIHAT_HIGH_BAND_THRESHOLD * calibration.multiplier_for(EventClass::HihatNoise);
    let hihat_zcr = HIHAT_ZCR_MIN * calibration.multiplier_for(EventClass::HihatNoise);
    if features.high_band_energy >= hihat_high && features.zcr >= hihat_zcr {
        let distance = (features.high_band_energy - hihat_high) / hihat_high.max(1e-9);
        return (EventClass::HihatNoise, clamp_confidence(distance));
    }

    let click_mid = CLICK_MID_BAND_THRESHOLD * calibration.multiplier_for(EventClass::Click);
    if features.mid_band_energy >= click_mid
        && features.zcr >= CLICK_ZCR_MIN
        && features.zcr <= CLICK_ZCR_MAX
        && features.spectral_centroid >= CLICK_CENTROID_MIN_HZ
        && features.spectral_centroid <= CLICK_CENTROID_MAX_HZ
    {
        let distance = (features.mid_band_energy - click_mid) / click_mid.max(1e-9);
        return (EventClass::Click, clamp_confidence(distance));
    }

    if features.zcr < HUM_ZCR_MAX
        && features.low_band_energy + features.mid_band_energy >= HUM_LOW_MID_SUM_MIN
    {
        return (EventClass::HumVoiced, fallback_confidence(features.zcr));
    }

    // Unconditional fallback: guarantees every event receives a class.
    (EventClass::HumVoiced, fallback_confidence(features.zcr))
}

fn clamp_confidence(distance: f64) -> f64 {
    (CONFIDENCE_MIN + distance.abs().min(1.0) * (CONFIDENCE_MAX - CONFIDENCE_MIN))
        .clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

fn fallback_confidence(zcr: f64) -> f64 {
    (1.0 - zcr * 2.0).max(0.3)
}
