//! Biometric / breath snapshot packing.
//!
//! Layout contract of the packed 64-d vector (callers decode by position):
//!
//! | slot | field                     | stored as          | default  |
//! |------|---------------------------|--------------------|----------|
//! | 0    | `heart_rate` (bpm)        | `heart_rate / 100` | 70 bpm   |
//! | 1    | `alpha` band power        | raw                | 0.2      |
//! | 2    | `beta` band power         | raw                | 0.2      |
//! | 3    | `theta` band power        | raw                | 0.2      |
//! | 4    | `delta` band power        | raw                | 0.2      |
//! | 5    | `gamma` band power        | raw                | 0.2      |
//! | 6    | `breathing_rate` (/min)   | `rate / 20`        | 12 /min  |
//! | 7    | `skin_conductance`        | raw                | 0.5      |
//! | 8    | `breath_phase_alignment`  | raw                | 0.5      |
//! | 9    | `breath_rhythm_alignment` | raw                | 0.5      |
//! | 10   | `coherence`               | raw                | 0.5      |
//! | 11   | `depth`                   | raw                | 0.5      |
//! | 12.. | `extra` values in order   | raw, truncated     | 0.0      |
//!
//! Missing or non-finite fields take their default; packing never fails.
//! Unpacking recovers slots 0-11 only.

use serde::{Deserialize, Serialize};

use crate::constants::PATTERN_DIM;
use crate::sigil::Pattern;

pub const HEART_RATE_SCALE: f64 = 100.0;
pub const BREATHING_RATE_SCALE: f64 = 20.0;

/// Number of named leading slots.
pub const PACKED_FIELDS: usize = 12;

const DEFAULT_HEART_RATE: f64 = 70.0;
const DEFAULT_BAND_POWER: f64 = 0.2;
const DEFAULT_BREATHING_RATE: f64 = 12.0;
const DEFAULT_UNIT: f64 = 0.5;

/// One biometric/breath/emotional sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsciousnessSnapshot {
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub gamma: Option<f64>,
    #[serde(default)]
    pub breathing_rate: Option<f64>,
    #[serde(default)]
    pub skin_conductance: Option<f64>,
    #[serde(default)]
    pub breath_phase_alignment: Option<f64>,
    #[serde(default)]
    pub breath_rhythm_alignment: Option<f64>,
    #[serde(default)]
    pub coherence: Option<f64>,
    #[serde(default)]
    pub depth: Option<f64>,
    /// Additional scalars packed after the named slots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<f64>,
}

fn or_default(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Pack a snapshot into the leading slots of a zero-padded pattern.
pub fn pack(snapshot: &ConsciousnessSnapshot) -> Pattern {
    let leading: [f64; PACKED_FIELDS] = [
        or_default(snapshot.heart_rate, DEFAULT_HEART_RATE) / HEART_RATE_SCALE,
        or_default(snapshot.alpha, DEFAULT_BAND_POWER),
        or_default(snapshot.beta, DEFAULT_BAND_POWER),
        or_default(snapshot.theta, DEFAULT_BAND_POWER),
        or_default(snapshot.delta, DEFAULT_BAND_POWER),
        or_default(snapshot.gamma, DEFAULT_BAND_POWER),
        or_default(snapshot.breathing_rate, DEFAULT_BREATHING_RATE) / BREATHING_RATE_SCALE,
        or_default(snapshot.skin_conductance, DEFAULT_UNIT),
        or_default(snapshot.breath_phase_alignment, DEFAULT_UNIT),
        or_default(snapshot.breath_rhythm_alignment, DEFAULT_UNIT),
        or_default(snapshot.coherence, DEFAULT_UNIT),
        or_default(snapshot.depth, DEFAULT_UNIT),
    ];

    let mut slots = [0.0; PATTERN_DIM];
    slots[..PACKED_FIELDS].copy_from_slice(&leading);

    let extra = snapshot.extra.iter().map(|v| if v.is_finite() { *v } else { 0.0 });
    for (slot, value) in slots[PACKED_FIELDS..].iter_mut().zip(extra) {
        *slot = value;
    }

    Pattern::new(slots)
}

/// Recover the named leading fields. `extra` is not recoverable and comes back empty.
pub fn unpack(pattern: &Pattern) -> ConsciousnessSnapshot {
    ConsciousnessSnapshot {
        heart_rate: Some(pattern[0] * HEART_RATE_SCALE),
        alpha: Some(pattern[1]),
        beta: Some(pattern[2]),
        theta: Some(pattern[3]),
        delta: Some(pattern[4]),
        gamma: Some(pattern[5]),
        breathing_rate: Some(pattern[6] * BREATHING_RATE_SCALE),
        skin_conductance: Some(pattern[7]),
        breath_phase_alignment: Some(pattern[8]),
        breath_rhythm_alignment: Some(pattern[9]),
        coherence: Some(pattern[10]),
        depth: Some(pattern[11]),
        extra: Vec::new(),
    }
}
