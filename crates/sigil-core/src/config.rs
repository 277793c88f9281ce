//! Engine tunables. Defaults come from [`crate::constants`]; every field
//! may be omitted when deserializing.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CAUSAL_STRENGTH, CLUSTER_SEED, DAY_MS, FLOW_WINDOWS, MAX_CLUSTER_ITERATIONS,
    RESONANCE_THRESHOLD, SIMILARITY_THRESHOLD, SYMBOLIC_MIN_GROUP, TEMPORAL_DECAY_FLOOR,
    TEMPORAL_WINDOW_MS,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Default threshold for similarity search when the caller gives none.
    pub similarity_threshold: f64,
    pub max_cluster_iterations: usize,
    pub cluster_seed: u64,
    pub flow_windows: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: SIMILARITY_THRESHOLD,
            max_cluster_iterations: MAX_CLUSTER_ITERATIONS,
            cluster_seed: CLUSTER_SEED,
            flow_windows: FLOW_WINDOWS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BraidConfig {
    /// Max gap between time-adjacent sigils for a temporal relation.
    pub temporal_window_ms: u64,
    pub causal_strength: f64,
    /// Pairs must exceed this similarity to resonate.
    pub resonance_threshold: f64,
    /// Smallest same-category group that forms a symbolic relation.
    pub symbolic_min_group: usize,
    /// Span over which temporal decay falls from 1 to its floor.
    pub decay_horizon_ms: u64,
    pub temporal_decay_floor: f64,
}

impl Default for BraidConfig {
    fn default() -> Self {
        Self {
            temporal_window_ms: TEMPORAL_WINDOW_MS,
            causal_strength: CAUSAL_STRENGTH,
            resonance_threshold: RESONANCE_THRESHOLD,
            symbolic_min_group: SYMBOLIC_MIN_GROUP,
            decay_horizon_ms: DAY_MS,
            temporal_decay_floor: TEMPORAL_DECAY_FLOOR,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recognizer: RecognizerConfig,
    pub braid: BraidConfig,
}
