/// Dimensionality of every sigil pattern.
pub const PATTERN_DIM: usize = 64;

/// Multiplier of the rolling text hash (`hash * 31 + code`).
pub const HASH_MULTIPLIER: i32 = 31;

/// Amplitude of the sine recurrence: `s = sin(s) * SINE_SCALE`.
pub const SINE_SCALE: f64 = 10_000.0;

/// Lowest strength a text sigil can carry (`0.5 + draw * 0.5`).
pub const STRENGTH_FLOOR: f64 = 0.5;

/// Default minimum cosine similarity for `find_similar`.
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Upper bound on the default cluster count.
pub const MAX_DEFAULT_CLUSTERS: usize = 10;

/// Sigils per cluster used to derive the default cluster count.
pub const SIGILS_PER_CLUSTER: usize = 5;

/// k-means iteration cap.
pub const MAX_CLUSTER_ITERATIONS: usize = 50;

/// Fixed seed for centroid initialization so clustering is reproducible.
pub const CLUSTER_SEED: u64 = 0x5167_4a1d;

/// Number of equal windows in a temporal flow summary.
pub const FLOW_WINDOWS: usize = 5;

/// Temporal relation window: 5 minutes in milliseconds.
pub const TEMPORAL_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Fixed strength of a causal (`triggered_by`) relation.
pub const CAUSAL_STRENGTH: f64 = 0.9;

/// Similarity a pair must exceed to resonate.
pub const RESONANCE_THRESHOLD: f64 = 0.8;

/// Smallest same-category group that forms a symbolic relation.
pub const SYMBOLIC_MIN_GROUP: usize = 3;

/// One day in milliseconds, the horizon of temporal decay.
pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Floor of the temporal decay term in the fusion score.
pub const TEMPORAL_DECAY_FLOOR: f64 = 0.1;

/// Participant count at which the fusion size term saturates.
pub const FUSION_SATURATION: usize = 5;

/// Tag richness normalizer for braid complexity.
pub const TAG_RICHNESS_NORM: f64 = 20.0;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-12;
