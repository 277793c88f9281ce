//! Sigil encoding and pattern-fusion engine.
//!
//! Turns free text and physiological snapshots into fixed-length 64-d
//! pattern vectors ("sigils"), indexes them, finds similar ones, clusters
//! them, bins them over time and fuses small sets into composite braids.
//!
//! Zero I/O: a pure math engine with no opinions about transport or persistence.

pub mod braid;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod index;
pub mod recognizer;
pub mod serde_compat;
pub mod sigil;
pub mod snapshot;
pub mod time;

pub use braid::{BraidResult, Braider, Emergent, EmergentValue, PatternRelation, RelationKind};
pub use config::{BraidConfig, EngineConfig, RecognizerConfig};
pub use constants::{EPSILON, PATTERN_DIM, SIMILARITY_THRESHOLD};
pub use encoder::{Encoder, SineRng, derive_from_hash, text_hash};
pub use error::{Result, SigilError};
pub use index::{SharedSigilIndex, SigilIndex};
pub use recognizer::{
    ClusterResult, FlowWindow, PatternCluster, PatternRecognizer, SimilarMatch,
    default_cluster_count, similarity,
};
pub use serde_compat::{CURRENT_VERSION, export_json, import_json};
pub use sigil::{Category, Pattern, Sigil, SigilParts, SigilTags, SourceKind};
pub use snapshot::ConsciousnessSnapshot;
