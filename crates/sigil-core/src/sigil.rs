use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::PATTERN_DIM;
use crate::error::{Result, SigilError};
use crate::time::now_unix_millis;

/// Fixed-length numeric fingerprint.
///
/// Text-derived values lie in [0, 1); snapshot-derived values are normalized
/// scalars that typically stay within [-1, 1]. Serialized as a plain array;
/// any other length is rejected on the way in.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern([f64; PATTERN_DIM]);

impl Pattern {
    pub fn zeros() -> Self {
        Self([0.0; PATTERN_DIM])
    }

    pub fn new(values: [f64; PATTERN_DIM]) -> Self {
        Self(values)
    }

    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let array: [f64; PATTERN_DIM] =
            values.try_into().map_err(|_| SigilError::PatternLength {
                expected: PATTERN_DIM,
                got: values.len(),
            })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    pub fn dot(&self, other: &Pattern) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Per-dimension weighted sum. Weights are used as given; callers normalize.
    pub fn weighted_sum<'a>(terms: impl IntoIterator<Item = (&'a Pattern, f64)>) -> Self {
        let mut out = [0.0; PATTERN_DIM];
        for (pattern, weight) in terms {
            for (acc, v) in out.iter_mut().zip(pattern.0.iter()) {
                *acc += v * weight;
            }
        }
        Self(out)
    }

    /// Arithmetic mean of the given patterns. None when the input is empty.
    pub fn mean<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) -> Option<Self> {
        let mut out = [0.0; PATTERN_DIM];
        let mut n = 0usize;
        for pattern in patterns {
            for (acc, v) in out.iter_mut().zip(pattern.0.iter()) {
                *acc += v;
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        for v in &mut out {
            *v /= n as f64;
        }
        Some(Self(out))
    }
}

impl Index<usize> for Pattern {
    type Output = f64;

    fn index(&self, idx: usize) -> &f64 {
        &self.0[idx]
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<f64>::deserialize(deserializer)?;
        Pattern::from_slice(&values)
            .map_err(|_| D::Error::invalid_length(values.len(), &"64 pattern dimensions"))
    }
}

/// Closed grouping label used to partition and color sigils.
///
/// The names echo brain regions but carry no biological meaning; the
/// category is a pure function of the origin hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cortical,
    Limbic,
    Brainstem,
    Thalamic,
    BasalGanglia,
    Cerebellar,
    Integration,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Cortical,
        Category::Limbic,
        Category::Brainstem,
        Category::Thalamic,
        Category::BasalGanglia,
        Category::Cerebellar,
        Category::Integration,
    ];

    /// Category for an origin hash: `ALL[|hash| mod 7]`.
    pub fn from_hash(hash: i32) -> Self {
        Self::ALL[hash.unsigned_abs() as usize % Self::ALL.len()]
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cortical => "cortical",
            Self::Limbic => "limbic",
            Self::Brainstem => "brainstem",
            Self::Thalamic => "thalamic",
            Self::BasalGanglia => "basal_ganglia",
            Self::Cerebellar => "cerebellar",
            Self::Integration => "integration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Most frequent category; ties go to the lowest ordinal.
    pub fn majority(categories: impl IntoIterator<Item = Category>) -> Option<Self> {
        let mut histogram = [0usize; 7];
        for c in categories {
            histogram[c.ordinal()] += 1;
        }
        majority_ordinal(&histogram).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a sigil.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Dream,
    Meditation,
    Breath,
    Composite,
    Consciousness,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Dream,
        SourceKind::Meditation,
        SourceKind::Breath,
        SourceKind::Composite,
        SourceKind::Consciousness,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dream => "dream",
            Self::Meditation => "meditation",
            Self::Breath => "breath",
            Self::Composite => "composite",
            Self::Consciousness => "consciousness",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Most frequent kind; ties go to the lowest ordinal.
    pub fn majority(kinds: impl IntoIterator<Item = SourceKind>) -> Option<Self> {
        let mut histogram = [0usize; 5];
        for k in kinds {
            histogram[k.ordinal()] += 1;
        }
        majority_ordinal(&histogram).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of the largest non-zero bucket, lowest index on ties.
fn majority_ordinal(histogram: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &count) in histogram.iter().enumerate() {
        if count == 0 {
            continue;
        }
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((i, count)),
        }
    }
    best.map(|(i, _)| i)
}

/// Caller-supplied context attached to a sigil.
///
/// The named fields are the ones the engine reads; `extra` holds anything
/// else the caller wants to carry along.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigilTags {
    /// Predecessor sigil that caused this one (causal braid relation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<Uuid>,
    /// External entity (dream, session, journal entry) this sigil came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Replaces the derived strength when weighting braid participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength_override: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SigilTags {
    /// Number of populated keys (tag richness).
    pub fn populated(&self) -> usize {
        usize::from(self.triggered_by.is_some())
            + usize::from(self.linked_entity_id.is_some())
            + usize::from(self.session_id.is_some())
            + usize::from(self.label.is_some())
            + usize::from(self.strength_override.is_some())
            + self.extra.len()
    }
}

/// Everything needed to rebuild a sigil from storage or the wire.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigilParts {
    pub id: Uuid,
    pub pattern: Pattern,
    pub category: Category,
    pub source_kind: SourceKind,
    pub strength: f64,
    pub created_at: u64,
    pub origin_hash: i32,
    #[serde(default)]
    pub tags: SigilTags,
}

/// Deterministic fingerprint of one experiential input.
///
/// Immutable once built: `pattern`, `category`, `strength` and `origin_hash`
/// have no setters. The `with_*` builders consume the value and are meant for
/// use before the sigil is handed to an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SigilParts")]
pub struct Sigil {
    id: Uuid,
    pattern: Pattern,
    category: Category,
    source_kind: SourceKind,
    strength: f64,
    created_at: u64,
    origin_hash: i32,
    tags: SigilTags,
}

impl From<SigilParts> for Sigil {
    fn from(parts: SigilParts) -> Self {
        Self::from_parts(parts)
    }
}

impl Sigil {
    pub fn new(
        pattern: Pattern,
        category: Category,
        source_kind: SourceKind,
        strength: f64,
        origin_hash: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern,
            category,
            source_kind,
            strength: strength.clamp(0.0, 1.0),
            created_at: now_unix_millis(),
            origin_hash,
            tags: SigilTags::default(),
        }
    }

    pub fn from_parts(parts: SigilParts) -> Self {
        Self {
            id: parts.id,
            pattern: parts.pattern,
            category: parts.category,
            source_kind: parts.source_kind,
            strength: parts.strength.clamp(0.0, 1.0),
            created_at: parts.created_at,
            origin_hash: parts.origin_hash,
            tags: parts.tags,
        }
    }

    pub fn with_tags(mut self, tags: SigilTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn origin_hash(&self) -> i32 {
        self.origin_hash
    }

    pub fn tags(&self) -> &SigilTags {
        &self.tags
    }

    /// Strength used for weighting: the tag override when present, clamped to [0, 1].
    pub fn effective_strength(&self) -> f64 {
        self.tags
            .strength_override
            .filter(|s| s.is_finite())
            .unwrap_or(self.strength)
            .clamp(0.0, 1.0)
    }

    /// Short human label: the `label` tag, or the first 8 hex digits of the id.
    pub fn display_label(&self) -> String {
        match &self.tags.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.id.simple().to_string()[..8].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_rejects_wrong_length() {
        let err = Pattern::from_slice(&[0.5; 10]).unwrap_err();
        assert_eq!(
            err,
            SigilError::PatternLength {
                expected: PATTERN_DIM,
                got: 10
            }
        );
        assert!(Pattern::from_slice(&[0.5; PATTERN_DIM]).is_ok());
    }

    #[test]
    fn test_pattern_serde_enforces_length() {
        let json = serde_json::to_string(&Pattern::zeros()).unwrap();
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Pattern::zeros());

        let short = serde_json::from_str::<Pattern>("[1.0, 2.0]");
        assert!(short.is_err());
    }

    #[test]
    fn test_pattern_mean_and_weighted_sum() {
        let a = Pattern::new([1.0; PATTERN_DIM]);
        let b = Pattern::new([3.0; PATTERN_DIM]);
        let mean = Pattern::mean([&a, &b]).unwrap();
        assert!((mean[0] - 2.0).abs() < 1e-12);
        assert!(Pattern::mean(std::iter::empty()).is_none());

        let ws = Pattern::weighted_sum([(&a, 0.25), (&b, 0.75)]);
        assert!((ws[63] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_category_from_hash_handles_negative() {
        assert_eq!(Category::from_hash(0), Category::Cortical);
        assert_eq!(Category::from_hash(8), Category::Limbic);
        assert_eq!(Category::from_hash(-8), Category::Limbic);
        assert_eq!(Category::from_hash(i32::MIN), Category::ALL[2147483648 % 7]);
    }

    #[test]
    fn test_majority_lowest_ordinal_wins_ties() {
        let kind = SourceKind::majority([SourceKind::Breath, SourceKind::Dream]);
        assert_eq!(kind, Some(SourceKind::Dream));

        let kind = SourceKind::majority([
            SourceKind::Breath,
            SourceKind::Breath,
            SourceKind::Dream,
        ]);
        assert_eq!(kind, Some(SourceKind::Breath));

        assert_eq!(Category::majority(std::iter::empty()), None);
    }

    #[test]
    fn test_label_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::parse(c.as_str()), Some(c));
        }
        for k in SourceKind::ALL {
            assert_eq!(SourceKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(SourceKind::parse("nightmare"), None);
    }

    #[test]
    fn test_tag_richness() {
        let mut tags = SigilTags::default();
        assert_eq!(tags.populated(), 0);
        tags.label = Some("lucid".into());
        tags.triggered_by = Some(Uuid::new_v4());
        tags.extra.insert("mood".into(), "calm".into());
        assert_eq!(tags.populated(), 3);
    }

    #[test]
    fn test_effective_strength_override() {
        let sigil = Sigil::new(Pattern::zeros(), Category::Limbic, SourceKind::Dream, 0.7, 1);
        assert!((sigil.effective_strength() - 0.7).abs() < 1e-12);

        let tags = SigilTags {
            strength_override: Some(1.4),
            ..Default::default()
        };
        let sigil = sigil.with_tags(tags);
        assert!((sigil.effective_strength() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sigil_serde_camel_case() {
        let sigil = Sigil::new(Pattern::zeros(), Category::Thalamic, SourceKind::Breath, 0.6, -42);
        let json = serde_json::to_value(&sigil).unwrap();
        assert_eq!(json["sourceKind"], "breath");
        assert_eq!(json["originHash"], -42);
        assert_eq!(json["category"], "thalamic");
        let back: Sigil = serde_json::from_value(json).unwrap();
        assert_eq!(back, sigil);
    }

    #[test]
    fn test_deserialize_clamps_strength() {
        let sigil = Sigil::new(Pattern::zeros(), Category::Cortical, SourceKind::Dream, 0.6, 7);
        let mut json = serde_json::to_value(&sigil).unwrap();
        json["strength"] = serde_json::json!(7.5);
        let back: Sigil = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back.strength(), 1.0);

        json["strength"] = serde_json::json!(-2.0);
        json.as_object_mut().unwrap().remove("tags");
        let back: Sigil = serde_json::from_value(json).unwrap();
        assert_eq!(back.strength(), 0.0);
        assert_eq!(back.tags(), &SigilTags::default());
    }

    #[test]
    fn test_display_label() {
        let sigil = Sigil::new(Pattern::zeros(), Category::Limbic, SourceKind::Dream, 0.5, 0);
        assert_eq!(sigil.display_label().len(), 8);
        let sigil = sigil.with_tags(SigilTags {
            label: Some("golden light".into()),
            ..Default::default()
        });
        assert_eq!(sigil.display_label(), "golden light");
    }
}
