//! Braiding: fuse a small set of sigils into one composite record.
//!
//! Pipeline, all pure functions of the participant set:
//! relation detection → pattern fusion → fusion score → emergent
//! properties → classification → complexity → resonance → stability.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BraidConfig;
use crate::constants::{FUSION_SATURATION, PATTERN_DIM, TAG_RICHNESS_NORM};
use crate::encoder::text_hash;
use crate::error::{Result, SigilError};
use crate::recognizer::similarity;
use crate::sigil::{Category, Pattern, Sigil, SigilTags, SourceKind};
use crate::time::now_unix_millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Time-adjacent sigils inside the temporal window.
    Temporal,
    /// One sigil names another as its trigger.
    Causal,
    /// Highly similar patterns.
    Resonant,
    /// Several sigils share a category.
    Symbolic,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Causal => "causal",
            Self::Resonant => "resonant",
            Self::Symbolic => "symbolic",
        }
    }
}

/// Auxiliary relation data and emergent property values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmergentValue {
    Number(f64),
    List(Vec<String>),
}

pub type Emergent = BTreeMap<String, EmergentValue>;

/// One detected relation among braid participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRelation {
    pub kind: RelationKind,
    /// For causal relations: `[cause, effect]`.
    pub participants: Vec<Uuid>,
    pub strength: f64,
    #[serde(default)]
    pub data: Emergent,
}

/// Fused composite of two or more sigils. Created once, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraidResult {
    pub id: Uuid,
    pub created_at: u64,
    pub participant_ids: Vec<Uuid>,
    pub participant_labels: Vec<String>,
    pub combined_pattern: Pattern,
    pub relations: Vec<PatternRelation>,
    pub fusion_score: f64,
    pub emergent: Emergent,
    /// Dominant source kind of the participants.
    pub classification: SourceKind,
    /// Dominant category of the participants.
    pub category: Category,
    pub complexity: f64,
    pub resonance: f64,
    pub stability: f64,
}

impl BraidResult {
    pub fn count_relations(&self, kind: RelationKind) -> usize {
        self.relations.iter().filter(|r| r.kind == kind).count()
    }

    /// Re-express the braid as a composite sigil so it can take part in
    /// search, clustering and further braids. Strength is the fusion score.
    pub fn to_composite_sigil(&self) -> Sigil {
        let key = self
            .participant_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let tags = SigilTags {
            label: Some(format!("braid {}", &self.id.simple().to_string()[..8])),
            linked_entity_id: Some(self.id.to_string()),
            ..Default::default()
        };
        Sigil::new(
            self.combined_pattern.clone(),
            self.category,
            SourceKind::Composite,
            self.fusion_score,
            text_hash(&key),
        )
        .with_tags(tags)
        .with_created_at(self.created_at)
    }
}

/// Fuses sigils into [`BraidResult`]s.
#[derive(Clone, Debug, Default)]
pub struct Braider {
    config: BraidConfig,
}

impl Braider {
    pub fn new(config: BraidConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BraidConfig {
        &self.config
    }

    /// Fuse the participants. Repeated ids count once; fewer than two
    /// distinct participants is an error.
    pub fn braid<'a>(&self, sigils: impl IntoIterator<Item = &'a Sigil>) -> Result<BraidResult> {
        let participants = distinct(sigils);
        if participants.len() < 2 {
            return Err(SigilError::InsufficientParticipants {
                count: participants.len(),
            });
        }

        let relations = self.detect_relations(&participants);
        let combined_pattern = combine_patterns(&participants);
        let fusion_score = self.fusion_score(&participants, &relations);
        let emergent = emergent_properties(&participants, &relations);
        let classification = SourceKind::majority(participants.iter().map(|s| s.source_kind()))
            .unwrap_or(SourceKind::Composite);
        let category = Category::majority(participants.iter().map(|s| s.category()))
            .unwrap_or(Category::Integration);

        Ok(BraidResult {
            id: Uuid::new_v4(),
            created_at: now_unix_millis(),
            participant_ids: participants.iter().map(|s| s.id()).collect(),
            participant_labels: participants.iter().map(|s| s.display_label()).collect(),
            combined_pattern,
            fusion_score,
            emergent,
            classification,
            category,
            complexity: complexity(&participants),
            resonance: resonance(&participants),
            stability: stability(&relations),
            relations,
        })
    }

    /// Relation detection alone, in detector order: temporal, causal,
    /// resonant, symbolic.
    pub fn analyze_braid_pattern<'a>(
        &self,
        sigils: impl IntoIterator<Item = &'a Sigil>,
    ) -> Vec<PatternRelation> {
        self.detect_relations(&distinct(sigils))
    }

    fn detect_relations(&self, sigils: &[&Sigil]) -> Vec<PatternRelation> {
        let mut relations = self.temporal_relations(sigils);
        relations.extend(self.causal_relations(sigils));
        relations.extend(self.resonant_relations(sigils));
        relations.extend(self.symbolic_relations(sigils));
        relations
    }

    fn temporal_relations(&self, sigils: &[&Sigil]) -> Vec<PatternRelation> {
        let window = self.config.temporal_window_ms;
        if window == 0 {
            return Vec::new();
        }
        let mut ordered = sigils.to_vec();
        ordered.sort_by_key(|s| s.created_at());

        ordered
            .windows(2)
            .filter_map(|pair| {
                let gap = pair[1].created_at() - pair[0].created_at();
                (gap < window).then(|| PatternRelation {
                    kind: RelationKind::Temporal,
                    participants: vec![pair[0].id(), pair[1].id()],
                    strength: 1.0 - gap as f64 / window as f64,
                    data: BTreeMap::from([(
                        "gapMs".to_string(),
                        EmergentValue::Number(gap as f64),
                    )]),
                })
            })
            .collect()
    }

    fn causal_relations(&self, sigils: &[&Sigil]) -> Vec<PatternRelation> {
        let present: HashSet<Uuid> = sigils.iter().map(|s| s.id()).collect();
        sigils
            .iter()
            .filter_map(|effect| {
                let cause = effect.tags().triggered_by?;
                if cause == effect.id() || !present.contains(&cause) {
                    return None;
                }
                Some(PatternRelation {
                    kind: RelationKind::Causal,
                    participants: vec![cause, effect.id()],
                    strength: self.config.causal_strength,
                    data: BTreeMap::from([(
                        "causalChain".to_string(),
                        EmergentValue::List(vec![format!("{cause}->{}", effect.id())]),
                    )]),
                })
            })
            .collect()
    }

    fn resonant_relations(&self, sigils: &[&Sigil]) -> Vec<PatternRelation> {
        let mut relations = Vec::new();
        for (i, a) in sigils.iter().enumerate() {
            for b in &sigils[i + 1..] {
                let sim = similarity(a.pattern(), b.pattern());
                if sim > self.config.resonance_threshold {
                    relations.push(PatternRelation {
                        kind: RelationKind::Resonant,
                        participants: vec![a.id(), b.id()],
                        strength: sim,
                        data: BTreeMap::from([(
                            "resonance".to_string(),
                            EmergentValue::Number(sim),
                        )]),
                    });
                }
            }
        }
        relations
    }

    fn symbolic_relations(&self, sigils: &[&Sigil]) -> Vec<PatternRelation> {
        let total = sigils.len() as f64;
        Category::ALL
            .into_iter()
            .filter_map(|category| {
                let members: Vec<Uuid> = sigils
                    .iter()
                    .filter(|s| s.category() == category)
                    .map(|s| s.id())
                    .collect();
                if members.len() < self.config.symbolic_min_group {
                    return None;
                }
                let weight = members.len() as f64 / total;
                Some(PatternRelation {
                    kind: RelationKind::Symbolic,
                    participants: members,
                    strength: weight,
                    data: BTreeMap::from([
                        (
                            "sharedCategories".to_string(),
                            EmergentValue::List(vec![category.as_str().to_string()]),
                        ),
                        ("symbolicWeight".to_string(), EmergentValue::Number(weight)),
                    ]),
                })
            })
            .collect()
    }

    /// `0.5 * mean relation strength + 0.3 * min(1, n / 5) + 0.2 * temporal decay`.
    fn fusion_score(&self, sigils: &[&Sigil], relations: &[PatternRelation]) -> f64 {
        let relation_term = mean(relations.iter().map(|r| r.strength)).unwrap_or(0.0);
        let size_term = (sigils.len() as f64 / FUSION_SATURATION as f64).min(1.0);

        let horizon = self.config.decay_horizon_ms.max(1) as f64;
        let decay = (1.0 - time_span(sigils) as f64 / horizon).max(self.config.temporal_decay_floor);

        (0.5 * relation_term + 0.3 * size_term + 0.2 * decay).clamp(0.0, 1.0)
    }
}

/// First occurrence of each id, in input order.
fn distinct<'a>(sigils: impl IntoIterator<Item = &'a Sigil>) -> Vec<&'a Sigil> {
    let mut seen = HashSet::new();
    sigils.into_iter().filter(|s| seen.insert(s.id())).collect()
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn variance(values: &[f64]) -> f64 {
    match mean(values.iter().copied()) {
        Some(m) => values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64,
        None => 0.0,
    }
}

fn time_span(sigils: &[&Sigil]) -> u64 {
    let times = sigils.iter().map(|s| s.created_at());
    match (times.clone().min(), times.max()) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => 0,
    }
}

/// Strength-weighted mean pattern; equal weights when every strength is 0.
fn combine_patterns(sigils: &[&Sigil]) -> Pattern {
    let total: f64 = sigils.iter().map(|s| s.effective_strength()).sum();
    if total <= 0.0 {
        return Pattern::mean(sigils.iter().map(|s| s.pattern())).unwrap_or_else(Pattern::zeros);
    }
    Pattern::weighted_sum(
        sigils
            .iter()
            .map(|s| (s.pattern(), s.effective_strength() / total)),
    )
}

/// Numeric keys averaged over every relation that carries them, list keys
/// concatenated, then the fixed summary fields on top.
fn emergent_properties(sigils: &[&Sigil], relations: &[PatternRelation]) -> Emergent {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    let mut lists: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for relation in relations {
        for (key, value) in &relation.data {
            match value {
                EmergentValue::Number(v) => {
                    let entry = sums.entry(key).or_insert((0.0, 0));
                    entry.0 += v;
                    entry.1 += 1;
                }
                EmergentValue::List(items) => {
                    lists.entry(key).or_default().extend(items.iter().cloned());
                }
            }
        }
    }

    let mut emergent: Emergent = sums
        .into_iter()
        .map(|(k, (sum, n))| (k.to_string(), EmergentValue::Number(sum / n as f64)))
        .collect();
    emergent.extend(
        lists
            .into_iter()
            .map(|(k, items)| (k.to_string(), EmergentValue::List(items))),
    );

    let mut categories: Vec<Category> = sigils.iter().map(|s| s.category()).collect();
    categories.sort();
    categories.dedup();
    let mut kinds: Vec<SourceKind> = sigils.iter().map(|s| s.source_kind()).collect();
    kinds.sort();
    kinds.dedup();

    emergent.insert(
        "participantCount".to_string(),
        EmergentValue::Number(sigils.len() as f64),
    );
    emergent.insert(
        "categories".to_string(),
        EmergentValue::List(categories.iter().map(|c| c.as_str().to_string()).collect()),
    );
    emergent.insert(
        "sourceKinds".to_string(),
        EmergentValue::List(kinds.iter().map(|k| k.as_str().to_string()).collect()),
    );
    emergent.insert(
        "temporalSpanMs".to_string(),
        EmergentValue::Number(time_span(sigils) as f64),
    );
    emergent.insert(
        "meanStrength".to_string(),
        EmergentValue::Number(mean(sigils.iter().map(|s| s.strength())).unwrap_or(0.0)),
    );
    emergent
}

/// `0.7 * mean per-dimension variance + 0.3 * mean tag richness / 20`, clamped.
fn complexity(sigils: &[&Sigil]) -> f64 {
    let mean_variance = (0..PATTERN_DIM)
        .map(|d| {
            let column: Vec<f64> = sigils.iter().map(|s| s.pattern()[d]).collect();
            variance(&column)
        })
        .sum::<f64>()
        / PATTERN_DIM as f64;
    let richness = mean(sigils.iter().map(|s| s.tags().populated() as f64)).unwrap_or(0.0)
        / TAG_RICHNESS_NORM;

    (0.7 * mean_variance + 0.3 * richness).clamp(0.0, 1.0)
}

/// Mean pairwise similarity, clamped to [0, 1]. A lone pair has nothing to
/// resonate against and scores 0.
fn resonance(sigils: &[&Sigil]) -> f64 {
    let pairs: Vec<f64> = sigils
        .iter()
        .enumerate()
        .flat_map(|(i, a)| {
            sigils[i + 1..]
                .iter()
                .map(move |b| similarity(a.pattern(), b.pattern()))
        })
        .collect();
    if pairs.len() < 2 {
        return 0.0;
    }
    mean(pairs).unwrap_or(0.0).clamp(0.0, 1.0)
}

/// `1 - variance(relation strengths)`, floored at 0; 0 without relations.
fn stability(relations: &[PatternRelation]) -> f64 {
    if relations.is_empty() {
        return 0.0;
    }
    let strengths: Vec<f64> = relations.iter().map(|r| r.strength).collect();
    (1.0 - variance(&strengths)).max(0.0)
}
