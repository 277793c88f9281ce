use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::index;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RecognizerConfig;
use crate::constants::{EPSILON, MAX_DEFAULT_CLUSTERS, SIGILS_PER_CLUSTER};
use crate::sigil::{Category, Pattern, Sigil, SourceKind};

/// Cosine similarity in [-1, 1]. Zero-magnitude input gives 0, never NaN.
pub fn similarity(a: &Pattern, b: &Pattern) -> f64 {
    let norm = a.magnitude() * b.magnitude();
    if norm < EPSILON {
        return 0.0;
    }
    (a.dot(b) / norm).clamp(-1.0, 1.0)
}

/// One hit of a similarity search, in plain values for downstream consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarMatch {
    pub sigil_id: Uuid,
    pub label: String,
    pub category: Category,
    pub source_kind: SourceKind,
    pub similarity: f64,
}

impl SimilarMatch {
    /// Similarity as a rounded percentage, negatives floored at 0.
    pub fn percent(&self) -> u32 {
        (self.similarity.max(0.0) * 100.0).round() as u32
    }
}

/// Recurring pattern found by one clustering run. Not persisted by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCluster {
    pub id: Uuid,
    pub centroid: Pattern,
    pub members: Vec<Uuid>,
    /// Best member-to-centroid similarity at the final assignment.
    pub strength: f64,
    pub dominant_category: Category,
    pub label: String,
}

impl PatternCluster {
    pub fn contains(&self, id: Uuid) -> bool {
        self.members.contains(&id)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult {
    pub clusters: Vec<PatternCluster>,
    pub iterations: usize,
    pub converged: bool,
}

/// Summary of one time window of a temporal flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowWindow {
    pub index: usize,
    /// Inclusive start, Unix ms.
    pub start: u64,
    /// Exclusive end, Unix ms (inclusive for the last window).
    pub end: u64,
    pub count: usize,
    pub dominant_category: Category,
    pub mean_strength: f64,
}

/// Default cluster count: `max(1, min(10, n / 5))`.
pub fn default_cluster_count(n: usize) -> usize {
    (n / SIGILS_PER_CLUSTER).clamp(1, MAX_DEFAULT_CLUSTERS)
}

/// Similarity search and batch structure discovery over sigil collections.
#[derive(Clone, Debug, Default)]
pub struct PatternRecognizer {
    config: RecognizerConfig,
}

impl PatternRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Every corpus sigil with similarity `>= threshold`, best first, ties in
    /// corpus order.
    ///
    /// Any corpus entry sharing `target`'s id is skipped, so a sigil never
    /// matches itself even when the corpus is the index it came from. The
    /// threshold is clamped to [-1, 1]; NaN falls back to
    /// [`RecognizerConfig::similarity_threshold`].
    pub fn find_similar<'a>(
        &self,
        target: &Sigil,
        corpus: impl IntoIterator<Item = &'a Sigil>,
        threshold: f64,
    ) -> Vec<SimilarMatch> {
        let threshold = if threshold.is_nan() {
            self.config.similarity_threshold
        } else {
            threshold.clamp(-1.0, 1.0)
        };
        let corpus: Vec<&Sigil> = corpus.into_iter().collect();

        let mut matches: Vec<SimilarMatch> = corpus
            .par_iter()
            .filter(|s| s.id() != target.id())
            .filter_map(|s| {
                let sim = similarity(target.pattern(), s.pattern());
                (sim >= threshold).then(|| SimilarMatch {
                    sigil_id: s.id(),
                    label: s.display_label(),
                    category: s.category(),
                    source_kind: s.source_kind(),
                    similarity: sim,
                })
            })
            .collect();

        // stable: equal similarities keep corpus order
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches
    }

    /// Nearest-centroid (k-means) clustering by cosine similarity.
    ///
    /// `k` defaults to [`default_cluster_count`] and is capped at the number
    /// of distinct sigils. Centroids are seeded from a fixed-seed sample of
    /// the input, so identical input gives identical clusters. Empty
    /// clusters are dropped; every input sigil lands in exactly one cluster.
    pub fn cluster<'a>(
        &self,
        sigils: impl IntoIterator<Item = &'a Sigil>,
        k: Option<usize>,
    ) -> ClusterResult {
        let mut seen = HashSet::new();
        let sigils: Vec<&Sigil> = sigils
            .into_iter()
            .filter(|s| seen.insert(s.id()))
            .collect();
        let n = sigils.len();
        if n == 0 {
            return ClusterResult::default();
        }

        let k = k.unwrap_or_else(|| default_cluster_count(n)).clamp(1, n);
        let mut rng = SmallRng::seed_from_u64(self.config.cluster_seed);
        let mut seeds = index::sample(&mut rng, n, k).into_vec();
        seeds.sort_unstable();
        let mut centroids: Vec<Pattern> =
            seeds.iter().map(|&i| sigils[i].pattern().clone()).collect();

        let mut assignment = assign(&sigils, &centroids);
        let mut iterations = 1;
        let mut converged = false;
        while iterations < self.config.max_cluster_iterations.max(1) {
            centroids = recompute_centroids(&sigils, &assignment, centroids);
            let next = assign(&sigils, &centroids);
            iterations += 1;
            if next == assignment {
                converged = true;
                break;
            }
            assignment = next;
        }

        let clusters = (0..centroids.len())
            .filter_map(|c| {
                let members: Vec<&Sigil> = sigils
                    .iter()
                    .zip(&assignment)
                    .filter(|(_, a)| **a == c)
                    .map(|(s, _)| *s)
                    .collect();
                build_cluster(&members)
            })
            .collect();

        ClusterResult {
            clusters,
            iterations,
            converged,
        }
    }

    /// Split the covered time span into equal windows and summarize each
    /// non-empty one. Fewer than 2 sigils gives an empty flow.
    pub fn temporal_flow<'a>(&self, sigils: impl IntoIterator<Item = &'a Sigil>) -> Vec<FlowWindow> {
        let mut sorted: Vec<&Sigil> = sigils.into_iter().collect();
        if sorted.len() < 2 {
            return Vec::new();
        }
        sorted.sort_by_key(|s| s.created_at());

        let windows = self.config.flow_windows.max(1) as u64;
        let first = sorted[0].created_at();
        let span = sorted[sorted.len() - 1].created_at() - first;
        // Widened so `span * windows` cannot overflow near u64::MAX.
        let offset = |i: u64| (u128::from(span) * u128::from(i) / u128::from(windows)) as u64;
        let bound = |i: u64| first + offset(i);

        let mut buckets: Vec<Vec<&Sigil>> = vec![Vec::new(); windows as usize];
        for s in sorted {
            let idx = if span == 0 {
                0
            } else {
                let scaled = u128::from(s.created_at() - first) * u128::from(windows)
                    / u128::from(span);
                (scaled as u64).min(windows - 1)
            };
            buckets[idx as usize].push(s);
        }

        buckets
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .filter_map(|(i, bucket)| {
                let dominant_category = Category::majority(bucket.iter().map(|s| s.category()))?;
                let mean_strength =
                    bucket.iter().map(|s| s.strength()).sum::<f64>() / bucket.len() as f64;
                Some(FlowWindow {
                    index: i,
                    start: bound(i as u64),
                    end: bound(i as u64 + 1),
                    count: bucket.len(),
                    dominant_category,
                    mean_strength,
                })
            })
            .collect()
    }
}

/// Index of the most similar centroid for every sigil; ties go to the lowest index.
fn assign(sigils: &[&Sigil], centroids: &[Pattern]) -> Vec<usize> {
    sigils
        .iter()
        .map(|s| {
            let mut best = 0;
            let mut best_sim = f64::NEG_INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let sim = similarity(s.pattern(), centroid);
                if sim > best_sim {
                    best = c;
                    best_sim = sim;
                }
            }
            best
        })
        .collect()
}

/// Mean pattern per cluster; a cluster that lost all members keeps its old centroid.
fn recompute_centroids(
    sigils: &[&Sigil],
    assignment: &[usize],
    previous: Vec<Pattern>,
) -> Vec<Pattern> {
    previous
        .into_iter()
        .enumerate()
        .map(|(c, old)| {
            let members = sigils
                .iter()
                .zip(assignment)
                .filter(|(_, a)| **a == c)
                .map(|(s, _)| s.pattern());
            Pattern::mean(members).unwrap_or(old)
        })
        .collect()
}

fn build_cluster(members: &[&Sigil]) -> Option<PatternCluster> {
    let centroid = Pattern::mean(members.iter().map(|s| s.pattern()))?;
    let dominant_category = Category::majority(members.iter().map(|s| s.category()))?;
    let strength = members
        .iter()
        .map(|s| similarity(s.pattern(), &centroid))
        .fold(0.0, f64::max);

    Some(PatternCluster {
        id: Uuid::new_v4(),
        label: format!("{dominant_category} pattern ({} sigils)", members.len()),
        members: members.iter().map(|s| s.id()).collect(),
        centroid,
        strength,
        dominant_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PATTERN_DIM;
    use crate::encoder::Encoder;
    use crate::sigil::SigilTags;

    fn sigil_with(values: [f64; PATTERN_DIM]) -> Sigil {
        Sigil::new(Pattern::new(values), Category::Limbic, SourceKind::Dream, 0.8, 0)
    }

    fn axis(i: usize) -> [f64; PATTERN_DIM] {
        let mut v = [0.0; PATTERN_DIM];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_similarity_basic() {
        let a = Pattern::new(axis(0));
        let b = Pattern::new(axis(1));
        assert_eq!(similarity(&a, &b), 0.0);
        assert!((similarity(&a, &a) - 1.0).abs() < 1e-12);

        let mut neg = [0.0; PATTERN_DIM];
        neg[0] = -2.0;
        assert!((similarity(&a, &Pattern::new(neg)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_zero_vector() {
        let z = Pattern::zeros();
        let a = Pattern::new([0.3; PATTERN_DIM]);
        assert_eq!(similarity(&z, &a), 0.0);
        assert_eq!(similarity(&a, &z), 0.0);
        assert_eq!(similarity(&z, &z), 0.0);
    }

    #[test]
    fn test_find_similar_ranked_and_thresholded() {
        let target = sigil_with(axis(0));
        let mut close = axis(0);
        close[1] = 0.2;
        let mut mid = axis(0);
        mid[1] = 1.0;
        let far = axis(2);

        let corpus = vec![
            sigil_with(far),
            sigil_with(mid),
            sigil_with(close),
            target.clone(),
        ];
        let rec = PatternRecognizer::default();
        let hits = rec.find_similar(&target, &corpus, 0.5);

        assert_eq!(hits.len(), 2, "far and self are excluded");
        assert_eq!(hits[0].sigil_id, corpus[2].id());
        assert_eq!(hits[1].sigil_id, corpus[1].id());
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn test_find_similar_ties_keep_insertion_order() {
        let target = sigil_with(axis(0));
        let corpus: Vec<Sigil> = (0..5).map(|_| sigil_with(axis(0))).collect();
        let hits = PatternRecognizer::default().find_similar(&target, &corpus, 0.9);
        let ids: Vec<Uuid> = hits.iter().map(|m| m.sigil_id).collect();
        let expected: Vec<Uuid> = corpus.iter().map(|s| s.id()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_find_similar_threshold_clamped() {
        let target = sigil_with(axis(0));
        let mut opposite = [0.0; PATTERN_DIM];
        opposite[0] = -1.0;
        let corpus = vec![sigil_with(opposite)];
        let rec = PatternRecognizer::default();
        assert_eq!(rec.find_similar(&target, &corpus, -5.0).len(), 1);
        assert!(rec.find_similar(&target, &corpus, 5.0).is_empty());
    }

    #[test]
    fn test_find_similar_empty_corpus() {
        let target = sigil_with(axis(0));
        let hits = PatternRecognizer::default().find_similar(&target, std::iter::empty(), 0.0);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_percent() {
        let m = SimilarMatch {
            sigil_id: Uuid::new_v4(),
            label: "x".into(),
            category: Category::Limbic,
            source_kind: SourceKind::Dream,
            similarity: 0.876,
        };
        assert_eq!(m.percent(), 88);
    }

    #[test]
    fn test_default_cluster_count() {
        assert_eq!(default_cluster_count(0), 1);
        assert_eq!(default_cluster_count(4), 1);
        assert_eq!(default_cluster_count(12), 2);
        assert_eq!(default_cluster_count(500), 10);
    }

    #[test]
    fn test_cluster_separates_orthogonal_groups() {
        let mut sigils = Vec::new();
        for i in 0..5 {
            let mut v = axis(0);
            v[3] = 0.01 * i as f64;
            sigils.push(sigil_with(v));
        }
        for i in 0..5 {
            let mut v = axis(1);
            v[4] = 0.01 * i as f64;
            sigils.push(sigil_with(v));
        }

        let result = PatternRecognizer::default().cluster(&sigils, Some(2));
        assert_eq!(result.clusters.len(), 2);
        assert!(result.converged);
        for cluster in &result.clusters {
            assert_eq!(cluster.members.len(), 5);
            let first_group = sigils[..5].iter().any(|s| cluster.contains(s.id()));
            let second_group = sigils[5..].iter().any(|s| cluster.contains(s.id()));
            assert!(first_group ^ second_group, "cluster mixes groups");
            assert!(cluster.strength > 0.99);
        }
    }

    #[test]
    fn test_cluster_empty_input() {
        let result = PatternRecognizer::default().cluster(std::iter::empty(), None);
        assert!(result.clusters.is_empty());
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_cluster_drops_empty_and_caps_k() {
        let sigils = vec![sigil_with(axis(0)), sigil_with(axis(0))];
        let result = PatternRecognizer::default().cluster(&sigils, Some(10));
        let total: usize = result.clusters.iter().map(|c| c.members.len()).sum();
        assert_eq!(total, 2);
        assert_eq!(result.clusters.len(), 1, "identical patterns share a cluster");
    }

    #[test]
    fn test_cluster_is_reproducible() {
        let enc = Encoder::new();
        let sigils: Vec<Sigil> = (0..30)
            .map(|i| enc.encode_text(&format!("recurring dream {i}"), SourceKind::Dream))
            .collect();
        let rec = PatternRecognizer::default();
        let a = rec.cluster(&sigils, None);
        let b = rec.cluster(&sigils, None);
        let members = |r: &ClusterResult| r.clusters.iter().map(|c| c.members.clone()).collect::<Vec<_>>();
        assert_eq!(members(&a), members(&b));
    }

    #[test]
    fn test_temporal_flow_windows() {
        let base = 1_700_000_000_000u64;
        let minute = 60_000;
        let mut sigils = Vec::new();
        for (offset, category) in [
            (0, Category::Limbic),
            (1, Category::Limbic),
            (2, Category::Cortical),
            (9, Category::Thalamic),
            (10, Category::Cortical),
        ] {
            sigils.push(
                Sigil::new(Pattern::new(axis(0)), category, SourceKind::Breath, 0.6, 0)
                    .with_created_at(base + offset * minute),
            );
        }

        let flow = PatternRecognizer::default().temporal_flow(&sigils);
        // span 10 min / 5 windows: [0,2) [2,4) [4,6) [6,8) [8,10]
        assert_eq!(flow.len(), 3);
        assert_eq!(flow[0].index, 0);
        assert_eq!(flow[0].count, 2);
        assert_eq!(flow[0].dominant_category, Category::Limbic);
        assert_eq!(flow[1].index, 1);
        assert_eq!(flow[1].dominant_category, Category::Cortical);
        assert_eq!(flow[2].index, 4);
        assert_eq!(flow[2].count, 2);
        assert_eq!(flow[2].dominant_category, Category::Cortical, "tie -> lowest ordinal");
        assert_eq!(flow[2].end, base + 10 * minute);
        assert!((flow[0].mean_strength - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_temporal_flow_degenerate() {
        let rec = PatternRecognizer::default();
        let one = vec![sigil_with(axis(0))];
        assert!(rec.temporal_flow(&one).is_empty());

        let same_time: Vec<Sigil> = (0..3)
            .map(|_| sigil_with(axis(0)).with_created_at(42))
            .collect();
        let flow = rec.temporal_flow(&same_time);
        assert_eq!(flow.len(), 1);
        assert_eq!(flow[0].count, 3);
    }

    #[test]
    fn test_temporal_flow_full_u64_span() {
        let sigils: Vec<Sigil> = [0, u64::MAX / 2, u64::MAX]
            .into_iter()
            .map(|t| sigil_with(axis(0)).with_created_at(t))
            .collect();
        let flow = PatternRecognizer::default().temporal_flow(&sigils);
        let indexes: Vec<usize> = flow.iter().map(|w| w.index).collect();
        assert_eq!(indexes, vec![0, 2, 4]);
        assert_eq!(flow[0].start, 0);
        assert_eq!(flow[2].end, u64::MAX);
    }

    #[test]
    fn test_labels_reach_matches() {
        let target = sigil_with(axis(0));
        let labelled = sigil_with(axis(0)).with_tags(SigilTags {
            label: Some("river".into()),
            ..Default::default()
        });
        let hits = PatternRecognizer::default().find_similar(&target, [&labelled], 0.5);
        assert_eq!(hits[0].label, "river");
        assert_eq!(hits[0].percent(), 100);
    }
}
