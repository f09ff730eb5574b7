use std::cmp::Ordering;

use common::retrieval::RetrievalHit;

/// Holds optional subscores gathered from different retrieval signals for
/// one chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scores {
    pub keywords: Option<f32>,
    pub vector: Option<f32>,
}

/// Generic wrapper combining an item with its accumulated retrieval scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_vector_score(mut self, score: f32) -> Self {
        self.scores.vector = Some(score);
        self
    }

    pub const fn with_keyword_score(mut self, score: f32) -> Self {
        self.scores.keywords = Some(score);
        self
    }

    pub const fn update_fused(&mut self, fused: f32) {
        self.fused = fused;
    }
}

/// Weights used for linear score fusion.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f32,
    pub keywords: f32,
    /// Multiplicative boost applied when a chunk carries both a vector and
    /// a keyword score — two independent retrieval signals agreeing on the
    /// same chunk ("the golden chunk") is worth more than either alone.
    pub multi_bonus: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.8,
            keywords: 0.2,
            multi_bonus: 0.3,
        }
    }
}

#[must_use]
pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

#[must_use]
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for s in scores {
        if !s.is_finite() {
            continue;
        }
        min = min.min(*s);
        max = max.max(*s);
    }

    if !min.is_finite() || !max.is_finite() {
        return scores.iter().map(|_| 0.0).collect();
    }
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

/// Resolves SPEC_FULL §9's open question on multi-retriever precedence:
/// weighted linear fusion with a multiplicative "golden chunk" bonus when
/// vector and keyword signals both hit, not a plain max.
#[must_use]
pub fn fuse_scores(scores: &Scores, weights: FusionWeights) -> f32 {
    let vector = scores.vector.unwrap_or(0.0);
    let keywords = scores.keywords.unwrap_or(0.0);
    let mut fused = vector.mul_add(weights.vector, keywords * weights.keywords);

    if scores.vector.is_some() && scores.keywords.is_some() {
        fused *= 1.0 + weights.multi_bonus;
    }

    clamp_unit(fused)
}

/// Merges retrieval hits from any number of (engine, retriever_type) calls
/// into one `Scored<RetrievalHit>` per `chunk_id`, keeping the
/// highest-scoring hit's entry as the representative and recording which
/// signal(s) produced it so `fuse_scores` can apply the multi-signal bonus.
#[must_use]
pub fn merge_hits_by_chunk_id(
    hits: Vec<(common::retrieval::RetrieverType, RetrievalHit)>,
    weights: FusionWeights,
) -> Vec<Scored<RetrievalHit>> {
    use std::collections::HashMap;

    let mut by_chunk: HashMap<String, Scored<RetrievalHit>> = HashMap::new();
    for (retriever_type, hit) in hits {
        let entry = by_chunk
            .entry(hit.entry.chunk_id.clone())
            .or_insert_with(|| Scored::new(hit.clone()));

        match retriever_type {
            common::retrieval::RetrieverType::Vector => {
                let best = entry.scores.vector.unwrap_or(f32::MIN).max(hit.score);
                entry.scores.vector = Some(best);
            }
            common::retrieval::RetrieverType::Keywords => {
                let best = entry.scores.keywords.unwrap_or(f32::MIN).max(hit.score);
                entry.scores.keywords = Some(best);
            }
        }
        if hit.score > entry.item.score {
            entry.item = hit;
        }
    }

    let mut scored: Vec<_> = by_chunk.into_values().collect();
    for s in &mut scored {
        let fused = fuse_scores(&s.scores, weights);
        s.update_fused(fused);
    }
    scored
}

pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| b.fused.partial_cmp(&a.fused).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::index_entry::{IndexEntry, SourceType};
    use common::retrieval::RetrieverType;

    fn hit(chunk_id: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            entry: IndexEntry::new(
                "tenant-1".into(),
                "kb-1".into(),
                "knowledge-1".into(),
                chunk_id.into(),
                SourceType::Chunk,
                "content".into(),
                vec![0.1, 0.2],
            ),
            score,
        }
    }

    #[test]
    fn multi_signal_chunk_outranks_single_signal_chunk() {
        let hits = vec![
            (RetrieverType::Vector, hit("a", 0.9)),
            (RetrieverType::Keywords, hit("a", 0.8)),
            (RetrieverType::Vector, hit("b", 0.95)),
        ];

        let mut fused = merge_hits_by_chunk_id(hits, FusionWeights::default());
        sort_by_fused_desc(&mut fused);
        assert_eq!(fused[0].item.entry.chunk_id, "a");
    }

    #[test]
    fn min_max_normalize_handles_flat_input() {
        let normalized = min_max_normalize(&[1.0, 1.0, 1.0]);
        assert_eq!(normalized, vec![1.0, 1.0, 1.0]);
    }
}
