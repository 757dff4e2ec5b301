//! Reciprocal Rank Fusion of the dense and sparse result lists.
//!
//! Cosine similarity and term-frequency dot products live on incomparable
//! scales, so the lists are merged by rank rather than by score:
//!
//! ```text
//! score(p) = Σ over channels containing p of 1 / (k + rank + 1)
//! ```
//!
//! with 0-indexed `rank` and `k = 60`. A point missing from a channel gets
//! nothing from it; there is no penalty.
//!
//! # Tie-break
//!
//! Equal fused scores keep first-seen order: every dense hit in dense rank
//! order, then sparse-only hits in sparse rank order. The sort is stable, so
//! this is the whole rule.

use std::collections::HashMap;

use crate::models::{FusedResult, ScoredPoint};

/// The RRF damping constant.
pub const RRF_K: f64 = 60.0;

/// Each channel is queried for `limit * CANDIDATE_MULTIPLIER` candidates
/// so the fused top-`limit` does not lose recall.
pub const CANDIDATE_MULTIPLIER: usize = 2;

/// Contribution of a hit at 0-indexed `rank`.
pub fn rrf_contribution(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64 + 1.0)
}

/// Fuse two independently ranked lists into the top `limit` results.
///
/// Pure: no store access. Points are identified by [`ScoredPoint::id`];
/// the payload of the first occurrence is kept.
pub fn fuse(dense: &[ScoredPoint], sparse: &[ScoredPoint], limit: usize) -> Vec<FusedResult> {
    let mut order: Vec<(&ScoredPoint, f64)> = Vec::with_capacity(dense.len() + sparse.len());
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for ranked in [dense, sparse] {
        for (rank, hit) in ranked.iter().enumerate() {
            let contribution = rrf_contribution(rank);
            match slot.get(hit.id.as_str()) {
                Some(&i) => order[i].1 += contribution,
                None => {
                    slot.insert(hit.id.as_str(), order.len());
                    order.push((hit, contribution));
                }
            }
        }
    }

    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    order.truncate(limit);

    order
        .into_iter()
        .map(|(hit, score)| FusedResult::from_scored(hit, score))
        .collect()
}
