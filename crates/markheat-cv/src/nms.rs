//! Point non-maximum suppression
//!
//! Greedy, score ordered deduplication of marker candidates by center
//! distance. Quadratic in the candidate count, which stays in the tens per
//! frame.

use markheat_core::Candidate;

/// Greedy spatial NMS with a fixed separation distance in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deduplicator {
    pub min_distance: f64,
}

impl Deduplicator {
    pub fn new(min_distance: f64) -> Self {
        Self { min_distance }
    }

    /// Indices of the surviving candidates, in acceptance order.
    ///
    /// Candidates are visited by descending score with a stable sort, so the
    /// first seen of equally scored candidates wins. A candidate survives
    /// only if it is strictly farther than `min_distance` from every
    /// candidate accepted before it.
    pub fn keep_indices(&self, candidates: &[Candidate]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

        let mut keep: Vec<usize> = Vec::new();
        for i in order {
            let candidate = &candidates[i];
            let isolated = keep
                .iter()
                .all(|&k| candidates[k].distance_to(candidate) > self.min_distance);
            if isolated {
                keep.push(i);
            }
        }
        keep
    }

    /// Survivors ordered by acceptance (highest score first)
    pub fn suppress(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        self.keep_indices(candidates)
            .into_iter()
            .map(|i| candidates[i])
            .collect()
    }

    /// Survivors in their original input order
    pub fn filter(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut keep = self.keep_indices(candidates);
        keep.sort_unstable();
        keep.into_iter().map(|i| candidates[i]).collect()
    }
}
