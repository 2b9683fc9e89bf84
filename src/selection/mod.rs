//! Per-group selection algorithms.
//!
//! Both algorithms read one group's descriptor matrix plus its label flags and
//! return a [`LocalPartition`] of row indices. Mapping rows back to global
//! structure indices is the orchestrator's job.

mod fps;
mod threshold;

pub use fps::fps_select;
pub use threshold::threshold_cluster;

use crate::constants::selection::{COSINE_EPSILON, DEFAULT_MAX_DISSIMILARITY};
use crate::descriptor::DescriptorMatrix;
use crate::errors::DedupError;
use crate::types::{GlobalIndex, LocalIndex};

/// Selection algorithm plus its run-level parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SelectionMode {
    /// Farthest-point sampling to `target_total` structures across all groups.
    Fps {
        /// Global number of structures to select.
        target_total: usize,
    },
    /// Greedy cosine clustering; rows within `max_dissimilarity` of a
    /// cluster reference (`1 - cos <= max_dissimilarity`) are duplicates.
    Threshold {
        /// Largest cosine dissimilarity treated as a duplicate.
        max_dissimilarity: f64,
    },
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Threshold {
            max_dissimilarity: DEFAULT_MAX_DISSIMILARITY,
        }
    }
}

impl SelectionMode {
    /// Short name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::Fps { .. } => "fps",
            SelectionMode::Threshold { .. } => "threshold",
        }
    }

    /// Reject thresholds that cannot be compared against.
    pub fn normalized(self) -> Result<Self, DedupError> {
        if let SelectionMode::Threshold { max_dissimilarity } = self
            && !(max_dissimilarity.is_finite() && max_dissimilarity >= 0.0)
        {
            return Err(DedupError::Configuration(format!(
                "dissimilarity threshold must be a non-negative number, got {max_dissimilarity}"
            )));
        }
        Ok(self)
    }
}

/// Outcome lists over one group's rows.
///
/// `discarded` holds redundant cluster members dropped by threshold
/// clustering; FPS never discards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalPartition {
    /// Selected rows with labels.
    pub selected_labeled: Vec<LocalIndex>,
    /// Selected rows without labels.
    pub selected_unlabeled: Vec<LocalIndex>,
    /// Held-out rows with labels.
    pub held_out_labeled: Vec<LocalIndex>,
    /// Held-out rows without labels.
    pub held_out_unlabeled: Vec<LocalIndex>,
    /// Redundant rows kept in neither split.
    pub discarded: Vec<LocalIndex>,
}

impl LocalPartition {
    /// Rows in both selected lists.
    pub fn selected_len(&self) -> usize {
        self.selected_labeled.len() + self.selected_unlabeled.len()
    }

    /// Rows in both held-out lists.
    pub fn held_out_len(&self) -> usize {
        self.held_out_labeled.len() + self.held_out_unlabeled.len()
    }

    /// Rows accounted for across all five lists.
    pub fn total(&self) -> usize {
        self.selected_len() + self.held_out_len() + self.discarded.len()
    }

    /// Translate every row through `index_map`; `None` if a row is out of range.
    pub fn to_global(&self, index_map: &[GlobalIndex]) -> Option<GlobalPartition> {
        let map = |rows: &[LocalIndex]| -> Option<Vec<GlobalIndex>> {
            rows.iter().map(|row| index_map.get(*row).copied()).collect()
        };
        Some(GlobalPartition {
            selected_labeled: map(&self.selected_labeled)?,
            selected_unlabeled: map(&self.selected_unlabeled)?,
            held_out_labeled: map(&self.held_out_labeled)?,
            held_out_unlabeled: map(&self.held_out_unlabeled)?,
            discarded: map(&self.discarded)?,
        })
    }
}

/// Outcome lists over global structure indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct GlobalPartition {
    /// Selected structures with labels.
    pub selected_labeled: Vec<GlobalIndex>,
    /// Selected structures without labels.
    pub selected_unlabeled: Vec<GlobalIndex>,
    /// Held-out structures with labels.
    pub held_out_labeled: Vec<GlobalIndex>,
    /// Held-out structures without labels.
    pub held_out_unlabeled: Vec<GlobalIndex>,
    /// Redundant structures kept in neither split.
    pub discarded: Vec<GlobalIndex>,
}

impl GlobalPartition {
    /// Append `other` list by list.
    pub fn extend(&mut self, other: GlobalPartition) {
        self.selected_labeled.extend(other.selected_labeled);
        self.selected_unlabeled.extend(other.selected_unlabeled);
        self.held_out_labeled.extend(other.held_out_labeled);
        self.held_out_unlabeled.extend(other.held_out_unlabeled);
        self.discarded.extend(other.discarded);
    }

    /// Structures in both selected lists.
    pub fn selected_len(&self) -> usize {
        self.selected_labeled.len() + self.selected_unlabeled.len()
    }

    /// Structures in both held-out lists.
    pub fn held_out_len(&self) -> usize {
        self.held_out_labeled.len() + self.held_out_unlabeled.len()
    }
}

fn check_labels(features: &DescriptorMatrix, has_label: &[bool]) -> Result<(), DedupError> {
    if features.rows() != has_label.len() {
        return Err(DedupError::Configuration(format!(
            "{} descriptor rows but {} label flags",
            features.rows(),
            has_label.len()
        )));
    }
    Ok(())
}

pub(crate) fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

pub(crate) fn l2_norm(a: &[f32]) -> f64 {
    dot(a, a).sqrt()
}

/// Cosine similarity with an epsilon-guarded denominator.
///
/// Zero-norm vectors score 0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    dot(a, b) / (l2_norm(a) * l2_norm(b) + COSINE_EPSILON)
}
