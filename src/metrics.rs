use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::errors::DedupError;
use crate::partition::Group;
use crate::selection::LocalPartition;

/// Per-group counts of one selection run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    /// Rendered composition key.
    pub composition: String,
    /// Structures in the group.
    pub structures: usize,
    /// Labeled structures in the group.
    pub labeled: usize,
    /// FPS quota; empty in threshold mode.
    pub quota: Option<usize>,
    /// Selected labeled structures.
    pub selected_labeled: usize,
    /// Selected unlabeled structures.
    pub selected_unlabeled: usize,
    /// Held-out labeled structures.
    pub held_out_labeled: usize,
    /// Held-out unlabeled structures.
    pub held_out_unlabeled: usize,
    /// Redundant cluster members dropped by threshold clustering.
    pub discarded: usize,
}

impl GroupSummary {
    /// Count the lists of one group's local partition.
    pub fn from_partition(group: &Group, quota: Option<usize>, local: &LocalPartition) -> Self {
        Self {
            composition: group.key.to_string(),
            structures: group.len(),
            labeled: group.labeled_count(),
            quota,
            selected_labeled: local.selected_labeled.len(),
            selected_unlabeled: local.selected_unlabeled.len(),
            held_out_labeled: local.held_out_labeled.len(),
            held_out_unlabeled: local.held_out_unlabeled.len(),
            discarded: local.discarded.len(),
        }
    }

    /// Selected structures, labeled or not.
    pub fn selected(&self) -> usize {
        self.selected_labeled + self.selected_unlabeled
    }
}

/// How unevenly the selection is spread across groups.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionSkew {
    /// Selected structures over all groups.
    pub total: usize,
    /// Number of groups.
    pub groups: usize,
    /// Smallest per-group selected count.
    pub min: usize,
    /// Largest per-group selected count.
    pub max: usize,
    /// Mean selected count per group.
    pub mean: f64,
    /// Largest group's fraction of `total`.
    pub max_share: f64,
    /// `max / min`; infinite when some group selected nothing.
    pub ratio: f64,
    /// Per-group shares, largest first.
    pub per_group: Vec<GroupShare>,
}

/// One group's part of the selection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupShare {
    /// Rendered composition key.
    pub composition: String,
    /// Selected structures in the group.
    pub selected: usize,
    /// Fraction of all selected structures.
    pub share: f64,
}

/// Skew of selected counts across groups; `None` when there are no groups.
pub fn selection_skew(summaries: &[GroupSummary]) -> Option<SelectionSkew> {
    let min = summaries.iter().map(GroupSummary::selected).min()?;
    let max = summaries.iter().map(GroupSummary::selected).max()?;
    let total: usize = summaries.iter().map(GroupSummary::selected).sum();
    let groups = summaries.len();
    let share = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let mut per_group: Vec<GroupShare> = summaries
        .iter()
        .map(|summary| GroupShare {
            composition: summary.composition.clone(),
            selected: summary.selected(),
            share: share(summary.selected()),
        })
        .collect();
    per_group.sort_by(|a, b| {
        b.selected
            .cmp(&a.selected)
            .then_with(|| a.composition.cmp(&b.composition))
    });
    Some(SelectionSkew {
        total,
        groups,
        min,
        max,
        mean: total as f64 / groups as f64,
        max_share: share(max),
        ratio: if min == 0 {
            f64::INFINITY
        } else {
            max as f64 / min as f64
        },
        per_group,
    })
}

/// Write one CSV row per group, with a header.
pub fn write_summary_csv<W: Write>(writer: W, summaries: &[GroupSummary]) -> Result<(), DedupError> {
    let mut csv = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv.serialize(summary)?;
    }
    csv.flush()?;
    Ok(())
}

/// Same as [`write_summary_csv`], creating parent directories of `path`.
pub fn write_summary_csv_file<P: AsRef<Path>>(
    path: P,
    summaries: &[GroupSummary],
) -> Result<(), DedupError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    write_summary_csv(fs::File::create(path)?, summaries)
}
