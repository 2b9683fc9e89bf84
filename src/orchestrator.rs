//! Fan-out of per-group selection onto a bounded worker pool, and the keyed
//! fan-in that merges group results into global outcome lists.

use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::cache::verify_artifact;
use crate::composition::CompositionKey;
use crate::constants::selection::WORKER_THREAD_PREFIX;
use crate::errors::DedupError;
use crate::metrics::GroupSummary;
use crate::partition::{Group, Groups};
use crate::quota::allocate_for_groups;
use crate::selection::{GlobalPartition, SelectionMode, fps_select, threshold_cluster};
use crate::store::{CacheKey, DescriptorStore};
use crate::types::{ElementSymbol, ParamTag};

/// Merged result of one selection run.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SelectionOutcome {
    /// Merged global index lists.
    pub partition: GlobalPartition,
    /// One entry per group, in partition order.
    pub summaries: Vec<GroupSummary>,
}

struct GroupSelection {
    partition: GlobalPartition,
    summary: GroupSummary,
}

/// Runs one selection mode over every group using cached descriptors.
pub struct Orchestrator<'a> {
    store: &'a dyn DescriptorStore,
    tag: ParamTag,
    center_elements: Vec<ElementSymbol>,
    workers: usize,
}

impl<'a> Orchestrator<'a> {
    /// Read artifacts under `tag` from `store` on `workers` threads (at least one).
    pub fn new(store: &'a dyn DescriptorStore, tag: impl Into<ParamTag>, workers: usize) -> Self {
        Self {
            store,
            tag: tag.into(),
            center_elements: Vec::new(),
            workers: workers.max(1),
        }
    }

    /// Only accept artifacts expanded around these center elements.
    pub fn with_center_elements(mut self, center_elements: &[ElementSymbol]) -> Self {
        self.center_elements = center_elements.to_vec();
        self
    }

    /// Size of the worker pool.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Select across all groups. Any group failure fails the run.
    pub fn run(&self, groups: &Groups, mode: SelectionMode) -> Result<SelectionOutcome, DedupError> {
        let mode = mode.normalized()?;
        let quotas = match mode {
            SelectionMode::Fps { target_total } => Some(allocate_for_groups(groups, target_total)),
            SelectionMode::Threshold { .. } => None,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("{WORKER_THREAD_PREFIX}-{index}"))
            .build()
            .map_err(|err| DedupError::Configuration(format!("failed to start worker pool: {err}")))?;

        info!(
            "[soap-dedup] selecting over {} groups (mode={}, workers={})",
            groups.len(),
            mode.name(),
            self.workers
        );
        let tasks: Vec<&Group> = groups.values().collect();
        let mut results: HashMap<CompositionKey, Result<GroupSelection, DedupError>> =
            pool.install(|| {
                tasks
                    .into_par_iter()
                    .map(|group| {
                        let quota = quotas
                            .as_ref()
                            .map(|quotas| quotas.get(&group.key).copied().unwrap_or(0));
                        let result = self
                            .select_group(group, mode, quota)
                            .map_err(|err| err.in_group(group.key.as_str()));
                        (group.key.clone(), result)
                    })
                    .collect()
            });

        let mut outcome = SelectionOutcome::default();
        for key in groups.keys() {
            let selection = results.remove(key).ok_or_else(|| DedupError::GroupFailed {
                group: key.to_string(),
                source: Box::new(DedupError::Store("worker returned no result".into())),
            })??;
            outcome.partition.extend(selection.partition);
            outcome.summaries.push(selection.summary);
        }

        info!(
            "[soap-dedup] selected {} structures ({} labeled), held out {}, discarded {}",
            outcome.partition.selected_len(),
            outcome.partition.selected_labeled.len(),
            outcome.partition.held_out_len(),
            outcome.partition.discarded.len()
        );
        Ok(outcome)
    }

    fn select_group(
        &self,
        group: &Group,
        mode: SelectionMode,
        quota: Option<usize>,
    ) -> Result<GroupSelection, DedupError> {
        let key = CacheKey::new(self.tag.clone(), group.key.clone());
        let artifact = self
            .store
            .get(&key)?
            .ok_or_else(|| DedupError::CacheMissing {
                group: group.key.to_string(),
            })?;
        verify_artifact(&artifact, group, &self.center_elements)?;

        let local = match mode {
            SelectionMode::Fps { .. } => {
                fps_select(&artifact.features, &artifact.has_label, quota.unwrap_or(0))?
            }
            SelectionMode::Threshold { max_dissimilarity } => {
                threshold_cluster(&artifact.features, &artifact.has_label, max_dissimilarity)?
            }
        };
        let partition = local
            .to_global(&artifact.indices)
            .ok_or_else(|| DedupError::CacheCorrupt {
                group: group.key.to_string(),
                details: "selected row outside the index map".into(),
            })?;
        debug!(
            "[soap-dedup] group {}: {} of {} selected",
            group.key,
            local.selected_len(),
            group.len()
        );
        Ok(GroupSelection {
            summary: GroupSummary::from_partition(group, quota, &local),
            partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorMatrix;
    use crate::store::{DescriptorArtifact, InMemoryDescriptorStore};

    const TAG: &str = "0123456789abcdef";

    fn add_group(
        groups: &mut Groups,
        store: &InMemoryDescriptorStore,
        key: &str,
        rows: Vec<Vec<f32>>,
        indices: Vec<usize>,
        labels: Vec<bool>,
    ) {
        let key = CompositionKey::from_rendered(key);
        let mut group = Group::new(key.clone(), Vec::new());
        for (index, label) in indices.iter().zip(&labels) {
            group.push(*index, *label);
        }
        let artifact =
            DescriptorArtifact::new(DescriptorMatrix::from_rows(rows).unwrap(), indices, labels)
                .unwrap();
        store.put(&CacheKey::new(TAG, key.clone()), &artifact).unwrap();
        groups.insert(key, group);
    }

    fn fixture() -> (Groups, InMemoryDescriptorStore) {
        let store = InMemoryDescriptorStore::new();
        let mut groups = Groups::new();
        add_group(
            &mut groups,
            &store,
            "CHO",
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0], vec![0.1, 0.0], vec![9.0, 1.0]],
            vec![0, 2, 4, 6, 8],
            vec![true, false, false, true, false],
        );
        add_group(
            &mut groups,
            &store,
            "H",
            vec![vec![1.0], vec![2.0], vec![3.0]],
            vec![1, 3, 5],
            vec![false, false, false],
        );
        (groups, store)
    }

    #[test]
    fn fps_merges_in_group_order_with_global_indices() {
        let (groups, store) = fixture();
        let outcome = Orchestrator::new(&store, TAG, 4)
            .run(&groups, SelectionMode::Fps { target_total: 5 })
            .unwrap();
        // Quotas 5*5/8 = 3.125 -> 3 and 5*3/8 = 1.875 -> 2.
        assert_eq!(outcome.summaries[0].quota, Some(3));
        assert_eq!(outcome.summaries[1].quota, Some(2));
        assert_eq!(outcome.partition.selected_labeled, vec![0, 6]);
        assert_eq!(outcome.partition.selected_unlabeled, vec![8, 1, 5]);
        assert_eq!(outcome.partition.held_out_unlabeled, vec![2, 4, 3]);
        assert_eq!(outcome.partition.selected_len(), 5);
    }

    #[test]
    fn worker_count_does_not_change_output() {
        let (groups, store) = fixture();
        let mode = SelectionMode::Threshold {
            max_dissimilarity: 0.01,
        };
        let single = Orchestrator::new(&store, TAG, 1).run(&groups, mode).unwrap();
        let many = Orchestrator::new(&store, TAG, 8).run(&groups, mode).unwrap();
        assert_eq!(single, many);
    }

    #[test]
    fn missing_cache_fails_the_run_with_group_key() {
        let (mut groups, store) = fixture();
        let key = CompositionKey::from_rendered("O");
        let mut group = Group::new(key.clone(), Vec::new());
        group.push(9, false);
        groups.insert(key, group);
        let err = Orchestrator::new(&store, TAG, 2)
            .run(&groups, SelectionMode::default())
            .unwrap_err();
        assert!(matches!(err, DedupError::CacheMissing { ref group } if group == "O"));
    }

    #[test]
    fn artifact_for_other_structures_is_corrupt() {
        let (mut groups, store) = fixture();
        if let Some(group) = groups.get_mut(&CompositionKey::from_rendered("H")) {
            group.indices = vec![1, 3, 7];
        }
        let err = Orchestrator::new(&store, TAG, 2)
            .run(&groups, SelectionMode::default())
            .unwrap_err();
        assert_eq!(err.group(), Some("H"));
        assert!(matches!(err, DedupError::CacheCorrupt { .. }));
    }

    #[test]
    fn artifact_for_other_centers_is_corrupt() {
        let (groups, store) = fixture();
        let err = Orchestrator::new(&store, TAG, 2)
            .with_center_elements(&["O".to_string()])
            .run(&groups, SelectionMode::default())
            .unwrap_err();
        assert_eq!(err.group(), Some("CHO"));
        assert!(matches!(err, DedupError::CacheCorrupt { ref details, .. } if details.contains("expected [O]")));
    }

    #[test]
    fn invalid_threshold_is_rejected_before_dispatch() {
        let (groups, store) = fixture();
        let err = Orchestrator::new(&store, TAG, 1)
            .run(
                &groups,
                SelectionMode::Threshold {
                    max_dissimilarity: -1.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DedupError::Configuration(_)));
    }
}
