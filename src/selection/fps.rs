use crate::descriptor::DescriptorMatrix;
use crate::errors::DedupError;
use crate::types::LocalIndex;

use super::{LocalPartition, check_labels, euclidean_distance};

/// Farthest-point sampling of `n_select` rows, labeled rows first.
///
/// The labeled phase seeds with the first labeled row and picks up to
/// `min(n_labeled, n_select)` rows. The unlabeled phase fills the remaining
/// quota, seeding with the first unlabeled row only when the labeled phase
/// picked nothing. Both phases share one running minimum-distance array, so
/// unlabeled picks stay far from the labeled ones. Ties go to the lowest row.
///
/// Exactly `min(n_select, rows)` rows are selected; everything else is held out.
pub fn fps_select(
    features: &DescriptorMatrix,
    has_label: &[bool],
    n_select: usize,
) -> Result<LocalPartition, DedupError> {
    check_labels(features, has_label)?;
    let rows = features.rows();
    let (labeled, unlabeled): (Vec<LocalIndex>, Vec<LocalIndex>) =
        (0..rows).partition(|row| has_label[*row]);

    let mut sampler = FarthestPointSampler::new(features);
    let mut partition = LocalPartition::default();

    let labeled_quota = labeled.len().min(n_select);
    sampler.run_phase(&labeled, labeled_quota, true, &mut partition.selected_labeled);

    let remaining = n_select - partition.selected_labeled.len();
    if remaining > 0 {
        let seed = partition.selected_labeled.is_empty();
        sampler.run_phase(&unlabeled, remaining, seed, &mut partition.selected_unlabeled);
    }

    partition.held_out_labeled = sampler.unpicked(&labeled);
    partition.held_out_unlabeled = sampler.unpicked(&unlabeled);
    Ok(partition)
}

struct FarthestPointSampler<'a> {
    features: &'a DescriptorMatrix,
    min_dist: Vec<f32>,
    picked: Vec<bool>,
}

impl<'a> FarthestPointSampler<'a> {
    fn new(features: &'a DescriptorMatrix) -> Self {
        let rows = features.rows();
        Self {
            features,
            min_dist: vec![f32::INFINITY; rows],
            picked: vec![false; rows],
        }
    }

    fn run_phase(
        &mut self,
        candidates: &[LocalIndex],
        quota: usize,
        seed_first: bool,
        out: &mut Vec<LocalIndex>,
    ) {
        if quota == 0 || candidates.is_empty() {
            return;
        }
        if seed_first {
            self.pick(candidates[0], out);
        }
        while out.len() < quota {
            let Some(next) = self.farthest(candidates) else {
                break;
            };
            self.pick(next, out);
        }
    }

    /// First unpicked candidate with the largest distance to the picked set.
    fn farthest(&self, candidates: &[LocalIndex]) -> Option<LocalIndex> {
        let mut best: Option<(LocalIndex, f32)> = None;
        for &row in candidates {
            if self.picked[row] {
                continue;
            }
            let dist = self.min_dist[row];
            match best {
                Some((_, best_dist)) if dist <= best_dist => {}
                _ => best = Some((row, dist)),
            }
        }
        best.map(|(row, _)| row)
    }

    fn pick(&mut self, row: LocalIndex, out: &mut Vec<LocalIndex>) {
        self.picked[row] = true;
        out.push(row);
        let reference = self.features.row(row);
        for (other, slot) in self.min_dist.iter_mut().enumerate() {
            let dist = euclidean_distance(reference, self.features.row(other));
            if dist < *slot {
                *slot = dist;
            }
        }
    }

    fn unpicked(&self, candidates: &[LocalIndex]) -> Vec<LocalIndex> {
        candidates
            .iter()
            .copied()
            .filter(|row| !self.picked[*row])
            .collect()
    }
}
