use crate::constants::selection::COSINE_EPSILON;
use crate::descriptor::DescriptorMatrix;
use crate::errors::DedupError;
use crate::types::LocalIndex;

use super::{LocalPartition, check_labels, dot, l2_norm};

/// Greedy cosine clustering with labeled representatives.
///
/// The first remaining row becomes a cluster reference; every other remaining
/// row with `1 - cos <= max_dissimilarity` to that reference joins its cluster.
/// Membership is judged against the reference only, so chains of near
/// duplicates can end up split across clusters.
///
/// Per cluster one representative is kept (labeled when possible) and at most
/// one member is held out; the rest land in `discarded`.
pub fn threshold_cluster(
    features: &DescriptorMatrix,
    has_label: &[bool],
    max_dissimilarity: f64,
) -> Result<LocalPartition, DedupError> {
    check_labels(features, has_label)?;
    let rows = features.rows();
    let norms: Vec<f64> = (0..rows).map(|row| l2_norm(features.row(row))).collect();

    let mut partition = LocalPartition::default();
    let mut remaining: Vec<LocalIndex> = (0..rows).collect();

    while let Some((&reference, rest)) = remaining.split_first() {
        let reference_row = features.row(reference);
        let mut cluster = vec![reference];
        let mut next = Vec::with_capacity(rest.len());
        for &candidate in rest {
            let similarity = dot(reference_row, features.row(candidate))
                / (norms[reference] * norms[candidate] + COSINE_EPSILON);
            if 1.0 - similarity <= max_dissimilarity {
                cluster.push(candidate);
            } else {
                next.push(candidate);
            }
        }
        assign_cluster(&cluster, has_label, &mut partition);
        remaining = next;
    }

    Ok(partition)
}

fn assign_cluster(cluster: &[LocalIndex], has_label: &[bool], out: &mut LocalPartition) {
    let [first, ..] = cluster else {
        return;
    };
    if cluster.len() == 1 {
        if has_label[*first] {
            out.selected_labeled.push(*first);
        } else {
            out.selected_unlabeled.push(*first);
        }
        return;
    }

    let labeled: Vec<LocalIndex> = cluster
        .iter()
        .copied()
        .filter(|row| has_label[*row])
        .collect();
    let (kept, held_out) = match labeled.as_slice() {
        [] => {
            out.selected_unlabeled.push(cluster[0]);
            out.held_out_unlabeled.push(cluster[1]);
            (cluster[0], cluster[1])
        }
        [representative] => {
            // Only one labeled member, so every other member is unlabeled.
            let partner = cluster
                .iter()
                .copied()
                .find(|row| row != representative)
                .unwrap_or(*representative);
            out.selected_labeled.push(*representative);
            out.held_out_unlabeled.push(partner);
            (*representative, partner)
        }
        [representative, .., last] => {
            out.selected_labeled.push(*representative);
            out.held_out_labeled.push(*last);
            (*representative, *last)
        }
    };
    out.discarded.extend(
        cluster
            .iter()
            .copied()
            .filter(|row| *row != kept && *row != held_out),
    );
}
