use indexmap::IndexMap;
use std::cmp::Ordering;
use tracing::debug;

use crate::composition::CompositionKey;
use crate::partition::Groups;

/// Per-group quota, in group order.
pub type Allocation = IndexMap<CompositionKey, usize>;

#[derive(Debug)]
struct Share {
    position: usize,
    capacity: usize,
    quota: usize,
    remainder: f64,
}

impl Share {
    fn is_full(&self) -> bool {
        self.quota >= self.capacity
    }
}

/// Largest-remainder apportionment of `requested_total` across groups.
///
/// The result sums to exactly `min(requested_total, sum(sizes))` and never
/// exceeds a group's size. Leftover units go to the largest fractional
/// remainders first; groups already at capacity are skipped. Equal remainders
/// keep input order.
pub fn allocate_quotas<'a, I>(sizes: I, requested_total: usize) -> Allocation
where
    I: IntoIterator<Item = (&'a CompositionKey, usize)>,
{
    let sizes: Vec<(&CompositionKey, usize)> = sizes.into_iter().collect();
    let available: usize = sizes.iter().map(|(_, size)| *size).sum();
    let target = requested_total.min(available);
    if requested_total > available {
        debug!(requested_total, available, "clamping quota target to eligible structures");
    }
    if target == 0 {
        return sizes.into_iter().map(|(key, _)| (key.clone(), 0)).collect();
    }

    let mut shares: Vec<Share> = sizes
        .iter()
        .enumerate()
        .map(|(position, (_, size))| {
            let ideal = target as f64 * *size as f64 / available as f64;
            let quota = (ideal.floor() as usize).min(*size);
            Share {
                position,
                capacity: *size,
                quota,
                remainder: ideal - quota as f64,
            }
        })
        .collect();

    let assigned: usize = shares.iter().map(|share| share.quota).sum();
    let mut deficit = target.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&left, &right| {
        let (l, r) = (&shares[left], &shares[right]);
        l.is_full()
            .cmp(&r.is_full())
            .then_with(|| r.remainder.partial_cmp(&l.remainder).unwrap_or(Ordering::Equal))
            .then_with(|| l.position.cmp(&r.position))
    });

    while deficit > 0 {
        let mut awarded = false;
        for &slot in &order {
            if deficit == 0 {
                break;
            }
            let share = &mut shares[slot];
            if share.is_full() {
                continue;
            }
            share.quota += 1;
            deficit -= 1;
            awarded = true;
        }
        if !awarded {
            break;
        }
    }

    shares.sort_by_key(|share| share.position);
    sizes
        .into_iter()
        .zip(shares)
        .map(|((key, _), share)| (key.clone(), share.quota))
        .collect()
}

/// [`allocate_quotas`] over every group's eligible structure count.
pub fn allocate_for_groups(groups: &Groups, requested_total: usize) -> Allocation {
    allocate_quotas(groups.iter().map(|(key, group)| (key, group.len())), requested_total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<CompositionKey> {
        names.iter().map(|name| CompositionKey::from_rendered(*name)).collect()
    }

    fn allocate(names: &[CompositionKey], sizes: &[usize], total: usize) -> Vec<usize> {
        allocate_quotas(names.iter().zip(sizes.iter().copied()), total)
            .values()
            .copied()
            .collect()
    }

    #[test]
    fn exact_fit_has_no_rounding_loss() {
        let names = keys(&["A", "B"]);
        assert_eq!(allocate(&names, &[300, 700], 1000), vec![300, 700]);
    }

    #[test]
    fn remainders_decide_leftover_units() {
        let names = keys(&["A", "B", "C"]);
        // Ideal shares 3.33, 3.33, 3.33 -> first group wins the tie.
        assert_eq!(allocate(&names, &[10, 10, 10], 10), vec![4, 3, 3]);
        // Ideal shares 1.5, 3.0, 5.5 -> leftover unit goes to the first .5.
        assert_eq!(allocate(&names, &[3, 6, 11], 10), vec![2, 3, 5]);
    }

    #[test]
    fn target_above_capacity_selects_everything() {
        let names = keys(&["A", "B"]);
        assert_eq!(allocate(&names, &[2, 5], 100), vec![2, 5]);
    }

    #[test]
    fn empty_groups_allocate_nothing() {
        let names = keys(&["A", "B"]);
        assert_eq!(allocate(&names, &[0, 0], 10), vec![0, 0]);
        assert_eq!(allocate(&names, &[4, 4], 0), vec![0, 0]);
        assert!(allocate_quotas(std::iter::empty(), 5).is_empty());
    }

    #[test]
    fn tiny_groups_never_exceed_capacity() {
        let names = keys(&["A", "B", "C", "D"]);
        let quotas = allocate(&names, &[1, 1, 1, 97], 5);
        assert_eq!(quotas.iter().sum::<usize>(), 5);
        assert!(quotas[..3].iter().all(|quota| *quota <= 1));
    }
}
