//! Grouping of input structures by composition.
//!
//! Each structure is screened by a k-point density estimate of its cell,
//! keyed by composition, and tagged with a label flag derived from its energy
//! and forces. Original input order is preserved inside every group; the
//! selection algorithms rely on that order for their tie-breaking.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::composition::{CompositionKey, species_of};
use crate::config::PartitionConfig;
use crate::constants::partition::INVALID_CELL_KPOINTS;
use crate::errors::DedupError;
use crate::structure::AtomicStructure;
use crate::types::{Cell, ElementSymbol, GlobalIndex, Vec3};

/// All structures sharing one composition key.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    /// Composition shared by every member.
    pub key: CompositionKey,
    /// Sorted unique element symbols of the group.
    pub species: Vec<ElementSymbol>,
    /// Global indices in input order.
    pub indices: Vec<GlobalIndex>,
    /// Label flag aligned with `indices`.
    pub has_label: Vec<bool>,
}

impl Group {
    /// Empty group for `key`.
    pub fn new(key: CompositionKey, species: Vec<ElementSymbol>) -> Self {
        Self {
            key,
            species,
            indices: Vec::new(),
            has_label: Vec::new(),
        }
    }

    /// Append one member; call in input order.
    pub fn push(&mut self, index: GlobalIndex, has_label: bool) {
        self.indices.push(index);
        self.has_label.push(has_label);
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when the group has no members.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Members with usable labels.
    pub fn labeled_count(&self) -> usize {
        self.has_label.iter().filter(|flag| **flag).count()
    }
}

/// Groups in order of first appearance in the input.
pub type Groups = IndexMap<CompositionKey, Group>;

/// Counters describing one partitioning pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PartitionReport {
    /// Structures seen.
    pub total: usize,
    /// Structures placed in a group.
    pub kept: usize,
    /// Structures dropped for an oversized k-point grid.
    pub skipped_cell: usize,
    /// Kept structures with usable labels.
    pub labeled: usize,
    /// Distinct composition keys.
    pub groups: usize,
}

/// Output of [`split_structures`].
#[derive(Clone, Debug, Default)]
pub struct Partition {
    /// Groups in first-appearance order.
    pub groups: Groups,
    /// Counters for this pass.
    pub report: PartitionReport,
}

/// Group `structures` by composition, dropping ill-conditioned cells.
pub fn split_structures<S: AtomicStructure>(structures: &[S], config: &PartitionConfig) -> Partition {
    let mut groups = Groups::new();
    let mut report = PartitionReport {
        total: structures.len(),
        ..PartitionReport::default()
    };

    for (index, structure) in structures.iter().enumerate() {
        let kpoints = kpoint_density(&structure.cell(), config.kpoint_radius);
        if kpoints > config.max_kpoints {
            debug!(index, kpoints, "skipping structure with dense k-point estimate");
            report.skipped_cell += 1;
            continue;
        }

        let key = CompositionKey::from_symbols(structure.symbols(), config.key_mode);
        let has_label = label_status(structure, config);
        report.kept += 1;
        report.labeled += usize::from(has_label);

        groups
            .entry(key)
            .or_insert_with_key(|key| Group::new(key.clone(), species_of(structure.symbols())))
            .push(index, has_label);
    }

    report.groups = groups.len();
    info!(
        "[soap-dedup] partitioned {} structures into {} groups (kept={}, labeled={}, skipped_cell={})",
        report.total, report.groups, report.kept, report.labeled, report.skipped_cell
    );
    Partition { groups, report }
}

/// Estimated k-point count `n1 * n2 * n3` for sampling density `radius`.
///
/// Cells with a zero determinant score `INVALID_CELL_KPOINTS`.
pub fn kpoint_density(cell: &Cell, radius: f64) -> u64 {
    let [a, b, c] = *cell;
    let volume = dot(a, cross(b, c));
    if volume == 0.0 || !volume.is_finite() {
        return INVALID_CELL_KPOINTS;
    }
    let divisions = |u: Vec3, v: Vec3| -> u64 {
        let estimate = radius * norm(cross(u, v)) / volume.abs() + 0.5;
        (estimate as u64).max(1)
    };
    divisions(b, c)
        .saturating_mul(divisions(c, a))
        .saturating_mul(divisions(a, b))
}

/// True when energy and forces are readable and fall inside the admissible window.
///
/// Read failures are not errors here; they mean "no label".
pub fn label_status<S: AtomicStructure + ?Sized>(structure: &S, config: &PartitionConfig) -> bool {
    match read_label(structure) {
        Ok((energy_per_atom, max_force)) => {
            (config.min_energy_per_atom..=config.max_energy_per_atom).contains(&energy_per_atom)
                && max_force <= config.max_force
        }
        Err(err) => {
            debug!("treating structure as unlabeled: {err}");
            false
        }
    }
}

fn read_label<S: AtomicStructure + ?Sized>(structure: &S) -> Result<(f64, f64), DedupError> {
    if structure.is_empty() {
        return Err(DedupError::Label("structure has no atoms".into()));
    }
    let energy = structure.potential_energy()?;
    let forces = structure.forces()?;
    let max_force = forces
        .iter()
        .map(|force| norm(*force))
        .fold(None, |acc: Option<f64>, value| Some(acc.map_or(value, |best| best.max(value))))
        .ok_or_else(|| DedupError::Label("empty force array".into()))?;
    let energy_per_atom = energy / structure.len() as f64;
    if !energy_per_atom.is_finite() || !max_force.is_finite() {
        return Err(DedupError::Label("non-finite energy or forces".into()));
    }
    Ok((energy_per_atom, max_force))
}

fn cross(u: Vec3, v: Vec3) -> Vec3 {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn dot(u: Vec3, v: Vec3) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

fn norm(u: Vec3) -> f64 {
    dot(u, u).sqrt()
}
