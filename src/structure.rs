use serde::{Deserialize, Serialize};

use crate::errors::DedupError;
use crate::types::{Cell, ElementSymbol, Vec3};

/// Read-only view of one parsed atomic structure.
///
/// Parsers live outside this crate; anything that can report symbols, a cell,
/// and (fallibly) an energy and per-atom forces can be deduplicated.
pub trait AtomicStructure {
    /// Per-atom element symbols in site order.
    fn symbols(&self) -> &[ElementSymbol];
    /// Per-atom Cartesian positions in site order.
    fn positions(&self) -> &[Vec3];
    /// Lattice vectors stored row-wise.
    fn cell(&self) -> Cell;
    /// Total potential energy, eV.
    fn potential_energy(&self) -> Result<f64, DedupError>;
    /// Per-atom forces, eV/angstrom.
    fn forces(&self) -> Result<Vec<Vec3>, DedupError>;

    /// Number of atoms.
    fn len(&self) -> usize {
        self.symbols().len()
    }

    /// True when the structure has no atoms.
    fn is_empty(&self) -> bool {
        self.symbols().is_empty()
    }
}

/// Plain owned structure record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Per-atom element symbols.
    pub symbols: Vec<ElementSymbol>,
    /// Per-atom Cartesian positions, angstrom.
    pub positions: Vec<Vec3>,
    /// Lattice vectors stored row-wise.
    pub cell: Cell,
    /// Total potential energy, eV.
    #[serde(default)]
    pub energy: Option<f64>,
    /// Per-atom forces, eV/angstrom.
    #[serde(default)]
    pub forces: Option<Vec<Vec3>>,
}

impl Structure {
    /// Unlabeled structure from symbols, positions, and cell.
    pub fn new(symbols: Vec<ElementSymbol>, positions: Vec<Vec3>, cell: Cell) -> Self {
        Self {
            symbols,
            positions,
            cell,
            energy: None,
            forces: None,
        }
    }

    /// Attach a total energy and per-atom forces.
    pub fn with_labels(mut self, energy: f64, forces: Vec<Vec3>) -> Self {
        self.energy = Some(energy);
        self.forces = Some(forces);
        self
    }
}

impl AtomicStructure for Structure {
    fn symbols(&self) -> &[ElementSymbol] {
        &self.symbols
    }

    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn cell(&self) -> Cell {
        self.cell
    }

    fn potential_energy(&self) -> Result<f64, DedupError> {
        self.energy
            .ok_or_else(|| DedupError::Label("structure carries no energy".into()))
    }

    fn forces(&self) -> Result<Vec<Vec3>, DedupError> {
        let forces = self
            .forces
            .as_ref()
            .ok_or_else(|| DedupError::Label("structure carries no forces".into()))?;
        if forces.len() != self.symbols.len() {
            return Err(DedupError::Label(format!(
                "force array has {} rows for {} atoms",
                forces.len(),
                self.symbols.len()
            )));
        }
        Ok(forces.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> Cell {
        [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]]
    }

    #[test]
    fn unlabeled_structure_reports_missing_energy_and_forces() {
        let structure = Structure::new(vec!["H".into()], vec![[0.0; 3]], cubic(10.0));
        assert!(matches!(structure.potential_energy(), Err(DedupError::Label(_))));
        assert!(matches!(structure.forces(), Err(DedupError::Label(_))));
        assert_eq!(structure.len(), 1);
        assert!(!structure.is_empty());
    }

    #[test]
    fn force_rows_must_match_atom_count() {
        let structure = Structure::new(vec!["H".into(), "H".into()], vec![[0.0; 3]; 2], cubic(10.0))
            .with_labels(-2.0, vec![[0.0; 3]]);
        assert!(structure.potential_energy().is_ok());
        let err = structure.forces().unwrap_err();
        assert!(matches!(err, DedupError::Label(msg) if msg.contains("1 rows for 2 atoms")));
    }
}
