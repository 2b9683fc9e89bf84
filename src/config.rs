use crate::composition::KeyMode;
use crate::constants::descriptor::DEFAULT_CENTER_ELEMENTS;
use crate::constants::partition::{
    KPOINT_RADIUS, MAX_ENERGY_PER_ATOM, MAX_FORCE, MAX_KPOINTS, MIN_ENERGY_PER_ATOM,
};
use crate::descriptor::DescriptorParams;
use crate::errors::DedupError;
use crate::selection::SelectionMode;
use crate::types::ElementSymbol;

/// Screening and labeling rules applied while grouping structures.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionConfig {
    /// Real-space radius used for the k-point density estimate.
    pub kpoint_radius: f64,
    /// Structures whose k-point estimate exceeds this are discarded.
    pub max_kpoints: u64,
    /// Inclusive lower bound on energy per atom for a structure to count as labeled.
    pub min_energy_per_atom: f64,
    /// Inclusive upper bound on energy per atom for a structure to count as labeled.
    pub max_energy_per_atom: f64,
    /// Inclusive ceiling on the largest per-atom force norm for a labeled structure.
    pub max_force: f64,
    /// How composition keys are rendered.
    pub key_mode: KeyMode,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            kpoint_radius: KPOINT_RADIUS,
            max_kpoints: MAX_KPOINTS,
            min_energy_per_atom: MIN_ENERGY_PER_ATOM,
            max_energy_per_atom: MAX_ENERGY_PER_ATOM,
            max_force: MAX_FORCE,
            key_mode: KeyMode::default(),
        }
    }
}

impl PartitionConfig {
    /// Validate window bounds.
    pub fn normalized(self) -> Result<Self, DedupError> {
        if !(self.kpoint_radius.is_finite() && self.kpoint_radius > 0.0) {
            return Err(DedupError::Configuration(
                "k-point radius must be positive".to_string(),
            ));
        }
        if self.min_energy_per_atom > self.max_energy_per_atom {
            return Err(DedupError::Configuration(format!(
                "energy window is empty ({} > {})",
                self.min_energy_per_atom, self.max_energy_per_atom
            )));
        }
        if self.max_force.is_nan() || self.max_force < 0.0 {
            return Err(DedupError::Configuration(
                "force ceiling must be non-negative".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Top-level run configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DedupConfig {
    /// Grouping, screening, and labeling rules.
    pub partition: PartitionConfig,
    /// Descriptor-generation parameters; their tag addresses the cache.
    pub descriptor: DescriptorParams,
    /// Elements whose sites are passed to the descriptor generator as centers.
    pub center_elements: Vec<ElementSymbol>,
    /// Size of the worker pool used for per-group fan-out.
    pub workers: usize,
    /// Selection algorithm and its parameter.
    pub mode: SelectionMode,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            partition: PartitionConfig::default(),
            descriptor: DescriptorParams::default(),
            center_elements: DEFAULT_CENTER_ELEMENTS
                .iter()
                .map(|symbol| symbol.to_string())
                .collect(),
            workers: 1,
            mode: SelectionMode::default(),
        }
    }
}

impl DedupConfig {
    /// Validate every nested section.
    pub fn normalized(self) -> Result<Self, DedupError> {
        if self.workers == 0 {
            return Err(DedupError::Configuration(
                "worker count must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            partition: self.partition.normalized()?,
            descriptor: self.descriptor.normalized()?,
            mode: self.mode.normalized()?,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DedupConfig::default().normalized().unwrap();
        assert_eq!(config.center_elements, vec!["C", "H", "O"]);
        assert_eq!(config.partition.max_kpoints, 100);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = DedupConfig {
            workers: 0,
            ..DedupConfig::default()
        }
        .normalized()
        .unwrap_err();
        assert!(matches!(err, DedupError::Configuration(msg) if msg.contains("worker")));
    }

    #[test]
    fn inverted_energy_window_is_rejected() {
        let config = PartitionConfig {
            min_energy_per_atom: 0.0,
            max_energy_per_atom: -1.0,
            ..PartitionConfig::default()
        };
        assert!(config.normalized().is_err());
    }
}
