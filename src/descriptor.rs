use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::descriptor::{DEFAULT_L_MAX, DEFAULT_N_MAX, DEFAULT_R_CUT};
use crate::errors::DedupError;
use crate::hash::hex_tag;
use crate::structure::AtomicStructure;
use crate::types::{ElementSymbol, ParamTag};

/// How per-site descriptors are reduced to one vector per structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Averaging {
    /// Average the expansion coefficients before forming the power spectrum.
    #[default]
    Inner,
    /// Average the per-site power spectra.
    Outer,
}

impl fmt::Display for Averaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Averaging::Inner => "inner",
            Averaging::Outer => "outer",
        })
    }
}

/// Parameters handed to the descriptor generator.
///
/// Their canonical rendering is hashed into the tag that addresses cached
/// descriptor artifacts, so any change here invalidates the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DescriptorParams {
    /// Cutoff radius, angstrom.
    pub r_cut: f64,
    /// Number of radial basis functions.
    pub n_max: u32,
    /// Maximum spherical-harmonics degree.
    pub l_max: u32,
    /// Reduction of per-site descriptors to one vector.
    pub averaging: Averaging,
    /// Treat cells as periodic.
    pub periodic: bool,
}

impl Default for DescriptorParams {
    fn default() -> Self {
        Self {
            r_cut: DEFAULT_R_CUT,
            n_max: DEFAULT_N_MAX,
            l_max: DEFAULT_L_MAX,
            averaging: Averaging::Inner,
            periodic: true,
        }
    }
}

impl DescriptorParams {
    /// Reject non-physical parameters.
    pub fn normalized(self) -> Result<Self, DedupError> {
        if !(self.r_cut.is_finite() && self.r_cut > 0.0) {
            return Err(DedupError::Configuration(format!(
                "descriptor cutoff must be positive, got {}",
                self.r_cut
            )));
        }
        if self.n_max == 0 {
            return Err(DedupError::Configuration(
                "descriptor n_max must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    /// Canonical rendering, e.g. `r6.0_n8_l6_inner_periodic`.
    pub fn canonical(&self) -> String {
        format!(
            "r{:?}_n{}_l{}_{}_{}",
            self.r_cut,
            self.n_max,
            self.l_max,
            self.averaging,
            if self.periodic { "periodic" } else { "aperiodic" }
        )
    }

    /// Stable tag addressing cached artifacts built with these parameters.
    pub fn tag(&self) -> ParamTag {
        hex_tag(&self.canonical())
    }
}

/// Dense row-major descriptor matrix, one row per structure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptorMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl DescriptorMatrix {
    /// Wrap `rows * dim` row-major values.
    pub fn new(rows: usize, dim: usize, data: Vec<f32>) -> Result<Self, DedupError> {
        let expected = rows.checked_mul(dim).ok_or_else(|| {
            DedupError::Configuration(format!("descriptor shape {rows}x{dim} overflows"))
        })?;
        if data.len() != expected {
            return Err(DedupError::Configuration(format!(
                "descriptor data has {} values, expected {rows}x{dim}",
                data.len()
            )));
        }
        Ok(Self { rows, dim, data })
    }

    /// Stack equally sized rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, DedupError> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|row| row.len() != dim) {
            return Err(DedupError::Configuration(format!(
                "descriptor row {bad} has dimension {}, expected {dim}",
                rows[bad].len()
            )));
        }
        let count = rows.len();
        Self::new(count, dim, rows.into_iter().flatten().collect())
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Length of every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// True when the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Panics if `index >= rows()`.
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn into_parts(self) -> (usize, usize, Vec<f32>) {
        (self.rows, self.dim, self.data)
    }
}

/// External descriptor code (for example a SOAP implementation).
pub trait DescriptorGenerator: Send + Sync {
    /// Parameters this generator was configured with.
    fn params(&self) -> &DescriptorParams;

    /// One descriptor vector for `structure`, expanded around `centers`.
    ///
    /// `species` lists every element of the structure's group so generators
    /// can lay out species channels consistently within the group.
    fn describe(
        &self,
        structure: &dyn AtomicStructure,
        species: &[ElementSymbol],
        centers: &[usize],
    ) -> Result<Vec<f32>, DedupError>;
}

/// Sorted, deduplicated center set; order and repeats do not change descriptors.
pub fn canonical_centers(center_elements: &[ElementSymbol]) -> Vec<ElementSymbol> {
    let mut centers = center_elements.to_vec();
    centers.sort_unstable();
    centers.dedup();
    centers
}

/// Site indices whose element is one of `center_elements`.
pub fn center_sites<S: AtomicStructure + ?Sized>(
    structure: &S,
    center_elements: &[ElementSymbol],
) -> Vec<usize> {
    structure
        .symbols()
        .iter()
        .enumerate()
        .filter(|(_, symbol)| center_elements.contains(*symbol))
        .map(|(site, _)| site)
        .collect()
}
