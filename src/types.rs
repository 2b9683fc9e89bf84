/// Position of a structure in the full, ordered input collection.
/// Example: `1042`
pub type GlobalIndex = usize;
/// Row of one group's descriptor matrix.
/// Example: `3`
pub type LocalIndex = usize;
/// Chemical element symbol.
/// Examples: `C`, `Cu`, `O`
pub type ElementSymbol = String;
/// Hex tag derived from descriptor-generation parameters.
/// Example: `5b1f0c7a9e22d403`
pub type ParamTag = String;
/// Cartesian vector in angstrom (positions, cell rows) or eV/angstrom (forces).
pub type Vec3 = [f64; 3];
/// Lattice vectors stored row-wise.
pub type Cell = [Vec3; 3];
