/// Constants used by structure screening and label detection.
pub mod partition {
    /// Real-space radius used to estimate the k-point grid of a cell.
    pub const KPOINT_RADIUS: f64 = 25.0;
    /// Structures whose k-point estimate exceeds this value are discarded.
    pub const MAX_KPOINTS: u64 = 100;
    /// Score assigned to cells with a zero determinant.
    pub const INVALID_CELL_KPOINTS: u64 = 1000;
    /// Lower bound (inclusive) of the admissible per-atom energy window, eV.
    pub const MIN_ENERGY_PER_ATOM: f64 = -10.0;
    /// Upper bound (inclusive) of the admissible per-atom energy window, eV.
    pub const MAX_ENERGY_PER_ATOM: f64 = -1.0;
    /// Ceiling (inclusive) on the largest per-atom force norm, eV/angstrom.
    pub const MAX_FORCE: f64 = 10.0;
}

/// Constants used by the selection algorithms.
pub mod selection {
    /// Guards the cosine-similarity denominator against zero-norm descriptors.
    pub const COSINE_EPSILON: f64 = 1e-12;
    /// Default `1 - cosine` threshold under which two structures are duplicates.
    pub const DEFAULT_MAX_DISSIMILARITY: f64 = 0.005;
    /// Prefix used for worker thread names.
    pub const WORKER_THREAD_PREFIX: &str = "soap-dedup";
}

/// Default descriptor-generation parameters.
pub mod descriptor {
    /// Cutoff radius, angstrom.
    pub const DEFAULT_R_CUT: f64 = 6.0;
    /// Number of radial basis functions.
    pub const DEFAULT_N_MAX: u32 = 8;
    /// Maximum degree of spherical harmonics.
    pub const DEFAULT_L_MAX: u32 = 6;
    /// Elements whose sites are used as descriptor centers.
    pub const DEFAULT_CENTER_ELEMENTS: [&str; 3] = ["C", "H", "O"];
}

/// Constants used by descriptor-store persistence and wire encoding.
pub mod store {
    /// Key used for store-level metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key prefix for descriptor artifacts.
    pub const ARTIFACT_PREFIX: &[u8] = b"soap:";
    /// Version tag for persisted artifact records.
    pub const ARTIFACT_RECORD_VERSION: u8 = 2;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for store metadata compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Default directory for persisted descriptor stores.
    pub const DEFAULT_STORE_DIR: &str = "soap_cache";
    /// Default filename for persisted descriptor stores.
    pub const DEFAULT_STORE_FILENAME: &str = "descriptors.bin";
}

/// Constants used by the command-line front end.
pub mod app {
    /// Upper bound for the default worker count.
    pub const MAX_DEFAULT_WORKERS: usize = 8;
    /// File extensions collected when the input is a directory.
    pub const STRUCTURE_FILE_EXTENSIONS: [&str; 2] = ["xyz", "extxyz"];
    /// Default path of the per-group summary file.
    pub const DEFAULT_SUMMARY_PATH: &str = "uniques.csv";
    /// Default input path.
    pub const DEFAULT_INPUT_PATH: &str = "total.xyz";
}

/// FNV-1a parameters used for stable parameter tags.
pub mod hash {
    /// FNV-1a 64-bit offset basis.
    pub const FNV1A64_OFFSET: u64 = 0xcbf29ce484222325;
    /// FNV-1a 64-bit prime.
    pub const FNV1A64_PRIME: u64 = 0x100000001b3;
}
