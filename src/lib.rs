#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line front end shared by downstream binaries.
pub mod app;
/// Descriptor cache status checks and builders.
pub mod cache;
/// Composition keys and grouping modes.
pub mod composition;
/// Run configuration types.
pub mod config;
/// Centralized constants used across partitioning, selection, and storage.
pub mod constants;
/// Descriptor parameters, matrices, and the generator interface.
pub mod descriptor;
mod hash;
/// Per-group summaries and skew metrics.
pub mod metrics;
/// Per-group fan-out and keyed merge.
pub mod orchestrator;
/// Structure screening, labeling, and grouping.
pub mod partition;
/// End-to-end deduplication runs.
pub mod pipeline;
/// Largest-remainder quota allocation.
pub mod quota;
/// FPS and cosine-threshold selection.
pub mod selection;
/// Descriptor stores and persistence helpers.
pub mod store;
/// Atomic structure interface.
pub mod structure;
/// Input transports (filesystem discovery).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cache::{CacheReport, CacheStatus, build_group_artifact, cache_status, ensure_caches};
pub use composition::{CompositionKey, KeyMode};
pub use config::{DedupConfig, PartitionConfig};
pub use descriptor::{Averaging, DescriptorGenerator, DescriptorMatrix, DescriptorParams};
pub use errors::DedupError;
pub use metrics::{GroupSummary, write_summary_csv, write_summary_csv_file};
pub use orchestrator::{Orchestrator, SelectionOutcome};
pub use partition::{Group, Groups, Partition, PartitionReport, split_structures};
pub use pipeline::{DedupPipeline, DedupRun};
pub use quota::{Allocation, allocate_for_groups, allocate_quotas};
pub use selection::{
    GlobalPartition, LocalPartition, SelectionMode, fps_select, threshold_cluster,
};
pub use store::{
    CacheKey, DescriptorArtifact, DescriptorStore, FileDescriptorStore, InMemoryDescriptorStore,
};
pub use structure::{AtomicStructure, Structure};
pub use types::{Cell, ElementSymbol, GlobalIndex, LocalIndex, ParamTag, Vec3};
