use std::io;

use thiserror::Error;

/// Error type for partitioning, descriptor caching, and selection failures.
#[derive(Debug, Error)]
pub enum DedupError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The backing store rejected a read or write.
    #[error("descriptor store failure: {0}")]
    Store(String),
    /// Selection found no artifact for a group.
    #[error("descriptor cache for group '{group}' is missing")]
    CacheMissing {
        /// Composition key of the group.
        group: String,
    },
    /// An artifact could not be decoded or does not match its group.
    #[error("descriptor cache for group '{group}' is corrupt: {details}")]
    CacheCorrupt {
        /// Composition key of the group.
        group: String,
        /// What failed to decode or match.
        details: String,
    },
    /// The external descriptor generator failed.
    #[error("descriptor generation failed for group '{group}': {reason}")]
    Descriptor {
        /// Composition key of the group.
        group: String,
        /// Generator error message.
        reason: String,
    },
    /// Any other failure raised while handling one group.
    #[error("selection failed for group '{group}': {source}")]
    GroupFailed {
        /// Composition key of the group.
        group: String,
        /// Underlying error.
        #[source]
        source: Box<DedupError>,
    },
    /// Energy or forces could not be read.
    #[error("label unavailable: {0}")]
    Label(String),
    /// Invalid parameters or inconsistent inputs.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Summary CSV could not be written.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DedupError {
    /// Attach a group key to errors that do not already carry one.
    pub fn in_group(self, group: &str) -> Self {
        match self {
            err @ (DedupError::CacheMissing { .. }
            | DedupError::CacheCorrupt { .. }
            | DedupError::Descriptor { .. }
            | DedupError::GroupFailed { .. }) => err,
            other => DedupError::GroupFailed {
                group: group.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Group key reported by this error, if any.
    pub fn group(&self) -> Option<&str> {
        match self {
            DedupError::CacheMissing { group }
            | DedupError::CacheCorrupt { group, .. }
            | DedupError::Descriptor { group, .. }
            | DedupError::GroupFailed { group, .. } => Some(group),
            _ => None,
        }
    }
}
