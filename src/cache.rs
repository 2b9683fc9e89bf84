//! Descriptor cache maintenance.
//!
//! A group's artifact is reusable when it exists under the current parameter
//! tag and still describes the same structures (same global indices and label
//! flags) expanded around the same center elements. Anything else is rebuilt
//! with the external descriptor generator.

use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::descriptor::{DescriptorGenerator, DescriptorMatrix, canonical_centers, center_sites};
use crate::errors::DedupError;
use crate::partition::{Group, Groups};
use crate::store::{CacheKey, DescriptorArtifact, DescriptorStore};
use crate::structure::AtomicStructure;
use crate::types::{ElementSymbol, ParamTag};

/// Whether a group's cached artifact can be used as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Present and matching the group.
    Ready,
    /// No artifact under the key.
    Missing,
    /// Present but unreadable, or built from other structures or centers.
    Stale,
}

/// Counters from one [`ensure_caches`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheReport {
    /// Groups whose artifact was used as-is.
    pub reused: usize,
    /// Groups with no artifact before this pass.
    pub built: usize,
    /// Groups whose stale artifact was replaced.
    pub rebuilt: usize,
}

/// Check that `artifact` describes exactly the structures of `group`, expanded
/// around `center_elements`.
pub fn verify_artifact(
    artifact: &DescriptorArtifact,
    group: &Group,
    center_elements: &[ElementSymbol],
) -> Result<(), DedupError> {
    let corrupt = |details: String| DedupError::CacheCorrupt {
        group: group.key.to_string(),
        details,
    };
    if artifact.rows() != group.len() {
        return Err(corrupt(format!(
            "artifact has {} rows, group has {} structures",
            artifact.rows(),
            group.len()
        )));
    }
    if artifact.indices != group.indices {
        return Err(corrupt("artifact index map differs from group".into()));
    }
    if artifact.has_label != group.has_label {
        return Err(corrupt("artifact label flags differ from group".into()));
    }
    let expected = canonical_centers(center_elements);
    if artifact.center_elements != expected {
        return Err(corrupt(format!(
            "artifact built for centers [{}], expected [{}]",
            artifact.center_elements.join(" "),
            expected.join(" ")
        )));
    }
    Ok(())
}

/// Classify the artifact stored under `key` against `group`. Unreadable
/// entries count as stale.
pub fn cache_status(
    store: &dyn DescriptorStore,
    key: &CacheKey,
    group: &Group,
    center_elements: &[ElementSymbol],
) -> Result<CacheStatus, DedupError> {
    match store.get(key) {
        Ok(None) => Ok(CacheStatus::Missing),
        Ok(Some(artifact)) => match verify_artifact(&artifact, group, center_elements) {
            Ok(()) => Ok(CacheStatus::Ready),
            Err(err) => {
                debug!("cache entry {key} is stale: {err}");
                Ok(CacheStatus::Stale)
            }
        },
        Err(err @ DedupError::CacheCorrupt { .. }) => {
            warn!("cache entry {key} is unreadable and will be rebuilt: {err}");
            Ok(CacheStatus::Stale)
        }
        Err(err) => Err(err),
    }
}

/// Compute one group's descriptors in parallel over its structures.
pub fn build_group_artifact<S, G>(
    group: &Group,
    structures: &[S],
    generator: &G,
    center_elements: &[ElementSymbol],
) -> Result<DescriptorArtifact, DedupError>
where
    S: AtomicStructure + Sync,
    G: DescriptorGenerator + ?Sized,
{
    let describe_failure = |reason: String| DedupError::Descriptor {
        group: group.key.to_string(),
        reason,
    };
    let rows = group
        .indices
        .par_iter()
        .map(|&index| {
            let structure = structures.get(index).ok_or_else(|| {
                describe_failure(format!(
                    "structure {index} is outside the input ({} structures)",
                    structures.len()
                ))
            })?;
            let centers = center_sites(structure, center_elements);
            generator
                .describe(structure, &group.species, &centers)
                .map_err(|err| describe_failure(format!("structure {index}: {err}")))
        })
        .collect::<Result<Vec<Vec<f32>>, DedupError>>()?;
    let features = DescriptorMatrix::from_rows(rows).map_err(|err| describe_failure(err.to_string()))?;
    DescriptorArtifact::new(features, group.indices.clone(), group.has_label.clone())
        .map(|artifact| artifact.with_center_elements(center_elements))
}

/// Build every missing or stale artifact, in group order.
pub fn ensure_caches<S, G>(
    groups: &Groups,
    structures: &[S],
    generator: &G,
    store: &dyn DescriptorStore,
    tag: &ParamTag,
    center_elements: &[ElementSymbol],
) -> Result<CacheReport, DedupError>
where
    S: AtomicStructure + Sync,
    G: DescriptorGenerator + ?Sized,
{
    let mut report = CacheReport::default();
    let pending: Vec<(&Group, CacheStatus)> = groups
        .values()
        .map(|group| {
            let key = CacheKey::new(tag.clone(), group.key.clone());
            cache_status(store, &key, group, center_elements).map(|status| (group, status))
        })
        .collect::<Result<_, _>>()?;

    if pending.iter().any(|(_, status)| *status != CacheStatus::Ready) {
        info!("[soap-dedup] building descriptor caches (tag={tag})");
    }

    for (group, status) in pending {
        if status == CacheStatus::Ready {
            report.reused += 1;
            continue;
        }
        let started = Instant::now();
        let artifact = build_group_artifact(group, structures, generator, center_elements)?;
        store.put(&CacheKey::new(tag.clone(), group.key.clone()), &artifact)?;
        debug!(
            "[soap-dedup] cached group {} ({} rows x {} dims) in {:.2}s",
            group.key,
            artifact.features.rows(),
            artifact.features.dim(),
            started.elapsed().as_secs_f64()
        );
        match status {
            CacheStatus::Stale => report.rebuilt += 1,
            _ => report.built += 1,
        }
    }

    info!(
        "[soap-dedup] descriptor caches ready (reused={}, built={}, rebuilt={})",
        report.reused, report.built, report.rebuilt
    );
    Ok(report)
}
