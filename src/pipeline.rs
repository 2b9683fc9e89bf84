use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::cache::{CacheReport, ensure_caches};
use crate::config::DedupConfig;
use crate::descriptor::DescriptorGenerator;
use crate::errors::DedupError;
use crate::orchestrator::{Orchestrator, SelectionOutcome};
use crate::partition::{Groups, PartitionReport, split_structures};
use crate::store::DescriptorStore;
use crate::structure::AtomicStructure;
use crate::types::ParamTag;

/// Report of one end-to-end run.
#[derive(Clone, Debug, Serialize)]
pub struct DedupRun {
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Run duration in seconds.
    pub elapsed_secs: f64,
    /// Selection mode name.
    pub mode: &'static str,
    /// Descriptor parameter tag the caches were addressed with.
    pub tag: ParamTag,
    /// Partitioning counters.
    pub partition: PartitionReport,
    /// Cache maintenance counters.
    pub cache: CacheReport,
    /// Merged selection lists and per-group summaries.
    pub outcome: SelectionOutcome,
}

impl DedupRun {
    /// Render the report as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, DedupError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| DedupError::Configuration(format!("failed to render run report: {err}")))
    }
}

/// Partition, cache, select.
///
/// Re-running with the same structures, parameters, and store reuses every
/// cached artifact and reproduces the same outcome lists.
pub struct DedupPipeline {
    config: DedupConfig,
    store: Arc<dyn DescriptorStore>,
}

impl DedupPipeline {
    /// Validate `config` and bind it to `store`.
    pub fn new(config: DedupConfig, store: Arc<dyn DescriptorStore>) -> Result<Self, DedupError> {
        Ok(Self {
            config: config.normalized()?,
            store,
        })
    }

    /// Normalized configuration.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Tag addressing this pipeline's cached artifacts.
    pub fn tag(&self) -> ParamTag {
        self.config.descriptor.tag()
    }

    /// Partition `structures`, refresh caches with `generator`, then select.
    pub fn run<S, G>(&self, structures: &[S], generator: &G) -> Result<DedupRun, DedupError>
    where
        S: AtomicStructure + Sync,
        G: DescriptorGenerator + ?Sized,
    {
        if generator.params() != &self.config.descriptor {
            return Err(DedupError::Configuration(format!(
                "generator parameters ({}) differ from configured parameters ({})",
                generator.params().canonical(),
                self.config.descriptor.canonical()
            )));
        }
        let started_at = Utc::now();
        let started = Instant::now();
        let tag = self.tag();

        let partition = split_structures(structures, &self.config.partition);
        let cache = ensure_caches(
            &partition.groups,
            structures,
            generator,
            self.store.as_ref(),
            &tag,
            &self.config.center_elements,
        )?;
        let outcome = self.select(&partition.groups)?;

        let run = DedupRun {
            started_at,
            elapsed_secs: started.elapsed().as_secs_f64(),
            mode: self.config.mode.name(),
            tag,
            partition: partition.report,
            cache,
            outcome,
        };
        info!("[soap-dedup] run finished in {:.2}s", run.elapsed_secs);
        Ok(run)
    }

    /// Selection only, against whatever the store already holds.
    pub fn select(&self, groups: &Groups) -> Result<SelectionOutcome, DedupError> {
        Orchestrator::new(self.store.as_ref(), self.tag(), self.config.workers)
            .with_center_elements(&self.config.center_elements)
            .run(groups, self.config.mode)
    }
}
