use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::tempdir;

use soap_dedup::{
    AtomicStructure, CacheKey, CompositionKey, DedupConfig, DedupError, DedupPipeline,
    DescriptorArtifact, DescriptorGenerator, DescriptorMatrix, DescriptorParams, DescriptorStore,
    ElementSymbol, FileDescriptorStore, InMemoryDescriptorStore, SelectionMode, Structure,
    split_structures,
};

const BOX: [[f64; 3]; 3] = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];

/// Feature vector built from the first atom's position and the center count.
struct Fingerprint {
    params: DescriptorParams,
    calls: AtomicUsize,
}

impl Fingerprint {
    fn new() -> Self {
        Self {
            params: DescriptorParams::default(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl DescriptorGenerator for Fingerprint {
    fn params(&self) -> &DescriptorParams {
        &self.params
    }

    fn describe(
        &self,
        structure: &dyn AtomicStructure,
        _species: &[ElementSymbol],
        centers: &[usize],
    ) -> Result<Vec<f32>, DedupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = structure.positions()[0];
        Ok(vec![
            first[0] as f32 + 1.0,
            first[1] as f32,
            first[2] as f32,
            centers.len() as f32,
        ])
    }
}

fn molecule(symbols: &[&str], shift: [f64; 3], labeled: bool) -> Structure {
    let positions: Vec<[f64; 3]> = (0..symbols.len())
        .map(|site| [shift[0] + site as f64 * 0.9, shift[1], shift[2]])
        .collect();
    let structure = Structure::new(
        symbols.iter().map(|s| s.to_string()).collect(),
        positions,
        BOX,
    );
    if labeled {
        let energy = -4.0 * symbols.len() as f64;
        structure.with_labels(energy, vec![[0.1, 0.0, 0.0]; symbols.len()])
    } else {
        structure
    }
}

fn dataset() -> Vec<Structure> {
    let water = ["O", "H", "H"];
    let methane = ["C", "H", "H", "H", "H"];
    let mut structures = Vec::new();
    for step in 0..6 {
        let offset = step as f64;
        structures.push(molecule(&water, [offset, 0.5 * offset, 0.0], step % 2 == 0));
        structures.push(molecule(&methane, [0.0, offset, offset * offset * 0.1], step == 3));
    }
    // Oversized k-point grid: screened out before grouping.
    let mut tiny = molecule(&water, [0.0; 3], true);
    tiny.cell = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    structures.push(tiny);
    structures
}

fn all_indices(run: &soap_dedup::DedupRun) -> Vec<usize> {
    let lists = &run.outcome.partition;
    let mut indices: Vec<usize> = lists
        .selected_labeled
        .iter()
        .chain(&lists.selected_unlabeled)
        .chain(&lists.held_out_labeled)
        .chain(&lists.held_out_unlabeled)
        .chain(&lists.discarded)
        .copied()
        .collect();
    indices.sort_unstable();
    indices
}

#[test]
fn file_store_run_is_idempotent_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache");
    let structures = dataset();
    let config = DedupConfig {
        mode: SelectionMode::Fps { target_total: 5 },
        workers: 3,
        ..DedupConfig::default()
    };

    let generator = Fingerprint::new();
    let first = {
        let store: Arc<dyn DescriptorStore> = Arc::new(FileDescriptorStore::open(&path).unwrap());
        let pipeline = DedupPipeline::new(config.clone(), store).unwrap();
        pipeline.run(&structures, &generator).unwrap()
    };
    assert_eq!(first.cache.built, 2);
    assert_eq!(first.partition.skipped_cell, 1);
    assert_eq!(first.outcome.partition.selected_len(), 5);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 12);

    let store: Arc<dyn DescriptorStore> = Arc::new(FileDescriptorStore::open(&path).unwrap());
    let pipeline = DedupPipeline::new(config, store).unwrap();
    let second = pipeline.run(&structures, &generator).unwrap();
    assert_eq!(second.cache.reused, 2);
    assert_eq!(second.cache.built + second.cache.rebuilt, 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 12);
    assert_eq!(first.outcome, second.outcome);
}

#[test]
fn every_kept_structure_lands_in_exactly_one_list() {
    let structures = dataset();
    for mode in [
        SelectionMode::Fps { target_total: 7 },
        SelectionMode::Threshold {
            max_dissimilarity: 0.05,
        },
    ] {
        let store: Arc<dyn DescriptorStore> = Arc::new(InMemoryDescriptorStore::new());
        let config = DedupConfig {
            mode,
            ..DedupConfig::default()
        };
        let run = DedupPipeline::new(config, store)
            .unwrap()
            .run(&structures, &Fingerprint::new())
            .unwrap();
        // The last structure is screened out by its cell.
        assert_eq!(all_indices(&run), (0..structures.len() - 1).collect::<Vec<_>>());
        for index in &run.outcome.partition.selected_labeled {
            assert!(structures[*index].energy.is_some());
        }
    }
}

#[test]
fn output_does_not_depend_on_worker_count() {
    let structures = dataset();
    let store: Arc<dyn DescriptorStore> = Arc::new(InMemoryDescriptorStore::new());
    let mut outcomes = Vec::new();
    for workers in [1, 2, 8] {
        let config = DedupConfig {
            workers,
            mode: SelectionMode::Fps { target_total: 6 },
            ..DedupConfig::default()
        };
        let pipeline = DedupPipeline::new(config, store.clone()).unwrap();
        outcomes.push(pipeline.run(&structures, &Fingerprint::new()).unwrap().outcome);
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[1], outcomes[2]);
    let keys: Vec<&str> = outcomes[0]
        .summaries
        .iter()
        .map(|summary| summary.composition.as_str())
        .collect();
    assert_eq!(keys, vec!["HHO", "CHHHH"]);
}

#[test]
fn target_above_total_selects_everything() {
    let structures = dataset();
    let store: Arc<dyn DescriptorStore> = Arc::new(InMemoryDescriptorStore::new());
    let config = DedupConfig {
        mode: SelectionMode::Fps { target_total: 10_000 },
        ..DedupConfig::default()
    };
    let run = DedupPipeline::new(config, store)
        .unwrap()
        .run(&structures, &Fingerprint::new())
        .unwrap();
    assert_eq!(run.outcome.partition.selected_len(), structures.len() - 1);
    assert_eq!(run.outcome.partition.held_out_len(), 0);
}

#[test]
fn selection_without_cache_fails_with_group_key() {
    let structures = dataset();
    let config = DedupConfig::default();
    let partition = split_structures(&structures, &config.partition);
    let store: Arc<dyn DescriptorStore> = Arc::new(InMemoryDescriptorStore::new());
    let pipeline = DedupPipeline::new(config, store).unwrap();
    let err = pipeline.select(&partition.groups).unwrap_err();
    assert!(matches!(err, DedupError::CacheMissing { ref group } if group == "HHO"));
}

#[test]
fn stale_artifact_is_rebuilt_by_the_next_run() {
    let structures = dataset();
    let config = DedupConfig::default();
    let store: Arc<dyn DescriptorStore> = Arc::new(InMemoryDescriptorStore::new());
    let tag = config.descriptor.tag();

    // An artifact for the water group that describes different structures.
    let stale = DescriptorArtifact::new(
        DescriptorMatrix::from_rows(vec![vec![1.0, 0.0, 0.0, 1.0]]).unwrap(),
        vec![99],
        vec![false],
    )
    .unwrap();
    store
        .put(&CacheKey::new(tag, CompositionKey::from_rendered("HHO")), &stale)
        .unwrap();

    let run = DedupPipeline::new(config, store)
        .unwrap()
        .run(&structures, &Fingerprint::new())
        .unwrap();
    assert_eq!(run.cache.rebuilt, 1);
    assert_eq!(run.cache.built, 1);
}

#[test]
fn changing_center_elements_rebuilds_cached_groups() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache");
    let structures = dataset();
    let generator = Fingerprint::new();
    let config = DedupConfig {
        mode: SelectionMode::Fps { target_total: 4 },
        ..DedupConfig::default()
    };

    let first = {
        let store: Arc<dyn DescriptorStore> = Arc::new(FileDescriptorStore::open(&path).unwrap());
        DedupPipeline::new(config.clone(), store)
            .unwrap()
            .run(&structures, &generator)
            .unwrap()
    };
    assert_eq!(first.cache.built, 2);

    let carbon_only = DedupConfig {
        center_elements: vec!["C".to_string()],
        ..config
    };
    let store: Arc<dyn DescriptorStore> = Arc::new(FileDescriptorStore::open(&path).unwrap());
    let second = DedupPipeline::new(carbon_only, store.clone())
        .unwrap()
        .run(&structures, &generator)
        .unwrap();
    // Same descriptor parameters, so the same tag, but every artifact is stale.
    assert_eq!(second.tag, first.tag);
    assert_eq!(second.cache.reused, 0);
    assert_eq!(second.cache.rebuilt, 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 24);

    let water = store
        .get(&CacheKey::new(second.tag.clone(), CompositionKey::from_rendered("HHO")))
        .unwrap()
        .unwrap();
    assert_eq!(water.center_elements, vec!["C"]);
    assert_eq!(water.features.row(0)[3], 0.0);
}
