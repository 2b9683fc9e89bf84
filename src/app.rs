use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::{Parser, ValueEnum, error::ErrorKind};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::composition::KeyMode;
use crate::config::{DedupConfig, PartitionConfig};
use crate::constants::app::{DEFAULT_INPUT_PATH, DEFAULT_SUMMARY_PATH, MAX_DEFAULT_WORKERS};
use crate::constants::descriptor::{DEFAULT_L_MAX, DEFAULT_N_MAX, DEFAULT_R_CUT};
use crate::constants::selection::{DEFAULT_MAX_DISSIMILARITY, WORKER_THREAD_PREFIX};
use crate::constants::store::DEFAULT_STORE_DIR;
use crate::descriptor::{DescriptorGenerator, DescriptorParams};
use crate::errors::DedupError;
use crate::metrics::{selection_skew, write_summary_csv_file};
use crate::pipeline::{DedupPipeline, DedupRun};
use crate::selection::SelectionMode;
use crate::store::{DescriptorStore, FileDescriptorStore};
use crate::structure::AtomicStructure;
use crate::transport::fs::discover_structure_files;
use crate::types::ElementSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Fps,
    Threshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyModeArg {
    Multiset,
    ElementSet,
}

impl From<KeyModeArg> for KeyMode {
    fn from(value: KeyModeArg) -> Self {
        match value {
            KeyModeArg::Multiset => KeyMode::Multiset,
            KeyModeArg::ElementSet => KeyMode::ElementSet,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "soap_dedup",
    disable_help_subcommand = true,
    about = "Descriptor-based structure deduplication",
    long_about = "Group structures by composition, cache per-group descriptors, and split each group into selected and held-out structures by farthest-point sampling or cosine-threshold clustering.",
    after_help = "Input may be a single structure file or a folder searched recursively for .xyz/.extxyz files."
)]
/// CLI for `run_dedup_app`.
///
/// Common usage:
/// - Deduplicate a folder with the default threshold: `--input frames/`
/// - Pick a fixed-size diverse subset: `--mode fps --target 1000`
/// - Keep caches somewhere else: `--cache-dir /tmp/soap_cache`
struct DedupCli {
    #[arg(
        short = 'i',
        long = "input",
        default_value = DEFAULT_INPUT_PATH,
        help = "Structure file, or folder containing structure files"
    )]
    input: PathBuf,
    #[arg(
        short = 'p',
        long = "nproc",
        value_parser = parse_positive_usize,
        help = "Worker count (defaults to min(8, available cores))"
    )]
    nproc: Option<usize>,
    #[arg(long, value_enum, default_value = "threshold", help = "Selection algorithm")]
    mode: ModeArg,
    #[arg(
        short = 's',
        long = "simlT",
        default_value_t = DEFAULT_MAX_DISSIMILARITY,
        help = "Dissimilarity threshold (1 - cosine) for threshold mode"
    )]
    max_dissimilarity: f64,
    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Total number of structures to select in fps mode"
    )]
    target: Option<usize>,
    #[arg(
        short = 'a',
        long = "atoms",
        default_value = "C H O",
        help = "Space-separated elements used as descriptor centers"
    )]
    atoms: String,
    #[arg(short = 'r', long = "rcut", default_value_t = DEFAULT_R_CUT, help = "Descriptor cutoff radius, angstrom")]
    r_cut: f64,
    #[arg(long = "n-max", default_value_t = DEFAULT_N_MAX, help = "Number of radial basis functions")]
    n_max: u32,
    #[arg(long = "l-max", default_value_t = DEFAULT_L_MAX, help = "Maximum spherical-harmonics degree")]
    l_max: u32,
    #[arg(
        long = "cache-dir",
        value_name = "DIR",
        default_value = DEFAULT_STORE_DIR,
        help = "Directory holding the descriptor store"
    )]
    cache_dir: PathBuf,
    #[arg(
        long = "key-mode",
        value_enum,
        default_value = "multiset",
        help = "Group by element multiset or by distinct elements"
    )]
    key_mode: KeyModeArg,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_SUMMARY_PATH,
        help = "Per-group summary CSV"
    )]
    summary: PathBuf,
    #[arg(long, value_name = "PATH", help = "Optional JSON run report")]
    report: Option<PathBuf>,
}

impl DedupCli {
    fn workers(&self) -> usize {
        self.nproc.unwrap_or_else(default_workers)
    }

    fn center_elements(&self) -> Vec<ElementSymbol> {
        self.atoms.split_whitespace().map(str::to_string).collect()
    }

    fn descriptor_params(&self) -> DescriptorParams {
        DescriptorParams {
            r_cut: self.r_cut,
            n_max: self.n_max,
            l_max: self.l_max,
            ..DescriptorParams::default()
        }
    }

    fn selection_mode(&self) -> Result<SelectionMode, DedupError> {
        match self.mode {
            ModeArg::Threshold => Ok(SelectionMode::Threshold {
                max_dissimilarity: self.max_dissimilarity,
            }),
            ModeArg::Fps => self
                .target
                .map(|target_total| SelectionMode::Fps { target_total })
                .ok_or_else(|| DedupError::Configuration("--target is required with --mode fps".into())),
        }
    }

    fn config(&self) -> Result<DedupConfig, DedupError> {
        DedupConfig {
            partition: PartitionConfig {
                key_mode: self.key_mode.into(),
                ..PartitionConfig::default()
            },
            descriptor: self.descriptor_params(),
            center_elements: self.center_elements(),
            workers: self.workers(),
            mode: self.selection_mode()?,
        }
        .normalized()
    }
}

/// Run the deduplication CLI end to end.
///
/// `load_file` parses one structure file. `build_generator` constructs the
/// descriptor generator for the parsed parameters and center elements.
/// `write_outputs` receives every loaded structure plus the run report and is
/// expected to materialize the selected and held-out lists.
pub fn run_dedup_app<S, G, I, Load, Build, Emit>(
    args_iter: I,
    load_file: Load,
    build_generator: Build,
    write_outputs: Emit,
) -> Result<(), Box<dyn Error>>
where
    S: AtomicStructure + Send + Sync,
    G: DescriptorGenerator,
    I: Iterator<Item = String>,
    Load: Fn(&Path) -> Result<Vec<S>, DedupError> + Sync,
    Build: FnOnce(&DescriptorParams, &[ElementSymbol]) -> Result<G, Box<dyn Error>>,
    Emit: FnOnce(&[S], &DedupRun) -> Result<(), Box<dyn Error>>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<DedupCli, _>(std::iter::once("soap_dedup".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let config = cli.config()?;
    print_banner(&cli, &config);

    let structures = read_structures(&cli.input, config.workers, &load_file)?;
    let generator = build_generator(&config.descriptor, &config.center_elements)?;

    let store_path = FileDescriptorStore::default_path_in_dir(&cli.cache_dir);
    info!("[soap-dedup] descriptor store: {}", store_path.display());
    let store: Arc<dyn DescriptorStore> = Arc::new(FileDescriptorStore::open(store_path)?);
    let pipeline = DedupPipeline::new(config, store)?;
    let run = pipeline.run(&structures, &generator)?;

    write_summary_csv_file(&cli.summary, &run.outcome.summaries)?;
    info!("[soap-dedup] wrote group summary to {}", cli.summary.display());
    if let Some(skew) = selection_skew(&run.outcome.summaries) {
        info!(
            "[soap-dedup] selection skew: groups={} min={} max={} max_share={:.3}",
            skew.groups, skew.min, skew.max, skew.max_share
        );
    }
    if let Some(path) = &cli.report {
        std::fs::write(path, run.to_json_pretty()?)?;
        info!("[soap-dedup] wrote run report to {}", path.display());
    }

    write_outputs(&structures, &run)?;
    Ok(())
}

/// Load every structure reachable from `input`, preserving file order.
///
/// A single input file must parse. Inside a folder, files that fail to parse
/// are skipped with a warning.
pub fn read_structures<S, Load>(
    input: &Path,
    workers: usize,
    load_file: &Load,
) -> Result<Vec<S>, DedupError>
where
    S: AtomicStructure + Send,
    Load: Fn(&Path) -> Result<Vec<S>, DedupError> + Sync,
{
    if input.is_file() {
        info!("[soap-dedup] reading single file: {}", input.display());
        return load_file(input);
    }
    let files = discover_structure_files(input)?;
    if files.is_empty() {
        return Err(DedupError::Configuration(format!(
            "no structure files found under '{}'",
            input.display()
        )));
    }
    info!(
        "[soap-dedup] reading {} files with {} workers",
        files.len(),
        workers
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("{WORKER_THREAD_PREFIX}-io-{index}"))
        .build()
        .map_err(|err| DedupError::Configuration(format!("failed to start reader pool: {err}")))?;
    let per_file: Vec<Vec<S>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| match load_file(path) {
                Ok(structures) => structures,
                Err(err) => {
                    warn!("[soap-dedup] skipping {}: {err}", path.display());
                    Vec::new()
                }
            })
            .collect()
    });
    let structures: Vec<S> = per_file.into_iter().flatten().collect();
    info!("[soap-dedup] loaded {} structures", structures.len());
    Ok(structures)
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|cores| cores.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

fn print_banner(cli: &DedupCli, config: &DedupConfig) {
    let rule = "=".repeat(60);
    println!("{rule}");
    println!("Deduplication parameters:");
    println!("  input       : {}", cli.input.display());
    println!("  workers     : {}", config.workers);
    match config.mode {
        SelectionMode::Threshold { max_dissimilarity } => {
            println!("  mode        : threshold (1 - cos <= {max_dissimilarity})")
        }
        SelectionMode::Fps { target_total } => {
            println!("  mode        : fps (target {target_total})")
        }
    }
    println!("  centers     : {}", config.center_elements.join(" "));
    println!("  descriptor  : {}", config.descriptor.canonical());
    println!("  cache dir   : {}", cli.cache_dir.display());
    println!("{rule}");
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
