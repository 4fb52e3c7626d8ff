//! ildump - Dump C#-like type declarations from resolved IL2CPP metadata
//!
//! This tool reads resolved metadata models and writes one declaration
//! artifact per module, annotated with field offsets and method addresses.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Args, Parser};
use ildump_core::dump::plan_artifacts;
use ildump_core::render::walk_module;
use ildump_core::{DumpConfig, Dumper, Metadata, ModuleStatus, StatsVisitor};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Extension of model files picked up in directory mode
const MODEL_EXTENSION: &str = "pb";

/// Dump C#-like type declarations from resolved IL2CPP metadata
#[derive(Parser, Debug)]
#[command(name = "ildump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for the declaration files
    #[arg(short, long, default_value = "dump")]
    output: PathBuf,

    /// Only dump types whose namespace contains this string
    #[arg(short = 'n', long)]
    filter: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Render modules in parallel
    #[arg(long)]
    parallel: bool,

    /// Dry run - don't write files, just count what would be dumped
    #[arg(long)]
    dry_run: bool,

    /// Only list the files that would be written
    #[arg(long)]
    list_only: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single metadata model file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of model files (*.pb) to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Tracks processed model files across one invocation
#[derive(Default)]
struct ImageRegistry {
    /// Content hashes of the images already dumped
    seen: HashSet<blake3::Hash>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    images: usize,
    duplicates_skipped: usize,
    modules_written: usize,
    modules_failed: usize,
}

impl ImageRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute the content hash of a model file
    fn content_hash(data: &[u8]) -> blake3::Hash {
        blake3::hash(data)
    }

    /// Check if this exact model was already dumped
    fn is_duplicate(&mut self, hash: &blake3::Hash) -> bool {
        let duplicate = self.seen.contains(hash);
        if duplicate {
            self.stats.duplicates_skipped += 1;
        }
        duplicate
    }

    /// Register a decoded image and return its output ordinal
    fn register(&mut self, hash: blake3::Hash) -> usize {
        self.seen.insert(hash);
        let ordinal = self.stats.images;
        self.stats.images += 1;
        ordinal
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} images, {} duplicates skipped, {} modules written, {} failed",
            self.stats.images,
            self.stats.duplicates_skipped,
            self.stats.modules_written,
            self.stats.modules_failed
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let models = if let Some(ref file) = cli.input.file {
        if !file.is_file() {
            bail!("Input file does not exist: {}", file.display());
        }
        vec![file.clone()]
    } else if let Some(ref directory) = cli.input.directory {
        collect_model_files(directory)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    let mut registry = ImageRegistry::new();
    let mut images_failed = 0;
    for model in &models {
        if let Err(e) = process_model(&cli, model, &mut registry) {
            // keep going with the remaining images
            error!("Error processing {}: {:#}", model.display(), e);
            images_failed += 1;
        }
    }

    if !cli.list_only && !cli.dry_run {
        registry.print_summary();
    }
    if images_failed > 0 || registry.stats.modules_failed > 0 {
        bail!(
            "{} image(s) failed, {} module(s) could not be written completely",
            images_failed,
            registry.stats.modules_failed
        );
    }

    Ok(())
}

/// Model files under a directory, in sorted path order
fn collect_model_files(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Directory does not exist: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut models = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_model_file(path) {
            trace!("Skipping: {}", path.display());
            continue;
        }
        models.push(path.to_path_buf());
    }

    info!("Found {} model files", models.len());
    Ok(models)
}

/// Visible files with the model extension
fn is_model_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden && path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION)
}

/// Output directory for the n-th image: `out`, `out-1`, `out-2` ...
fn image_output_dir(base: &Path, ordinal: usize) -> PathBuf {
    if ordinal == 0 {
        return base.to_path_buf();
    }
    let mut name = OsString::from(base.as_os_str());
    name.push(format!("-{}", ordinal));
    PathBuf::from(name)
}

/// Decode one model file and dump, list or count its modules
fn process_model(cli: &Cli, model_path: &Path, registry: &mut ImageRegistry) -> Result<()> {
    trace!("Reading {}", model_path.display());
    let data = Bytes::from(
        fs::read(model_path)
            .with_context(|| format!("Failed to read model file: {}", model_path.display()))?,
    );

    let hash = ImageRegistry::content_hash(&data);
    if registry.is_duplicate(&hash) {
        debug!(
            "Skipping duplicate: {} (hash: {})",
            model_path.display(),
            &hash.to_hex()[..8]
        );
        return Ok(());
    }

    let metadata = Metadata::decode(data)
        .with_context(|| format!("Failed to decode model file: {}", model_path.display()))?;
    let ordinal = registry.register(hash);
    debug!(
        "{}: {} modules, {} types",
        model_path.display(),
        metadata.modules.len(),
        metadata.type_count()
    );

    let output_dir = image_output_dir(&cli.output, ordinal);
    let config = DumpConfig::new(&output_dir)
        .filter(cli.filter.clone())
        .parallel(cli.parallel);

    if cli.list_only {
        for path in plan_artifacts(&output_dir, &metadata.modules) {
            match path {
                Ok(path) => println!("{}", path.display()),
                Err(e) => warn!("{}", e),
            }
        }
        return Ok(());
    }

    if cli.dry_run {
        let mut stats = StatsVisitor::default();
        for module in &metadata.modules {
            walk_module(module, &config.reconstructor, &mut stats);
        }
        println!(
            "{}: {} modules, {} types ({} filtered, {} delegates), {} fields, {} enum values, \
             {} properties, {} events, {} methods, {} diagnostics",
            model_path.display(),
            stats.module_count,
            stats.type_count,
            stats.filtered_count,
            stats.delegate_count,
            stats.field_count,
            stats.enum_value_count,
            stats.property_count,
            stats.event_count,
            stats.method_count,
            stats.diagnostic_count
        );
        return Ok(());
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    let report = Dumper::new(config)
        .dump(&metadata)
        .with_context(|| format!("Failed to dump {}", model_path.display()))?;
    for outcome in &report.outcomes {
        match &outcome.status {
            ModuleStatus::Complete => {
                if let Some(path) = &outcome.path {
                    println!("Wrote {}", path.display());
                }
                registry.stats.modules_written += 1;
            }
            ModuleStatus::Partial { partial_path, .. } => {
                error!(
                    "Incomplete output for module {} kept as {}",
                    outcome.module_name,
                    partial_path.display()
                );
                registry.stats.modules_failed += 1;
            }
            ModuleStatus::Failed(e) => {
                error!("Failed to dump module {}: {}", outcome.module_name, e);
                registry.stats.modules_failed += 1;
            }
        }
    }

    Ok(())
}
