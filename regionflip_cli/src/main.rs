use regionflip_core::config::RegionflipConfig;
use regionflip_core::feedback::{Feedback, UniqueMutationFeedback};
use regionflip_core::format::JpegFormat;
use regionflip_core::mutator::{CorruptionEngine, SelectionMode};
use regionflip_core::oracle::{DecodeOracle, JpegDecoderOracle};
use regionflip_core::scheduler::RegionSelection;
use regionflip_core::session::MutationSession;
use regionflip_core::store::{ArtifactMetadata, ArtifactStore};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser, global = true)]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List corruptible regions in stream order.
    Regions {
        file: PathBuf,
    },
    /// Flip bits inside one region and check whether the result still decodes.
    Corrupt(CorruptArgs),
}

#[derive(Args, Debug, Default)]
struct CorruptArgs {
    file: PathBuf,
    /// Region to corrupt (defaults to the largest one).
    #[clap(short, long)]
    region: Option<String>,
    /// Pick a random region on every attempt.
    #[clap(long, conflicts_with = "region")]
    random_region: bool,
    /// Number of bits to flip.
    #[clap(short, long)]
    bits: Option<usize>,
    /// Bit selection mode: scatter or contiguous.
    #[clap(short, long)]
    mode: Option<SelectionMode>,
    #[clap(long)]
    seed: Option<u64>,
    #[clap(short, long)]
    iterations: Option<u64>,
    /// Write pristine and mutated copies to the output directory.
    #[clap(long)]
    save: bool,
    #[clap(long)]
    out_dir: Option<PathBuf>,
    /// Do not save mutations the decoder rejects.
    #[clap(long)]
    skip_undecodable: bool,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config_file.as_deref())?;

    match cli.command {
        Command::Regions { file } => list_regions(&file),
        Command::Corrupt(args) => {
            apply_overrides(&mut config, &args);
            config.validate()?;
            debug!("Effective configuration: {config:#?}");
            run_corrupt(&config, &args.file)
        }
    }
}

fn load_config(config_file: Option<&Path>) -> Result<RegionflipConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            RegionflipConfig::load_from_file(config_path)
        }
        None => {
            let default_config_path = PathBuf::from(RegionflipConfig::DEFAULT_FILE_NAME);
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                RegionflipConfig::load_from_file(&default_config_path)
            } else {
                debug!("No config file found, using built-in defaults");
                Ok(RegionflipConfig::default())
            }
        }
    }
}

fn apply_overrides(config: &mut RegionflipConfig, args: &CorruptArgs) {
    if let Some(region) = &args.region {
        config.mutation.region = Some(region.clone());
        config.mutation.selection = RegionSelection::Fixed;
    }
    if args.random_region {
        config.mutation.selection = RegionSelection::Random;
    }
    if let Some(bits) = args.bits {
        config.mutation.bit_count = bits;
    }
    if let Some(mode) = args.mode {
        config.mutation.mode = mode;
    }
    if let Some(seed) = args.seed {
        config.mutation.seed = Some(seed);
    }
    if let Some(iterations) = args.iterations {
        config.run.iterations = iterations;
    }
    if args.save {
        config.output.save = true;
    }
    if let Some(dir) = &args.out_dir {
        config.output.dir = dir.clone();
    }
    if args.skip_undecodable {
        config.output.skip_undecodable = true;
    }
}

fn open_session(file: &Path) -> Result<MutationSession, anyhow::Error> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    MutationSession::open(bytes).with_context(|| format!("Failed to scan {file:?}"))
}

fn list_regions(file: &Path) -> Result<(), anyhow::Error> {
    let session = open_session(file)?;
    let scanner = session.scanner();
    debug!(
        segments = scanner.segments().len(),
        walk_end = ?scanner.walk_end(),
        "Scan finished"
    );

    let Ok(default) = session.default_region() else {
        println!("No corruptible regions found in {file:?} (header bytes are never targeted)");
        return Ok(());
    };
    for region in scanner.regions() {
        let marker = if region.name == default { "  (default)" } else { "" };
        println!(
            "{:<5} offset={:>9} length={:>9} bits={:>10}{}",
            region.name,
            region.offset,
            region.length,
            region.bit_capacity(),
            marker
        );
    }
    Ok(())
}

fn run_corrupt(config: &RegionflipConfig, file: &Path) -> Result<(), anyhow::Error> {
    let session = open_session(file)?;
    if session.regions().is_empty() {
        anyhow::bail!("No corruptible regions found in {file:?} (header bytes are never targeted)");
    }
    let source_file = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown.jpg".to_string());

    let seed = config.mutation.seed.unwrap_or_else(rand::random);
    info!(seed, "Corruption seed (pass --seed to reproduce)");

    let oracle = JpegDecoderOracle::new();
    let pristine_verdict = oracle.examine(session.pristine().as_bytes());
    if !pristine_verdict.is_decodable() {
        warn!(verdict = %pristine_verdict, "Pristine image does not decode either");
    }
    let store = config
        .output
        .save
        .then(|| ArtifactStore::new(&config.output.dir));

    let start_time = Instant::now();
    let stats = run_attempts(config, &session, &source_file, seed, &oracle, store.as_ref())?;
    let elapsed_total = start_time.elapsed();
    println!(
        "Finished {} attempt(s) in {elapsed_total:.2?}: decodable {}, undecodable {}, \
         duplicates {}, saved {}",
        config.run.iterations, stats.decodable, stats.undecodable, stats.duplicates, stats.saved
    );
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunStats {
    decodable: u64,
    undecodable: u64,
    duplicates: u64,
    saved: u64,
}

/// Runs `config.run.iterations` corruption attempts against `session`.
///
/// Every attempt starts from the pristine bytes. Repeated mutations are
/// counted and dropped before the oracle sees them. With a `store`, each new
/// mutation is saved unless it fails to decode and `skip-undecodable` is set.
fn run_attempts(
    config: &RegionflipConfig,
    session: &MutationSession,
    source_file: &str,
    seed: u64,
    oracle: &dyn DecodeOracle,
    store: Option<&ArtifactStore>,
) -> Result<RunStats, anyhow::Error> {
    let mut engine = CorruptionEngine::seeded(seed);
    let mut scheduler = config
        .mutation
        .selection
        .build::<JpegFormat>(config.mutation.region.as_deref())?;
    let pristine = session.pristine().as_bytes();
    let mut feedback = UniqueMutationFeedback::with_pristine(pristine);
    let bit_count = config.mutation.bit_count;
    let mode = config.mutation.mode;
    let mut stats = RunStats::default();

    for attempt in 0..config.run.iterations {
        let region = scheduler.next(session.scanner(), engine.rng_mut())?;
        let mutation = session.corrupt(region, bit_count, mode, &mut engine)?;

        if !feedback.report(&mutation.buffer) {
            stats.duplicates += 1;
            debug!(attempt, region, "Duplicate mutation, skipping");
            continue;
        }

        let verdict = oracle.examine(&mutation.buffer);
        if verdict.is_decodable() {
            stats.decodable += 1;
        } else {
            stats.undecodable += 1;
        }
        println!("[{attempt}] {region}: flipped {bit_count} bit(s) ({mode}) -> {verdict}");

        let Some(store) = store else {
            continue;
        };
        if !verdict.is_decodable() && config.output.skip_undecodable {
            println!("  not saved: image does not decode");
            continue;
        }
        let metadata = ArtifactMetadata::describe(
            source_file,
            pristine,
            &mutation,
            &verdict,
            Some(seed),
            attempt,
        );
        let artifacts = store.save(source_file, pristine, &mutation, &metadata)?;
        stats.saved += 1;
        println!("  saved {}", artifacts.mutated.display());
    }

    Ok(stats)
}
