use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use palette_sync_core::{
    pattern, AppConfig, ColorExtractor, ConsoleDriver, DominantColorSet, JsonFileDriver,
    OutputDispatcher, PatternMode, PatternOptions, PipelineCoordinator, Poller,
};
use tracing_subscriber::EnvFilter;

mod fetch;
mod interrupt;
mod source;

use fetch::HttpArtworkFetcher;
use source::FileSnapshotSource;

fn main() -> palette_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_poll(args),
        Commands::Extract { image } => run_extract(&image),
        Commands::Pattern {
            colors,
            mode,
            length,
            step,
        } => run_pattern(&colors, mode, length, step),
    }
}

fn run_poll(args: RunArgs) -> palette_sync_core::Result<()> {
    let config = load_config(&args)?;
    let mut source = FileSnapshotSource::new(&args.snapshot);
    tracing::info!(
        snapshot = %source.path().display(),
        mode = %config.pattern.mode,
        length = config.pattern.length,
        "starting palette sync"
    );

    let extractor = ColorExtractor::with_config(config.extractor.clone())?;
    let mut coordinator = PipelineCoordinator::new(
        HttpArtworkFetcher::new(),
        extractor,
        config.pattern,
        config.poll.fetch_timeout(),
    )?;

    let mut outputs = OutputDispatcher::new();
    if !args.quiet {
        outputs.register(ConsoleDriver::stdout());
    }
    if let Some(path) = &args.json_out {
        outputs.register(JsonFileDriver::new(path));
    }
    if outputs.is_empty() {
        tracing::warn!("no outputs registered, sequences will only be logged");
    }
    outputs.connect_all()?;

    let poller = Poller::from_config(&config.poll);
    interrupt::stop_on_ctrl_c(poller.stop_handle())?;
    let stats = poller.run(&mut source, &mut coordinator, &mut outputs);
    outputs.close_all();

    tracing::info!(?stats, "finished");
    Ok(())
}

/// Defaults, then the optional config file, then the environment, then flags.
fn load_config(args: &RunArgs) -> palette_sync_core::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(interval) = args.interval {
        config.poll.interval_secs = interval;
    }
    if args.max_loops.is_some() {
        config.poll.max_ticks = args.max_loops;
    }
    if let Some(mode) = args.mode {
        config.pattern.mode = mode;
    }
    if let Some(length) = args.length {
        config.pattern.length = length;
    }
    if let Some(step) = args.step {
        config.pattern.step = step;
    }
    if args.ignore_near_white {
        config.extractor.ignore_near_white = true;
    }

    config.validate()?;
    Ok(config)
}

fn run_extract(image: &Path) -> palette_sync_core::Result<()> {
    tracing::info!(?image, "extracting dominant colours");
    let bytes = std::fs::read(image)?;
    let colors = ColorExtractor::new().extract(&bytes)?;
    for swatch in colors.swatches() {
        println!("{}\t{}", swatch.color, swatch.pixels);
    }
    Ok(())
}

fn run_pattern(
    colors: &str,
    mode: PatternMode,
    length: usize,
    step: usize,
) -> palette_sync_core::Result<()> {
    let colors = DominantColorSet::parse_list(colors)?;
    let options = PatternOptions::new(mode, length, step)?;
    let sequence = pattern::generate(&colors, &options)?;
    println!("{sequence}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Turns album artwork into light patterns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the playback snapshot and push a new pattern whenever the artwork changes.
    Run(RunArgs),
    /// Print the four dominant colours of an image.
    Extract {
        /// JPEG or PNG file to analyse.
        image: PathBuf,
    },
    /// Expand four colours into a pattern.
    Pattern {
        /// Comma separated colours, e.g. `#AA0000,#00BB00,#0000CC,#DDDDDD`.
        #[arg(short, long)]
        colors: String,
        #[arg(short, long, default_value = "repeat")]
        mode: PatternMode,
        #[arg(short, long, default_value_t = 16)]
        length: usize,
        #[arg(short, long, default_value_t = 1)]
        step: usize,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON playback snapshot maintained by the external poller.
    #[arg(long)]
    snapshot: PathBuf,
    /// Optional JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between polls; overrides POLL_INTERVAL_SECONDS.
    #[arg(long)]
    interval: Option<u64>,
    /// Exit after this many polls.
    #[arg(long)]
    max_loops: Option<u64>,
    #[arg(long)]
    mode: Option<PatternMode>,
    #[arg(long)]
    length: Option<usize>,
    #[arg(long)]
    step: Option<usize>,
    /// Also keep the latest pattern in this JSON file.
    #[arg(long)]
    json_out: Option<PathBuf>,
    /// Skip near-white clusters when picking colours.
    #[arg(long)]
    ignore_near_white: bool,
    /// Do not print patterns to stdout.
    #[arg(short, long)]
    quiet: bool,
}
