//! Flagbench command-line interface

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flagbench::config::{HarnessConfig, DEFAULT_CONFIG_FILE};
use flagbench::dataset::{DatasetStore, ResultCollector};
use flagbench::flags::{AcceptAll, FlagProbe, FlagSampler, FlagSet};
use flagbench::orchestrator::Orchestrator;
use flagbench::project::Adapter;

#[derive(Parser, Debug)]
#[command(name = "flagbench")]
#[command(about = "Compiler-flag benchmark dataset generator", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample flag sets and grow the dataset
    Run {
        /// Dataset entries to reach
        #[arg(long)]
        iterations: Option<usize>,

        /// Timed runs per benchmark
        #[arg(long)]
        runs: Option<usize>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Keep entries already in the dataset file
        #[arg(long)]
        resume: bool,
    },

    /// Build and benchmark one project under the given flags
    Adapter {
        /// Project name from the config file
        project: String,

        /// Timed runs per benchmark
        #[arg(long)]
        runs: Option<usize>,

        /// Compiler flags (place after `--`)
        #[arg(last = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },

    /// Print one sampled flag set
    Sample {
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Cap on sampled flags (0 = uncapped)
        #[arg(long)]
        max_flags: Option<usize>,

        /// Resample until the configured compiler accepts the flags
        #[arg(long)]
        probe: bool,
    },

    /// Print one `{flags, target}` JSON line per dataset entry
    Reduce {
        /// Dataset file
        dataset: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            iterations,
            runs,
            seed,
            resume,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(n) = iterations {
                config.iterations = n;
            }
            if let Some(r) = runs {
                config.runs = r;
            }
            config.seed = seed.or(config.seed);
            config.validate()?;
            cmd_run(&config, resume)
        }
        Commands::Adapter {
            project,
            runs,
            flags,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(r) = runs {
                config.runs = r;
            }
            cmd_adapter(&config, &project, &FlagSet::from_tokens(&flags))
        }
        Commands::Sample {
            seed,
            max_flags,
            probe,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(m) = max_flags {
                config.max_flags = m;
            }
            cmd_sample(&config, seed.or(config.seed), probe)
        }
        Commands::Reduce { dataset } => cmd_reduce(&dataset),
    }
}

/// Explicit path, else `flagbench.toml` if present, else defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<HarnessConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => {
            tracing::debug!("no config file, using defaults");
            return Ok(HarnessConfig::from_toml_str("", Path::new("."))?);
        }
    };
    HarnessConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn cmd_run(config: &HarnessConfig, resume: bool) -> anyhow::Result<()> {
    if config.projects.is_empty() {
        bail!("no [[project]] entries configured");
    }
    let seed = config.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, "sampling seed");

    let store = if resume {
        DatasetStore::open(config.dataset_path())?
    } else {
        DatasetStore::create(config.dataset_path())
    };
    let mut orchestrator = Orchestrator::new(
        config.adapters(),
        config.probe(),
        ResultCollector::new(config.results_path()),
        store,
    )
    .with_sampler(config.sampler())
    .with_limits(config.limits());

    let summary = orchestrator.run(&mut StdRng::seed_from_u64(seed))?;
    if !summary.target_reached {
        bail!(
            "stopped early after {} discarded iterations with {} of {} entries",
            summary.discarded,
            summary.dataset_len,
            config.iterations
        );
    }
    println!(
        "{} entries in {} ({} persisted, {} discarded this run)",
        summary.dataset_len,
        config.dataset_path().display(),
        summary.persisted,
        summary.discarded
    );
    Ok(())
}

fn cmd_adapter(config: &HarnessConfig, project: &str, flags: &FlagSet) -> anyhow::Result<()> {
    let Some(descriptor) = config.project(project) else {
        bail!("unknown project '{project}'");
    };
    let adapter = config.adapter(descriptor);
    let path = adapter
        .run(flags, config.runs)
        .with_context(|| format!("project '{project}' failed under flags '{flags}'"))?;
    println!("{}", std::fs::read_to_string(&path)?);
    tracing::info!(path = %path.display(), "result written");
    Ok(())
}

fn cmd_sample(config: &HarnessConfig, seed: Option<u64>, probe: bool) -> anyhow::Result<()> {
    let sampler: FlagSampler = config.sampler();
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let flags = if probe {
        sample_with(&sampler, &mut rng, &config.probe())?
    } else {
        sample_with(&sampler, &mut rng, &AcceptAll)?
    };
    tracing::debug!(seed, "sampled");
    println!("{flags}");
    Ok(())
}

fn sample_with<P: FlagProbe>(
    sampler: &FlagSampler,
    rng: &mut StdRng,
    probe: &P,
) -> anyhow::Result<FlagSet> {
    Ok(sampler.sample_valid(rng, probe)?)
}

fn cmd_reduce(dataset: &Path) -> anyhow::Result<()> {
    let entries = DatasetStore::load(dataset)
        .with_context(|| format!("reading dataset {}", dataset.display()))?;
    for entry in &entries {
        println!("{}", serde_json::to_string(&entry.reduce())?);
    }
    Ok(())
}
