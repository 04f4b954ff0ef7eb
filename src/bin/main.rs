//! qprotocols CLI
//!
//! Runs simulated multi-party quantum protocol experiments described in TOML
//! and prints their statistics as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use qprotocols::protocols::Experiment;
use qprotocols::stats::{self, ExtractorSeed};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qprotocols")]
#[command(about = "Round-synchronized quantum protocol simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment described in a TOML file
    Run {
        /// Experiment configuration
        config: PathBuf,

        /// File of 0/1 characters seeding the extractor (certified expansion)
        #[arg(long)]
        seed_file: Option<PathBuf>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract near-uniform bits from a weak source
    Extract {
        /// File of 0/1 characters from the weak source
        #[arg(long)]
        source: PathBuf,

        /// File of 0/1 uniform seed bits, at least twice the source length
        #[arg(long)]
        seed: PathBuf,

        /// Lower bound on the source's min-entropy, in bits
        #[arg(long)]
        min_entropy: f64,

        /// Accepted distance from uniform
        #[arg(long, default_value = "1e-6")]
        epsilon: f64,
    },
}

fn read_bits(path: &Path) -> Result<ExtractorSeed, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
    Ok(ExtractorSeed::parse(&text)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            seed_file,
            output,
        } => {
            let text = fs::read_to_string(&config).map_err(|e| format!("read {}: {e}", config.display()))?;
            let experiment: Experiment = toml::from_str(&text)?;
            let seed = seed_file.as_deref().map(read_bits).transpose()?;

            let report = experiment.run(seed)?;
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }

        Commands::Extract {
            source,
            seed,
            min_entropy,
            epsilon,
        } => {
            let source = fs::read_to_string(&source).map_err(|e| format!("read {}: {e}", source.display()))?;
            let source = stats::parse_bits(&source)?;

            let bits = stats::extract(&source, read_bits(&seed)?, min_entropy, epsilon)?;
            println!("{}", stats::bit_string(&bits));
        }
    }

    Ok(())
}
