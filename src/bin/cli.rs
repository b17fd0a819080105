//! Storage auditor CLI
//!
//! Local execution entry point backed by the filesystem collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use auditor::{
    Auditor,
    config::load_config,
    error::Result,
    logging,
    pipeline::{OutputOptions, OutputProcessor},
    storage::{LocalDumps, LocalQuarantine},
};
use clap::{Parser, Subcommand};

/// Storage consistency auditor
#[derive(Parser, Debug)]
#[command(
    name = "auditor",
    version,
    about = "Audit storage endpoints against catalog snapshots"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one audit round
    Run {
        /// Endpoints to audit (default: every endpoint with a site dump)
        rses: Vec<String>,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Retries allowed per endpoint after the first attempt
        #[arg(long)]
        attempts: Option<u32>,

        /// Days between the dump date and each catalog snapshot
        #[arg(long)]
        delta: Option<u64>,

        /// Keep downloaded dumps in the cache
        #[arg(long)]
        keep_dumps: bool,
    },

    /// Quarantine the DARK files of an existing result file
    Process {
        /// Result file named `<rse>_<YYYYMMDD>`
        file: PathBuf,

        /// Skip the DARK ratio guard
        #[arg(long)]
        no_sanity_check: bool,

        /// Leave the result file uncompressed
        #[arg(long)]
        no_compress: bool,
    },

    /// Validate the configuration file
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.common.loglevel.as_str()
    };
    logging::init(level)?;

    let store = Arc::new(LocalQuarantine::new(&config.local.quarantine_dir));

    match cli.command {
        Command::Run {
            rses,
            workers,
            attempts,
            delta,
            keep_dumps,
        } => {
            if let Some(workers) = workers {
                config.auditor.workers = workers;
            }
            if let Some(attempts) = attempts {
                config.auditor.attempts = attempts;
            }
            if let Some(delta) = delta {
                config.auditor.delta_in_days = delta;
            }
            config.auditor.keep_dumps |= keep_dumps;
            config.validate()?;

            let dumps = Arc::new(LocalDumps::new(
                &config.local.dumps_dir,
                &config.local.catalog_dir,
            ));
            let rses = if rses.is_empty() {
                dumps.endpoints()?
            } else {
                rses
            };
            log::info!(
                "Starting audit of {} endpoints with {} workers",
                rses.len(),
                config.auditor.workers
            );

            let log_file = config.paths.log_file.clone();
            let summary = Auditor::new(config, dumps, store).run(&rses)?;

            log::info!("Log written to {}", log_file.display());
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Process {
            file,
            no_sanity_check,
            no_compress,
        } => {
            let mut options = OutputOptions::from(&config.auditor);
            options.sanity_check &= !no_sanity_check;
            options.compress &= !no_compress;

            let summary = OutputProcessor::new(store, options).process(&file)?;
            log::info!(
                "Quarantined {} DARK files for {} ({} LOST)",
                summary.dark,
                summary.rse,
                summary.lost
            );
            if let Some(compressed) = summary.compressed {
                log::info!("Compressed to {}", compressed.display());
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
