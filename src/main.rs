//! hm - inspect harbormaster configuration and job schedules.
//!
//! Usage:
//!   hm validate --config <file>              Validate a configuration file
//!   hm schedules --config <file> [--count N] Show effective schedules of the built-in jobs
//!   hm resolve <value> [--default <expr>]    Resolve a raw schedule setting

use chrono::Utc;
use clap::{Parser, Subcommand};
use harbormaster::jobs::{BUILTIN_JOBS, GITOPS_SYNC};
use harbormaster::{AppConfig, YamlLoader, resolve};
use std::path::PathBuf;
use tracing::{error, info};

/// hm - harbormaster configuration tool
#[derive(Parser)]
#[command(name = "hm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Show enablement, effective schedule and next fire times of the built-in jobs
    Schedules {
        /// Path to the YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Number of upcoming fire times to show per job
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,
    },

    /// Resolve a raw schedule setting into a cron expression
    Resolve {
        /// Raw settings value (cron expression or legacy minute count)
        #[arg(value_name = "VALUE")]
        value: String,

        /// Expression used when the value is empty or invalid
        #[arg(short, long, default_value = GITOPS_SYNC.default_schedule)]
        default: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Schedules { config, count } => {
            show_schedules(config, count)?;
        }
        Commands::Resolve { value, default } => {
            println!("{}", resolve(&value, &default));
        }
    }

    Ok(())
}

/// Validate a configuration file.
fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_file(&path) {
        Ok(config) => {
            info!(
                timezone = %config.timezone,
                max_workers = config.updater.max_workers,
                settings = config.settings.len(),
                "Configuration is valid"
            );
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Print the effective schedule of every built-in job.
fn show_schedules(path: PathBuf, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config: AppConfig = YamlLoader::load_file(&path)?;
    let settings = config.settings_provider()?;
    let now = Utc::now();

    println!("Jobs (timezone: {}):", config.timezone);
    println!();

    for job in BUILTIN_JOBS {
        let schedule = job.schedule(&settings, &config.timezone)?;
        println!("{}", job.name);
        println!("  Enabled: {}", job.is_enabled(&settings));
        println!("  Schedule: {}", schedule.expression());
        for next in schedule.next_n_after(now, count)? {
            println!("    - {}", next.to_rfc3339());
        }
        println!();
    }

    Ok(())
}
