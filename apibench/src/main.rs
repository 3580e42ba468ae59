use apibench::config::Config;
use apibench::load::{LoadRunner, Profile, ProfileKind, RunOptions};
use apibench::summary::{Comparison, RunSummary, render_run_report};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "apibench", version, about = "Go vs Laravel API load driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a load profile, write the JSON summary and print the report
    Run {
        /// Load profile (defaults to LOAD_PROFILE or "comparison")
        #[arg(long, value_enum)]
        profile: Option<ProfileKind>,
        /// JSON summary path (defaults to SUMMARY_PATH or "summary.json")
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Print the comparison report for an existing JSON summary
    Report {
        /// Path to a summary.json file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    apibench::init_tracing();
    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = Config::from_env();

    match cli.command {
        Command::Run { profile, summary } => {
            if let Some(profile) = profile {
                config.load.profile = profile;
            }
            if let Some(path) = summary {
                config.summary.path = path;
            }
            run(&config).await
        }
        Command::Report { path } => {
            let summary = RunSummary::load_json(&path)?;
            print!("{}", Comparison::go_vs_laravel().render(&summary));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &Config) -> anyhow::Result<ExitCode> {
    let profile = Profile::from_config(&config.load)?;
    info!(
        "Loaded configuration: profile={}, go={}, laravel={}",
        profile.kind, config.load.go_api_url, config.load.laravel_api_url
    );

    let runner = LoadRunner::new(RunOptions::from(config));
    let outcome = runner.run(&profile).await?;

    outcome.summary.write_json(&config.summary.path)?;
    let report = match &profile.comparison {
        Some(comparison) => comparison.render(&outcome.summary),
        None => render_run_report(&outcome.summary),
    };
    print!("{}", report);

    if !outcome.thresholds_passed {
        error!("Some thresholds have failed");
    }
    Ok(ExitCode::from(outcome.exit_code()))
}
