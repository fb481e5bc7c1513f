mod commands;
mod config;
mod engine;
mod evaluator;
mod executor;
mod generator;
mod synthesizer;

use anyhow::{Context, Result};
use assay_common::config::RunnerSettings;
use assay_common::types::Actor;
use clap::{Parser, Subcommand};
use engine::{CommandSpec, ExecutionPlan};
use executor::Strategy;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assay")]
#[command(about = "Assay - generate tests, execute submissions and grade them", long_about = None)]
struct Cli {
    /// Working area shared by all stages [env: ASSAY_WORK_DIR]
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Task directory holding config/test.json [env: ASSAY_TASK_DIR]
    #[arg(long, global = true)]
    task_dir: Option<PathBuf>,

    /// Wall-clock limit per process invocation [env: ASSAY_TIMEOUT_MS]
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Seed for random test generation [env: ASSAY_SEED]
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn settings(&self) -> RunnerSettings {
        let mut settings = RunnerSettings::from_env();
        if let Some(dir) = &self.work_dir {
            settings.work_dir = dir.clone();
        }
        if let Some(dir) = &self.task_dir {
            settings.task_dir = dir.clone();
        }
        if let Some(ms) = self.timeout_ms {
            settings.timeout_ms = ms;
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reset the working area from the task input JSON on stdin
    Preprocess,

    /// Synthesize the test dataset
    Generate,

    /// Run one actor over the dataset
    Execute {
        /// submission or reference
        #[arg(short, long)]
        actor: Actor,

        /// Compile command, run once before any record
        #[arg(short, long)]
        compile: Option<String>,

        /// Drive a long-lived adapter instead of one process per record
        #[arg(long, default_value = "false")]
        persistent: bool,

        /// Run command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Grade the submission and print the report
    Feedback,

    /// Generate, execute and grade against expected outputs in one go
    Test {
        /// Compile command, run once before any record
        #[arg(short, long)]
        compile: Option<String>,

        /// Run command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ASSAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries the grading report
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_plan(compile: Option<&str>, command: &[String]) -> Result<ExecutionPlan> {
    let compile = compile
        .map(CommandSpec::parse)
        .transpose()
        .context("Invalid compile command")?;
    let run = CommandSpec::from_argv(command).context("Invalid run command")?;
    Ok(ExecutionPlan { compile, run })
}

fn print_report(report: &assay_common::types::GradingReport) -> Result<()> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}

async fn run(command: Commands, settings: &RunnerSettings) -> Result<()> {
    match command {
        Commands::Preprocess => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read task input from stdin")?;
            commands::preprocess(settings, &raw)?;
        }
        Commands::Generate => {
            commands::generate(settings)?;
        }
        Commands::Execute {
            actor,
            compile,
            persistent,
            command,
        } => {
            let plan = build_plan(compile.as_deref(), &command)?;
            let strategy = if persistent {
                Strategy::Persistent
            } else {
                Strategy::SpawnPerRecord
            };
            commands::execute(settings, actor, &plan, strategy).await?;
        }
        Commands::Feedback => {
            let report = commands::feedback(settings)?;
            print_report(&report)?;
        }
        Commands::Test { compile, command } => {
            let plan = build_plan(compile.as_deref(), &command)?;
            let report = commands::test(settings, &plan).await?;
            print_report(&report)?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = cli.settings();
    info!(
        work_dir = %settings.work_dir.display(),
        task_dir = %settings.task_dir.display(),
        timeout_ms = settings.timeout_ms,
        "Assay starting"
    );

    if let Err(e) = run(cli.command, &settings).await {
        error!(error = %format!("{:#}", e), "Pipeline stage failed");
        return Err(e);
    }
    Ok(())
}
