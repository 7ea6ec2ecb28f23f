mod config;
mod wizard;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use playforge_agent::create_provider;
use playforge_core::{Pipeline, Stage, CONCEPTS};
use playforge_logging::{init_tracing, LogFormat, Logger};
use playforge_prompts::{StageInputs, StagePrompts};

use crate::config::{PlayforgeConfig, Settings};
use crate::wizard::{InterruptSlot, WizardOptions, WizardOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "playforge",
    about = "Build an educational AI/ML minigame in five LLM-assisted steps",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Concept to teach (skips the concept menu)
    #[arg(short, long)]
    concept: Option<String>,

    /// Model to use for every stage
    #[arg(short, long)]
    model: Option<String>,

    /// Directory the game and its PRD are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Working directory for playforge.toml lookup (default: current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also append pipeline events as JSON lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show resolved settings and the first prompt without calling the provider
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in AI/ML concepts
    Concepts,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    if let Some(Command::Concepts) = cli.command {
        for (i, concept) in CONCEPTS.iter().enumerate() {
            println!("{}. {}", i + 1, concept);
        }
        return Ok(());
    }

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // Precedence: CLI flags > project config > global config > defaults
    let global_config =
        PlayforgeConfig::load_global().context("Failed to load global configuration")?;
    let project_config = PlayforgeConfig::load_project(&working_dir)
        .context("Failed to load project configuration")?;
    let settings = Settings::resolve(
        cli.model.as_deref(),
        project_config.as_ref(),
        global_config.as_ref(),
    );

    if cli.dry_run {
        print_dry_run(&cli, &settings);
        return Ok(());
    }

    let logger = match &cli.log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let api_key_env = settings.provider.api_key_env.clone();
    let provider = create_provider(settings.provider).context("Failed to create provider")?;
    if !provider.is_available().await {
        anyhow::bail!(
            "No API key found. Set the {} environment variable.",
            api_key_env
        );
    }

    let mut pipeline = Pipeline::new(provider.as_ref(), settings.models, Arc::new(logger));

    // Ctrl+C stops an open stream; outside a stream it exits
    let interrupts = InterruptSlot::default();
    let handle = interrupts.clone();
    ctrlc::set_handler(move || {
        if handle.trigger() {
            eprintln!("\nInterrupted. Stopping stream...");
        } else {
            eprintln!("\nInterrupted.");
            std::process::exit(130);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    let options = wizard_options(&cli);
    let outcome = wizard::run(&mut pipeline, &options, &interrupts).await?;

    if cli.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    std::process::exit(outcome.exit_code());
}

/// Streamed text is echoed to stdout only without `--json-output`
fn wizard_options(cli: &Cli) -> WizardOptions {
    WizardOptions {
        concept: cli.concept.clone(),
        output_dir: cli.output_dir.clone(),
        echo_streams: !cli.json_output,
    }
}

fn print_dry_run(cli: &Cli, settings: &Settings) {
    println!("=== Dry Run ===");
    println!("Provider: {}", settings.provider.base_url);
    println!("API key env: {}", settings.provider.api_key_env);
    if let Some(timeout) = settings.provider.timeout {
        println!("Timeout: {}s", timeout.as_secs());
    }
    for stage in Stage::ALL {
        if let Some(model) = settings.models.for_stage(stage) {
            println!(
                "Step {} ({}): {}",
                stage.number(),
                stage.agent_name().unwrap_or_default(),
                model
            );
        }
    }
    println!("Output dir: {}", cli.output_dir.display());

    let inputs = StageInputs {
        concept: cli.concept.as_deref(),
        ..Default::default()
    };
    match StagePrompts::ideas(&inputs) {
        Ok(prompt) => {
            println!();
            println!("--- System prompt ---");
            println!("{}", prompt.system);
            println!("--- User prompt ---");
            println!("{}", prompt.user);
        }
        Err(_) => println!("Concept: chosen interactively"),
    }
}

fn print_outcome(outcome: &WizardOutcome) {
    match outcome {
        WizardOutcome::Completed {
            artifact,
            specification,
            artifact_bytes,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== GAME READY ===".bright_green().bold());
            eprintln!("Game: {} ({} bytes)", artifact.display(), artifact_bytes);
            eprintln!("PRD: {}", specification.display());
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        WizardOutcome::Failed {
            stage,
            error,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== FAILED ===".bright_red().bold());
            eprintln!("Step {} ({}): {}", stage.number(), stage, error);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        WizardOutcome::UserQuit {
            stage,
            total_duration_secs,
        } => {
            eprintln!();
            eprintln!("=== STOPPED ===");
            eprintln!("Stopped during step {} ({})", stage.number(), stage);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
    }
}
