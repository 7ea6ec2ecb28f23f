//! Interactive terminal wizard over the stage pipeline.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{FuzzySelect, Input, Select};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use playforge_core::{
    artifact_filename, looks_like_html_document, specification_filename, CancellationToken,
    ChunkCallback, Pipeline, PipelineError, Session, Stage, StreamOutcome, CONCEPTS,
};

const OTHER_CONCEPT: &str = "Something else...";

/// Options that shape the wizard but not the pipeline
#[derive(Debug, Clone)]
pub struct WizardOptions {
    /// Skip the concept menu
    pub concept: Option<String>,
    pub output_dir: PathBuf,
    /// Print streamed PRD and game text to stdout as it arrives
    pub echo_streams: bool,
}

/// How a wizard run ended
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WizardOutcome {
    Completed {
        artifact: PathBuf,
        specification: PathBuf,
        artifact_bytes: usize,
        total_duration_secs: f64,
    },
    /// A non-retryable error, or the user declined to retry
    Failed {
        stage: Stage,
        error: String,
        total_duration_secs: f64,
    },
    /// The user chose to stop
    UserQuit {
        stage: Stage,
        total_duration_secs: f64,
    },
}

impl WizardOutcome {
    fn failed(pipeline: &Pipeline<'_>, error: &PipelineError) -> Self {
        Self::Failed {
            stage: pipeline.stage(),
            error: error.to_string(),
            total_duration_secs: pipeline.elapsed().as_secs_f64(),
        }
    }

    fn quit(pipeline: &Pipeline<'_>) -> Self {
        Self::UserQuit {
            stage: pipeline.stage(),
            total_duration_secs: pipeline.elapsed().as_secs_f64(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            WizardOutcome::Completed { .. } => 0,
            WizardOutcome::Failed { .. } => 1,
            WizardOutcome::UserQuit { .. } => 130,
        }
    }
}

/// Holds the cancellation token of whichever stream is currently open
#[derive(Clone, Default)]
pub struct InterruptSlot {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptSlot {
    /// A fresh token for the stream about to open
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(token.clone());
        }
        token
    }

    pub fn disarm(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }

    /// Cancel the open stream; `false` if none was open
    pub fn trigger(&self) -> bool {
        match self.current.lock() {
            Ok(current) => match current.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

pub async fn run(
    pipeline: &mut Pipeline<'_>,
    options: &WizardOptions,
    interrupts: &InterruptSlot,
) -> Result<WizardOutcome> {
    loop {
        match pipeline.stage() {
            Stage::ConceptSelection => {
                print_stage_header(pipeline.stage());
                let concept = match &options.concept {
                    Some(concept) => concept.clone(),
                    None => choose_concept()?,
                };
                if let Err(e) = pipeline.select_concept(&concept) {
                    return Ok(WizardOutcome::failed(pipeline, &e));
                }
            }
            Stage::IdeaSelection => {
                print_stage_header(pipeline.stage());
                loop {
                    match pipeline.generate_ideas().await.map(|_| ()) {
                        Ok(()) => break,
                        Err(e) if should_retry(&e)? => continue,
                        Err(e) => return Ok(WizardOutcome::failed(pipeline, &e)),
                    }
                }

                let items: Vec<String> = pipeline
                    .ideas()
                    .iter()
                    .map(|idea| format!("{} - {}", idea.title, idea.description))
                    .collect();
                let choice = Select::new()
                    .with_prompt("Select a game idea")
                    .items(&items)
                    .default(0)
                    .interact()?;
                let id = pipeline.ideas()[choice].id;
                if let Err(e) = pipeline.select_idea(id) {
                    return Ok(WizardOutcome::failed(pipeline, &e));
                }
            }
            Stage::RequirementsGathering => {
                print_stage_header(pipeline.stage());
                loop {
                    match pipeline.generate_requirements().await.map(|_| ()) {
                        Ok(()) => break,
                        Err(e) if should_retry(&e)? => continue,
                        Err(e) => return Ok(WizardOutcome::failed(pipeline, &e)),
                    }
                }

                let questions = pipeline.session().questions().to_vec();
                let total = questions.len();
                for (i, question) in questions.iter().enumerate() {
                    eprintln!(
                        "  {}",
                        format!("Question {} of {}", i + 1, total).dimmed()
                    );
                    let choice = Select::new()
                        .with_prompt(&question.question)
                        .items(&question.options)
                        .default(0)
                        .interact()?;
                    let option = &question.options[choice];
                    if let Err(e) = pipeline.record_answer(&question.question, option) {
                        return Ok(WizardOutcome::failed(pipeline, &e));
                    }
                }
            }
            Stage::SpecificationReview => {
                print_stage_header(pipeline.stage());
                loop {
                    let cancel = interrupts.arm();
                    let result = pipeline
                        .generate_specification(cancel, stream_printer(options))
                        .await;
                    interrupts.disarm();
                    end_stream_output(options);
                    match result {
                        Ok(StreamOutcome::Completed { .. }) => break,
                        Ok(StreamOutcome::Abandoned { .. }) => {
                            if !restart_after_interrupt()? {
                                return Ok(WizardOutcome::quit(pipeline));
                            }
                        }
                        Err(e) if should_retry(&e)? => continue,
                        Err(e) => return Ok(WizardOutcome::failed(pipeline, &e)),
                    }
                }

                let proceed = Select::new()
                    .with_prompt("Build the game from this specification?")
                    .items(&["Yes, generate the game", "No, quit"])
                    .default(0)
                    .interact()?;
                if proceed != 0 {
                    return Ok(WizardOutcome::quit(pipeline));
                }
            }
            Stage::CodeGeneration => {
                print_stage_header(pipeline.stage());
                loop {
                    let cancel = interrupts.arm();
                    let result = pipeline.generate_code(cancel, stream_printer(options)).await;
                    interrupts.disarm();
                    end_stream_output(options);
                    match result {
                        Ok(StreamOutcome::Completed { .. }) => break,
                        Ok(StreamOutcome::Abandoned { .. }) => {
                            if !restart_after_interrupt()? {
                                return Ok(WizardOutcome::quit(pipeline));
                            }
                        }
                        Err(e) if should_retry(&e)? => continue,
                        Err(e) => return Ok(WizardOutcome::failed(pipeline, &e)),
                    }
                }
            }
            Stage::Done => {
                let (artifact, specification) =
                    save_artifacts(pipeline.session(), &options.output_dir)?;
                return Ok(WizardOutcome::Completed {
                    artifact,
                    specification,
                    artifact_bytes: pipeline
                        .session()
                        .generated_artifact()
                        .map_or(0, str::len),
                    total_duration_secs: pipeline.elapsed().as_secs_f64(),
                });
            }
        }

        if let Err(e) = pipeline.advance() {
            return Ok(WizardOutcome::failed(pipeline, &e));
        }
    }
}

/// Write the PRD and the game into `output_dir`, returning `(game, prd)` paths
pub fn save_artifacts(session: &Session, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let code = session
        .generated_artifact()
        .context("No generated game to save")?;
    let specification = session
        .specification()
        .context("No specification to save")?;
    let title = session.selected_idea().map(|idea| idea.title.as_str());

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    if !looks_like_html_document(code) {
        eprintln!(
            "{} The generated game does not look like a complete HTML document.",
            "⚠".bright_yellow()
        );
    }

    let artifact_path = output_dir.join(artifact_filename(title));
    std::fs::write(&artifact_path, code)
        .with_context(|| format!("Failed to write {}", artifact_path.display()))?;

    let specification_path = output_dir.join(specification_filename(title));
    std::fs::write(&specification_path, specification)
        .with_context(|| format!("Failed to write {}", specification_path.display()))?;

    Ok((artifact_path, specification_path))
}

fn print_stage_header(stage: Stage) {
    if let Some(agent) = stage.agent_name() {
        eprintln!("  {} {}", "Agent:".dimmed(), agent.bright_cyan());
    }
}

fn choose_concept() -> Result<String> {
    let mut items: Vec<&str> = CONCEPTS.to_vec();
    items.push(OTHER_CONCEPT);

    let choice = FuzzySelect::new()
        .with_prompt("Choose an AI/ML concept")
        .items(&items)
        .default(0)
        .interact()?;

    if items[choice] == OTHER_CONCEPT {
        let concept: String = Input::new()
            .with_prompt("Concept")
            .interact_text()?;
        Ok(concept)
    } else {
        Ok(items[choice].to_string())
    }
}

/// Ask whether to retry after a retryable failure
fn should_retry(err: &PipelineError) -> Result<bool> {
    if !err.is_retryable() {
        return Ok(false);
    }
    let choice = Select::new()
        .with_prompt(format!("{} Retry this step?", "✗".bright_red()))
        .items(&["Retry", "Quit"])
        .default(0)
        .interact()?;
    Ok(choice == 0)
}

fn restart_after_interrupt() -> Result<bool> {
    let choice = Select::new()
        .with_prompt("Stream stopped. Start this step again?")
        .items(&["Start again", "Quit"])
        .default(0)
        .interact()?;
    Ok(choice == 0)
}

/// Print streamed chunks to stdout as they arrive
/// Chunk printer for streamed stages; `None` keeps stdout free for JSON output
fn stream_printer(options: &WizardOptions) -> Option<ChunkCallback> {
    if !options.echo_streams {
        return None;
    }
    Some(Arc::new(|chunk: &str| {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }))
}

fn end_stream_output(options: &WizardOptions) {
    if options.echo_streams {
        println!();
    }
}
