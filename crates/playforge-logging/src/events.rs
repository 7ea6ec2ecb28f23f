use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for the stage pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    PipelineStarted {
        run_id: String,
    },
    StageEntered {
        stage: String,
        number: u8,
        entry: u64,
    },
    AnswerRecorded {
        question: String,
        option: String,
        answered: usize,
        total: usize,
    },
    GenerationStarted {
        stage: String,
        model: String,
        attempt: u32,
    },
    /// One streamed chunk arrived; the text itself goes to the caller
    StreamChunk {
        stage: String,
        index: usize,
        len: usize,
    },
    GenerationCompleted {
        stage: String,
        duration_secs: f64,
        bytes: usize,
        chunks: Option<usize>,
    },
    GenerationFailed {
        stage: String,
        error: String,
        retryable: bool,
    },
    GenerationDeduplicated {
        stage: String,
    },
    StreamAbandoned {
        stage: String,
        discarded_bytes: usize,
    },
    PipelineCompleted {
        run_id: String,
        duration_secs: f64,
        artifact_bytes: usize,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for pipeline events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
    quiet: bool,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
            quiet: false,
        }
    }

    /// A logger that writes nothing to the console
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Compact,
            file_writer: None,
            quiet: true,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
            quiet: false,
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if self.quiet {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::PipelineStarted { run_id } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "playforge".bold().bright_white(),
                    " ".repeat(58) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Run:".dimmed(),
                    Self::truncate_with_padding(run_id, 62, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::StageEntered { stage, number, .. } => {
                let header = format!("─ Step {} · {} ", number, stage);
                let padding = "─".repeat(67usize.saturating_sub(header.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::AnswerRecorded {
                answered, total, ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {}/{} answered",
                    "✓".bright_green(),
                    answered,
                    total
                );
            }
            LogEvent::GenerationStarted {
                stage,
                model,
                attempt,
            } => {
                let retry = if *attempt > 1 {
                    format!(" (attempt {})", attempt)
                } else {
                    String::new()
                };
                let _ = writeln!(
                    stderr,
                    "  {} {} {}{}",
                    "▶".bright_cyan(),
                    stage.bright_cyan().bold(),
                    format!("[{}]", model).dimmed(),
                    retry.dimmed()
                );
            }
            LogEvent::StreamChunk { .. } => {
                // Chunk text is printed by the caller
            }
            LogEvent::GenerationCompleted {
                duration_secs,
                bytes,
                ..
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "    {} Done ({:.1}s, {} bytes)",
                    "✓".bright_green(),
                    duration_secs,
                    bytes
                );
                let _ = writeln!(stderr);
            }
            LogEvent::GenerationFailed {
                stage,
                error,
                retryable,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "    {} {} failed: {}",
                    "✗".bright_red(),
                    stage,
                    error.bright_red()
                );
                if *retryable {
                    let _ = writeln!(stderr, "    {}", "You can retry this step.".dimmed());
                }
            }
            LogEvent::GenerationDeduplicated { stage } => {
                let _ = writeln!(
                    stderr,
                    "    {} {}",
                    "→".dimmed(),
                    format!("{} already generated, reusing result", stage).dimmed()
                );
            }
            LogEvent::StreamAbandoned {
                stage,
                discarded_bytes,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "    {} {} stopped, discarded {} bytes",
                    "⚠".bright_yellow(),
                    stage,
                    discarded_bytes
                );
            }
            LogEvent::PipelineCompleted { .. } => {
                // Final summary is printed by the CLI
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::PipelineStarted { run_id } => {
                format!("[{}] pipeline:start {}", timestamp, run_id)
            }
            LogEvent::StageEntered {
                stage,
                number,
                entry,
            } => format!(
                "[{}] stage:{}:{} entry={}",
                timestamp, number, stage, entry
            ),
            LogEvent::AnswerRecorded {
                answered, total, ..
            } => format!("[{}] answer:{}/{}", timestamp, answered, total),
            LogEvent::GenerationStarted {
                stage,
                model,
                attempt,
            } => format!(
                "[{}] gen:start:{} model={} attempt={}",
                timestamp, stage, model, attempt
            ),
            LogEvent::StreamChunk { .. } => return,
            LogEvent::GenerationCompleted {
                stage,
                duration_secs,
                bytes,
                ..
            } => format!(
                "[{}] gen:done:{} {}b {:.1}s",
                timestamp, stage, bytes, duration_secs
            ),
            LogEvent::GenerationFailed { stage, error, .. } => {
                format!("[{}] gen:error:{}:{}", timestamp, stage, error)
            }
            LogEvent::GenerationDeduplicated { stage } => {
                format!("[{}] gen:dedup:{}", timestamp, stage)
            }
            LogEvent::StreamAbandoned {
                stage,
                discarded_bytes,
            } => format!(
                "[{}] stream:abandoned:{} {}b",
                timestamp, stage, discarded_bytes
            ),
            LogEvent::PipelineCompleted {
                duration_secs,
                artifact_bytes,
                ..
            } => format!(
                "[{}] pipeline:done {}b {:.1}s",
                timestamp, artifact_bytes, duration_secs
            ),
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = LogEvent::GenerationFailed {
            stage: "Requirements".to_string(),
            error: "rate limited".to_string(),
            retryable: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "generation_failed");
        assert_eq!(json["stage"], "Requirements");

        let parsed: LogEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_file_logging_appends_timestamped_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");

        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap();
        logger.log(&LogEvent::PipelineStarted {
            run_id: "run-1".to_string(),
        });
        logger.log(&LogEvent::GenerationDeduplicated {
            stage: "Ideas".to_string(),
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "pipeline_started");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn test_truncate_with_padding() {
        let padded = Logger::truncate_with_padding("abc", 10, 8);
        assert_eq!(padded, "abc    │");
        let truncated = Logger::truncate_with_padding("abcdefghijkl", 6, 8);
        assert!(truncated.starts_with("abc..."));
    }
}
