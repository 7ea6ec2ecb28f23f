mod catalog;
mod client;
mod error;
mod outcome;
mod pipeline;
mod session;
mod stage;
pub mod stages;

pub use catalog::{artifact_filename, looks_like_html_document, specification_filename, CONCEPTS};
pub use client::{ChunkCallback, StreamingClient, StructuredClient, TextStream};
pub use error::PipelineError;
pub use outcome::StreamOutcome;
pub use pipeline::{EntryToken, GenerationStatus, Pipeline, StageModels};
pub use session::{Session, SessionEvent};
pub use stage::Stage;

pub use tokio_util::sync::CancellationToken;
