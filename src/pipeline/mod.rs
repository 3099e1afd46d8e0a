//! Ingestion state machine.

mod machine;
mod state;

pub use machine::{IngestError, IngestionPipeline, SaveOutcome, StartOutcome};
pub use state::PipelineState;
