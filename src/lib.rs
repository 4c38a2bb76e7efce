pub mod browser;
pub mod config;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod scraper;
pub mod storage;
pub mod summarizer;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{CancelHandle, CancelSignal, GenerationOptions, PipelineOrchestrator, SourceRequest, VideoArtifact};
