pub mod cancel;
pub mod diagnostics;
pub mod orchestrator;
pub mod types;


pub use cancel::{CancelHandle, CancelSignal};
pub use diagnostics::{DiagnosticsRecorder, EventKind, RunDiagnostics, RunId, Stage, StageEvent};
pub use orchestrator::{build_prompt, PipelineOrchestrator};
pub use types::{parse_absolute_url, FailureReport, GenerationOptions, SourceRequest, VideoArtifact};
