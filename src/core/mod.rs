pub mod orchestrator;
pub mod pump;
pub mod registry;
pub mod synth;
pub mod transcribe;

// Re-export commonly used types for convenience
pub use orchestrator::CallOrchestrator;
pub use registry::{CallRecord, CallRegistry, CallState, Speaker};
pub use synth::Synthesizer;
pub use transcribe::{SttConfig, TranscriptionSession};
