//! Generator adapter interface, subprocess runner, and the FPF/GPT-R adapters
//! (spec.md §4.2).

pub mod adapter;
pub mod fpf;
pub mod gptr;
pub mod subprocess;

pub use adapter::{
    send_progress, GenerationMetadata, GenerationOutcome, GenerationRequest, GeneratorAdapter,
    ProgressEvent, ProgressMessage, ProgressSink,
};
pub use fpf::FpfAdapter;
pub use gptr::{GptrAdapter, GptrModelEnv};
pub use subprocess::{AttemptOutcome, ExitClassifier, SubprocessConfig, SubprocessRunner};
