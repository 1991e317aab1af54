//! Run Executor: drives a run's documents through generation, single-doc
//! evaluation, pairwise comparison, ranking, and combination to completion
//! (spec.md §4.1, §5). Consumes the `StorageProvider`/`GeneratorAdapter`/
//! `JudgeClient` capability traits from the rest of the workspace; has no
//! opinion on HTTP, UI, or persistence backend.

pub mod abort_guard;
pub mod error;
pub mod events;
pub mod run_executor;
pub mod semaphores;

pub use abort_guard::EarlyAbortGuard;
pub use error::ExecutorError;
pub use events::{ChannelEventSink, EventSink, NullEventSink};
pub use run_executor::{ResolvedDocument, RunExecutor, RunExecutorDeps};
pub use semaphores::ConcurrencyLimits;
