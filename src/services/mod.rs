pub mod chunker;
pub mod embedding;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod storage;
#[cfg(test)]
pub(crate) mod testing;
pub mod worker;

pub use chunker::{TextChunker, split_text};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use pipeline::{Pipeline, PipelineOptions, RunStats};
pub use progress::{ConsoleProgress, NoopProgress, ProgressReporter};
pub use queue::WorkQueue;
pub use storage::{EmbeddingStore, create_store};
pub use worker::{Worker, WorkerContext, WorkerStats};
