//! Papertrack Core - orchestration and resilience for the paper pipeline
//!
//! Drives each discovered paper through Retrieve, Summarize and Report with
//! per-stage retry policies, and folds the per-paper outcomes into a batch
//! report with a single exit status. External services are reached through
//! the traits in [`collab`].

pub mod batch;
pub mod classify;
pub mod collab;
pub mod discover;
pub mod error;
pub mod http;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use batch::{BatchCoordinator, BatchRun};
pub use classify::{
    matches_keywords, CitationClassifier, CitationCriteria, ClassicStrategy, RateGate, Selection,
    Verdict,
};
pub use collab::{
    CitationLookup, Extractor, PaperSource, ReportWriter, Retriever, SearchQuery, SortOrder,
    Summarizer, TimeWindow,
};
pub use discover::{Discovered, Discoverer, DiscoveryPlan};
pub use error::{parse_retry_after, ErrorKind, StageError};
pub use http::{http_client, SHARED_RUNTIME};
pub use logging::{init_logging, IndicatifLogger};
pub use model::{
    Artifacts, BatchReport, CitationSignal, ExitStatus, Paper, PaperOutcome, PaperStatus, Stage,
    StageRecord, StageResult,
};
pub use pipeline::{source_file_name, Collaborators, PaperPipeline, PipelinePolicies, StageRunner};
pub use progress::{fmt_duration, ProgressContext, SharedProgress};
pub use retry::{Execution, RecordingSleeper, RetryPolicy, RetryState, Retrier, Sleeper, ThreadSleeper};
pub use shutdown::Shutdown;
pub use work_queue::WorkQueue;
