pub mod cli;
pub mod config;
pub mod emotion;
pub mod export;
pub mod json_utils;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod orchestration;
pub mod parser;
pub mod pipeline;
pub mod recorder;
pub mod state;
pub mod url_utils;
pub mod writer_thread;

// Re-export main types for library usage
pub use emotion::{EmotionKey, EmotionVector};
pub use export::{summarize, StoreSummary};
pub use network::{Classifier, ClassifierClient, ClassifyError};
pub use parser::extract_page_text;
pub use pipeline::{PageEvent, Pipeline, PipelineError, PipelineOutcome, Tracker};
pub use recorder::{RecordError, VisitRecorder};
pub use state::{MemoryStore, RedbStore, StateError, StoreSnapshot, VisitId, VisitRecord, VisitStore};
pub use writer_thread::{WriterError, WriterThread};
