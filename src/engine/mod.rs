//! Core engine — plan execution across accounts.
//!
//! `orchestrator` fans a priced plan out to one `executor` pipeline per
//! account, `progress` carries live updates out of those pipelines, and
//! `accountant` turns recorded attempts into statistics.

pub mod accountant;
pub mod executor;
pub mod orchestrator;
pub mod progress;

pub use accountant::{Accountant, StatisticsReport};
pub use orchestrator::{AccountOrchestrator, OrchestrationReport, OrchestratorConfig};
pub use progress::{ChannelSink, LogSink, NoopSink, ProgressSink, ProgressUpdate};
