//! hftmon engine library
//!
//! Core functionality for the hftmon toolkit: loading the sections catalog,
//! running diagnostic commands, sampling and monitoring metrics against
//! thresholds, persisting and querying history, collecting full system
//! reports and asking a local LLM for tuning advice.

pub mod advisor;
pub mod artifacts;
pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod interface;
pub mod logging;
pub mod monitor;
pub mod sampler;
pub mod scheduler;
pub mod sections;
pub mod service;

// Re-export commonly used types
pub use advisor::{
    parse_reply, Advisor, AdvisorReply, AnalysisContext, AnalysisResult, ChatMessage, ChatRole, LlmBackend,
    OllamaBackend, Recommendation, Risk, ThresholdChat,
};
pub use artifacts::{default_selection, render_report, render_tuning_script, write_artifacts, TuningArtifacts};
pub use collector::{CollectionReport, SystemCollector};
pub use config::EngineConfig;
pub use error::{AdvisorError, ArtifactError, ConfigError, EngineError, HistoryError, Result, SettingsError};
pub use executor::{CommandExecutor, CommandOutcome, CommandRunner, CommandStatus, FailureReason, ShellRunner};
pub use history::{HistoryLog, HistoryRange, HistoryRecord, HistoryStore, HistoryView, SummaryStats};
pub use interface::{FixedProbe, InterfaceProbe, SystemProbe, UNKNOWN_INTERFACE};
pub use monitor::{BreachState, MetricBuffer, Monitor, MonitorSession, MonitorState, Sample, TickReport};
pub use sampler::{SampleValue, Sampler, Snapshot};
pub use scheduler::{MonitorHandle, MonitorScheduler, UpdateInterval};
pub use sections::{MetricDefinition, MetricKind, SectionsCatalog, ALL_SECTIONS};
pub use service::{MonitorService, ServiceStats};
