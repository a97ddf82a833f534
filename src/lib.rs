pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod path_validation;
pub mod process_control;
pub mod runtime;
pub mod transfer;
pub mod watcher;

#[cfg(test)]
mod lib_tests;

pub use config::{AppConfig, PipelineSettings, TransferDirection};
pub use error::PipelineError;
pub use logging::{LogEntry, LogLevel, LogManager};
pub use orchestrator::{FolderPair, NullListener, PipelineListener, PipelineState, TransferOrchestrator};
pub use process_control::{CommandProcessController, NoopProcessController, ProcessController};
pub use runtime::{Command, PipelineRuntime, RuntimeHandle, WorkerEvent};
pub use transfer::{
    IntegrityVerifier, PathEnumerator, TransferEngine, TransferPlan, TransferProgress, VerificationReport,
};
pub use watcher::{ChangeNotifier, NotifyWatcher, StabilityDetector};

/// Crate version, as reported by the CLI.
pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
