use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::external::SaveReport;
use crate::profile::AppId;

/// Failure of one external tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{program}` is not installed or not on PATH")]
    NotInstalled { program: String },
    #[error("Command failed (exit code {}): {message}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Failed { code: Option<i32>, message: String },
    #[error("Command timed out after {}s", after.as_secs())]
    TimedOut { after: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Whether the tool refused an add because the name is taken.
    ///
    /// The tool reports this only as message text.
    pub fn is_already_exists(&self) -> bool {
        match self {
            ToolError::Failed { message, .. } => message.to_lowercase().contains("already exists"),
            _ => false,
        }
    }
}

/// Failure of a synchronization operation
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} is not installed or its configuration could not be read")]
    NotAvailable(AppId),
    #[error("{app} does not support {capability}")]
    Unsupported {
        app: AppId,
        capability: &'static str,
    },
    #[error("{0} has nothing to sync")]
    EmptySource(AppId),
    #[error("Source and target must be different applications")]
    SameApp,
    #[error(
        "{} conflict(s) need resolution; edit {} and run `mcpsync resolve`",
        names.len(),
        document.display()
    )]
    ConflictPending { names: Vec<String>, document: PathBuf },
    #[error("Failed to add `{entry}`: {source}")]
    ExternalTool {
        entry: String,
        source: ToolError,
        /// What was applied before the failure
        report: SaveReport,
    },
    #[error("Failed to write {app}: {error:#}")]
    Write { app: AppId, error: anyhow::Error },
    #[error("Conflict resolution failed: {0:#}")]
    Resolve(anyhow::Error),
    #[error("No application provided any entries")]
    NoSources,
}
