//! mcpsync - MCP server configuration synchronization
//!
//! Keeps the MCP server entries (command, arguments, environment, working
//! directory) of several desktop applications consistent. Each application
//! stores its entries in its own format and location; mcpsync loads one,
//! merges it into another under a chosen policy, resolves conflicts, and
//! writes the result back while keeping rolling backups.

pub mod app_ids;
pub mod backup;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod external;
pub mod fs;
pub mod manager;
pub mod merge;
pub mod profile;
pub mod prompt;
pub mod resolve;
pub mod sync;
pub mod templating;

pub use backup::BackupStore;
pub use config::Settings;
pub use entry::{Entry, EntryCollection};
pub use error::{SyncError, ToolError};
pub use external::{CliAdapter, CommandRunner, ProcessRunner, SaveReport, ToolOutput};
pub use manager::{ConfigManager, SaveSummary};
pub use merge::{Choice, Conflict, MergeOutcome, MergePolicy, Resolution, merge};
pub use profile::{AppId, EntryFormat, Platform, PromptFormat};
pub use resolve::{
    ConflictResolver, DeferredResolver, InteractiveResolver, PendingDocument, ResolutionState,
    UniformResolver,
};
pub use sync::{PromptSyncReport, Superset, SyncEngine, SyncReport};
