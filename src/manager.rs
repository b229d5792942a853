//! Load/save/detect interface over every supported application
//!
//! Every mutating operation backs the current state up before writing.
//! Backups are best-effort: a failed backup is logged and the write goes on.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backup::BackupStore;
use crate::codec::codec_for;
use crate::config::Settings;
use crate::entry::EntryCollection;
use crate::error::SyncError;
use crate::external::{CliAdapter, CommandRunner, ProcessRunner, RemoveAllReport, SaveReport};
use crate::fs::write_atomic;
use crate::profile::{AppId, EntryFormat, Platform};
use crate::prompt::Prompt;

/// What a save or removal touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveSummary {
    /// A file was rewritten
    File {
        path: PathBuf,
        backup: Option<PathBuf>,
    },
    /// Entries were applied through the external tool
    Cli {
        report: SaveReport,
        backup: Option<PathBuf>,
    },
    /// Every entry was removed through the external tool
    CliCleared {
        report: RemoveAllReport,
        backup: Option<PathBuf>,
    },
}

impl SaveSummary {
    pub fn backup(&self) -> Option<&Path> {
        match self {
            SaveSummary::File { backup, .. }
            | SaveSummary::Cli { backup, .. }
            | SaveSummary::CliCleared { backup, .. } => backup.as_deref(),
        }
    }
}

pub struct ConfigManager {
    settings: Settings,
    platform: Platform,
    backups: BackupStore,
    cli: CliAdapter,
}

impl ConfigManager {
    /// Manager for the running platform using the real external tool
    pub fn new(settings: Settings) -> Result<Self> {
        let platform = Platform::current().context("Unsupported operating system")?;
        let runner = ProcessRunner::from_settings(&settings.external);
        Ok(Self::with_runner(settings, platform, Box::new(runner)))
    }

    pub fn with_runner(
        settings: Settings,
        platform: Platform,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        let cli = CliAdapter::new(
            AppId::ClaudeCode,
            runner,
            settings.external.scope.clone(),
            &settings.wrapper_dir,
        );
        Self {
            backups: BackupStore::from_settings(&settings),
            settings,
            platform,
            cli,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Installation state of every application, in catalog order
    pub fn detect_installed(&self) -> Vec<(AppId, bool)> {
        AppId::all()
            .iter()
            .map(|&app| {
                let installed =
                    app.is_installed(&self.settings, self.platform, || self.cli.is_available());
                (app, installed)
            })
            .collect()
    }

    /// Where an application's entries live, for display
    pub fn entries_location(&self, app: AppId) -> Option<String> {
        match app.entry_format() {
            EntryFormat::Cli => Some(format!("`{} mcp list`", self.settings.external.program)),
            _ => app
                .entries_path(&self.settings, self.platform)
                .map(|path| path.display().to_string()),
        }
    }

    /// Whether entries can be written to `app` at all
    pub fn can_store_entries(&self, app: AppId) -> bool {
        match app.entry_format() {
            EntryFormat::Cli => self.cli.is_available(),
            _ => app.entries_path(&self.settings, self.platform).is_some(),
        }
    }

    /// Current entries; `None` means "could not determine", not "empty"
    pub fn load_entries(&self, app: AppId) -> Option<EntryCollection> {
        let format = app.entry_format();
        let Some(codec) = codec_for(format) else {
            return self.cli.load();
        };
        let path = app.entries_path(&self.settings, self.platform)?;
        codec.load(&path)
    }

    /// Back up, then replace the application's entries with `entries`
    pub fn save_entries(
        &self,
        app: AppId,
        entries: &EntryCollection,
    ) -> Result<SaveSummary, SyncError> {
        let Some(codec) = codec_for(app.entry_format()) else {
            if !self.cli.is_available() {
                return Err(SyncError::NotAvailable(app));
            }
            let backup = self.snapshot_cli(app);
            let report = self.cli.save(entries)?;
            return Ok(SaveSummary::Cli { report, backup });
        };

        let path = app
            .entries_path(&self.settings, self.platform)
            .ok_or(SyncError::NotAvailable(app))?;
        let backup = self.backup_file(&path, app.id());

        codec
            .save(&path, entries)
            .map_err(|error| SyncError::Write { app, error })?;

        Ok(SaveSummary::File { path, backup })
    }

    /// Remove every entry from an application
    pub fn remove_all_entries(&self, app: AppId) -> Result<SaveSummary, SyncError> {
        if app.entry_format() != EntryFormat::Cli {
            return self.save_entries(app, &EntryCollection::new());
        }
        if !self.cli.is_available() {
            return Err(SyncError::NotAvailable(app));
        }

        let backup = self.snapshot_cli(app);
        let report = self.cli.remove_all();
        Ok(SaveSummary::CliCleared { report, backup })
    }

    /// Prompt text and the file it came from
    pub fn load_prompt(&self, app: AppId) -> Option<Prompt> {
        let path = app.prompt_path(&self.settings, self.platform)?;
        match fs::read_to_string(&path) {
            Ok(text) => Some(Prompt { text, path }),
            Err(e) => {
                tracing::debug!(app = %app, path = %path.display(), error = %e, "No prompt loaded");
                None
            }
        }
    }

    /// Back up, then write the application's prompt
    pub fn save_prompt(&self, app: AppId, text: &str) -> Result<PathBuf, SyncError> {
        if !app.supports_prompt() {
            return Err(SyncError::Unsupported {
                app,
                capability: "prompts",
            });
        }
        let path = app
            .prompt_path(&self.settings, self.platform)
            .ok_or(SyncError::NotAvailable(app))?;

        self.backup_file(&path, &format!("{}_prompt", app.id()));
        write_atomic(&path, text.as_bytes()).map_err(|error| SyncError::Write { app, error })?;
        tracing::info!(app = %app, path = %path.display(), "Wrote prompt");

        Ok(path)
    }

    fn backup_file(&self, path: &Path, owner: &str) -> Option<PathBuf> {
        match self.backups.backup(path, owner) {
            Ok(backup) => backup,
            Err(e) => {
                tracing::warn!(owner, error = format!("{e:#}"), "Backup failed, continuing");
                None
            }
        }
    }

    /// Keep the external tool's current listing as a JSON backup
    fn snapshot_cli(&self, app: AppId) -> Option<PathBuf> {
        let current = self.cli.load()?;
        let result = serde_json::to_string_pretty(&current)
            .context("Failed to serialize entries")
            .and_then(|json| self.backups.snapshot(app.id(), &json, ".json"));
        match result {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(app = %app, error = format!("{e:#}"), "Backup failed, continuing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::error::ToolError;
    use crate::external::ToolOutput;
    use tempfile::TempDir;

    struct MissingTool;

    impl CommandRunner for MissingTool {
        fn is_available(&self) -> bool {
            false
        }

        fn run(&self, _args: &[String]) -> Result<ToolOutput, ToolError> {
            Err(ToolError::NotInstalled {
                program: "claude".to_string(),
            })
        }
    }

    fn manager(temp: &TempDir) -> ConfigManager {
        ConfigManager::with_runner(
            Settings::for_home(temp.path()),
            Platform::Linux,
            Box::new(MissingTool),
        )
    }

    #[test]
    fn test_save_backs_up_before_writing() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let path = temp.path().join(".cursor/mcp_config.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"mcpServers": {"old": {"command": "old"}}}"#).unwrap();

        let entries = EntryCollection::new().with("new", Entry::new("x", ["1"]));
        let summary = manager.save_entries(AppId::Cursor, &entries).unwrap();

        let backup = summary.backup().unwrap();
        assert!(fs::read_to_string(backup).unwrap().contains("\"old\""));
        assert_eq!(manager.load_entries(AppId::Cursor), Some(entries));
    }

    #[test]
    fn test_save_without_existing_file_has_no_backup() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        let summary = manager
            .save_entries(AppId::Windsurf, &EntryCollection::new())
            .unwrap();

        assert_eq!(summary.backup(), None);
        assert!(temp.path().join(".windsurf/mcp.json").is_file());
    }

    #[test]
    fn test_missing_tool_is_not_available() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        assert_eq!(manager.load_entries(AppId::ClaudeCode), None);
        assert!(matches!(
            manager.save_entries(AppId::ClaudeCode, &EntryCollection::new()),
            Err(SyncError::NotAvailable(AppId::ClaudeCode))
        ));
        assert!(matches!(
            manager.remove_all_entries(AppId::ClaudeCode),
            Err(SyncError::NotAvailable(AppId::ClaudeCode))
        ));
    }

    #[test]
    fn test_intellij_without_config_dir_is_not_available() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        assert!(!manager.can_store_entries(AppId::IntelliJ));
        assert!(matches!(
            manager.save_entries(AppId::IntelliJ, &EntryCollection::new()),
            Err(SyncError::NotAvailable(AppId::IntelliJ))
        ));
    }

    #[test]
    fn test_detect_installed() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".cursor")).unwrap();
        fs::create_dir_all(temp.path().join(".cline")).unwrap();

        let detected = manager(&temp).detect_installed();

        assert_eq!(detected.len(), AppId::all().len());
        let installed: Vec<AppId> = detected
            .into_iter()
            .filter_map(|(app, installed)| installed.then_some(app))
            .collect();
        // Cline needs its settings file, not just the directory
        assert_eq!(installed, vec![AppId::Cursor]);
    }

    #[test]
    fn test_prompt_round_trip_with_backup() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        manager.save_prompt(AppId::Cline, "first").unwrap();
        let path = manager.save_prompt(AppId::Cline, "second").unwrap();

        let prompt = manager.load_prompt(AppId::Cline).unwrap();
        assert_eq!(prompt.text, "second");
        assert_eq!(prompt.path, path);
        assert_eq!(manager.backups().list("cline_prompt").unwrap().len(), 1);
        assert!(manager.backups().list("cline").unwrap().is_empty());
    }

    #[test]
    fn test_prompt_unsupported() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            manager(&temp).save_prompt(AppId::Windsurf, "text"),
            Err(SyncError::Unsupported {
                app: AppId::Windsurf,
                ..
            })
        ));
    }

    #[test]
    fn test_remove_all_from_file_app() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager
            .save_entries(
                AppId::Cline,
                &EntryCollection::new().with("a", Entry::new("x", ["1"])),
            )
            .unwrap();

        let summary = manager.remove_all_entries(AppId::Cline).unwrap();

        assert!(summary.backup().is_some());
        assert_eq!(manager.load_entries(AppId::Cline), Some(EntryCollection::new()));
    }
}
