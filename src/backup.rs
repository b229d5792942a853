//! Rolling backups of configuration files
//!
//! Every mutating save first copies the current file to
//! `<versions_dir>/{owner}_{YYYYMMDD_HHMMSS}{ext}`. Only the newest
//! `max_backups` copies per owner are kept.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::fs::{make_owner_writable, write_atomic};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Backup history directory with per-owner retention
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.versions_dir, settings.max_backups)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `path` into the history; `Ok(None)` when there is nothing to back up
    pub fn backup(&self, path: &Path, owner: &str) -> Result<Option<PathBuf>> {
        self.backup_at(path, owner, Local::now())
    }

    /// [`backup`](Self::backup) with an explicit creation time
    pub fn backup_at(
        &self,
        path: &Path,
        owner: &str,
        now: DateTime<Local>,
    ) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            return Ok(None);
        }

        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let dest = self.dir.join(backup_file_name(owner, now, &ext));

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create backup directory: {}", self.dir.display()))?;
        fs::copy(path, &dest).with_context(|| {
            format!("Failed to back up {} to {}", path.display(), dest.display())
        })?;
        // The copy carries the source's mode; a read-only one cannot be stamped
        if let Err(e) = make_owner_writable(&dest).and_then(|()| stamp(&dest, now)) {
            tracing::warn!(backup = %dest.display(), error = format!("{e:#}"), "Could not set backup modification time");
        }

        tracing::info!(owner, source = %path.display(), backup = %dest.display(), "Created backup");
        self.prune(owner)?;
        Ok(Some(dest))
    }

    /// Store `content` as a backup for state that does not live in a file
    pub fn snapshot(&self, owner: &str, content: &str, ext: &str) -> Result<PathBuf> {
        self.snapshot_at(owner, content, ext, Local::now())
    }

    pub fn snapshot_at(
        &self,
        owner: &str,
        content: &str,
        ext: &str,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let dest = self.dir.join(backup_file_name(owner, now, ext));
        write_atomic(&dest, content.as_bytes())?;
        if let Err(e) = stamp(&dest, now) {
            tracing::warn!(backup = %dest.display(), error = format!("{e:#}"), "Could not set snapshot modification time");
        }

        tracing::info!(owner, backup = %dest.display(), "Created snapshot");
        self.prune(owner)?;
        Ok(dest)
    }

    /// Backups belonging to `owner`, newest first
    pub fn list(&self, owner: &str) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = Regex::new(&format!(r"^{}_\d{{8}}_\d{{6}}(\.|$)", regex::escape(owner)))
            .context("Invalid backup owner pattern")?;

        let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Failed to read {}", self.dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !pattern.is_match(&name) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            backups.push((modified, entry.into_path()));
        }

        // Newest first; equal times fall back to the timestamped name
        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    /// Delete backups of `owner` beyond the retention limit, returning how many were removed
    pub fn prune(&self, owner: &str) -> Result<usize> {
        let mut removed = 0;
        for stale in self.list(owner)?.into_iter().skip(self.max_backups) {
            fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove old backup {}", stale.display()))?;
            tracing::debug!(owner, backup = %stale.display(), "Pruned backup");
            removed += 1;
        }
        Ok(removed)
    }
}

fn backup_file_name(owner: &str, at: DateTime<Local>, ext: &str) -> String {
    format!("{owner}_{}{ext}", at.format(TIMESTAMP_FORMAT))
}

/// Set the modification time retention sorts by
fn stamp(path: &Path, at: DateTime<Local>) -> Result<()> {
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::from(at)))
        .with_context(|| format!("Failed to set modification time of {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(second: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap() + Duration::seconds(second)
    }

    fn setup() -> (TempDir, BackupStore, PathBuf) {
        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("versions"), 10);
        let source = temp.path().join("mcp_settings.json");
        fs::write(&source, r#"{"mcpServers": {}}"#).unwrap();
        (temp, store, source)
    }

    #[test]
    fn test_backup_missing_file_is_noop() {
        let (temp, store, _) = setup();
        let result = store.backup(&temp.path().join("missing.json"), "cline").unwrap();

        assert_eq!(result, None);
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_backup_name_and_content() {
        let (_temp, store, source) = setup();
        let backup = store.backup_at(&source, "cline", at(5)).unwrap().unwrap();

        assert_eq!(
            backup.file_name().unwrap().to_string_lossy(),
            "cline_20250314_090005.json"
        );
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            r#"{"mcpServers": {}}"#
        );
    }

    #[test]
    fn test_retention_keeps_newest_ten() {
        let (_temp, store, source) = setup();

        for second in 0..11 {
            store.backup_at(&source, "cline", at(second)).unwrap();
        }

        let kept = store.list("cline").unwrap();
        assert_eq!(kept.len(), 10);
        assert!(!store.dir().join("cline_20250314_090000.json").exists());
        assert!(store.dir().join("cline_20250314_090010.json").exists());
        assert_eq!(
            kept.first().unwrap().file_name().unwrap().to_string_lossy(),
            "cline_20250314_090010.json"
        );
    }

    #[test]
    fn test_retention_is_per_owner() {
        let (_temp, store, source) = setup();
        let store = BackupStore::new(store.dir(), 2);

        for second in 0..3 {
            store.backup_at(&source, "cline", at(second)).unwrap();
            store
                .snapshot_at("cline_prompt", "text", ".txt", at(second))
                .unwrap();
        }

        assert_eq!(store.list("cline").unwrap().len(), 2);
        assert_eq!(store.list("cline_prompt").unwrap().len(), 2);
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_source_still_prunes() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, store, source) = setup();
        let store = BackupStore::new(store.dir(), 2);
        fs::set_permissions(&source, fs::Permissions::from_mode(0o444)).unwrap();

        for second in 0..4 {
            let backup = store.backup_at(&source, "cline", at(second)).unwrap().unwrap();
            let mode = fs::metadata(&backup).unwrap().permissions().mode();
            assert_eq!(mode & 0o200, 0o200);
        }

        let kept = store.list("cline").unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept[0].ends_with("cline_20250314_090003.json"));
        assert!(kept[1].ends_with("cline_20250314_090002.json"));
    }

    #[test]
    fn test_same_second_overwrites() {
        let (_temp, store, source) = setup();
        store.backup_at(&source, "cursor", at(1)).unwrap();
        fs::write(&source, "changed").unwrap();
        let backup = store.backup_at(&source, "cursor", at(1)).unwrap().unwrap();

        assert_eq!(store.list("cursor").unwrap().len(), 1);
        assert_eq!(fs::read_to_string(backup).unwrap(), "changed");
    }
}
