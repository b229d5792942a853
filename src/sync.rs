//! Synchronization engine
//!
//! Load a source collection, merge it into a target under a policy, route
//! conflicts to a resolver, then back up and save the target.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::entry::{Entry, EntryCollection};
use crate::error::SyncError;
use crate::manager::{ConfigManager, SaveSummary};
use crate::merge::{MergeOutcome, MergePolicy, Resolution, merge};
use crate::profile::AppId;
use crate::prompt;
use crate::resolve::{ConflictResolver, PendingDocument, ResolutionState};

/// What an entry sync did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// `None` when the source was a superset of several applications
    pub from: Option<AppId>,
    pub to: AppId,
    pub policy: MergePolicy,
    /// Names newly added to the target
    pub added: Vec<String>,
    /// Differing names kept from the target without asking
    pub kept_target: Vec<String>,
    pub resolutions: Vec<Resolution>,
    /// Entries in the target after the sync
    pub total: usize,
    pub summary: SaveSummary,
}

/// What a prompt sync did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSyncReport {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Markdown was stripped for a plain-text target
    pub converted: bool,
}

/// Two applications defining the same name differently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersetConflict {
    pub name: String,
    pub kept_from: AppId,
    pub kept: Entry,
    pub other_from: AppId,
    pub other: Entry,
}

/// Union of several applications' entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Superset {
    /// First provider wins for each name
    pub entries: EntryCollection,
    /// Applications defining each name, in the order they were read
    pub providers: BTreeMap<String, Vec<AppId>>,
    pub conflicts: Vec<SupersetConflict>,
    /// Applications whose entries could not be read
    pub unavailable: Vec<AppId>,
}

pub struct SyncEngine {
    manager: ConfigManager,
}

impl SyncEngine {
    pub fn new(manager: ConfigManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    /// Sync entries from one application to another.
    ///
    /// Conflicts (smart policy) go to `resolver`. A deferred resolver leaves
    /// the target untouched and yields [`SyncError::ConflictPending`].
    pub fn sync_entries(
        &self,
        from: AppId,
        to: AppId,
        policy: MergePolicy,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<SyncReport, SyncError> {
        if from == to {
            return Err(SyncError::SameApp);
        }
        let source = self.load_source(from)?;
        self.apply(Some(from), &source, to, policy, resolver)
    }

    /// Apply an edited conflict document.
    ///
    /// `apps` overrides the source and target recorded in the document.
    /// Both sides are reloaded and merged again; only resolutions for names
    /// that still conflict are applied. The document is removed afterwards.
    pub fn resolve_document(
        &self,
        path: &Path,
        apps: Option<(AppId, AppId)>,
    ) -> Result<SyncReport, SyncError> {
        let document = PendingDocument::open(path).map_err(SyncError::Resolve)?;
        let (from, to) = match apps {
            Some(apps) => apps,
            None => document
                .apps()
                .map_err(SyncError::Resolve)?
                .ok_or_else(|| {
                    SyncError::Resolve(anyhow::anyhow!(
                        "{} does not name its source and target applications",
                        path.display()
                    ))
                })?,
        };
        if from == to {
            return Err(SyncError::SameApp);
        }

        let resolutions = document.parse().map_err(SyncError::Resolve)?;
        let source = self.load_source(from)?;
        let outcome = self.merge_into(&source, to, MergePolicy::Smart)?;

        let (current, stale): (Vec<Resolution>, Vec<Resolution>) = resolutions
            .into_iter()
            .partition(|r| outcome.conflicts.iter().any(|c| c.name == r.name));
        for resolution in &stale {
            tracing::warn!(entry = %resolution.name, "Entry no longer conflicts, ignoring its resolution");
        }

        let report = self.save(Some(from), to, MergePolicy::Smart, outcome, current)?;

        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove conflict document");
        }
        Ok(report)
    }

    /// Copy a prompt between applications, converting its format
    pub fn sync_prompt(&self, from: AppId, to: AppId) -> Result<PromptSyncReport, SyncError> {
        if from == to {
            return Err(SyncError::SameApp);
        }
        let unsupported = |app| SyncError::Unsupported {
            app,
            capability: "prompts",
        };
        let from_format = from.prompt_format().ok_or_else(|| unsupported(from))?;
        let to_format = to.prompt_format().ok_or_else(|| unsupported(to))?;

        let prompt = self
            .manager
            .load_prompt(from)
            .ok_or(SyncError::NotAvailable(from))?;
        let text = prompt::convert(&prompt.text, from_format, to_format);
        let target = self.manager.save_prompt(to, &text)?;

        Ok(PromptSyncReport {
            source: prompt.path,
            target,
            converted: text != prompt.text,
        })
    }

    /// Remove every entry from an application, after a backup
    pub fn remove_all(&self, app: AppId) -> Result<SaveSummary, SyncError> {
        self.manager.remove_all_entries(app)
    }

    /// Fold the entries of `apps` into one collection
    pub fn build_superset(&self, apps: &[AppId]) -> Superset {
        let mut superset = Superset::default();

        for &app in apps {
            let Some(entries) = self.manager.load_entries(app) else {
                tracing::debug!(app = %app, "No entries available for superset");
                superset.unavailable.push(app);
                continue;
            };

            for (name, entry) in entries {
                let providers = superset.providers.entry(name.clone()).or_default();
                providers.push(app);
                let kept_from = providers[0];

                match superset.entries.get(&name) {
                    None => {
                        superset.entries.insert(name, entry);
                    }
                    Some(kept) if *kept == entry => {}
                    Some(kept) => superset.conflicts.push(SupersetConflict {
                        kept: kept.clone(),
                        name,
                        kept_from,
                        other_from: app,
                        other: entry,
                    }),
                }
            }
        }

        superset
    }

    /// Build the superset of `apps` and merge it into the master document
    pub fn import_superset(
        &self,
        apps: &[AppId],
        policy: MergePolicy,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<(Superset, SyncReport), SyncError> {
        let sources: Vec<AppId> = apps
            .iter()
            .copied()
            .filter(|&app| app != AppId::Master)
            .collect();
        let superset = self.build_superset(&sources);
        if superset.entries.is_empty() {
            return Err(SyncError::NoSources);
        }

        let report = self.apply(None, &superset.entries, AppId::Master, policy, resolver)?;
        Ok((superset, report))
    }

    fn load_source(&self, from: AppId) -> Result<EntryCollection, SyncError> {
        let source = self
            .manager
            .load_entries(from)
            .ok_or(SyncError::NotAvailable(from))?;
        if source.is_empty() {
            return Err(SyncError::EmptySource(from));
        }
        Ok(source)
    }

    fn merge_into(
        &self,
        source: &EntryCollection,
        to: AppId,
        policy: MergePolicy,
    ) -> Result<MergeOutcome, SyncError> {
        if !self.manager.can_store_entries(to) {
            return Err(SyncError::NotAvailable(to));
        }
        // An unreadable target counts as empty; its file is backed up before the save
        let target = self.manager.load_entries(to).unwrap_or_default();
        Ok(merge(source, &target, policy))
    }

    fn apply(
        &self,
        from: Option<AppId>,
        source: &EntryCollection,
        to: AppId,
        policy: MergePolicy,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<SyncReport, SyncError> {
        let outcome = self.merge_into(source, to, policy)?;

        let resolutions = if outcome.has_conflicts() {
            match resolver
                .resolve(&outcome.conflicts)
                .map_err(SyncError::Resolve)?
            {
                ResolutionState::Resolved(resolutions) => resolutions,
                ResolutionState::Deferred(document) => {
                    return Err(SyncError::ConflictPending {
                        names: outcome.conflict_names(),
                        document: document.path().to_path_buf(),
                    });
                }
            }
        } else {
            Vec::new()
        };

        self.save(from, to, policy, outcome, resolutions)
    }

    fn save(
        &self,
        from: Option<AppId>,
        to: AppId,
        policy: MergePolicy,
        outcome: MergeOutcome,
        resolutions: Vec<Resolution>,
    ) -> Result<SyncReport, SyncError> {
        let added = outcome.added.clone();
        let kept_target = outcome.kept_target.clone();
        let merged = outcome.resolve(&resolutions);

        let summary = self.manager.save_entries(to, &merged)?;
        tracing::info!(to = %to, %policy, entries = merged.len(), "Synced entries");

        Ok(SyncReport {
            from,
            to,
            policy,
            added,
            kept_target,
            resolutions,
            total: merged.len(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ToolError;
    use crate::external::{CommandRunner, ToolOutput};
    use crate::profile::Platform;
    use tempfile::TempDir;

    struct NoTool;

    impl CommandRunner for NoTool {
        fn is_available(&self) -> bool {
            false
        }

        fn run(&self, _args: &[String]) -> Result<ToolOutput, ToolError> {
            Err(ToolError::NotInstalled {
                program: "claude".to_string(),
            })
        }
    }

    fn engine(temp: &TempDir) -> SyncEngine {
        SyncEngine::new(ConfigManager::with_runner(
            Settings::for_home(temp.path()),
            Platform::Linux,
            Box::new(NoTool),
        ))
    }

    #[test]
    fn test_superset_first_provider_wins() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let manager = engine.manager();

        manager
            .save_entries(
                AppId::Cline,
                &EntryCollection::new()
                    .with("shared", Entry::new("npx", ["a"]))
                    .with("cline-only", Entry::new("x", Vec::<String>::new())),
            )
            .unwrap();
        manager
            .save_entries(
                AppId::Cursor,
                &EntryCollection::new().with("shared", Entry::new("npx", ["b"])),
            )
            .unwrap();

        let superset =
            engine.build_superset(&[AppId::Cline, AppId::Cursor, AppId::ClaudeCode]);

        assert_eq!(superset.entries.len(), 2);
        assert_eq!(superset.entries.get("shared"), Some(&Entry::new("npx", ["a"])));
        assert_eq!(superset.providers["shared"], vec![AppId::Cline, AppId::Cursor]);
        assert_eq!(superset.unavailable, vec![AppId::ClaudeCode]);
        assert_eq!(superset.conflicts.len(), 1);
        assert_eq!(superset.conflicts[0].kept_from, AppId::Cline);
        assert_eq!(superset.conflicts[0].other_from, AppId::Cursor);
    }

    #[test]
    fn test_same_app_is_rejected() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        assert!(matches!(
            engine.sync_entries(
                AppId::Cline,
                AppId::Cline,
                MergePolicy::Merge,
                &mut crate::resolve::UniformResolver(crate::merge::Choice::Target)
            ),
            Err(SyncError::SameApp)
        ));
        assert!(matches!(
            engine.sync_prompt(AppId::Cursor, AppId::Cursor),
            Err(SyncError::SameApp)
        ));
    }

    #[test]
    fn test_import_without_sources() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        assert!(matches!(
            engine.import_superset(
                AppId::all(),
                MergePolicy::Merge,
                &mut crate::resolve::UniformResolver(crate::merge::Choice::Target)
            ),
            Err(SyncError::NoSources)
        ));
    }
}
