//! Conflict Resolver
//!
//! Turns the conflicts reported by a smart merge into [`Resolution`]s.
//! Three interchangeable strategies share the [`ConflictResolver`] trait:
//! an interactive prompt, a uniform decision, and a deferred document that
//! is edited out of band and parsed back later.
//!
//! Deferred resolution moves through explicit states:
//! conflicts are written to a [`PendingDocument`], which only advances when
//! [`PendingDocument::parse`] is called; the caller then applies the
//! resulting resolutions.

use anyhow::{Context, Result};
use colored::Colorize;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::entry::Entry;
use crate::fs::write_atomic;
use crate::merge::{Choice, Conflict, Resolution};
use crate::profile::AppId;

static SERVER_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s*Server:\s*(.+?)\s*$").unwrap());
static KEEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^KEEP:\s*(\S*)\s*$").unwrap());
static APPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*Sync:\s*(\S+)\s*->\s*(\S+)\s*$").unwrap());

const RULE: &str = "# ============================================================";
const BLOCK_END: &str = "# ------------------------------------------------------------";

/// Where a set of conflicts ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    /// Every conflict has been decided (absent names keep the target)
    Resolved(Vec<Resolution>),
    /// Conflicts were written to a document awaiting an out-of-band edit
    Deferred(PendingDocument),
}

/// Strategy for deciding conflicts
pub trait ConflictResolver {
    fn resolve(&mut self, conflicts: &[Conflict]) -> Result<ResolutionState>;
}

// =============================================================================
// Uniform
// =============================================================================

/// Resolve every conflict to the same side without asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformResolver(pub Choice);

impl ConflictResolver for UniformResolver {
    fn resolve(&mut self, conflicts: &[Conflict]) -> Result<ResolutionState> {
        Ok(ResolutionState::Resolved(
            conflicts
                .iter()
                .map(|c| Resolution::new(&c.name, self.0))
                .collect(),
        ))
    }
}

// =============================================================================
// Interactive
// =============================================================================

/// Terminal interaction used by [`InteractiveResolver`]
pub trait Prompter {
    /// Pick one of `options`, returning its index
    fn choose(&mut self, prompt: &str, options: &[&str], default: usize) -> Result<usize>;
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;
    fn show(&mut self, message: &str);
}

/// [`Prompter`] backed by dialoguer on the controlling terminal
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn choose(&mut self, prompt: &str, options: &[&str], default: usize) -> Result<usize> {
        use dialoguer::{Select, theme::ColorfulTheme};

        Ok(Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(options)
            .default(default)
            .interact()?)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        use dialoguer::{Confirm, theme::ColorfulTheme};

        Ok(Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn show(&mut self, message: &str) {
        println!("{message}");
    }
}

const KEEP_ALL_TARGET: usize = 0;
const USE_ALL_SOURCE: usize = 1;

/// Ask the operator, either once for all conflicts or per conflict
pub struct InteractiveResolver<P: Prompter> {
    prompter: P,
}

impl<P: Prompter> InteractiveResolver<P> {
    pub fn new(prompter: P) -> Self {
        Self { prompter }
    }
}

impl InteractiveResolver<DialoguerPrompter> {
    pub fn terminal() -> Self {
        Self::new(DialoguerPrompter)
    }
}

impl<P: Prompter> ConflictResolver for InteractiveResolver<P> {
    fn resolve(&mut self, conflicts: &[Conflict]) -> Result<ResolutionState> {
        if conflicts.is_empty() {
            return Ok(ResolutionState::Resolved(Vec::new()));
        }

        let names: Vec<&str> = conflicts.iter().map(|c| c.name.as_str()).collect();
        self.prompter.show(&format!(
            "\n{} Conflicts detected in: {}",
            "!".yellow(),
            names.join(", ").bold()
        ));

        let choice = self.prompter.choose(
            "How should conflicting entries be handled?",
            &[
                "Keep target (skip conflicts)",
                "Use source (overwrite conflicts)",
                "Review each conflict",
            ],
            KEEP_ALL_TARGET,
        )?;

        let uniform = match choice {
            KEEP_ALL_TARGET => Some(Choice::Target),
            USE_ALL_SOURCE => Some(Choice::Source),
            _ => None,
        };
        if let Some(choice) = uniform {
            return UniformResolver(choice).resolve(conflicts);
        }

        let mut resolutions = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            self.prompter.show(&format!(
                "\nConflict in '{}':\n{}\n{}\n{}\n{}",
                conflict.name.bold(),
                "Source:".cyan(),
                render_entry(&conflict.source),
                "Target:".cyan(),
                render_entry(&conflict.target)
            ));
            let use_source = self.prompter.confirm(
                &format!("Use the source version of '{}'?", conflict.name),
                false,
            )?;
            let choice = if use_source {
                Choice::Source
            } else {
                Choice::Target
            };
            resolutions.push(Resolution::new(&conflict.name, choice));
        }

        Ok(ResolutionState::Resolved(resolutions))
    }
}

// =============================================================================
// Deferred
// =============================================================================

/// Write conflicts to an editable document instead of deciding now
#[derive(Debug, Clone)]
pub struct DeferredResolver {
    path: PathBuf,
    apps: Option<(AppId, AppId)>,
}

impl DeferredResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            apps: None,
        }
    }

    /// Record the source and target so the document can be applied later
    /// without naming them again
    pub fn with_apps(mut self, from: AppId, to: AppId) -> Self {
        self.apps = Some((from, to));
        self
    }
}

impl ConflictResolver for DeferredResolver {
    fn resolve(&mut self, conflicts: &[Conflict]) -> Result<ResolutionState> {
        if conflicts.is_empty() {
            return Ok(ResolutionState::Resolved(Vec::new()));
        }
        let document = PendingDocument::write(&self.path, conflicts, self.apps)?;
        Ok(ResolutionState::Deferred(document))
    }
}

/// A conflict document waiting to be edited and parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDocument {
    path: PathBuf,
    names: Vec<String>,
}

impl PendingDocument {
    /// Render `conflicts` to `path`
    pub fn write(
        path: &Path,
        conflicts: &[Conflict],
        apps: Option<(AppId, AppId)>,
    ) -> Result<Self> {
        let mut lines = vec![
            "# mcpsync entry conflicts".to_string(),
            "# Each block shows an entry whose source and target versions differ.".to_string(),
            "# Uncomment exactly one KEEP line per block, save, then run `mcpsync resolve`."
                .to_string(),
            "# Blocks left without a KEEP line keep the target version.".to_string(),
        ];
        if let Some((from, to)) = apps {
            lines.push(format!("# Sync: {} -> {}", from.id(), to.id()));
        }
        lines.push(RULE.to_string());
        lines.push(String::new());

        for conflict in conflicts {
            lines.push(format!("## Server: {}", conflict.name));
            lines.push(String::new());
            lines.push("### Source".to_string());
            lines.extend(commented(&render_entry(&conflict.source)));
            lines.push(String::new());
            lines.push("### Target".to_string());
            lines.extend(commented(&render_entry(&conflict.target)));
            lines.push(String::new());
            lines.push("### Decision (uncomment one)".to_string());
            lines.push("# KEEP: source".to_string());
            lines.push("# KEEP: target".to_string());
            lines.push(String::new());
            lines.push(BLOCK_END.to_string());
            lines.push(String::new());
        }

        write_atomic(path, lines.join("\n").as_bytes())?;
        tracing::info!(path = %path.display(), conflicts = conflicts.len(), "Wrote conflict document");

        Ok(Self {
            path: path.to_path_buf(),
            names: conflicts.iter().map(|c| c.name.clone()).collect(),
        })
    }

    /// Reopen a document written by an earlier invocation
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read conflict document: {}", path.display()))?;
        let names = content
            .lines()
            .filter_map(|line| SERVER_HEADER_RE.captures(line.trim()))
            .map(|caps| caps[1].to_string())
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names with a block in the document
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Source and target recorded in the document header, if any
    pub fn apps(&self) -> Result<Option<(AppId, AppId)>> {
        let content = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read conflict document: {}", self.path.display())
        })?;
        Ok(content.lines().find_map(|line| {
            let caps = APPS_RE.captures(line.trim())?;
            Some((AppId::parse(&caps[1])?, AppId::parse(&caps[2])?))
        }))
    }

    /// Read the edited document back into resolutions
    pub fn parse(&self) -> Result<Vec<Resolution>> {
        let content = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read conflict document: {}", self.path.display())
        })?;
        Ok(parse_document(&content))
    }
}

/// Extract one resolution per block from document text.
///
/// Commented lines are ignored. When a block holds several active `KEEP:`
/// lines the last one wins; blocks without one produce no resolution.
pub fn parse_document(content: &str) -> Vec<Resolution> {
    let mut resolutions: Vec<Resolution> = Vec::new();
    let mut current: Option<(String, Option<Choice>)> = None;

    let mut flush = |block: Option<(String, Option<Choice>)>| {
        if let Some((name, Some(choice))) = block {
            resolutions.push(Resolution::new(name, choice));
        }
    };

    for line in content.lines() {
        let line = line.trim();

        if let Some(caps) = SERVER_HEADER_RE.captures(line) {
            flush(current.take());
            current = Some((caps[1].to_string(), None));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some(caps) = KEEP_RE.captures(line) else {
            continue;
        };

        let Some((name, choice)) = current.as_mut() else {
            tracing::warn!(line, "KEEP directive outside of a server block");
            continue;
        };
        match caps[1].to_lowercase().as_str() {
            "source" => *choice = Some(Choice::Source),
            "target" => *choice = Some(Choice::Target),
            other => tracing::warn!(entry = %name, value = other, "Ignoring unknown KEEP value"),
        }
    }
    flush(current);

    resolutions
}

/// Pretty JSON rendering of an entry for display
pub fn render_entry(entry: &Entry) -> String {
    serde_json::to_string_pretty(entry).unwrap_or_else(|_| entry.command_line())
}

fn commented(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines().map(|line| format!("# {line}"))
}
