//! Configuration parsing for mcpsync
//!
//! Storage locations and external-tool parameters are carried in one
//! [`Settings`] value that is built once and handed to every component.
//! An optional TOML file can override any of the defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default state directory name (under the home directory)
pub const DEFAULT_STATE_DIR: &str = ".mcpsync";

/// Default settings file name (inside the state directory)
pub const SETTINGS_FILE_NAME: &str = "config.toml";

/// Number of backups retained per owner id
pub const DEFAULT_MAX_BACKUPS: usize = 10;

/// Seconds to wait for an external tool invocation
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 5;

/// Resolved runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Home directory every application path is resolved against
    pub home_dir: PathBuf,
    /// mcpsync's own state directory
    pub state_dir: PathBuf,
    /// Where timestamped backups are stored
    pub versions_dir: PathBuf,
    /// Backups kept per owner id
    pub max_backups: usize,
    /// Location of the deferred conflict-resolution document
    pub conflict_file: PathBuf,
    /// Directory holding generated wrapper scripts
    pub wrapper_dir: PathBuf,
    /// Master (superset) YAML document
    pub master_config: PathBuf,
    /// Master prompt (markdown)
    pub base_prompt: PathBuf,
    /// CLI-managed target settings
    pub external: ExternalToolSettings,
}

/// Settings for the CLI-managed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalToolSettings {
    /// Program name looked up on the search path
    pub program: String,
    /// Value passed with `--scope`; omitted when `None`
    pub scope: Option<String>,
    /// Hard limit for a single invocation
    pub timeout: Duration,
}

impl Default for ExternalToolSettings {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            scope: Some("user".to_string()),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

/// On-disk shape of the optional settings file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    state_dir: Option<PathBuf>,
    #[serde(default)]
    max_backups: Option<usize>,
    #[serde(default)]
    conflict_file: Option<PathBuf>,
    #[serde(default)]
    wrapper_dir: Option<PathBuf>,
    #[serde(default)]
    master_config: Option<PathBuf>,
    #[serde(default)]
    base_prompt: Option<PathBuf>,
    #[serde(default)]
    external: ExternalFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalFile {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl Settings {
    /// Build default settings rooted at an explicit home directory
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home_dir = home.into();
        let state_dir = home_dir.join(DEFAULT_STATE_DIR);

        Self {
            versions_dir: state_dir.join("versions"),
            conflict_file: state_dir.join("conflicts.md"),
            wrapper_dir: home_dir.join(".claude-mcp-wrappers"),
            master_config: state_dir.join("master-config.yaml"),
            base_prompt: state_dir.join("base-prompt.md"),
            max_backups: DEFAULT_MAX_BACKUPS,
            external: ExternalToolSettings::default(),
            state_dir,
            home_dir,
        }
    }

    /// Load settings for the current user.
    ///
    /// `explicit` points at a settings file; otherwise
    /// `~/.mcpsync/config.toml` is used when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine the home directory")?;
        let settings = Self::for_home(home);

        match explicit {
            Some(path) => settings.with_file(path),
            None => {
                let default_path = settings.state_dir.join(SETTINGS_FILE_NAME);
                if default_path.exists() {
                    settings.with_file(&default_path)
                } else {
                    Ok(settings)
                }
            }
        }
    }

    /// Apply overrides from a settings file
    pub fn with_file(self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        self.with_toml(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Apply overrides from TOML text
    pub fn with_toml(mut self, content: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(content)?;

        if let Some(state_dir) = file.state_dir {
            let state_dir = self.expand_home(state_dir);
            // Derived locations follow the state dir unless set explicitly
            self.versions_dir = state_dir.join("versions");
            self.conflict_file = state_dir.join("conflicts.md");
            self.master_config = state_dir.join("master-config.yaml");
            self.base_prompt = state_dir.join("base-prompt.md");
            self.state_dir = state_dir;
        }
        if let Some(max) = file.max_backups {
            anyhow::ensure!(max > 0, "max_backups must be at least 1");
            self.max_backups = max;
        }
        if let Some(path) = file.conflict_file {
            self.conflict_file = self.expand_home(path);
        }
        if let Some(path) = file.wrapper_dir {
            self.wrapper_dir = self.expand_home(path);
        }
        if let Some(path) = file.master_config {
            self.master_config = self.expand_home(path);
        }
        if let Some(path) = file.base_prompt {
            self.base_prompt = self.expand_home(path);
        }
        if let Some(program) = file.external.program {
            self.external.program = program;
        }
        if let Some(scope) = file.external.scope {
            self.external.scope = if scope.is_empty() { None } else { Some(scope) };
        }
        if let Some(secs) = file.external.timeout_secs {
            self.external.timeout = Duration::from_secs(secs);
        }

        Ok(self)
    }

    /// Expand a leading `~/` against the configured home directory
    fn expand_home(&self, path: PathBuf) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => self.home_dir.join(rest),
            Err(_) => path,
        }
    }
}
