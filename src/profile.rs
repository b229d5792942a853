//! Supported applications
//!
//! Static catalog of applications whose MCP entries can be synchronized:
//! identity, entry file format, prompt support, and per-platform locations.
//! Every platform decision lives in the path-resolution functions here.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_ids;
use crate::config::Settings;

// =============================================================================
// Platform
// =============================================================================

/// Operating system families with distinct application layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    /// The platform this binary was built for, if supported
    pub fn current() -> Option<Platform> {
        if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else {
            None
        }
    }
}

// =============================================================================
// Formats
// =============================================================================

/// How an application stores its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    /// JSON document with entries under the given top-level key
    Json { servers_key: &'static str },
    /// JetBrains-style XML component file
    Xml,
    /// YAML master document with entries under the given key
    Yaml { servers_key: &'static str },
    /// State lives behind an external command line tool
    Cli,
}

/// How an application stores its free-text prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    Text,
    Markdown,
}

// =============================================================================
// Application Definition
// =============================================================================

/// Known applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppId {
    /// Claude Desktop (claude_desktop_config.json)
    ClaudeDesktop,
    /// Claude Code (`claude mcp` subcommands)
    ClaudeCode,
    /// Cline (~/.cline/mcp_settings.json)
    Cline,
    /// Cursor (~/.cursor/mcp_config.json)
    Cursor,
    /// IntelliJ IDEA (options/llm.mcpServers.xml)
    IntelliJ,
    /// Windsurf (~/.windsurf/mcp.json)
    Windsurf,
    /// mcpsync's own superset document
    Master,
}

impl AppId {
    /// All supported applications in catalog order
    pub fn all() -> &'static [AppId] {
        &[
            AppId::ClaudeDesktop,
            AppId::ClaudeCode,
            AppId::Cline,
            AppId::Cursor,
            AppId::IntelliJ,
            AppId::Windsurf,
            AppId::Master,
        ]
    }

    /// Canonical identifier (used in backup filenames)
    pub fn id(&self) -> &'static str {
        match self {
            AppId::ClaudeDesktop => "claude_desktop",
            AppId::ClaudeCode => "claude_code",
            AppId::Cline => "cline",
            AppId::Cursor => "cursor",
            AppId::IntelliJ => "intellij",
            AppId::Windsurf => "windsurf",
            AppId::Master => "master",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            AppId::ClaudeDesktop => "Claude Desktop",
            AppId::ClaudeCode => "Claude Code",
            AppId::Cline => "Cline",
            AppId::Cursor => "Cursor",
            AppId::IntelliJ => "IntelliJ",
            AppId::Windsurf => "Windsurf",
            AppId::Master => "Master",
        }
    }

    /// 1-based catalog number
    pub fn number(&self) -> usize {
        app_ids::catalog_number(self.id()).unwrap_or_default()
    }

    /// Parse an id, alias, or catalog number
    pub fn parse(id: &str) -> Option<AppId> {
        let canonical = app_ids::canonical_app_id(id)?;
        AppId::all().iter().copied().find(|app| app.id() == canonical)
    }

    pub fn entry_format(&self) -> EntryFormat {
        match self {
            AppId::ClaudeCode => EntryFormat::Cli,
            AppId::IntelliJ => EntryFormat::Xml,
            AppId::Master => EntryFormat::Yaml {
                servers_key: "mcp_servers",
            },
            _ => EntryFormat::Json {
                servers_key: "mcpServers",
            },
        }
    }

    /// Prompt format, `None` when the application has no free-text prompt
    pub fn prompt_format(&self) -> Option<PromptFormat> {
        match self {
            AppId::Cline | AppId::Cursor | AppId::IntelliJ => Some(PromptFormat::Text),
            AppId::Master => Some(PromptFormat::Markdown),
            _ => None,
        }
    }

    pub fn supports_prompt(&self) -> bool {
        self.prompt_format().is_some()
    }

    /// Resolve the entry file for a platform.
    ///
    /// Returns `None` for CLI-managed applications and when the application
    /// has no location on this platform.
    pub fn entries_path(&self, settings: &Settings, platform: Platform) -> Option<PathBuf> {
        let home = &settings.home_dir;
        match self {
            AppId::ClaudeDesktop => Some(match platform {
                Platform::MacOs => {
                    home.join("Library/Application Support/Claude/claude_desktop_config.json")
                }
                Platform::Linux => home.join(".config/claude/config.json"),
                Platform::Windows => home.join("AppData/Roaming/Claude/config.json"),
            }),
            AppId::ClaudeCode => None,
            AppId::Cline => Some(home.join(".cline/mcp_settings.json")),
            AppId::Cursor => Some(home.join(".cursor/mcp_config.json")),
            AppId::IntelliJ => {
                intellij_options_dir(&jetbrains_dir(home, platform))
                    .map(|dir| dir.join("llm.mcpServers.xml"))
            }
            AppId::Windsurf => Some(home.join(".windsurf/mcp.json")),
            AppId::Master => Some(settings.master_config.clone()),
        }
    }

    /// Resolve the prompt file for a platform
    pub fn prompt_path(&self, settings: &Settings, platform: Platform) -> Option<PathBuf> {
        let home = &settings.home_dir;
        match self {
            AppId::Cline => Some(home.join(".cline/system_prompt.txt")),
            AppId::Cursor => Some(home.join(".cursor/system_prompt.txt")),
            AppId::IntelliJ => intellij_options_dir(&jetbrains_dir(home, platform))
                .map(|dir| dir.join("ai_assistant_system_prompt.txt")),
            AppId::Master => Some(settings.base_prompt.clone()),
            AppId::ClaudeDesktop | AppId::ClaudeCode | AppId::Windsurf => None,
        }
    }

    /// Whether the application appears to be installed.
    ///
    /// `tool_available` reports whether the CLI-managed application's
    /// executable is on the search path.
    pub fn is_installed(
        &self,
        settings: &Settings,
        platform: Platform,
        tool_available: impl FnOnce() -> bool,
    ) -> bool {
        match self {
            AppId::ClaudeCode => tool_available(),
            AppId::IntelliJ => jetbrains_dir(&settings.home_dir, platform).is_dir(),
            AppId::Cline | AppId::Master => self
                .entries_path(settings, platform)
                .is_some_and(|path| path.is_file()),
            _ => self
                .entries_path(settings, platform)
                .and_then(|path| path.parent().map(Path::is_dir))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JetBrains configuration root for a platform
fn jetbrains_dir(home: &Path, platform: Platform) -> PathBuf {
    match platform {
        Platform::MacOs => home.join("Library/Application Support/JetBrains"),
        Platform::Linux => home.join(".config/JetBrains"),
        Platform::Windows => home.join("AppData/Roaming/JetBrains"),
    }
}

/// `options/` of the newest `IntelliJIdea*` directory (by name, e.g. `IntelliJIdea2024.3`)
fn intellij_options_dir(jetbrains: &Path) -> Option<PathBuf> {
    let newest = fs::read_dir(jetbrains)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("IntelliJIdea"))
        .max()?;

    Some(jetbrains.join(newest).join("options"))
}
