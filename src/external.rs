//! External-tool adapter for CLI-managed applications
//!
//! Some applications keep their entries behind a command line tool
//! (`claude mcp list|add|remove`) instead of a file. [`CliAdapter`] gives
//! that state the same load/save contract as the file codecs.

use colored::Colorize;
use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::config::{ExternalToolSettings, Settings};
use crate::entry::{Entry, EntryCollection};
use crate::error::{SyncError, ToolError};
use crate::fs::{make_executable, write_atomic};
use crate::profile::AppId;

/// Health suffix appended to listed entries, e.g. ` - ✓ Connected`
static STATUS_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-\s+[✓✔✗✘⚠].*$").unwrap());
static SHELL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Arguments the external tool rejects on `add`
const UNSUPPORTED_FLAGS: &[&str] = &["-m"];

// =============================================================================
// Process Runner
// =============================================================================

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Invokes the external tool with a list of arguments
pub trait CommandRunner {
    /// Whether the tool can be found at all
    fn is_available(&self) -> bool;

    fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError>;
}

/// Runs a real program found on `PATH`, bounded by a timeout
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &ExternalToolSettings) -> Self {
        Self::new(&settings.program, settings.timeout)
    }
}

impl CommandRunner for ProcessRunner {
    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
        let executable = which::which(&self.program).map_err(|_| ToolError::NotInstalled {
            program: self.program.clone(),
        })?;

        tracing::debug!(program = %self.program, ?args, "Running external tool");

        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let Some(status) = child.wait_timeout(self.timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(program = %self.program, ?args, "External tool timed out");
            return Err(ToolError::TimedOut {
                after: self.timeout,
            });
        };

        let collect = |handle: Option<thread::JoinHandle<String>>| {
            handle
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default()
        };
        let output = ToolOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        if status.success() {
            return Ok(output);
        }

        let message = match output.stderr.trim() {
            "" if output.stdout.trim().is_empty() => "Unknown error".to_string(),
            "" => output.stdout.trim().to_string(),
            stderr => stderr.to_string(),
        };
        Err(ToolError::Failed {
            code: status.code(),
            message,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

// =============================================================================
// Adapter
// =============================================================================

/// Per-entry account of a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Existing entries removed as duplicates of incoming ones
    pub removed: Vec<String>,
    /// Duplicates that could not be removed, with the tool's message
    pub failed_removals: Vec<(String, String)>,
    pub added: Vec<String>,
    /// Added entries registered through a generated wrapper script
    pub wrapped: Vec<String>,
    /// Incoming entries already present in the target
    pub unchanged: Vec<String>,
    /// Entries the tool cannot represent
    pub skipped: Vec<String>,
    /// Adds the tool refused because the name was taken
    pub already_existed: Vec<String>,
}

/// Outcome of removing every entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveAllReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub wrappers_removed: bool,
}

/// Load/save contract over `<program> mcp list|add|remove`
pub struct CliAdapter {
    app: AppId,
    runner: Box<dyn CommandRunner>,
    scope: Option<String>,
    wrapper_dir: PathBuf,
}

impl CliAdapter {
    pub fn new(
        app: AppId,
        runner: Box<dyn CommandRunner>,
        scope: Option<String>,
        wrapper_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app,
            runner,
            scope,
            wrapper_dir: wrapper_dir.into(),
        }
    }

    /// Adapter for `app` configured from settings, running the real tool
    pub fn from_settings(app: AppId, settings: &Settings) -> Self {
        Self::new(
            app,
            Box::new(ProcessRunner::from_settings(&settings.external)),
            settings.external.scope.clone(),
            &settings.wrapper_dir,
        )
    }

    pub fn is_available(&self) -> bool {
        self.runner.is_available()
    }

    fn mcp_args<I>(&self, subcommand: &str, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = vec!["mcp".to_string(), subcommand.to_string()];
        if let Some(scope) = &self.scope {
            args.push("--scope".to_string());
            args.push(scope.clone());
        }
        args.extend(rest);
        args
    }

    /// Current entries, or `None` when the tool is missing, fails or times out
    pub fn load(&self) -> Option<EntryCollection> {
        match self.runner.run(&self.mcp_args("list", [])) {
            Ok(output) => Some(parse_list_output(&output.stdout)),
            Err(ToolError::NotInstalled { program }) => {
                tracing::debug!(%program, "External tool not installed");
                None
            }
            Err(e) => {
                tracing::warn!(app = %self.app, error = %e, "Failed to list entries");
                None
            }
        }
    }

    fn remove(&self, name: &str) -> Result<(), ToolError> {
        self.runner
            .run(&self.mcp_args("remove", [name.to_string()]))
            .map(|_| ())
    }

    /// Make the tool's state contain `entries`.
    ///
    /// Existing entries that duplicate an incoming one, by name or by
    /// invocation identity, are removed first and re-added under the
    /// incoming name. Entries already present are left alone. Existing
    /// entries unrelated to `entries` are kept.
    pub fn save(&self, entries: &EntryCollection) -> Result<SaveReport, SyncError> {
        let existing = self.load().unwrap_or_default();
        let duplicates = find_duplicates(&existing, entries);
        let superseded = find_superseded(&existing, entries);
        let mut report = SaveReport::default();

        for name in &duplicates {
            match self.remove(name) {
                Ok(()) => {
                    tracing::info!(app = %self.app, entry = %name, "Removed duplicate entry");
                    report.removed.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!(app = %self.app, entry = %name, error = %e, "Failed to remove duplicate entry");
                    report.failed_removals.push((name.clone(), e.to_string()));
                }
            }
        }

        for (name, entry) in entries {
            if superseded.contains(name) {
                tracing::debug!(app = %self.app, entry = %name, "Entry superseded by an identical incoming entry");
                continue;
            }
            if exists_in_target(name, entry, &existing, &duplicates) {
                report.unchanged.push(name.clone());
                continue;
            }
            if !entry.is_launchable() {
                tracing::warn!(app = %self.app, entry = %name, "Skipping entry without a command");
                report.skipped.push(name.clone());
                continue;
            }
            if entry
                .args
                .iter()
                .any(|arg| UNSUPPORTED_FLAGS.contains(&arg.as_str()))
            {
                tracing::warn!(app = %self.app, entry = %name, "Skipping entry with unsupported flags");
                report.skipped.push(name.clone());
                continue;
            }

            let args = clean_args(&entry.args);
            let invocation = if entry.env.is_empty() {
                std::iter::once(entry.command.clone()).chain(args).collect::<Vec<_>>()
            } else {
                let script = self
                    .write_wrapper(name, entry, &args)
                    .map_err(|error| SyncError::Write {
                        app: self.app,
                        error,
                    })?;
                report.wrapped.push(name.clone());
                vec![script.display().to_string()]
            };

            let add_args = self.mcp_args("add", std::iter::once(name.clone()).chain(invocation));
            match self.runner.run(&add_args) {
                Ok(_) => {
                    tracing::info!(app = %self.app, entry = %name, "Added entry");
                    report.added.push(name.clone());
                }
                Err(e) if e.is_already_exists() => {
                    tracing::warn!(app = %self.app, entry = %name, "Entry already exists");
                    report.already_existed.push(name.clone());
                }
                Err(source) => {
                    return Err(SyncError::ExternalTool {
                        entry: name.clone(),
                        source,
                        report,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Remove every listed entry and the wrapper-script directory
    pub fn remove_all(&self) -> RemoveAllReport {
        let mut report = RemoveAllReport::default();

        for name in self.load().unwrap_or_default().names() {
            match self.remove(name) {
                Ok(()) => {
                    tracing::info!(app = %self.app, entry = %name, "Removed entry");
                    report.removed.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!(app = %self.app, entry = %name, error = %e, "Failed to remove entry");
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }

        if self.wrapper_dir.is_dir() {
            match fs::remove_dir_all(&self.wrapper_dir) {
                Ok(()) => report.wrappers_removed = true,
                Err(e) => tracing::warn!(
                    path = %self.wrapper_dir.display(),
                    error = %e,
                    "Could not remove wrapper scripts"
                ),
            }
        }

        report
    }

    /// Write an executable script exporting the entry's environment before
    /// running its command
    fn write_wrapper(&self, name: &str, entry: &Entry, args: &[String]) -> anyhow::Result<PathBuf> {
        let path = self.wrapper_dir.join(wrapper_file_name(name));
        write_atomic(&path, wrapper_script(entry, args).as_bytes())?;
        make_executable(&path)?;
        tracing::info!(entry = %name, path = %path.display(), "Wrote wrapper script");
        Ok(path)
    }
}

/// File name for an entry's wrapper, confined to the wrapper directory
pub fn wrapper_file_name(name: &str) -> String {
    let mut stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "-_.".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.starts_with('.') {
        stem.insert(0, '_');
    }
    format!("{stem}.sh")
}

/// Script body for [`CliAdapter::write_wrapper`]
pub fn wrapper_script(entry: &Entry, args: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    for (key, value) in &entry.env {
        if !SHELL_NAME_RE.is_match(key) {
            tracing::warn!(variable = %key, "Skipping environment variable with an invalid name");
            continue;
        }
        script.push_str(&format!("export {key}={}\n", shell_quote(value)));
    }

    let command_line: Vec<String> = std::iter::once(entry.command.as_str())
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect();
    script.push_str(&format!("exec {} \"$@\"\n", command_line.join(" ")));
    script
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Parse `name: command arg1 arg2` lines from the list subcommand
pub fn parse_list_output(stdout: &str) -> EntryCollection {
    let mut entries = EntryCollection::new();

    for line in stdout.lines() {
        if line.starts_with("No MCP servers") {
            continue;
        }
        let Some((name, invocation)) = line.split_once(": ") else {
            continue;
        };
        let name = name.trim();
        let invocation = STATUS_SUFFIX_RE.replace(invocation.trim(), "");
        let mut parts = invocation.split_whitespace().map(str::to_string);
        let Some(command) = parts.next() else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        entries.insert(name, Entry::new(command, parts));
    }

    entries
}

/// Drop arguments the external tool rejects: bare `-y` and `--with fastmcp`
pub fn clean_args(args: &[String]) -> Vec<String> {
    let mut cleaned = Vec::with_capacity(args.len());
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-y" => {}
            "--with" if iter.peek().is_some_and(|next| *next == "fastmcp") => {
                iter.next();
            }
            _ => cleaned.push(arg.clone()),
        }
    }

    cleaned
}

/// Existing names to remove before `incoming` is applied.
///
/// An existing entry is a duplicate when it has the incoming entry's name,
/// or, failing that, the same invocation under another name.
pub fn find_duplicates(existing: &EntryCollection, incoming: &EntryCollection) -> Vec<String> {
    let mut duplicates: Vec<String> = Vec::new();

    for (name, entry) in incoming {
        let duplicate = if existing.contains(name) {
            Some(name)
        } else {
            existing
                .iter()
                .find(|(_, current)| current.same_invocation(entry))
                .map(|(current_name, _)| current_name)
        };
        if let Some(duplicate) = duplicate
            && !duplicates.contains(duplicate)
        {
            duplicates.push(duplicate.clone());
        }
    }

    duplicates
}

/// Existing names replaced by an identical entry arriving under a new name
fn find_superseded(existing: &EntryCollection, incoming: &EntryCollection) -> Vec<String> {
    incoming
        .iter()
        .filter(|(name, entry)| {
            existing.contains(name)
                && incoming.iter().any(|(other_name, other)| {
                    other_name != *name
                        && !existing.contains(other_name)
                        && other.same_invocation(entry)
                })
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Whether `entry` is already present and not scheduled for removal
fn exists_in_target(
    name: &str,
    entry: &Entry,
    existing: &EntryCollection,
    duplicates: &[String],
) -> bool {
    if duplicates.iter().any(|d| d == name) {
        return false;
    }
    existing.contains(name)
        || existing.iter().any(|(current_name, current)| {
            !duplicates.contains(current_name) && current.same_invocation(entry)
        })
}

/// Terminal lines summarizing a save
pub fn describe_report(report: &SaveReport) -> Vec<String> {
    let mut lines = Vec::new();
    for name in &report.removed {
        lines.push(format!("  {} Removed duplicate: {}", "→".cyan(), name));
    }
    for (name, message) in &report.failed_removals {
        lines.push(format!("  {} Could not remove {}: {}", "!".yellow(), name, message));
    }
    for name in &report.added {
        let how = if report.wrapped.contains(name) {
            " (via wrapper script)"
        } else {
            ""
        };
        lines.push(format!("  {} Added: {}{}", "✔".green(), name, how));
    }
    for name in &report.already_existed {
        lines.push(format!("  {} Already exists: {}", "!".yellow(), name));
    }
    for name in &report.skipped {
        lines.push(format!("  {} Skipped (unsupported flags): {}", "○".yellow(), name));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    type Responder = Box<dyn Fn(&[String]) -> Result<ToolOutput, ToolError>>;

    /// Records every invocation and answers from a closure
    struct FakeRunner {
        calls: Rc<RefCell<Vec<Vec<String>>>>,
        respond: Responder,
    }

    impl CommandRunner for FakeRunner {
        fn is_available(&self) -> bool {
            true
        }

        fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
            self.calls.borrow_mut().push(args.to_vec());
            (self.respond)(args)
        }
    }

    fn listing(stdout: &'static str) -> Responder {
        Box::new(move |args: &[String]| match args[1].as_str() {
            "list" => Ok(ToolOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            }),
            _ => Ok(ToolOutput::default()),
        })
    }

    fn adapter(
        respond: Responder,
        wrapper_dir: &Path,
    ) -> (CliAdapter, Rc<RefCell<Vec<Vec<String>>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let runner = FakeRunner {
            calls: Rc::clone(&calls),
            respond,
        };
        let adapter = CliAdapter::new(
            AppId::ClaudeCode,
            Box::new(runner),
            Some("user".to_string()),
            wrapper_dir,
        );
        (adapter, calls)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_list_output() {
        let stdout = "\
Checking MCP server health...

memory: npx -y @modelcontextprotocol/server-memory - ✓ Connected
git: uvx mcp-server-git --repository /repo - ✗ Failed to connect
plain: /usr/local/bin/tool
: nameless
empty:
";
        let entries = parse_list_output(stdout);

        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.get("memory"),
            Some(&Entry::new(
                "npx",
                ["-y", "@modelcontextprotocol/server-memory"]
            ))
        );
        assert_eq!(
            entries.get("git"),
            Some(&Entry::new("uvx", ["mcp-server-git", "--repository", "/repo"]))
        );
        assert_eq!(
            entries.get("plain"),
            Some(&Entry::new("/usr/local/bin/tool", Vec::<String>::new()))
        );
        assert!(parse_list_output("No MCP servers configured. Use `claude mcp add`").is_empty());
    }

    #[test]
    fn test_clean_args() {
        let args = strings(&["-y", "pkg", "--with", "fastmcp", "--with", "other", "--yes"]);
        assert_eq!(clean_args(&args), strings(&["pkg", "--with", "other", "--yes"]));
        assert!(clean_args(&[]).is_empty());
    }

    #[test]
    fn test_find_duplicates_by_name_and_identity() {
        let existing = EntryCollection::new()
            .with("same-name", Entry::new("a", ["1"]))
            .with("old-name", Entry::new("b", ["x", "y"]))
            .with("unrelated", Entry::new("c", Vec::<String>::new()));
        let incoming = EntryCollection::new()
            .with("same-name", Entry::new("a", ["2"]))
            // Argument order does not matter for identity
            .with("new-name", Entry::new("b", ["y", "x"]));

        assert_eq!(
            find_duplicates(&existing, &incoming),
            strings(&["old-name", "same-name"])
        );
    }

    #[test]
    fn test_load_failure_is_absent() {
        let temp = TempDir::new().unwrap();
        let (adapter, _) = adapter(
            Box::new(|_: &[String]| {
                Err(ToolError::TimedOut {
                    after: Duration::from_secs(5),
                })
            }),
            temp.path(),
        );
        assert_eq!(adapter.load(), None);
    }

    #[test]
    fn test_save_replaces_identity_duplicate() {
        let temp = TempDir::new().unwrap();
        let (adapter, calls) = adapter(listing("old-memory: npx server-memory\n"), temp.path());

        let incoming = EntryCollection::new().with("memory", Entry::new("npx", ["server-memory"]));
        let report = adapter.save(&incoming).unwrap();

        assert_eq!(report.removed, strings(&["old-memory"]));
        assert_eq!(report.added, strings(&["memory"]));
        assert_eq!(
            calls.borrow()[1..].to_vec(),
            vec![
                strings(&["mcp", "remove", "--scope", "user", "old-memory"]),
                strings(&["mcp", "add", "--scope", "user", "memory", "npx", "server-memory"]),
            ]
        );
    }

    #[test]
    fn test_save_drops_name_superseded_in_merged_collection() {
        let temp = TempDir::new().unwrap();
        let (adapter, calls) = adapter(listing("old-memory: npx server-memory\n"), temp.path());

        // A merge keeps the target's entry next to the renamed incoming one
        let merged = EntryCollection::new()
            .with("old-memory", Entry::new("npx", ["server-memory"]))
            .with("memory", Entry::new("npx", ["server-memory"]));
        let report = adapter.save(&merged).unwrap();

        assert_eq!(report.removed, strings(&["old-memory"]));
        assert_eq!(report.added, strings(&["memory"]));
        assert_eq!(
            calls
                .borrow()
                .iter()
                .filter(|call| call[1] == "add")
                .count(),
            1
        );
    }

    #[test]
    fn test_save_skips_present_and_unsupported() {
        let temp = TempDir::new().unwrap();
        let (adapter, calls) = adapter(listing(""), temp.path());

        let incoming = EntryCollection::new()
            .with("py", Entry::new("python", ["-m", "server"]))
            .with("node", Entry::new("npx", ["-y", "pkg", "--with", "fastmcp"]));
        let report = adapter.save(&incoming).unwrap();

        assert_eq!(report.skipped, strings(&["py"]));
        assert_eq!(
            calls.borrow().last().unwrap(),
            &strings(&["mcp", "add", "--scope", "user", "node", "npx", "pkg"])
        );
    }

    #[test]
    fn test_save_uses_wrapper_for_env() {
        let temp = TempDir::new().unwrap();
        let wrappers = temp.path().join("wrappers");
        let (adapter, calls) = adapter(listing(""), &wrappers);

        let incoming = EntryCollection::new().with(
            "api",
            Entry::new("npx", ["-y", "api-server", "it's"]).with_env("API_KEY", "x"),
        );
        let report = adapter.save(&incoming).unwrap();
        let script = wrappers.join("api.sh");

        assert_eq!(report.wrapped, strings(&["api"]));
        assert_eq!(
            calls.borrow().last().unwrap(),
            &strings(&["mcp", "add", "--scope", "user", "api", script.to_str().unwrap()])
        );

        let content = fs::read_to_string(&script).unwrap();
        assert!(content.starts_with("#!/bin/bash\n"));
        assert!(content.contains("export API_KEY=x\n"));
        assert!(content.contains(r#"exec npx api-server 'it'\''s' "$@""#));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_save_already_exists_is_a_warning() {
        let temp = TempDir::new().unwrap();
        let (adapter, _) = adapter(
            Box::new(|args: &[String]| match args[1].as_str() {
                "add" => Err(ToolError::Failed {
                    code: Some(1),
                    message: "MCP server a already exists".to_string(),
                }),
                _ => Ok(ToolOutput::default()),
            }),
            temp.path(),
        );

        let report = adapter
            .save(&EntryCollection::new().with("a", Entry::new("x", ["1"])))
            .unwrap();
        assert_eq!(report.already_existed, strings(&["a"]));
        assert!(report.added.is_empty());
    }

    #[test]
    fn test_save_aborts_on_other_failures() {
        let temp = TempDir::new().unwrap();
        let (adapter, calls) = adapter(
            Box::new(|args: &[String]| match (args[1].as_str(), args.get(4).map(String::as_str)) {
                ("add", Some("b")) => Err(ToolError::Failed {
                    code: Some(2),
                    message: "invalid command".to_string(),
                }),
                _ => Ok(ToolOutput::default()),
            }),
            temp.path(),
        );

        let incoming = EntryCollection::new()
            .with("a", Entry::new("x", ["1"]))
            .with("b", Entry::new("y", ["2"]))
            .with("c", Entry::new("z", ["3"]));
        let err = adapter.save(&incoming).unwrap_err();

        let SyncError::ExternalTool { entry, report, .. } = err else {
            panic!("expected an external tool error");
        };
        assert_eq!(entry, "b");
        assert_eq!(report.added, strings(&["a"]));
        // Nothing after the failure is attempted
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn test_remove_all_continues_past_failures() {
        let temp = TempDir::new().unwrap();
        let wrappers = temp.path().join("wrappers");
        fs::create_dir_all(&wrappers).unwrap();
        fs::write(wrappers.join("a.sh"), "#!/bin/bash\n").unwrap();

        let (adapter, _) = adapter(
            Box::new(|args: &[String]| match args[1].as_str() {
                "list" => Ok(ToolOutput {
                    stdout: "a: x\nb: y\n".to_string(),
                    ..Default::default()
                }),
                _ if args[4] == "a" => Err(ToolError::Failed {
                    code: Some(1),
                    message: "busy".to_string(),
                }),
                _ => Ok(ToolOutput::default()),
            }),
            &wrappers,
        );

        let report = adapter.remove_all();
        assert_eq!(report.removed, strings(&["b"]));
        assert_eq!(
            report.failed,
            vec![(
                "a".to_string(),
                "Command failed (exit code 1): busy".to_string()
            )]
        );
        assert!(report.wrappers_removed);
        assert!(!wrappers.exists());
    }

    #[test]
    fn test_wrapper_script_skips_invalid_variable_names() {
        let entry = Entry::new("run", Vec::<String>::new())
            .with_env("GOOD_NAME", "has space")
            .with_env("bad-name", "x");

        let script = wrapper_script(&entry, &[]);

        assert!(script.contains("export GOOD_NAME='has space'\n"));
        assert!(!script.contains("bad-name"));
        assert!(script.ends_with("exec run \"$@\"\n"));
    }

    #[test]
    fn test_wrapper_file_name_stays_in_directory() {
        assert_eq!(wrapper_file_name("github"), "github.sh");
        assert_eq!(wrapper_file_name("my.server-2"), "my.server-2.sh");
        assert_eq!(wrapper_file_name("../../x"), "_.._.._x.sh");
        assert_eq!(wrapper_file_name(".."), "_...sh");
        assert_eq!(wrapper_file_name("a/b\\c"), "a_b_c.sh");
        assert_eq!(wrapper_file_name(""), "_.sh");
    }

    #[test]
    fn test_save_writes_wrapper_inside_directory() {
        let temp = TempDir::new().unwrap();
        let wrappers = temp.path().join("wrappers");
        let (adapter, calls) = adapter(listing(""), &wrappers);

        let incoming = EntryCollection::new().with(
            "../escape",
            Entry::new("npx", ["srv"]).with_env("TOKEN", "t"),
        );
        adapter.save(&incoming).unwrap();

        let script = wrappers.join("_.._escape.sh");
        let script_arg = script.display().to_string();
        assert!(script.is_file());
        assert!(!temp.path().join("escape.sh").exists());
        assert_eq!(
            calls.borrow().last().unwrap(),
            &strings(&["mcp", "add", "--scope", "user", "../escape", script_arg.as_str()])
        );
    }

    #[test]
    fn test_save_skips_entry_without_command() {
        let temp = TempDir::new().unwrap();
        let (adapter, calls) = adapter(listing(""), temp.path());

        let remote: Entry =
            serde_json::from_value(serde_json::json!({"url": "https://mcp.example.com/sse"}))
                .unwrap();
        let report = adapter.save(&EntryCollection::new().with("remote", remote)).unwrap();

        assert_eq!(report.skipped, strings(&["remote"]));
        assert!(calls.borrow().iter().all(|call| call[1] != "add"));
    }

    #[test]
    fn test_process_runner_missing_program() {
        let runner = ProcessRunner::new("mcpsync-test-no-such-tool", Duration::from_secs(1));

        assert!(!runner.is_available());
        assert!(matches!(
            runner.run(&strings(&["mcp", "list"])),
            Err(ToolError::NotInstalled { .. })
        ));
    }
}
