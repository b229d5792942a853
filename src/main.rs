//! mcpsync CLI
//!
//! Command-line interface for synchronizing MCP server configurations
//! between applications.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mcpsync::external::describe_report;
use mcpsync::{
    AppId, Choice, ConfigManager, ConflictResolver, DeferredResolver, InteractiveResolver,
    MergePolicy, PendingDocument, SaveSummary, Settings, SyncEngine, SyncError, SyncReport,
    UniformResolver,
};

/// Exit status when a sync stopped on conflicts written to the conflict document
const EXIT_CONFLICTS_PENDING: i32 = 3;

#[derive(Parser)]
#[command(name = "mcpsync")]
#[command(
    author,
    version,
    about = "Sync MCP server configurations between AI applications"
)]
#[command(propagate_version = true)]
#[command(
    after_help = "Exit status 3 means conflicts were written to the conflict document; edit it and run `mcpsync resolve`."
)]
struct Cli {
    /// Path to a settings file (default: ~/.mcpsync/config.toml)
    #[arg(long, global = true, env = "MCPSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Show detailed log output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported applications and whether they are installed
    Apps,

    /// Show the entries configured in an application
    Show {
        /// Application id, alias, or number
        #[arg(value_parser = parse_app)]
        app: AppId,
    },

    /// Sync entries from one application to another
    Sync {
        /// Source application
        #[arg(short, long, value_parser = parse_app)]
        from: AppId,

        /// Target application
        #[arg(short, long, value_parser = parse_app)]
        to: AppId,

        /// Merge policy: replace, merge, or smart
        #[arg(short, long, default_value_t = MergePolicy::Smart)]
        mode: MergePolicy,

        /// Write conflicts to a document instead of prompting
        #[arg(long, conflicts_with_all = ["keep_target", "use_source"])]
        deferred: bool,

        /// Resolve every conflict by keeping the target's entry
        #[arg(long, conflicts_with = "use_source")]
        keep_target: bool,

        /// Resolve every conflict by taking the source's entry
        #[arg(long)]
        use_source: bool,
    },

    /// Apply an edited conflict document
    Resolve {
        /// Conflict document (default: the configured conflict file)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Source application, overriding the document header
        #[arg(short, long, value_parser = parse_app, requires = "to")]
        from: Option<AppId>,

        /// Target application, overriding the document header
        #[arg(short, long, value_parser = parse_app, requires = "from")]
        to: Option<AppId>,
    },

    /// Show or sync free-text prompts
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },

    /// Remove every entry from an application
    RemoveAll {
        #[arg(value_parser = parse_app)]
        app: AppId,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Import the superset of all applications into the master document
    Import {
        /// Applications to read (default: all)
        #[arg(value_parser = parse_app)]
        apps: Vec<AppId>,

        /// Merge policy against the existing master document
        #[arg(short, long, default_value_t = MergePolicy::Merge)]
        mode: MergePolicy,
    },

    /// Show backups and pending conflicts
    Status,
}

#[derive(Subcommand)]
enum PromptCommands {
    /// Print an application's prompt
    Show {
        #[arg(value_parser = parse_app)]
        app: AppId,
    },

    /// Copy a prompt from one application to another
    Sync {
        #[arg(short, long, value_parser = parse_app)]
        from: AppId,

        #[arg(short, long, value_parser = parse_app)]
        to: AppId,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    let engine = SyncEngine::new(ConfigManager::new(settings)?);

    match cli.command {
        Commands::Apps => list_apps(&engine),

        Commands::Show { app } => show_entries(&engine, app)?,

        Commands::Sync {
            from,
            to,
            mode,
            deferred,
            keep_target,
            use_source,
        } => {
            print_header();
            println!(
                "{} {} {} {} ({})\n",
                "➤ Syncing".cyan().bold(),
                from.name().bold(),
                "→".cyan(),
                to.name().bold(),
                mode
            );

            let conflict_file = engine.manager().settings().conflict_file.clone();
            let mut resolver: Box<dyn ConflictResolver> = if use_source {
                Box::new(UniformResolver(Choice::Source))
            } else if keep_target {
                Box::new(UniformResolver(Choice::Target))
            } else if deferred || !is_interactive() {
                Box::new(DeferredResolver::new(conflict_file).with_apps(from, to))
            } else {
                Box::new(InteractiveResolver::terminal())
            };

            match engine.sync_entries(from, to, mode, resolver.as_mut()) {
                Ok(report) => print_sync_report(&report),
                Err(e) => return Err(report_failure(e)),
            }
        }

        Commands::Resolve { file, from, to } => {
            let path = file.unwrap_or_else(|| engine.manager().settings().conflict_file.clone());
            let pending = PendingDocument::open(&path)?;
            println!(
                "{} {} ({} conflict(s))\n",
                "➤ Applying".cyan().bold(),
                path.display(),
                pending.names().len()
            );

            let apps = from.zip(to);
            match engine.resolve_document(&path, apps) {
                Ok(report) => print_sync_report(&report),
                Err(e) => return Err(report_failure(e)),
            }
        }

        Commands::Prompt { command } => match command {
            PromptCommands::Show { app } => {
                let prompt = engine
                    .manager()
                    .load_prompt(app)
                    .with_context(|| format!("No prompt found for {}", app.name()))?;
                println!("{}\n", prompt.path.display().to_string().dimmed());
                println!("{}", prompt.text);
            }
            PromptCommands::Sync { from, to } => {
                let report = engine.sync_prompt(from, to)?;
                println!(
                    "  {} Prompt synced: {} {} {}",
                    "✔".green(),
                    report.source.display(),
                    "→".cyan(),
                    report.target.display()
                );
                if report.converted {
                    println!("  {} Markdown formatting removed for plain text", "→".cyan());
                }
            }
        },

        Commands::RemoveAll { app, yes } => {
            if !yes {
                anyhow::ensure!(
                    is_interactive(),
                    "Refusing to remove entries without confirmation; pass --yes"
                );
                let confirmed =
                    dialoguer::Confirm::with_theme(&dialoguer::theme::ColorfulTheme::default())
                        .with_prompt(format!("Remove ALL entries from {}?", app.name()))
                        .default(false)
                        .interact()?;
                if !confirmed {
                    println!("{}", "  Cancelled.".dimmed());
                    return Ok(());
                }
            }

            let summary = engine.remove_all(app)?;
            match &summary {
                SaveSummary::CliCleared { report, .. } => {
                    for name in &report.removed {
                        println!("  {} Removed: {}", "✔".green(), name);
                    }
                    for (name, message) in &report.failed {
                        println!("  {} Could not remove {}: {}", "!".yellow(), name, message);
                    }
                    if report.wrappers_removed {
                        println!("  {} Removed wrapper scripts", "→".cyan());
                    }
                }
                _ => println!("  {} All entries removed from {}", "✔".green(), app.name()),
            }
            print_backup(&summary);
        }

        Commands::Import { apps, mode } => {
            print_header();
            let apps = if apps.is_empty() {
                AppId::all().to_vec()
            } else {
                apps
            };

            let mut resolver: Box<dyn ConflictResolver> = if is_interactive() {
                Box::new(InteractiveResolver::terminal())
            } else {
                Box::new(UniformResolver(Choice::Target))
            };

            let (superset, report) = engine.import_superset(&apps, mode, resolver.as_mut())?;

            println!("{}", "➤ Collected entries".cyan().bold());
            for (name, providers) in &superset.providers {
                let providers: Vec<&str> = providers.iter().map(|app| app.id()).collect();
                println!("  • {} {}", name.bold(), format!("({})", providers.join(", ")).dimmed());
            }
            for conflict in &superset.conflicts {
                println!(
                    "  {} {} differs between {} and {}; kept {}",
                    "!".yellow(),
                    conflict.name,
                    conflict.kept_from.id(),
                    conflict.other_from.id(),
                    conflict.kept_from.id()
                );
            }
            println!();
            print_sync_report(&report);
        }

        Commands::Status => show_status(&engine)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("mcpsync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_app(value: &str) -> Result<AppId, String> {
    AppId::parse(value).ok_or_else(|| {
        let known: Vec<&str> = AppId::all().iter().map(|app| app.id()).collect();
        format!(
            "unknown application '{value}' (expected one of: {}, or 1-{})",
            known.join(", "),
            known.len()
        )
    })
}

fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

fn list_apps(engine: &SyncEngine) {
    let manager = engine.manager();
    println!("{}", "Supported applications:".bold());
    for (app, installed) in manager.detect_installed() {
        let mark = if installed { "✔".green() } else { "✘".red() };
        let prompt = if app.supports_prompt() { " [prompt]" } else { "" };
        println!(
            "  {} {}. {} ({}){}",
            mark,
            app.number(),
            app.name().bold(),
            app.id(),
            prompt.dimmed()
        );
        if let Some(location) = manager.entries_location(app) {
            println!("       {}", location.dimmed());
        }
    }
}

fn show_entries(engine: &SyncEngine, app: AppId) -> Result<()> {
    let entries = engine
        .manager()
        .load_entries(app)
        .with_context(|| format!("Could not read entries from {}", app.name()))?;

    if entries.is_empty() {
        println!("{}", format!("  No entries configured in {}", app.name()).dimmed());
        return Ok(());
    }

    println!("{} ({})", app.name().bold(), entries.len());
    for (name, entry) in &entries {
        println!("  • {}: {}", name.cyan(), entry.command_line());
        if !entry.env.is_empty() {
            let keys: Vec<&str> = entry.env.keys().map(String::as_str).collect();
            println!("      env: {}", keys.join(", ").dimmed());
        }
        if let Some(cwd) = &entry.cwd {
            println!("      cwd: {}", cwd.dimmed());
        }
    }
    Ok(())
}

fn show_status(engine: &SyncEngine) -> Result<()> {
    let manager = engine.manager();
    let backups = manager.backups();

    println!("{} {}", "Backups:".bold(), backups.dir().display().to_string().dimmed());
    for &app in AppId::all() {
        let entries = backups.list(app.id())?.len();
        let prompts = backups.list(&format!("{}_prompt", app.id()))?.len();
        if entries + prompts > 0 {
            println!(
                "  • {}: {} entry backup(s), {} prompt backup(s)",
                app.name(),
                entries,
                prompts
            );
        }
    }

    let conflict_file = &manager.settings().conflict_file;
    if conflict_file.is_file() {
        let pending = PendingDocument::open(conflict_file)?;
        println!(
            "\n{} {} unresolved conflict(s) in {}",
            "!".yellow(),
            pending.names().len(),
            conflict_file.display()
        );
        println!("  Edit it, then run {}", "mcpsync resolve".cyan());
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    for name in &report.added {
        println!("  {} Added: {}", "✔".green(), name);
    }
    for name in &report.kept_target {
        println!("  {} Kept existing (differs from source): {}", "○".yellow(), name);
    }
    for resolution in &report.resolutions {
        let label = match resolution.choice {
            Choice::Source => "took source",
            Choice::Target => "kept target",
        };
        println!("  {} {}: {}", "→".cyan(), resolution.name, label);
    }
    if let SaveSummary::Cli { report: cli, .. } = &report.summary {
        for line in describe_report(cli) {
            println!("{line}");
        }
    }
    print_backup(&report.summary);

    println!("\n{}", "✨ Sync complete!".green().bold());
    println!(
        "  {}: {} entries ({} policy)",
        report.to.name(),
        report.total.to_string().green(),
        report.policy
    );
}

fn print_backup(summary: &SaveSummary) {
    if let Some(backup) = summary.backup() {
        println!("  {} Backup: {}", "→".cyan(), backup.display().to_string().dimmed());
    }
}

/// Print details for failures that carry more than a message
fn report_failure(error: SyncError) -> anyhow::Error {
    match &error {
        SyncError::ConflictPending { names, document } => {
            println!("{} Conflicts need resolution:", "!".yellow());
            for name in names {
                println!("  • {name}");
            }
            println!(
                "\nEdit {} and uncomment one KEEP line per entry, then run {}",
                document.display().to_string().cyan(),
                "mcpsync resolve".cyan()
            );
            eprintln!("Error: {error}");
            std::process::exit(EXIT_CONFLICTS_PENDING);
        }
        SyncError::ExternalTool { report, .. } => {
            for line in describe_report(report) {
                println!("{line}");
            }
            eprintln!("  {} {}", "✘".red(), error);
        }
        _ => {}
    }
    error.into()
}

fn print_header() {
    println!(
        "{}",
        r#"
╔═══════════════════════════════════════════════════════════════════╗
║                          mcpsync                                  ║
║          MCP Server Configuration Synchronization                 ║
╚═══════════════════════════════════════════════════════════════════╝
"#
        .cyan()
        .bold()
    );
}
