//! marksearch - full-text search over a tree of Markdown documents.
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use marksearch::cli::maintain::MaintainAction;
use marksearch::config::{crash_log_path, find_project_root, Config};
use marksearch::error::exit_codes;
use marksearch::logging::{init_subscriber, Verbosity};
use marksearch::store::IndexStore;

// =============================================================================
// CLI Definition
// =============================================================================

/// marksearch - full-text search over a tree of Markdown documents
#[derive(Parser)]
#[command(name = "marksearch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Index directory (overrides config and MARKSEARCH_INDEX_DIR)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress command output and only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every Markdown file under a directory
    Index {
        /// Directory to walk
        dir: PathBuf,
        /// Remove all indexed documents first
        #[arg(long)]
        rebuild: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Search the index
    Search {
        /// Search query
        query: String,
        /// Use the full query syntax instead of prefix matching
        #[arg(long)]
        raw: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Maximum number of results
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Interactive search loop (type `quit` to exit)
    Shell,

    /// Remove one document by key (its absolute path)
    Delete {
        /// Document key
        key: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Remove every document from the index
    Clear {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Merge index segments
    Optimize {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// List indexed documents
    List {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Maximum number of documents
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show index statistics
    Stats {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Create .marksearch/config.toml in the current directory
    Init {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Overwrite an existing config
        #[arg(long, short)]
        force: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("marksearch error: {}", e);
            ExitCode::from(exit_codes::FAILURE as u8)
        }
    }
}

/// On panic, append to `<home>/crash.log` and exit with the crash code.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("marksearch panic: {}", info);

        if let Some(crash_log) = crash_log_path() {
            if let Some(parent) = crash_log.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Everything a command needs to reach the index.
struct Context {
    cwd: PathBuf,
    root: PathBuf,
    config: Config,
    quiet: bool,
}

impl Context {
    fn load(index_dir: Option<PathBuf>, quiet: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let cwd = std::env::current_dir()?;
        let root = find_project_root(&cwd);
        let mut config = Config::load_from_cwd(&root);
        if let Some(dir) = index_dir {
            config.index.dir = Some(if dir.is_absolute() { dir } else { cwd.join(dir) });
        }
        Ok(Self {
            cwd,
            root,
            config,
            quiet,
        })
    }

    fn open_store(&self) -> Result<IndexStore, Box<dyn std::error::Error>> {
        Ok(IndexStore::from_config(&self.config.index, &self.root)?)
    }
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));
    let ctx = Context::load(cli.index_dir, cli.quiet)?;

    let report = match cli.command {
        Commands::Index { dir, rebuild, json } => run_index(&ctx, &dir, rebuild, json),
        Commands::Search {
            query,
            raw,
            json,
            limit,
        } => run_search(&ctx, &query, raw, json, limit),
        Commands::Shell => return run_shell(&ctx),
        Commands::Delete { key, json } => run_maintain(&ctx, MaintainAction::Delete(key), json),
        Commands::Clear { json } => run_maintain(&ctx, MaintainAction::Clear, json),
        Commands::Optimize { json } => run_maintain(&ctx, MaintainAction::Optimize, json),
        Commands::List { json, limit } => run_list(&ctx, json, limit),
        Commands::Stats { json } => run_stats(&ctx, json),
        Commands::Init { json, force } => run_init(&ctx, json, force),
    }?;

    if !report.text.is_empty() {
        println!("{}", report.text);
    }
    Ok(success_to_exit_code(report.success))
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::FAILURE as u8)
    }
}

/// A finished command: whether it succeeded and what to print.
struct Report {
    success: bool,
    text: String,
}

type CommandResult = Result<Report, Box<dyn std::error::Error>>;

fn run_index(ctx: &Context, dir: &Path, rebuild: bool, json: bool) -> CommandResult {
    use marksearch::cli::index::{IndexCommand, IndexOptions};

    let store = ctx.open_store()?;
    let cmd = IndexCommand::new(&store, &ctx.config);
    let options = IndexOptions {
        json,
        quiet: ctx.quiet,
        rebuild,
    };

    let output = cmd.run(dir, &options);
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

fn run_search(
    ctx: &Context,
    query: &str,
    raw: bool,
    json: bool,
    limit: Option<usize>,
) -> CommandResult {
    use marksearch::cli::search::{SearchCommand, SearchOptions};

    let store = ctx.open_store()?;
    let cmd = SearchCommand::new(&store, ctx.config.clone());
    let options = SearchOptions {
        json,
        quiet: ctx.quiet,
        limit,
        raw,
    };

    let output = cmd.run(query, &options);
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

fn run_shell(ctx: &Context) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use marksearch::cli::shell::ShellCommand;

    let store = ctx.open_store()?;
    let shell = ShellCommand::new(&store, &ctx.config);
    let stdin = std::io::stdin();
    shell.run(stdin.lock(), std::io::stdout().lock())?;

    Ok(success_to_exit_code(true))
}

fn run_maintain(ctx: &Context, action: MaintainAction, json: bool) -> CommandResult {
    use marksearch::cli::maintain::{MaintainCommand, MaintainOptions};

    let store = ctx.open_store()?;
    let cmd = MaintainCommand::new(&store);
    let options = MaintainOptions {
        json,
        quiet: ctx.quiet,
    };

    let output = cmd.run(&action);
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

fn run_list(ctx: &Context, json: bool, limit: Option<usize>) -> CommandResult {
    use marksearch::cli::list::{ListCommand, ListOptions};

    let store = ctx.open_store()?;
    let cmd = ListCommand::new(&store);
    let options = ListOptions {
        json,
        quiet: ctx.quiet,
        limit,
    };

    let output = cmd.run(&options);
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

fn run_stats(ctx: &Context, json: bool) -> CommandResult {
    use marksearch::cli::stats::{StatsCommand, StatsOptions};

    let store = ctx.open_store()?;
    let cmd = StatsCommand::new(&store);
    let options = StatsOptions {
        json,
        quiet: ctx.quiet,
    };

    let output = cmd.run();
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

fn run_init(ctx: &Context, json: bool, force: bool) -> CommandResult {
    use marksearch::cli::init::{InitCommand, InitOptions};

    let cmd = InitCommand::new(&ctx.cwd);
    let options = InitOptions {
        json,
        quiet: ctx.quiet,
        force,
    };

    let output = cmd.run(&options);
    Ok(Report {
        success: output.success,
        text: cmd.format_output(&output, &options),
    })
}

// =============================================================================
// Tests
// =============================================================================
