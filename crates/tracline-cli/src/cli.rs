use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracline_core::FileAction;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output layout for listing commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    List,
    Json,
}

/// Access log action filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl From<ActionArg> for FileAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Created => FileAction::Created,
            ActionArg::Modified => FileAction::Modified,
            ActionArg::Deleted => FileAction::Deleted,
            ActionArg::Renamed => FileAction::Renamed,
        }
    }
}

#[derive(Parser)]
#[command(name = "tracline")]
#[command(about = "tracline - file monitoring and task/file traceability")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/tracline/config.toml)
    #[arg(short = 'C', long, global = true, env = "TRACLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides config file)
    #[arg(long, global = true, env = "TRACLINE_DB_PATH")]
    pub db_path: Option<PathBuf>,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn requested_level(&self) -> Option<LevelFilter> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level.into()),
            (None, true) => Some(LevelFilter::DEBUG),
            (None, false) => None,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Control per-project file monitors
    #[command(subcommand)]
    Monitor(MonitorCommands),

    /// Manage and report file/task traceability
    #[command(subcommand)]
    Trace(TraceCommands),
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Start monitoring a project directory
    Start {
        /// Project ID
        project: String,

        /// Project root directory
        path: PathBuf,

        /// Extensions to watch, e.g. `.py,.md`. Given without a value, every
        /// extension is watched
        #[arg(short, long, value_delimiter = ',', num_args = 0..)]
        extensions: Option<Vec<String>>,

        /// Run detached in the background
        #[arg(short, long)]
        daemon: bool,
    },

    /// Stop a project's monitor
    Stop {
        /// Project ID
        project: String,
    },

    /// Show monitor state for one project or all of them
    Status {
        /// Project ID
        project: Option<String>,
    },

    /// Show recent file access history
    History {
        /// Project ID
        project: String,

        /// Number of entries
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Entries to skip
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Only this action
        #[arg(short, long, value_enum)]
        action: Option<ActionArg>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Trim the access log per the [history] retention policy
    Prune {
        /// Project ID
        project: String,
    },

    /// Print the log file of a detached monitor
    Logs {
        /// Project ID
        project: String,

        /// Only the last N lines
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Run a monitor in the foreground using its stored settings
    #[command(hide = true)]
    Run {
        /// Project ID
        project: String,
    },
}

#[derive(Subcommand)]
pub enum TraceCommands {
    /// Associate a file with a task
    AddFile {
        /// Task ID
        task: String,
        /// File path
        file: PathBuf,
    },

    /// Remove a file association from a task
    RemoveFile {
        /// Task ID
        task: String,
        /// File path
        file: PathBuf,
    },

    /// List tasks that reference a file
    LsTrace {
        /// File path
        file: PathBuf,

        /// Project ID (defaults to the monitored project containing the file)
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by task status
        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the most referenced files
    Stats {
        /// Project ID
        project: String,

        /// Show top N referenced files
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Task x file traceability matrix
    Matrix {
        /// Project ID
        project: String,

        /// Only files with this extension
        #[arg(short = 'e', long)]
        extension: Option<String>,

        /// Only files whose path contains this text
        #[arg(long)]
        file_contains: Option<String>,

        /// Only tasks whose title contains this text
        #[arg(long)]
        task_contains: Option<String>,

        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Include per-file reference counts
        #[arg(short = 'r', long)]
        reference_counts: bool,

        /// Number of most referenced files in the summary
        #[arg(long)]
        top: Option<usize>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List extensions among associated files
    Extensions {
        /// Project ID
        project: String,
    },

    /// Reference counts per file and per extension
    FileStats {
        /// Project ID
        project: String,

        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}
