mod commands;

use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use sift_sandbox::{Settings, WorkerCommand, Workbench};
use tracing_subscriber::EnvFilter;

/// Process exit codes.
pub(crate) mod exit {
    pub const ERROR: i32 = 1;
    pub const REJECTED: i32 = 2;
    pub const RUNTIME_ERROR: i32 = 3;
    pub const TIMEOUT: i32 = 4;
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Run pasted report scripts safely against locally ingested data.
#[derive(Parser)]
#[command(
    name = "sift",
    version,
    about = "Run pasted report scripts safely against locally ingested data"
)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = sift_sandbox::settings::DEFAULT_FILE)]
    config: PathBuf,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new files from the drop directory and archive them
    Ingest,

    /// Check a script against the policy without running it
    Validate {
        /// Path to the script file
        file: PathBuf,
    },

    /// Validate and run a script, or a saved report
    Run {
        /// Path to the script file
        file: Option<PathBuf>,
        /// Saved report to run (or to attribute FILE's run to)
        #[arg(long)]
        report: Option<i64>,
    },

    /// List saved reports (latest version of each)
    Reports {
        /// Show every version of this report instead
        #[arg(long)]
        name: Option<String>,
    },

    /// Validate a script and save it as a new report version
    SaveReport {
        #[arg(long)]
        name: String,
        /// The request the script was generated from
        #[arg(long, default_value = "")]
        prompt: String,
        /// Path to the script file
        #[arg(long)]
        script: PathBuf,
    },

    /// Show table schemas
    Schema {
        /// Only this table
        table: Option<String>,
    },

    /// Show the execution log, newest first
    History {
        #[arg(long)]
        report: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print instructions to hand to a script generator
    Prompt {
        /// What the report should show
        #[arg(long, default_value = "")]
        request: String,
        /// Only describe this table
        #[arg(long)]
        table: Option<String>,
    },

    /// Serve one worker request on stdin (used by the supervisor)
    #[command(hide = true)]
    Worker,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The worker installs its own stderr subscriber.
    if !matches!(cli.command, Commands::Worker) {
        init_logging(cli.quiet);
    }

    let (output, quiet) = (cli.output, cli.quiet);
    match cli.command {
        Commands::Ingest => {
            let bench = open(&cli.config, output, quiet);
            commands::ingest::cmd_ingest(bench, output, quiet);
        }
        Commands::Validate { file } => {
            let settings = load(&cli.config, output, quiet);
            commands::validate::cmd_validate(&file, &settings, output, quiet);
        }
        Commands::Run { file, report } => {
            let bench = open(&cli.config, output, quiet);
            commands::run::cmd_run(&bench, file.as_deref(), report, output, quiet);
        }
        Commands::Reports { name } => {
            let bench = open(&cli.config, output, quiet);
            commands::reports::cmd_reports(&bench, name.as_deref(), output, quiet);
        }
        Commands::SaveReport {
            name,
            prompt,
            script,
        } => {
            let bench = open(&cli.config, output, quiet);
            commands::reports::cmd_save_report(bench, &name, &prompt, &script, output, quiet);
        }
        Commands::Schema { table } => {
            let bench = open(&cli.config, output, quiet);
            commands::inspect::cmd_schema(&bench, table.as_deref(), output, quiet);
        }
        Commands::History { report, limit } => {
            let bench = open(&cli.config, output, quiet);
            commands::inspect::cmd_history(&bench, report, limit, output, quiet);
        }
        Commands::Prompt { request, table } => {
            let bench = open(&cli.config, output, quiet);
            commands::inspect::cmd_prompt(&bench, &request, table.as_deref(), output, quiet);
        }
        Commands::Worker => return sift_sandbox::worker::main(),
    }
    ExitCode::SUCCESS
}

/// Logs go to stderr so `--output json` stays parseable.
fn init_logging(quiet: bool) {
    let default = if quiet { "sift=warn" } else { "sift=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(config: &Path, output: OutputFormat, quiet: bool) -> Settings {
    match Settings::load(config) {
        Ok(settings) => settings,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    }
}

fn open(config: &Path, output: OutputFormat, quiet: bool) -> Workbench {
    let settings = load(config, output, quiet);
    let opened = WorkerCommand::discover().and_then(|worker| Workbench::open(settings, worker));
    match opened {
        Ok(bench) => bench,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T, output: OutputFormat, quiet: bool) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            report_error(&format!("error: could not encode output: {}", e), output, quiet);
            process::exit(exit::ERROR);
        }
    }
}
