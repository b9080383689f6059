//! CLI command definitions

use clap::{Parser, ValueEnum};
use conch_domain::ApprovalMode;
use std::path::PathBuf;

/// Approval mode override for tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApprovalArg {
    /// Ask before every call that needs confirmation
    Ask,
    /// Approve built-in file edits automatically
    AutoEdit,
    /// Never ask
    Yolo,
}

impl From<ApprovalArg> for ApprovalMode {
    fn from(arg: ApprovalArg) -> Self {
        match arg {
            ApprovalArg::Ask => ApprovalMode::Ask,
            ApprovalArg::AutoEdit => ApprovalMode::AutoEdit,
            ApprovalArg::Yolo => ApprovalMode::Yolo,
        }
    }
}

/// CLI arguments for conch
#[derive(Parser, Debug)]
#[command(name = "conch")]
#[command(author, version, about = "Interactive agent shell with plugin-provided tools")]
#[command(long_about = r#"
conch is an interactive shell around a language model. The model can call
built-in tools and tools offered by plugin processes; lines starting with /
run slash commands.

Configuration files are loaded from (lowest to highest priority):
1. ~/.config/conch/config.toml   Global config
2. ./conch.toml or ./.conch.toml Project-level config
3. --config <path>               Explicit config file
4. CONCH_* environment variables (e.g. CONCH_SESSION__MAX_TURNS=10)

Example:
  conch
  conch "summarize the README"
  conch --approval yolo -vv
"#)]
pub struct Cli {
    /// Run a single prompt and exit instead of starting the shell
    pub prompt: Option<String>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress the spinner and per-call tool lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// Directory for log files and conversation records
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Override the configured approval mode
    #[arg(long, value_enum, value_name = "MODE")]
    pub approval: Option<ApprovalArg>,
}

impl Cli {
    /// Log filter directive for the verbosity count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
