//! CLI definitions for Reweave.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reweave CLI.
#[derive(Parser)]
#[command(name = "reweave")]
#[command(about = "Self-healing browser workflow replay engine")]
#[command(version)]
pub(crate) struct Cli {
    /// Workflow storage directory (default: ~/.reweave/workflows)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Replay a stored workflow
    Run {
        /// Workflow ID
        workflow_id: String,

        /// Password for workflows that require one. Read from the
        /// environment so it never appears in the process list.
        #[arg(long, env = "REWEAVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Run Chrome with a visible window
        #[arg(long)]
        headed: bool,

        /// Chrome executable path (auto-detected when unset)
        #[arg(long)]
        chrome: Option<PathBuf>,

        /// Repair attempts per step before the run fails
        #[arg(long, default_value_t = 5)]
        max_retries: u32,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored workflows
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show a stored workflow
    Show {
        /// Workflow ID
        workflow_id: String,
    },
}
