// braid/src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "braid")]
#[command(version)]
#[command(about = "The Dependency-Ordered Pull Request Integration Runner", long_about = None)]
pub struct Cli {
    /// Repository / project directory (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🧮 Synthesize and validate the plan, writing plan.json + snapshot.md
    Plan {
        /// Output directory (defaults to <profile>/runner)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the canonical plan JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// 🪜 Print the dependency-ordered merge levels
    MergeOrder {
        /// Read an existing plan.json instead of synthesizing one
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// 📐 Schema tooling
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// 🚦 Run every gate, level by level
    Execute {
        /// Read an existing plan.json instead of synthesizing one
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// 📋 Show per-item status and eligibility from persisted gate results
    Status {
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// 🧾 Aggregate persisted gate results into a summary
    Report {
        /// Emit JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },

    /// 🩺 Check the environment, profile and configuration
    Doctor,

    /// 🌱 Scaffold a writable profile with config skeletons
    Bootstrap,

    /// 🧵 Run the autopilot ladder (L0 report ... L4 finalize)
    Autopilot {
        /// Highest level to execute
        #[arg(long, default_value_t = 0)]
        level: u8,

        /// Perform external effects instead of recording intents
        #[arg(long)]
        live: bool,

        /// Open a PR for the integration branch (requires --level >= 3)
        #[arg(long)]
        open_pr: bool,

        /// Close superseded source PRs after finalize (requires --level 4)
        #[arg(long)]
        close_superseded: bool,

        /// Template for PR annotations ({item}, {level}, {target})
        #[arg(long)]
        comment_template: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Validate a plan document, reporting every issue
    Validate {
        /// Path to the plan JSON file
        file: PathBuf,
    },
}
