//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::stack::StackFilter;

/// Stax - Reconcile CloudFormation stacks with their local definitions.
#[derive(Parser, Debug)]
#[command(name = "stax")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to stax.json (defaults to the nearest one above the working directory).
    #[arg(short, long, global = true, env = "STAX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output.
    #[arg(short, long, global = true, visible_alias = "debug")]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile live stacks with their local definitions.
    Push {
        /// Stacks to push.
        #[command(flatten)]
        selection: StackSelection,

        /// Stage a changeset for every stack instead of trusting the fingerprint.
        #[arg(short, long)]
        force: bool,

        /// Skip confirmation for creates and updates.
        #[arg(short, long)]
        yes: bool,

        /// Execute this pre-staged changeset (single stack only).
        #[arg(long = "changeset", value_name = "ID")]
        change_set: Option<String>,

        /// Only update tags, keeping the deployed template and parameters.
        #[arg(long)]
        tags_only: bool,
    },

    /// Generate local definitions from live stacks.
    Pull {
        /// Stacks to pull.
        #[command(flatten)]
        selection: StackSelection,

        /// Overwrite stacks already defined in stax.json.
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a single live stack.
    Delete {
        /// Accounts to delete from.
        #[arg(short, long = "account", value_name = "ACCOUNT")]
        accounts: Vec<String>,

        /// Regions to delete from.
        #[arg(short, long = "region", value_name = "REGION")]
        regions: Vec<String>,

        /// Stack name.
        name: String,
    },

    /// Show the outputs and resources of live stacks.
    Peer {
        /// Stacks to peer into.
        #[command(flatten)]
        selection: StackSelection,
    },

    /// Count locally defined stacks per account.
    Summary {
        /// Stacks to count.
        #[command(flatten)]
        selection: StackSelection,
    },

    /// Print a sample stax.json.
    Generate,

    /// Open template and parameter files in $EDITOR.
    Edit {
        /// Stacks to edit.
        #[command(flatten)]
        selection: StackSelection,
    },

    /// Validate stax.json.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Selects stacks by account, region and name.
#[derive(Args, Debug, Clone, Default)]
pub struct StackSelection {
    /// Accounts to include (repeatable, default all).
    #[arg(short, long = "account", value_name = "ACCOUNT")]
    pub accounts: Vec<String>,

    /// Regions to include (repeatable, default all).
    #[arg(short, long = "region", value_name = "REGION")]
    pub regions: Vec<String>,

    /// Stack names to include (default all).
    pub names: Vec<String>,
}

impl StackSelection {
    /// Converts the selection into a stack filter.
    #[must_use]
    pub fn filter(&self) -> StackFilter {
        StackFilter::new(self.accounts.clone(), self.regions.clone(), self.names.clone())
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
