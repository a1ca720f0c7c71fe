//! CLI module for the stax tool.
//!
//! This module provides the command-line interface for reconciling,
//! pulling and inspecting CloudFormation stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StackSelection};
pub use output::{count_by_account, AccountCount, OutputFormatter, StackPeek};
