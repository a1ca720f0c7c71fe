// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stax
//!
//! Reconciles CloudFormation stacks with their local definitions.
//!
//! ## Overview
//!
//! Stacks are declared in `stax.json`: a template, parameters per account and
//! region, and tags. Stax brings the live stacks in line with them:
//!
//! - Skip unchanged stacks by comparing a fingerprint stored as a stack tag
//! - Stage every other change as a changeset and show a diff before applying
//! - Refuse changesets older than a configured timeout
//! - Delete stacks marked for purge, always after asking
//!
//! ## Architecture
//!
//! 1. **Desired State**: Declared in `stax.json` and loaded as [`stack::StackSpec`]s
//! 2. **Live State**: Read through the [`cloudformation::StackGateway`] trait
//! 3. **Reconciler**: Plans, reviews and executes changesets one stack at a time
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and fingerprints
//! - [`stack`]: Desired stack model and loading
//! - [`cloudformation`]: Live state gateway and its AWS implementation
//! - [`planner`]: Changesets, diffs, change summaries and status polling
//! - [`reconciler`]: Per-stack reconciliation
//! - [`pull`]: Local definitions generated from live stacks
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```json
//! {
//!     "accounts": {"dev": {"id": "123456789012", "profile": "dev"}},
//!     "default_region": "ap-southeast-2",
//!     "stacks": {
//!         "orders-api": {
//!             "template": "templates/$name.json",
//!             "parameters": {"dev": {"QueueName": "orders-dev"}}
//!         }
//!     }
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cloudformation;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod planner;
pub mod pull;
pub mod reconciler;
pub mod stack;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cloudformation::{CloudFormationGateway, StackGateway};
pub use config::{ConfigParser, ConfigValidator, Fingerprinter, StaxConfig};
pub use console::{Console, TerminalConsole};
pub use context::ReconcileContext;
pub use error::{Result, StaxError};
pub use planner::{ChangePlanner, DiffRenderer};
pub use pull::Puller;
pub use reconciler::{PushOptions, PushReport, Reconciler};
pub use stack::{StackFilter, StackId, StackSpec};
