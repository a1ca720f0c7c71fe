//! Stack model.
//!
//! This module describes the desired state of a stack as declared locally:
//! - Identity, template, parameters and tags of each stack instance
//! - Canonical key/value mappings built from inline values, pair lists or files
//! - Default tags, including the fingerprint marker
//! - Loading and filtering stack instances from `stax.json`

mod kv;
mod loader;
mod spec;
mod tags;
mod template;

pub use kv::KeyValues;
pub use loader::{group_by_placement, load_stacks, substitute, StackFilter};
pub use spec::{StackId, StackSpec};
pub use tags::{default_tags, BuildMetadata};
pub use template::{yaml_to_json, Template, TemplateEncoding};
