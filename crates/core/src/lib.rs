//! Core types for kubestrap.
//!
//! This crate describes external tools as data and owns the state that the
//! execution engine threads through provisioning:
//!
//! - [`ToolDescriptor`]: one wrapped command, decoded from configuration
//! - [`ToolCatalog`]: descriptors in declaration order, looked up by name or alias
//! - [`CacheLayout`]: the `<root>/bin/<name>/<release>` directory convention
//! - [`ProvisioningContext`]: platform, catalog, cache and the augmented search path
//! - [`Config`]: YAML configuration loading and merging

pub mod catalog;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod layout;
pub mod platform;

pub use catalog::ToolCatalog;
pub use config::{Config, parse_duration};
pub use context::ProvisioningContext;
pub use descriptor::{ExtractSpec, SourceLocator, SourceTable, ToolDescriptor};
pub use error::{Error, Result};
pub use layout::CacheLayout;
pub use platform::{Arch, Os, Platform};
