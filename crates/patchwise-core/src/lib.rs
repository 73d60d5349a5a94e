//! Core types, configuration, and error handling for Patchwise.
//!
//! This crate provides the shared foundation used by all other Patchwise crates:
//! - [`PatchwiseError`]: unified error type using `thiserror`
//! - [`PatchwiseConfig`]: configuration loaded from `.patchwise.toml`
//! - [`RunSettings`]: required values resolved from CLI, env, and config
//! - Shared types: [`ChangedFile`], [`ReviewComment`], [`MappedComment`],
//!   [`SoftResult`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    LlmConfig, PatchwiseConfig, PullTarget, ReviewConfig, RunOverrides, RunSettings, StorageConfig,
};
pub use error::PatchwiseError;
pub use types::{ChangedFile, MappedComment, OutputFormat, ReviewComment, SoftResult};

/// A convenience `Result` type for Patchwise operations.
pub type Result<T> = std::result::Result<T, PatchwiseError>;
