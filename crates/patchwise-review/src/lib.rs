//! Pull request review orchestration.
//!
//! Provides the GitHub client, the generation client, context loading,
//! prompt construction, comment publishing, and the per-file pipeline that
//! ties them together.

pub mod context;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod publish;
