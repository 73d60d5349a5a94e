//! Diff handling for pull request review.
//!
//! Splits unified diffs into per-file patches, filters out files that should
//! never be reviewed, and maps diff-relative line numbers back to lines in
//! the new version of a file.

pub mod filter;
pub mod linemap;
pub mod parser;
