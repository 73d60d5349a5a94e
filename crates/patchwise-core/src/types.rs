use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatchwiseError;

/// One file touched by the commit under review.
///
/// # Examples
///
/// ```
/// use patchwise_core::ChangedFile;
///
/// let file = ChangedFile::new("src/lib.rs", "@@ -1 +1 @@\n-a\n+b\n");
/// assert_eq!(file.path, "src/lib.rs");
/// assert!(file.has_patch());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Repository-relative path, `/`-separated.
    pub path: String,
    /// Unified-diff patch text. Empty for binary or rename-only changes.
    pub patch: String,
}

impl ChangedFile {
    /// Create a changed file from a path and its patch text.
    pub fn new(path: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            patch: patch.into(),
        }
    }

    /// Returns `true` if there is any patch text to review.
    pub fn has_patch(&self) -> bool {
        !self.patch.trim().is_empty()
    }
}

/// A suggestion parsed from the model output.
///
/// `diff_line` is the 1-based line index into the patch text the model was
/// shown, not a line in the resulting file.
///
/// # Examples
///
/// ```
/// use patchwise_core::ReviewComment;
///
/// let comment = ReviewComment {
///     diff_line: 5,
///     body: "fix this".into(),
/// };
/// assert_eq!(comment.diff_line, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    /// Line number counted within the diff text.
    pub diff_line: u32,
    /// Free-text comment body.
    pub body: String,
}

/// A [`ReviewComment`] translated to a line in the new version of the file.
///
/// `file_line` is `None` when the diff position does not correspond to a
/// line of the new file (a removed line, a hunk header, or out of range).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedComment {
    /// Line number counted within the diff text.
    pub diff_line: u32,
    /// Line number in the new file, if the position maps to one.
    pub file_line: Option<u32>,
    /// Free-text comment body.
    pub body: String,
}

impl MappedComment {
    /// Returns `true` if the comment can be anchored to a file line.
    pub fn is_mapped(&self) -> bool {
        self.file_line.is_some()
    }
}

/// Outcome of a best-effort operation.
///
/// Remote reads and writes never abort the run. Instead of broad error
/// swallowing, each such operation reports whether it produced a value, ran
/// but produced nothing, or failed (after the failure was logged).
///
/// # Examples
///
/// ```
/// use patchwise_core::{PatchwiseError, SoftResult};
///
/// let ok: SoftResult<String> = SoftResult::capture(Ok("guidelines".to_string()), "load");
/// assert!(ok.is_success());
///
/// let failed: SoftResult<String> =
///     SoftResult::capture(Err(PatchwiseError::Storage("403".into())), "load");
/// assert!(failed.is_degraded());
/// assert_eq!(failed.unwrap_or_default(), "");
/// ```
#[derive(Debug)]
pub enum SoftResult<T> {
    /// The operation produced a value.
    Success(T),
    /// The operation completed but had nothing to return.
    Empty,
    /// The operation failed and the failure has been logged.
    Failed(PatchwiseError),
}

impl<T> SoftResult<T> {
    /// Convert a hard result into a soft one, logging any error at `warn`.
    pub fn capture(result: Result<T, PatchwiseError>, what: &str) -> Self {
        match result {
            Ok(value) => SoftResult::Success(value),
            Err(e) => {
                tracing::warn!(error = %e, "{what} failed; continuing without it");
                SoftResult::Failed(e)
            }
        }
    }

    /// Returns `true` if a value was produced.
    pub fn is_success(&self) -> bool {
        matches!(self, SoftResult::Success(_))
    }

    /// Returns `true` for both the empty and the failed outcome.
    pub fn is_degraded(&self) -> bool {
        !self.is_success()
    }

    /// Returns `true` only for the failed outcome.
    pub fn is_failed(&self) -> bool {
        matches!(self, SoftResult::Failed(_))
    }

    /// Discard the degradation reason and keep the value, if any.
    pub fn into_option(self) -> Option<T> {
        match self {
            SoftResult::Success(value) => Some(value),
            SoftResult::Empty | SoftResult::Failed(_) => None,
        }
    }

    /// Transform the success value, preserving the degraded outcomes.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SoftResult<U> {
        match self {
            SoftResult::Success(value) => SoftResult::Success(f(value)),
            SoftResult::Empty => SoftResult::Empty,
            SoftResult::Failed(e) => SoftResult::Failed(e),
        }
    }
}

impl<T: Default> SoftResult<T> {
    /// Return the value, or `T::default()` when degraded.
    pub fn unwrap_or_default(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

/// Output format for the run report.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use patchwise_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
