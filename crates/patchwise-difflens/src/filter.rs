//! Pre-review file filtering.
//!
//! Test files, generated files, and files without patch text never reach
//! the model. Custom glob patterns from the configuration extend the
//! built-in rules; nothing else is excluded.

use patchwise_core::{ChangedFile, ReviewConfig};

/// Path suffixes that mark a test file.
pub const TEST_SUFFIXES: &[&str] = &["_test.go", "_test.py"];

/// Path segment that marks a test directory.
pub const TEST_SEGMENT: &str = "test";

/// Substring that marks a generated file.
pub const GENERATED_MARKER: &str = "_generated";

/// Files and patterns to skip before sending to the model.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::filter::DiffFilter;
///
/// let filter = DiffFilter::default_filter();
/// assert!(filter.should_skip("pkg/api/types_test.go"));
/// assert!(!filter.should_skip("pkg/api/types.go"));
/// ```
pub struct DiffFilter {
    skip_patterns: Vec<glob::Pattern>,
}

impl DiffFilter {
    /// Create a filter with only the built-in rules.
    pub fn default_filter() -> Self {
        Self {
            skip_patterns: Vec::new(),
        }
    }

    /// Create a filter from review configuration.
    ///
    /// Invalid glob patterns are logged and ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchwise_core::ReviewConfig;
    /// use patchwise_difflens::filter::DiffFilter;
    ///
    /// let config = ReviewConfig {
    ///     skip_patterns: vec!["docs/**".into()],
    ///     ..ReviewConfig::default()
    /// };
    /// let filter = DiffFilter::from_config(&config);
    /// assert!(filter.should_skip("docs/intro.md"));
    /// ```
    pub fn from_config(config: &ReviewConfig) -> Self {
        let mut skip_patterns = Vec::new();
        for pat in &config.skip_patterns {
            match glob::Pattern::new(pat) {
                Ok(p) => skip_patterns.push(p),
                Err(e) => tracing::warn!(pattern = %pat, error = %e, "ignoring invalid skip pattern"),
            }
        }

        Self { skip_patterns }
    }

    /// Check if a path would be skipped, ignoring patch content.
    pub fn should_skip(&self, path: &str) -> bool {
        self.check_path(path).is_some()
    }

    /// Split changed files into reviewable and skipped ones, preserving order.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchwise_core::ChangedFile;
    /// use patchwise_difflens::filter::DiffFilter;
    ///
    /// let files = vec![
    ///     ChangedFile::new("src/lib.rs", "@@ -1 +1 @@\n-a\n+b\n"),
    ///     ChangedFile::new("logo.png", ""),
    /// ];
    /// let result = DiffFilter::default_filter().filter(files);
    /// assert_eq!(result.kept.len(), 1);
    /// assert_eq!(result.skipped.len(), 1);
    /// ```
    pub fn filter(&self, files: Vec<ChangedFile>) -> FilterResult {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            let reason = self.check_path(&file.path).or_else(|| {
                if file.has_patch() {
                    None
                } else {
                    Some(SkipReason::EmptyPatch)
                }
            });

            match reason {
                Some(reason) => {
                    tracing::debug!(file = %file.path, %reason, "skipping file");
                    skipped.push(SkippedFile {
                        path: file.path,
                        reason,
                    });
                }
                None => kept.push(file),
            }
        }

        FilterResult { kept, skipped }
    }

    fn check_path(&self, path: &str) -> Option<SkipReason> {
        if is_test_file(path) {
            return Some(SkipReason::TestFile);
        }

        if is_generated(path) {
            return Some(SkipReason::GeneratedFile);
        }

        for pat in &self.skip_patterns {
            if pat.matches(path) {
                return Some(SkipReason::PatternMatch(pat.to_string()));
            }
        }

        None
    }
}

/// Result of filtering changed files.
#[derive(Debug, Default)]
pub struct FilterResult {
    /// Files that passed the filter.
    pub kept: Vec<ChangedFile>,
    /// Files that were skipped with reasons.
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: String,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Reason a file was skipped.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::filter::SkipReason;
///
/// assert_eq!(SkipReason::TestFile.to_string(), "test file");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Test source or test directory.
    TestFile,
    /// Generated code.
    GeneratedFile,
    /// Binary, rename-only, or otherwise patch-less change.
    EmptyPatch,
    /// Matched a custom skip pattern.
    PatternMatch(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TestFile => write!(f, "test file"),
            SkipReason::GeneratedFile => write!(f, "generated file"),
            SkipReason::EmptyPatch => write!(f, "no patch"),
            SkipReason::PatternMatch(pat) => write!(f, "pattern: {pat}"),
        }
    }
}

fn is_test_file(path: &str) -> bool {
    TEST_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
        || path.split('/').any(|segment| segment == TEST_SEGMENT)
}

fn is_generated(path: &str) -> bool {
    path.contains(GENERATED_MARKER)
}
