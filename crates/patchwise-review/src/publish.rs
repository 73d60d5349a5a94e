//! Posting review output back to the pull request.
//!
//! Inline comments go through a [`CommentSink`] and are capped by a
//! [`CommentQuota`] shared across every file of a run. When nothing can be
//! anchored inline, the whole model response is posted once as an issue
//! comment instead, unless the quota is already used up.

use async_trait::async_trait;
use patchwise_core::{MappedComment, PatchwiseError};
use serde::Serialize;

/// Destination for review comments.
#[async_trait]
pub trait CommentSink: Send + Sync {
    /// Post a comment anchored to `line` of `path` in the new version of the
    /// file at `commit`.
    async fn inline_comment(
        &self,
        path: &str,
        commit: &str,
        line: u32,
        body: &str,
    ) -> Result<(), PatchwiseError>;

    /// Post a general comment on the pull request.
    async fn issue_comment(&self, body: &str) -> Result<(), PatchwiseError>;
}

/// Upper bound on inline comments for one run.
///
/// Only successful inline posts consume the quota. Issue-comment fallbacks
/// do not consume it, but none are posted once it is exhausted.
///
/// # Examples
///
/// ```
/// use patchwise_review::publish::CommentQuota;
///
/// let mut quota = CommentQuota::new(2);
/// assert!(quota.has_room());
/// quota.record_post();
/// quota.record_post();
/// assert!(!quota.has_room());
/// assert_eq!(quota.posted(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentQuota {
    limit: usize,
    posted: usize,
}

impl CommentQuota {
    /// Start a quota with nothing posted yet.
    pub fn new(limit: usize) -> Self {
        Self { limit, posted: 0 }
    }

    /// Whether another inline comment may be attempted.
    pub fn has_room(&self) -> bool {
        self.posted < self.limit
    }

    /// Count one successful inline comment.
    pub fn record_post(&mut self) {
        self.posted += 1;
    }

    /// Inline comments posted so far.
    pub fn posted(&self) -> usize {
        self.posted
    }

    /// Configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// What happened while publishing one file's review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// Inline comments created.
    pub posted: usize,
    /// Inline or issue comments the sink rejected.
    pub failed: usize,
    /// Anchored comments skipped because the quota was used up.
    pub dropped_by_quota: usize,
    /// Parsed comments whose diff line had no new-file line.
    pub unmapped: usize,
    /// Whether the response went out as a single issue comment.
    pub fallback: bool,
    /// Whether an issue-comment fallback was withheld because the quota was
    /// already used up.
    pub suppressed_by_quota: bool,
}

/// Publish one file's review.
///
/// `comments` are the parsed suggestions already run through the line
/// mapper. The response is posted as one issue comment, prefixed with the
/// file name, when there is no commit to anchor to, when nothing parsed, or
/// when no parsed comment mapped to a new-file line. Nothing is posted in
/// that case once the quota is exhausted. Otherwise each mapped comment is
/// posted inline while the quota has room; sink failures are logged and the
/// remaining comments are still attempted.
pub async fn publish_file_review(
    sink: &dyn CommentSink,
    path: &str,
    commit: Option<&str>,
    response: &str,
    comments: &[MappedComment],
    quota: &mut CommentQuota,
) -> PublishOutcome {
    let mut outcome = PublishOutcome::default();

    let anchored = comments.iter().filter(|c| c.is_mapped()).count();
    outcome.unmapped = comments.len() - anchored;

    let commit = match commit {
        Some(commit) if anchored > 0 => commit,
        _ if !quota.has_room() => {
            tracing::debug!(
                file = %path,
                limit = quota.limit(),
                "comment quota reached, not posting issue comment"
            );
            outcome.suppressed_by_quota = true;
            return outcome;
        }
        _ => {
            tracing::debug!(
                file = %path,
                parsed = comments.len(),
                anchored,
                has_commit = commit.is_some(),
                "posting review as issue comment"
            );
            outcome.fallback = true;
            if let Err(e) = sink.issue_comment(&fallback_body(path, response)).await {
                tracing::warn!(file = %path, error = %e, "failed to post issue comment");
                outcome.failed += 1;
            }
            return outcome;
        }
    };

    for comment in comments {
        let Some(line) = comment.file_line else {
            tracing::debug!(
                file = %path,
                diff_line = comment.diff_line,
                "comment does not map to a new-file line"
            );
            continue;
        };

        if !quota.has_room() {
            outcome.dropped_by_quota += 1;
            continue;
        }

        match sink.inline_comment(path, commit, line, &comment.body).await {
            Ok(()) => {
                quota.record_post();
                outcome.posted += 1;
            }
            Err(e) => {
                tracing::warn!(
                    file = %path,
                    line,
                    diff_line = comment.diff_line,
                    error = %e,
                    "failed to post inline comment"
                );
                outcome.failed += 1;
            }
        }
    }

    if outcome.dropped_by_quota > 0 {
        tracing::debug!(
            file = %path,
            dropped = outcome.dropped_by_quota,
            limit = quota.limit(),
            "comment quota reached"
        );
    }

    outcome
}

/// Body of the issue comment used when a review cannot be posted inline.
///
/// # Examples
///
/// ```
/// use patchwise_review::publish::fallback_body;
///
/// let body = fallback_body("pkg/api/types.go", "Looks fine.");
/// assert!(body.starts_with("Review for `pkg/api/types.go`"));
/// assert!(body.ends_with("Looks fine."));
/// ```
pub fn fallback_body(path: &str, response: &str) -> String {
    format!("Review for `{path}`:\n\n{}", response.trim())
}

/// Prints comments to stdout instead of posting them.
#[derive(Debug, Default)]
pub struct ConsoleSink;

#[async_trait]
impl CommentSink for ConsoleSink {
    async fn inline_comment(
        &self,
        path: &str,
        commit: &str,
        line: u32,
        body: &str,
    ) -> Result<(), PatchwiseError> {
        let short = commit.get(..7).unwrap_or(commit);
        println!("{path}:{line} ({short})\n  {body}\n");
        Ok(())
    }

    async fn issue_comment(&self, body: &str) -> Result<(), PatchwiseError> {
        println!("[issue comment]\n{body}\n");
        Ok(())
    }
}
