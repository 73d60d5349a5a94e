use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use patchwise_core::{ChangedFile, ReviewConfig};
use patchwise_difflens::filter::SkippedFile;
use patchwise_difflens::linemap::map_comments;
use serde::Serialize;

use crate::llm::TextGenerator;
use crate::prompt::{self, PromptInput};
use crate::publish::{self, CommentQuota, CommentSink, PublishOutcome};

/// Text that goes into every prompt of a run.
#[derive(Debug, Clone, Default)]
pub struct ReviewContext {
    /// Guideline text, possibly empty.
    pub guidelines: String,
    /// Review history text, possibly empty.
    pub history: String,
    /// Pull request title.
    pub pull_title: Option<String>,
    /// Pull request description.
    pub pull_body: Option<String>,
}

/// How one file fared.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReview {
    /// Path of the file.
    pub path: String,
    /// What generation returned.
    pub response: ResponseStatus,
    /// `line N:` suggestions found in the response.
    pub suggestions: usize,
    /// Publishing result; absent when nothing was generated.
    pub outcome: Option<PublishOutcome>,
}

/// Result of the generation call for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    /// Text came back.
    Received,
    /// The call worked but returned no text.
    Empty,
    /// The call errored; the error was logged.
    Failed,
}

/// Counters for one run.
///
/// # Examples
///
/// ```
/// use patchwise_review::pipeline::ReviewStats;
///
/// let stats = ReviewStats {
///     model_used: "gemini-2.0-flash".into(),
///     ..ReviewStats::default()
/// };
/// assert_eq!(stats.inline_posted, 0);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    /// Files handed to the run, before filtering.
    pub files_considered: usize,
    /// Files excluded before generation.
    pub files_skipped: usize,
    /// Files sent to the model.
    pub files_reviewed: usize,
    /// Generation calls that errored.
    pub generation_failures: usize,
    /// Generation calls that returned no text.
    pub empty_responses: usize,
    /// Suggestions parsed across all responses.
    pub suggestions_parsed: usize,
    /// Inline comments created.
    pub inline_posted: usize,
    /// Comments the source-control API rejected.
    pub comments_failed: usize,
    /// Anchored comments skipped once the quota was reached.
    pub dropped_by_quota: usize,
    /// Suggestions with no new-file line.
    pub unmapped: usize,
    /// Issue comments created as fallback.
    pub issue_comments: usize,
    /// Issue-comment fallbacks withheld once the quota was reached.
    pub issue_comments_suppressed: usize,
    /// Model identifier used for the run.
    pub model_used: String,
}

/// Result of a review run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Commit inline comments were anchored to, if any.
    pub commit: Option<String>,
    /// Per-file results in review order.
    pub files: Vec<FileReview>,
    /// Files excluded before generation.
    pub skipped: Vec<SkippedFile>,
    /// Totals.
    pub stats: ReviewStats,
}

/// Drives generation and publishing over the changed files, one at a time.
///
/// A single [`CommentQuota`] spans every file of a run.
pub struct ReviewPipeline {
    generator: Box<dyn TextGenerator>,
    sink: Box<dyn CommentSink>,
    config: ReviewConfig,
    show_progress: bool,
}

impl ReviewPipeline {
    /// Create a pipeline from a generator, a comment sink, and review config.
    pub fn new(
        generator: Box<dyn TextGenerator>,
        sink: Box<dyn CommentSink>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            generator,
            sink,
            config,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while files are reviewed.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Review `files` in order.
    ///
    /// `commit` anchors inline comments; with `None` every review is posted
    /// as an issue comment. `skipped` only feeds the report. Failures are
    /// logged and counted, never returned.
    pub async fn run(
        &self,
        files: &[ChangedFile],
        commit: Option<&str>,
        context: &ReviewContext,
        skipped: Vec<SkippedFile>,
    ) -> ReviewReport {
        let started_at = Utc::now();
        let mut quota = CommentQuota::new(self.config.max_comments);
        let mut stats = ReviewStats {
            files_considered: files.len() + skipped.len(),
            files_skipped: skipped.len(),
            model_used: self.generator.model().to_string(),
            ..ReviewStats::default()
        };
        let mut reviews = Vec::with_capacity(files.len());

        let progress = self.progress_bar(files.len());

        for file in files {
            progress.set_message(file.path.clone());
            let review = self.review_file(file, commit, context, &mut quota).await;

            stats.files_reviewed += 1;
            stats.suggestions_parsed += review.suggestions;
            match review.response {
                ResponseStatus::Received => {}
                ResponseStatus::Empty => stats.empty_responses += 1,
                ResponseStatus::Failed => stats.generation_failures += 1,
            }
            if let Some(outcome) = &review.outcome {
                stats.inline_posted += outcome.posted;
                stats.comments_failed += outcome.failed;
                stats.dropped_by_quota += outcome.dropped_by_quota;
                stats.unmapped += outcome.unmapped;
                if outcome.fallback && outcome.failed == 0 {
                    stats.issue_comments += 1;
                }
                if outcome.suppressed_by_quota {
                    stats.issue_comments_suppressed += 1;
                }
            }
            reviews.push(review);
            progress.inc(1);
        }
        progress.finish_and_clear();

        tracing::info!(
            reviewed = stats.files_reviewed,
            posted = stats.inline_posted,
            issue_comments = stats.issue_comments,
            failed = stats.comments_failed,
            "review finished"
        );

        ReviewReport {
            started_at,
            commit: commit.map(str::to_string),
            files: reviews,
            skipped,
            stats,
        }
    }

    async fn review_file(
        &self,
        file: &ChangedFile,
        commit: Option<&str>,
        context: &ReviewContext,
        quota: &mut CommentQuota,
    ) -> FileReview {
        let prompt = prompt::build_review_prompt(&PromptInput {
            path: &file.path,
            diff: &file.patch,
            guidelines: &context.guidelines,
            history: &context.history,
            pull_title: context.pull_title.as_deref(),
            pull_body: context.pull_body.as_deref(),
            max_diff_chars: self.config.max_diff_chars,
        });

        let mut review = FileReview {
            path: file.path.clone(),
            response: ResponseStatus::Failed,
            suggestions: 0,
            outcome: None,
        };

        let response = match self.generator.generate(&prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!(file = %file.path, "no response from model");
                review.response = ResponseStatus::Empty;
                return review;
            }
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "generation failed");
                return review;
            }
        };
        review.response = ResponseStatus::Received;

        let comments = prompt::parse_review_response(&response);
        review.suggestions = comments.len();
        tracing::debug!(file = %file.path, suggestions = comments.len(), "parsed model response");

        let mapped = map_comments(&file.patch, &comments);
        review.outcome = Some(
            publish::publish_file_review(
                self.sink.as_ref(),
                &file.path,
                commit,
                &response,
                &mapped,
                quota,
            )
            .await,
        );
        review
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {wide_msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "Review Results")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Model: {} | Files: {} reviewed, {} skipped | Inline: {} | Issue comments: {}",
            s.model_used, s.files_reviewed, s.files_skipped, s.inline_posted, s.issue_comments,
        )?;
        writeln!(
            f,
            "Suggestions: {} | Unmapped: {} | Dropped by quota: {} | Failed posts: {} | Generation failures: {}\n",
            s.suggestions_parsed, s.unmapped, s.dropped_by_quota, s.comments_failed, s.generation_failures,
        )?;

        if self.files.is_empty() {
            writeln!(f, "No files to review.")?;
        }
        for review in &self.files {
            match &review.outcome {
                None if review.response == ResponseStatus::Failed => {
                    writeln!(f, "  {}: generation failed", review.path)?
                }
                None => writeln!(f, "  {}: no response", review.path)?,
                Some(o) if o.fallback => writeln!(f, "  {}: issue comment", review.path)?,
                Some(o) if o.suppressed_by_quota => {
                    writeln!(f, "  {}: not posted (quota reached)", review.path)?
                }
                Some(o) => writeln!(
                    f,
                    "  {}: {} posted, {} unmapped",
                    review.path, o.posted, o.unmapped
                )?,
            }
        }
        for skipped in &self.skipped {
            writeln!(f, "  {}: skipped ({})", skipped.path, skipped.reason)?;
        }

        Ok(())
    }
}

impl ReviewReport {
    /// Render the report as markdown.
    pub fn to_markdown(&self) -> String {
        let s = &self.stats;
        let mut out = String::new();
        out.push_str("# Review Results\n\n");
        let _ = write!(
            out,
            "**Model:** {} | **Reviewed:** {} | **Skipped:** {} | **Inline comments:** {} | **Issue comments:** {}\n\n",
            s.model_used, s.files_reviewed, s.files_skipped, s.inline_posted, s.issue_comments,
        );

        if self.files.is_empty() {
            out.push_str("No files to review.\n");
            return out;
        }

        out.push_str("| File | Suggestions | Posted | Result |\n");
        out.push_str("|---|---|---|---|\n");
        for review in &self.files {
            let (posted, result) = match &review.outcome {
                None => (0, "no response"),
                Some(o) if o.fallback => (0, "issue comment"),
                Some(o) if o.suppressed_by_quota || o.dropped_by_quota > 0 => {
                    (o.posted, "quota reached")
                }
                Some(o) => (o.posted, "inline"),
            };
            let _ = writeln!(
                out,
                "| `{}` | {} | {posted} | {result} |",
                review.path, review.suggestions
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use patchwise_core::PatchwiseError;

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<Option<String>, PatchwiseError> {
            Ok(self.0.map(str::to_string))
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<Option<String>, PatchwiseError> {
            Err(PatchwiseError::Llm("503 Service Unavailable".into()))
        }

        fn model(&self) -> &str {
            "failing"
        }
    }

    struct NullSink;

    #[async_trait]
    impl CommentSink for NullSink {
        async fn inline_comment(
            &self,
            _path: &str,
            _commit: &str,
            _line: u32,
            _body: &str,
        ) -> Result<(), PatchwiseError> {
            Ok(())
        }

        async fn issue_comment(&self, _body: &str) -> Result<(), PatchwiseError> {
            Ok(())
        }
    }

    fn files() -> Vec<ChangedFile> {
        vec![ChangedFile::new("main.go", "@@ -1,2 +1,3 @@\n a\n+b\n c\n")]
    }

    fn pipeline(generator: Box<dyn TextGenerator>) -> ReviewPipeline {
        ReviewPipeline::new(generator, Box::new(NullSink), ReviewConfig::default())
    }

    #[tokio::test]
    async fn generation_failure_counted_and_skipped() {
        let report = pipeline(Box::new(Failing))
            .run(&files(), Some("abc"), &ReviewContext::default(), Vec::new())
            .await;
        assert_eq!(report.stats.generation_failures, 1);
        assert_eq!(report.stats.inline_posted, 0);
        assert!(report.files[0].outcome.is_none());
    }

    #[tokio::test]
    async fn empty_response_produces_no_comments() {
        let report = pipeline(Box::new(Canned(None)))
            .run(&files(), Some("abc"), &ReviewContext::default(), Vec::new())
            .await;
        assert_eq!(report.stats.empty_responses, 1);
        assert_eq!(report.stats.generation_failures, 0);
        assert_eq!(report.stats.issue_comments, 0);
    }

    #[tokio::test]
    async fn report_renders_all_formats() {
        let report = pipeline(Box::new(Canned(Some("line 3: name this"))))
            .run(&files(), Some("abc"), &ReviewContext::default(), Vec::new())
            .await;
        assert_eq!(report.stats.inline_posted, 1);
        assert_eq!(report.stats.model_used, "canned");

        assert!(report.to_string().contains("main.go: 1 posted, 0 unmapped"));
        assert!(report.to_markdown().contains("| `main.go` | 1 | 1 | inline |"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["inlinePosted"], 1);
        assert_eq!(json["commit"], "abc");
    }
}
