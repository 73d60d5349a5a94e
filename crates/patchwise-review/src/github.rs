use patchwise_core::{ChangedFile, PatchwiseError, PullTarget, SoftResult};
use patchwise_difflens::filter::{DiffFilter, SkippedFile};
use serde::{Deserialize, Serialize};

use crate::publish::CommentSink;

const PAGE_SIZE: usize = 100;

/// Pull request metadata used in prompts and for anchoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestInfo {
    /// Pull request number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Description, if any.
    pub body: Option<String>,
    /// Head commit of the source branch.
    pub head_sha: String,
}

/// Reviewable files of the most recent commit on a pull request.
#[derive(Debug, Clone)]
pub struct CommitChanges {
    /// Commit the files belong to; inline comments anchor here.
    pub sha: String,
    /// Files that passed the filter, in listing order.
    pub files: Vec<ChangedFile>,
    /// Files the filter excluded.
    pub skipped: Vec<SkippedFile>,
}

#[derive(Serialize)]
struct Page {
    per_page: usize,
    page: u32,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    head: HeadRef,
}

#[derive(Deserialize)]
struct HeadRef {
    sha: String,
}

#[derive(Deserialize)]
struct CommitEntry {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Deserialize)]
struct FileEntry {
    filename: String,
    #[serde(default)]
    patch: Option<String>,
}

impl From<FileEntry> for ChangedFile {
    fn from(entry: FileEntry) -> Self {
        ChangedFile::new(entry.filename, entry.patch.unwrap_or_default())
    }
}

/// GitHub REST client for reading pull requests and posting comments.
///
/// # Examples
///
/// ```
/// use patchwise_review::github::parse_pr_reference;
///
/// let target = parse_pr_reference("kubernetes/kubernetes#12345").unwrap();
/// assert_eq!(target.owner, "kubernetes");
/// assert_eq!(target.repo, "kubernetes");
/// assert_eq!(target.number, 12345);
/// ```
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
}

impl GitHubClient {
    /// Create a client. Without a token requests are anonymous, which only
    /// suffices for reading public repositories.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use patchwise_review::github::GitHubClient;
    ///
    /// let client = GitHubClient::new(Some("ghp_xxxx")).unwrap();
    /// ```
    pub fn new(token: Option<&str>) -> Result<Self, PatchwiseError> {
        let builder = octocrab::Octocrab::builder();
        let builder = match token {
            Some(token) => builder.personal_token(token.to_string()),
            None => builder,
        };
        let octocrab = builder
            .build()
            .map_err(|e| PatchwiseError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self { octocrab })
    }

    /// Look up a pull request by number.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on network or API errors.
    pub async fn get_pull_request(
        &self,
        target: &PullTarget,
    ) -> Result<PullRequestInfo, PatchwiseError> {
        let route = format!(
            "/repos/{}/{}/pulls/{}",
            target.owner, target.repo, target.number
        );
        let pull: PullResponse = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| PatchwiseError::GitHub(format!("failed to fetch {target}: {e}")))?;

        Ok(PullRequestInfo {
            number: pull.number,
            title: pull.title,
            body: pull.body,
            head_sha: pull.head.sha,
        })
    }

    /// SHA of the most recent commit on the pull request, or `None` when it
    /// has no commits.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on network or API errors.
    pub async fn latest_commit_sha(
        &self,
        target: &PullTarget,
    ) -> Result<Option<String>, PatchwiseError> {
        let mut latest = None;
        let route = format!(
            "/repos/{}/{}/pulls/{}/commits",
            target.owner, target.repo, target.number
        );
        for page in 1u32.. {
            let params = Page { per_page: PAGE_SIZE, page };
            let commits: Vec<CommitEntry> =
                self.octocrab.get(&route, Some(&params)).await.map_err(|e| {
                    PatchwiseError::GitHub(format!("failed to list commits of {target}: {e}"))
                })?;

            let count = commits.len();
            // Listed oldest first
            if let Some(last) = commits.into_iter().last() {
                latest = Some(last.sha);
            }
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(latest)
    }

    /// Files changed by one commit, with their patch text.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on network or API errors.
    pub async fn commit_files(
        &self,
        target: &PullTarget,
        sha: &str,
    ) -> Result<Vec<ChangedFile>, PatchwiseError> {
        let mut files = Vec::new();
        let route = format!(
            "/repos/{}/{}/commits/{sha}",
            target.owner, target.repo
        );
        for page in 1u32.. {
            let params = Page { per_page: PAGE_SIZE, page };
            let commit: CommitResponse = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .map_err(|e| PatchwiseError::GitHub(format!("failed to fetch commit {sha}: {e}")))?;

            let count = commit.files.len();
            files.extend(commit.files.into_iter().map(ChangedFile::from));
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(files)
    }

    /// Files changed across the whole pull request.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on network or API errors.
    pub async fn pull_files(&self, target: &PullTarget) -> Result<Vec<ChangedFile>, PatchwiseError> {
        let mut files = Vec::new();
        let route = format!(
            "/repos/{}/{}/pulls/{}/files",
            target.owner, target.repo, target.number
        );
        for page in 1u32.. {
            let params = Page { per_page: PAGE_SIZE, page };
            let entries: Vec<FileEntry> =
                self.octocrab.get(&route, Some(&params)).await.map_err(|e| {
                    PatchwiseError::GitHub(format!("failed to list files of {target}: {e}"))
                })?;

            let count = entries.len();
            files.extend(entries.into_iter().map(ChangedFile::from));
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(files)
    }

    /// Reviewable files of the most recent commit.
    ///
    /// Never fails hard: a pull request with no commits yields
    /// [`SoftResult::Empty`], and API errors are logged and yield
    /// [`SoftResult::Failed`].
    pub async fn latest_commit_changes(
        &self,
        target: &PullTarget,
        filter: &DiffFilter,
    ) -> SoftResult<CommitChanges> {
        let sha = match self.latest_commit_sha(target).await {
            Ok(Some(sha)) => sha,
            Ok(None) => {
                tracing::info!(pr = %target, "pull request has no commits");
                return SoftResult::Empty;
            }
            Err(e) => return SoftResult::capture(Err(e), "commit listing"),
        };

        SoftResult::capture(self.commit_files(target, &sha).await, "changed-file listing").map(
            |files| {
                let result = filter.filter(files);
                tracing::info!(
                    commit = %sha,
                    kept = result.kept.len(),
                    skipped = result.skipped.len(),
                    "fetched changed files"
                );
                CommitChanges {
                    sha,
                    files: result.kept,
                    skipped: result.skipped,
                }
            },
        )
    }

    /// Create an inline review comment on the right side of the diff.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on API errors, including a line
    /// that is not part of the diff.
    pub async fn create_review_comment(
        &self,
        target: &PullTarget,
        commit: &str,
        path: &str,
        line: u32,
        body: &str,
    ) -> Result<(), PatchwiseError> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/comments",
            target.owner, target.repo, target.number
        );
        let body = serde_json::json!({
            "body": body,
            "commit_id": commit,
            "path": path,
            "line": line,
            "side": "RIGHT",
        });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| {
                PatchwiseError::GitHub(format!("failed to comment on {path}:{line}: {e}"))
            })?;

        Ok(())
    }

    /// Create a general comment on the pull request conversation.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::GitHub`] on API errors.
    pub async fn create_issue_comment(
        &self,
        target: &PullTarget,
        body: &str,
    ) -> Result<(), PatchwiseError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            target.owner, target.repo, target.number
        );
        let body = serde_json::json!({ "body": body });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| PatchwiseError::GitHub(format!("failed to post issue comment: {e}")))?;

        Ok(())
    }
}

/// Posts comments to one pull request.
#[derive(Clone)]
pub struct PullRequestSink {
    client: GitHubClient,
    target: PullTarget,
}

impl PullRequestSink {
    /// Bind a client to the pull request comments go to.
    pub fn new(client: GitHubClient, target: PullTarget) -> Self {
        Self { client, target }
    }
}

#[async_trait::async_trait]
impl CommentSink for PullRequestSink {
    async fn inline_comment(
        &self,
        path: &str,
        commit: &str,
        line: u32,
        body: &str,
    ) -> Result<(), PatchwiseError> {
        self.client
            .create_review_comment(&self.target, commit, path, line, body)
            .await
    }

    async fn issue_comment(&self, body: &str) -> Result<(), PatchwiseError> {
        self.client.create_issue_comment(&self.target, body).await
    }
}

/// Parse a PR reference string (`owner/repo#number`).
///
/// # Errors
///
/// Returns [`PatchwiseError::Config`] if the format is invalid.
pub fn parse_pr_reference(pr_ref: &str) -> Result<PullTarget, PatchwiseError> {
    pr_ref.trim().parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_pr_reference() {
        let target = parse_pr_reference(" rust-lang/rust#12345 ").unwrap();
        assert_eq!(target.owner, "rust-lang");
        assert_eq!(target.repo, "rust");
        assert_eq!(target.number, 12345);
    }

    #[test]
    fn parse_pr_reference_rejects_malformed() {
        for bad in ["owner/repo", "repo#123", "owner/repo#abc", "/repo#1"] {
            assert!(parse_pr_reference(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn file_entry_without_patch_becomes_empty() {
        let entries: Vec<FileEntry> = serde_json::from_value(serde_json::json!([
            { "filename": "logo.png", "status": "added" },
            { "filename": "main.go", "patch": "@@ -1 +1 @@\n-a\n+b" }
        ]))
        .unwrap();
        let files: Vec<ChangedFile> = entries.into_iter().map(ChangedFile::from).collect();
        assert!(!files[0].has_patch());
        assert_eq!(files[1].path, "main.go");
        assert!(files[1].has_patch());
    }

    #[test]
    fn pull_response_reads_head_sha() {
        let pull: PullResponse = serde_json::from_value(serde_json::json!({
            "number": 7,
            "title": "Add retries",
            "body": null,
            "head": { "sha": "deadbeef", "ref": "retries" }
        }))
        .unwrap();
        assert_eq!(pull.head.sha, "deadbeef");
        assert!(pull.body.is_none());
    }

    #[test]
    fn client_builds_without_token() {
        // octocrab needs a runtime for its service layer
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        assert!(GitHubClient::new(None).is_ok());
    }
}
