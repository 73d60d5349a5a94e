//! Supplementary prompt context: guidelines and review history.
//!
//! Objects come from a Cloud Storage bucket through its JSON API. Local
//! markdown files listed in the configuration are appended to the
//! guidelines. Every failure here degrades to empty context.

use std::path::Path;
use std::time::Duration;

use patchwise_core::{PatchwiseError, SoftResult, StorageConfig};
use serde::Deserialize;

const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Suffix of guideline objects.
pub const GUIDELINE_SUFFIX: &str = ".md";

/// Suffix of review-history objects.
pub const HISTORY_SUFFIX: &str = ".txt";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

/// Reads guideline and history objects from object storage.
pub struct ContextLoader {
    http: reqwest::Client,
    config: StorageConfig,
}

impl ContextLoader {
    /// Create a loader from storage configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Storage`] if the HTTP client cannot be built.
    pub fn new(config: &StorageConfig) -> Result<Self, PatchwiseError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PatchwiseError::Storage(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Concatenated `.md` objects under the guidelines prefix.
    ///
    /// Empty when no bucket is configured or nothing matched.
    pub async fn load_guidelines(&self) -> SoftResult<String> {
        let Some(bucket) = self.config.bucket.as_deref() else {
            tracing::debug!("no storage bucket configured; skipping guidelines");
            return SoftResult::Empty;
        };
        let prefix = &self.config.guidelines_prefix;
        non_empty(SoftResult::capture(
            self.load_objects(bucket, prefix, GUIDELINE_SUFFIX).await,
            "guideline download",
        ))
    }

    /// Concatenated `.txt` objects under the history prefix.
    ///
    /// Always [`SoftResult::Empty`] while `history_enabled` is unset.
    pub async fn load_history(&self) -> SoftResult<String> {
        if !self.config.history_enabled {
            tracing::debug!("review history disabled");
            return SoftResult::Empty;
        }
        let Some(bucket) = self.config.bucket.as_deref() else {
            return SoftResult::Empty;
        };
        let prefix = &self.config.history_prefix;
        non_empty(SoftResult::capture(
            self.load_objects(bucket, prefix, HISTORY_SUFFIX).await,
            "history download",
        ))
    }

    async fn load_objects(
        &self,
        bucket: &str,
        prefix: &str,
        suffix: &str,
    ) -> Result<String, PatchwiseError> {
        let names = self.list_objects(bucket, prefix).await?;
        let mut objects = Vec::new();
        for name in names.into_iter().filter(|n| n.ends_with(suffix)) {
            let content = self.download(bucket, &name).await?;
            objects.push((name, content));
        }
        tracing::info!(bucket, prefix, count = objects.len(), "loaded context objects");
        Ok(concat_objects(&objects))
    }

    /// Names of every object under `prefix`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Storage`] on network or API errors.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, PatchwiseError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = bucket_url(self.base_url(), bucket, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let list: ObjectList = self
                .send(self.http.get(url))
                .await?
                .json()
                .await
                .map_err(|e| PatchwiseError::Storage(format!("failed to parse listing: {e}")))?;

            names.extend(list.items.into_iter().map(|item| item.name));
            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(names)
    }

    /// Contents of one object as text.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Storage`] on network or API errors.
    pub async fn download(&self, bucket: &str, name: &str) -> Result<String, PatchwiseError> {
        let mut url = bucket_url(self.base_url(), bucket, Some(name))?;
        url.query_pairs_mut().append_pair("alt", "media");

        self.send(self.http.get(url))
            .await?
            .text()
            .await
            .map_err(|e| PatchwiseError::Storage(format!("failed to read {name}: {e}")))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(STORAGE_BASE_URL)
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PatchwiseError> {
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PatchwiseError::Storage(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PatchwiseError::Storage(format!(
                "storage API error {status}: {body}"
            )));
        }
        Ok(response)
    }
}

/// Build `{base}/storage/v1/b/{bucket}/o[/{object}]`, percent-encoding the
/// object name as a single path segment.
fn bucket_url(
    base: &str,
    bucket: &str,
    object: Option<&str>,
) -> Result<reqwest::Url, PatchwiseError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| PatchwiseError::Config(format!("invalid storage URL '{base}': {e}")))?;
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            PatchwiseError::Config(format!("storage URL '{base}' cannot be a base"))
        })?;
        segments.pop_if_empty();
        segments.extend(["storage", "v1", "b", bucket, "o"]);
        if let Some(object) = object {
            segments.push(object);
        }
    }
    Ok(url)
}

fn non_empty(result: SoftResult<String>) -> SoftResult<String> {
    match result {
        SoftResult::Success(text) if text.trim().is_empty() => SoftResult::Empty,
        other => other,
    }
}

/// Join object contents in listing order, one blank line apart.
///
/// # Examples
///
/// ```
/// use patchwise_review::context::concat_objects;
///
/// let objects = vec![
///     ("guidelines/a.md".to_string(), "Use contexts.".to_string()),
///     ("guidelines/b.md".to_string(), "Wrap errors.\n".to_string()),
/// ];
/// assert_eq!(concat_objects(&objects), "Use contexts.\n\nWrap errors.");
/// ```
pub fn concat_objects(objects: &[(String, String)]) -> String {
    objects
        .iter()
        .map(|(_, content)| content.trim_end())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Read local guideline files, each under a `Content of <file>` header.
///
/// Missing or unreadable files are logged and skipped.
pub fn read_guideline_files<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut combined = String::new();
    for path in paths {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                combined.push_str(&format!(
                    "\n\n---\nContent of {}:\n{content}\n",
                    path.display()
                ));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(file = %path.display(), "guideline file not found");
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping guideline file");
            }
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_encodes_slashes() {
        let url = bucket_url(STORAGE_BASE_URL, "review-ctx", Some("guidelines/go style.md")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/review-ctx/o/guidelines%2Fgo%20style.md"
        );
    }

    #[test]
    fn listing_url_respects_custom_base() {
        let url = bucket_url("http://localhost:4443/", "b", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4443/storage/v1/b/b/o");
    }

    #[test]
    fn listing_parses_page_token() {
        let list: ObjectList = serde_json::from_value(serde_json::json!({
            "items": [{ "name": "guidelines/a.md" }, { "name": "guidelines/b.txt" }],
            "nextPageToken": "abc"
        }))
        .unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.next_page_token.as_deref(), Some("abc"));

        let empty: ObjectList = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.next_page_token.is_none());
    }

    #[test]
    fn concat_skips_blank_objects() {
        let objects = vec![
            ("a.md".to_string(), "  \n".to_string()),
            ("b.md".to_string(), "rule".to_string()),
        ];
        assert_eq!(concat_objects(&objects), "rule");
        assert_eq!(concat_objects(&[]), "");
    }

    #[test]
    fn guideline_files_read_and_missing_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let style = dir.path().join("STYLE.md");
        std::fs::write(&style, "Prefer early returns.").unwrap();
        let missing = dir.path().join("MISSING.md");

        let text = read_guideline_files(&[&style, &missing]);
        assert!(text.contains(&format!("Content of {}:", style.display())));
        assert!(text.contains("Prefer early returns."));
        assert!(!text.contains("MISSING.md"));
    }

    #[tokio::test]
    async fn no_bucket_means_empty_guidelines() {
        let loader = ContextLoader::new(&StorageConfig::default()).unwrap();
        assert!(matches!(loader.load_guidelines().await, SoftResult::Empty));
    }

    #[tokio::test]
    async fn history_disabled_by_default() {
        let config = StorageConfig {
            bucket: Some("review-ctx".into()),
            ..StorageConfig::default()
        };
        let loader = ContextLoader::new(&config).unwrap();
        assert!(matches!(loader.load_history().await, SoftResult::Empty));
    }

    #[tokio::test]
    async fn unreachable_storage_degrades() {
        let config = StorageConfig {
            bucket: Some("review-ctx".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            ..StorageConfig::default()
        };
        let loader = ContextLoader::new(&config).unwrap();
        let result = loader.load_guidelines().await;
        assert!(result.is_failed());
        assert_eq!(result.unwrap_or_default(), "");
    }
}
