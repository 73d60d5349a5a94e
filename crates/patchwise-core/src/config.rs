use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatchwiseError;

/// Top-level configuration loaded from `.patchwise.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use patchwise_core::PatchwiseConfig;
///
/// let config = PatchwiseConfig::default();
/// assert_eq!(config.review.max_comments, 20);
/// assert_eq!(config.llm.provider, "gemini");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchwiseConfig {
    /// Generation provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Object-storage settings for guideline and history context.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PatchwiseConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Io`] if the file cannot be read, or
    /// [`PatchwiseError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, PatchwiseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchwise_core::PatchwiseConfig;
    ///
    /// let toml = r#"
    /// [review]
    /// max_comments = 10
    /// "#;
    /// let config = PatchwiseConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.max_comments, 10);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PatchwiseError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay the optional environment variables on top of file values.
    ///
    /// Recognized: `GEMINI_MODEL`, `GUIDELINES_BUCKET`, `GUIDELINES_PREFIX`,
    /// `STORAGE_ACCESS_TOKEN`. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchwise_core::PatchwiseConfig;
    ///
    /// let mut config = PatchwiseConfig::default();
    /// config.apply_env(|key| (key == "GUIDELINES_BUCKET").then(|| "team-docs".to_string()));
    /// assert_eq!(config.storage.bucket.as_deref(), Some("team-docs"));
    /// ```
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(bucket) = get("GUIDELINES_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(prefix) = get("GUIDELINES_PREFIX") {
            self.storage.guidelines_prefix = prefix;
        }
        if let Some(token) = get("STORAGE_ACCESS_TOKEN") {
            self.storage.access_token = Some(token);
        }
    }
}

/// Generation provider configuration.
///
/// # Examples
///
/// ```
/// use patchwise_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gemini-2.0-flash");
/// assert_eq!(config.api_key_env_var(), "GEMINI_API_KEY");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: `"gemini"` or `"openai"` (any OpenAI-compatible endpoint).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "gemini".into()
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    /// Name of the environment variable holding this provider's API key.
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GEMINI_API_KEY",
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use patchwise_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.max_comments, 20);
/// assert_eq!(config.max_diff_chars, 100_000);
/// assert!(config.skip_patterns.is_empty());
/// assert_eq!(config.guideline_files, ["README.md"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Maximum inline comments posted per run, across all files (default: 20).
    #[serde(default = "default_max_comments")]
    pub max_comments: usize,
    /// Diff text longer than this many characters is truncated (default: 100000).
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
    /// Additional glob patterns to skip before sending to the model.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// Local markdown files appended to the guideline text (default: `README.md`).
    #[serde(default = "default_guideline_files")]
    pub guideline_files: Vec<String>,
}

fn default_max_comments() -> usize {
    20
}

fn default_max_diff_chars() -> usize {
    100_000
}

fn default_guideline_files() -> Vec<String> {
    vec!["README.md".to_string()]
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_comments: default_max_comments(),
            max_diff_chars: default_max_diff_chars(),
            skip_patterns: Vec::new(),
            guideline_files: default_guideline_files(),
        }
    }
}

/// Object-storage configuration for supplementary prompt context.
///
/// History loading is wired up but off unless `history_enabled` is set.
///
/// # Examples
///
/// ```
/// use patchwise_core::StorageConfig;
///
/// let config = StorageConfig::default();
/// assert!(config.bucket.is_none());
/// assert!(!config.history_enabled);
/// assert_eq!(config.guidelines_prefix, "guidelines/");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding guideline and history objects. No bucket, no loading.
    pub bucket: Option<String>,
    /// Key prefix of the `.md` guideline objects.
    #[serde(default = "default_guidelines_prefix")]
    pub guidelines_prefix: String,
    /// Key prefix of the `.txt` review-history objects.
    #[serde(default = "default_history_prefix")]
    pub history_prefix: String,
    /// Load review history into the prompt (default: false).
    #[serde(default)]
    pub history_enabled: bool,
    /// Custom storage endpoint.
    pub base_url: Option<String>,
    /// Bearer token for private buckets.
    pub access_token: Option<String>,
}

fn default_guidelines_prefix() -> String {
    "guidelines/".into()
}

fn default_history_prefix() -> String {
    "history/".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            guidelines_prefix: default_guidelines_prefix(),
            history_prefix: default_history_prefix(),
            history_enabled: false,
            base_url: None,
            access_token: None,
        }
    }
}

/// The pull request a run targets.
///
/// Parses the `owner/repo#number` reference form.
///
/// # Examples
///
/// ```
/// use patchwise_core::PullTarget;
///
/// let target: PullTarget = "octocat/hello-world#42".parse().unwrap();
/// assert_eq!(target.owner, "octocat");
/// assert_eq!(target.repo, "hello-world");
/// assert_eq!(target.number, 42);
/// assert_eq!(target.to_string(), "octocat/hello-world#42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullTarget {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl PullTarget {
    /// Build a target from a `owner/repo` identifier and a PR number string,
    /// as supplied by `GITHUB_REPOSITORY` and `PR_NUMBER`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Config`] if either value is malformed.
    pub fn from_parts(repository: &str, number: &str) -> Result<Self, PatchwiseError> {
        let Some((owner, repo)) = repository.trim().split_once('/') else {
            return Err(PatchwiseError::Config(format!(
                "invalid repository '{repository}', expected owner/repo"
            )));
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(PatchwiseError::Config(format!(
                "invalid repository '{repository}', expected owner/repo"
            )));
        }
        let number: u64 = number
            .trim()
            .parse()
            .map_err(|_| PatchwiseError::Config(format!("invalid PR number: {number}")))?;
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }
}

impl FromStr for PullTarget {
    type Err = PatchwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((owner_repo, number)) = s.split_once('#') else {
            return Err(PatchwiseError::Config(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            )));
        };
        Self::from_parts(owner_repo, number)
    }
}

impl fmt::Display for PullTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Values a review run cannot start without.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Pull request to review.
    pub target: PullTarget,
    /// Source-control credential. Absent only in dry-run mode.
    pub github_token: Option<String>,
    /// Generation credential.
    pub llm_api_key: String,
}

/// CLI-level inputs that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Explicit `--pr owner/repo#number`.
    pub target: Option<PullTarget>,
    /// Print instead of posting; the GitHub token becomes optional.
    pub dry_run: bool,
}

impl RunSettings {
    /// Resolve required settings from overrides, config, and environment.
    ///
    /// Every missing value is collected so a single diagnostic names them all.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Config`] when anything required is missing
    /// or malformed. No remote client should be created in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchwise_core::{PatchwiseConfig, RunOverrides, RunSettings};
    ///
    /// let err = RunSettings::resolve(&PatchwiseConfig::default(), |_| None, &RunOverrides::default())
    ///     .unwrap_err();
    /// assert!(err.to_string().contains("PR_NUMBER"));
    /// assert!(err.to_string().contains("GEMINI_API_KEY"));
    /// ```
    pub fn resolve(
        config: &PatchwiseConfig,
        env: impl Fn(&str) -> Option<String>,
        overrides: &RunOverrides,
    ) -> Result<Self, PatchwiseError> {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let mut missing: Vec<&str> = Vec::new();

        let llm_var = config.llm.api_key_env_var();
        let llm_api_key = config.llm.api_key.clone().or_else(|| get(llm_var));
        if llm_api_key.is_none() {
            missing.push(llm_var);
        }

        let github_token = get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN"));
        if github_token.is_none() && !overrides.dry_run {
            missing.push("GITHUB_TOKEN");
        }

        let target = match &overrides.target {
            Some(target) => Some(target.clone()),
            None => {
                let repository = get("GITHUB_REPOSITORY");
                let number = get("PR_NUMBER");
                if number.is_none() {
                    missing.push("PR_NUMBER");
                }
                if repository.is_none() {
                    missing.push("GITHUB_REPOSITORY");
                }
                match (repository, number) {
                    (Some(repository), Some(number)) => {
                        Some(PullTarget::from_parts(&repository, &number)?)
                    }
                    _ => None,
                }
            }
        };

        match (target, llm_api_key) {
            (Some(target), Some(llm_api_key)) if missing.is_empty() => Ok(Self {
                target,
                github_token,
                llm_api_key,
            }),
            _ => Err(PatchwiseError::Config(format!(
                "missing required environment: {}",
                missing.join(", ")
            ))),
        }
    }
}
