/// Errors that can occur across Patchwise.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary converts to `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use patchwise_core::PatchwiseError;
///
/// let err = PatchwiseError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PatchwiseError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(patchwise::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(patchwise::config),
        help("run 'patchwise doctor' to see which settings are missing")
    )]
    Config(String),

    /// Source-control API failure.
    #[error("GitHub error: {0}")]
    #[diagnostic(code(patchwise::github))]
    GitHub(String),

    /// Object-storage API failure.
    #[error("storage error: {0}")]
    #[diagnostic(code(patchwise::storage))]
    Storage(String),

    /// Generation API or response error.
    #[error("LLM error: {0}")]
    #[diagnostic(code(patchwise::llm))]
    Llm(String),

    /// Diff or input parsing failure.
    #[error("parse error: {0}")]
    #[diagnostic(code(patchwise::parse))]
    Parse(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(patchwise::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(patchwise::toml))]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PatchwiseError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = PatchwiseError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn github_error_names_domain() {
        let err = PatchwiseError::GitHub("422 Unprocessable Entity".into());
        assert!(err.to_string().starts_with("GitHub error"));
    }
}
