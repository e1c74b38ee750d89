use crate::streaming::RepoStatus;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for search execution
#[derive(Error, Debug)]
pub enum SearchError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// The query could not be turned into a runnable job
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// `index:only` was requested but cannot be honored
    #[error("invalid index:only ({0})")]
    IndexOnly(String),

    /// Structural search was asked to run against a non-primary branch
    #[error("structural search only supports searching the default branch")]
    StructuralNonDefaultBranch,

    /// The indexed backend failed or is unreachable
    #[error("Indexed backend error: {0}")]
    IndexedBackend(String),

    /// The unindexed backend does not know the repository
    #[error("repository not found: {repo}")]
    RepoNotFound { repo: String },

    /// The revision could not be resolved in the repository
    #[error("revision not found: {repo}@{rev}")]
    RevisionNotFound { repo: String, rev: String },

    /// The repository is still being cloned
    #[error("repository is being cloned: {repo}")]
    RepoCloning { repo: String },

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// The search context was canceled
    #[error("search canceled")]
    Canceled,

    /// The search context's deadline expired
    #[error("search deadline exceeded")]
    DeadlineExceeded,

    /// A spawned child task panicked or was aborted
    #[error("search task failed: {0}")]
    Task(String),

    /// Several children failed
    #[error("{0}")]
    Multiple(Errors),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    /// True for control signals that stop work without indicating a fault
    pub fn is_cancellation(&self) -> bool {
        match self {
            SearchError::Canceled | SearchError::DeadlineExceeded => true,
            SearchError::Multiple(errors) => errors.iter().all(SearchError::is_cancellation),
            _ => false,
        }
    }

    /// True only for an explicit cancel, not for an expired deadline
    pub fn is_canceled(&self) -> bool {
        match self {
            SearchError::Canceled => true,
            SearchError::Multiple(errors) => errors.iter().all(SearchError::is_canceled),
            _ => false,
        }
    }

    /// True when the error is made only of expired deadlines
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            SearchError::DeadlineExceeded => true,
            SearchError::Multiple(errors) => {
                !errors.is_empty() && errors.iter().all(SearchError::is_deadline_exceeded)
            }
            _ => false,
        }
    }

    /// The repository status a per-repository error is downgraded to, if any
    pub fn repo_status(&self) -> Option<RepoStatus> {
        match self {
            SearchError::RepoNotFound { .. } | SearchError::RevisionNotFound { .. } => {
                Some(RepoStatus::MISSING)
            }
            SearchError::RepoCloning { .. } => Some(RepoStatus::CLONING),
            SearchError::DeadlineExceeded => Some(RepoStatus::TIMED_OUT),
            _ => None,
        }
    }
}

/// Errors collected from concurrently running children
#[derive(Debug, Default)]
pub struct Errors(Vec<SearchError>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: SearchError) {
        self.0.push(err);
    }

    /// The first error recorded, in completion order
    pub fn first(&self) -> Option<&SearchError> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop cancellation signals, keeping only real failures
    pub fn without_cancellations(self) -> Self {
        Self(self.0.into_iter().filter(|e| !e.is_cancellation()).collect())
    }

    /// Drop explicit cancels but keep expired deadlines
    pub fn without_canceled(self) -> Self {
        Self(self.0.into_iter().filter(|e| !e.is_canceled()).collect())
    }

    /// Collapse into one error, preferring real failures over cancellations
    pub fn into_error(self) -> Option<SearchError> {
        if self.0.iter().all(SearchError::is_cancellation) {
            return self.0.into_iter().next();
        }
        self.without_cancellations().into_result().err()
    }

    /// Collapse into a single result: no error, the only error, or all of them
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(SearchError::Multiple(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        Ok(())
    }
}

impl IntoIterator for Errors {
    type Item = SearchError;
    type IntoIter = std::vec::IntoIter<SearchError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_into_result() {
        assert!(Errors::new().into_result().is_ok());

        let mut one = Errors::new();
        one.push(SearchError::Backend("boom".to_string()));
        assert!(matches!(one.into_result(), Err(SearchError::Backend(_))));

        let mut many = Errors::new();
        many.push(SearchError::Backend("a".to_string()));
        many.push(SearchError::Backend("b".to_string()));
        match many.into_result() {
            Err(SearchError::Multiple(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors.first(), Some(SearchError::Backend(m)) if m == "a"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancellation_filtering() {
        let mut errors = Errors::new();
        errors.push(SearchError::Canceled);
        errors.push(SearchError::Backend("real".to_string()));
        errors.push(SearchError::DeadlineExceeded);

        let real = errors.without_cancellations();
        assert_eq!(real.len(), 1);
        assert!(!real.first().unwrap().is_cancellation());
    }

    #[test]
    fn test_deadline_survives_cancel_filter() {
        let mut errors = Errors::new();
        errors.push(SearchError::Canceled);
        errors.push(SearchError::DeadlineExceeded);
        errors.push(SearchError::Canceled);

        let kept = errors.without_canceled();
        assert_eq!(kept.len(), 1);
        assert!(matches!(kept.into_error(), Some(SearchError::DeadlineExceeded)));

        let mut canceled = Errors::new();
        canceled.push(SearchError::Canceled);
        assert!(canceled.without_canceled().into_error().is_none());

        let both = SearchError::Multiple(Errors(vec![
            SearchError::DeadlineExceeded,
            SearchError::DeadlineExceeded,
        ]));
        assert!(both.is_deadline_exceeded());
        assert!(!both.is_canceled());
        assert!(!SearchError::Canceled.is_deadline_exceeded());
    }

    #[test]
    fn test_into_error_prefers_real_failures() {
        assert!(Errors::new().into_error().is_none());

        let mut canceled = Errors::new();
        canceled.push(SearchError::DeadlineExceeded);
        canceled.push(SearchError::Canceled);
        assert!(matches!(canceled.into_error(), Some(SearchError::DeadlineExceeded)));

        let mut mixed = Errors::new();
        mixed.push(SearchError::Canceled);
        mixed.push(SearchError::StructuralNonDefaultBranch);
        assert!(matches!(mixed.into_error(), Some(SearchError::StructuralNonDefaultBranch)));
    }

    #[test]
    fn test_repo_status_downgrade() {
        let err = SearchError::RevisionNotFound {
            repo: "a".to_string(),
            rev: "v9".to_string(),
        };
        assert_eq!(err.repo_status(), Some(RepoStatus::MISSING));
        assert_eq!(SearchError::Canceled.repo_status(), None);
    }
}
