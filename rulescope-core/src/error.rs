//! Error types shared by the resolver, parser and query engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulescopeError {
    /// The rule-file include list is absent from the configuration
    #[error("rules configuration missing: no `rules.include` section found")]
    ConfigurationMissing,

    /// A rule file could not be read or parsed; the whole file is rejected
    #[error("error parsing rule file {file}: {cause}")]
    ParseFailure { file: String, cause: String },

    #[error("invalid status '{0}': expected enabled, disabled or all")]
    InvalidStatus(String),

    #[error("invalid level filter '{0}': expected 'N' or 'LOW-HIGH'")]
    InvalidLevelRange(String),

    #[error("invalid sort order '{0}': expected asc or desc")]
    InvalidSortOrder(String),

    #[error("invalid sort field '{field}': allowed fields are {allowed}")]
    InvalidSortField { field: String, allowed: String },

    #[error("failed to load configuration from {path}: {cause}")]
    ConfigLoad { path: String, cause: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RulescopeError {
    pub fn parse_failure(file: impl Into<String>, cause: impl ToString) -> Self {
        Self::ParseFailure {
            file: file.into(),
            cause: cause.to_string(),
        }
    }

    /// Stable numeric code reported alongside the message.
    pub fn code(&self) -> u32 {
        match self {
            Self::ConfigurationMissing => 1200,
            Self::ParseFailure { .. } => 1201,
            Self::InvalidStatus(_) => 1202,
            Self::InvalidLevelRange(_) => 1203,
            Self::InvalidSortOrder(_) => 1402,
            Self::InvalidSortField { .. } => 1403,
            Self::ConfigLoad { .. } => 1101,
            Self::Io(_) => 1000,
        }
    }

    /// True for errors caused by a bad caller-supplied parameter.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus(_)
                | Self::InvalidLevelRange(_)
                | Self::InvalidSortOrder(_)
                | Self::InvalidSortField { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RulescopeError>;
