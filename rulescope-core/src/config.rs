use crate::error::{Result, RulescopeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

// Default value functions for serde
fn default_rules_path() -> PathBuf {
    PathBuf::from("/var/ossec/ruleset/rules")
}

fn default_rule_file_suffix() -> String {
    "_rules.xml".to_string()
}

fn default_compliance_prefix() -> String {
    "pci_dss_".to_string()
}

fn default_limit() -> usize {
    500
}

/// Supplies the names of the rule files the manager has switched on.
pub trait IncludeSource {
    /// The configured include list, in configuration order.
    ///
    /// A missing include section is a configuration error, never an empty list.
    fn included_rule_files(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulescopeConfig {
    /// Directory holding the rule-definition files
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    /// File name suffix that marks a rule-definition file
    #[serde(default = "default_rule_file_suffix")]
    pub rule_file_suffix: String,
    /// Group prefix that marks a compliance requirement
    #[serde(default = "default_compliance_prefix")]
    pub compliance_prefix: String,
    /// Page size used when a caller asks for no explicit limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Active rule files, as listed in the manager configuration
    #[serde(default)]
    pub rules: Option<RulesSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesSection {
    #[serde(default)]
    pub include: Option<Vec<String>>,
}

impl RulesSection {
    pub fn with_includes<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(include.into_iter().map(Into::into).collect()),
        }
    }
}

impl RulescopeConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| RulescopeError::ConfigLoad {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            RulescopeError::ConfigLoad { cause, .. } => RulescopeError::ConfigLoad {
                path: path.display().to_string(),
                cause,
            },
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| RulescopeError::ConfigLoad {
            path: "<inline>".to_string(),
            cause: e.to_string(),
        })
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn with_rules_path(mut self, rules_path: impl Into<PathBuf>) -> Self {
        self.rules_path = rules_path.into();
        self
    }

    pub fn with_includes<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules = Some(RulesSection::with_includes(include));
        self
    }
}

impl Default for RulescopeConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            rule_file_suffix: default_rule_file_suffix(),
            compliance_prefix: default_compliance_prefix(),
            default_limit: default_limit(),
            rules: None,
        }
    }
}

impl IncludeSource for RulescopeConfig {
    fn included_rule_files(&self) -> Result<Vec<String>> {
        self.rules
            .as_ref()
            .and_then(|rules| rules.include.clone())
            .ok_or(RulescopeError::ConfigurationMissing)
    }
}

impl<T: IncludeSource + ?Sized> IncludeSource for &T {
    fn included_rule_files(&self) -> Result<Vec<String>> {
        (**self).included_rule_files()
    }
}
