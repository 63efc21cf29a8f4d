//! File Status Resolver
//!
//! Classifies every rule-definition file as enabled (named by the include
//! list) or disabled (present in the rules directory but not included).

use crate::config::IncludeSource;
use crate::error::Result;
use crate::listing::{self, ListOptions};
use crate::types::{Paginated, RuleFile, RuleStatus, StatusFilter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct RuleFileResolver<S> {
    source: S,
    rules_dir: PathBuf,
    suffix: String,
}

impl<S: IncludeSource> RuleFileResolver<S> {
    pub fn new(source: S, rules_dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            source,
            rules_dir: rules_dir.into(),
            suffix: suffix.into(),
        }
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Lists rule files with their status, then searches, sorts and paginates.
    ///
    /// Default sort is by name ascending.
    pub fn list(&self, status: StatusFilter, options: &ListOptions) -> Result<Paginated<RuleFile>> {
        let files = self.resolve(status)?;
        listing::apply(files, options)
    }

    /// Resolves the unsorted file set for `status`: disabled files first, in
    /// path order, followed by the included files in configuration order.
    pub fn resolve(&self, status: StatusFilter) -> Result<Vec<RuleFile>> {
        let enabled = self.source.included_rule_files()?;

        if status == StatusFilter::Enabled {
            return Ok(enabled
                .into_iter()
                .map(|name| RuleFile::new(name, RuleStatus::Enabled))
                .collect());
        }

        let mut files: Vec<RuleFile> = self
            .files_on_disk()?
            .into_iter()
            .filter(|name| !enabled.contains(name))
            .map(|name| RuleFile::new(name, RuleStatus::Disabled))
            .collect();

        debug!(
            dir = %self.rules_dir.display(),
            enabled = enabled.len(),
            disabled = files.len(),
            "resolved rule file status"
        );

        if status == StatusFilter::All {
            files.extend(
                enabled
                    .into_iter()
                    .map(|name| RuleFile::new(name, RuleStatus::Enabled)),
            );
        }

        Ok(files)
    }

    /// Base names of every `*<suffix>` file in the rules directory, sorted by
    /// full path. A missing directory holds no files.
    fn files_on_disk(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.rules_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.rules_dir.display(), "rules directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let matches_suffix = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(self.suffix.as_str()));
            if matches_suffix && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .map(str::to_string)
            .collect())
    }
}
