//! Query Engine
//!
//! Every call resolves the file set, re-reads and re-parses each file from
//! disk, then filters, searches, sorts and paginates the merged rules. Nothing
//! is cached between calls, so concurrent calls never share state.

use crate::config::{IncludeSource, RulescopeConfig};
use crate::error::{Result, RulescopeError};
use crate::listing::{self, ListOptions};
use crate::parser::RuleFileParser;
use crate::resolver::RuleFileResolver;
use crate::types::{Paginated, RuleFile, RuleRecord, StatusFilter, TagSet};
use std::str::FromStr;
use tracing::info;

/// Level constraint: one exact level or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFilter {
    Exact(i64),
    Range(i64, i64),
}

impl LevelFilter {
    pub fn matches(&self, level: i64) -> bool {
        match *self {
            LevelFilter::Exact(expected) => level == expected,
            LevelFilter::Range(low, high) => low <= level && level <= high,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = RulescopeError;

    /// Accepts `"N"` or `"LOW-HIGH"`. An empty string, more than two parts or a
    /// non-integer part is rejected.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RulescopeError::InvalidLevelRange(s.to_string());
        let parse_part = |part: &str| part.trim().parse::<i64>().map_err(|_| invalid());

        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [level] => Ok(LevelFilter::Exact(parse_part(level)?)),
            [low, high] => Ok(LevelFilter::Range(parse_part(low)?, parse_part(high)?)),
            _ => Err(invalid()),
        }
    }
}

/// Field filters for [`RuleCatalog::rules`]; every supplied filter must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub status: StatusFilter,
    pub group: Option<String>,
    pub compliance: Option<String>,
    pub file: Option<String>,
    pub id: Option<i64>,
    pub level: Option<LevelFilter>,
}

impl RuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn compliance(mut self, requirement: impl Into<String>) -> Self {
        self.compliance = Some(requirement.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Parses and sets the level filter (`"5"` or `"4-6"`).
    pub fn level(mut self, level: &str) -> Result<Self> {
        self.level = Some(level.parse()?);
        Ok(self)
    }

    pub fn matches(&self, rule: &RuleRecord) -> bool {
        self.group.as_deref().map_or(true, |g| rule.groups.contains(g))
            && self
                .compliance
                .as_deref()
                .map_or(true, |c| rule.compliance.contains(c))
            && self.file.as_deref().map_or(true, |f| rule.file == f)
            && self.id.map_or(true, |id| rule.id == id)
            && self.level.map_or(true, |level| level.matches(rule.level))
    }
}

/// Read-only catalog over the rule files of one rules directory.
pub struct RuleCatalog<S> {
    resolver: RuleFileResolver<S>,
    parser: RuleFileParser,
}

impl RuleCatalog<RulescopeConfig> {
    /// Builds a catalog whose include list comes from the config itself.
    pub fn from_config(config: RulescopeConfig) -> Self {
        let rules_path = config.rules_path.clone();
        let suffix = config.rule_file_suffix.clone();
        let parser = RuleFileParser::new(config.compliance_prefix.clone());
        Self::new(RuleFileResolver::new(config, rules_path, suffix), parser)
    }
}

impl<S: IncludeSource> RuleCatalog<S> {
    pub fn new(resolver: RuleFileResolver<S>, parser: RuleFileParser) -> Self {
        Self { resolver, parser }
    }

    /// Rule files with their status.
    pub fn rule_files(&self, status: StatusFilter, options: &ListOptions) -> Result<Paginated<RuleFile>> {
        self.resolver.list(status, options)
    }

    /// Rules matching `filter`, searched, sorted (default: id ascending) and
    /// paginated.
    pub fn rules(&self, filter: &RuleFilter, options: &ListOptions) -> Result<Paginated<RuleRecord>> {
        let all_rules = self.load_rules(filter.status)?;
        let loaded = all_rules.len();

        let rules: Vec<RuleRecord> = all_rules
            .into_iter()
            .filter(|rule| filter.matches(rule))
            .collect();

        let page = listing::apply(rules, options)?;
        info!(
            loaded,
            matched = page.total_items,
            returned = page.items.len(),
            "rule query complete"
        );
        Ok(page)
    }

    /// Distinct groups used by any rule, enabled or disabled.
    pub fn groups(&self, options: &ListOptions) -> Result<Paginated<String>> {
        self.tag_universe(options, |rule| &rule.groups)
    }

    /// Distinct compliance requirements used by any rule.
    pub fn compliance_tags(&self, options: &ListOptions) -> Result<Paginated<String>> {
        self.tag_universe(options, |rule| &rule.compliance)
    }

    fn tag_universe<F>(&self, options: &ListOptions, tags_of: F) -> Result<Paginated<String>>
    where
        F: Fn(&RuleRecord) -> &TagSet,
    {
        let rules = self.rules(&RuleFilter::default(), &ListOptions::unpaginated())?;

        let mut universe = TagSet::new();
        for rule in &rules.items {
            universe.extend(tags_of(rule).iter());
        }

        Ok(listing::apply_values(universe.as_slice().to_vec(), options))
    }

    /// Parses every file selected by `status` in file name order; the first
    /// failure aborts.
    fn load_rules(&self, status: StatusFilter) -> Result<Vec<RuleRecord>> {
        let files = self.resolver.list(status, &ListOptions::unpaginated())?;

        let mut rules = Vec::new();
        for rule_file in files.items {
            rules.extend(
                self.parser
                    .load(self.resolver.rules_dir(), &rule_file.name, rule_file.status)?,
            );
        }
        Ok(rules)
    }
}
