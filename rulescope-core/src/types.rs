use crate::error::{Result, RulescopeError};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ===== STATUS TYPES =====

/// Whether a rule file is referenced by the active include list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Enabled,
    Disabled,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Enabled => "enabled",
            RuleStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status selector accepted by the file and rule listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    Enabled,
    Disabled,
    #[default]
    All,
}

impl StatusFilter {
    /// Maps an optional caller-supplied status onto a filter; `None` means all.
    pub fn parse_optional(status: Option<&str>) -> Result<Self> {
        status.map_or(Ok(StatusFilter::All), str::parse)
    }
}

impl FromStr for StatusFilter {
    type Err = RulescopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enabled" => Ok(StatusFilter::Enabled),
            "disabled" => Ok(StatusFilter::Disabled),
            "all" => Ok(StatusFilter::All),
            other => Err(RulescopeError::InvalidStatus(other.to_string())),
        }
    }
}

// ===== RULE RECORD BUILDING BLOCKS =====

/// Insertion-ordered set of tags.
///
/// Values are trimmed before insertion; empty values and exact (case-sensitive)
/// duplicates are skipped, so the first-seen order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    items: Vec<String>,
    index: HashSet<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the value was newly added.
    pub fn insert(&mut self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || self.index.contains(value) {
            return false;
        }
        self.index.insert(value.to_string());
        self.items.push(value.to_string());
        true
    }

    pub fn extend<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for value in values {
            self.insert(value);
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.index.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

/// Value of a rule detail: a scalar until the same key is seen again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DetailValue {
    Scalar(String),
    List(Vec<String>),
}

impl DetailValue {
    /// Adds another occurrence, promoting a scalar to a list on the second one.
    pub fn push(&mut self, value: String) {
        match self {
            DetailValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = DetailValue::List(vec![first, value]);
            }
            DetailValue::List(values) => values.push(value),
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            DetailValue::Scalar(value) => std::slice::from_ref(value),
            DetailValue::List(values) => values,
        }
    }
}

// ===== RULE RECORD =====

/// One detection rule parsed from a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRecord {
    /// Base name of the file the rule was parsed from
    pub file: String,
    pub id: i64,
    pub level: i64,
    /// Concatenation of every description child of the rule
    pub description: String,
    /// Inherited from the owning file at parse time
    pub status: RuleStatus,
    pub groups: TagSet,
    /// Compliance requirements, with the reserved prefix removed
    pub compliance: TagSet,
    /// Keyed in first-encounter order
    pub details: IndexMap<String, DetailValue>,
}

impl RuleRecord {
    pub fn new(file: impl Into<String>, id: i64, level: i64, status: RuleStatus) -> Self {
        Self {
            file: file.into(),
            id,
            level,
            description: String::new(),
            status,
            groups: TagSet::new(),
            compliance: TagSet::new(),
            details: IndexMap::new(),
        }
    }

    /// Records a detail; repeated keys collapse into a list in encounter order.
    pub fn add_detail(&mut self, key: &str, value: String) {
        match self.details.get_mut(key) {
            Some(existing) => existing.push(value),
            None => {
                self.details
                    .insert(key.to_string(), DetailValue::Scalar(value));
            }
        }
    }

    /// Rules are ordered by id.
    pub fn cmp_by_id(&self, other: &RuleRecord) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// A rule-definition file together with its resolved status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFile {
    pub name: String,
    pub status: RuleStatus,
}

impl RuleFile {
    pub fn new(name: impl Into<String>, status: RuleStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// One page of a listing plus the number of matches before pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    #[serde(rename = "totalItems")]
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_trims_and_skips_blanks_and_duplicates() {
        let mut tags = TagSet::new();
        tags.extend(["syslog", " errors ", "", "   ", "syslog", "Syslog"]);
        assert_eq!(tags.as_slice(), ["syslog", "errors", "Syslog"]);
        assert!(tags.contains("errors"));
        assert!(!tags.contains(" errors "));
    }

    #[test]
    fn detail_promotes_to_list_on_repeat() {
        let mut rule = RuleRecord::new("0020_syslog_rules.xml", 1002, 2, RuleStatus::Enabled);
        rule.add_detail("match", "a".to_string());
        assert_eq!(rule.details["match"], DetailValue::Scalar("a".to_string()));

        rule.add_detail("match", "b".to_string());
        rule.add_detail("match", "c".to_string());
        assert_eq!(
            rule.details["match"],
            DetailValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!("enabled".parse::<StatusFilter>().unwrap(), StatusFilter::Enabled);
        assert_eq!(StatusFilter::parse_optional(None).unwrap(), StatusFilter::All);
        let err = "Enabled".parse::<StatusFilter>().unwrap_err();
        assert!(matches!(err, RulescopeError::InvalidStatus(s) if s == "Enabled"));
    }

    #[test]
    fn rules_order_by_id() {
        let low = RuleRecord::new("a", 10, 7, RuleStatus::Enabled);
        let high = RuleRecord::new("b", 20, 1, RuleStatus::Disabled);
        assert_eq!(low.cmp_by_id(&high), Ordering::Less);
        assert_eq!(high.cmp_by_id(&low), Ordering::Greater);
    }

    #[test]
    fn rule_serializes_tags_as_arrays() {
        let mut rule = RuleRecord::new("x_rules.xml", 1, 3, RuleStatus::Disabled);
        rule.groups.insert("web");
        rule.add_detail("noalert", "1".to_string());
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["groups"], serde_json::json!(["web"]));
        assert_eq!(json["status"], "disabled");
        assert_eq!(json["details"]["noalert"], "1");
    }

    #[test]
    fn details_keep_encounter_order() {
        let mut rule = RuleRecord::new("x_rules.xml", 1, 3, RuleStatus::Enabled);
        rule.add_detail("if_sid", "5700".to_string());
        rule.add_detail("match", "^failed".to_string());
        rule.add_detail("field", "a".to_string());
        rule.add_detail("match", "^denied".to_string());

        let keys: Vec<_> = rule.details.keys().map(String::as_str).collect();
        assert_eq!(keys, ["if_sid", "match", "field"]);

        let json = serde_json::to_string(&rule.details).unwrap();
        assert_eq!(
            json,
            r#"{"if_sid":"5700","match":["^failed","^denied"],"field":"a"}"#
        );
    }
}
