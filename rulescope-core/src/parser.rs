//! Rule File Parser
//!
//! Parses one rule-definition file into [`RuleRecord`]s. Rule files are XML
//! fragments: several top-level `<group>` blocks, each holding `<rule>`
//! elements. Two dialect quirks are handled before the markup reaches
//! quick-xml:
//! - the literal token ` -- ` may appear in free text (and in comments, where
//!   XML forbids it), so it is rewritten to a placeholder
//! - the fragment gets a synthetic root element so it parses as one document
//!
//! Parsing is all-or-nothing per file: any failure rejects the whole file
//! with a [`RulescopeError::ParseFailure`] naming it.

use crate::error::{Result, RulescopeError};
use crate::types::{RuleRecord, RuleStatus};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;
use tracing::debug;

const COMMENT_TOKEN: &str = " -- ";
const COMMENT_TOKEN_PLACEHOLDER: &str = " -INVALID_CHAR ";
const SYNTHETIC_ROOT: &str = "root_tag";

/// Rewrites dialect quirks so the file parses as a single XML document.
pub fn preprocess(raw: &str) -> String {
    let escaped = raw.replace(COMMENT_TOKEN, COMMENT_TOKEN_PLACEHOLDER);
    let mut wrapped = String::with_capacity(escaped.len() + 2 * SYNTHETIC_ROOT.len() + 5);
    wrapped.push('<');
    wrapped.push_str(SYNTHETIC_ROOT);
    wrapped.push('>');
    wrapped.push_str(&escaped);
    wrapped.push_str("</");
    wrapped.push_str(SYNTHETIC_ROOT);
    wrapped.push('>');
    wrapped
}

#[derive(Debug, Clone)]
pub struct RuleFileParser {
    compliance_prefix: String,
}

impl Default for RuleFileParser {
    fn default() -> Self {
        Self::new("pci_dss_")
    }
}

impl RuleFileParser {
    pub fn new(compliance_prefix: impl Into<String>) -> Self {
        Self {
            compliance_prefix: compliance_prefix.into(),
        }
    }

    /// Reads `<rules_dir>/<file_name>` and parses it.
    ///
    /// Read errors are reported as parse failures of that file.
    pub fn load(&self, rules_dir: &Path, file_name: &str, status: RuleStatus) -> Result<Vec<RuleRecord>> {
        let content = fs::read_to_string(rules_dir.join(file_name))
            .map_err(|e| RulescopeError::parse_failure(file_name, e))?;
        self.parse(file_name, &content, status)
    }

    /// Parses the raw contents of one rule file.
    pub fn parse(&self, file_name: &str, content: &str, status: RuleStatus) -> Result<Vec<RuleRecord>> {
        let rules = self
            .parse_rules(file_name, content, status)
            .map_err(|cause| RulescopeError::parse_failure(file_name, cause))?;
        debug!(file = file_name, rules = rules.len(), %status, "parsed rule file");
        Ok(rules)
    }

    fn parse_rules(
        &self,
        file_name: &str,
        content: &str,
        status: RuleStatus,
    ) -> std::result::Result<Vec<RuleRecord>, String> {
        let root = parse_document(&preprocess(content))?;
        let mut rules = Vec::new();

        for xml_group in root.children.iter().filter(|e| e.is_tag("group")) {
            let general_groups = xml_group.required_attribute("name")?;

            for xml_rule in xml_group.children.iter().filter(|e| e.is_tag("rule")) {
                rules.push(self.build_rule(file_name, xml_rule, general_groups, status)?);
            }
        }

        Ok(rules)
    }

    fn build_rule(
        &self,
        file_name: &str,
        xml_rule: &Element,
        general_groups: &str,
        status: RuleStatus,
    ) -> std::result::Result<RuleRecord, String> {
        let id = xml_rule.integer_attribute("id")?;
        let level = xml_rule.integer_attribute("level")?;
        let mut rule = RuleRecord::new(file_name, id, level, status);

        for (key, value) in &xml_rule.attributes {
            if key != "id" && key != "level" {
                rule.add_detail(key, value.clone());
            }
        }

        let mut groups: Vec<&str> = Vec::new();
        for child in &xml_rule.children {
            let tag = child.name.to_lowercase();
            let value = child.text.as_str();
            match tag.as_str() {
                "group" => groups.extend(value.split(',')),
                "description" => rule.description.push_str(value),
                "field" => {
                    let name = child.required_attribute("name")?;
                    rule.add_detail(name, value.to_string());
                }
                _ => rule.add_detail(&tag, value.to_string()),
            }
        }
        groups.extend(general_groups.split(','));

        for group in groups {
            if group.contains(self.compliance_prefix.as_str()) {
                let requirement: String = group
                    .trim()
                    .chars()
                    .skip(self.compliance_prefix.chars().count())
                    .collect();
                rule.compliance.insert(&requirement);
            } else {
                rule.groups.insert(group);
            }
        }

        Ok(rule)
    }
}

// ===== MINIMAL ELEMENT TREE =====

/// An element with its attributes, leading text and child elements.
///
/// `text` holds only the character data that precedes the first child.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| format!("invalid attribute on <{name}>: {e}"))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| format!("invalid value for attribute '{key}' on <{name}>: {e}"))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn is_tag(&self, tag: &str) -> bool {
        self.name.eq_ignore_ascii_case(tag)
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required_attribute(&self, key: &str) -> std::result::Result<&str, String> {
        self.attribute(key)
            .ok_or_else(|| format!("missing attribute '{key}' on <{}>", self.name))
    }

    fn integer_attribute(&self, key: &str) -> std::result::Result<i64, String> {
        let raw = self.required_attribute(key)?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid integer '{raw}' for attribute '{key}' on <{}>", self.name))
    }

    fn push_text(&mut self, text: &str) {
        if self.children.is_empty() {
            self.text.push_str(text);
        }
    }
}

/// Parses a complete XML document into its root element.
fn parse_document(xml: &str) -> std::result::Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{e} (at byte {})", reader.buffer_position()))?;
        match event {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "closing tag without matching opening tag".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| format!("invalid text: {e}"))?;
                match stack.last_mut() {
                    Some(current) => current.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside of the root element".to_string()),
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                if let Some(current) = stack.last_mut() {
                    current.push_text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Decl(_) => {
                return Err("XML declaration is only allowed at the start of a document".to_string())
            }
            Event::Eof => break,
            // Comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> std::result::Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(format!("unexpected second root element <{}>", element.name)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetailValue;

    fn parse(content: &str) -> Result<Vec<RuleRecord>> {
        RuleFileParser::default().parse("001_rules", content, RuleStatus::Enabled)
    }

    #[test]
    fn parses_documented_example() {
        let content = r#"
<group name="syslog,errors">
  <rule id="100" level="5">
    <group>pci_dss_10.6,attack</group>
    <description>Generic error</description>
  </rule>
</group>
"#;
        let rules = parse(content).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.id, 100);
        assert_eq!(rule.level, 5);
        assert_eq!(rule.groups.as_slice(), ["attack", "syslog", "errors"]);
        assert_eq!(rule.compliance.as_slice(), ["10.6"]);
        assert_eq!(rule.description, "Generic error");
        assert_eq!(rule.file, "001_rules");
        assert_eq!(rule.status, RuleStatus::Enabled);
    }

    #[test]
    fn repeated_fields_become_lists_in_order() {
        let content = r#"
<group name="windows,">
  <rule id="60100" level="3" noalert="1">
    <field name="win.system.eventID">4624</field>
    <field name="win.system.eventID">4625</field>
    <if_sid>60000</if_sid>
    <Match>^failed</Match>
  </rule>
</group>
"#;
        let rule = &parse(content).unwrap()[0];
        assert_eq!(
            rule.details["win.system.eventID"],
            DetailValue::List(vec!["4624".into(), "4625".into()])
        );
        assert_eq!(rule.details["noalert"], DetailValue::Scalar("1".into()));
        assert_eq!(rule.details["if_sid"], DetailValue::Scalar("60000".into()));
        assert_eq!(rule.details["match"], DetailValue::Scalar("^failed".into()));
        assert!(!rule.details.contains_key("id"));
        assert_eq!(rule.groups.as_slice(), ["windows"]);
    }

    #[test]
    fn description_segments_are_concatenated() {
        let content = r#"<group name="a"><rule id="1" level="0">
            <description>first </description><description/><description>second</description>
        </rule></group>"#;
        assert_eq!(parse(content).unwrap()[0].description, "first second");
    }

    #[test]
    fn comment_token_is_tolerated() {
        let content = r#"
<!-- Rules for the ssh daemon -- generic -->
<group name="sshd">
  <rule id="5700" level="0">
    <description>Message -- with a dash pair</description>
  </rule>
</group>
"#;
        let rule = &parse(content).unwrap()[0];
        assert_eq!(rule.description, "Message -INVALID_CHAR with a dash pair");
    }

    #[test]
    fn multiple_top_level_groups_and_other_elements() {
        let content = r#"
<var name="BAD_WORDS">error|fail</var>
<group name="one"><rule id="1" level="1"/></group>
<group name="two"><rule id="2" level="2"/><if_sid>5</if_sid></group>
"#;
        let rules = parse(content).unwrap();
        let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, [1, 2]);
        assert_eq!(rules[1].groups.as_slice(), ["two"]);
    }

    #[test]
    fn compliance_groups_never_land_in_groups() {
        let content = r#"<group name="pci_dss_1.2, web"><rule id="3" level="4">
            <group> pci_dss_10.2.4,pci_dss_10.2.4,authentication_failed,</group>
        </rule></group>"#;
        let rule = &parse(content).unwrap()[0];
        assert_eq!(rule.compliance.as_slice(), ["10.2.4", "1.2"]);
        assert_eq!(rule.groups.as_slice(), ["authentication_failed", "web"]);
    }

    #[test]
    fn custom_compliance_prefix() {
        let parser = RuleFileParser::new("gdpr_");
        let content = r#"<group name="gdpr_IV_35.7.d,pci_dss_1"><rule id="9" level="1"/></group>"#;
        let rule = &parser.parse("f", content, RuleStatus::Disabled).unwrap()[0];
        assert_eq!(rule.compliance.as_slice(), ["IV_35.7.d"]);
        assert_eq!(rule.groups.as_slice(), ["pci_dss_1"]);
        assert_eq!(rule.status, RuleStatus::Disabled);
    }

    #[test]
    fn missing_level_fails_whole_file() {
        let content = r#"<group name="a">
            <rule id="1" level="3"/>
            <rule id="2"/>
        </group>"#;
        let err = parse(content).unwrap_err();
        match err {
            RulescopeError::ParseFailure { file, cause } => {
                assert_eq!(file, "001_rules");
                assert!(cause.contains("level"), "cause: {cause}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_integer_id_fails() {
        let content = r#"<group name="a"><rule id="abc" level="3"/></group>"#;
        assert!(matches!(parse(content), Err(RulescopeError::ParseFailure { .. })));
    }

    #[test]
    fn missing_group_name_fails() {
        let content = r#"<group><rule id="1" level="3"/></group>"#;
        assert!(matches!(parse(content), Err(RulescopeError::ParseFailure { .. })));
    }

    #[test]
    fn malformed_markup_fails() {
        let content = r#"<group name="a"><rule id="1" level="3"></group>"#;
        assert!(matches!(parse(content), Err(RulescopeError::ParseFailure { .. })));
    }

    #[test]
    fn xml_declaration_is_rejected() {
        let content = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<group name=\"a\"><rule id=\"1\" level=\"3\"/></group>";
        let err = parse(content).unwrap_err();
        assert!(
            matches!(err, RulescopeError::ParseFailure { ref cause, .. } if cause.contains("declaration")),
            "got {err:?}"
        );
    }

    #[test]
    fn entities_are_unescaped() {
        let content = r#"<group name="a"><rule id="1" level="3" note="a&amp;b">
            <regex>^\d+ &lt;root&gt;</regex>
        </rule></group>"#;
        let rule = &parse(content).unwrap()[0];
        assert_eq!(rule.details["note"], DetailValue::Scalar("a&b".into()));
        assert_eq!(rule.details["regex"], DetailValue::Scalar(r"^\d+ <root>".into()));
    }

    #[test]
    fn preprocess_wraps_fragment() {
        assert_eq!(
            preprocess("<a> -- </a>"),
            "<root_tag><a> -INVALID_CHAR </a></root_tag>"
        );
    }
}
