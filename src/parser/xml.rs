//! Tagged-field parser for XML-style model outputs.
//!
//! Fields are declared in order, each with one or more allowed tag names
//! (the first is canonical and used when formatting). Extraction takes the
//! first non-greedy match per tag, with `.` matching newlines, so multi-line
//! field bodies work.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;

/// A declared field with its compiled per-alternative tag patterns.
#[derive(Debug, Clone)]
pub(crate) struct CompiledField {
    canonical: String,
    alternatives: Vec<String>,
    patterns: Vec<Regex>,
}

impl CompiledField {
    fn new(alternatives: &[&str]) -> Result<Self> {
        if alternatives.is_empty() {
            anyhow::bail!("field array cannot be empty");
        }
        let patterns = alternatives
            .iter()
            .map(|alt| {
                let tag = regex::escape(alt);
                Regex::new(&format!(r"(?s)<{tag}>\s*(.*?)\s*</{tag}>"))
                    .context("failed to compile regex")
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            canonical: alternatives[0].to_string(),
            alternatives: alternatives.iter().map(|s| s.to_string()).collect(),
            patterns,
        })
    }

    pub(crate) fn canonical(&self) -> &str {
        &self.canonical
    }

    pub(crate) fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Capture the first match of every alternative tag into `out`, keyed by
    /// the alternative name that matched.
    pub(crate) fn capture_into(&self, text: &str, strip: bool, out: &mut HashMap<String, String>) {
        for (alt, pattern) in self.alternatives.iter().zip(&self.patterns) {
            if let Some(captures) = pattern.captures(text) {
                let content = &captures[1];
                let content = if strip { content.trim() } else { content };
                out.insert(alt.clone(), content.to_string());
            }
        }
    }
}

/// Compile field declarations, rejecting empty sets and duplicate names.
pub(crate) fn compile_fields(fields: &[&[&str]]) -> Result<Vec<CompiledField>> {
    let mut compiled = Vec::with_capacity(fields.len());
    let mut seen = HashSet::new();
    for alternatives in fields {
        let field = CompiledField::new(alternatives)?;
        if !seen.insert(field.canonical.clone()) {
            anyhow::bail!("duplicate field name: {}", field.canonical);
        }
        compiled.push(field);
    }
    Ok(compiled)
}

/// Render the format template shown to models: one `<tag>\n...\n</tag>` block
/// per field, with alternative sets shown as `<[ a | b ]>`.
pub(crate) fn render_format_str(fields: &[CompiledField]) -> String {
    fields
        .iter()
        .map(|field| {
            if field.alternatives.len() > 1 {
                let options = field.alternatives.join(" | ");
                format!("<[ {options} ]>\n...\n</[ {options} ]>")
            } else {
                format!("<{0}>\n...\n</{0}>", field.canonical)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracted field contents, keyed by the tag name that actually matched.
///
/// A declared field whose tags never appear is absent, which is distinct
/// from a tag that matched with empty content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields(HashMap<String, String>);

impl ParsedFields {
    pub(crate) fn from_map(fields: HashMap<String, String>) -> Self {
        Self(fields)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parser for responses structured with XML-style tags.
#[derive(Debug, Clone)]
pub struct XmlParser {
    fields: Vec<CompiledField>,
    answer_field: String,
}

impl XmlParser {
    /// Create a parser from ordered field declarations.
    ///
    /// Each inner slice lists the allowed tag names for one field; the first
    /// name is canonical. An empty `answer_field` defaults to `"answer"`.
    pub fn new(fields: &[&[&str]], answer_field: &str) -> Result<Self> {
        let answer_field = if answer_field.is_empty() {
            "answer"
        } else {
            answer_field
        };
        Ok(Self {
            fields: compile_fields(fields)?,
            answer_field: answer_field.to_string(),
        })
    }

    /// The tag name `parse` extracts as the final answer.
    pub fn answer_field(&self) -> &str {
        &self.answer_field
    }

    /// Extract the answer field's content, or empty if it never matched.
    pub fn parse(&self, response: &str) -> String {
        self.parse_fields(response, true)
            .get(&self.answer_field)
            .unwrap_or_default()
            .to_string()
    }

    /// Extract every declared field, optionally trimming field bodies.
    pub fn parse_fields(&self, text: &str, strip: bool) -> ParsedFields {
        let mut out = HashMap::new();
        for field in &self.fields {
            field.capture_into(text, strip, &mut out);
        }
        ParsedFields(out)
    }

    /// A human-readable template of the expected format.
    pub fn format_str(&self) -> String {
        render_format_str(&self.fields)
    }

    /// Render `values` as tagged text in declared field order.
    ///
    /// Values may be supplied under a field's canonical name or any
    /// alternative; output always uses canonical tags. Fails if any declared
    /// field has no value.
    pub fn format(&self, values: &HashMap<String, String>) -> Result<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = values.get(&field.canonical).or_else(|| {
                field
                    .alternatives
                    .iter()
                    .find_map(|alt| values.get(alt))
            });
            let Some(value) = value else {
                anyhow::bail!(
                    "missing value for field '{}' (allowed: {:?})",
                    field.canonical,
                    field.alternatives
                );
            };
            parts.push(format!("<{0}>\n{1}\n</{0}>", field.canonical, value));
        }
        Ok(parts.join("\n"))
    }

    /// Canonical field names, in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.canonical()).collect()
    }

    /// Whether `name` is a declared canonical or alternative tag name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.canonical == name || f.alternatives.iter().any(|alt| alt == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_think_answer() {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer").unwrap();
        let response = "<think>\nLet me calculate 2 + 2.\n2 + 2 = 4\n</think>\n<answer>\n4\n</answer>";
        assert_eq!(parser.parse(response), "4");
    }

    #[test]
    fn test_parse_with_alternatives() {
        let parser =
            XmlParser::new(&[&["reasoning"], &["solution", "answer"]], "answer").unwrap();
        let response = "<reasoning>\nThe answer is 42.\n</reasoning>\n<answer>\n42\n</answer>";
        assert_eq!(parser.parse(response), "42");
    }

    #[test]
    fn test_parse_missing_answer_is_empty() {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer").unwrap();
        assert_eq!(parser.parse("<think>\nthinking only\n</think>"), "");
    }

    #[test]
    fn test_custom_answer_field() {
        let parser = XmlParser::new(&[&["code"], &["output"]], "output").unwrap();
        let response = "<code>\nprint(10)\n</code>\n<output>\nResult: 10\n</output>";
        assert_eq!(parser.parse(response), "Result: 10");
    }

    #[test]
    fn test_fields_keyed_by_matched_alternative() {
        // The answer field only fills from a tag literally named "answer".
        let parser =
            XmlParser::new(&[&["solution", "answer", "result"]], "answer").unwrap();
        assert_eq!(parser.parse("<solution>42</solution>"), "");
        assert_eq!(parser.parse("<answer>42</answer>"), "42");
        assert_eq!(parser.parse("<result>42</result>"), "");

        let fields = parser.parse_fields("<solution>42</solution>", true);
        assert_eq!(fields.get("solution"), Some("42"));
        assert!(!fields.contains("answer"));
    }

    #[test]
    fn test_parse_fields_both_tags() {
        let parser = XmlParser::new(&[&["think"], &["tool", "answer"]], "answer").unwrap();
        let response = "<think>\nusing a tool\n</think>\n<tool>\n{\"name\": \"calc\"}\n</tool>";
        let fields = parser.parse_fields(response, true);
        assert_eq!(fields.get("think"), Some("using a tool"));
        assert_eq!(fields.get("tool"), Some("{\"name\": \"calc\"}"));
        assert!(!fields.contains("answer"));
    }

    #[test]
    fn test_first_match_wins() {
        let parser = XmlParser::new(&[&["answer"]], "answer").unwrap();
        let response = "<answer>first</answer>\n<answer>second</answer>";
        assert_eq!(parser.parse(response), "first");
    }

    #[test]
    fn test_format_roundtrip() {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer").unwrap();
        let mut values = HashMap::new();
        values.insert("think".to_string(), "some reasoning".to_string());
        values.insert("answer".to_string(), "42".to_string());
        let formatted = parser.format(&values).unwrap();
        assert_eq!(
            formatted,
            "<think>\nsome reasoning\n</think>\n<answer>\n42\n</answer>"
        );
        assert_eq!(parser.parse(&formatted), "42");
    }

    #[test]
    fn test_format_missing_field() {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer").unwrap();
        let mut values = HashMap::new();
        values.insert("think".to_string(), "only thinking".to_string());
        let err = parser.format(&values).unwrap_err();
        assert!(err.to_string().contains("missing value for field 'answer'"));
    }

    #[test]
    fn test_format_str_rendering() {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer").unwrap();
        assert_eq!(
            parser.format_str(),
            "<think>\n...\n</think>\n<answer>\n...\n</answer>"
        );

        let parser =
            XmlParser::new(&[&["code", "solution", "answer"]], "answer").unwrap();
        assert_eq!(
            parser.format_str(),
            "<[ code | solution | answer ]>\n...\n</[ code | solution | answer ]>"
        );
    }

    #[test]
    fn test_constructor_rejects_bad_declarations() {
        let err = XmlParser::new(&[&[]], "answer").unwrap_err();
        assert!(err.to_string().contains("field array cannot be empty"));

        let err = XmlParser::new(&[&["think"], &["think"]], "answer").unwrap_err();
        assert!(err.to_string().contains("duplicate field name: think"));
    }

    #[test]
    fn test_empty_answer_field_defaults() {
        let parser = XmlParser::new(&[&["answer"]], "").unwrap();
        assert_eq!(parser.answer_field(), "answer");
    }

    #[test]
    fn test_has_field_and_names() {
        let parser = XmlParser::new(&[&["think"], &["tool", "answer"]], "answer").unwrap();
        assert_eq!(parser.field_names(), vec!["think", "tool"]);
        assert!(parser.has_field("think"));
        assert!(parser.has_field("answer"));
        assert!(!parser.has_field("result"));
    }
}
