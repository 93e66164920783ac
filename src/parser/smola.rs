//! Tagged-field parser with tool-call support, after the SmolaAgents format.
//!
//! Extraction works like [`XmlParser`](super::XmlParser), with two additions:
//! the content of a `tool` tag is decoded as a JSON object when possible, and
//! `parse` returns the *last* declared field (the final answer slot) rather
//! than a named answer field.

use anyhow::Result;
use serde_json::{Map, Value};

use super::xml::{compile_fields, render_format_str, CompiledField, ParsedFields};

/// Result of structured Smola parsing.
#[derive(Debug, Clone, Default)]
pub struct ParsedSmola {
    /// Extracted field contents, keyed by the tag name that matched.
    pub fields: ParsedFields,
    /// The decoded `tool` field, when present and valid JSON.
    pub tool_json: Option<Map<String, Value>>,
}

/// Parser for SmolaAgents-style tool conversations.
#[derive(Debug, Clone)]
pub struct SmolaParser {
    fields: Vec<CompiledField>,
}

impl SmolaParser {
    /// Create a parser from ordered field declarations; the first name in
    /// each inner slice is canonical.
    pub fn new(fields: &[&[&str]]) -> Result<Self> {
        Ok(Self {
            fields: compile_fields(fields)?,
        })
    }

    /// Extract the last declared field's content (the answer slot).
    ///
    /// Alternatives are checked in declaration order; the first non-empty
    /// match wins. Empty if the last field never matched.
    pub fn parse(&self, response: &str) -> String {
        let parsed = self.parse_structured(response, true);
        self.last_field_value(&parsed).unwrap_or_default().to_string()
    }

    /// Extract every declared field plus any decoded tool call.
    pub fn parse_structured(&self, text: &str, strip: bool) -> ParsedSmola {
        let mut fields = std::collections::HashMap::new();
        for field in &self.fields {
            field.capture_into(text, strip, &mut fields);
        }
        let fields = ParsedFields::from_map(fields);
        let tool_json = fields
            .get("tool")
            .filter(|content| !content.is_empty())
            .and_then(|content| serde_json::from_str::<Map<String, Value>>(content).ok());
        ParsedSmola { fields, tool_json }
    }

    pub(crate) fn last_field_value<'a>(&self, parsed: &'a ParsedSmola) -> Option<&'a str> {
        let last = self.fields.last()?;
        last.alternatives()
            .iter()
            .filter_map(|alt| parsed.fields.get(alt))
            .find(|value| !value.is_empty())
    }

    /// A human-readable template of the expected format.
    pub fn format_str(&self) -> String {
        render_format_str(&self.fields)
    }

    /// Render `values` as tagged text in declared field order.
    ///
    /// Strings are written verbatim; objects and arrays are JSON-encoded
    /// (tool calls); other values use their display form.
    pub fn format(&self, values: &Map<String, Value>) -> Result<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let entry = std::iter::once(field.canonical())
                .chain(field.alternatives().iter().map(String::as_str))
                .find_map(|name| values.get(name).map(|value| (name, value)));
            let Some((name, value)) = entry else {
                anyhow::bail!(
                    "missing value for field '{}' (allowed: {:?})",
                    field.canonical(),
                    field.alternatives()
                );
            };
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Object(_) | Value::Array(_) => serde_json::to_string(value)
                    .map_err(|e| anyhow::anyhow!("failed to marshal {name} to JSON: {e}"))?,
                other => other.to_string(),
            };
            parts.push(format!("<{0}>\n{1}\n</{0}>", field.canonical(), rendered));
        }
        Ok(parts.join("\n"))
    }

    /// Canonical field names, in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.canonical()).collect()
    }

    /// Score how closely `text` follows the declared format, in `[0, 1]`.
    ///
    /// 0.4 × fraction of declared fields present, +0.2 for consistent tag
    /// spacing, +0.2 for opening with the first field's tag, +0.2 for closing
    /// with the last field's tag.
    pub fn follows_format(&self, text: &str) -> f64 {
        let stripped = self.parse_structured(text, true);
        let raw = self.parse_structured(text, false);

        let mut present_sets = 0usize;
        let mut correct_spacing = true;
        for field in &self.fields {
            let mut set_present = false;
            for alt in field.alternatives() {
                if stripped.fields.get(alt).is_some_and(|v| !v.is_empty()) {
                    set_present = true;
                    if !raw.fields.get(alt).is_some_and(|v| !v.is_empty()) {
                        correct_spacing = false;
                    }
                }
            }
            if set_present {
                present_sets += 1;
            }
        }

        let mut score = 0.0;
        if present_sets > 0 {
            score += 0.4 * (present_sets as f64 / self.fields.len() as f64);
        }
        if correct_spacing {
            score += 0.2;
        }

        let trimmed = text.trim();
        if let Some(first) = self.fields.first() {
            if first
                .alternatives()
                .iter()
                .any(|alt| trimmed.starts_with(&format!("<{alt}>")))
            {
                score += 0.2;
            }
        }
        if let Some(last) = self.fields.last() {
            if last
                .alternatives()
                .iter()
                .any(|alt| trimmed.ends_with(&format!("</{alt}>")))
            {
                score += 0.2;
            }
        }

        score
    }
}
