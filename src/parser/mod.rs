//! Parsers that extract a canonical answer from raw model output.
//!
//! Every parser implements `parse` (answer text) and `parse_with_tracking`
//! (answer plus a [`ParseTrace`] describing what was found). The variants:
//!
//! - [`TrimParser`] -- whitespace-trimmed response verbatim.
//! - [`LastLineParser`] -- last non-empty line.
//! - [`XmlParser`] -- tagged fields with alternative tag names.
//! - [`SmolaParser`] -- tagged fields plus decoded `<tool>` JSON.
//! - [`ThinkParser`] -- everything after a closing reasoning marker.

mod smola;
mod think;
mod xml;

pub use smola::{ParsedSmola, SmolaParser};
pub use think::ThinkParser;
pub use xml::{ParsedFields, XmlParser};

/// Trims surrounding whitespace and returns the response unchanged otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimParser;

impl TrimParser {
    pub fn parse(&self, response: &str) -> String {
        response.trim().to_string()
    }
}

/// Returns the last non-empty line, trimmed. Empty if every line is blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastLineParser;

impl LastLineParser {
    pub fn parse(&self, response: &str) -> String {
        response
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Metadata recorded alongside a parse, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTrace {
    /// Whole-text parsers: original and parsed lengths.
    Text { original_len: usize, parsed_len: usize },
    /// Line-based parsers: how many lines were scanned.
    Lines { total_lines: usize, parsed_len: usize },
    /// Tag-based parsers: which declared fields matched.
    Tagged { fields_found: usize, fields: ParsedFields },
    /// Reasoning-marker parsers: whether both markers were present.
    Think {
        has_think_tags: bool,
        original_len: usize,
        parsed_len: usize,
    },
}

/// All parser implementations behind one concrete type.
#[derive(Debug, Clone)]
pub enum AnyParser {
    Trim(TrimParser),
    LastLine(LastLineParser),
    Xml(XmlParser),
    Smola(SmolaParser),
    Think(ThinkParser),
}

impl AnyParser {
    /// Extract the canonical answer from a model response.
    pub fn parse(&self, response: &str) -> String {
        match self {
            AnyParser::Trim(p) => p.parse(response),
            AnyParser::LastLine(p) => p.parse(response),
            AnyParser::Xml(p) => p.parse(response),
            AnyParser::Smola(p) => p.parse(response),
            AnyParser::Think(p) => p.parse(response),
        }
    }

    /// Extract the answer together with parse metadata.
    pub fn parse_with_tracking(&self, response: &str) -> (String, ParseTrace) {
        match self {
            AnyParser::Trim(p) => {
                let parsed = p.parse(response);
                let trace = ParseTrace::Text {
                    original_len: response.len(),
                    parsed_len: parsed.len(),
                };
                (parsed, trace)
            }
            AnyParser::LastLine(p) => {
                let parsed = p.parse(response);
                let trace = ParseTrace::Lines {
                    total_lines: response.lines().count(),
                    parsed_len: parsed.len(),
                };
                (parsed, trace)
            }
            AnyParser::Xml(p) => {
                let fields = p.parse_fields(response, true);
                let parsed = fields.get(p.answer_field()).unwrap_or_default().to_string();
                let trace = ParseTrace::Tagged {
                    fields_found: fields.len(),
                    fields,
                };
                (parsed, trace)
            }
            AnyParser::Smola(p) => {
                let structured = p.parse_structured(response, true);
                let parsed = p.last_field_value(&structured).unwrap_or_default().to_string();
                let trace = ParseTrace::Tagged {
                    fields_found: structured.fields.len(),
                    fields: structured.fields,
                };
                (parsed, trace)
            }
            AnyParser::Think(p) => {
                let parsed = p.parse(response);
                let trace = ParseTrace::Think {
                    has_think_tags: p.has_think_tags(response),
                    original_len: response.len(),
                    parsed_len: parsed.len(),
                };
                (parsed, trace)
            }
        }
    }
}

impl From<TrimParser> for AnyParser {
    fn from(p: TrimParser) -> Self {
        AnyParser::Trim(p)
    }
}

impl From<LastLineParser> for AnyParser {
    fn from(p: LastLineParser) -> Self {
        AnyParser::LastLine(p)
    }
}

impl From<XmlParser> for AnyParser {
    fn from(p: XmlParser) -> Self {
        AnyParser::Xml(p)
    }
}

impl From<SmolaParser> for AnyParser {
    fn from(p: SmolaParser) -> Self {
        AnyParser::Smola(p)
    }
}

impl From<ThinkParser> for AnyParser {
    fn from(p: ThinkParser) -> Self {
        AnyParser::Think(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_parser() {
        let parser = TrimParser;
        assert_eq!(parser.parse("  4  \n"), "4");
        assert_eq!(parser.parse(""), "");
    }

    #[test]
    fn test_last_line_parser() {
        let parser = LastLineParser;
        assert_eq!(parser.parse("step 1\nstep 2\nThe answer is 4"), "The answer is 4");
        assert_eq!(parser.parse("only line"), "only line");
        assert_eq!(parser.parse("answer\n\n   \n"), "answer");
        assert_eq!(parser.parse("\n   \n"), "");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let parser = AnyParser::from(LastLineParser);
        let once = parser.parse("a\nb\nc");
        let twice = parser.parse(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_tracking_metadata() {
        let parser = AnyParser::from(TrimParser);
        let (parsed, trace) = parser.parse_with_tracking("  hi  ");
        assert_eq!(parsed, "hi");
        assert_eq!(
            trace,
            ParseTrace::Text {
                original_len: 6,
                parsed_len: 2
            }
        );

        let parser = AnyParser::from(LastLineParser);
        let (_, trace) = parser.parse_with_tracking("a\nb\nc");
        assert_eq!(
            trace,
            ParseTrace::Lines {
                total_lines: 3,
                parsed_len: 1
            }
        );
    }
}
