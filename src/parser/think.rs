//! Parser that returns whatever follows a closing reasoning marker.

/// Extracts the content after the last `</think>`-style marker.
///
/// Responses without the marker pass through trimmed. An optional extractor
/// post-processes the remainder, e.g. pulling a boxed answer out of it.
#[derive(Debug, Clone)]
pub struct ThinkParser {
    end_marker: String,
    extract: Option<fn(&str) -> String>,
}

impl Default for ThinkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkParser {
    pub fn new() -> Self {
        Self {
            end_marker: "</think>".to_string(),
            extract: None,
        }
    }

    /// A parser that applies `extract` to the text after the marker.
    pub fn with_extractor(extract: fn(&str) -> String) -> Self {
        Self {
            end_marker: "</think>".to_string(),
            extract: Some(extract),
        }
    }

    /// Override the end marker (default `"</think>"`).
    pub fn with_end_marker(mut self, end_marker: impl Into<String>) -> Self {
        self.end_marker = end_marker.into();
        self
    }

    fn open_marker(&self) -> String {
        self.end_marker.replacen("</", "<", 1)
    }

    /// The trimmed text after the last end marker (whole text if absent),
    /// passed through the extractor when one is set.
    pub fn parse(&self, response: &str) -> String {
        let text = match response.rsplit_once(self.end_marker.as_str()) {
            Some((_, after)) => after,
            None => response,
        };
        let text = text.trim();
        match self.extract {
            Some(extract) => extract(text),
            None => text.to_string(),
        }
    }

    pub(crate) fn has_think_tags(&self, response: &str) -> bool {
        response.contains(&self.open_marker()) && response.contains(self.end_marker.as_str())
    }

    /// Whether `text` is a single reasoning block followed by an answer:
    /// starts with the open marker, contains exactly one marker pair, and has
    /// non-empty content after the end marker.
    pub fn follows_format(&self, text: &str) -> bool {
        let open = self.open_marker();
        if !text.trim().starts_with(&open) {
            return false;
        }
        if text.matches(&open).count() != 1 {
            return false;
        }
        if text.matches(self.end_marker.as_str()).count() != 1 {
            return false;
        }
        match text.split_once(self.end_marker.as_str()) {
            Some((_, after)) => !after.trim().is_empty(),
            None => false,
        }
    }

    /// A human-readable template of the expected format.
    pub fn format_str(&self) -> String {
        format!(
            "{}\n...thinking process...\n{}\n...final answer...",
            self.open_marker(),
            self.end_marker
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_returns_text_after_marker() {
        let parser = ThinkParser::new();
        let response = "<think>\n2 + 2 is 4\n</think>\nThe answer is 4";
        assert_eq!(parser.parse(response), "The answer is 4");
    }

    #[test]
    fn test_parse_takes_last_marker() {
        let parser = ThinkParser::new();
        let response = "<think>first</think>\nmiddle\n<think>second</think>\nfinal";
        assert_eq!(parser.parse(response), "final");
    }

    #[test]
    fn test_parse_without_marker_trims() {
        let parser = ThinkParser::new();
        assert_eq!(parser.parse("  just an answer  "), "just an answer");
    }

    #[test]
    fn test_extractor_applied_after_split() {
        fn first_word(s: &str) -> String {
            s.split_whitespace().next().unwrap_or_default().to_string()
        }
        let parser = ThinkParser::with_extractor(first_word);
        assert_eq!(parser.parse("<think>hm</think>\n42 is the answer"), "42");
    }

    #[test]
    fn test_custom_end_marker() {
        let parser = ThinkParser::new().with_end_marker("</scratch>");
        assert_eq!(parser.parse("<scratch>notes</scratch>\ndone"), "done");
        assert_eq!(
            parser.format_str(),
            "<scratch>\n...thinking process...\n</scratch>\n...final answer..."
        );
    }

    #[test]
    fn test_follows_format() {
        let parser = ThinkParser::new();
        assert!(parser.follows_format("<think>\nreasoning\n</think>\n42"));
        // Must start with the open marker.
        assert!(!parser.follows_format("preamble <think>x</think> 42"));
        // Exactly one marker pair.
        assert!(!parser.follows_format("<think>a</think><think>b</think>42"));
        // Needs content after the end marker.
        assert!(!parser.follows_format("<think>reasoning</think>\n   "));
    }
}
