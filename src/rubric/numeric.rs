//! Answer normalization and numeric comparison helpers.
//!
//! Ground truths arrive in several shapes (`\boxed{..}` LaTeX, `####`-marked
//! GSM8K answers, formatted numbers with commas and currency signs), so the
//! rubrics funnel both sides through these helpers before comparing.

use std::sync::OnceLock;

use regex::Regex;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+\.?\d*").expect("number pattern compiles"))
}

/// Extract the content of the first `\boxed{..}` block, balancing nested
/// braces. Returns the input unchanged when no complete block is present.
pub fn extract_boxed_answer(text: &str) -> &str {
    let Some(idx) = text.find("\\boxed{") else {
        return text;
    };
    let start = idx + "\\boxed{".len();
    let mut depth = 1usize;
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..start + offset];
                }
            }
            _ => {}
        }
    }
    text
}

/// Extract the answer after a `####` marker, trimmed. Returns the input
/// unchanged when the marker is absent.
pub fn extract_hash_answer(text: &str) -> &str {
    match text.split("####").nth(1) {
        Some(after) => after.trim(),
        None => text,
    }
}

/// Normalize a numeric string: strip commas, currency signs and spaces, then
/// reformat through `f64` so `"1,000.0"` and `"1000"` normalize identically.
/// Non-numeric input is returned with the separators stripped.
pub fn normalize_number(text: &str) -> String {
    let cleaned = text.trim().replace([',', '$', ' '], "");
    match cleaned.parse::<f64>() {
        Ok(value) => format!("{value}"),
        Err(_) => cleaned,
    }
}

/// First integer or decimal literal in the text, or `""` when none is found.
pub fn extract_first_number(text: &str) -> &str {
    number_pattern()
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// Compare two answers: exact match, then normalized match, then numeric
/// comparison within `1e-9` when both sides parse as floats.
pub fn compare_math_answers(answer: &str, other: &str) -> bool {
    if answer == other {
        return true;
    }
    let norm_a = normalize_number(answer);
    let norm_b = normalize_number(other);
    if norm_a == norm_b {
        return true;
    }
    match (norm_a.parse::<f64>(), norm_b.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() < 1e-9,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_answer_extracts_content() {
        assert_eq!(extract_boxed_answer("The answer is \\boxed{42}."), "42");
    }

    #[test]
    fn boxed_answer_balances_nested_braces() {
        assert_eq!(
            extract_boxed_answer("\\boxed{\\frac{1}{2}}"),
            "\\frac{1}{2}"
        );
    }

    #[test]
    fn boxed_answer_passes_through_without_marker() {
        assert_eq!(extract_boxed_answer("just 42"), "just 42");
    }

    #[test]
    fn boxed_answer_passes_through_when_unterminated() {
        assert_eq!(extract_boxed_answer("\\boxed{42"), "\\boxed{42");
    }

    #[test]
    fn hash_answer_takes_segment_after_marker() {
        assert_eq!(extract_hash_answer("Natalia sold 24 clips. #### 72"), "72");
        assert_eq!(extract_hash_answer("no marker here"), "no marker here");
    }

    #[test]
    fn normalize_strips_separators_and_reformats() {
        assert_eq!(normalize_number("1,000.0"), "1000");
        assert_eq!(normalize_number("$5"), "5");
        assert_eq!(normalize_number(" 2 500 "), "2500");
        assert_eq!(normalize_number("1.50"), "1.5");
    }

    #[test]
    fn normalize_keeps_non_numeric_text() {
        assert_eq!(normalize_number("forty-two"), "forty-two");
    }

    #[test]
    fn first_number_finds_integers_and_decimals() {
        assert_eq!(extract_first_number("the total is 42.5 exactly"), "42.5");
        assert_eq!(extract_first_number("delta of -3 degrees"), "-3");
        assert_eq!(extract_first_number("none here"), "");
    }

    #[test]
    fn compare_accepts_formatting_differences() {
        assert!(compare_math_answers("1,000.0", "1000"));
        assert!(compare_math_answers("1000", "1,000.0"));
        assert!(compare_math_answers("$12", "12"));
    }

    #[test]
    fn compare_uses_numeric_tolerance() {
        assert!(compare_math_answers("42", "42.0000000001"));
        assert!(!compare_math_answers("42", "42.1"));
    }

    #[test]
    fn compare_rejects_distinct_text() {
        assert!(!compare_math_answers("abc", "abd"));
        assert!(!compare_math_answers("0.5", "1/2"));
    }
}
