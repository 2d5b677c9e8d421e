//! Text normalization shared by training and inference
//!
//! Every feature extractor consumes the output of [`normalize_str`]. The corpus
//! loader and the inference service both go through [`combine`], so a review
//! is cleaned the same way whichever side of the pipeline sees it.

use regex::Regex;
use std::sync::OnceLock;

fn non_alpha() -> &'static Regex {
    static NON_ALPHA: OnceLock<Regex> = OnceLock::new();
    NON_ALPHA.get_or_init(|| Regex::new(r"[^a-zA-Z\s]").expect("static pattern"))
}

fn whitespace_run() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Normalize optional review text; missing input yields an empty string
pub fn normalize(text: Option<&str>) -> String {
    text.map(normalize_str).unwrap_or_default()
}

/// Lowercase, keep ASCII letters and whitespace, collapse whitespace, trim
pub fn normalize_str(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered = text.to_lowercase();
    let letters = non_alpha().replace_all(&lowered, "");
    let collapsed = whitespace_run().replace_all(&letters, " ");
    collapsed.trim().to_string()
}

/// Normalize `title + " " + text`, the representation every model sees
pub fn combine(title: &str, text: &str) -> String {
    normalize_str(&format!("{title} {text}"))
}

/// Split normalized text into whitespace tokens
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_digits_and_punctuation() {
        assert_eq!(
            normalize_str("  Amazing!!! 10/10, would BUY again :) "),
            "amazing would buy again"
        );
    }

    #[test]
    fn test_collapses_mixed_whitespace() {
        assert_eq!(normalize_str("fits\t\tperfectly\n\nlove it"), "fits perfectly love it");
    }

    #[test]
    fn test_missing_input_is_empty() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("")), "");
        assert_eq!(normalize(Some("123 !!!")), "");
    }

    #[test]
    fn test_combine_puts_title_first() {
        assert_eq!(combine("Great Dress", "Runs small."), "great dress runs small");
        assert_eq!(combine("", "  Runs small."), "runs small");
        assert_eq!(combine("", ""), "");
    }

    #[test]
    fn test_non_ascii_letters_removed() {
        assert_eq!(normalize_str("café naïve"), "caf nave");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in "\\PC*") {
            let once = normalize_str(&s);
            prop_assert_eq!(normalize_str(&once), once.clone());
        }

        #[test]
        fn prop_output_alphabet(s in "\\PC*") {
            let out = normalize_str(&s);
            prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c == ' '));
            prop_assert!(!out.contains("  "));
            prop_assert!(!out.starts_with(' ') && !out.ends_with(' '));
        }
    }
}
