// src/utils/text.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::error::AppError;

/// Normalizes a question for equality comparison: lowercase, punctuation and
/// whitespace removed. Two questions that normalize to the same string are
/// treated as the same question by the cheat detector.
pub fn normalize_question(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn doc_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-. ]{1,100}$").expect("valid regex"))
}

/// Validates a document name before it is used as a filename or forwarded
/// to the LLM service.
pub fn validate_doc_name(name: &str) -> Result<(), AppError> {
    if doc_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Document name contains forbidden characters".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_strips() {
        assert_eq!(
            normalize_question("What is the capacity?"),
            "whatisthecapacity"
        );
        assert_eq!(
            normalize_question("  WHAT is\tthe CAPACITY!? "),
            "whatisthecapacity"
        );
    }

    #[test]
    fn normalize_keeps_digits() {
        assert_eq!(normalize_question("Port 8080?"), "port8080");
    }

    #[test]
    fn normalize_distinct_questions_stay_distinct() {
        assert_ne!(
            normalize_question("What is the capacity?"),
            normalize_question("What is the latency?")
        );
    }

    #[test]
    fn doc_name_validation() {
        assert!(validate_doc_name("user_manual-v2.1").is_ok());
        assert!(validate_doc_name("datapk itm").is_ok());
        assert!(validate_doc_name("../etc/passwd").is_err());
        assert!(validate_doc_name("").is_err());
    }
}
