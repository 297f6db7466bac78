//! Stateless predicates over raw extracted strings. These only gate whether a
//! value is kept; replacement policy lives in [`crate::extract`].

use std::sync::OnceLock;

use regex::Regex;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z ]+$").expect("static regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("static regex"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9 ]+$").expect("static regex"))
}

fn country_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]+$").expect("static regex"))
}

/// Letters and spaces only; rejects digits and punctuation.
pub fn valid_name(name: &str) -> bool {
    !name.trim().is_empty() && name_pattern().is_match(name)
}

/// Standard `local@domain.tld` shape.
pub fn valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Optional leading `+`, then digits and spaces.
pub fn valid_phone(phone: &str) -> bool {
    !phone.trim().is_empty() && phone_pattern().is_match(phone)
}

/// Optional leading `+`, digits only.
pub fn valid_country_code(code: &str) -> bool {
    country_code_pattern().is_match(code)
}

/// Parses an age that is a digit string strictly between 0 and 120. The model
/// emits the literal "None" for unknown ages; that fails here like any other
/// non-digit input.
pub fn parse_age(age: &str) -> Option<u8> {
    let parsed: u16 = age.trim().parse().ok()?;
    (parsed > 0 && parsed < 120).then_some(parsed as u8)
}

#[cfg(test)]
mod tests {
    use super::{parse_age, valid_country_code, valid_email, valid_name, valid_phone};

    #[test]
    fn name_rejects_digits_and_punctuation() {
        assert!(valid_name("Jane Doe"));
        assert!(valid_name("Jane"));
        assert!(!valid_name("Jane2"));
        assert!(!valid_name("Jane-Doe"));
        assert!(!valid_name(""));
        assert!(!valid_name("   "));
    }

    #[test]
    fn email_requires_local_domain_tld() {
        assert!(valid_email("jane@x.com"));
        assert!(valid_email("j.doe-1@mail.example.org"));
        assert!(!valid_email("jane@x"));
        assert!(!valid_email("jane.x.com"));
        assert!(!valid_email("None"));
    }

    #[test]
    fn phone_allows_plus_digits_and_spaces() {
        assert!(valid_phone("+1 5551234"));
        assert!(valid_phone("5551234"));
        assert!(!valid_phone("555-1234"));
        assert!(!valid_phone("call me"));
    }

    #[test]
    fn country_code_allows_plus_and_digits_only() {
        assert!(valid_country_code("+91"));
        assert!(valid_country_code("44"));
        assert!(!valid_country_code("+4 4"));
        assert!(!valid_country_code("uk"));
    }

    #[test]
    fn age_boundaries_are_exclusive() {
        for age in 1u8..=119 {
            assert_eq!(parse_age(&age.to_string()), Some(age), "age {age} should pass");
        }
        assert_eq!(parse_age("0"), None);
        assert_eq!(parse_age("120"), None);
        assert_eq!(parse_age("121"), None);
    }

    #[test]
    fn age_non_numeric_fails_without_panicking() {
        assert_eq!(parse_age("None"), None);
        assert_eq!(parse_age("twenty"), None);
        assert_eq!(parse_age(""), None);
        assert_eq!(parse_age("-5"), None);
    }
}
