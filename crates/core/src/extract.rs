//! Turns the extraction model's raw response into a [`FieldSnapshot`].
//!
//! The extraction prompt asks the model for a flat `Key: value, Key: value`
//! line. Parsing is deliberately forgiving: malformed pairs are dropped
//! silently, and any value that fails validation becomes `None` rather than
//! surfacing the raw string downstream.

use std::collections::BTreeMap;

use crate::domain::snapshot::FieldSnapshot;
use crate::validate;

/// Keys the extraction prompt instructs the model to emit.
pub mod input_keys {
    pub const NAME: &str = "Name";
    pub const AGE: &str = "Age";
    pub const EMAIL: &str = "Email";
    pub const COUNTRY_CODE: &str = "Country Code";
    pub const PHONE: &str = "Phone";
    pub const MARITAL_STATUS: &str = "Marital Status";
    pub const WORK_EXPERIENCE: &str = "Work Experience";
    pub const EDUCATION: &str = "Highest Qualification";
    pub const NATIONALITY: &str = "Nationality";
    pub const VISA_STATUS: &str = "Visa Status";
    pub const CURRENT_LOCATION: &str = "Current Location";
    pub const FUTURE_LOCATION: &str = "Future Location";
    pub const SPECIALIZATION: &str = "Specialization";
    pub const PROFESSION: &str = "Profession";
    pub const REFERRAL: &str = "Referral";
}

/// Splits raw model text on commas into `key: value` pairs. Pairs without a
/// `": "` separator are discarded; that is expected noise, not an error.
pub fn parse_field_pairs(raw: &str) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    for candidate in raw.split(',') {
        let candidate = candidate.replace('\n', "");
        if let Some((key, value)) = candidate.split_once(": ") {
            pairs.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    pairs
}

/// The model emits the literal "None" for fields it could not find; treat it
/// and empty strings as absent.
fn known(pairs: &BTreeMap<String, String>, key: &str) -> Option<String> {
    pairs
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != "None")
        .map(str::to_string)
}

/// First token becomes the first name, last token the last name; a
/// single-token name yields a first name only. Invalid names yield neither.
fn split_name(name: Option<String>) -> (Option<String>, Option<String>) {
    let Some(name) = name.filter(|value| validate::valid_name(value)) else {
        return (None, None);
    };

    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => (None, None),
        [single] => (Some(single.to_string()), None),
        [first, .., last] => (Some(first.to_string()), Some(last.to_string())),
    }
}

/// Builds the normalized snapshot from raw model text, applying validators to
/// the gated fields and passing free-text fields through as-is.
pub fn snapshot_from_model_text(raw: &str) -> FieldSnapshot {
    let pairs = parse_field_pairs(raw);

    let (first_name, last_name) = split_name(known(&pairs, input_keys::NAME));
    let email = known(&pairs, input_keys::EMAIL).filter(|value| validate::valid_email(value));
    let phone = known(&pairs, input_keys::PHONE).filter(|value| validate::valid_phone(value));
    let country_code =
        known(&pairs, input_keys::COUNTRY_CODE).filter(|value| validate::valid_country_code(value));
    let age = known(&pairs, input_keys::AGE).and_then(|value| validate::parse_age(&value));

    FieldSnapshot {
        first_name,
        last_name,
        email,
        phone,
        country_code,
        age,
        marital_status: known(&pairs, input_keys::MARITAL_STATUS),
        work_experience: known(&pairs, input_keys::WORK_EXPERIENCE),
        education: known(&pairs, input_keys::EDUCATION),
        nationality: known(&pairs, input_keys::NATIONALITY),
        visa_status: known(&pairs, input_keys::VISA_STATUS),
        current_location: known(&pairs, input_keys::CURRENT_LOCATION),
        future_location: known(&pairs, input_keys::FUTURE_LOCATION),
        specialization: known(&pairs, input_keys::SPECIALIZATION),
        profession: known(&pairs, input_keys::PROFESSION),
        referral_channel: known(&pairs, input_keys::REFERRAL),
    }
}
