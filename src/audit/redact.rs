//! Redaction of personal data from questions before they are persisted

use lazy_static::lazy_static;
use regex::Regex;
use sha2::Digest;
use sha2::Sha256;

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("EMAIL is a valid pattern");
    static ref PHONE: Regex = Regex::new(r"\+?\d[\d\s\-().]{7,}").expect("PHONE is a valid pattern");
    static ref URL: Regex = Regex::new(r"https?://\S+|www\.\S+").expect("URL is a valid pattern");
}

/// Replace emails, phone numbers and URLs with placeholders.
pub fn sanitize_question(input: &str) -> String {
    let out = EMAIL.replace_all(input.trim(), "[redacted_email]");
    let out = PHONE.replace_all(&out, "[redacted_phone]");
    let out = URL.replace_all(&out, "[redacted_url]");
    out.trim().to_string()
}

/// Hex SHA-256 of already redacted text.
pub fn hash_question(redacted: &str) -> String {
    hex::encode(Sha256::digest(redacted.as_bytes()))
}
