//! Prompt fingerprinting.
//!
//! Two prompts that differ only in case or incidental whitespace collapse to
//! the same fingerprint, so history recorded for `"Continue?"` is found again
//! for `"  continue? "`.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Trim, case-fold and collapse internal whitespace runs to a single space.
pub fn normalize_prompt(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable fingerprint of a prompt: the truncated hex SHA-256 of its
/// normalized form.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize_prompt(text).as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}
