//! Elavon `SHA1HASH` signature
//!
//! The acquirer authenticates messages with a legacy double SHA-1 scheme: the
//! signed field values are joined with `.`, hashed, the shared secret is appended
//! to the lowercase hex digest, and the result is hashed again. The output must
//! match the acquirer's bit for bit.

use crate::payments::types::Fields;
use sha1::{Digest, Sha1};

/// Which field set a signature covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignDirection {
    Outbound,
    Inbound,
}

const OUTBOUND_FIELDS: [&str; 7] = [
    "TIMESTAMP",
    "MERCHANT_ID",
    "ORDER_ID",
    "RESULT",
    "MESSAGE",
    "PASREF",
    "AUTHCODE",
];

const INBOUND_FIELDS: [&str; 5] = ["TIMESTAMP", "MERCHANT_ID", "ORDER_ID", "AMOUNT", "CURRENCY"];

impl SignDirection {
    /// Signed fields, in signing order
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            SignDirection::Outbound => &OUTBOUND_FIELDS,
            SignDirection::Inbound => &INBOUND_FIELDS,
        }
    }
}

/// Compute the signature of `fields` for `direction`.
///
/// Absent fields sign as the empty string.
pub fn sign(direction: SignDirection, fields: &Fields, secret_key: &str) -> String {
    let message = direction
        .fields()
        .iter()
        .map(|key| fields.get(*key).map(String::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(".");

    let first = sha1_hex(message.as_bytes());
    sha1_hex(format!("{}{}", first, secret_key).as_bytes())
}

/// Check a supplied signature, ignoring letter case
pub fn verify(direction: SignDirection, fields: &Fields, secret_key: &str, supplied: &str) -> bool {
    let computed = sign(direction, fields, secret_key);
    eq_ignore_case_constant_time(&computed, supplied)
}

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

pub(crate) fn eq_ignore_case_constant_time(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0, |acc, (x, y)| {
            acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase())
        })
        == 0
}
