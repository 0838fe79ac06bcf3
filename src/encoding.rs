// src/encoding.rs

//! base64url helpers for JWT segments and JWK members.
//!
//! Compact JWTs and JWK members are base64url-encoded without padding. The
//! decoder here restores the `=` padding before decoding with the padded
//! URL-safe engine, so it accepts both padded and unpadded input.

use base64::engine::{general_purpose::URL_SAFE, Engine};
use base64::DecodeError;
use std::borrow::Cow;

/// Number of `=` characters needed to bring `input` to a multiple of 4.
pub fn padding_len(input: &str) -> usize {
    (4 - input.len() % 4) % 4
}

/// Appends the missing `=` padding. Borrows when none is needed.
pub fn pad_base64url(input: &str) -> Cow<'_, str> {
    match padding_len(input) {
        0 => Cow::Borrowed(input),
        n => {
            let mut padded = String::with_capacity(input.len() + n);
            padded.push_str(input);
            padded.extend(std::iter::repeat('=').take(n));
            Cow::Owned(padded)
        }
    }
}

/// Decodes a base64url string, adding padding first when it is missing.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE.decode(pad_base64url(input).as_bytes())
}
