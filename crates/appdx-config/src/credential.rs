//! Reversible at-rest encoding of controller passwords.
//!
//! This is obfuscation, not encryption. The prefix lets a rerun recognise values
//! that are already encoded.

use appdx_common::error::{AppdError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

pub const ENCODING_PREFIX: &str = "ENCODED-";

pub fn encode(secret: &str) -> String {
    BASE64_STANDARD.encode(format!("{ENCODING_PREFIX}{secret}"))
}

pub fn is_encoded(value: &str) -> bool {
    decode_prefixed(value).is_some()
}

/// Encodes `value` unless it already is.
pub fn ensure_encoded(value: &str) -> String {
    if is_encoded(value) {
        value.to_string()
    } else {
        encode(value)
    }
}

pub fn decode(value: &str) -> Result<String> {
    decode_prefixed(value).ok_or_else(|| {
        AppdError::Config("credential is not in the encoded form expected by the job file".to_string())
    })
}

fn decode_prefixed(value: &str) -> Option<String> {
    let bytes = BASE64_STANDARD.decode(value.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    decoded
        .strip_prefix(ENCODING_PREFIX)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, ensure_encoded, is_encoded};

    #[test]
    fn encoding_is_idempotent() {
        let once = ensure_encoded("hunter2");
        let twice = ensure_encoded(&once);

        assert_eq!(once, twice);
        assert!(is_encoded(&once));
        assert_eq!(decode(&twice).unwrap(), "hunter2");
    }

    #[test]
    fn plain_base64_without_prefix_is_re_encoded() {
        // "aGVsbG8=" is valid base64 for "hello" but lacks the prefix.
        let encoded = ensure_encoded("aGVsbG8=");
        assert_ne!(encoded, "aGVsbG8=");
        assert_eq!(decode(&encoded).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn decode_rejects_raw_values() {
        assert!(decode("not encoded").is_err());
        assert_eq!(decode(&encode("")).unwrap(), "");
    }
}
