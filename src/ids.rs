use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a byte string. Shared by the session id
/// generator and the semantic cache's key derivation.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Build a human-readable session id from a user id and a timestamp:
/// `{email_prefix}_{YY-MM-DD}_{HH:MM}`, e.g. `nbaudrey3c_25-09-23_10:05`.
pub fn generate_readable_session_id(user_id: &str, timestamp: DateTime<Utc>) -> String {
    let email_prefix = user_id.split('@').next().unwrap_or(user_id);
    let cleaned: String = email_prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    let date_str = timestamp.format("%y-%m-%d");
    let time_str = timestamp.format("%H:%M");

    format!("{}_{}_{}", cleaned, date_str, time_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn readable_session_id_strips_special_characters() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 23, 10, 5, 0).unwrap();
        let sid = generate_readable_session_id("n.baudrey+3c@example.com", ts);
        assert_eq!(sid, "nbaudrey3c_25-09-23_10:05");
    }

    #[test]
    fn readable_session_id_without_at_sign() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let sid = generate_readable_session_id("plainuser", ts);
        assert_eq!(sid, "plainuser_25-01-01_00:00");
    }

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(sha256_hex("hello"), sha256_hex("hello"));
        assert_ne!(sha256_hex("hello"), sha256_hex("world"));
    }
}
