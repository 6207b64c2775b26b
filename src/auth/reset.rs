use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Reset tokens live for ten minutes.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// One-time password-reset token. The plaintext goes out to the user exactly
/// once; only the digest is ever persisted.
#[derive(Debug)]
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let hash = digest(&plaintext);
        Self {
            plaintext,
            hash,
            expires_at: OffsetDateTime::now_utc() + RESET_TOKEN_TTL,
        }
    }
}

/// Unsalted SHA-256 hex digest. The store looks rows up by this value, so it
/// must be deterministic.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Digest match AND unexpired; either failing reads the same to the caller.
pub fn is_valid(
    candidate: &str,
    stored_hash: &str,
    expires_at: OffsetDateTime,
    now: OffsetDateTime,
) -> bool {
    let hash_matches = constant_time_eq(digest(candidate).as_bytes(), stored_hash.as_bytes());
    hash_matches && now <= expires_at
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
        // sha-256 hex
        assert_eq!(digest("abc").len(), 64);
    }

    #[test]
    fn generated_tokens_are_unique_and_never_store_plaintext() {
        let first = ResetToken::generate();
        let second = ResetToken::generate();
        assert_ne!(first.plaintext, second.plaintext);
        assert_ne!(first.plaintext, first.hash);
        assert_eq!(first.hash, digest(&first.plaintext));
        assert!(first.expires_at > OffsetDateTime::now_utc());
    }

    #[test]
    fn fresh_token_validates() {
        let token = ResetToken::generate();
        let now = OffsetDateTime::now_utc();
        assert!(is_valid(&token.plaintext, &token.hash, token.expires_at, now));
    }

    #[test]
    fn wrong_candidate_is_rejected() {
        let token = ResetToken::generate();
        let now = OffsetDateTime::now_utc();
        assert!(!is_valid("deadbeef", &token.hash, token.expires_at, now));
    }

    #[test]
    fn expired_token_is_rejected_even_if_never_consumed() {
        let token = ResetToken::generate();
        let past_window = token.expires_at + Duration::seconds(1);
        assert!(!is_valid(
            &token.plaintext,
            &token.hash,
            token.expires_at,
            past_window
        ));
    }

    #[test]
    fn constant_time_eq_matches_std_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"a"));
    }
}
