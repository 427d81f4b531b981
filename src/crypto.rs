use crate::utils::{base64url, SecureRandom};

/// Number of random bytes in a session ID.
const SESSION_ID_BYTES: usize = 24;

/// Length of an encoded session ID.
pub const SESSION_ID_LEN: usize = 32;

/// Alphabet used by z-base-32, a human-friendly encoding.
const ZBASE32_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// Generate a new random session ID.
pub async fn session_id(rng: &SecureRandom) -> String {
    base64url::encode(&rng.generate_async(SESSION_ID_BYTES).await)
}

/// Whether the input looks like a session ID we generated.
pub fn is_session_id(input: &str) -> bool {
    input.len() == SESSION_ID_LEN && base64url::is_alphabet(input)
}

/// Generate a nonce for use in a content security policy.
pub async fn csp_nonce(rng: &SecureRandom) -> String {
    base64url::encode(&rng.generate_async(16).await)
}

/// Generate a random string of `len` z-base-32 characters.
///
/// Used for error references users can read back to an operator.
pub async fn random_zbase32(len: usize, rng: &SecureRandom) -> String {
    rng.generate_async(len)
        .await
        .into_iter()
        .map(|byte| ZBASE32_ALPHABET[(byte % 32) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_ids_are_recognized() {
        let rng = SecureRandom::new().await;
        let id = session_id(&rng).await;
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(is_session_id(&id));
        assert_ne!(id, session_id(&rng).await);
    }

    #[test]
    fn rejects_foreign_session_ids() {
        assert!(!is_session_id(""));
        assert!(!is_session_id("short"));
        assert!(!is_session_id("abcdefghijklmnopqrstuvwxyz012345; x=y"));
        assert!(!is_session_id("abcdefghijklmnopqrstuvwxyz01234="));
    }

    #[tokio::test]
    async fn zbase32_uses_alphabet() {
        let rng = SecureRandom::new().await;
        let reference = random_zbase32(6, &rng).await;
        assert_eq!(reference.len(), 6);
        assert!(reference.bytes().all(|b| ZBASE32_ALPHABET.contains(&b)));
    }
}
