//! Field codec: string/hex/base64 framing around the AEAD primitive.
//!
//! Encrypted field format (hex string):
//! ```text
//! hex( XChaCha20-Poly1305( utf8(base64(utf8(plaintext))) ) || 24-byte nonce )
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyspace_core::{KeyspaceError, KeyspaceResult};

use crate::aead::{aead_decrypt, aead_encrypt};
use crate::keys::SymmetricKey;

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string. Odd lengths and non-hex characters are rejected.
pub fn from_hex(s: &str) -> KeyspaceResult<Vec<u8>> {
    hex::decode(s).map_err(|e| KeyspaceError::Decode(format!("hex: {e}")))
}

/// Decode a hex string that must be exactly `N` bytes long.
pub fn from_hex_exact<const N: usize>(s: &str) -> KeyspaceResult<[u8; N]> {
    let bytes = from_hex(s)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| KeyspaceError::Decode(format!("expected {N} bytes of hex, got {len}")))
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_base64(s: &str) -> KeyspaceResult<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| KeyspaceError::Decode(format!("base64: {e}")))
}

/// Encrypt a single string field. Output differs on every call (random nonce).
pub fn encrypt_string(plaintext: &str, key: &SymmetricKey) -> KeyspaceResult<String> {
    let framed = to_base64(plaintext.as_bytes());
    let sealed = aead_encrypt(framed.as_bytes(), key)?;
    Ok(to_hex(&sealed))
}

/// Decrypt a hex field produced by [`encrypt_string`].
pub fn decrypt_string(ciphertext_hex: &str, key: &SymmetricKey) -> KeyspaceResult<String> {
    let sealed = from_hex(ciphertext_hex)?;
    let framed = aead_decrypt(&sealed, key)?;
    let framed = std::str::from_utf8(&framed)
        .map_err(|e| KeyspaceError::Decode(format!("field framing is not UTF-8: {e}")))?;
    let plaintext = from_base64(framed)?;
    String::from_utf8(plaintext)
        .map_err(|e| KeyspaceError::Decode(format!("decrypted field is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NONCE_SIZE, TAG_SIZE};

    fn test_key() -> SymmetricKey {
        SymmetricKey::from_bytes([0x55u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_string_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_string("hunter2", &key).unwrap();
        assert_eq!(decrypt_string(&encrypted, &key).unwrap(), "hunter2");
    }

    #[test]
    fn test_unicode_and_empty() {
        let key = test_key();
        for s in ["", "pässwörd ✓", "日本語のメモ", "line\nbreak"] {
            let encrypted = encrypt_string(s, &key).unwrap();
            assert_eq!(decrypt_string(&encrypted, &key).unwrap(), s);
        }
    }

    #[test]
    fn test_ciphertext_is_hex_with_suffix_nonce() {
        let key = test_key();
        let encrypted = encrypt_string("abc", &key).unwrap();
        // base64("abc") = "YWJj" (4 bytes) + tag + nonce
        assert_eq!(encrypted.len(), 2 * (4 + TAG_SIZE + NONCE_SIZE));
        assert!(encrypted.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let key = test_key();
        let a = encrypt_string("same", &key).unwrap();
        let b = encrypt_string("same", &key).unwrap();
        assert_ne!(a, b, "nonce must be randomized");
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let encrypted = encrypt_string("secret", &test_key()).unwrap();
        let other = SymmetricKey::from_bytes([0x66u8; 32]);
        assert!(matches!(
            decrypt_string(&encrypted, &other),
            Err(KeyspaceError::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_malformed_hex_is_decode_error() {
        let key = test_key();
        assert!(matches!(
            decrypt_string("not hex", &key),
            Err(KeyspaceError::Decode(_))
        ));
        assert!(matches!(
            decrypt_string("abc", &key),
            Err(KeyspaceError::Decode(_))
        ));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(from_hex("00ABff").unwrap(), vec![0x00, 0xab, 0xff]);
        assert!(from_hex("0").is_err(), "odd length must be rejected");
        assert!(from_hex("gg").is_err());
        assert_eq!(from_hex_exact::<2>("beef").unwrap(), [0xbe, 0xef]);
        assert!(from_hex_exact::<2>("beefbe").is_err(), "no silent truncation");
        assert!(from_hex_exact::<2>("be").is_err());
    }
}
