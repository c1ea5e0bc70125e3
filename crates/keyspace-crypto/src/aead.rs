//! XChaCha20-Poly1305 sealing with a suffix nonce.
//!
//! Sealed format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: Poly1305 tag][24 bytes: random nonce]
//! ```
//!
//! The nonce is appended, not prepended; decryption splits at `len - 24`.
//! No additional authenticated data is bound.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use keyspace_core::{KeyspaceError, KeyspaceResult};

use crate::keys::{fill_random, SymmetricKey};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Returns: `[ciphertext][16-byte tag][24-byte nonce]`
pub fn aead_encrypt(plaintext: &[u8], key: &SymmetricKey) -> KeyspaceResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    fill_random(&mut nonce_bytes)?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let mut sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| KeyspaceError::Other(anyhow::anyhow!("AEAD encryption failed: {e}")))?;

    sealed.extend_from_slice(&nonce_bytes);
    Ok(sealed)
}

/// Decrypt a blob produced by [`aead_encrypt`].
///
/// Never returns partial plaintext: a bad tag (wrong key, tampered bytes)
/// yields [`KeyspaceError::AuthenticationFailure`].
pub fn aead_decrypt(sealed: &[u8], key: &SymmetricKey) -> KeyspaceResult<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(KeyspaceError::Decode(format!(
            "sealed field too short: {} bytes (minimum {})",
            sealed.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (ciphertext, nonce_bytes) = sealed.split_at(sealed.len() - NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        KeyspaceError::AuthenticationFailure(
            "AEAD tag mismatch: wrong key or corrupted ciphertext".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([b; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(1);
        let sealed = aead_encrypt(b"hello, encrypted world!", &k).unwrap();
        assert_eq!(aead_decrypt(&sealed, &k).unwrap(), b"hello, encrypted world!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let k = key(2);
        let sealed = aead_encrypt(b"", &k).unwrap();
        assert_eq!(sealed.len(), TAG_SIZE + NONCE_SIZE);
        assert_eq!(aead_decrypt(&sealed, &k).unwrap(), b"");
    }

    #[test]
    fn test_sealed_size() {
        let sealed = aead_encrypt(&[0u8; 1000], &key(3)).unwrap();
        // plaintext (1000) + tag (16) + nonce (24) = 1040
        assert_eq!(sealed.len(), 1000 + TAG_SIZE + NONCE_SIZE);
    }

    #[test]
    fn test_nonce_is_suffix() {
        let k = key(4);
        let sealed = aead_encrypt(b"suffix", &k).unwrap();
        let (ciphertext, nonce) = sealed.split_at(sealed.len() - NONCE_SIZE);

        // Moving the nonce to the front must not decrypt.
        let mut prefixed = nonce.to_vec();
        prefixed.extend_from_slice(ciphertext);
        assert!(aead_decrypt(&prefixed, &k).is_err());
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let sealed = aead_encrypt(b"secret data", &key(5)).unwrap();
        assert!(matches!(
            aead_decrypt(&sealed, &key(6)),
            Err(KeyspaceError::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_and_nonce() {
        let k = key(7);
        let sealed = aead_encrypt(b"secret data", &k).unwrap();

        let mut body = sealed.clone();
        body[0] ^= 0xFF;
        assert!(matches!(
            aead_decrypt(&body, &k),
            Err(KeyspaceError::AuthenticationFailure(_))
        ));

        let mut nonce = sealed.clone();
        let last = nonce.len() - 1;
        nonce[last] ^= 0x01;
        assert!(matches!(
            aead_decrypt(&nonce, &k),
            Err(KeyspaceError::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_too_short() {
        let result = aead_decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1], &key(8));
        assert!(matches!(result, Err(KeyspaceError::Decode(_))));
    }
}
