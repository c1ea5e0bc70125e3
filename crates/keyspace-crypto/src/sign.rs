//! Ed25519 signatures in libsodium combined mode (`signature || message`).

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use zeroize::Zeroizing;

use crate::keys::fill_random;

pub const SIGNATURE_SIZE: usize = 64;
pub const SECRET_KEY_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Load a signing key from a 64-byte libsodium secret key (`seed || public`)
/// or a bare 32-byte seed.
fn signing_key(private_key: &[u8]) -> KeyspaceResult<SigningKey> {
    match private_key.len() {
        32 => {
            let mut seed = Zeroizing::new([0u8; 32]);
            seed.copy_from_slice(private_key);
            Ok(SigningKey::from_bytes(&seed))
        }
        SECRET_KEY_SIZE => {
            let mut pair = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
            pair.copy_from_slice(private_key);
            SigningKey::from_keypair_bytes(&pair).map_err(|e| {
                KeyspaceError::Decode(format!("secret key halves do not match: {e}"))
            })
        }
        actual => Err(KeyspaceError::InvalidKey {
            expected: SECRET_KEY_SIZE,
            actual,
        }),
    }
}

/// Generate a signing keypair, returned as (64-byte secret key, 32-byte public key).
pub fn generate_signing_keypair() -> KeyspaceResult<(Vec<u8>, Vec<u8>)> {
    let mut seed = Zeroizing::new([0u8; 32]);
    fill_random(&mut seed[..])?;
    let key = SigningKey::from_bytes(&seed);
    let pair = Zeroizing::new(key.to_keypair_bytes());
    Ok((
        pair.to_vec(),
        key.verifying_key().to_bytes().to_vec(),
    ))
}

/// Sign `message`, returning `signature || message`.
pub fn sign(message: &[u8], private_key: &[u8]) -> KeyspaceResult<Vec<u8>> {
    let key = signing_key(private_key)?;
    let signature = key.sign(message);
    let mut signed = Vec::with_capacity(SIGNATURE_SIZE + message.len());
    signed.extend_from_slice(&signature.to_bytes());
    signed.extend_from_slice(message);
    Ok(signed)
}

/// Verify a combined-mode signed message and return the embedded message.
pub fn verify(signed: &[u8], public_key: &[u8]) -> KeyspaceResult<Vec<u8>> {
    if signed.len() < SIGNATURE_SIZE {
        return Err(KeyspaceError::AuthenticationFailure(format!(
            "signed message too short: {} bytes",
            signed.len()
        )));
    }
    let public: [u8; PUBLIC_KEY_SIZE] =
        public_key.try_into().map_err(|_| KeyspaceError::InvalidKey {
            expected: PUBLIC_KEY_SIZE,
            actual: public_key.len(),
        })?;
    let verifying = VerifyingKey::from_bytes(&public)
        .map_err(|e| KeyspaceError::AuthenticationFailure(format!("invalid public key: {e}")))?;

    let (sig_bytes, message) = signed.split_at(SIGNATURE_SIZE);
    let mut sig = [0u8; SIGNATURE_SIZE];
    sig.copy_from_slice(sig_bytes);
    let signature = Signature::from_bytes(&sig);

    verifying
        .verify_strict(message, &signature)
        .map_err(|_| KeyspaceError::AuthenticationFailure("signature mismatch".into()))?;
    Ok(message.to_vec())
}
