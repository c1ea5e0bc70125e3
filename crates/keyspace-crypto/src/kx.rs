//! X25519 key exchange, wire-compatible with libsodium `crypto_kx`.
//!
//! ```text
//! q      = X25519(own_secret, peer_public)
//! h      = BLAKE2b-512(q || client_pk || server_pk)
//! client: rx = h[0..32], tx = h[32..64]
//! server: tx = h[0..32], rx = h[32..64]
//! ```
//!
//! Each side's `tx` equals the other side's `rx`. Swapping roles on one side
//! breaks interoperability.

use blake2::{Blake2b512, Digest};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::codec::to_hex;
use crate::keys::{fill_random, SymmetricKey};
use crate::KEY_SIZE;

/// A key-exchange keypair. The pairing client generates a fresh one per QR
/// cycle; the secret half is zeroized on drop and never persisted.
pub struct KxKeyPair {
    public: PublicKey,
    secret: StaticSecret,
}

impl KxKeyPair {
    pub fn generate() -> KeyspaceResult<Self> {
        let mut seed = Zeroizing::new([0u8; KEY_SIZE]);
        fill_random(&mut seed[..])?;
        Ok(Self::from_secret_bytes(*seed))
    }

    pub fn from_secret_bytes(secret: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { public, secret }
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.public.as_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        to_hex(self.public.as_bytes())
    }
}

impl std::fmt::Debug for KxKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KxKeyPair")
            .field("public", &self.public_key_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Which side of `crypto_kx` the local keypair plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KxRole {
    Client,
    Server,
}

/// Directional session keys: `rx` decrypts inbound data, `tx` encrypts outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub rx: SymmetricKey,
    pub tx: SymmetricKey,
}

pub fn session_keys(
    role: KxRole,
    own: &KxKeyPair,
    peer_public: &[u8],
) -> KeyspaceResult<SessionKeys> {
    let peer: [u8; KEY_SIZE] = peer_public.try_into().map_err(|_| KeyspaceError::InvalidKey {
        expected: KEY_SIZE,
        actual: peer_public.len(),
    })?;
    let peer = PublicKey::from(peer);

    let shared = own.secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(KeyspaceError::AuthenticationFailure(
            "key exchange produced a non-contributory shared secret".into(),
        ));
    }

    let (client_pk, server_pk) = match role {
        KxRole::Client => (own.public.as_bytes(), peer.as_bytes()),
        KxRole::Server => (peer.as_bytes(), own.public.as_bytes()),
    };

    let mut hasher = Blake2b512::new();
    hasher.update(shared.as_bytes());
    hasher.update(client_pk);
    hasher.update(server_pk);
    let digest = hasher.finalize();

    let first = SymmetricKey::from_slice(&digest[..KEY_SIZE])?;
    let second = SymmetricKey::from_slice(&digest[KEY_SIZE..])?;

    Ok(match role {
        KxRole::Client => SessionKeys {
            rx: first,
            tx: second,
        },
        KxRole::Server => SessionKeys {
            rx: second,
            tx: first,
        },
    })
}

/// libsodium `crypto_kx_client_session_keys`.
pub fn client_session_keys(own: &KxKeyPair, server_public: &[u8]) -> KeyspaceResult<SessionKeys> {
    session_keys(KxRole::Client, own, server_public)
}

/// libsodium `crypto_kx_server_session_keys`.
pub fn server_session_keys(own: &KxKeyPair, client_public: &[u8]) -> KeyspaceResult<SessionKeys> {
    session_keys(KxRole::Server, own, client_public)
}

/// Session keys for the device being paired.
///
/// The QR-displaying side answers the scanning device in the `crypto_kx`
/// server role, so its `rx` key opens what the device sealed with its `tx`.
pub fn derive_pairing_keys(
    ephemeral: &KxKeyPair,
    device_public: &[u8],
) -> KeyspaceResult<SessionKeys> {
    server_session_keys(ephemeral, device_public)
}
