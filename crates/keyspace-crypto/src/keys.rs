//! Key material: vault symmetric key, user keyring, and the logged-in session.

use keyspace_core::{KeyspaceError, KeyspaceResult};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{from_hex, to_hex};
use crate::KEY_SIZE;

/// Fill `buf` from the OS random source.
///
/// Any RNG failure is reported as [`KeyspaceError::EntropyFailure`], which
/// callers treat as fatal.
pub fn fill_random(buf: &mut [u8]) -> KeyspaceResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| KeyspaceError::EntropyFailure(e.to_string()))
}

/// A 256-bit XChaCha20-Poly1305 key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from an arbitrary byte slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> KeyspaceResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KeyspaceError::InvalidKey {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn generate() -> KeyspaceResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        fill_random(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Long-term identity material of a user, as transferred during pairing.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyRing {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
    pub symmetric_key: Vec<u8>,
}

impl KeyRing {
    /// The vault encryption key. Fails if the keyring carries a key of the wrong size.
    pub fn vault_key(&self) -> KeyspaceResult<SymmetricKey> {
        SymmetricKey::from_slice(&self.symmetric_key)
    }

    /// Parse the JSON keyring document (`{privateKey, publicKey, symmetricKey}`
    /// as hex strings) carried inside a pairing payload.
    pub fn from_json(json: &[u8]) -> KeyspaceResult<Self> {
        let doc: HexKeyRing = serde_json::from_slice(json)?;
        doc.decode()
    }

    pub fn to_hex(&self) -> HexKeyRing {
        HexKeyRing {
            private_key: to_hex(&self.private_key),
            public_key: to_hex(&self.public_key),
            symmetric_key: to_hex(&self.symmetric_key),
        }
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("public_key", &to_hex(&self.public_key))
            .field("private_key", &"[REDACTED]")
            .field("symmetric_key", &"[REDACTED]")
            .finish()
    }
}

/// Hex-encoded keyring, the form used on the wire and in the session store.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct HexKeyRing {
    pub private_key: String,
    pub public_key: String,
    pub symmetric_key: String,
}

impl HexKeyRing {
    /// Decode all three fields; a single malformed field fails the whole keyring.
    pub fn decode(&self) -> KeyspaceResult<KeyRing> {
        Ok(KeyRing {
            private_key: from_hex(&self.private_key)?,
            public_key: from_hex(&self.public_key)?,
            symmetric_key: from_hex(&self.symmetric_key)?,
        })
    }
}

impl std::fmt::Debug for HexKeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexKeyRing")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// A logged-in user: present with a complete keyring, or not at all.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UserSession {
    pub email: String,
    pub keyring: KeyRing,
}
