//! keyspace-crypto: client-side encryption for the Keyspace vault
//!
//! Field envelope: XChaCha20-Poly1305 with a random 192-bit nonce appended
//! to the ciphertext, hex-encoded for transport.
//!
//! Key hierarchy:
//! ```text
//! Ephemeral X25519 keypair (per pairing cycle, crypto_kx compatible)
//!   └── Session rx key (BLAKE2b-512 split) ── decrypts the transferred KeyRing
//!         ├── symmetricKey ── vault field envelopes
//!         └── privateKey   ── Ed25519 signatures over keyauth tokens
//! ```

pub mod aead;
pub mod codec;
pub mod envelope;
pub mod keys;
pub mod kx;
pub mod schema;
pub mod sign;

pub use aead::{aead_decrypt, aead_encrypt};
pub use codec::{decrypt_string, encrypt_string, from_hex, from_hex_exact, to_hex};
pub use envelope::{
    open_item, open_server_item, open_vault, seal_item, seal_server_item, ItemFailure, VaultLoad,
};
pub use keys::{HexKeyRing, KeyRing, SymmetricKey, UserSession};
pub use kx::{client_session_keys, derive_pairing_keys, server_session_keys, KxKeyPair, SessionKeys};
pub use schema::{EnvelopeSchema, SensitiveField, Slot};
pub use sign::{sign, verify};

/// Size of a symmetric or X25519 key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
