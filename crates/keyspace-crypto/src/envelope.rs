//! Whole-record encryption and decryption of vault items.
//!
//! Records are transformed on a copy and returned only when every sensitive
//! field succeeded; a failure never leaves a half-sealed record behind.

use keyspace_core::config::MissingFieldPolicy;
use keyspace_core::types::{RawServerItem, ServerVaultItem, VaultItem};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use tracing::{debug, warn};

use crate::codec::{decrypt_string, encrypt_string};
use crate::keys::SymmetricKey;
use crate::schema::{EnvelopeSchema, Slot};

/// Encrypt every sensitive field of `item`.
///
/// Required fields are encrypted even when empty. Absent optional fields
/// stay absent, and empty ones stay empty unless the slot is
/// [`Slot::Present`].
pub fn seal_item(item: &VaultItem, key: &SymmetricKey) -> KeyspaceResult<VaultItem> {
    let mut sealed = item.clone();
    for field in sealed.sensitive_fields() {
        let value = match field.slot {
            Slot::Required(value) | Slot::Present(Some(value)) => value,
            Slot::NonEmpty(value) | Slot::Optional(Some(value)) if !value.is_empty() => value,
            _ => continue,
        };
        *value = encrypt_string(value, key)?;
    }
    Ok(sealed)
}

/// Decrypt every sensitive field of `item`.
///
/// Only an empty [`Slot::Required`] ciphertext consults `policy`: `Reject`
/// fails with [`KeyspaceError::MissingField`], `Tolerate` leaves the field
/// empty. Every other slot keeps an empty value as it is, the way encoders
/// that skip empty values write it.
pub fn open_item(
    item: &VaultItem,
    key: &SymmetricKey,
    policy: MissingFieldPolicy,
) -> KeyspaceResult<VaultItem> {
    let mut opened = item.clone();
    let id = opened.id().to_string();
    for field in opened.sensitive_fields() {
        let value = match field.slot {
            Slot::Required(value) if value.is_empty() => match policy {
                MissingFieldPolicy::Reject => {
                    return Err(KeyspaceError::MissingField {
                        item_id: id,
                        field: field.path,
                    })
                }
                MissingFieldPolicy::Tolerate => {
                    debug!(item_id = %id, field = %field.path, "empty sensitive field tolerated");
                    continue;
                }
            },
            Slot::Required(value)
            | Slot::NonEmpty(value)
            | Slot::Optional(Some(value))
            | Slot::Present(Some(value)) => value,
            Slot::Optional(None) | Slot::Present(None) => continue,
        };
        if value.is_empty() {
            continue;
        }

        *value = decrypt_string(value, key).map_err(|e| {
            debug!(item_id = %id, field = %field.path, error = %e, "field decryption failed");
            e
        })?;
    }
    Ok(opened)
}

pub fn seal_server_item(
    item: &ServerVaultItem,
    key: &SymmetricKey,
) -> KeyspaceResult<ServerVaultItem> {
    Ok(ServerVaultItem {
        id: item.id.clone(),
        vault: item.vault,
        data: seal_item(&item.data, key)?,
    })
}

/// Check the type tag of a raw server record and decrypt it.
pub fn open_server_item(
    raw: RawServerItem,
    key: &SymmetricKey,
    policy: MissingFieldPolicy,
) -> KeyspaceResult<ServerVaultItem> {
    let sealed = VaultItem::from_value(raw.data)?;
    Ok(ServerVaultItem {
        id: raw.id,
        vault: raw.vault,
        data: open_item(&sealed, key, policy)?,
    })
}

/// A record that could not be opened.
#[derive(Debug)]
pub struct ItemFailure {
    pub id: String,
    pub error: KeyspaceError,
}

/// Result of opening a full vault listing.
#[derive(Debug, Default)]
pub struct VaultLoad {
    pub items: Vec<ServerVaultItem>,
    pub failures: Vec<ItemFailure>,
}

/// Open every record independently. A corrupted record is reported in
/// `failures` and never blocks the rest of the vault.
pub fn open_vault(
    raw: Vec<RawServerItem>,
    key: &SymmetricKey,
    policy: MissingFieldPolicy,
) -> VaultLoad {
    let total = raw.len();
    let mut load = VaultLoad::default();

    for item in raw {
        let id = item.id.clone();
        match open_server_item(item, key, policy) {
            Ok(opened) => load.items.push(opened),
            Err(error) => {
                warn!(item_id = %id, error = %error, "skipping vault item");
                load.failures.push(ItemFailure { id, error });
            }
        }
    }

    debug!(
        total,
        opened = load.items.len(),
        failed = load.failures.len(),
        "vault opened"
    );
    load
}
