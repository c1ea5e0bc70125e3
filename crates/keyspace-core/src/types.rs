use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{KeyspaceError, KeyspaceResult};

// ── Keyroute pairing ──────────────────────────────────────────────────────────

/// Short-lived token issued by the keyauth service.
///
/// Field order matches the service response: the JSON serialization of this
/// struct is what gets signed and what the route id is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyauthToken {
    pub expiry: serde_json::Number,
    pub signed_token: String,
    pub tagline: String,
    pub token: String,
    pub version: String,
}

impl KeyauthToken {
    /// Compact JSON text, identical to what the token service sent.
    pub fn to_json(&self) -> KeyspaceResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload rendered into the login QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyrouteInitRequest {
    /// JSON serialization of the [`KeyauthToken`]
    pub token: String,
    /// Hex-encoded ephemeral X25519 public key
    pub public_key: String,
    pub intent: String,
}

/// Message pushed by the paired device over the keyroute channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyroutePayload {
    /// Hex of `AEAD(keyring JSON) || nonce`
    pub keyring_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_token: Option<String>,
    /// Hex-encoded X25519 public key of the paired device
    pub dh_public_key: String,
    pub email: String,
}

// ── Vault items ───────────────────────────────────────────────────────────────

/// Wire tag of a vault record (`"type"` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "login")]
    Login,
    #[serde(rename = "note")]
    Note,
    #[serde(rename = "card")]
    PaymentCard,
    #[serde(rename = "tag")]
    Tag,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        ItemType::Login,
        ItemType::Note,
        ItemType::PaymentCard,
        ItemType::Tag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Login => "login",
            ItemType::Note => "note",
            ItemType::PaymentCard => "card",
            ItemType::Tag => "tag",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural fields shared by every record type. Never encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    pub id: String,
    #[serde(default)]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub frequency_accessed: u64,
    pub date_created: i64,
    pub date_modified: i64,
    #[serde(default)]
    pub favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
    /// UI hint only
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedPassword {
    pub password: String,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totp {
    pub secret: String,
    #[serde(default)]
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub password_history: Vec<ArchivedPassword>,
    #[serde(default)]
    pub totp: Option<Totp>,
    #[serde(default)]
    pub site_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginItem {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub login_data: LoginData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCard {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// `None` means no PIN is set; `Some("")` is an empty PIN and is still encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub card_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cardholder_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expiry: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub security_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default)]
    pub rfid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureNote {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A vault record. Closed set: adding a variant forces every `match` in the
/// envelope engine to be updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultItem {
    #[serde(rename = "login")]
    Login(LoginItem),
    #[serde(rename = "note")]
    Note(SecureNote),
    #[serde(rename = "card")]
    PaymentCard(PaymentCard),
    #[serde(rename = "tag")]
    Tag(Tag),
}

impl VaultItem {
    /// Parse a record from untyped JSON, rejecting unknown type tags
    /// explicitly instead of letting them pass through.
    pub fn from_value(value: serde_json::Value) -> KeyspaceResult<Self> {
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| KeyspaceError::Decode("vault item has no \"type\" tag".into()))?;
        if ItemType::from_tag(tag).is_none() {
            return Err(KeyspaceError::UnknownItemType(tag.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            VaultItem::Login(_) => ItemType::Login,
            VaultItem::Note(_) => ItemType::Note,
            VaultItem::PaymentCard(_) => ItemType::PaymentCard,
            VaultItem::Tag(_) => ItemType::Tag,
        }
    }

    pub fn meta(&self) -> &ItemMeta {
        match self {
            VaultItem::Login(i) => &i.meta,
            VaultItem::Note(i) => &i.meta,
            VaultItem::PaymentCard(i) => &i.meta,
            VaultItem::Tag(i) => &i.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ItemMeta {
        match self {
            VaultItem::Login(i) => &mut i.meta,
            VaultItem::Note(i) => &mut i.meta,
            VaultItem::PaymentCard(i) => &mut i.meta,
            VaultItem::Tag(i) => &mut i.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }
}

/// A record as stored by the vault API, with typed (encrypted or decrypted) data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVaultItem {
    pub id: String,
    pub vault: i64,
    pub data: VaultItem,
}

/// A record as received from the vault API before its type tag is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawServerItem {
    pub id: String,
    pub vault: i64,
    pub data: serde_json::Value,
}

/// Current unix time in seconds, as used for `dateCreated` / `dateModified`.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
