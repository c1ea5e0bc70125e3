//! Keyroute pairing payloads: route ids, QR requests, channel frames and
//! recovery of the transferred keyring.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyspace_core::types::{KeyauthToken, KeyrouteInitRequest, KeyroutePayload};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use keyspace_crypto::keys::{KeyRing, UserSession};
use keyspace_crypto::{aead_decrypt, derive_pairing_keys, from_hex, verify, KxKeyPair};
use serde::Deserialize;
use tracing::debug;

/// Intent carried in every QR payload produced by this client.
pub const LOGIN_INTENT: &str = "login";

/// Channel address for a token: base64 of its UTF-8 JSON serialization.
pub fn route_id(token: &KeyauthToken) -> KeyspaceResult<String> {
    Ok(STANDARD.encode(token.to_json()?))
}

pub fn init_request(
    token: &KeyauthToken,
    keypair: &KxKeyPair,
) -> KeyspaceResult<KeyrouteInitRequest> {
    Ok(KeyrouteInitRequest {
        token: token.to_json()?,
        public_key: keypair.public_key_hex(),
        intent: LOGIN_INTENT.to_string(),
    })
}

#[derive(Deserialize)]
struct RouteFrame {
    message: Option<RouteMessage>,
}

#[derive(Deserialize)]
struct RouteMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<serde_json::Value>,
}

/// Extract a pairing payload from a channel text frame.
///
/// Only `{"message": {"type": "data", "message": <payload>}}` yields a
/// payload; every other shape (presence notices, malformed JSON) is `None`.
pub fn parse_route_frame(text: &str) -> Option<KeyroutePayload> {
    let frame: RouteFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable keyroute frame");
            return None;
        }
    };
    let message = frame.message?;
    if message.kind.as_deref() != Some("data") {
        return None;
    }
    let payload = match message.message? {
        serde_json::Value::String(inner) => serde_json::from_str(&inner),
        value => serde_json::from_value(value),
    };
    match payload {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(error = %e, "ignoring malformed keyroute payload");
            None
        }
    }
}

/// Parse the decrypted keyring document. Senders transmit either the JSON
/// object itself or its base64 encoding.
pub fn decode_keyring_document(plaintext: &[u8]) -> KeyspaceResult<KeyRing> {
    let trimmed = plaintext.trim_ascii();
    if trimmed.first() == Some(&b'{') {
        return KeyRing::from_json(trimmed);
    }
    let json = STANDARD
        .decode(trimmed)
        .map_err(|e| KeyspaceError::Decode(format!("keyring document: {e}")))?;
    KeyRing::from_json(&json)
}

/// Recover the user session carried by a pairing payload.
///
/// `expected_token`, when given, requires `signedToken` to verify under the
/// recovered public key and to embed exactly that token's JSON.
pub fn keyroute_login(
    payload: &KeyroutePayload,
    keypair: &KxKeyPair,
    expected_token: Option<&KeyauthToken>,
) -> KeyspaceResult<UserSession> {
    if payload.email.is_empty() {
        return Err(KeyspaceError::Decode("pairing payload has no email".into()));
    }

    let device_public = from_hex(&payload.dh_public_key)?;
    let keys = derive_pairing_keys(keypair, &device_public)?;
    let sealed = from_hex(&payload.keyring_data)?;
    let plaintext = aead_decrypt(&sealed, &keys.rx)?;
    let keyring = decode_keyring_document(&plaintext)?;

    if let Some(token) = expected_token {
        let signed = payload.signed_token.as_deref().ok_or_else(|| {
            KeyspaceError::AuthenticationFailure("pairing payload has no signed token".into())
        })?;
        let message = verify(&from_hex(signed)?, &keyring.public_key)?;
        if message != token.to_json()?.as_bytes() {
            return Err(KeyspaceError::AuthenticationFailure(
                "signed token does not match the displayed token".into(),
            ));
        }
    }

    Ok(UserSession {
        email: payload.email.clone(),
        keyring,
    })
}
