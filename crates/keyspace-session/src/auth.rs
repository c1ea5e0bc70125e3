//! Per-request session authentication.
//!
//! Every API request carries a freshly fetched keyauth token signed with the
//! user's long-term signing key. Nothing is cached between requests.

use keyspace_core::types::KeyauthToken;
use keyspace_core::KeyspaceResult;
use keyspace_crypto::keys::KeyRing;
use keyspace_crypto::{sign, to_hex};

use crate::transport::TokenService;

pub const PUBLIC_KEY_HEADER: &str = "public-key";
pub const SIGNED_TOKEN_HEADER: &str = "signed-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    /// hex(keyring.publicKey)
    pub public_key: String,
    /// hex(signature || token JSON)
    pub signed_token: String,
}

impl AuthHeaders {
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(PUBLIC_KEY_HEADER, &self.public_key)
            .header(SIGNED_TOKEN_HEADER, &self.signed_token)
    }
}

/// Sign `token`'s JSON serialization with the keyring's private key.
pub fn sign_token(token: &KeyauthToken, keyring: &KeyRing) -> KeyspaceResult<AuthHeaders> {
    let signed = sign(token.to_json()?.as_bytes(), &keyring.private_key)?;
    Ok(AuthHeaders {
        public_key: to_hex(&keyring.public_key),
        signed_token: to_hex(&signed),
    })
}

pub async fn auth_headers(
    tokens: &dyn TokenService,
    keyring: &KeyRing,
) -> KeyspaceResult<AuthHeaders> {
    let token = tokens.fetch_token().await?;
    sign_token(&token, keyring)
}
