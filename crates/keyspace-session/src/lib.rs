//! keyspace-session: everything between a QR code on screen and a signed
//! vault request.
//!
//! Pairing flow:
//!   1. Fetch a keyauth token, derive the route id, show the QR payload
//!   2. Listen on `wss://<api_host>/ws/keyroute/<routeId>` for the device
//!   3. Derive `crypto_kx` session keys, decrypt the transferred keyring
//!   4. Persist the session through a [`store::SessionStore`]
//!
//! Afterwards [`vault::VaultClient`] signs every request with a fresh token
//! ([`auth`]) and seals/opens records with the keyring's symmetric key.

pub mod auth;
pub mod handshake;
pub mod http;
pub mod keyroute;
pub mod store;
pub mod transport;
pub mod vault;
pub mod ws;

pub use auth::{auth_headers, AuthHeaders};
pub use handshake::{
    HandshakeCommand, HandshakeEvent, HandshakeState, HandshakeStatus, KeyrouteDriver,
    KeyGen, KeyrouteMachine, ReconnectPolicy,
};
pub use http::HttpTokenService;
pub use keyroute::{keyroute_login, parse_route_frame, route_id};
pub use store::{
    FileSessionStore, MemorySessionStore, SessionCommand, SessionResponse, SessionStore,
    StoredSession,
};
pub use transport::{KeyrouteConnector, KeyrouteStream, TokenService};
pub use vault::{MutationResponse, VaultClient};
pub use ws::WsConnector;
