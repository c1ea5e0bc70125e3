//! Seams between the pairing logic and the network.
//!
//! The handshake driver only talks to these traits; production wiring uses
//! [`crate::http::HttpTokenService`] and [`crate::ws::WsConnector`], tests
//! plug in in-memory fakes.

use async_trait::async_trait;
use keyspace_core::types::KeyauthToken;
use keyspace_core::KeyspaceResult;

/// Source of short-lived keyauth tokens.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Fails with `TokenServiceUnavailable` when no token could be obtained.
    async fn fetch_token(&self) -> KeyspaceResult<KeyauthToken>;
}

/// Opens the keyroute channel for a route id.
#[async_trait]
pub trait KeyrouteConnector: Send + Sync {
    async fn connect(&self, route_id: &str) -> KeyspaceResult<Box<dyn KeyrouteStream>>;
}

/// An open keyroute channel.
#[async_trait]
pub trait KeyrouteStream: Send {
    /// Next text frame, or `Ok(None)` once the remote side closed the channel.
    async fn next_frame(&mut self) -> KeyspaceResult<Option<String>>;
}
