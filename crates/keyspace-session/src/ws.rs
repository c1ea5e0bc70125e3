//! Keyroute channel over a TLS websocket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use keyspace_core::config::ApiConfig;
use keyspace_core::{KeyspaceError, KeyspaceResult};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::transport::{KeyrouteConnector, KeyrouteStream};

/// Connects to `wss://<api_host>/ws/keyroute/<routeId>`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    api: ApiConfig,
}

impl WsConnector {
    pub fn new(api: ApiConfig) -> Self {
        Self { api }
    }
}

#[async_trait]
impl KeyrouteConnector for WsConnector {
    async fn connect(&self, route_id: &str) -> KeyspaceResult<Box<dyn KeyrouteStream>> {
        let url = self.api.keyroute_url(route_id);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| KeyspaceError::Channel(format!("connect {}: {e}", self.api.api_host)))?;
        debug!(host = %self.api.api_host, "keyroute channel connected");
        Ok(Box::new(WsStream { ws }))
    }
}

pub struct WsStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl KeyrouteStream for WsStream {
    async fn next_frame(&mut self) -> KeyspaceResult<Option<String>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        debug!(error = %e, "keyroute pong failed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(KeyspaceError::Channel(e.to_string())),
                Some(Ok(_)) => continue,
            }
        }
    }
}
