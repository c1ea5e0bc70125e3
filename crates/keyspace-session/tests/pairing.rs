//! End-to-end pairing through the async driver with in-memory token service
//! and keyroute channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use keyspace_core::config::KeyspaceConfig;
use keyspace_core::types::{KeyauthToken, KeyrouteInitRequest};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use keyspace_crypto::{aead_encrypt, client_session_keys, from_hex, to_hex, KxKeyPair};
use keyspace_session::store::restore_session;
use keyspace_session::{
    route_id, HandshakeState, HandshakeStatus, KeyGen, KeyrouteConnector, KeyrouteDriver,
    KeyrouteMachine, KeyrouteStream, MemorySessionStore, ReconnectPolicy, SessionStore,
    TokenService,
};
use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(20);

fn token() -> KeyauthToken {
    serde_json::from_value(json!({
        "expiry": 1_700_000_060,
        "signedToken": "ab",
        "tagline": "keyauth",
        "token": "t0k",
        "version": "1"
    }))
    .unwrap()
}

struct FixedTokens;

#[async_trait]
impl TokenService for FixedTokens {
    async fn fetch_token(&self) -> KeyspaceResult<KeyauthToken> {
        Ok(token())
    }
}

struct DownTokens;

#[async_trait]
impl TokenService for DownTokens {
    async fn fetch_token(&self) -> KeyspaceResult<KeyauthToken> {
        Err(KeyspaceError::TokenServiceUnavailable("503".into()))
    }
}

/// Every connection reads from the same frame queue.
struct FakeConnector {
    frames: Arc<Mutex<mpsc::Receiver<String>>>,
    routes: StdMutex<Vec<String>>,
}

impl FakeConnector {
    fn new(frames: mpsc::Receiver<String>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(frames)),
            routes: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl KeyrouteConnector for FakeConnector {
    async fn connect(&self, route_id: &str) -> KeyspaceResult<Box<dyn KeyrouteStream>> {
        self.routes.lock().unwrap().push(route_id.to_string());
        Ok(Box::new(FakeStream {
            frames: Arc::clone(&self.frames),
        }))
    }
}

struct FakeStream {
    frames: Arc<Mutex<mpsc::Receiver<String>>>,
}

#[async_trait]
impl KeyrouteStream for FakeStream {
    async fn next_frame(&mut self) -> KeyspaceResult<Option<String>> {
        Ok(self.frames.lock().await.recv().await)
    }
}

/// Hands out `drops` connections that close immediately, then behaves like
/// the wrapped connector.
struct DroppingConnector {
    drops: AtomicU32,
    inner: FakeConnector,
}

#[async_trait]
impl KeyrouteConnector for DroppingConnector {
    async fn connect(&self, route_id: &str) -> KeyspaceResult<Box<dyn KeyrouteStream>> {
        let dropping = self
            .drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropping {
            self.inner.routes.lock().unwrap().push(route_id.to_string());
            return Ok(Box::new(ClosedStream));
        }
        self.inner.connect(route_id).await
    }
}

struct ClosedStream;

#[async_trait]
impl KeyrouteStream for ClosedStream {
    async fn next_frame(&mut self) -> KeyspaceResult<Option<String>> {
        Ok(None)
    }
}

struct RefusingConnector;

#[async_trait]
impl KeyrouteConnector for RefusingConnector {
    async fn connect(&self, _route_id: &str) -> KeyspaceResult<Box<dyn KeyrouteStream>> {
        Err(KeyspaceError::Channel("connection refused".into()))
    }
}

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(5),
        max: Duration::from_millis(20),
        max_failures: 3,
    }
}

fn driver(
    keygen: Option<KeyGen>,
    tokens: Arc<dyn TokenService>,
    connector: Arc<dyn KeyrouteConnector>,
) -> KeyrouteDriver {
    let config = KeyspaceConfig::default();
    let machine = match keygen {
        Some(keygen) => KeyrouteMachine::with_keygen(&config.keyroute, keygen),
        None => KeyrouteMachine::new(&config.keyroute),
    };
    KeyrouteDriver::with_machine(machine, policy(), tokens, connector).with_tick(TICK)
}

async fn wait_for(
    status: &mut watch::Receiver<HandshakeStatus>,
    pred: impl Fn(&HandshakeStatus) -> bool,
) -> HandshakeStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = status.borrow_and_update();
                if pred(&*current) {
                    return (*current).clone();
                }
            }
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("handshake status never matched")
}

/// What the phone does after scanning: derive client-role keys against the
/// displayed public key and seal the keyring document.
fn device_frame(qr: &KeyrouteInitRequest, device: &KxKeyPair) -> String {
    let extension_public = from_hex(&qr.public_key).unwrap();
    let keys = client_session_keys(device, &extension_public).unwrap();
    let document = br#"{"privateKey":"aa","publicKey":"bb","symmetricKey":"cc"}"#;
    json!({
        "message": {
            "type": "data",
            "message": {
                "keyringData": to_hex(&aead_encrypt(document, &keys.tx).unwrap()),
                "dhPublicKey": device.public_key_hex(),
                "email": "user@example.com"
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn pairing_establishes_and_persists_session() {
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let connector = Arc::new(FakeConnector::new(frames_rx));
    let store = Arc::new(MemorySessionStore::new());

    let driver = driver(None, Arc::new(FixedTokens), connector.clone())
        .with_store(store.clone() as Arc<dyn SessionStore>);
    let mut status = driver.subscribe();
    let run = tokio::spawn(driver.run(CancellationToken::new()));

    let shown = wait_for(&mut status, |s| s.state == HandshakeState::ChannelOpen).await;
    let qr = shown.qr.expect("QR payload while channel is open");
    assert_eq!(qr.intent, "login");
    assert_eq!(qr.token, token().to_json().unwrap());

    let device = KxKeyPair::from_secret_bytes([0x77; 32]);
    frames_tx
        .send(json!({"message": {"type": "joined"}}).to_string())
        .await
        .unwrap();
    frames_tx.send(device_frame(&qr, &device)).await.unwrap();

    let session = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .expect("session established");

    assert_eq!(session.email, "user@example.com");
    assert_eq!(session.keyring.private_key, vec![0xaa]);
    assert_eq!(session.keyring.public_key, vec![0xbb]);
    assert_eq!(session.keyring.symmetric_key, vec![0xcc]);

    assert_eq!(restore_session(store.as_ref()).await.unwrap(), Some(session));
    assert_eq!(
        connector.routes.lock().unwrap()[0],
        route_id(&token()).unwrap()
    );
}

#[tokio::test]
async fn dropped_channel_reconnects_on_same_route() {
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let connector = Arc::new(DroppingConnector {
        drops: AtomicU32::new(1),
        inner: FakeConnector::new(frames_rx),
    });

    let driver = driver(None, Arc::new(FixedTokens), connector.clone());
    let mut status = driver.subscribe();
    let run = tokio::spawn(driver.run(CancellationToken::new()));

    let shown = wait_for(&mut status, |s| s.qr.is_some()).await;
    let qr = shown.qr.unwrap();
    let device = KxKeyPair::from_secret_bytes([0x31; 32]);
    frames_tx.send(device_frame(&qr, &device)).await.unwrap();

    let session = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .expect("session established after reconnect");
    assert_eq!(session.email, "user@example.com");

    let routes = connector.inner.routes.lock().unwrap().clone();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0], routes[1]);
    assert_eq!(routes[0], route_id(&token()).unwrap());

    let last = (*status.borrow()).clone();
    assert_eq!(last.generation, 1);
    assert_eq!(last.state, HandshakeState::SessionEstablished);
}

#[tokio::test]
async fn payload_for_previous_cycle_is_rejected() {
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let connector = Arc::new(FakeConnector::new(frames_rx));

    let mut seed = 0u8;
    let keygen: KeyGen = Box::new(move || {
        seed += 1;
        Ok(KxKeyPair::from_secret_bytes([seed; 32]))
    });

    let driver = driver(Some(keygen), Arc::new(FixedTokens), connector);
    let events = driver.events();
    let mut status = driver.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(driver.run(cancel.clone()));

    let first = wait_for(&mut status, |s| s.state == HandshakeState::ChannelOpen).await;
    let old_qr = first.qr.unwrap();

    events
        .send(keyspace_session::HandshakeEvent::Retry)
        .await
        .unwrap();
    let second = wait_for(&mut status, |s| {
        s.generation == 2 && s.state == HandshakeState::ChannelOpen
    })
    .await;
    assert_ne!(second.qr.unwrap().public_key, old_qr.public_key);

    let device = KxKeyPair::from_secret_bytes([0x55; 32]);
    frames_tx.send(device_frame(&old_qr, &device)).await.unwrap();

    let failed = wait_for(&mut status, |s| matches!(s.state, HandshakeState::Error(_))).await;
    assert!(failed.qr.is_none());

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn token_outage_surfaces_error_until_cancelled() {
    let (_frames_tx, frames_rx) = mpsc::channel(1);
    let driver = driver(
        None,
        Arc::new(DownTokens),
        Arc::new(FakeConnector::new(frames_rx)),
    );
    let mut status = driver.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(driver.run(cancel.clone()));

    let failed = wait_for(&mut status, |s| matches!(s.state, HandshakeState::Error(_))).await;
    assert_eq!(
        failed.state,
        HandshakeState::Error("Keyspace servers are down".into())
    );

    cancel.cancel();
    assert!(run.await.unwrap().unwrap().is_none());
}

#[tokio::test]
async fn unreachable_channel_fails_cycle() {
    let driver = driver(None, Arc::new(FixedTokens), Arc::new(RefusingConnector));
    let mut status = driver.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(driver.run(cancel.clone()));

    let failed = wait_for(&mut status, |s| matches!(s.state, HandshakeState::Error(_))).await;
    let HandshakeState::Error(reason) = failed.state else {
        unreachable!();
    };
    assert!(reason.contains("connection refused"));

    cancel.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn entropy_failure_aborts_driver() {
    let keygen: KeyGen = Box::new(|| Err(KeyspaceError::EntropyFailure("rng offline".into())));
    let (_frames_tx, frames_rx) = mpsc::channel(1);
    let driver = driver(
        Some(keygen),
        Arc::new(FixedTokens),
        Arc::new(FakeConnector::new(frames_rx)),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), driver.run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, KeyspaceError::EntropyFailure(_)));
}
