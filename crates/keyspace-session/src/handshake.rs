//! Keyroute pairing handshake.
//!
//! [`KeyrouteMachine`] is a sans-IO state machine: it consumes
//! [`HandshakeEvent`]s and returns [`HandshakeCommand`]s. [`KeyrouteDriver`]
//! owns the machine and is the only writer; timers, token fetches and the
//! channel listener all feed the same event queue.
//!
//! ```text
//! Idle -> AwaitingToken -> QrDisplayed <-> ChannelOpen -> PayloadReceived -> SessionEstablished
//!   ^          |                |               |               |
//!   +----------+----- Error <---+---------------+---------------+
//! ```
//!
//! Each refresh starts a new *cycle* with its own generation number and
//! ephemeral keypair. Events carry the generation they were issued for;
//! anything from an older cycle is dropped, so a payload is only ever
//! decrypted with the keypair whose public key was on screen when the
//! channel it arrived on was opened.

use std::sync::Arc;
use std::time::Duration;

use keyspace_core::config::{KeyrouteConfig, KeyspaceConfig};
use keyspace_core::types::{KeyauthToken, KeyrouteInitRequest, KeyroutePayload};
use keyspace_core::KeyspaceResult;
use keyspace_crypto::keys::UserSession;
use keyspace_crypto::KxKeyPair;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::keyroute::{init_request, keyroute_login, parse_route_frame, route_id};
use crate::store::{save_session, SessionStore};
use crate::transport::{KeyrouteConnector, TokenService};

const SERVICE_UNAVAILABLE: &str = "Keyspace servers are down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingToken,
    QrDisplayed,
    ChannelOpen,
    PayloadReceived,
    SessionEstablished,
    Error(String),
}

#[derive(Debug, Clone)]
pub enum HandshakeEvent {
    /// One second elapsed.
    Tick,
    /// User asked for a fresh QR code now.
    Retry,
    TokenFetched {
        generation: u64,
        token: KeyauthToken,
    },
    TokenFailed {
        generation: u64,
        reason: String,
    },
    ChannelOpened {
        generation: u64,
    },
    ChannelClosed {
        generation: u64,
    },
    /// The channel could not be re-established.
    ChannelFailed {
        generation: u64,
        reason: String,
    },
    PayloadArrived {
        generation: u64,
        payload: KeyroutePayload,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeCommand {
    FetchToken { generation: u64 },
    OpenChannel { generation: u64, route: String },
    CloseChannel { generation: u64 },
    ShowQr(KeyrouteInitRequest),
    Persist(UserSession),
    Established(UserSession),
}

/// Observable snapshot of the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeStatus {
    pub state: HandshakeState,
    /// Seconds until the QR code is replaced
    pub countdown: u32,
    pub qr: Option<KeyrouteInitRequest>,
    pub generation: u64,
}

/// Ephemeral keypair source.
pub type KeyGen = Box<dyn FnMut() -> KeyspaceResult<KxKeyPair> + Send>;

struct Cycle {
    generation: u64,
    keypair: KxKeyPair,
    token: Option<KeyauthToken>,
}

pub struct KeyrouteMachine {
    state: HandshakeState,
    countdown: u32,
    refresh_interval: u32,
    generation: u64,
    cycle: Option<Cycle>,
    qr: Option<KeyrouteInitRequest>,
    verify_signed_token: bool,
    keygen: KeyGen,
}

impl KeyrouteMachine {
    pub fn new(config: &KeyrouteConfig) -> Self {
        Self::with_keygen(config, Box::new(KxKeyPair::generate))
    }

    /// Use `keygen` instead of the OS RNG for ephemeral keypairs.
    pub fn with_keygen(config: &KeyrouteConfig, keygen: KeyGen) -> Self {
        Self {
            state: HandshakeState::Idle,
            countdown: 0,
            refresh_interval: config.refresh_interval_secs.max(1),
            generation: 0,
            cycle: None,
            qr: None,
            verify_signed_token: config.verify_signed_token,
            keygen,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> HandshakeStatus {
        HandshakeStatus {
            state: self.state.clone(),
            countdown: self.countdown,
            qr: self.qr.clone(),
            generation: self.generation,
        }
    }

    /// Apply one event.
    ///
    /// Recoverable failures move the machine to [`HandshakeState::Error`] and
    /// return `Ok`; only fatal errors (entropy) are returned as `Err`.
    pub fn handle(&mut self, event: HandshakeEvent) -> KeyspaceResult<Vec<HandshakeCommand>> {
        if self.state == HandshakeState::SessionEstablished {
            return Ok(Vec::new());
        }

        match event {
            HandshakeEvent::Tick => {
                if self.countdown == 0 {
                    self.start_cycle()
                } else {
                    self.countdown -= 1;
                    Ok(Vec::new())
                }
            }
            HandshakeEvent::Retry => {
                self.countdown = 0;
                Ok(Vec::new())
            }
            HandshakeEvent::TokenFetched { generation, token } => {
                if !self.is_current(generation, "token") {
                    return Ok(Vec::new());
                }
                if self.state != HandshakeState::AwaitingToken {
                    return Ok(Vec::new());
                }
                Ok(self.display(generation, token))
            }
            HandshakeEvent::TokenFailed { generation, reason } => {
                if !self.is_current(generation, "token failure") {
                    return Ok(Vec::new());
                }
                warn!(generation, %reason, "keyauth token fetch failed");
                Ok(self.fail(SERVICE_UNAVAILABLE.to_string()))
            }
            HandshakeEvent::ChannelOpened { generation } => {
                if self.is_current(generation, "channel open")
                    && self.state == HandshakeState::QrDisplayed
                {
                    self.state = HandshakeState::ChannelOpen;
                }
                Ok(Vec::new())
            }
            HandshakeEvent::ChannelClosed { generation } => {
                if self.is_current(generation, "channel close")
                    && self.state == HandshakeState::ChannelOpen
                {
                    debug!(generation, "keyroute channel closed, awaiting reconnect");
                    self.state = HandshakeState::QrDisplayed;
                }
                Ok(Vec::new())
            }
            HandshakeEvent::ChannelFailed { generation, reason } => {
                if !self.is_current(generation, "channel failure") {
                    return Ok(Vec::new());
                }
                Ok(self.fail(format!("keyroute channel failed: {reason}")))
            }
            HandshakeEvent::PayloadArrived {
                generation,
                payload,
            } => {
                if !self.is_current(generation, "payload") {
                    return Ok(Vec::new());
                }
                if !matches!(
                    self.state,
                    HandshakeState::QrDisplayed | HandshakeState::ChannelOpen
                ) {
                    debug!(generation, state = ?self.state, "payload outside of a displayed cycle");
                    return Ok(Vec::new());
                }
                self.receive(generation, &payload)
            }
        }
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        let current = self.cycle.as_ref().map(|c| c.generation);
        if current == Some(generation) {
            return true;
        }
        debug!(generation, ?current, event = what, "ignoring event from a stale cycle");
        false
    }

    /// Drop the current cycle and start a new one with a fresh keypair.
    fn start_cycle(&mut self) -> KeyspaceResult<Vec<HandshakeCommand>> {
        let mut commands = Vec::new();
        if let Some(old) = self.cycle.take() {
            commands.push(HandshakeCommand::CloseChannel {
                generation: old.generation,
            });
        }
        self.state = HandshakeState::Idle;
        self.qr = None;

        let keypair = (self.keygen)().map_err(|e| {
            error!(error = %e, "cannot generate ephemeral keypair");
            e
        })?;

        self.generation += 1;
        let generation = self.generation;
        debug!(generation, public_key = %keypair.public_key_hex(), "new pairing cycle");
        self.cycle = Some(Cycle {
            generation,
            keypair,
            token: None,
        });
        self.state = HandshakeState::AwaitingToken;
        self.countdown = self.refresh_interval;
        commands.push(HandshakeCommand::FetchToken { generation });
        Ok(commands)
    }

    fn display(&mut self, generation: u64, token: KeyauthToken) -> Vec<HandshakeCommand> {
        let Some(cycle) = self.cycle.as_mut() else {
            return Vec::new();
        };
        let prepared = route_id(&token).and_then(|route| {
            let qr = init_request(&token, &cycle.keypair)?;
            Ok((route, qr))
        });
        match prepared {
            Ok((route, qr)) => {
                cycle.token = Some(token);
                self.qr = Some(qr.clone());
                self.state = HandshakeState::QrDisplayed;
                info!(generation, "pairing QR code ready");
                vec![
                    HandshakeCommand::ShowQr(qr),
                    HandshakeCommand::OpenChannel { generation, route },
                ]
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn receive(
        &mut self,
        generation: u64,
        payload: &KeyroutePayload,
    ) -> KeyspaceResult<Vec<HandshakeCommand>> {
        self.state = HandshakeState::PayloadReceived;
        let result = match self.cycle.as_ref() {
            Some(cycle) => {
                let expected = if self.verify_signed_token {
                    cycle.token.as_ref()
                } else {
                    None
                };
                keyroute_login(payload, &cycle.keypair, expected)
            }
            None => return Ok(Vec::new()),
        };

        match result {
            Ok(session) => {
                self.cycle = None;
                self.qr = None;
                self.countdown = 0;
                self.state = HandshakeState::SessionEstablished;
                info!(generation, email = %session.email, "pairing complete");
                Ok(vec![
                    HandshakeCommand::CloseChannel { generation },
                    HandshakeCommand::Persist(session.clone()),
                    HandshakeCommand::Established(session),
                ])
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(generation, error = %e, "pairing payload rejected");
                Ok(self.fail(e.to_string()))
            }
        }
    }

    /// Discard the cycle; a new one starts when the countdown next reaches
    /// zero or on `Retry`.
    fn fail(&mut self, reason: String) -> Vec<HandshakeCommand> {
        let mut commands = Vec::new();
        if let Some(old) = self.cycle.take() {
            commands.push(HandshakeCommand::CloseChannel {
                generation: old.generation,
            });
        }
        self.qr = None;
        self.state = HandshakeState::Error(reason);
        commands
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Reconnect schedule for the keyroute channel listener.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_failures: u32,
}

impl From<&KeyrouteConfig> for ReconnectPolicy {
    fn from(config: &KeyrouteConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.reconnect_backoff_ms),
            max: Duration::from_millis(config.reconnect_backoff_max_ms),
            max_failures: config.max_reconnect_failures.max(1),
        }
    }
}

pub struct KeyrouteDriver {
    machine: KeyrouteMachine,
    tokens: Arc<dyn TokenService>,
    connector: Arc<dyn KeyrouteConnector>,
    store: Option<Arc<dyn SessionStore>>,
    reconnect: ReconnectPolicy,
    tick: Duration,
    events_tx: mpsc::Sender<HandshakeEvent>,
    events_rx: mpsc::Receiver<HandshakeEvent>,
    status_tx: watch::Sender<HandshakeStatus>,
    listener: Option<(u64, JoinHandle<()>)>,
}

impl KeyrouteDriver {
    pub fn new(
        config: &KeyspaceConfig,
        tokens: Arc<dyn TokenService>,
        connector: Arc<dyn KeyrouteConnector>,
    ) -> Self {
        Self::with_machine(
            KeyrouteMachine::new(&config.keyroute),
            ReconnectPolicy::from(&config.keyroute),
            tokens,
            connector,
        )
    }

    pub fn with_machine(
        machine: KeyrouteMachine,
        reconnect: ReconnectPolicy,
        tokens: Arc<dyn TokenService>,
        connector: Arc<dyn KeyrouteConnector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (status_tx, _) = watch::channel(machine.status());
        Self {
            machine,
            tokens,
            connector,
            store: None,
            reconnect,
            tick: Duration::from_secs(1),
            events_tx,
            events_rx,
            status_tx,
            listener: None,
        }
    }

    /// Persist the session here once pairing succeeds.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Countdown granularity. One second in production.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Handle for injecting events such as [`HandshakeEvent::Retry`].
    pub fn events(&self) -> mpsc::Sender<HandshakeEvent> {
        self.events_tx.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HandshakeStatus> {
        self.status_tx.subscribe()
    }

    /// Run until a session is established (`Ok(Some)`), `cancel` fires
    /// (`Ok(None)`), or a fatal error occurs.
    pub async fn run(mut self, cancel: CancellationToken) -> KeyspaceResult<Option<UserSession>> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("pairing cancelled");
                    self.stop_listener();
                    return Ok(None);
                }
                _ = ticker.tick() => HandshakeEvent::Tick,
                Some(event) = self.events_rx.recv() => event,
            };

            let commands = match self.machine.handle(event) {
                Ok(commands) => commands,
                Err(e) => {
                    error!(error = %e, "pairing aborted");
                    self.stop_listener();
                    self.status_tx.send_replace(self.machine.status());
                    return Err(e);
                }
            };

            let mut established = None;
            for command in commands {
                if let Some(session) = self.execute(command).await {
                    established = Some(session);
                }
            }
            self.status_tx.send_replace(self.machine.status());

            if let Some(session) = established {
                self.stop_listener();
                return Ok(Some(session));
            }
        }
    }

    async fn execute(&mut self, command: HandshakeCommand) -> Option<UserSession> {
        match command {
            HandshakeCommand::FetchToken { generation } => {
                let tokens = Arc::clone(&self.tokens);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = match tokens.fetch_token().await {
                        Ok(token) => HandshakeEvent::TokenFetched { generation, token },
                        Err(e) => HandshakeEvent::TokenFailed {
                            generation,
                            reason: e.to_string(),
                        },
                    };
                    let _ = events.send(event).await;
                });
            }
            HandshakeCommand::OpenChannel { generation, route } => {
                self.stop_listener();
                let handle = tokio::spawn(listen(
                    Arc::clone(&self.connector),
                    route,
                    generation,
                    self.events_tx.clone(),
                    self.reconnect,
                ));
                self.listener = Some((generation, handle));
            }
            HandshakeCommand::CloseChannel { generation } => {
                if matches!(self.listener, Some((g, _)) if g == generation) {
                    self.stop_listener();
                }
            }
            HandshakeCommand::ShowQr(qr) => {
                debug!(public_key = %qr.public_key, "QR payload updated");
            }
            HandshakeCommand::Persist(session) => {
                if let Some(store) = &self.store {
                    if let Err(e) = save_session(store.as_ref(), &session).await {
                        warn!(error = %e, "failed to persist session");
                    }
                }
            }
            HandshakeCommand::Established(session) => return Some(session),
        }
        None
    }

    fn stop_listener(&mut self) {
        if let Some((generation, handle)) = self.listener.take() {
            debug!(generation, "stopping keyroute listener");
            handle.abort();
        }
    }
}

/// Keep a keyroute channel open for one cycle, reconnecting whenever it
/// drops, and forward every data frame as a payload event.
async fn listen(
    connector: Arc<dyn KeyrouteConnector>,
    route: String,
    generation: u64,
    events: mpsc::Sender<HandshakeEvent>,
    policy: ReconnectPolicy,
) {
    let mut backoff = policy.initial;
    let mut failures = 0u32;

    loop {
        match connector.connect(&route).await {
            Ok(mut stream) => {
                failures = 0;
                backoff = policy.initial;
                if events
                    .send(HandshakeEvent::ChannelOpened { generation })
                    .await
                    .is_err()
                {
                    return;
                }

                loop {
                    match stream.next_frame().await {
                        Ok(Some(text)) => match parse_route_frame(&text) {
                            Some(payload) => {
                                let event = HandshakeEvent::PayloadArrived {
                                    generation,
                                    payload,
                                };
                                if events.send(event).await.is_err() {
                                    return;
                                }
                            }
                            None => debug!(generation, "ignoring non-data keyroute frame"),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            debug!(generation, error = %e, "keyroute channel read failed");
                            break;
                        }
                    }
                }

                if events
                    .send(HandshakeEvent::ChannelClosed { generation })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(generation, failures, error = %e, "keyroute connect failed");
                if failures >= policy.max_failures {
                    let _ = events
                        .send(HandshakeEvent::ChannelFailed {
                            generation,
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspace_core::KeyspaceError;
    use keyspace_crypto::{aead_encrypt, client_session_keys, to_hex};

    fn config() -> KeyrouteConfig {
        KeyrouteConfig {
            refresh_interval_secs: 3,
            ..KeyrouteConfig::default()
        }
    }

    fn seeded_keygen() -> KeyGen {
        let mut seed = 0u8;
        Box::new(move || {
            seed += 1;
            Ok(KxKeyPair::from_secret_bytes([seed; 32]))
        })
    }

    fn token() -> KeyauthToken {
        serde_json::from_str(
            r#"{"expiry":1700000060,"signedToken":"ab","tagline":"keyauth","token":"t0k","version":"1"}"#,
        )
        .unwrap()
    }

    fn payload_for(extension_public_hex: &str) -> KeyroutePayload {
        let device = KxKeyPair::from_secret_bytes([0xd0; 32]);
        let extension_public = keyspace_crypto::from_hex(extension_public_hex).unwrap();
        let keys = client_session_keys(&device, &extension_public).unwrap();
        let doc = br#"{"privateKey":"aa","publicKey":"bb","symmetricKey":"cc"}"#;
        KeyroutePayload {
            keyring_data: to_hex(&aead_encrypt(doc, &keys.tx).unwrap()),
            signed_token: None,
            dh_public_key: device.public_key_hex(),
            email: "user@example.com".into(),
        }
    }

    /// Drive a fresh machine to QrDisplayed; returns the displayed public key.
    fn displayed(machine: &mut KeyrouteMachine) -> String {
        let commands = machine.handle(HandshakeEvent::Tick).unwrap();
        assert_eq!(commands, vec![HandshakeCommand::FetchToken { generation: 1 }]);
        let commands = machine
            .handle(HandshakeEvent::TokenFetched {
                generation: 1,
                token: token(),
            })
            .unwrap();
        assert_eq!(machine.state(), &HandshakeState::QrDisplayed);
        match &commands[..] {
            [HandshakeCommand::ShowQr(qr), HandshakeCommand::OpenChannel { generation: 1, .. }] => {
                qr.public_key.clone()
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut machine = KeyrouteMachine::with_keygen(&config(), seeded_keygen());
        let public = displayed(&mut machine);

        machine
            .handle(HandshakeEvent::ChannelOpened { generation: 1 })
            .unwrap();
        assert_eq!(machine.state(), &HandshakeState::ChannelOpen);

        let commands = machine
            .handle(HandshakeEvent::PayloadArrived {
                generation: 1,
                payload: payload_for(&public),
            })
            .unwrap();
        assert_eq!(machine.state(), &HandshakeState::SessionEstablished);
        assert!(matches!(commands[0], HandshakeCommand::CloseChannel { generation: 1 }));
        let HandshakeCommand::Established(session) = &commands[2] else {
            panic!("expected Established");
        };
        assert_eq!(session.email, "user@example.com");
        assert_eq!(session.keyring.symmetric_key, vec![0xcc]);
        assert!(machine.status().qr.is_none());

        // Terminal: later ticks do nothing
        assert!(machine.handle(HandshakeEvent::Tick).unwrap().is_empty());
    }

    #[test]
    fn test_countdown_rotates_keypair() {
        let mut machine = KeyrouteMachine::with_keygen(&config(), seeded_keygen());
        let first = displayed(&mut machine);
        assert_eq!(machine.status().countdown, 3);

        for expected in [2, 1, 0] {
            assert!(machine.handle(HandshakeEvent::Tick).unwrap().is_empty());
            assert_eq!(machine.status().countdown, expected);
        }

        let commands = machine.handle(HandshakeEvent::Tick).unwrap();
        assert_eq!(
            commands,
            vec![
                HandshakeCommand::CloseChannel { generation: 1 },
                HandshakeCommand::FetchToken { generation: 2 },
            ]
        );
        assert_eq!(machine.state(), &HandshakeState::AwaitingToken);
        assert_eq!(machine.generation(), 2);

        let commands = machine
            .handle(HandshakeEvent::TokenFetched {
                generation: 2,
                token: token(),
            })
            .unwrap();
        let HandshakeCommand::ShowQr(qr) = &commands[0] else {
            panic!("expected ShowQr");
        };
        assert_ne!(qr.public_key, first);
    }

    #[test]
    fn test_payload_for_rotated_keypair_never_succeeds() {
        let mut machine = KeyrouteMachine::with_keygen(&config(), seeded_keygen());
        let old_public = displayed(&mut machine);
        machine.handle(HandshakeEvent::Retry).unwrap();
        machine.handle(HandshakeEvent::Tick).unwrap();
        machine
            .handle(HandshakeEvent::TokenFetched {
                generation: 2,
                token: token(),
            })
            .unwrap();

        // Stale generation: dropped without touching the new cycle
        let commands = machine
            .handle(HandshakeEvent::PayloadArrived {
                generation: 1,
                payload: payload_for(&old_public),
            })
            .unwrap();
        assert!(commands.is_empty());
        assert_eq!(machine.state(), &HandshakeState::QrDisplayed);

        // Delivered on the new channel: decryption fails against the new keypair
        machine
            .handle(HandshakeEvent::PayloadArrived {
                generation: 2,
                payload: payload_for(&old_public),
            })
            .unwrap();
        assert!(matches!(machine.state(), HandshakeState::Error(_)));
        assert!(machine.status().qr.is_none());
    }

    #[test]
    fn test_error_recovers_on_countdown() {
        let mut machine = KeyrouteMachine::with_keygen(&config(), seeded_keygen());
        machine.handle(HandshakeEvent::Tick).unwrap();
        let commands = machine
            .handle(HandshakeEvent::TokenFailed {
                generation: 1,
                reason: "503".into(),
            })
            .unwrap();
        assert_eq!(commands, vec![HandshakeCommand::CloseChannel { generation: 1 }]);
        assert_eq!(
            machine.state(),
            &HandshakeState::Error(SERVICE_UNAVAILABLE.to_string())
        );

        // A late token for the discarded cycle is ignored
        assert!(machine
            .handle(HandshakeEvent::TokenFetched {
                generation: 1,
                token: token()
            })
            .unwrap()
            .is_empty());

        machine.handle(HandshakeEvent::Retry).unwrap();
        let commands = machine.handle(HandshakeEvent::Tick).unwrap();
        assert_eq!(commands, vec![HandshakeCommand::FetchToken { generation: 2 }]);
        assert_eq!(machine.state(), &HandshakeState::AwaitingToken);
    }

    #[test]
    fn test_channel_reconnect_and_failure() {
        let mut machine = KeyrouteMachine::with_keygen(&config(), seeded_keygen());
        displayed(&mut machine);

        machine
            .handle(HandshakeEvent::ChannelOpened { generation: 1 })
            .unwrap();
        machine
            .handle(HandshakeEvent::ChannelClosed { generation: 1 })
            .unwrap();
        assert_eq!(machine.state(), &HandshakeState::QrDisplayed);
        assert!(machine.status().qr.is_some());

        machine
            .handle(HandshakeEvent::ChannelFailed {
                generation: 1,
                reason: "refused".into(),
            })
            .unwrap();
        assert!(matches!(machine.state(), HandshakeState::Error(r) if r.contains("refused")));
    }

    #[test]
    fn test_entropy_failure_is_fatal() {
        let keygen: KeyGen =
            Box::new(|| Err(KeyspaceError::EntropyFailure("no randomness".into())));
        let mut machine = KeyrouteMachine::with_keygen(&config(), keygen);
        let err = machine.handle(HandshakeEvent::Tick).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let policy = ReconnectPolicy::from(&KeyrouteConfig {
            max_reconnect_failures: 0,
            ..KeyrouteConfig::default()
        });
        assert_eq!(policy.initial, Duration::from_millis(500));
        assert_eq!(policy.max_failures, 1);
    }
}
