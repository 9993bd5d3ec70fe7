//! # Connection State Machine
//!
//! Drives the login sequence from inbound control frames and owns the
//! [`SessionState`].
//!
//! ```text
//! Authenticating ──Conn──────────────────────────────────▶ Authenticated
//!       │                                                        ▲
//!    restore ──▶ ChallengeExpected ──Cmd──▶ ChallengeSent ──200──┘
//! ```
//!
//! Frames that arrive in a state where they mean nothing are ignored.
//! Malformed frames are reported as `ProtocolViolation` and leave the state
//! untouched.

use rand::Rng;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::decoder::Decoder;
use crate::core::envelope::Envelope;
use crate::core::node::Node;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::control::{self, Action, ControlFrame, Frame};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::session::{ConnectionState, CryptoProvider, SessionState, SessionStore};
use crate::utils::metrics::global_metrics;

/// What an inbound envelope turned into.
#[derive(Debug)]
pub enum Inbound {
    /// A decoded binary node for the application.
    Node(Node),
    /// The binary stream-end sentinel.
    StreamEnd,
    /// A control frame that changed the session.
    Control,
    /// A challenge was solved; the reply must be issued with
    /// [`Connection::complete_challenge`].
    ChallengeReply(Envelope),
    /// Nothing to do in the current state.
    Ignored,
}

struct Inner {
    state: ConnectionState,
    session: SessionState,
}

pub struct Connection {
    inner: Mutex<Inner>,
    dispatcher: Arc<Dispatcher>,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn SessionStore>,
    keepalive_min: Duration,
    keepalive_max: Duration,
    response_timeout: Option<Duration>,
    max_node_depth: usize,
}

impl Connection {
    pub fn new(
        config: &ClientConfig,
        dispatcher: Arc<Dispatcher>,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Authenticating,
                session: SessionState::new(config.client_id.clone()),
            }),
            dispatcher,
            crypto,
            store,
            keepalive_min: config.keepalive_min,
            keepalive_max: config.keepalive_max,
            response_timeout: Some(config.response_timeout),
            max_node_depth: config.max_node_depth,
        }
    }

    /// Start from a previously persisted session.
    pub fn with_session(self, session: SessionState) -> Self {
        self.lock().session = session;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Copy of the current session.
    pub fn session(&self) -> SessionState {
        self.lock().session.clone()
    }

    /// Unix second before which [`Connection::keepalive`] does nothing.
    pub fn next_keepalive_at(&self) -> u64 {
        self.lock().session.next_keepalive
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session: `admin init`, then wait for `Conn`.
    ///
    /// The response must carry status 200; its `ref` is kept in the session.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        let client_id = self.lock().session.client_id.clone();
        let request = Envelope::json(
            self.dispatcher.next_tag()?,
            &control::init_request(&client_id),
        )?;
        let response = self
            .dispatcher
            .issue_with_deadline(request, self.response_timeout)
            .await?;

        let body = control::response_object(&response.payload)?;
        control::expect_ok(&body)?;
        let conn_ref = control::required_str(&body, "ref", constants::ERR_MISSING_REF)?;

        self.lock().session.connection_ref = Some(conn_ref.to_owned());
        info!(ref_len = conn_ref.len(), "Session initialised");
        Ok(())
    }

    /// Resume a stored session with `admin login ... takeover`.
    ///
    /// The login is sent without waiting; the peer answers with a challenge.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<()> {
        let request = {
            let mut inner = self.lock();
            let (client_token, server_token) = inner
                .session
                .resume_tokens()
                .ok_or_else(|| ProtocolError::violation(constants::ERR_NO_STORED_TOKENS))?;
            let body =
                control::login_request(client_token, server_token, &inner.session.client_id);
            let request = Envelope::json(self.dispatcher.next_tag()?, &body)?;
            // The challenge may arrive before send() returns.
            inner.state = ConnectionState::ChallengeExpected;
            request
        };

        self.dispatcher.outbound().send(request).await?;
        info!("Login sent, waiting for challenge");
        Ok(())
    }

    /// Classify and handle one inbound envelope.
    ///
    /// Binary frames are decoded; control frames drive the state machine.
    pub fn receive(&self, envelope: &Envelope) -> Result<Inbound> {
        let payload = &envelope.payload;
        match control::classify(payload) {
            Frame::Control(value) => {
                global_metrics().control_frame(payload.len() as u64);
                match ControlFrame::parse(value)? {
                    Some(frame) => self.handle_control(&frame),
                    None => {
                        debug!(tag = %envelope.tag, "Control value is not an action array");
                        Ok(Inbound::Ignored)
                    }
                }
            }
            Frame::Binary => {
                global_metrics().binary_frame(payload.len() as u64);
                let decoded = Decoder::new(payload)
                    .max_depth(self.max_node_depth)
                    .read_node();
                match decoded {
                    Ok(Some(node)) => Ok(Inbound::Node(node)),
                    Ok(None) => Ok(Inbound::StreamEnd),
                    Err(e) => {
                        global_metrics().decode_error();
                        warn!(tag = %envelope.tag, error = %e, "Dropping undecodable frame");
                        Err(e)
                    }
                }
            }
        }
    }

    fn handle_control(&self, frame: &ControlFrame) -> Result<Inbound> {
        match &frame.action {
            Action::Conn => self.handle_conn(frame),
            Action::Cmd => self.handle_cmd(frame),
            Action::Other(name) => {
                debug!(action = %name, "Unhandled control action");
                Ok(Inbound::Ignored)
            }
        }
    }

    fn handle_conn(&self, frame: &ControlFrame) -> Result<Inbound> {
        let snapshot = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Authenticating {
                debug!(state = ?inner.state, "Conn not expected, ignoring");
                return Ok(Inbound::Ignored);
            }

            let payload = frame.payload_object()?;
            let Some(secret) = control::str_field(payload, "secret") else {
                debug!("Conn without secret, ignoring");
                return Ok(Inbound::Ignored);
            };
            let fields = ConnFields::extract(payload)?;
            let keys = self.crypto.derive_secret(secret.as_bytes())?;
            let local_key = self.crypto.local_key();

            let session = &mut inner.session;
            session.secret = Some(secret.to_owned());
            session.connection_ref = Some(fields.connection_ref);
            session.server_token = Some(fields.server_token);
            session.client_token = Some(fields.client_token);
            session.browser_token = Some(fields.browser_token);
            session.derived_secret = Some(keys.shared_secret);
            session.peer_key = keys.peer_key;
            session.local_key = local_key;
            session.next_keepalive = 0;

            inner.state = ConnectionState::Authenticated;
            inner.session.clone()
        };

        info!(session = ?snapshot, "New session established");
        self.store.persist_session(&snapshot)?;
        Ok(Inbound::Control)
    }

    fn handle_cmd(&self, frame: &ControlFrame) -> Result<Inbound> {
        let payload = frame.payload_object()?;
        let kind = control::required_str(payload, "type", constants::ERR_MISSING_TYPE)?;
        match kind {
            "challenge" => self.handle_challenge(payload),
            other => {
                debug!(kind = %other, "Ignoring Cmd");
                Ok(Inbound::Ignored)
            }
        }
    }

    fn handle_challenge(&self, payload: &Map<String, Value>) -> Result<Inbound> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::ChallengeExpected {
            debug!(state = ?inner.state, "Challenge not expected, ignoring");
            return Ok(Inbound::Ignored);
        }
        let Some(challenge) = control::str_field(payload, "challenge") else {
            debug!("Challenge without challenge key, ignoring");
            return Ok(Inbound::Ignored);
        };

        let session = &inner.session;
        let server_token = session
            .server_token
            .as_deref()
            .ok_or_else(|| ProtocolError::violation(constants::ERR_MISSING_SERVER_TOKEN))?;
        let solution = self.crypto.solve_challenge(challenge, session)?;
        let body = control::challenge_request(&solution, server_token, &session.client_id);
        let request = Envelope::json(self.dispatcher.next_tag()?, &body)?;

        inner.state = ConnectionState::ChallengeSent;
        info!(tag = %request.tag, "Challenge solved");
        Ok(Inbound::ChallengeReply(request))
    }

    /// Issue a challenge reply and wait for its status.
    ///
    /// 200 authenticates the connection. Any other status is
    /// [`ProtocolError::ChallengeFailed`] and the state stays `ChallengeSent`.
    #[instrument(skip(self, request), fields(tag = %request.tag))]
    pub async fn complete_challenge(&self, request: Envelope) -> Result<()> {
        let response = self
            .dispatcher
            .issue_with_deadline(request, self.response_timeout)
            .await?;
        let status = control::response_status(&response.payload)?;
        if status != control::STATUS_OK {
            warn!(status, "Challenge rejected");
            return Err(ProtocolError::ChallengeFailed(status));
        }

        let mut inner = self.lock();
        inner.state = ConnectionState::Authenticated;
        inner.session.next_keepalive = 0;
        info!("Challenge accepted");
        Ok(())
    }

    /// Send a keepalive if authenticated and the interval has elapsed.
    ///
    /// `now` is the current Unix second. Returns whether a keepalive was sent.
    /// The next deadline is only moved once the send succeeded, so a failed
    /// send is retried on the next call.
    pub async fn keepalive(&self, now: u64) -> Result<bool> {
        {
            let inner = self.lock();
            if inner.state != ConnectionState::Authenticated || now < inner.session.next_keepalive
            {
                return Ok(false);
            }
        }

        self.dispatcher.outbound().send(Envelope::keepalive()).await?;

        let delay = next_keepalive_delay(&mut rand::rng(), self.keepalive_min, self.keepalive_max);
        let next = now + delay.as_secs();
        self.lock().session.next_keepalive = next;
        global_metrics().keepalive_sent();
        debug!(now, next, "Keepalive sent");
        Ok(true)
    }
}

/// Whole-second delay drawn uniformly from `[min, max)`.
pub fn next_keepalive_delay<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (min.as_secs(), max.as_secs());
    if hi <= lo {
        return min;
    }
    Duration::from_secs(rng.random_range(lo..hi))
}

/// Fields a `Conn` frame must carry once it has a secret.
struct ConnFields {
    connection_ref: String,
    server_token: String,
    client_token: String,
    browser_token: String,
}

impl ConnFields {
    fn extract(payload: &Map<String, Value>) -> Result<Self> {
        let field = |key: &str, missing: &'static str| {
            control::required_str(payload, key, missing).map(str::to_owned)
        };
        Ok(Self {
            connection_ref: field("ref", constants::ERR_MISSING_REF)?,
            server_token: field("serverToken", constants::ERR_MISSING_SERVER_TOKEN)?,
            client_token: field("clientToken", constants::ERR_MISSING_CLIENT_TOKEN)?,
            browser_token: field("browserToken", constants::ERR_MISSING_BROWSER_TOKEN)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_delay_stays_in_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let (min, max) = (Duration::from_secs(20), Duration::from_secs(90));
        for _ in 0..1000 {
            let d = next_keepalive_delay(&mut rng, min, max);
            assert!(d >= min && d < max, "{d:?}");
        }
    }

    #[test]
    fn test_empty_window_falls_back_to_min() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = next_keepalive_delay(&mut rng, Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(d, Duration::from_secs(5));
    }
}
