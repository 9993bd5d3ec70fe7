//! # Client Driver
//!
//! Wires a transport, the [`Dispatcher`] and the [`Connection`] together.
//!
//! [`Client::run`] is the single reader of the inbound stream. Each envelope
//! goes to the dispatcher first; envelopes nobody is waiting for go to the
//! connection. Challenge replies wait for their response on a spawned task so
//! intake keeps flowing, and a ticker drives keepalives.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::envelope::Envelope;
use crate::core::node::Node;
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::{Connection, Inbound};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::session::{CryptoProvider, SessionState, SessionStore};
use crate::transport::Outbound;
use crate::utils::metrics::global_metrics;
use crate::utils::time::unix_seconds;

// interval() rejects a zero period
const MIN_TICK: Duration = Duration::from_millis(1);

pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<Connection>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        outbound: Arc<Outbound>,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(outbound, Some(config.response_timeout)));
        let connection = Arc::new(Connection::new(&config, dispatcher.clone(), crypto, store));
        Self {
            config,
            dispatcher,
            connection,
        }
    }

    /// Like [`Client::new`], resuming `session`.
    pub fn with_session(
        config: ClientConfig,
        outbound: Arc<Outbound>,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn SessionStore>,
        session: SessionState,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(outbound, Some(config.response_timeout)));
        let connection = Connection::new(&config, dispatcher.clone(), crypto, store);
        Self {
            config,
            dispatcher,
            connection: Arc::new(connection.with_session(session)),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Read `inbound` until the peer goes away or a fatal error occurs.
    ///
    /// Decoded nodes are forwarded to `nodes`. Protocol violations and
    /// undecodable frames are logged and dropped. Returns
    /// `ConnectionClosed` when the stream ends.
    #[instrument(skip_all, fields(client_id = %self.config.client_id))]
    pub async fn run<S>(&self, mut inbound: S, nodes: mpsc::Sender<Node>) -> Result<()>
    where
        S: Stream<Item = Result<Envelope>> + Unpin,
    {
        let period = self.config.keepalive_tick.max(MIN_TICK);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut challenges: JoinSet<Result<()>> = JoinSet::new();

        info!("Client loop started");
        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(Ok(envelope)) => self.handle_envelope(envelope, &nodes, &mut challenges).await?,
                    Some(Err(e)) if e.is_frame_error() => {
                        warn!(error = %e, "Dropping unreadable frame");
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        info!("Inbound stream ended");
                        return Err(ProtocolError::ConnectionClosed);
                    }
                },
                Some(joined) = challenges.join_next(), if !challenges.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.is_fatal() => return Err(e),
                        Ok(Err(e)) => warn!(error = %e, "Challenge round trip failed"),
                        Err(e) => return Err(ProtocolError::Custom(format!("Challenge task failed: {e}"))),
                    }
                },
                _ = ticker.tick() => {
                    self.connection.keepalive(unix_seconds()?).await?;
                }
            }
        }
    }

    async fn handle_envelope(
        &self,
        envelope: Envelope,
        nodes: &mpsc::Sender<Node>,
        challenges: &mut JoinSet<Result<()>>,
    ) -> Result<()> {
        let Some(envelope) = self.dispatcher.deliver(envelope)? else {
            return Ok(());
        };

        match self.connection.receive(&envelope) {
            Ok(Inbound::Node(node)) => {
                debug!(tag = %envelope.tag, node = %node, "Node received");
                if nodes.send(node).await.is_err() {
                    debug!("Node receiver dropped");
                }
            }
            Ok(Inbound::StreamEnd) => debug!(tag = %envelope.tag, "Stream end"),
            Ok(Inbound::ChallengeReply(request)) => {
                let connection = self.connection.clone();
                challenges.spawn(async move { connection.complete_challenge(request).await });
            }
            Ok(Inbound::Control) | Ok(Inbound::Ignored) => {}
            Err(e @ ProtocolError::ProtocolViolation(_)) => {
                global_metrics().protocol_violation();
                warn!(tag = %envelope.tag, error = %e, "Protocol violation, event dropped");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(tag = %envelope.tag, error = %e, "Envelope dropped"),
        }
        Ok(())
    }
}
