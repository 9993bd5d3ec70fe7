//! Serialized outbound path.
//!
//! Every writer (dispatcher requests, challenge replies, keepalives) goes
//! through one [`Outbound`], which holds the sink under an async mutex so a
//! frame is always written whole.

use futures::{Sink, SinkExt};
use std::fmt;
use std::pin::Pin;
use tokio::sync::Mutex;
use tracing::{instrument, trace};

use crate::core::envelope::Envelope;
use crate::error::Result;
use crate::utils::metrics::global_metrics;

type EnvelopeSink = Pin<Box<dyn Sink<Envelope, Error = crate::error::ProtocolError> + Send>>;

/// Shared handle to the write half of a transport.
pub struct Outbound {
    sink: Mutex<EnvelopeSink>,
}

impl Outbound {
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Envelope, Error = crate::error::ProtocolError> + Send + 'static,
    {
        Self {
            sink: Mutex::new(Box::pin(sink)),
        }
    }

    /// Write one envelope and flush it.
    #[instrument(skip(self, envelope), fields(tag = %envelope.tag), level = "debug")]
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        let len = envelope.wire_len();
        let mut sink = self.sink.lock().await;
        sink.send(envelope).await?;
        global_metrics().message_sent(len as u64);
        trace!(bytes = len, "Envelope sent");
        Ok(())
    }

    /// Close the underlying sink. Later sends fail.
    pub async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.close().await
    }
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_senders_write_whole_frames() {
        let (tx, rx) = mpsc::channel::<Envelope>(64);
        let outbound = Arc::new(Outbound::new(
            tx.sink_map_err(|_| ProtocolError::ConnectionClosed),
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let outbound = outbound.clone();
            handles.push(tokio::spawn(async move {
                outbound
                    .send(Envelope::new(format!("t{i}"), vec![i as u8; 8]))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        outbound.close().await.unwrap();

        let received: Vec<Envelope> = rx.collect().await;
        assert_eq!(received.len(), 16);
        assert!(received.iter().all(|env| env.payload.len() == 8));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, _rx) = mpsc::channel::<Envelope>(1);
        let outbound = Outbound::new(tx.sink_map_err(|_| ProtocolError::ConnectionClosed));
        outbound.close().await.unwrap();
        assert!(outbound.send(Envelope::keepalive()).await.is_err());
    }
}
