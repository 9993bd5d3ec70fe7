use crate::core::envelope::Envelope;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::Outbound;
use crate::utils::metrics::global_metrics;
use crate::utils::time::unix_seconds;
use crate::utils::timeout::with_deadline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// A registered waiter. `id` tells apart records that reuse a tag.
struct Pending {
    id: u64,
    responder: oneshot::Sender<Envelope>,
}

/// Correlates outgoing requests with inbound envelopes by tag.
///
/// Each `issue` parks on its own oneshot channel, so waiting callers never
/// hold the table lock and never block envelope intake.
pub struct Dispatcher {
    pending: Mutex<HashMap<String, Pending>>,
    outbound: Arc<Outbound>,
    counter: AtomicU64,
    next_id: AtomicU64,
    default_timeout: Option<Duration>,
}

/// Removes its record from the table when the waiting future goes away,
/// whether it returned or was dropped mid-wait.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    tag: String,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.forget(&self.tag, self.id);
    }
}

impl Dispatcher {
    pub fn new(outbound: Arc<Outbound>, default_timeout: Option<Duration>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            outbound,
            counter: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            default_timeout,
        }
    }

    pub fn outbound(&self) -> &Arc<Outbound> {
        &self.outbound
    }

    /// Fresh correlation tag, `<unix-seconds>.--<counter>`.
    pub fn next_tag(&self) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}.--{n}", unix_seconds()?))
    }

    /// Send `request` and wait for the envelope carrying the same tag, bounded
    /// by the dispatcher's default deadline.
    pub async fn issue(&self, request: Envelope) -> Result<Envelope> {
        self.issue_with_deadline(request, self.default_timeout).await
    }

    /// Like [`Dispatcher::issue`] with an explicit deadline. An empty tag is
    /// replaced by a fresh one.
    ///
    /// The pending record lives exactly as long as this future: it is removed
    /// on response, timeout, send failure or when the future is dropped.
    #[instrument(skip(self, request), fields(tag = %request.tag), level = "debug")]
    pub async fn issue_with_deadline(
        &self,
        mut request: Envelope,
        deadline: Option<Duration>,
    ) -> Result<Envelope> {
        if request.tag.is_empty() {
            request.tag = self.next_tag()?;
        }

        let (tx, rx) = oneshot::channel();
        let _guard = self.register(request.tag.clone(), tx)?;
        global_metrics().request_issued();

        self.outbound.send(request).await?;

        match with_deadline(deadline, rx).await {
            Ok(Ok(response)) => {
                debug!(bytes = response.payload.len(), "Response received");
                Ok(response)
            }
            Ok(Err(_)) => Err(ProtocolError::Custom(
                constants::ERR_RESPONDER_DROPPED.to_string(),
            )),
            Err(e) => {
                global_metrics().request_timed_out();
                warn!("Request timed out");
                Err(e)
            }
        }
    }

    fn register(
        &self,
        tag: String,
        responder: oneshot::Sender<Envelope>,
    ) -> Result<PendingGuard<'_>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.lock_pending()?;
        if pending.contains_key(&tag) {
            return Err(ProtocolError::violation(&format!(
                "Request tag already pending: {tag}"
            )));
        }
        pending.insert(tag.clone(), Pending { id, responder });
        Ok(PendingGuard {
            dispatcher: self,
            tag,
            id,
        })
    }

    /// Hand `envelope` to the request waiting on its tag.
    ///
    /// Returns the envelope back when nobody is waiting for it, so the caller
    /// can process it as unsolicited traffic.
    pub fn deliver(&self, envelope: Envelope) -> Result<Option<Envelope>> {
        let waiter = self.lock_pending()?.remove(&envelope.tag);
        match waiter {
            Some(waiter) => match waiter.responder.send(envelope) {
                Ok(()) => Ok(None),
                // waiter went away after registering
                Err(envelope) => {
                    global_metrics().unsolicited_response();
                    Ok(Some(envelope))
                }
            },
            None => {
                global_metrics().unsolicited_response();
                Ok(Some(envelope))
            }
        }
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().map(|p| p.len()).unwrap_or(0)
    }

    /// Drop the record for `tag` if it is still the one registered as `id`.
    fn forget(&self, tag: &str, id: u64) {
        if let Ok(mut pending) = self.lock_pending() {
            if pending.get(tag).is_some_and(|p| p.id == id) {
                pending.remove(tag);
            }
        }
    }

    fn lock_pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Pending>>> {
        self.pending
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_tags_are_unique() {
        let (link, _peer) = memory::link(1);
        let dispatcher = Dispatcher::new(link.outbound, None);
        let a = dispatcher.next_tag().unwrap();
        let b = dispatcher.next_tag().unwrap();
        assert_ne!(a, b);
        assert!(a.contains(".--"));
    }

    #[tokio::test]
    async fn test_unsolicited_is_returned() {
        let (link, _peer) = memory::link(1);
        let dispatcher = Dispatcher::new(link.outbound, None);
        let env = Envelope::new("nobody", Bytes::from_static(b"{}"));
        let back = dispatcher.deliver(env.clone()).unwrap();
        assert_eq!(back, Some(env));
    }

    #[tokio::test]
    async fn test_issue_resolves_on_matching_tag() {
        let (link, mut peer) = memory::link(4);
        let dispatcher = Arc::new(Dispatcher::new(link.outbound, None));

        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .issue(Envelope::new("r1", Bytes::from_static(b"[]")))
                    .await
            })
        };

        let request = peer.recv().await.unwrap();
        assert_eq!(request.tag, "r1");
        assert_eq!(dispatcher.pending_count(), 1);

        let reply = Envelope::new("r1", Bytes::from_static(b"{\"status\":200}"));
        assert!(dispatcher.deliver(reply).unwrap().is_none());
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(&response.payload[..], b"{\"status\":200}");
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_tag_is_assigned() {
        let (link, mut peer) = memory::link(4);
        let dispatcher = Arc::new(Dispatcher::new(link.outbound, None));
        let d = dispatcher.clone();
        let waiter = tokio::spawn(async move { d.issue(Envelope::new("", Bytes::new())).await });

        let request = peer.recv().await.unwrap();
        assert!(!request.tag.is_empty());
        dispatcher
            .deliver(Envelope::new(request.tag.clone(), Bytes::new()))
            .unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().tag, request.tag);
    }

    #[tokio::test]
    async fn test_cancelled_issue_clears_record() {
        let (link, mut peer) = memory::link(4);
        let dispatcher = Dispatcher::new(link.outbound, None);

        // the select drops the issue future once the request is on the wire
        tokio::select! {
            _ = dispatcher.issue(Envelope::new("gone", Bytes::new())) => panic!("no response was sent"),
            sent = peer.recv() => assert_eq!(sent.unwrap().tag, "gone"),
        }
        assert_eq!(dispatcher.pending_count(), 0);
        assert!(dispatcher.deliver(Envelope::new("gone", Bytes::new())).unwrap().is_some());
    }
}
