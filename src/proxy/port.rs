//! In-memory message ports between the caller and the remote host.
//!
//! Every message travels in an [`Envelope`] stamped with the sender's origin,
//! which the receiving side checks against the origin it expects.

use tokio::sync::mpsc;

use mediabridge_common::{Error, Result};

use super::envelope::{ActionEnvelope, HostMessage};

/// A message together with the origin of the context that posted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub origin: String,
    pub message: T,
}

/// Posting half of a port. Stamps every message with the local origin.
#[derive(Debug)]
pub struct PortSender<T> {
    origin: String,
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> PortSender<T> {
    pub fn new(origin: impl Into<String>, tx: mpsc::Sender<Envelope<T>>) -> Self {
        Self {
            origin: origin.into(),
            tx,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Post a message; fails with [`Error::BridgeClosed`] once the peer is gone.
    pub async fn post(&self, message: T) -> Result<()> {
        self.tx
            .send(Envelope {
                origin: self.origin.clone(),
                message,
            })
            .await
            .map_err(|_| Error::BridgeClosed)
    }
}

/// One end of a bidirectional port.
#[derive(Debug)]
pub struct Port<Out, In> {
    pub sender: PortSender<Out>,
    pub inbound: mpsc::Receiver<Envelope<In>>,
}

/// The caller's end: posts actions, receives host messages.
pub type CallerPort = Port<ActionEnvelope, HostMessage>;

/// The host's end: posts host messages, receives actions.
pub type HostPort = Port<HostMessage, ActionEnvelope>;

/// Connect a caller living at `caller_origin` with a host at `host_origin`.
pub fn connect(caller_origin: &str, host_origin: &str, capacity: usize) -> (CallerPort, HostPort) {
    let (action_tx, action_rx) = mpsc::channel(capacity);
    let (host_tx, host_rx) = mpsc::channel(capacity);

    let caller = Port {
        sender: PortSender::new(caller_origin, action_tx),
        inbound: host_rx,
    };
    let host = Port {
        sender: PortSender::new(host_origin, host_tx),
        inbound: action_rx,
    };
    (caller, host)
}

/// Normalize an origin for comparison.
///
/// URLs reduce to `scheme://host[:port]` with default ports dropped;
/// anything that does not parse as a URL is compared verbatim.
pub fn normalize_origin(origin: &str) -> String {
    match url::Url::parse(origin.trim()) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => origin.trim().to_string(),
    }
}

/// Check that `actual` is the `expected` origin.
pub fn check_origin(expected: &str, actual: &str) -> Result<()> {
    if normalize_origin(expected) == normalize_origin(actual) {
        Ok(())
    } else {
        Err(Error::OriginMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_normalize_origin() {
        assert_eq!(
            normalize_origin("https://Converter.Example.com:443/worker.html"),
            "https://converter.example.com"
        );
        assert_eq!(normalize_origin("http://localhost:8080/"), "http://localhost:8080");
        assert_eq!(normalize_origin("null"), "null");
    }

    #[test]
    fn test_check_origin() {
        assert!(check_origin("https://a.example.com", "https://a.example.com/").is_ok());
        assert_matches!(
            check_origin("https://a.example.com", "https://evil.example.com"),
            Err(Error::OriginMismatch { .. })
        );
        assert!(check_origin("https://a.example.com", "http://a.example.com").is_err());
    }

    #[tokio::test]
    async fn test_connect_stamps_origins() {
        let (caller, mut host) = connect("https://app.example.com", "https://converter.example.com", 4);
        caller
            .sender
            .post(ActionEnvelope {
                id: mediabridge_common::CorrelationId::new(),
                operation: "info".into(),
                args: vec![],
            })
            .await
            .unwrap();

        let envelope = host.inbound.recv().await.unwrap();
        assert_eq!(envelope.origin, "https://app.example.com");
        assert_eq!(envelope.message.operation, "info");
    }

    #[tokio::test]
    async fn test_post_after_peer_dropped() {
        let (caller, host) = connect("a", "b", 1);
        drop(host);
        let result = caller.sender.post(ActionEnvelope {
            id: mediabridge_common::CorrelationId::new(),
            operation: "info".into(),
            args: vec![],
        });
        assert_matches!(result.await, Err(Error::BridgeClosed));
    }
}
