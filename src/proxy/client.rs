//! The caller's side of the bridge.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use mediabridge_common::{CorrelationId, Error, FormatKey, Result, Track};

use super::envelope::{ActionEnvelope, BridgeReply, BridgeRequest, HostMessage};
use super::port::{check_origin, normalize_origin, CallerPort, Envelope, PortSender};
use crate::config::ProxyConfig;
use crate::converter::{DecodeOptions, EngineCapabilities, TargetSpec};
use crate::demux::RunOutput;
use crate::queue::TaskQueue;

/// Lifecycle of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// The remote host exists but has not announced itself yet.
    Spawning,
    /// The remote host accepts actions.
    Ready,
    /// The port closed; no further responses will arrive.
    Closed,
}

type Pending = Arc<Mutex<HashMap<CorrelationId, oneshot::Sender<Result<BridgeReply>>>>>;

/// Converter facade whose operations run on a remote [`ProxyHost`](super::ProxyHost).
///
/// Operations wait for the host's `ready` announcement, then go through a
/// per-format queue like the local converter. Responses are matched to calls
/// by correlation id, so they may arrive in any order.
#[derive(Clone)]
pub struct ProxyConverter {
    inner: Arc<Inner>,
}

struct Inner {
    remote_origin: String,
    formats: HashSet<FormatKey>,
    max_in_flight: usize,
    sender: PortSender<ActionEnvelope>,
    pending: Pending,
    state: watch::Receiver<BridgeState>,
    queue: TaskQueue<FormatKey>,
    inbound: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

impl std::fmt::Debug for ProxyConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConverter")
            .field("remote_origin", &self.inner.remote_origin)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ProxyConverter {
    /// Attach to the caller end of a port.
    ///
    /// Must be called from within a tokio runtime; the inbound handler runs
    /// as a background task until the port closes.
    pub fn new(config: &ProxyConfig, port: CallerPort) -> Self {
        let remote_origin = normalize_origin(&config.origin);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (state_tx, state) = watch::channel(BridgeState::Spawning);

        let inbound = tokio::spawn(inbound_loop(
            remote_origin.clone(),
            port.inbound,
            pending.clone(),
            state_tx,
        ));

        Self {
            inner: Arc::new(Inner {
                remote_origin,
                formats: config.formats.iter().map(FormatKey::new).collect(),
                max_in_flight: config.max_in_flight,
                sender: port.sender,
                pending,
                state,
                queue: TaskQueue::new(),
                inbound,
            }),
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    /// Number of actions awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Wait until the remote host is ready.
    ///
    /// # Errors
    ///
    /// [`Error::BridgeClosed`] if the port closes first.
    pub async fn ready(&self) -> Result<()> {
        wait_ready(self.inner.state.clone()).await
    }

    /// Send one action and wait for its response.
    ///
    /// Bypasses the readiness gate and the per-format queue.
    pub async fn send(&self, request: BridgeRequest) -> Result<BridgeReply> {
        send(&self.inner, request).await
    }

    pub fn run_raw_command(
        &self,
        format: impl Into<FormatKey>,
        arguments: &str,
    ) -> impl Future<Output = Result<RunOutput>> + Send + 'static {
        let dispatched = self.dispatch(BridgeRequest::RunRawCommand {
            format: format.into(),
            arguments: arguments.to_string(),
        });
        async move { dispatched?.await?.into_data() }
    }

    pub fn decode(
        &self,
        source: &Track,
        target_name: &str,
        options: DecodeOptions,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        let dispatched = self.dispatch(BridgeRequest::Decode {
            source: source.clone(),
            target: target_name.to_string(),
            options,
        });
        async move { dispatched?.await?.into_track() }
    }

    pub fn encode(
        &self,
        source: &Track,
        target: TargetSpec,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        let dispatched = self.dispatch(BridgeRequest::Encode {
            source: source.clone(),
            target,
        });
        async move { dispatched?.await?.into_track() }
    }

    pub fn transform(
        &self,
        source: &Track,
        target: TargetSpec,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        let dispatched = self.dispatch(BridgeRequest::Transform {
            source: source.clone(),
            target,
        });
        async move { dispatched?.await?.into_track() }
    }

    pub fn info(
        &self,
        format: impl Into<FormatKey>,
    ) -> impl Future<Output = Result<EngineCapabilities>> + Send + 'static {
        let dispatched = self.dispatch(BridgeRequest::Info {
            format: format.into(),
        });
        async move { dispatched?.await?.into_data() }
    }

    /// Queue `request` behind the readiness gate and its format's queue.
    fn dispatch(
        &self,
        request: BridgeRequest,
    ) -> Result<impl Future<Output = Result<BridgeReply>> + Send + 'static> {
        let format = request.format();
        if !self.inner.formats.contains(&format) {
            return Err(Error::unsupported_format(format.as_str()));
        }

        let inner = self.inner.clone();
        Ok(self.inner.queue.enqueue(format, move || async move {
            wait_ready(inner.state.clone()).await?;
            send(&inner, request).await
        }))
    }
}

async fn wait_ready(mut state: watch::Receiver<BridgeState>) -> Result<()> {
    let ready = state
        .wait_for(|state| *state != BridgeState::Spawning)
        .await
        .map(|state| *state == BridgeState::Ready);

    match ready {
        Ok(true) => Ok(()),
        _ => Err(Error::BridgeClosed),
    }
}

async fn send(inner: &Inner, request: BridgeRequest) -> Result<BridgeReply> {
    let id = CorrelationId::new();
    let envelope = request.to_envelope(id)?;
    let (tx, rx) = oneshot::channel();

    {
        // The inbound loop closes the bridge and drains under this lock.
        let mut pending = inner.pending.lock();
        if *inner.state.borrow() == BridgeState::Closed {
            return Err(Error::BridgeClosed);
        }
        if pending.len() >= inner.max_in_flight {
            return Err(Error::BridgeCapacity {
                limit: inner.max_in_flight,
            });
        }
        pending.insert(id, tx);
    }

    tracing::debug!(id = %id, operation = %envelope.operation, "Posting bridge action");
    if let Err(e) = inner.sender.post(envelope).await {
        inner.pending.lock().remove(&id);
        return Err(e);
    }

    rx.await.map_err(|_| Error::BridgeClosed)?
}

async fn inbound_loop(
    remote_origin: String,
    mut inbound: mpsc::Receiver<Envelope<HostMessage>>,
    pending: Pending,
    state: watch::Sender<BridgeState>,
) {
    while let Some(envelope) = inbound.recv().await {
        if let Err(e) = check_origin(&remote_origin, &envelope.origin) {
            tracing::debug!("Dropping bridge message: {e}");
            continue;
        }

        match envelope.message {
            HostMessage::Ready => {
                let announced = state.send_if_modified(|state| {
                    let spawning = *state == BridgeState::Spawning;
                    if spawning {
                        *state = BridgeState::Ready;
                    }
                    spawning
                });
                if announced {
                    tracing::info!(origin = %remote_origin, "Bridge ready");
                }
            }
            HostMessage::Response(response) => {
                let id = response.id;
                let entry = pending.lock().remove(&id);
                match entry {
                    Some(tx) => {
                        let _ = tx.send(response.into_reply());
                    }
                    None => tracing::debug!(id = %id, "No pending action for bridge response"),
                }
            }
        }
    }

    tracing::info!(origin = %remote_origin, "Bridge closed");
    let drained: Vec<_> = {
        let mut pending = pending.lock();
        state.send_replace(BridgeState::Closed);
        pending.drain().collect()
    };
    for (_, tx) in drained {
        let _ = tx.send(Err(Error::BridgeClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::envelope::ResponseEnvelope;
    use crate::proxy::port::Port;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    const CALLER: &str = "https://app.example.com";
    const REMOTE: &str = "https://converter.example.com";

    /// The far end of a test bridge.
    struct Remote {
        host: PortSender<HostMessage>,
        intruder: PortSender<HostMessage>,
        actions: mpsc::Receiver<Envelope<ActionEnvelope>>,
    }

    fn bridge(max_in_flight: usize) -> (ProxyConverter, Remote) {
        let (action_tx, actions) = mpsc::channel(16);
        let (host_tx, host_rx) = mpsc::channel(16);
        let port = Port {
            sender: PortSender::new(CALLER, action_tx),
            inbound: host_rx,
        };
        let config = ProxyConfig {
            origin: REMOTE.into(),
            formats: vec!["webm".into(), "mp4".into()],
            max_in_flight,
        };

        let remote = Remote {
            host: PortSender::new(REMOTE, host_tx.clone()),
            intruder: PortSender::new("https://evil.example.com", host_tx),
            actions,
        };
        (ProxyConverter::new(&config, port), remote)
    }

    fn raw(format: &str) -> BridgeRequest {
        BridgeRequest::RunRawCommand {
            format: FormatKey::new(format),
            arguments: "-version".into(),
        }
    }

    #[tokio::test]
    async fn test_ready_transition() {
        let (proxy, remote) = bridge(4);
        assert_eq!(proxy.state(), BridgeState::Spawning);

        remote.intruder.post(HostMessage::Ready).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(proxy.state(), BridgeState::Spawning);

        remote.host.post(HostMessage::Ready).await.unwrap();
        proxy.ready().await.unwrap();
        assert_eq!(proxy.state(), BridgeState::Ready);
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_fast() {
        let (proxy, _remote) = bridge(4);
        let err = proxy.run_raw_command("flac", "-version").await.unwrap_err();
        assert_matches!(err, Error::UnsupportedFormat { .. });
    }

    #[tokio::test]
    async fn test_foreign_origin_is_ignored() {
        let (proxy, mut remote) = bridge(4);

        let call = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.send(raw("webm")).await }
        });
        let action = remote.actions.recv().await.unwrap();
        assert_eq!(action.origin, CALLER);
        assert_eq!(proxy.pending_count(), 1);

        remote
            .intruder
            .post(HostMessage::Response(ResponseEnvelope::error(action.message.id, "forged")))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(proxy.pending_count(), 1);

        let output = json!({ "files": null, "output": ["ok"], "stdout": ["ok"], "stderr": [] });
        remote
            .host
            .post(HostMessage::Response(ResponseEnvelope::data(action.message.id, output)))
            .await
            .unwrap();

        let reply = call.await.unwrap().unwrap();
        let output: RunOutput = reply.into_data().unwrap();
        assert_eq!(output.stdout, vec!["ok"]);
        assert_eq!(proxy.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (proxy, mut remote) = bridge(1);

        let first = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.send(raw("webm")).await }
        });
        let _action = remote.actions.recv().await.unwrap();

        let err = proxy.send(raw("mp4")).await.unwrap_err();
        assert_matches!(err, Error::BridgeCapacity { limit: 1 });

        drop(remote);
        assert_matches!(first.await.unwrap(), Err(Error::BridgeClosed));
        assert_eq!(proxy.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_waiting_calls() {
        let (proxy, remote) = bridge(4);
        let call = proxy.run_raw_command("webm", "-version");
        drop(remote);

        assert_matches!(call.await, Err(Error::BridgeClosed));
        assert_eq!(proxy.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn test_send_after_close_does_not_wait() {
        let (proxy, remote) = bridge(4);
        let Remote {
            host,
            intruder,
            mut actions,
        } = remote;
        drop((host, intruder));
        assert_matches!(proxy.ready().await, Err(Error::BridgeClosed));

        // The action channel is still open, so only the closed state can
        // stop the call from waiting for a response that never comes.
        let reply = tokio::time::timeout(Duration::from_secs(1), proxy.send(raw("webm")))
            .await
            .expect("send must not wait on a closed bridge");
        assert_matches!(reply, Err(Error::BridgeClosed));
        assert_eq!(proxy.pending_count(), 0);
        assert!(actions.try_recv().is_err());
    }
}
