//! The remote side of the bridge: executes actions on a local converter.

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;

use mediabridge_common::{CorrelationId, Result};

use super::envelope::{ActionEnvelope, BridgeRequest, HostMessage, ResponseEnvelope};
use super::port::{check_origin, Envelope, HostPort};
use crate::converter::Converter;

/// Serves bridge actions from a caller using a local [`Converter`].
#[derive(Debug)]
pub struct ProxyHost {
    converter: Converter,
    port: HostPort,
    caller_origin: Option<String>,
}

impl ProxyHost {
    pub fn new(converter: Converter, port: HostPort) -> Self {
        Self {
            converter,
            port,
            caller_origin: None,
        }
    }

    /// Only accept actions posted from `origin`.
    pub fn with_caller_origin(mut self, origin: impl Into<String>) -> Self {
        self.caller_origin = Some(origin.into());
        self
    }

    /// Announce readiness, then answer actions until the caller goes away.
    ///
    /// Each action is scheduled on the converter as soon as it arrives, so
    /// actions for the same format execute in arrival order; the responses
    /// are posted as the runs finish.
    pub async fn serve(self) -> Result<()> {
        let Self {
            converter,
            port,
            caller_origin,
        } = self;
        let mut inbound = port.inbound;
        let sender = port.sender;

        sender.post(HostMessage::Ready).await?;
        tracing::info!(origin = %sender.origin(), "Bridge host ready");

        while let Some(Envelope { origin, message }) = inbound.recv().await {
            if let Some(expected) = &caller_origin {
                if let Err(e) = check_origin(expected, &origin) {
                    tracing::debug!("Dropping bridge action: {e}");
                    continue;
                }
            }

            let response = dispatch(&converter, message);
            let sender = sender.clone();
            tokio::spawn(async move {
                let response = response.await;
                if sender.post(HostMessage::Response(response)).await.is_err() {
                    tracing::debug!("Caller went away before the response was posted");
                }
            });
        }

        tracing::info!("Bridge host stopped");
        Ok(())
    }

    /// Run [`serve`](Self::serve) on a background task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.serve())
    }
}

/// Schedule the action on `converter` and build its response.
fn dispatch(converter: &Converter, action: ActionEnvelope) -> BoxFuture<'static, ResponseEnvelope> {
    let id = action.id;
    let request = match BridgeRequest::from_envelope(&action) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(id = %id, "Rejecting bridge action: {e}");
            return futures::future::ready(ResponseEnvelope::error(id, e.to_string())).boxed();
        }
    };

    tracing::debug!(id = %id, operation = request.operation(), "Dispatching bridge action");
    match request {
        BridgeRequest::RunRawCommand { format, arguments } => {
            let run = converter.run_raw_command(format, &arguments);
            async move { data_response(id, run.await) }.boxed()
        }
        BridgeRequest::Info { format } => {
            let run = converter.info(format);
            async move { data_response(id, run.await) }.boxed()
        }
        BridgeRequest::Decode {
            source,
            target,
            options,
        } => {
            let run = converter.decode(&source, &target, options);
            async move { track_response(id, run.await) }.boxed()
        }
        BridgeRequest::Encode { source, target } => {
            let run = converter.encode(&source, target);
            async move { track_response(id, run.await) }.boxed()
        }
        BridgeRequest::Transform { source, target } => {
            let run = converter.transform(&source, target);
            async move { track_response(id, run.await) }.boxed()
        }
    }
}

fn data_response<T: serde::Serialize>(id: CorrelationId, outcome: Result<T>) -> ResponseEnvelope {
    match outcome.and_then(|value| Ok(serde_json::to_value(value)?)) {
        Ok(data) => ResponseEnvelope::data(id, data),
        Err(e) => ResponseEnvelope::error(id, e.to_string()),
    }
}

fn track_response(id: CorrelationId, outcome: Result<mediabridge_common::Track>) -> ResponseEnvelope {
    match outcome {
        Ok(track) => ResponseEnvelope::track(id, track),
        Err(e) => ResponseEnvelope::error(id, e.to_string()),
    }
}
