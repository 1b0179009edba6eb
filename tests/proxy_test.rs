//! Bridge integration tests: correlation, origin filtering, readiness, and
//! end-to-end relaying to a scripted converter.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use tokio::sync::mpsc;

use mediabridge::proxy::{
    ActionEnvelope, BridgeState, Envelope, HostMessage, Port, PortSender, ProxyConverter,
    ResponseEnvelope,
};
use mediabridge::{DecodeOptions, Error, FormatKey, ProxyConfig, TargetSpec, Track};

use common::{BridgeHarness, CALLER_ORIGIN, HOST_ORIGIN};

/// The host end of a bridge, driven by hand.
struct ManualHost {
    host: PortSender<HostMessage>,
    intruder: PortSender<HostMessage>,
    actions: mpsc::Receiver<Envelope<ActionEnvelope>>,
}

impl ManualHost {
    async fn next_action(&mut self) -> ActionEnvelope {
        self.actions.recv().await.unwrap().message
    }

    async fn respond(&self, response: ResponseEnvelope) {
        self.host.post(HostMessage::Response(response)).await.unwrap();
    }
}

fn manual_bridge() -> (ProxyConverter, ManualHost) {
    let (action_tx, actions) = mpsc::channel(16);
    let (host_tx, host_rx) = mpsc::channel(16);
    let port = Port {
        sender: PortSender::new(CALLER_ORIGIN, action_tx),
        inbound: host_rx,
    };
    let config = ProxyConfig {
        origin: HOST_ORIGIN.to_string(),
        ..ProxyConfig::default()
    };

    let host = ManualHost {
        host: PortSender::new(HOST_ORIGIN, host_tx.clone()),
        intruder: PortSender::new("https://evil.example.com", host_tx),
        actions,
    };
    (ProxyConverter::new(&config, port), host)
}

fn output(line: &str) -> serde_json::Value {
    json!({ "files": null, "output": [line], "stdout": [line], "stderr": [] })
}

// ---------------------------------------------------------------------------
// Correlation and origin filtering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn responses_route_by_id_in_any_order() {
    let (proxy, mut host) = manual_bridge();
    host.host.post(HostMessage::Ready).await.unwrap();

    let webm = tokio::spawn(proxy.run_raw_command("webm", "-formats"));
    let mp4 = tokio::spawn(proxy.run_raw_command("mp4", "-codecs"));

    let first = host.next_action().await;
    let second = host.next_action().await;
    assert_eq!(proxy.pending_count(), 2);

    // Answer in reverse arrival order, each with its own arguments echoed.
    for action in [&second, &first] {
        let arguments = action.args[1].as_str().unwrap();
        host.respond(ResponseEnvelope::data(action.id, output(arguments))).await;
    }

    assert_eq!(webm.await.unwrap().unwrap().stdout, vec!["-formats"]);
    assert_eq!(mp4.await.unwrap().unwrap().stdout, vec!["-codecs"]);
    assert_eq!(proxy.pending_count(), 0);
}

#[tokio::test]
async fn foreign_origin_leaves_pending_untouched() {
    let (proxy, mut host) = manual_bridge();
    host.host.post(HostMessage::Ready).await.unwrap();

    let call = tokio::spawn(proxy.run_raw_command("webm", "-version"));
    let action = host.next_action().await;

    host.intruder
        .post(HostMessage::Response(ResponseEnvelope::error(action.id, "forged")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(proxy.pending_count(), 1);
    assert!(!call.is_finished());

    host.respond(ResponseEnvelope::data(action.id, output("real"))).await;
    assert_eq!(call.await.unwrap().unwrap().stdout, vec!["real"]);
}

#[tokio::test]
async fn remote_error_rejects_only_its_call() {
    let (proxy, mut host) = manual_bridge();
    host.host.post(HostMessage::Ready).await.unwrap();

    let failing = tokio::spawn(proxy.run_raw_command("webm", "-bogus"));
    let fine = tokio::spawn(proxy.run_raw_command("mp4", "-version"));
    let first = host.next_action().await;
    let second = host.next_action().await;

    let (webm_action, mp4_action) = if first.args[0] == json!("webm") {
        (first, second)
    } else {
        (second, first)
    };
    host.respond(ResponseEnvelope::error(webm_action.id, "Process Exit: 1")).await;
    host.respond(ResponseEnvelope::data(mp4_action.id, output("ok"))).await;

    assert_matches!(failing.await.unwrap(), Err(Error::Remote(msg)) if msg == "Process Exit: 1");
    assert_eq!(fine.await.unwrap().unwrap().stdout, vec!["ok"]);
}

// ---------------------------------------------------------------------------
// Readiness gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn calls_wait_for_ready() {
    let (proxy, mut host) = manual_bridge();
    assert_eq!(proxy.state(), BridgeState::Spawning);

    let call = tokio::spawn(proxy.run_raw_command("webm", "-version"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(host.actions.try_recv().is_err());

    host.host.post(HostMessage::Ready).await.unwrap();
    let action = host.next_action().await;
    assert_eq!(action.operation, "run-raw-command");
    assert_eq!(proxy.state(), BridgeState::Ready);

    host.respond(ResponseEnvelope::data(action.id, output("v"))).await;
    call.await.unwrap().unwrap();
}

#[tokio::test]
async fn closing_the_port_rejects_everything_in_flight() {
    let (proxy, mut host) = manual_bridge();
    host.host.post(HostMessage::Ready).await.unwrap();

    let call = tokio::spawn(proxy.run_raw_command("webm", "-version"));
    let _action = host.next_action().await;
    drop(host);

    assert_matches!(call.await.unwrap(), Err(Error::BridgeClosed));
    assert_eq!(proxy.state(), BridgeState::Closed);
    assert_matches!(
        proxy.run_raw_command("mp4", "-version").await,
        Err(Error::BridgeClosed)
    );
}

// ---------------------------------------------------------------------------
// End to end through ProxyHost
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decode_over_the_bridge() {
    let bridge = BridgeHarness::new();
    let source = Track::new("song.webm", b"not really webm".to_vec());

    let track = bridge
        .proxy
        .decode(&source, "song.ogg", DecodeOptions::default())
        .await
        .unwrap();

    assert_eq!(track.name, "song.ogg");
    assert_eq!(&track.data[..], b"-i song.webm -vn -f ogg -acodec copy song.ogg");
}

#[tokio::test]
async fn encode_and_transform_over_the_bridge() {
    let bridge = BridgeHarness::new();
    let source = Track::new("talk.mp4", b"not really mp4".to_vec());

    let encoded = bridge
        .proxy
        .encode(&source, TargetSpec::new("talk.wav"))
        .await
        .unwrap();
    let clipped = bridge
        .proxy
        .transform(&source, TargetSpec::new("clip.m4a").with_duration(1.5))
        .await
        .unwrap();

    assert_eq!(encoded.name, "talk.wav");
    assert_eq!(clipped.name, "clip.m4a");
    assert_eq!(bridge.factory.runs().len(), 2);
}

#[tokio::test]
async fn bridge_preserves_per_format_order() {
    let bridge = BridgeHarness::new();

    let calls = vec![
        bridge.proxy.run_raw_command("webm", "delay=30 first"),
        bridge.proxy.run_raw_command("webm", "delay=5 second"),
        bridge.proxy.run_raw_command("webm", "third"),
    ];
    let handles: Vec<_> = calls.into_iter().rev().map(tokio::spawn).collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let issued: Vec<_> = bridge
        .factory
        .runs()
        .into_iter()
        .map(|run| run.request.arguments.join(" "))
        .collect();
    assert_eq!(issued, vec!["delay=30 first", "delay=5 second", "third"]);
    assert_eq!(bridge.factory.max_concurrent(&FormatKey::new("webm")), 1);
}

#[tokio::test]
async fn remote_failures_surface_as_remote_errors() {
    let bridge = BridgeHarness::new();

    let err = bridge.proxy.run_raw_command("mp4", "fail=2").await.unwrap_err();
    assert_matches!(err, Error::Remote(msg) if msg == "Process Exit: 2");

    let err = bridge.proxy.run_raw_command("mp4", "crash").await.unwrap_err();
    assert_matches!(err, Error::Remote(msg) if msg.starts_with("Unit failure"));

    // The bridge itself is unaffected.
    let output = bridge.proxy.run_raw_command("mp4", "-version").await.unwrap();
    assert_eq!(output.stdout, vec!["-version"]);
}

#[tokio::test]
async fn unknown_format_is_rejected_before_sending() {
    let bridge = BridgeHarness::new();

    let err = bridge.proxy.run_raw_command("flac", "-version").await.unwrap_err();
    assert_matches!(err, Error::UnsupportedFormat { .. });
    assert_eq!(bridge.proxy.pending_count(), 0);
}
