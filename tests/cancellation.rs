//! End-to-end cancellation through the HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use vehicle_gateway::config::{GatewayConfig, OutboundConfig};
use vehicle_gateway::dispatch::RelayHandler;
use vehicle_gateway::lifecycle::Shutdown;

mod common;

async fn slow_gateway(backend_addr: SocketAddr, gateway_addr: SocketAddr, shutdown: &Shutdown) {
    common::start_programmable_backend(backend_addr, |_| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        (200, "{}".into())
    })
    .await;

    let mut config = GatewayConfig::default();
    config.outbound = OutboundConfig {
        upstream_url: Some(format!("http://{}/rpc", backend_addr)),
        timeout_ms: 30_000,
        ..OutboundConfig::default()
    };
    let relay = RelayHandler::from_config(&config.outbound).unwrap();
    common::start_gateway(gateway_addr, config, Arc::new(relay), shutdown).await;
}

#[tokio::test]
async fn test_cancel_notification_aborts_inflight_call() {
    let backend_addr: SocketAddr = "127.0.0.1:28481".parse().unwrap();
    let gateway_addr: SocketAddr = "127.0.0.1:28482".parse().unwrap();
    let shutdown = Shutdown::new();
    slow_gateway(backend_addr, gateway_addr, &shutdown).await;

    let endpoint = format!("http://{}/mcp", gateway_addr);
    let started = Instant::now();

    let call = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            common::client()
                .post(endpoint)
                .header("mcp-session-id", "sess-cancel")
                .json(&json!({"jsonrpc": "2.0", "id": 42, "method": "wake_up"}))
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;

    let ack = common::client()
        .post(&endpoint)
        .header("mcp-session-id", "sess-cancel")
        .json(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 42, "reason": "user aborted"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(ack.status(), 202);

    let body = tokio::time::timeout(Duration::from_secs(3), call)
        .await
        .expect("cancelled call should return promptly")
        .unwrap();
    assert_eq!(body["id"], 42);
    assert_eq!(body["error"]["code"], -32800);
    assert!(started.elapsed() < Duration::from_secs(5));

    shutdown.trigger();
}

#[tokio::test]
async fn test_cancel_for_other_session_is_ignored() {
    let backend_addr: SocketAddr = "127.0.0.1:28483".parse().unwrap();
    let gateway_addr: SocketAddr = "127.0.0.1:28484".parse().unwrap();
    let shutdown = Shutdown::new();
    slow_gateway(backend_addr, gateway_addr, &shutdown).await;

    let endpoint = format!("http://{}/mcp", gateway_addr);

    let call = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            common::client()
                .post(endpoint)
                .header("mcp-session-id", "sess-a")
                .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "wake_up"}))
                .send()
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;

    let ack = common::client()
        .post(&endpoint)
        .header("mcp-session-id", "sess-b")
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 7}}))
        .send()
        .await
        .unwrap();
    assert_eq!(ack.status(), 202);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!call.is_finished(), "request on another session must keep running");

    // Ending the owning session cancels it.
    let end = common::client()
        .delete(&endpoint)
        .header("mcp-session-id", "sess-a")
        .send()
        .await
        .unwrap();
    assert_eq!(end.status(), 204);

    let body: Value = tokio::time::timeout(Duration::from_secs(3), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32800);

    shutdown.trigger();
}
