//! End-to-end scenarios, driven in-process.
//!
//! Fixture nodes bound to ephemeral loopback ports stand in for remote
//! peers, so the full prober → admin-surface → registry path runs without
//! touching the external network.

mod lifecycle;
mod meshexp;
mod prober;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pingmesh_node::{MeshNode, NodeSettings};

/// Start a node with its admin server on an ephemeral loopback port.
pub async fn start_node(
    location: &str,
    limit: i64,
    delay: i64,
    maxfail: i64,
) -> (Arc<MeshNode>, SocketAddr) {
    let node = MeshNode::new(NodeSettings {
        location: location.to_string(),
        limit,
        delay,
        maxfail,
        ..NodeSettings::default()
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_node = node.clone();
    tokio::spawn(async move {
        pingmesh_api::serve_listener(server_node, listener)
            .await
            .unwrap();
    });

    (node, addr)
}

/// A prober-only node, no admin server.
pub fn start_quiet_node(location: &str, limit: i64, delay: i64, maxfail: i64) -> Arc<MeshNode> {
    MeshNode::new(NodeSettings {
        location: location.to_string(),
        limit,
        delay,
        maxfail,
        verbose: 0,
        ..NodeSettings::default()
    })
}

/// Wait for the node's tasks to drain, failing the test on timeout.
pub async fn wait_with_deadline(node: &Arc<MeshNode>, secs: u64) {
    tokio::time::timeout(Duration::from_secs(secs), node.wait())
        .await
        .expect("node tasks should drain within the deadline");
}

/// Poll `pred` against the node snapshot until it holds or the deadline
/// passes.
pub async fn wait_until(
    node: &Arc<MeshNode>,
    secs: u64,
    pred: impl Fn(&pingmesh_core::snapshot::NodeSnapshot) -> bool,
) -> pingmesh_core::snapshot::NodeSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    loop {
        let snap = node.snapshot();
        if pred(&snap) {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in {}s: {:?}",
            secs,
            snap
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
