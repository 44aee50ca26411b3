//! Mesh expansion: enroll the peers of a peer.

use std::sync::Arc;

use anyhow::Result;

use pingmesh_core::url::{canonicalize, UrlError};
use pingmesh_probe::fetch_remote_peer;

use crate::node::{Enrolled, MeshNode};

/// Fetch the peer list of the node at `url` in the background and enroll
/// every listed peer this node does not know yet. Already-present peers
/// are quietly left alone.
pub fn spawn_expansion(node: &Arc<MeshNode>, url: &str, ip: &str) {
    node.task_add();
    let node = Arc::clone(node);
    let url = url.to_string();
    let ip = ip.to_string();
    tokio::spawn(async move {
        if let Err(err) = expand(&node, &url, &ip).await {
            tracing::warn!(url, err = format!("{err:#}"), "mesh expansion failed");
        }
        node.task_done();
    });
}

async fn expand(node: &Arc<MeshNode>, url: &str, ip: &str) -> Result<()> {
    let peers_url = peers_url_of(url)?;
    let snapshot = fetch_remote_peer(&peers_url, ip).await?;

    let mut enrolled = 0;
    for peer in &snapshot.peers {
        match node.add_ping_target(&peer.url, &peer.peer_ip, &snapshot.srv_loc) {
            Ok(Enrolled::New(_)) => enrolled += 1,
            Ok(Enrolled::AlreadyPresent(_)) => {}
            Err(err) => {
                tracing::warn!(url = %peer.url, %err, "cannot enroll remote peer");
            }
        }
    }

    tracing::info!(
        primary = peers_url,
        listed = snapshot.peers.len(),
        enrolled,
        "mesh expansion complete"
    );
    Ok(())
}

/// The `/v1/peers` endpoint of whatever URL the caller gave us.
fn peers_url_of(url: &str) -> Result<String, UrlError> {
    let mut canon = canonicalize(url)?;
    canon.path = "/v1/peers".to_string();
    Ok(canon.url_string())
}
