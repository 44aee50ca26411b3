use crate::*;

/// Closing the done broadcast drains every prober; all peers end up on
/// the deleted list.
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_broadcast_drains_all_probers() {
    let (target_a, addr_a) = start_node("TargetA,TT", 0, 10, 100).await;
    let (target_b, addr_b) = start_node("TargetB,TT", 0, 10, 100).await;
    let prober = start_quiet_node("Prober,PP", 0, 1, 100);

    prober
        .add_ping_target(&format!("http://{}/v1/ping", addr_a), "", "unknown")
        .unwrap();
    prober
        .add_ping_target(&format!("http://{}/v1/ping", addr_b), "", "unknown")
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert_eq!(prober.snapshot().num_active, 2);

    prober.close_done();
    wait_with_deadline(&prober, 15).await;

    let snap = prober.snapshot();
    assert_eq!(snap.num_active, 0);
    assert_eq!(snap.peers.len(), 0);
    assert_eq!(snap.del_peers.len(), 2);
    assert_eq!(snap.num_deleted, 2);

    target_a.close_done();
    target_b.close_done();
    wait_with_deadline(&target_a, 10).await;
    wait_with_deadline(&target_b, 10).await;
}

/// The /v1/quit endpoint triggers the same drain as a signal.
#[tokio::test(flavor = "multi_thread")]
async fn quit_endpoint_drains_probers() {
    let (target, target_addr) = start_node("Target,TT", 0, 10, 100).await;
    let (node, addr) = start_node("Self,SS", 0, 1, 100).await;

    node.add_ping_target(&format!("http://{}/v1/ping", target_addr), "", "unknown")
        .unwrap();

    let body = reqwest::get(format!("http://{}/v1/quit", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("shutting down"), "body: {}", body);
    assert!(node.done_closed());

    wait_with_deadline(&node, 15).await;
    let snap = node.snapshot();
    assert_eq!(snap.num_active, 0);
    assert_eq!(snap.del_peers.len(), 1);

    target.close_done();
    wait_with_deadline(&target, 10).await;
}

/// A node's own admin server answers while its probers sample a peer,
/// and the peers document reflects live sampling.
#[tokio::test(flavor = "multi_thread")]
async fn peers_document_tracks_live_sampling() {
    let (target, target_addr) = start_node("Target,TT", 0, 10, 100).await;
    let (node, addr) = start_node("Self,SS", 0, 1, 100).await;

    node.add_ping_target(&format!("http://{}/v1/ping", target_addr), "", "unknown")
        .unwrap();

    // wait until at least one sample landed
    wait_until(&node, 15, |snap| {
        snap.peers.first().map(|p| p.pings >= 1).unwrap_or(false)
    })
    .await;

    let json: serde_json::Value = reqwest::get(format!("http://{}/v1/peers", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["NumActive"], 1);
    let peer = &json["Peers"][0];
    assert!(peer["Pings"].as_i64().unwrap() >= 1);
    assert_eq!(peer["Location"], "Target,TT");
    assert!(peer["PingTotals"]["TcpHs"].as_i64().unwrap() >= 0);

    node.close_done();
    target.close_done();
    wait_with_deadline(&node, 15).await;
    wait_with_deadline(&target, 10).await;
}
