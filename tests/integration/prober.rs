use crate::*;

/// A peer with a sample limit gets probed, retired, and moved to the
/// deleted list once the limit is reached.
#[tokio::test(flavor = "multi_thread")]
async fn bounded_run_reaches_limit_and_retires() {
    let (target, target_addr) = start_node("Target,TT", 0, 10, 100).await;
    let prober = start_quiet_node("Prober,PP", 3, 1, 100);

    prober
        .add_ping_target(&format!("http://{}/v1/ping", target_addr), "", "unknown")
        .unwrap();

    wait_with_deadline(&prober, 20).await;

    let snap = prober.snapshot();
    assert_eq!(snap.num_active, 0);
    assert_eq!(snap.num_deleted, 1);
    assert_eq!(snap.peers.len(), 0);
    assert_eq!(snap.del_peers.len(), 1);

    let peer = &snap.del_peers[0];
    assert_eq!(peer.pings, 3);
    assert_eq!(peer.fails, 0);
    // the target's advertised location was adopted from the ping marker
    assert_eq!(peer.location, "Target,TT");
    assert_eq!(peer.peer_ip, "127.0.0.1");
    assert!(peer.first_ping.unwrap() <= peer.latest_ping.unwrap());

    let totals = peer.ping_totals.as_ref().unwrap();
    assert!(totals.size > 0);
    assert_eq!(totals.resp_code, 200);

    target.close_done();
    wait_with_deadline(&target, 10).await;
}

/// An unreachable peer burns through its failure budget and retires with
/// zero successful samples.
#[tokio::test(flavor = "multi_thread")]
async fn failure_ceiling_retires_peer() {
    let prober = start_quiet_node("Prober,PP", 0, 1, 3);

    prober
        .add_ping_target("http://127.0.0.1:1/", "", "unknown")
        .unwrap();

    wait_with_deadline(&prober, 20).await;

    let snap = prober.snapshot();
    assert_eq!(snap.num_active, 0);
    assert_eq!(snap.del_peers.len(), 1);

    let peer = &snap.del_peers[0];
    assert_eq!(peer.pings, 0);
    assert_eq!(peer.fails, 3);
    assert!(peer.ping_totals.is_none());
}

/// Counters respect their configured bounds at termination.
#[tokio::test(flavor = "multi_thread")]
async fn counters_respect_limits_at_exit() {
    let (target, target_addr) = start_node("Target,TT", 0, 10, 100).await;
    let prober = start_quiet_node("Prober,PP", 2, 1, 5);

    prober
        .add_ping_target(&format!("http://{}/v1/ping", target_addr), "", "unknown")
        .unwrap();
    wait_with_deadline(&prober, 20).await;

    let snap = prober.snapshot();
    let peer = &snap.del_peers[0];
    assert!(peer.pings <= 2);
    assert!(peer.fails <= 5);
    assert!(peer.pings + peer.fails <= 2 + 5);

    target.close_done();
    wait_with_deadline(&target, 10).await;
}
