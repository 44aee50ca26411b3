use crate::*;

/// Mesh expansion: enrolling a peer with addpeers=true pulls in that
/// peer's own peers transitively.
#[tokio::test(flavor = "multi_thread")]
async fn addpeer_with_expansion_enrolls_the_peers_of_the_peer() {
    // Node A knows two (unreachable) peers; large delay keeps them active.
    let (node_a, addr_a) = start_node("NodeA,AA", 0, 600, 100).await;
    node_a
        .add_ping_target("http://127.0.0.1:1/", "", "P1,XX")
        .unwrap();
    node_a
        .add_ping_target("http://127.0.0.1:2/", "", "P2,XX")
        .unwrap();
    assert_eq!(node_a.snapshot().num_active, 2);

    // Node B starts empty and enrolls A transitively.
    let (node_b, addr_b) = start_node("NodeB,BB", 0, 600, 100).await;
    let enroll = format!(
        "http://{}/v1/addpeer?url=http://{}/v1/peers&addpeers=true",
        addr_b, addr_a
    );
    let body = reqwest::get(&enroll).await.unwrap().text().await.unwrap();
    assert!(body.contains("Now pinging"), "body: {}", body);

    // B ends up with A plus A's two peers.
    let snap = wait_until(&node_b, 15, |snap| snap.num_active == 3).await;
    let hosts: Vec<&str> = snap.peers.iter().map(|p| p.host.as_str()).collect();
    assert!(hosts.contains(&format!("{}", addr_a).as_str()), "hosts: {:?}", hosts);
    assert!(hosts.contains(&"127.0.0.1:1"), "hosts: {:?}", hosts);
    assert!(hosts.contains(&"127.0.0.1:2"), "hosts: {:?}", hosts);

    // enrolled peers start with the primary's advertised location
    let p1 = snap.peers.iter().find(|p| p.host == "127.0.0.1:1").unwrap();
    assert_eq!(p1.location, "NodeA,AA");

    // a second expansion is a no-op thanks to dedup
    let body = reqwest::get(&enroll).await.unwrap().text().await.unwrap();
    assert!(body.contains("already being pinged"), "body: {}", body);
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(node_b.snapshot().num_active, 3);

    node_a.close_done();
    node_b.close_done();
    wait_with_deadline(&node_a, 15).await;
    wait_with_deadline(&node_b, 15).await;
}
