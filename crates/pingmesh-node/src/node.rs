//! The mesh node: registry, counters, and shutdown coordination.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use pingmesh_core::snapshot::NodeSnapshot;
use pingmesh_core::timefmt::now_second;
use pingmesh_core::url::{canonicalize, UrlError};

use crate::peer::Peer;
use crate::sink::RespTimeSink;

/// Deleted peers kept for inspection; oldest entries fall off.
const DELETED_CAP: usize = 100;

/// Everything needed to construct a node.
#[derive(Debug, Clone, Default)]
pub struct NodeSettings {
    pub location: String,
    pub hostname: String,
    pub srv_ips: Vec<IpAddr>,
    /// Port the admin server listens on. 0 = no server.
    pub listen_port: u16,
    /// Port reported to peers; 0 falls back to the listen port.
    pub report_port: u16,
    /// Publish TCP RTT samples to the metric sink.
    pub cw_flag: bool,
    /// Default per-peer sample limit. 0 = unbounded.
    pub limit: i64,
    /// Default per-peer delay, seconds.
    pub delay: i64,
    /// Default per-peer failure ceiling.
    pub maxfail: i64,
    pub verbose: u8,
}

/// Outcome of an enrolment attempt.
pub enum Enrolled {
    /// A prober was launched for this new peer.
    New(Arc<Peer>),
    /// The `(host, ip)` pair was already being probed; nothing started.
    AlreadyPresent(Arc<Peer>),
}

/// The node singleton. Owns the peer lists, the done broadcast, and the
/// task counter shared by probers, mesh-expansion tasks, and the admin
/// server lifetime.
pub struct MeshNode {
    start: DateTime<Utc>,
    srv_loc: String,
    srv_host: String,
    srv_port: u16,
    listen_port: u16,
    verbose: u8,
    limit: i64,
    delay: i64,
    maxfail: i64,

    requests: AtomicU64,
    inner: Mutex<NodeInner>,
    tasks: TaskCounter,
    cancel: CancellationToken,
    sink: RespTimeSink,
}

struct NodeInner {
    srv_ips: Vec<IpAddr>,
    peers: Vec<Arc<Peer>>,
    del_peers: VecDeque<Arc<Peer>>,
    num_active: i64,
    num_deleted: i64,
    done_tx: Option<async_channel::Sender<i64>>,
    done_rx: async_channel::Receiver<i64>,
}

static NODE: OnceLock<Arc<MeshNode>> = OnceLock::new();

impl MeshNode {
    /// Build a fresh node. Production code goes through
    /// [`MeshNode::get_or_init`]; tests construct nodes directly.
    pub fn new(settings: NodeSettings) -> Arc<Self> {
        let (done_tx, done_rx) = async_channel::unbounded();
        let report = if settings.report_port == 0 {
            settings.listen_port
        } else {
            settings.report_port
        };

        Arc::new(Self {
            start: Utc::now(),
            srv_loc: settings.location,
            srv_host: settings.hostname,
            srv_port: report,
            listen_port: settings.listen_port,
            verbose: settings.verbose,
            limit: settings.limit,
            delay: settings.delay,
            maxfail: settings.maxfail,
            requests: AtomicU64::new(0),
            inner: Mutex::new(NodeInner {
                srv_ips: settings.srv_ips,
                peers: Vec::new(),
                del_peers: VecDeque::new(),
                num_active: 0,
                num_deleted: 0,
                done_tx: Some(done_tx),
                done_rx,
            }),
            tasks: TaskCounter::default(),
            cancel: CancellationToken::new(),
            sink: RespTimeSink::from_env(settings.cw_flag),
        })
    }

    /// The process-wide singleton: constructed on first call, returned
    /// unchanged afterwards.
    pub fn get_or_init(settings: NodeSettings) -> Arc<Self> {
        NODE.get_or_init(|| Self::new(settings)).clone()
    }

    /// The singleton, if it has been constructed.
    pub fn get() -> Option<Arc<Self>> {
        NODE.get().cloned()
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn location(&self) -> &str {
        &self.srv_loc
    }

    pub fn hostname(&self) -> &str {
        &self.srv_host
    }

    pub fn srv_port(&self) -> u16 {
        self.srv_port
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn sink(&self) -> &RespTimeSink {
        &self.sink
    }

    pub fn count_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Look up SrvIPs from the hostname when still missing, so nodes
    /// started before DNS was reachable heal on the next peers request.
    pub async fn refresh_srv_ips(&self) {
        if self.srv_host.is_empty() {
            return;
        }
        {
            let inner = self.inner.lock().unwrap();
            if !inner.srv_ips.is_empty() {
                return;
            }
        }
        let ips = lookup_ips(&self.srv_host).await;
        if !ips.is_empty() {
            self.inner.lock().unwrap().srv_ips = ips;
        }
    }

    // ── Task counter ──────────────────────────────────────────────────────────

    pub fn task_add(&self) {
        self.tasks.add();
    }

    pub fn task_done(&self) {
        self.tasks.done();
    }

    /// Resolve when every registered task has finished.
    pub async fn wait(&self) {
        self.tasks.wait().await
    }

    // ── Done broadcast ────────────────────────────────────────────────────────

    /// A receiver on the done broadcast. Closing the channel wakes every
    /// receiver; an integer message reaches exactly one of them.
    pub fn done_receiver(&self) -> async_channel::Receiver<i64> {
        self.inner.lock().unwrap().done_rx.clone()
    }

    /// Deliver a replacement delay (seconds) to one prober; `<= 0` makes
    /// the receiving prober exit. Reserved for runtime reconfiguration —
    /// no shipped handler sends it.
    pub fn send_delay(&self, secs: i64) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.done_tx {
            Some(tx) => tx.try_send(secs).is_ok(),
            None => false,
        }
    }

    /// Broadcast shutdown. Idempotent: later calls are no-ops.
    pub fn close_done(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.done_tx.take() {
            tx.close();
            self.cancel.cancel();
            tracing::info!("done broadcast closed, probers will drain");
        }
    }

    pub fn done_closed(&self) -> bool {
        self.inner.lock().unwrap().done_tx.is_none()
    }

    /// Cancellation handle for the admin server's graceful shutdown;
    /// fires together with the done broadcast.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    /// Find an active peer by `(host, ip)`. Matching on the parsed host
    /// rather than the full URL keeps path variants from spawning
    /// duplicate probers.
    pub fn find_peer(&self, url: &str, ip: &str) -> Option<Arc<Peer>> {
        let canon = canonicalize(url).ok()?;
        let inner = self.inner.lock().unwrap();
        inner
            .peers
            .iter()
            .find(|p| p.host == canon.host && p.dial_ip() == ip)
            .cloned()
    }

    fn new_peer(&self, url: &str, ip: &str, location: &str) -> Result<Arc<Peer>, UrlError> {
        let canon = canonicalize(url)?;
        let peer = Arc::new(Peer::new(
            url,
            &canon.host,
            ip,
            location,
            self.limit,
            self.delay,
            self.maxfail,
        ));
        let mut inner = self.inner.lock().unwrap();
        inner.peers.push(Arc::clone(&peer));
        inner.num_active += 1;
        Ok(peer)
    }

    /// Enroll a ping target and launch its prober, unless the `(host, ip)`
    /// pair is already active.
    pub fn add_ping_target(
        self: &Arc<Self>,
        url: &str,
        ip: &str,
        location: &str,
    ) -> Result<Enrolled, UrlError> {
        if let Some(existing) = self.find_peer(url, ip) {
            return Ok(Enrolled::AlreadyPresent(existing));
        }

        let peer = self.new_peer(url, ip, location)?;
        self.task_add();
        let node = Arc::clone(self);
        let spawned = Arc::clone(&peer);
        tokio::spawn(async move { crate::prober::run(node, spawned).await });

        tracing::info!(url, ip, location, "ping target enrolled");
        Ok(Enrolled::New(peer))
    }

    /// Remove active entries matching the peer's URL (and IP, unless the
    /// peer's IP is empty, which matches any). Removed entries get their
    /// latest-ping timestamp rewritten to the deletion instant and join
    /// the bounded deleted list.
    pub fn delete(&self, peer: &Peer) {
        let del_ip = peer.dial_ip();
        let now = now_second();

        let mut inner = self.inner.lock().unwrap();
        let mut removed = Vec::new();
        inner.peers.retain(|p| {
            let matches = p.url == peer.url && (del_ip.is_empty() || p.dial_ip() == del_ip);
            if matches {
                removed.push(Arc::clone(p));
            }
            !matches
        });

        match removed.len() {
            0 => {
                tracing::warn!(url = %peer.url, ip = %del_ip, "failed to delete pinger");
                return;
            }
            1 => tracing::debug!(url = %peer.url, ip = %del_ip, "deleted pinger"),
            n => tracing::debug!(url = %peer.url, ip = %del_ip, n, "deleted multiple pingers"),
        }

        for p in removed {
            p.mark_deleted(now);
            inner.del_peers.push_back(p);
        }
        while inner.del_peers.len() > DELETED_CAP {
            inner.del_peers.pop_front();
        }
        inner.num_active -= 1;
        inner.num_deleted += 1;
    }

    /// Consistent view of the node for serialisation, taken under the
    /// node mutex while probers keep running.
    pub fn snapshot(&self) -> NodeSnapshot {
        let inner = self.inner.lock().unwrap();
        NodeSnapshot {
            start: self.start,
            srv_loc: self.srv_loc.clone(),
            srv_host: self.srv_host.clone(),
            srv_port: self.srv_port,
            srv_ips: inner.srv_ips.clone(),
            peers: inner.peers.iter().map(|p| p.snapshot()).collect(),
            del_peers: inner.del_peers.iter().map(|p| p.snapshot()).collect(),
            num_active: inner.num_active,
            num_deleted: inner.num_deleted,
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// Resolve a hostname to its addresses, quietly returning none on error.
pub async fn lookup_ips(hostname: &str) -> Vec<IpAddr> {
    if hostname.is_empty() {
        return Vec::new();
    }
    match tokio::net::lookup_host((hostname, 0u16)).await {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(err) => {
            tracing::warn!(hostname, %err, "could not look up IPs");
            Vec::new()
        }
    }
}

/// Counts live tasks; waiters wake when the count returns to zero.
#[derive(Default)]
struct TaskCounter {
    count: Mutex<usize>,
    zero: Notify,
}

impl TaskCounter {
    fn add(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.zero.notified();
            if *self.count.lock().unwrap() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(limit: i64, delay: i64, maxfail: i64) -> Arc<MeshNode> {
        MeshNode::new(NodeSettings {
            location: "Test,Loc".to_string(),
            limit,
            delay,
            maxfail,
            ..NodeSettings::default()
        })
    }

    #[test]
    fn find_peer_matches_on_host_not_path() {
        let node = test_node(0, 10, 100);
        node.new_peer("http://hosta/v1/ping", "", "somewhere").unwrap();

        assert!(node.find_peer("http://hosta/other/path", "").is_some());
        assert!(node.find_peer("http://hosta/", "1.2.3.4").is_none());
        assert!(node.find_peer("http://hostb/", "").is_none());
    }

    #[tokio::test]
    async fn duplicate_enrolment_returns_sentinel() {
        let node = test_node(0, 10, 100);

        let first = node.add_ping_target("http://127.0.0.1:1/", "", "x").unwrap();
        assert!(matches!(first, Enrolled::New(_)));

        let second = node.add_ping_target("http://127.0.0.1:1/", "", "x").unwrap();
        assert!(matches!(second, Enrolled::AlreadyPresent(_)));

        assert_eq!(node.snapshot().peers.len(), 1);
        assert_eq!(node.snapshot().num_active, 1);

        node.close_done();
        node.wait().await;
    }

    #[test]
    fn bad_url_is_rejected() {
        let node = test_node(0, 10, 100);
        assert!(node.new_peer("", "", "x").is_err());
    }

    #[test]
    fn delete_moves_peer_and_rewrites_latest_ping() {
        let node = test_node(0, 10, 100);
        let peer = node.new_peer("http://hosta/", "", "x").unwrap();

        node.delete(&peer);

        let snap = node.snapshot();
        assert_eq!(snap.num_active, 0);
        assert_eq!(snap.num_deleted, 1);
        assert_eq!(snap.peers.len(), 0);
        assert_eq!(snap.del_peers.len(), 1);
        assert!(snap.del_peers[0].latest_ping.is_some());
    }

    #[test]
    fn deleted_list_is_bounded() {
        let node = test_node(0, 10, 100);
        for n in 0..150 {
            let peer = node.new_peer(&format!("http://host{}/", n), "", "x").unwrap();
            node.delete(&peer);
        }

        let snap = node.snapshot();
        assert_eq!(snap.del_peers.len(), 100);
        assert_eq!(snap.num_deleted, 150);
        assert_eq!(snap.num_active, 0);
        // the oldest entries fell off
        assert_eq!(snap.del_peers[0].url, "http://host50/");
    }

    #[test]
    fn close_done_is_idempotent() {
        let node = test_node(0, 10, 100);
        assert!(!node.done_closed());
        node.close_done();
        assert!(node.done_closed());
        node.close_done();
        assert!(node.done_closed());
        assert!(!node.send_delay(5));
    }

    #[tokio::test]
    async fn done_close_wakes_every_receiver() {
        let node = test_node(0, 10, 100);
        let rx1 = node.done_receiver();
        let rx2 = node.done_receiver();

        node.close_done();
        assert!(rx1.recv().await.is_err());
        assert!(rx2.recv().await.is_err());
        assert!(node.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn delay_message_reaches_one_receiver() {
        let node = test_node(0, 10, 100);
        let rx = node.done_receiver();

        assert!(node.send_delay(30));
        assert_eq!(rx.recv().await.unwrap(), 30);
    }

    #[tokio::test]
    async fn task_counter_wait_blocks_until_zero() {
        let node = test_node(0, 10, 100);
        node.task_add();
        node.task_add();

        let waited = {
            let node = node.clone();
            tokio::spawn(async move {
                node.wait().await;
            })
        };
        node.task_done();
        assert!(!waited.is_finished());
        node.task_done();
        tokio::time::timeout(std::time::Duration::from_secs(1), waited)
            .await
            .expect("wait should resolve at zero")
            .unwrap();
    }
}
