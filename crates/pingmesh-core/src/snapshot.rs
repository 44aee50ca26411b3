//! JSON snapshot shapes exchanged between mesh nodes.
//!
//! This is the document served at `/v1/peers` and decoded by the
//! mesh-expansion fetcher and the ctl binary. The `SrvLoc` field doubles
//! as the out-of-band location marker probers scan for, so its name is
//! load-bearing.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sample::PingTimes;

/// Full node state: identity, active peers, recently deleted peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
    #[serde(rename = "SrvLoc")]
    pub srv_loc: String,
    #[serde(rename = "SrvHost")]
    pub srv_host: String,
    /// Port reported to peers; may differ from the listen port behind a
    /// port translator.
    #[serde(rename = "SrvPort")]
    pub srv_port: u16,
    #[serde(rename = "SrvIPs")]
    pub srv_ips: Vec<IpAddr>,
    #[serde(rename = "Peers")]
    pub peers: Vec<PeerSnapshot>,
    #[serde(rename = "DelPeers")]
    pub del_peers: Vec<PeerSnapshot>,
    #[serde(rename = "NumActive")]
    pub num_active: i64,
    #[serde(rename = "NumDeleted")]
    pub num_deleted: i64,
    #[serde(rename = "Requests")]
    pub requests: u64,
}

/// One peer as listed in a node snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSnapshot {
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "PeerIP")]
    pub peer_ip: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Limit")]
    pub limit: i64,
    #[serde(rename = "Delay")]
    pub delay: i64,
    #[serde(rename = "Maxfail")]
    pub maxfail: i64,
    #[serde(rename = "Pings")]
    pub pings: i64,
    #[serde(rename = "Fails")]
    pub fails: i64,
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
    #[serde(rename = "FirstPing", default, skip_serializing_if = "Option::is_none")]
    pub first_ping: Option<DateTime<Utc>>,
    #[serde(rename = "LatestPing", default, skip_serializing_if = "Option::is_none")]
    pub latest_ping: Option<DateTime<Utc>>,
    /// Accumulated phase durations; absent until the first success.
    #[serde(rename = "PingTotals", default, skip_serializing_if = "Option::is_none")]
    pub ping_totals: Option<PingTimes>,
}
