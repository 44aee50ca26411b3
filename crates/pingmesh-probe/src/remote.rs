//! Plain JSON fetch of another node's state.
//!
//! No instrumentation here — this is the mesh-expansion and ctl path, a
//! straight GET with a 10-second deadline and the same dial-override
//! rules as the instrumented fetcher.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use pingmesh_core::snapshot::NodeSnapshot;
use pingmesh_core::url::{canonicalize, make_peer_addr};

const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch the peer list of the node at `rawurl`, dialing `ip` instead of
/// DNS when non-empty.
pub async fn fetch_remote_peer(rawurl: &str, ip: &str) -> Result<NodeSnapshot> {
    let canon = canonicalize(rawurl).with_context(|| format!("cannot parse url {:?}", rawurl))?;
    let url_str = canon.url_string();

    let mut builder = reqwest::Client::builder()
        .user_agent("pingmesh-client")
        .timeout(REMOTE_TIMEOUT)
        .danger_accept_invalid_certs(true);

    if !ip.is_empty() {
        let (hostname, dial_addr) = make_peer_addr(&canon.scheme, &canon.host, ip);
        let sock: SocketAddr = dial_addr
            .parse()
            .with_context(|| format!("peer IP override {:?} is not ip:port", dial_addr))?;
        builder = builder.resolve(&hostname, sock);
    }

    let snapshot = builder
        .build()
        .context("build http client")?
        .get(&url_str)
        .send()
        .await
        .with_context(|| format!("failed to connect to {}", url_str))?
        .error_for_status()
        .with_context(|| format!("fetching {}", url_str))?
        .json::<NodeSnapshot>()
        .await
        .context("failed to parse peer list")?;

    Ok(snapshot)
}
