//! pingmesh-ctl — read-only inspector for a running mesh node.
//!
//! Fetches the node's peer list and reports the average TCP RTT for each
//! peer, or dumps the raw JSON.

use anyhow::{Context, Result};
use clap::Parser;

use pingmesh_core::sample::msec;
use pingmesh_core::snapshot::PeerSnapshot;
use pingmesh_core::timefmt::{hhmmss, hhmmss_d};
use pingmesh_probe::fetch_remote_peer;

#[derive(Parser, Debug)]
#[command(
    name = "pingmesh-ctl",
    about = "Fetch a mesh node's peer list and report per-peer average RTT."
)]
struct Cli {
    /// Hostname of a mesh node, with optional :port suffix
    #[arg(short = 'H', value_name = "HOST")]
    host: String,

    /// IP of the node (overrides DNS for the hostname)
    #[arg(short = 'I', default_value = "", value_name = "IP")]
    ip: String,

    /// Dump the raw JSON object instead of the averaged table
    #[arg(short = 'J')]
    json: bool,

    /// Include deleted peers in the text output (JSON always has DelPeers)
    #[arg(short = 'd')]
    deleted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut peer_url = format!("{}/v1/peers", cli.host);
    let snapshot = match fetch_remote_peer(&peer_url, &cli.ip).await {
        Ok(snapshot) => snapshot,
        Err(err) if !cli.host.starts_with("http") => {
            eprintln!("{:#} -- trying with https://", err);
            peer_url = format!("https://{}/v1/peers", cli.host);
            fetch_remote_peer(&peer_url, &cli.ip)
                .await
                .with_context(|| format!("failed to fetch {} -- is the node running?", peer_url))?
        }
        Err(err) => return Err(err),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let override_note = if cli.ip.is_empty() {
        String::new()
    } else {
        format!(" at {}", cli.ip)
    };

    println!(
        "{} {}{} has {} peers and started {} ago:",
        snapshot.srv_loc,
        cli.host,
        override_note,
        snapshot.peers.len(),
        hhmmss_d(snapshot.start)
    );
    print_peer_table(&snapshot.peers);

    if cli.deleted && !snapshot.del_peers.is_empty() {
        println!(
            "{} {}{} has {} deleted peers:",
            snapshot.srv_loc,
            cli.host,
            override_note,
            snapshot.del_peers.len()
        );
        print_peer_table(&snapshot.del_peers);
    }

    Ok(())
}

fn print_peer_table(peers: &[PeerSnapshot]) {
    if peers.is_empty() {
        return;
    }

    println!(
        "{:>20}\t{}\t{}\t{}\t{:>12}\t{}\t{:>12}\t{}",
        "Location", "Pings", "Fails", "Start Time", "Duration", "msecRTT", "totalMs", "PeerIP or URL"
    );

    let mut peers: Vec<&PeerSnapshot> = peers.iter().collect();
    peers.sort_by(|a, b| a.location.cmp(&b.location));

    for peer in peers {
        let start = peer
            .first_ping
            .map(|t| t.format("%b %e %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        let duration = match (peer.first_ping, peer.latest_ping) {
            (Some(first), Some(latest)) => (latest - first).num_seconds().max(0),
            _ => 0,
        };

        let (rtt, total) = match (&peer.ping_totals, peer.pings) {
            (Some(totals), pings) if pings > 0 => (
                msec(totals.tcp_hs) / pings as f64,
                msec(totals.total) / pings as f64,
            ),
            _ => (0.0, 0.0),
        };

        let target = if peer.peer_ip.is_empty() {
            peer.url.as_str()
        } else {
            peer.peer_ip.as_str()
        };

        println!(
            "{:>20}\t{}\t{}\t{}\t{:>12}\t{:.3}\t{:>12.3}\t{}",
            trim_loc(&peer.location),
            peer.pings,
            peer.fails,
            start,
            hhmmss(duration),
            rtt,
            total,
            target
        );
    }
}

fn trim_loc(loc: &str) -> &str {
    loc.strip_prefix("https://")
        .or_else(|| loc.strip_prefix("http://"))
        .unwrap_or(loc)
}
