//! The per-peer sampling loop.
//!
//! One task per peer, the only writer of that peer's record. It exits
//! when the sample limit is reached, the failure ceiling is hit, the done
//! broadcast closes, or a non-positive delay arrives.

use std::sync::Arc;

use chrono::Utc;

use pingmesh_core::jitter::jitter_pct;
use pingmesh_core::sample::{msec, PingTimes};
use pingmesh_core::timefmt::hhmmss;
use pingmesh_probe::fetch_url;

use crate::node::MeshNode;
use crate::peer::Peer;

/// Jitter applied to every sampling delay, percent.
const JITTER: i64 = 10;

pub(crate) async fn run(node: Arc<MeshNode>, peer: Arc<Peer>) {
    let done = node.done_receiver();
    if node.verbose() > 1 {
        tracing::info!(peer = %peer.info(), "prober starting");
    }

    let limit = if peer.limit == 0 { i64::MAX } else { peer.limit };
    let mut current_delay = peer.delay();
    // Freshly enrolled peers sample within about a second; the
    // configured delay governs from the second iteration on.
    let mut first_iteration = true;

    loop {
        let base = if first_iteration { 1 } else { current_delay };
        first_iteration = false;

        tokio::select! {
            _ = tokio::time::sleep(jitter_pct(base, JITTER)) => {}
            msg = done.recv() => match msg {
                // channel closed: node-wide shutdown
                Err(_) => break,
                Ok(n) if n <= 0 => break,
                Ok(n) => {
                    current_delay = n;
                    peer.set_delay(n);
                }
            }
        }

        let sample = fetch_url(&peer.url, &peer.dial_ip()).await;

        // Up to 304 counts as a measured success; redirects are data.
        if sample.resp_code > 304 {
            let fails = peer.record_fail();
            tracing::warn!(
                url = %peer.url,
                status = sample.resp_code,
                fails,
                maxfail = peer.maxfail,
                "ping failure"
            );
            if node.verbose() > 0 {
                println!("{}\t{}", peer.pings(), sample.msec_tsv());
            }
            if fails >= peer.maxfail {
                break;
            }
            continue;
        }

        let pings = peer.record_success(&sample);

        if node.verbose() > 0 {
            println!("{}\t{}", pings, sample.msec_tsv());
        }

        if node.sink().enabled() {
            node.sink().publish(
                node.location(),
                &peer.location(),
                sample.resp_code,
                msec(sample.tcp_hs),
            );
        }

        if pings >= limit {
            break;
        }
        if current_delay <= 0 {
            break;
        }
    }

    // Summary first, then off the active list, then release the task
    // slot: a zero task counter implies the peer already moved to the
    // deleted list.
    report(&peer);
    node.delete(&peer);
    node.task_done();
}

/// Final per-peer summary on stdout.
fn report(peer: &Peer) {
    let snap = peer.snapshot();
    if snap.pings == 0 {
        println!(
            "\nRecorded 0 valid samples, {} of {} failures",
            snap.fails, peer.maxfail
        );
        return;
    }

    let Some(totals) = snap.ping_totals else {
        return;
    };
    let count = snap.pings as f64;
    let elapsed = hhmmss(Utc::now().timestamp() - totals.start.timestamp());

    println!(
        "\nRecorded {} samples in {}, average values:\n{}",
        snap.pings,
        elapsed,
        PingTimes::tsv_header()
    );
    println!(
        "{} {:<6}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{}\t{}\t{}\n",
        snap.pings,
        elapsed,
        msec(totals.dns_lk) / count,
        msec(totals.tcp_hs) / count,
        msec(totals.tls_hs) / count,
        msec(totals.reply) / count,
        msec(totals.close) / count,
        msec(totals.total) / count,
        totals.size / snap.pings,
        snap.location,
        totals.dest_url.as_deref().unwrap_or(&snap.url),
    );
}
