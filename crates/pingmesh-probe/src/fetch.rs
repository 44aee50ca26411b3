//! The instrumented HTTP fetcher.
//!
//! One GET, decomposed into DNS / TCP / TLS / first-byte / transfer
//! phases. The fetch never fails: anything that dies below the HTTP layer
//! comes back as a sample with the synthetic status 520 and best-effort
//! timings. Redirects are not followed — a 3xx is a measurement like any
//! other.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use pingmesh_core::sample::PingTimes;
use pingmesh_core::url::{canonicalize, make_peer_addr, CanonicalUrl};
use pingmesh_core::{LOC_UNKNOWN, STATUS_TRANSPORT_FAIL};

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const TLS_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Instants captured as the fetch progresses. Any of them may be missing
/// when the corresponding event never fired.
#[derive(Debug, Default, Clone, Copy)]
struct Phases {
    dns_done: Option<Instant>,
    tcp_done: Option<Instant>,
    tls_start: Option<Instant>,
    tls_done: Option<Instant>,
    conn_ready: Option<Instant>,
    first_byte: Option<Instant>,
}

#[derive(Debug, Default)]
struct Progress {
    ph: Phases,
    remote: Option<String>,
}

/// Fetch `rawurl` once and time it.
///
/// `peer_ip`, when non-empty, overrides the dial address while the Host
/// header and TLS SNI keep the hostname.
pub async fn fetch_url(rawurl: &str, peer_ip: &str) -> PingTimes {
    let started_wall = Utc::now();
    let start = Instant::now();
    let mut pr = Progress::default();

    let (url_str, result) = match canonicalize(rawurl) {
        Ok(canon) => {
            let url_str = canon.url_string();
            let result = do_fetch(&canon, peer_ip, &mut pr).await;
            (url_str, result)
        }
        Err(err) => (rawurl.to_string(), Err(err.into())),
    };

    let (status, size, location) = match result {
        Ok((status, size, location)) => (status as i32, size, location),
        Err(err) => {
            tracing::warn!(url = %url_str, err = format!("{err:#}"), "fetch failed");
            (STATUS_TRANSPORT_FAIL, 0, Some(LOC_UNKNOWN.to_string()))
        }
    };

    let close = Instant::now();
    let (dns_lk, tcp_hs, tls_hs, reply, close_d, total) = phase_durations(start, &pr.ph, close);

    PingTimes {
        start: started_wall,
        dns_lk,
        tcp_hs,
        tls_hs,
        reply,
        close: close_d,
        total,
        size,
        location,
        dest_url: Some(url_str),
        remote: pr.remote.unwrap_or_else(|| "undefined".to_string()),
        resp_code: status,
    }
}

/// Phase durations with time repair applied.
///
/// A missing instant collapses upward to the next one that fired (ending
/// at body close, which always exists), so every difference is
/// non-negative, phases that never ran report zero, and the phase that
/// was in flight when the fetch died absorbs the remaining elapsed time.
/// This is the sole source of truth for the duration semantics.
fn phase_durations(
    start: Instant,
    ph: &Phases,
    close: Instant,
) -> (Duration, Duration, Duration, Duration, Duration, Duration) {
    let first_byte = ph.first_byte.unwrap_or(close);
    let conn_ready = ph.conn_ready.unwrap_or(first_byte);
    let tls_done = ph.tls_done.unwrap_or(conn_ready);
    let tls_start = ph.tls_start.unwrap_or(tls_done);
    let tcp_done = ph.tcp_done.unwrap_or(tls_start);
    let dns_done = ph.dns_done.unwrap_or(tcp_done);

    (
        dns_done - start,
        tcp_done - dns_done,
        tls_done - tls_start,
        first_byte - conn_ready,
        close - first_byte,
        // total excludes the DNS lookup
        close - dns_done,
    )
}

async fn do_fetch(
    canon: &CanonicalUrl,
    peer_ip: &str,
    pr: &mut Progress,
) -> Result<(u16, i64, Option<String>)> {
    let (hostname, dial_addr) = make_peer_addr(&canon.scheme, &canon.host, peer_ip);

    // Literal ip:port skips resolution, mirroring a dial override. The
    // DNS instant is still pinned so the lookup phase reads as zero
    // instead of absorbing the connect time.
    let addr: SocketAddr = match dial_addr.parse() {
        Ok(sa) => {
            pr.ph.dns_done = Some(Instant::now());
            sa
        }
        Err(_) => {
            let mut addrs =
                tokio::time::timeout(DIAL_TIMEOUT, tokio::net::lookup_host(dial_addr.as_str()))
                    .await
                .context("dns lookup timed out")?
                .with_context(|| format!("dns lookup {}", dial_addr))?;
            let addr = addrs
                .next()
                .with_context(|| format!("no addresses for {}", dial_addr))?;
            pr.ph.dns_done = Some(Instant::now());
            addr
        }
    };

    let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .context("connect timed out")?
        .with_context(|| format!("connect {}", addr))?;
    pr.ph.tcp_done = Some(Instant::now());
    pr.remote = Some(addr.ip().to_string());

    if canon.scheme == "https" {
        pr.ph.tls_start = Some(Instant::now());
        let server_name = rustls::pki_types::ServerName::try_from(hostname.clone())
            .with_context(|| format!("invalid SNI name {}", hostname))?;
        let tls_stream = tokio::time::timeout(
            TLS_TIMEOUT,
            crate::tls::connector().connect(server_name, stream),
        )
        .await
        .context("tls handshake timed out")?
        .context("tls handshake")?;
        pr.ph.tls_done = Some(Instant::now());
        exchange(tls_stream, canon, pr).await
    } else {
        exchange(stream, canon, pr).await
    }
}

async fn exchange<T>(io: T, canon: &CanonicalUrl, pr: &mut Progress) -> Result<(u16, i64, Option<String>)>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .context("http handshake")?;
    let conn_task = tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(%err, "http connection ended");
        }
    });
    pr.ph.conn_ready = Some(Instant::now());

    let path = canon.request_path();
    let req = Request::builder()
        .uri(path)
        .header(hyper::header::HOST, canon.host.as_str())
        .header(hyper::header::USER_AGENT, "pingmesh")
        .body(Empty::<Bytes>::new())
        .context("build request")?;

    let result = tokio::time::timeout(READ_TIMEOUT, async {
        let resp = sender.send_request(req).await.context("send request")?;
        pr.ph.first_byte = Some(Instant::now());
        let status = resp.status().as_u16();

        // Mesh peer endpoints get scanned for the served-from marker; any
        // other body is drained for the byte count only.
        let scan = scans_for_location(path);
        let mut size = 0i64;
        let mut marker_buf = Vec::new();
        let mut body = resp.into_body();
        while let Some(next) = body.frame().await {
            let frame = next.context("read body")?;
            if let Some(chunk) = frame.data_ref() {
                size += chunk.len() as i64;
                if scan {
                    marker_buf.extend_from_slice(chunk);
                }
            }
        }

        Ok::<_, anyhow::Error>((status, size, scan_served_location(path, &marker_buf)))
    })
    .await;

    conn_task.abort();
    result.context("response timed out")?
}

fn scans_for_location(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    path.ends_with("/v1/peers") || path.ends_with("/v1/ping") || path.ends_with("/v1/addpeer")
}

/// Extract the server's location marker out of a mesh peer response body.
fn scan_served_location(path: &str, body: &[u8]) -> Option<String> {
    let path = path.split('?').next().unwrap_or(path);
    let text = String::from_utf8_lossy(body);
    if path.ends_with("/v1/peers") {
        between(&text, "\"SrvLoc\": \"", "\"")
    } else if path.ends_with("/v1/ping") || path.ends_with("/v1/addpeer") {
        between(&text, "<p>Served from ", "\n")
    } else {
        None
    }
}

fn between(text: &str, prefix: &str, suffix: &str) -> Option<String> {
    let start = text.find(prefix)? + prefix.len();
    let end = text[start..].find(suffix)? + start;
    let val = text[start..end].trim();
    (!val.is_empty()).then(|| val.to_string())
}
