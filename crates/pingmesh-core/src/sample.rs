//! The sample record produced by one instrumented fetch.
//!
//! Field names on the wire match the mesh JSON schema (`PingTotals` inside
//! each peer), with durations carried as integer nanoseconds and
//! timestamps as RFC 3339.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing decomposition of a single HTTP fetch.
///
/// Also used as a running total: a peer's first sample seeds its totals
/// and later samples are folded in with [`PingTimes::accumulate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingTimes {
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
    /// DNS lookup.
    #[serde(rename = "DnsLk", with = "duration_ns")]
    pub dns_lk: Duration,
    /// TCP connection handshake.
    #[serde(rename = "TcpHs", with = "duration_ns")]
    pub tcp_hs: Duration,
    /// TLS handshake, zero for plain HTTP.
    #[serde(rename = "TlsHs", with = "duration_ns")]
    pub tls_hs: Duration,
    /// Server processing: time to first response byte.
    #[serde(rename = "Reply", with = "duration_ns")]
    pub reply: Duration,
    /// Content transfer: first byte to body close.
    #[serde(rename = "Close", with = "duration_ns")]
    pub close: Duration,
    /// Request time, not including the DNS lookup.
    #[serde(rename = "Total", with = "duration_ns")]
    pub total: Duration,
    /// Response body bytes.
    #[serde(rename = "Size")]
    pub size: i64,
    /// Location advertised by the responding server, if it was a mesh peer.
    #[serde(rename = "Location")]
    pub location: Option<String>,
    /// Canonical URL the request went to.
    #[serde(rename = "DestUrl")]
    pub dest_url: Option<String>,
    /// Server IP the connection actually reached.
    #[serde(rename = "Remote")]
    pub remote: String,
    #[serde(rename = "RespCode")]
    pub resp_code: i32,
}

impl PingTimes {
    /// Fold another sample into this running total.
    pub fn accumulate(&mut self, other: &PingTimes) {
        self.dns_lk += other.dns_lk;
        self.tcp_hs += other.tcp_hs;
        self.tls_hs += other.tls_hs;
        self.reply += other.reply;
        self.close += other.close;
        self.total += other.total;
        self.size += other.size;
    }

    /// Tab-separated per-sample line, millisecond columns with three
    /// decimals: start, the six phases, size, location, URL.
    pub fn msec_tsv(&self) -> String {
        format!(
            "{}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{}\t{}\t{}",
            self.start.timestamp(),
            msec(self.dns_lk),
            msec(self.tcp_hs),
            msec(self.tls_hs),
            msec(self.reply),
            msec(self.close),
            msec(self.total),
            self.size,
            self.location.as_deref().unwrap_or(crate::LOC_UNKNOWN),
            self.dest_url.as_deref().unwrap_or(""),
        )
    }

    /// Column header matching [`PingTimes::msec_tsv`], prefixed with the
    /// sample ordinal column.
    pub fn tsv_header() -> &'static str {
        "#\tStart\tDnsLk\tTcpHs\tTlsHs\tReply\tClose\tTotal\tSize\tLocation\tURL"
    }
}

/// Milliseconds as a float, for display.
pub fn msec(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Durations as integer nanoseconds on the wire.
pub mod duration_ns {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.as_nanos().min(i64::MAX as u128) as i64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ns = i64::deserialize(d)?;
        Ok(Duration::from_nanos(ns.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u64) -> PingTimes {
        PingTimes {
            start: Utc::now(),
            dns_lk: Duration::from_millis(ms),
            tcp_hs: Duration::from_millis(ms),
            tls_hs: Duration::ZERO,
            reply: Duration::from_millis(ms),
            close: Duration::from_millis(ms),
            total: Duration::from_millis(3 * ms),
            size: 100,
            location: Some("City,Country".to_string()),
            dest_url: Some("http://hosta/".to_string()),
            remote: "1.2.3.4".to_string(),
            resp_code: 200,
        }
    }

    #[test]
    fn accumulate_sums_phases_and_size() {
        let mut total = sample(10);
        total.accumulate(&sample(20));
        assert_eq!(total.dns_lk, Duration::from_millis(30));
        assert_eq!(total.total, Duration::from_millis(90));
        assert_eq!(total.size, 200);
        // identity fields keep the first sample's values
        assert_eq!(total.resp_code, 200);
        assert_eq!(total.remote, "1.2.3.4");
    }

    #[test]
    fn wire_shape_uses_go_style_names() {
        let json = serde_json::to_value(sample(5)).unwrap();
        assert_eq!(json["DnsLk"], 5_000_000);
        assert_eq!(json["Size"], 100);
        assert_eq!(json["RespCode"], 200);
        assert!(json["Start"].is_string());

        let back: PingTimes = serde_json::from_value(json).unwrap();
        assert_eq!(back.dns_lk, Duration::from_millis(5));
    }

    #[test]
    fn tsv_line_has_three_decimal_milliseconds() {
        let line = sample(12).msec_tsv();
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 10);
        assert_eq!(cols[1], "12.000");
        assert_eq!(cols[6], "36.000");
        assert_eq!(cols[8], "City,Country");
    }
}
