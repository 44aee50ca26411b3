//! Peer records — one remote endpoint under measurement.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use pingmesh_core::sample::PingTimes;
use pingmesh_core::snapshot::PeerSnapshot;
use pingmesh_core::timefmt::now_second;
use pingmesh_core::LOC_UNKNOWN;

/// A remote endpoint being probed.
///
/// Identity fields are immutable; everything the prober writes sits
/// behind the peer's own mutex so admin handlers can snapshot it while
/// sampling is in flight.
pub struct Peer {
    /// Endpoint as originally given, canonical dedup happens on `host`.
    pub url: String,
    /// Parsed authority, including any explicit port.
    pub host: String,
    /// Successful samples before the prober exits. 0 = unbounded.
    pub limit: i64,
    /// Failure ceiling.
    pub maxfail: i64,
    /// When this peer was enrolled.
    pub start: DateTime<Utc>,

    stats: Mutex<PeerStats>,
}

#[derive(Debug, Clone)]
struct PeerStats {
    peer_ip: String,
    location: String,
    delay: i64,
    pings: i64,
    fails: i64,
    first_ping: Option<DateTime<Utc>>,
    latest_ping: Option<DateTime<Utc>>,
    totals: Option<PingTimes>,
}

impl Peer {
    pub(crate) fn new(
        url: &str,
        host: &str,
        ip: &str,
        location: &str,
        limit: i64,
        delay: i64,
        maxfail: i64,
    ) -> Self {
        Self {
            url: url.to_string(),
            host: host.to_string(),
            limit,
            maxfail,
            start: now_second(),
            stats: Mutex::new(PeerStats {
                peer_ip: ip.to_string(),
                location: location.to_string(),
                delay,
                pings: 0,
                fails: 0,
                first_ping: None,
                latest_ping: None,
                totals: None,
            }),
        }
    }

    pub fn dial_ip(&self) -> String {
        self.stats.lock().unwrap().peer_ip.clone()
    }

    pub fn location(&self) -> String {
        self.stats.lock().unwrap().location.clone()
    }

    pub fn delay(&self) -> i64 {
        self.stats.lock().unwrap().delay
    }

    pub(crate) fn set_delay(&self, delay: i64) {
        self.stats.lock().unwrap().delay = delay;
    }

    pub fn pings(&self) -> i64 {
        self.stats.lock().unwrap().pings
    }

    pub fn fails(&self) -> i64 {
        self.stats.lock().unwrap().fails
    }

    /// One line of peer state for logs.
    pub fn info(&self) -> String {
        let st = self.stats.lock().unwrap();
        format!(
            "{} delay {} (on {} of {}) started {}",
            self.url, st.delay, st.pings, self.limit, self.start
        )
    }

    /// Record a successful sample. Returns the new success count.
    ///
    /// The first success seeds the running totals, adopts the observed
    /// remote IP when no dial override was given, and resolves the
    /// location label: the server-advertised location when the sample
    /// carries one, else the URL.
    pub(crate) fn record_success(&self, sample: &PingTimes) -> i64 {
        let mut st = self.stats.lock().unwrap();
        st.pings += 1;
        let now = now_second();
        st.latest_ping = Some(now);

        if st.pings == 1 {
            st.first_ping = Some(now);
            st.totals = Some(sample.clone());
            if st.peer_ip.is_empty() && sample.remote != "undefined" {
                st.peer_ip = sample.remote.clone();
            }
        } else if let Some(totals) = st.totals.as_mut() {
            totals.accumulate(sample);
        }

        if st.location.is_empty() || st.location == LOC_UNKNOWN {
            match sample.location.as_deref() {
                Some(loc) if !loc.is_empty() && loc != LOC_UNKNOWN => {
                    st.location = loc.to_string();
                }
                _ if st.pings == 1 => st.location = self.url.clone(),
                _ => {}
            }
        }

        st.pings
    }

    /// Record a failed sample. Returns the new failure count.
    pub(crate) fn record_fail(&self) -> i64 {
        let mut st = self.stats.lock().unwrap();
        st.fails += 1;
        st.fails
    }

    /// Rewrite the latest-ping timestamp to the deletion instant.
    pub(crate) fn mark_deleted(&self, at: DateTime<Utc>) {
        self.stats.lock().unwrap().latest_ping = Some(at);
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        let st = self.stats.lock().unwrap();
        PeerSnapshot {
            url: self.url.clone(),
            host: self.host.clone(),
            peer_ip: st.peer_ip.clone(),
            location: st.location.clone(),
            limit: self.limit,
            delay: st.delay,
            maxfail: self.maxfail,
            pings: st.pings,
            fails: st.fails,
            start: self.start,
            first_ping: st.first_ping,
            latest_ping: st.latest_ping,
            ping_totals: st.totals.clone(),
        }
    }
}
