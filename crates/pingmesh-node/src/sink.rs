//! The TCP-RTT metric sink seam.
//!
//! Sampling publishes the TCP-handshake duration — the cheap round-trip
//! proxy — tagged with both locations and the zero-padded response code.
//! The sink validates credentials once at startup and emits each
//! observation as a structured event on the `pingmesh::metrics` target;
//! an external uploader attaches there.

/// Publisher for per-sample TCP RTT observations.
pub struct RespTimeSink {
    enabled: bool,
}

impl RespTimeSink {
    /// Honor the cw flag only when the uploader credentials are present;
    /// otherwise disable with a single notice and carry on.
    pub fn from_env(requested: bool) -> Self {
        if !requested {
            return Self { enabled: false };
        }

        let have_creds = ["AWS_REGION", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]
            .iter()
            .all(|name| std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false));
        if !have_creds {
            tracing::warn!(
                "metric sink requires AWS_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY; disabling"
            );
            return Self { enabled: false };
        }

        Self { enabled: true }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Publish one observation. Codes are zero-padded to three digits so
    /// `0` (no HTTP layer reached) stays distinguishable from `000`.
    pub fn publish(&self, my_location: &str, peer_location: &str, resp_code: i32, rtt_msec: f64) {
        if !self.enabled {
            return;
        }
        let resp_code = if resp_code >= 0 {
            format!("{:03}", resp_code)
        } else {
            "0".to_string()
        };
        tracing::info!(
            target: "pingmesh::metrics",
            metric = "TCP RTT",
            namespace = "pingmesh",
            my_location,
            peer_location,
            resp_code,
            msec = rtt_msec,
            "publish sample"
        );
    }
}
