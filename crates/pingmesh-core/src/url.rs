//! URL canonicalisation and dial-target derivation.
//!
//! Peers are identified by `scheme://host[:port]/path` with the scheme
//! defaulted to `http` when absent. The dial target may be overridden with
//! an explicit peer IP, in which case the hostname is kept for the Host
//! header and TLS SNI while the connection goes to `ip:port`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("cannot parse url {0:?}: empty host")]
    EmptyHost(String),
}

/// A canonicalised URL, split into the pieces the mesh cares about.
///
/// `scheme` is kept as written (possibly empty) because the effective
/// default port differs between "no scheme" and "http". `host` keeps any
/// explicit `:port` suffix; it is the registry dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl CanonicalUrl {
    /// The canonical string form, with the scheme defaulted to `http`.
    pub fn url_string(&self) -> String {
        let scheme = if self.scheme.is_empty() {
            "http"
        } else {
            self.scheme.as_str()
        };
        format!("{}://{}{}", scheme, self.host, self.path)
    }

    /// Request path for the HTTP request line, never empty.
    pub fn request_path(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            self.path.as_str()
        }
    }
}

/// Parse a raw endpoint string.
///
/// A raw URL without `"://"` and without a leading `"//"` is treated as
/// scheme-relative, so bare `host:port/path` arguments work.
pub fn canonicalize(raw: &str) -> Result<CanonicalUrl, UrlError> {
    let (scheme, rest) = match raw.find("://") {
        Some(idx) => (&raw[..idx], &raw[idx + 3..]),
        None => ("", raw.strip_prefix("//").unwrap_or(raw)),
    };

    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    if host.is_empty() {
        return Err(UrlError::EmptyHost(raw.to_string()));
    }

    Ok(CanonicalUrl {
        scheme: scheme.to_string(),
        host: host.to_string(),
        path: path.to_string(),
    })
}

/// Index of the colon introducing a port suffix, if any.
///
/// The last colon only counts when it comes after the last `]`, so IPv6
/// literals like `[::1]:80` split correctly.
fn port_index(s: &str) -> Option<usize> {
    let lc = s.rfind(':')?;
    match s.rfind(']') {
        Some(lb) if lb > lc => None,
        _ => Some(lc),
    }
}

/// Strip a `:port` suffix from an address.
pub fn host_no_port(addr: &str) -> &str {
    match port_index(addr) {
        Some(colon) if colon > 0 => &addr[..colon],
        _ => addr,
    }
}

/// Derive the hostname and dial target for a peer.
///
/// Returns `(hostname, dial_addr)` where `hostname` has any port stripped
/// (for the Host header and SNI) and `dial_addr` is `host_or_ip:port`.
/// An explicit port in `host` wins; otherwise the scheme decides: 80 for
/// `http`, 443 for `https` and for an absent scheme.
pub fn make_peer_addr(scheme: &str, host: &str, ip: &str) -> (String, String) {
    let (hostname, port) = match port_index(host) {
        Some(colon) => (&host[..colon], host[colon + 1..].to_string()),
        None => {
            let default = if scheme == "http" { "80" } else { "443" };
            (host, default.to_string())
        }
    };

    let dial_host = if ip.is_empty() { hostname } else { ip };
    (hostname.to_string(), format!("{}:{}", dial_host, port))
}
