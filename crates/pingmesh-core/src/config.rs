//! Configuration for a mesh node.
//!
//! Resolution order: environment variables → command-line flags → config
//! file → built-in defaults. The file layer is optional; most deployments
//! run on flags and environment alone.
//!
//! Config file location:
//!   1. $PINGMESH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pingmesh/config.toml
//!   3. ~/.config/pingmesh/config.toml
//!
//! An environment value for the probe settings only wins when it parses
//! as an integer > 0; anything else keeps the flag value and logs a
//! warning.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub probe: ProbeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Seconds between ping attempts.
    pub delay: i64,
    /// Samples per peer before its prober exits. 0 = unbounded.
    pub limit: i64,
    /// Failure ceiling per peer.
    pub maxfail: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// This node's "City,Country" label. Empty = resolve from env.
    pub location: String,
    /// Hostname to report; resolved to SrvIPs at startup when set.
    pub hostname: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            delay: 10,
            limit: 0,
            maxfail: 100,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshConfig {
    /// Load the config file if one exists, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            return Ok(MeshConfig::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path, e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PINGMESH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("pingmesh")
}

// ── Environment precedence ────────────────────────────────────────────────────

/// Apply the integer-override rule for one probe setting.
///
/// `env_val` wins only when it parses as an integer > 0. `flag_passed`
/// controls whether the override is worth announcing.
pub fn int_override(name: &str, env_val: Option<&str>, flag: i64, flag_passed: bool) -> i64 {
    let Some(raw) = env_val else {
        return flag;
    };
    match raw.parse::<i64>() {
        Ok(v) if v >= 1 => {
            if flag_passed {
                tracing::info!(env = name, value = v, flag, "environment overrides flag");
            }
            v
        }
        _ => {
            tracing::warn!(
                env = name,
                value = raw,
                flag,
                "environment value must be an integer > 0, keeping flag"
            );
            flag
        }
    }
}

/// Resolve a location label from the REP_* conventions:
/// `REP_LOCATION` if set, else `REP_CITY,REP_COUNTRY` when both are set,
/// else whichever half exists, else empty.
pub fn location_from(
    rep_location: Option<&str>,
    rep_city: Option<&str>,
    rep_country: Option<&str>,
) -> String {
    let city = rep_city.unwrap_or("");
    let country = rep_country.unwrap_or("");
    match rep_location {
        Some(loc) if !loc.is_empty() => loc.to_string(),
        _ if !city.is_empty() && !country.is_empty() => format!("{},{}", city, country),
        _ => format!("{}{}", city, country),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probe_settings() {
        let config = MeshConfig::default();
        assert_eq!(config.probe.delay, 10);
        assert_eq!(config.probe.limit, 0);
        assert_eq!(config.probe.maxfail, 100);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: MeshConfig = toml::from_str("[probe]\ndelay = 3\n").unwrap();
        assert_eq!(config.probe.delay, 3);
        assert_eq!(config.probe.maxfail, 100);
        assert_eq!(config.server.location, "");
    }

    #[test]
    fn int_override_requires_positive_integer() {
        assert_eq!(int_override("X", Some("30"), 10, false), 30);
        assert_eq!(int_override("X", Some("0"), 10, false), 10);
        assert_eq!(int_override("X", Some("-5"), 10, false), 10);
        assert_eq!(int_override("X", Some("soon"), 10, false), 10);
        assert_eq!(int_override("X", None, 10, true), 10);
    }

    #[test]
    fn location_prefers_rep_location() {
        assert_eq!(
            location_from(Some("Paris,FR"), Some("Lyon"), Some("FR")),
            "Paris,FR"
        );
        assert_eq!(location_from(None, Some("Lyon"), Some("FR")), "Lyon,FR");
        assert_eq!(location_from(None, Some("Lyon"), None), "Lyon");
        assert_eq!(location_from(None, None, None), "");
    }
}
