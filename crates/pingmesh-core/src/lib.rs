//! Shared types and pure logic for the pingmesh latency mesh.
//!
//! Everything here is runtime-free: URL canonicalisation and dial-target
//! derivation, the sample record and its accumulation, the JSON snapshot
//! shapes exchanged between nodes, jitter, duration formatting, and the
//! node configuration layer.

pub mod config;
pub mod jitter;
pub mod sample;
pub mod snapshot;
pub mod timefmt;
pub mod url;

/// Location label reported when a peer has not advertised one yet.
pub const LOC_UNKNOWN: &str = "unknown";

/// Synthetic HTTP status for fetches that failed below the HTTP layer.
pub const STATUS_TRANSPORT_FAIL: i32 = 520;
