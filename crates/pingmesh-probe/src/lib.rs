//! HTTP fetchers for the pingmesh prober.
//!
//! [`fetch::fetch_url`] is the instrumented single-shot fetch that powers
//! latency sampling; [`remote::fetch_remote_peer`] is the plain JSON fetch
//! used for mesh expansion and the ctl binary.

pub mod fetch;
pub mod remote;

mod tls;

pub use fetch::fetch_url;
pub use remote::fetch_remote_peer;
