//! pingmeshd — mesh-based HTTP latency tester.
//!
//! Each instance is both a probe target and a prober: it serves the admin
//! endpoints other nodes measure against, and runs one sampling loop per
//! configured remote endpoint. L4 latency and L7 response time samples go
//! to stdout and, optionally, to the external metric sink.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use pingmesh_core::config::{int_override, location_from, MeshConfig};
use pingmesh_core::sample::PingTimes;
use pingmesh_core::LOC_UNKNOWN;
use pingmesh_node::node::lookup_ips;
use pingmesh_node::{MeshNode, NodeSettings};

#[derive(Parser, Debug)]
#[command(
    name = "pingmeshd",
    disable_version_flag = true,
    about = "Mesh-based HTTP latency tester; every node is both prober and target.",
    after_help = "Endpoints are hostnames or URLs to ping, each optionally carrying a \
#City,Country suffix used as the peer's initial location. Ping targets can also \
be added at runtime through /v1/addpeer on the admin port. Environment: \
PINGMESH_DELAY, PINGMESH_LIMIT, PINGMESH_MAXFAIL override the matching flags \
when set to an integer > 0; PINGMESH_URL appends one endpoint; PINGMESH_HOSTNAME \
supplies the hostname; REP_LOCATION (or REP_CITY and REP_COUNTRY) supply the \
location."
)]
struct Cli {
    /// Delay in seconds between ping requests
    #[arg(short = 'd', value_name = "SECS")]
    delay: Option<i64>,

    /// Maximum failures before a pinger quits trying
    #[arg(short = 'f', value_name = "N")]
    maxfail: Option<i64>,

    /// Number of tests against each endpoint (0 runs until interrupted)
    #[arg(short = 'n', value_name = "N")]
    limit: Option<i64>,

    /// Admin server listen port; zero means don't run a server
    #[arg(short = 's', default_value_t = 0, value_name = "PORT")]
    serve_port: u16,

    /// Port to report to peers, for nodes behind a port translator
    #[arg(short = 'r', default_value_t = 0, value_name = "PORT")]
    report_port: u16,

    /// This node's location label, e.g. "Paris,FR"
    #[arg(short = 'L', value_name = "CITY,COUNTRY")]
    location: Option<String>,

    /// This node's hostname (should resolve to accessible IPs)
    #[arg(short = 'H', value_name = "HOST")]
    hostname: Option<String>,

    /// Remote peer IP address override, applied to the endpoints
    #[arg(short = 'I', value_name = "IP")]
    peer_ip: Option<String>,

    /// Publish TCP RTT samples to the external metric sink
    #[arg(short = 'c')]
    cw: bool,

    /// Be more verbose
    #[arg(short = 'v')]
    verbose: bool,

    /// Be even more verbose
    #[arg(short = 'V')]
    very_verbose: bool,

    /// Be less verbose
    #[arg(short = 'q')]
    quiet: bool,

    /// Endpoints to ping
    #[arg(value_name = "ENDPOINT")]
    endpoints: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let file_cfg = MeshConfig::load().unwrap_or_else(|err| {
        tracing::warn!(%err, "ignoring config file");
        MeshConfig::default()
    });

    let delay = int_override(
        "PINGMESH_DELAY",
        std::env::var("PINGMESH_DELAY").ok().as_deref(),
        cli.delay.unwrap_or(file_cfg.probe.delay),
        cli.delay.is_some(),
    );
    let limit = int_override(
        "PINGMESH_LIMIT",
        std::env::var("PINGMESH_LIMIT").ok().as_deref(),
        cli.limit.unwrap_or(file_cfg.probe.limit),
        cli.limit.is_some(),
    );
    let maxfail = int_override(
        "PINGMESH_MAXFAIL",
        std::env::var("PINGMESH_MAXFAIL").ok().as_deref(),
        cli.maxfail.unwrap_or(file_cfg.probe.maxfail),
        cli.maxfail.is_some(),
    );

    let mut verbose: u8 = 1;
    if cli.verbose {
        verbose += 1;
    }
    if cli.very_verbose {
        verbose += 2;
    }
    if cli.quiet {
        verbose = 0;
    }

    let location = match cli.location.filter(|l| !l.is_empty()) {
        Some(loc) => loc,
        None => {
            let loc = location_from(
                std::env::var("REP_LOCATION").ok().as_deref(),
                std::env::var("REP_CITY").ok().as_deref(),
                std::env::var("REP_COUNTRY").ok().as_deref(),
            );
            let loc = if loc.is_empty() {
                file_cfg.server.location
            } else {
                loc
            };
            if loc.is_empty() {
                tracing::warn!("location not provided, reporting as {:?}", LOC_UNKNOWN);
                LOC_UNKNOWN.to_string()
            } else {
                loc
            }
        }
    };

    let hostname = cli
        .hostname
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("PINGMESH_HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or(file_cfg.server.hostname);

    let mut endpoints = cli.endpoints;
    if let Ok(url) = std::env::var("PINGMESH_URL") {
        if !url.is_empty() {
            endpoints.push(url);
        }
    }

    if endpoints.is_empty() && cli.serve_port == 0 {
        Cli::command().print_help().context("print usage")?;
        return Ok(());
    }

    let srv_ips = lookup_ips(&hostname).await;

    let node = MeshNode::get_or_init(NodeSettings {
        location,
        hostname,
        srv_ips,
        listen_port: cli.serve_port,
        report_port: cli.report_port,
        cw_flag: cli.cw,
        limit,
        delay,
        maxfail,
        verbose,
    });

    let server = if cli.serve_port > 0 {
        let server_node = node.clone();
        let port = cli.serve_port;
        Some(tokio::spawn(async move {
            if let Err(err) = pingmesh_api::serve(server_node, port).await {
                tracing::error!(err = format!("{err:#}"), "admin server exited");
            }
        }))
    } else {
        None
    };

    // With nothing to ping the task counter would be zero from the start;
    // hold a slot so a serve-only node stays up until a signal arrives.
    let hold_open = endpoints.is_empty();
    if hold_open {
        println!("NOTE: not starting any pings, just serving");
        node.task_add();
    }

    // First signal drains the probers; a second one means the drain is
    // stuck and the process must die.
    {
        let node = node.clone();
        tokio::spawn(async move {
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(term) => term,
                    Err(err) => {
                        tracing::error!(%err, "cannot install SIGTERM handler");
                        return;
                    }
                };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                if node.done_closed() {
                    println!("\nreceived second signal, hard exit");
                    std::process::exit(1);
                }
                println!("\nreceived signal, terminating");
                node.close_done();
                if hold_open {
                    node.task_done();
                }
            }
        });
    }

    if !endpoints.is_empty() && verbose > 1 {
        tracing::info!(?endpoints, "starting pings");
        println!("{}", PingTimes::tsv_header());
    }

    let peer_ip = cli.peer_ip.unwrap_or_default();
    for endpoint in &endpoints {
        let (url, loc) = match endpoint.split_once('#') {
            Some((url, loc)) => (url, loc),
            None => (endpoint.as_str(), LOC_UNKNOWN),
        };
        if let Err(err) = node.add_ping_target(url, &peer_ip, loc) {
            tracing::warn!(endpoint, %err, "cannot enroll endpoint");
        }
    }

    node.wait().await;
    if verbose > 0 {
        tracing::info!("all probers exited");
    }

    if let Some(server) = server {
        node.close_done();
        if tokio::time::timeout(Duration::from_secs(6), server).await.is_err() {
            tracing::warn!("admin server did not stop in time");
        }
    }

    Ok(())
}
