//! HTTP admin surface for a mesh node.
//!
//! Routes read the registry through the node snapshot and mutate it via
//! the node's enrolment and shutdown entry points. The server's lifetime
//! is tied to the node's done broadcast: when it closes, the server
//! drains in-flight requests for at most five seconds.

pub mod handlers;
pub mod memstats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use pingmesh_node::MeshNode;

const BIND_RETRIES: u64 = 5;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One row of the route table. Routes with a doc string show up in the
/// root page index; the rest stay unlisted.
pub struct RouteDoc {
    pub uri: &'static str,
    pub doc: &'static str,
}

pub const ROUTES: &[RouteDoc] = &[
    RouteDoc { uri: "/", doc: "" },
    RouteDoc { uri: "/v1", doc: "" },
    RouteDoc { uri: "/v1/addpeer", doc: "add a ping target" },
    RouteDoc { uri: "/v1/env", doc: "" },
    RouteDoc { uri: "/v1/metrics", doc: "get memory statistics" },
    RouteDoc { uri: "/v1/peers", doc: "get or update list of peers" },
    RouteDoc { uri: "/v1/ping", doc: "get a ping response" },
    RouteDoc { uri: "/v1/quit", doc: "shut down this pinger" },
];

#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<MeshNode>,
}

pub fn router(node: Arc<MeshNode>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/v1", get(handlers::root))
        .route("/v1/addpeer", get(handlers::addpeer))
        .route("/v1/env", get(handlers::env_dump))
        .route("/v1/metrics", get(handlers::metrics))
        .route("/v1/peers", get(handlers::peers))
        .route("/v1/ping", get(handlers::ping))
        .route("/v1/quit", get(handlers::quit))
        .layer(cors)
        .with_state(ApiState { node })
}

/// Bind and serve on `:port`, retrying the bind with a linear backoff so
/// a restart can wait out a predecessor still holding the port.
pub async fn serve(node: Arc<MeshNode>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = bind_with_retry(addr).await?;
    serve_listener(node, listener).await
}

/// Serve on an already-bound listener. Exposed so tests can use an
/// ephemeral port.
pub async fn serve_listener(node: Arc<MeshNode>, listener: TcpListener) -> Result<()> {
    let local = listener.local_addr().context("listener local addr")?;
    tracing::info!(listen = %local, report = node.srv_port(), "admin server listening");

    let app = router(node.clone());
    let shutdown = node.cancel_token();
    let drain = node.cancel_token();

    let serve_fut = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    };

    tokio::select! {
        res = serve_fut => {
            res.context("admin server")?;
        }
        _ = async move {
            drain.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!(grace = ?SHUTDOWN_GRACE, "graceful drain timed out, closing server");
        }
    }
    Ok(())
}

async fn bind_with_retry(addr: SocketAddr) -> Result<TcpListener> {
    let mut tries = 0u64;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err) if tries < BIND_RETRIES => {
                tries += 1;
                tracing::warn!(%addr, %err, tries, "bind failed, retrying");
                tokio::time::sleep(Duration::from_secs(tries)).await;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("bind {}", addr));
            }
        }
    }
}
