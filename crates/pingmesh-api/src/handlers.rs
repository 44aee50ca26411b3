//! Admin endpoint handlers.
//!
//! Two responses carry load-bearing byte sequences that probers parse
//! out-of-band: the HTML `<p>Served from <loc>\n` line and the JSON
//! `"SrvLoc": "<loc>"` field (two-space pretty encoding). Keep them
//! byte-exact.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pingmesh_node::{mesh, Enrolled};

use crate::memstats::{get_mem_stats, MemStatSummary};
use crate::{ApiState, ROUTES};

const HTML_TRAILER: &str = "\n</body></html>\n";

fn html_header(title: &str) -> String {
    format!("<html><head><title>{}</title></head><body>\n", title)
}

fn bullet(url: &str, text: &str) -> String {
    format!("<li><a href=\"{}\">{}</a></li>\n", url, text)
}

/// Index list of the documented routes; a pure function of the route
/// table.
fn route_list() -> String {
    let mut list = String::from("<ul>\n");
    for route in ROUTES.iter().filter(|r| !r.doc.is_empty()) {
        list.push_str(&bullet(route.uri, route.doc));
    }
    list.push_str("</ul>\n");
    list
}

fn served_from(loc: &str) -> String {
    format!("<p>Served from {}\n", loc)
}

// ── / and /v1 ─────────────────────────────────────────────────────────────────

pub async fn root(State(state): State<ApiState>) -> Html<String> {
    state.node.count_request();
    let loc = state.node.location().to_string();

    let mut response = html_header(&loc);
    response.push_str("<h1> pingmesh </h1>");
    response.push_str("<p>Accessible URLs are:\n");
    response.push_str(&route_list());
    response.push_str(&served_from(&loc));
    response.push_str(HTML_TRAILER);
    Html(response)
}

// ── /v1/ping ──────────────────────────────────────────────────────────────────

pub async fn ping(State(state): State<ApiState>) -> Html<String> {
    state.node.count_request();
    let loc = state.node.location().to_string();

    let mut response = html_header(&loc);
    response.push_str("<h1> pingResponse </h1>");
    response.push_str(&served_from(&loc));
    response.push_str(HTML_TRAILER);
    Html(response)
}

// ── /v1/peers ─────────────────────────────────────────────────────────────────

pub async fn peers(State(state): State<ApiState>) -> Response {
    state.node.count_request();
    state.node.refresh_srv_ips().await;

    let snapshot = state.node.snapshot();
    match serde_json::to_string_pretty(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(%err, "peer snapshot serialisation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error converting peers to json",
            )
                .into_response()
        }
    }
}

// ── /v1/addpeer ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddPeerParams {
    pub url: Option<String>,
    pub ip: Option<String>,
    pub addpeers: Option<String>,
}

pub async fn addpeer(
    State(state): State<ApiState>,
    Query(params): Query<AddPeerParams>,
) -> Response {
    state.node.count_request();
    let loc = state.node.location().to_string();

    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return Html(addpeer_form(&loc)).into_response();
    };
    let ip = params.ip.unwrap_or_default();

    let expand = params
        .addpeers
        .as_deref()
        .map(|v| matches!(v, "true" | "on" | "1"))
        .unwrap_or(false)
        || url.contains("addpeers=true");

    let mut response = html_header(&loc);
    response.push_str("<h1> addpeerResponse </h1>");

    let status = match state.node.add_ping_target(&url, &ip, pingmesh_core::LOC_UNKNOWN) {
        Ok(Enrolled::New(peer)) => {
            if expand {
                mesh::spawn_expansion(&state.node, &url, &ip);
            }
            response.push_str(&format!(
                "<p>Now pinging {}\n<pre>{}</pre>\n",
                url,
                peer.info()
            ));
            StatusCode::OK
        }
        Ok(Enrolled::AlreadyPresent(_)) => {
            response.push_str(&format!("<p>Peer {} is already being pinged\n", url));
            StatusCode::OK
        }
        Err(err) => {
            response.push_str(&format!("<p>Cannot add peer: {}\n", err));
            StatusCode::BAD_REQUEST
        }
    };

    response.push_str(&served_from(&loc));
    response.push_str(HTML_TRAILER);
    (status, Html(response)).into_response()
}

fn addpeer_form(loc: &str) -> String {
    let mut response = html_header(loc);
    response.push_str("<h1> addpeer </h1>");
    response.push_str(concat!(
        "<form action=\"/v1/addpeer\" method=\"get\">\n",
        "Target URL: <input type=\"text\" name=\"url\"><br>\n",
        "Peer IP (optional): <input type=\"text\" name=\"ip\"><br>\n",
        "<input type=\"checkbox\" name=\"addpeers\" value=\"true\"> also ping the target's peers<br>\n",
        "<input type=\"submit\" value=\"Add peer\">\n",
        "</form>\n",
    ));
    response.push_str(&served_from(loc));
    response.push_str(HTML_TRAILER);
    response
}

// ── /v1/metrics ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RuntimeMetrics {
    #[serde(rename = "AppStart")]
    pub app_start: DateTime<Utc>,
    #[serde(rename = "NumPeers")]
    pub num_peers: i64,
    #[serde(rename = "NumActive")]
    pub num_active: i64,
    #[serde(rename = "NumDeleted")]
    pub num_deleted: i64,
    #[serde(rename = "MemStats")]
    pub mem_stats: MemStatSummary,
}

pub async fn metrics(State(state): State<ApiState>) -> Response {
    state.node.count_request();

    let snapshot = state.node.snapshot();
    let m = RuntimeMetrics {
        app_start: state.node.start_time(),
        num_peers: snapshot.num_active + snapshot.num_deleted,
        num_active: snapshot.num_active,
        num_deleted: snapshot.num_deleted,
        mem_stats: get_mem_stats(),
    };

    match serde_json::to_string_pretty(&m) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(%err, "metrics serialisation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error converting metrics to json",
            )
                .into_response()
        }
    }
}

// ── /v1/env ───────────────────────────────────────────────────────────────────

pub async fn env_dump(State(state): State<ApiState>) -> Html<String> {
    state.node.count_request();
    let loc = state.node.location().to_string();

    let mut pairs: Vec<String> = std::env::vars()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();

    let mut response = html_header(&loc);
    response.push_str("<h1> Runtime Environment </h1>");
    response.push_str(&format!("<p>Server in {} with environment:\n<pre>\n", loc));
    for pair in pairs {
        response.push_str(&pair);
        response.push('\n');
    }

    response.push_str("</pre>\n<h2> Server and Peer State </h2>\n<pre>");
    let snapshot = state.node.snapshot();
    response.push_str(&serde_json::to_string_pretty(&snapshot).unwrap_or_default());

    response.push_str("</pre>\n<h2> Memory Stats </h2>\n<pre>");
    response.push_str(&serde_json::to_string_pretty(&get_mem_stats()).unwrap_or_default());

    response.push_str("</pre>\n");
    response.push_str(HTML_TRAILER);
    Html(response)
}

// ── /v1/quit ──────────────────────────────────────────────────────────────────

pub async fn quit(State(state): State<ApiState>) -> Html<String> {
    state.node.count_request();
    tracing::info!("quit requested, shutting down");
    let loc = state.node.location().to_string();

    let mut response = html_header(&loc);
    response.push_str("<h1> quitResponse </h1>");
    response.push_str(&format!(
        "<p>Server in {} shutting down with these peers:\n<pre>\n",
        loc
    ));
    let snapshot = state.node.snapshot();
    response.push_str(&serde_json::to_string_pretty(&snapshot.peers).unwrap_or_default());
    response.push_str("</pre>\n");
    response.push_str(HTML_TRAILER);

    state.node.close_done();
    Html(response)
}
