/// HTTP endpoint over the daemon's published state.
///
/// Hands the latest snapshot, the term list, the catalog and the station
/// registry to presentation clients as JSON. Two POST routes mirror the
/// operator controls of a desktop viewer: refreshing the term list and
/// selecting a term.
///
/// Endpoints:
/// - GET  /health                 - Service health check
/// - GET  /terms                  - Known terms, newest first, and the selection
/// - GET  /stations               - Configured servers and stations
/// - GET  /catalog                - Measurement types with row labels
/// - GET  /snapshot               - Raw reconciled matrix (code → station → text)
/// - GET  /table                  - Ordered table view with placeholders
/// - POST /terms/refresh          - Rediscover terms, then run a pass
/// - POST /terms/select/{index}   - Select a term by position, then run a pass

use std::io::Cursor;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::analysis::table::build_table;
use crate::daemon::{Daemon, PassControl};
use crate::error::SelectionError;
use crate::model::Term;
use crate::monitor::MonitorState;
use crate::stations::StationRegistry;
use crate::terms::format_term;

const AVAILABLE_ENDPOINTS: [&str; 8] = [
    "GET /health",
    "GET /terms",
    "GET /stations",
    "GET /catalog",
    "GET /snapshot",
    "GET /table",
    "POST /terms/refresh",
    "POST /terms/select/{index}",
];

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the endpoint reads or pokes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EndpointContext {
    pub state: Arc<MonitorState>,
    pub registry: Arc<StationRegistry>,
    pub control: Arc<PassControl>,
}

impl EndpointContext {
    pub fn from_daemon(daemon: &Daemon) -> Self {
        Self {
            state: daemon.state(),
            registry: daemon.registry(),
            control: daemon.control(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TermEntry {
    index: usize,
    term: Term,
    label: String,
}

#[derive(Debug, Serialize)]
struct CatalogEntry<'a> {
    code: &'a str,
    caption: &'a str,
    source_unit: &'a str,
    target_unit: &'a str,
    label: String,
}

/// Status code plus JSON body, before it becomes a `tiny_http` response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request line to a reply. The query string is ignored.
pub fn route(ctx: &EndpointContext, method: &Method, url: &str) -> Reply {
    let path = url.split('?').next().unwrap_or("");
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };

    match (method, path) {
        (Method::Get, "/health") => handle_health(ctx),
        (Method::Get, "/terms") => handle_terms(ctx),
        (Method::Get, "/stations") => handle_stations(ctx),
        (Method::Get, "/catalog") => handle_catalog(ctx),
        (Method::Get, "/snapshot") => handle_snapshot(ctx),
        (Method::Get, "/table") => handle_table(ctx),
        (Method::Post, "/terms/refresh") => handle_refresh(ctx),
        (Method::Post, p) if p.starts_with("/terms/select/") => {
            handle_select(ctx, p.trim_start_matches("/terms/select/"))
        }
        (_, p) if is_known_path(p) => Reply::error(405, format!("method {} not allowed on {}", method, p)),
        _ => Reply {
            status: 404,
            body: json!({
                "error": "Not found",
                "available_endpoints": AVAILABLE_ENDPOINTS,
            }),
        },
    }
}

fn is_known_path(path: &str) -> bool {
    matches!(
        path,
        "/health" | "/terms" | "/stations" | "/catalog" | "/snapshot" | "/table" | "/terms/refresh"
    ) || path.starts_with("/terms/select/")
}

fn handle_health(ctx: &EndpointContext) -> Reply {
    let snapshot = ctx.state.snapshot();
    Reply::ok(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "pass": snapshot.pass,
        "updated_at": snapshot.updated_at,
        "pass_in_flight": ctx.control.is_in_flight(),
    }))
}

fn handle_terms(ctx: &EndpointContext) -> Reply {
    let list = ctx.state.terms();
    let terms: Vec<TermEntry> = list
        .terms
        .iter()
        .enumerate()
        .map(|(index, &term)| TermEntry {
            index,
            term,
            label: format_term(term),
        })
        .collect();
    Reply::ok(json!({
        "terms": terms,
        "selected": list.selected,
        "refreshed_at": list.refreshed_at,
    }))
}

fn handle_stations(ctx: &EndpointContext) -> Reply {
    Reply::ok(json!({
        "servers": ctx.registry.servers(),
        "stations": ctx.registry.stations(),
        "display_order": ctx.registry.sorted_station_indices(),
    }))
}

fn handle_catalog(ctx: &EndpointContext) -> Reply {
    let catalog = ctx.state.catalog();
    let entries: Vec<CatalogEntry> = catalog
        .sorted_types()
        .into_iter()
        .map(|mt| CatalogEntry {
            code: &mt.code,
            caption: &mt.display_name,
            source_unit: &mt.source_unit,
            target_unit: &mt.target_unit,
            label: crate::catalog::row_label(mt),
        })
        .collect();
    Reply::ok(json!({ "measurements": entries }))
}

fn handle_snapshot(ctx: &EndpointContext) -> Reply {
    let snapshot = ctx.state.snapshot();
    Reply::ok(json!({
        "term": snapshot.term,
        "term_label": snapshot.term.map(format_term),
        "pass": snapshot.pass,
        "updated_at": snapshot.updated_at,
        "cells": snapshot.matrix.to_nested(),
    }))
}

fn handle_table(ctx: &EndpointContext) -> Reply {
    let snapshot = ctx.state.snapshot();
    let view = build_table(&ctx.state.catalog(), &ctx.registry, &snapshot);
    match serde_json::to_value(&view) {
        Ok(body) => Reply::ok(body),
        Err(e) => Reply::error(500, format!("failed to serialize table: {}", e)),
    }
}

fn handle_refresh(ctx: &EndpointContext) -> Reply {
    ctx.control.request_term_refresh();
    info!("term refresh requested over HTTP");
    Reply {
        status: 202,
        body: json!({ "status": "term refresh scheduled" }),
    }
}

fn handle_select(ctx: &EndpointContext, raw_index: &str) -> Reply {
    let index: usize = match raw_index.parse() {
        Ok(i) => i,
        Err(_) => return Reply::error(400, format!("invalid term index '{}'", raw_index)),
    };
    match ctx.state.select_term(index) {
        Ok(term) => {
            ctx.control.trigger();
            info!(index, term = %format_term(term), "term selected over HTTP");
            Reply::ok(json!({
                "selected": index,
                "term": term,
                "label": format_term(term),
            }))
        }
        Err(e @ SelectionError::NoTerms) => Reply::error(409, e.to_string()),
        Err(e @ SelectionError::OutOfRange { .. }) => Reply::error(404, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port
pub fn start_endpoint_server(port: u16, ctx: EndpointContext) -> Result<(), String> {
    let server = Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, "HTTP endpoint listening");
    serve(&server, &ctx);
    Ok(())
}

/// Answers requests until the server is dropped or unblocked.
pub fn serve(server: &Server, ctx: &EndpointContext) {
    for request in server.incoming_requests() {
        let reply = route(ctx, request.method(), request.url());
        debug!(method = %request.method(), url = request.url(), status = reply.status, "request");

        if let Err(e) = request.respond(create_response(reply)) {
            warn!(error = %e, "failed to send response");
        }
    }
}

/// Create HTTP response with JSON body
fn create_response(reply: Reply) -> Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(&reply.body).unwrap_or_else(|_| "{}".to_string());
    let response = Response::from_data(body.into_bytes()).with_status_code(StatusCode::from(reply.status));

    match Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
