//! HTTP transport: one request per protocol call.
//!
//! - `POST /mcp` (or `/mcp/{server}`) dispatches one envelope
//! - `GET` answers capability discovery without dispatch
//! - `OPTIONS` answers CORS preflight without dispatch
//!
//! The target instance is resolved from the trailing path segment, else a
//! `?server=` query parameter, else the well-known default instance.
//! Exactly one response is written per inbound call, and every response,
//! success or error, carries the fixed security header set.

use std::io;

use axum::extract::{Path, Query};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::mcp::events::RequestContext;
use crate::mcp::gateway::{self, DEFAULT_INSTANCE};
use crate::mcp::protocol::JsonRpcError;
use crate::mcp::security::{
    origin_allowed, run_pipeline, SecurityDenial, SecurityPolicy, SecurityRequest,
    BASIC_CHALLENGE, HSTS_HEADER, SECURITY_HEADERS,
};

/// Query-string server selection (`?server=<name>`).
#[derive(Debug, Deserialize)]
struct ServerSelect {
    #[serde(default)]
    server: Option<String>,
}

/// Builds the transport router.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route(
            "/mcp",
            post(post_default).get(get_default).options(options_default),
        )
        .route(
            "/mcp/{server}",
            post(post_named).get(get_named).options(options_named),
        )
}

/// Binds the listener and serves the router until ctrl-c.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve(listen: &str) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP transport listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler");
    } else {
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

async fn post_default(
    Query(select): Query<ServerSelect>,
    headers: HeaderMap,
    body: String,
) -> Response {
    dispatch_call(&resolve_name(None, select.server), &headers, &body)
}

async fn post_named(
    Path(server): Path<String>,
    Query(select): Query<ServerSelect>,
    headers: HeaderMap,
    body: String,
) -> Response {
    dispatch_call(&resolve_name(Some(server), select.server), &headers, &body)
}

async fn get_default(Query(select): Query<ServerSelect>, headers: HeaderMap) -> Response {
    discovery_call(&resolve_name(None, select.server), &headers)
}

async fn get_named(
    Path(server): Path<String>,
    Query(select): Query<ServerSelect>,
    headers: HeaderMap,
) -> Response {
    discovery_call(&resolve_name(Some(server), select.server), &headers)
}

async fn options_default(Query(select): Query<ServerSelect>, headers: HeaderMap) -> Response {
    preflight_call(&resolve_name(None, select.server), &headers)
}

async fn options_named(
    Path(server): Path<String>,
    Query(select): Query<ServerSelect>,
    headers: HeaderMap,
) -> Response {
    preflight_call(&resolve_name(Some(server), select.server), &headers)
}

fn resolve_name(path_segment: Option<String>, query: Option<String>) -> String {
    path_segment
        .or(query)
        .unwrap_or_else(|| DEFAULT_INSTANCE.to_string())
}

/// Runs the security pipeline and dispatches one protocol call.
fn dispatch_call(server: &str, headers: &HeaderMap, body: &str) -> Response {
    let instance = gateway::get(server);
    let policy = instance.security_policy();
    let origin = header_str(headers, "origin");

    let mut ctx = RequestContext::new(server);
    let security_request = SecurityRequest {
        body_len: body.len(),
        origin,
        authorization: header_str(headers, "authorization"),
        api_key: header_str(headers, "x-api-key"),
    };

    if let Err(denial) = run_pipeline(&policy, &security_request, &mut ctx) {
        tracing::debug!(server, denial = ?denial, "security pipeline denied request");
        return denial_response(&denial, &policy, origin);
    }

    let envelope = instance.handle_request_with_context(body, &mut ctx);
    json_response(StatusCode::OK, &policy, origin, &envelope.to_json_line())
}

/// Answers a GET with `initialize`-equivalent capabilities.
///
/// Discovery is an inbound call like any other: the security pipeline
/// still applies, with an empty body.
fn discovery_call(server: &str, headers: &HeaderMap) -> Response {
    let instance = gateway::get(server);
    let policy = instance.security_policy();
    let origin = header_str(headers, "origin");

    let mut ctx = RequestContext::new(server);
    let security_request = SecurityRequest {
        body_len: 0,
        origin,
        authorization: header_str(headers, "authorization"),
        api_key: header_str(headers, "x-api-key"),
    };
    if let Err(denial) = run_pipeline(&policy, &security_request, &mut ctx) {
        return denial_response(&denial, &policy, origin);
    }

    let info = instance.discovery_info().to_string();
    json_response(StatusCode::OK, &policy, origin, &info)
}

/// Answers an OPTIONS preflight with CORS headers only, no dispatch.
fn preflight_call(server: &str, headers: &HeaderMap) -> Response {
    let instance = gateway::get(server);
    let policy = instance.security_policy();
    let origin = header_str(headers, "origin");

    let mut headers = response_headers(&policy, origin);
    headers.remove(CONTENT_TYPE);
    (StatusCode::NO_CONTENT, headers).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Assembles the fixed header set: content type, security headers,
/// conditional HSTS, and CORS headers for allowed origins.
fn response_headers(policy: &SecurityPolicy, origin: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    if policy.strict_transport_security {
        headers.insert(
            HeaderName::from_static(HSTS_HEADER.0),
            HeaderValue::from_static(HSTS_HEADER.1),
        );
    }

    let allow_origin = match origin {
        None => Some("*".to_string()),
        Some(origin) => {
            if policy.allowed_origins.is_empty() || origin_allowed(origin, &policy.allowed_origins)
            {
                Some(origin.to_string())
            } else {
                None
            }
        }
    };

    if let Some(allow_origin) = allow_origin {
        if let Ok(value) = HeaderValue::from_str(&allow_origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, Authorization, X-API-Key"),
            );
            headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
        }
    }

    headers
}

fn json_response(
    status: StatusCode,
    policy: &SecurityPolicy,
    origin: Option<&str>,
    body: &str,
) -> Response {
    (status, response_headers(policy, origin), body.to_string()).into_response()
}

fn denial_response(
    denial: &SecurityDenial,
    policy: &SecurityPolicy,
    origin: Option<&str>,
) -> Response {
    let status =
        StatusCode::from_u16(denial.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = response_headers(policy, origin);
    if matches!(
        denial,
        SecurityDenial::Unauthorized {
            basic_challenge: true
        }
    ) {
        headers.insert(
            HeaderName::from_static(BASIC_CHALLENGE.0),
            HeaderValue::from_static(BASIC_CHALLENGE.1),
        );
    }

    let body = serde_json::to_string(&JsonRpcError::transport_denied(None, denial.message()))
        .unwrap_or_default();

    (status, headers, body).into_response()
}
