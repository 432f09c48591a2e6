//! stdio transport: persistent line-oriented channel.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives requests from the client
//! - stdout: sends responses to the client
//! - stderr: may be used for logging (never protocol messages)
//!
//! One process serves many sequential calls against one server instance.
//! Body-size and CORS checks are meaningless without HTTP semantics and
//! are bypassed; basic-auth and API-key checks still apply when
//! configured, reading credentials from `params._meta`. A reserved
//! `shutdown` request terminates the read loop gracefully after flushing
//! its own acknowledgement.

use std::io;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::mcp::events::RequestContext;
use crate::mcp::protocol::{
    parse_request, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponseEnvelope,
    TRANSPORT_ERROR,
};
use crate::mcp::security::{run_pipeline, SecurityRequest};
use crate::mcp::server::ServerInstance;

/// Reserved method that terminates the stdio read loop.
pub const SHUTDOWN_METHOD: &str = "shutdown";

/// A stdio-based transport.
///
/// Handles reading JSON-RPC lines from stdin and writing response lines to
/// stdout.
pub struct StdioTransport {
    /// Buffered reader for stdin.
    reader: BufReader<tokio::io::Stdin>,
    /// Handle for stdout.
    writer: tokio::io::Stdout,
}

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next message line from stdin.
    ///
    /// Returns `None` if stdin is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            // EOF - stdin closed
            return Ok(None);
        }

        // Remove the trailing newline
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes one response envelope to stdout, newline-terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_envelope(&mut self, envelope: &ResponseEnvelope) -> io::Result<()> {
        let json = envelope.to_json_line();

        // Messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// What the read loop should do with one processed input line.
#[derive(Debug)]
pub enum LineOutcome {
    /// Write the envelope and keep reading.
    Respond(ResponseEnvelope),
    /// Write the envelope, then terminate the loop.
    Shutdown(ResponseEnvelope),
    /// Nothing to write (blank line).
    Skip,
}

/// Dispatches one input line through the shared protocol core.
///
/// This is the whole per-line behaviour of the stdio transport, factored
/// out so it can run without a live stdin/stdout pair.
#[must_use]
pub fn process_line(instance: &ServerInstance, line: &str) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Skip;
    }

    // Reuse the dispatcher's parse handling (and its statistics sample)
    // for bodies that never become an envelope.
    let Ok(request) = parse_request(line) else {
        return LineOutcome::Respond(instance.handle_request(line));
    };

    let mut ctx = RequestContext::new(instance.name());

    if let Some(denial) = check_line_auth(instance, &request, &mut ctx) {
        return LineOutcome::Respond(denial);
    }

    if request.method == SHUTDOWN_METHOD {
        instance.with_stats(|stats| stats.record_request(SHUTDOWN_METHOD, 0.0, true, None));
        let ack = JsonRpcResponse::success(request.id, json!({}));
        return LineOutcome::Shutdown(ResponseEnvelope::Success(ack));
    }

    LineOutcome::Respond(instance.handle_parsed_with_context(request, &mut ctx))
}

/// Runs the configured auth checks against credentials carried in
/// `params._meta`. Returns a denial envelope if the request is rejected.
fn check_line_auth(
    instance: &ServerInstance,
    request: &JsonRpcRequest,
    ctx: &mut RequestContext,
) -> Option<ResponseEnvelope> {
    let policy = instance.security_policy();
    if policy.basic_auth.is_none() && policy.api_key_provider.is_none() {
        return None;
    }

    let meta = request.params.as_ref().and_then(|params| params.get("_meta"));
    let authorization = meta
        .and_then(|m| m.get("authorization"))
        .and_then(Value::as_str);
    let api_key = meta.and_then(|m| m.get("apiKey")).and_then(Value::as_str);

    // body_len 0 and no origin: size and CORS checks never fire here.
    let security_request = SecurityRequest {
        body_len: 0,
        origin: None,
        authorization,
        api_key,
    };

    match run_pipeline(&policy, &security_request, ctx) {
        Ok(()) => None,
        Err(denial) => {
            let message = denial.message();
            instance.with_stats(|stats| {
                stats.record_request(&request.method, 0.0, false, Some(TRANSPORT_ERROR));
                stats.record_error(TRANSPORT_ERROR, &message, &request.method);
            });
            Some(ResponseEnvelope::Error(JsonRpcError::transport_denied(
                request.id.clone(),
                message,
            )))
        }
    }
}

/// The stdio server loop: one instance, many sequential calls.
pub struct StdioServer {
    instance: Arc<ServerInstance>,
    transport: StdioTransport,
}

impl StdioServer {
    /// Creates a stdio server bound to the given instance.
    #[must_use]
    pub fn new(instance: Arc<ServerInstance>) -> Self {
        Self {
            instance,
            transport: StdioTransport::new(),
        }
    }

    /// Runs the read loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: io::Result<Option<String>>,
    ) -> io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("stdin closed, shutting down");
            return Ok(true);
        };

        match process_line(&self.instance, &line) {
            LineOutcome::Skip => Ok(false),
            LineOutcome::Respond(envelope) => {
                self.transport.write_envelope(&envelope).await?;
                Ok(false)
            }
            LineOutcome::Shutdown(envelope) => {
                tracing::info!("shutdown requested, terminating read loop");
                self.transport.write_envelope(&envelope).await?;
                Ok(true)
            }
        }
    }
}
