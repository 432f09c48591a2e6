//! Lifecycle and dispatch event hooks.
//!
//! External listeners implement [`EventHook`] to observe server
//! creation/removal and every request/response/error, or to veto a request
//! before dispatch by setting the reject flag on the [`RequestContext`].

use std::time::Duration;

use serde_json::{Map, Value};

use crate::mcp::protocol::{RequestId, ResponseEnvelope};

/// Request-scoped state shared between the security pipeline, event hooks,
/// and the dispatcher.
///
/// The attribute map lets an API-key callback or a before-hook tag the
/// caller (e.g. with a tenant id) for downstream use.
#[derive(Debug, Clone)]
pub struct RequestContext {
    server: String,
    method: String,
    id: Option<RequestId>,
    attributes: Map<String, Value>,
    reject_reason: Option<String>,
}

impl RequestContext {
    /// Creates a context for one inbound call against the named instance.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            method: String::new(),
            id: None,
            attributes: Map::new(),
            reject_reason: None,
        }
    }

    /// The target server instance name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// The request method (empty until the envelope is parsed).
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request id, if the envelope carried one.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub(crate) fn set_request(&mut self, method: &str, id: Option<RequestId>) {
        self.method = method.to_string();
        self.id = id;
    }

    /// Stores a request-scoped attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Reads a request-scoped attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Flags this request for rejection before dispatch.
    ///
    /// The dispatcher short-circuits with a `-32000` error envelope
    /// carrying the reason.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.reject_reason = Some(reason.into());
    }

    /// Returns the rejection reason, if a hook vetoed the request.
    #[must_use]
    pub fn rejection(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }
}

/// Listener for server lifecycle and dispatch events.
///
/// All methods default to no-ops so implementors override only what they
/// observe.
pub trait EventHook: Send + Sync {
    /// Fired after a server instance is created in the gateway table.
    fn on_server_created(&self, name: &str) {
        let _ = name;
    }

    /// Fired before a server instance is removed from the gateway table.
    fn on_server_removed(&self, name: &str) {
        let _ = name;
    }

    /// Fired before dispatch. May call [`RequestContext::reject`] to veto.
    fn before_request(&self, ctx: &mut RequestContext) {
        let _ = ctx;
    }

    /// Fired after dispatch with the produced envelope.
    fn after_request(&self, ctx: &RequestContext, envelope: &ResponseEnvelope, elapsed: Duration) {
        let _ = (ctx, envelope, elapsed);
    }

    /// Fired when dispatch produced an error envelope, with full context
    /// for external logging/alerting.
    fn on_error(&self, ctx: &RequestContext, code: i32, message: &str, elapsed: Duration) {
        let _ = (ctx, code, message, elapsed);
    }
}
