//! Protocol core: method routing and response construction.
//!
//! `handle_request` accepts a raw JSON body (or a pre-parsed envelope via
//! `handle_parsed`), routes by method name through an explicit finite
//! dispatch table, and always produces exactly one response envelope.
//! Every branch records a statistics sample and fires the instance's
//! before/after event hooks; a before-hook may set the reject flag to
//! short-circuit with an error response.

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::mcp::events::RequestContext;
use crate::mcp::protocol::{
    self, ErrorCode, JsonRpcError, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponseEnvelope, MCP_PROTOCOL_VERSION,
};
use crate::mcp::registry::ArgumentMap;
use crate::mcp::server::ServerInstance;

/// Method name recorded for bodies that never parsed into an envelope.
const INVALID_METHOD: &str = "invalid";

/// The finite set of protocol methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Capability and version discovery.
    Initialize,
    /// List registered tools.
    ToolsList,
    /// Invoke a registered tool.
    ToolsCall,
    /// List registered resources.
    ResourcesList,
    /// Read one resource by URI.
    ResourcesRead,
    /// List registered prompts.
    PromptsList,
    /// Generate one prompt by name.
    PromptsGet,
    /// Liveness probe.
    Ping,
}

impl Method {
    /// Resolves a wire method name. Unknown names return `None` and map to
    /// a method-not-found error.
    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            "resources/list" => Some(Self::ResourcesList),
            "resources/read" => Some(Self::ResourcesRead),
            "prompts/list" => Some(Self::PromptsList),
            "prompts/get" => Some(Self::PromptsGet),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }

    /// The wire name of this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::PromptsList => "prompts/list",
            Self::PromptsGet => "prompts/get",
            Self::Ping => "ping",
        }
    }
}

/// Server capabilities advertised during initialisation and discovery.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
    /// Resource-related capabilities.
    pub resources: Map<String, Value>,
    /// Prompt-related capabilities.
    pub prompts: Map<String, Value>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolCapabilities::default(),
            resources: Map::new(),
            prompts: Map::new(),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parameters for `resources/read`.
#[derive(Debug, Clone, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

/// Parameters for `prompts/get`.
#[derive(Debug, Clone, Deserialize)]
struct PromptGetParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl ServerInstance {
    /// Handles a raw request body, producing exactly one response envelope.
    ///
    /// A parse failure yields a `-32700` envelope with a null id.
    pub fn handle_request(&self, raw: &str) -> ResponseEnvelope {
        let mut ctx = RequestContext::new(self.name());
        self.handle_request_with_context(raw, &mut ctx)
    }

    /// Handles a raw request body with a caller-provided context, so
    /// request-scoped attributes set by the security pipeline stay visible
    /// to event hooks.
    pub fn handle_request_with_context(
        &self,
        raw: &str,
        ctx: &mut RequestContext,
    ) -> ResponseEnvelope {
        let started = Instant::now();
        match protocol::parse_request(raw) {
            Ok(request) => self.dispatch(request, ctx, started),
            Err(error) => {
                let duration_ms = duration_ms_since(started);
                self.with_stats(|stats| {
                    stats.record_request(
                        INVALID_METHOD,
                        duration_ms,
                        false,
                        Some(error.error.code),
                    );
                    stats.record_error(error.error.code, &error.error.message, INVALID_METHOD);
                });
                ResponseEnvelope::Error(error)
            }
        }
    }

    /// Handles a pre-parsed request envelope.
    pub fn handle_parsed(&self, request: JsonRpcRequest) -> ResponseEnvelope {
        let mut ctx = RequestContext::new(self.name());
        self.dispatch(request, &mut ctx, Instant::now())
    }

    /// Handles a pre-parsed request envelope with a caller-provided context.
    pub fn handle_parsed_with_context(
        &self,
        request: JsonRpcRequest,
        ctx: &mut RequestContext,
    ) -> ResponseEnvelope {
        self.dispatch(request, ctx, Instant::now())
    }

    fn dispatch(
        &self,
        request: JsonRpcRequest,
        ctx: &mut RequestContext,
        started: Instant,
    ) -> ResponseEnvelope {
        ctx.set_request(&request.method, request.id.clone());

        let hooks = self.hooks_snapshot();
        for hook in &hooks {
            hook.before_request(ctx);
        }

        let outcome = if let Some(reason) = ctx.rejection() {
            Err(JsonRpcError::transport_denied(
                request.id.clone(),
                reason.to_string(),
            ))
        } else {
            Method::from_method(&request.method).map_or_else(
                || {
                    Err(JsonRpcError::method_not_found(
                        request.id.clone(),
                        &request.method,
                    ))
                },
                |method| self.invoke(method, &request),
            )
        };

        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        let envelope = match outcome {
            Ok(response) => ResponseEnvelope::Success(response),
            Err(error) => ResponseEnvelope::Error(error),
        };

        let failure = envelope
            .error_code()
            .map(|code| (code, envelope.error_message().unwrap_or("").to_string()));

        self.with_stats(|stats| {
            stats.record_request(
                &request.method,
                duration_ms,
                failure.is_none(),
                failure.as_ref().map(|(code, _)| *code),
            );
            if let Some((code, message)) = &failure {
                stats.record_error(*code, message, &request.method);
            }
        });

        if let Some((code, message)) = &failure {
            tracing::debug!(
                server = self.name(),
                method = %request.method,
                code,
                "request failed"
            );
            for hook in &hooks {
                hook.on_error(ctx, *code, message, elapsed);
            }
        }
        for hook in &hooks {
            hook.after_request(ctx, &envelope, elapsed);
        }

        envelope
    }

    fn invoke(
        &self,
        method: Method,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        match method {
            Method::Initialize => Ok(JsonRpcResponse::success(
                request.id.clone(),
                self.discovery_info(),
            )),
            Method::ToolsList => Ok(self.handle_tools_list(request)),
            Method::ToolsCall => self.handle_tools_call(request),
            Method::ResourcesList => Ok(self.handle_resources_list(request)),
            Method::ResourcesRead => self.handle_resources_read(request),
            Method::PromptsList => Ok(self.handle_prompts_list(request)),
            Method::PromptsGet => self.handle_prompts_get(request),
            Method::Ping => Ok(JsonRpcResponse::success(request.id.clone(), json!({}))),
        }
    }

    /// Builds the capability/version struct served by `initialize` and by
    /// the HTTP transport's GET discovery.
    #[must_use]
    pub fn discovery_info(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": {
                "name": self.name(),
                "version": self.version(),
                "description": self.description(),
            },
        })
    }

    fn handle_tools_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<Value> = self
            .list_tools()
            .iter()
            .map(super::registry::ToolDefinition::wire_entry)
            .collect();
        JsonRpcResponse::success(request.id.clone(), json!({ "tools": tools }))
    }

    fn handle_tools_call(
        &self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = parse_params(request)?;
        let arguments = argument_map(&params.arguments, &request.id)?;

        let tool = self.get_tool(&params.name).ok_or_else(|| {
            JsonRpcError::new(
                request.id.clone(),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown tool: {}", params.name),
                ),
            )
        })?;

        let started = Instant::now();
        let result = (tool.handler)(&arguments);
        let duration_ms = duration_ms_since(started);

        match result {
            Ok(value) => {
                self.with_stats(|stats| stats.record_tool_invocation(&params.name, duration_ms));
                Ok(JsonRpcResponse::success(request.id.clone(), value))
            }
            Err(message) => Err(JsonRpcError::internal_error(request.id.clone(), message)),
        }
    }

    fn handle_resources_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let resources: Vec<Value> = self
            .list_resources()
            .iter()
            .map(super::registry::ResourceDefinition::wire_entry)
            .collect();
        JsonRpcResponse::success(request.id.clone(), json!({ "resources": resources }))
    }

    fn handle_resources_read(
        &self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ResourceReadParams = parse_params(request)?;

        let resource = self.get_resource(&params.uri).ok_or_else(|| {
            JsonRpcError::new(
                request.id.clone(),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown resource: {}", params.uri),
                ),
            )
        })?;

        let text = (resource.handler)()
            .map_err(|message| JsonRpcError::internal_error(request.id.clone(), message))?;

        self.with_stats(|stats| stats.record_resource_read(&params.uri));

        Ok(JsonRpcResponse::success(
            request.id.clone(),
            json!({
                "contents": [{
                    "uri": resource.uri,
                    "mimeType": resource.mime_type,
                    "text": text,
                }],
            }),
        ))
    }

    fn handle_prompts_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let prompts: Vec<Value> = self
            .list_prompts()
            .iter()
            .map(super::registry::PromptDefinition::wire_entry)
            .collect();
        JsonRpcResponse::success(request.id.clone(), json!({ "prompts": prompts }))
    }

    fn handle_prompts_get(
        &self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: PromptGetParams = parse_params(request)?;
        let arguments = argument_map(&params.arguments, &request.id)?;

        let prompt = self.get_prompt(&params.name).ok_or_else(|| {
            JsonRpcError::new(
                request.id.clone(),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown prompt: {}", params.name),
                ),
            )
        })?;

        for arg in &prompt.args {
            if arg.required && !arguments.contains_key(&arg.name) {
                return Err(JsonRpcError::invalid_params(
                    request.id.clone(),
                    format!("Missing required argument: {}", arg.name),
                ));
            }
        }

        let messages = (prompt.handler)(&arguments)
            .map_err(|message| JsonRpcError::internal_error(request.id.clone(), message))?;

        self.with_stats(|stats| stats.record_prompt_generation(&params.name));

        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|message| {
                json!({
                    "role": message.role,
                    "content": { "type": "text", "text": message.content },
                })
            })
            .collect();

        Ok(JsonRpcResponse::success(
            request.id.clone(),
            json!({
                "description": prompt.description,
                "messages": wire_messages,
            }),
        ))
    }
}

fn parse_params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    request
        .params
        .as_ref()
        .map(|params| serde_json::from_value(params.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(request.id.clone(), format!("Invalid params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(request.id.clone(), "Missing params"))
}

fn argument_map(value: &Value, id: &Option<RequestId>) -> Result<ArgumentMap, JsonRpcError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        _ => Err(JsonRpcError::invalid_params(
            id.clone(),
            "arguments must be an object",
        )),
    }
}

fn duration_ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
