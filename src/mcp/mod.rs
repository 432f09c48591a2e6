//! Gateway protocol implementation.
//!
//! This module exposes host application capabilities (tools, resources,
//! prompts) to AI clients over JSON-RPC 2.0, reachable over HTTP and over
//! newline-delimited stdio.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Gateway                             │
//! │                                                              │
//! │  ┌───────────┐   ┌──────────┐   ┌────────────┐              │
//! │  │ Transport │──▶│ Security │──▶│ Dispatcher │              │
//! │  │ http/stdio│   │ pipeline │   │ (protocol) │              │
//! │  └───────────┘   └──────────┘   └─────┬──────┘              │
//! │                                       │                      │
//! │                   ┌───────────────────┼───────────────┐      │
//! │                   ▼                   ▼               ▼      │
//! │             ┌──────────┐        ┌──────────┐   ┌──────────┐ │
//! │             │Registries│        │  Stats   │   │  Hooks   │ │
//! │             └──────────┘        └──────────┘   └──────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod events;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod security;
pub mod server;
pub mod stats;
pub mod transport;

pub use dispatcher::Method;
pub use events::{EventHook, RequestContext};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponseEnvelope, MCP_PROTOCOL_VERSION,
};
pub use registry::{
    PromptArg, PromptDefinition, PromptMessage, ResourceDefinition, ToolArg, ToolDefinition,
};
pub use scanner::{AnnotationScanner, HandlerBindings, ScanReport};
pub use security::SecurityPolicy;
pub use server::ServerInstance;
pub use stats::{StatsReport, StatsSummary};
pub use transport::{StdioServer, StdioTransport};
