//! toolbridge-mcp: embeddable MCP gateway for host application capabilities
//!
//! This library exposes a host application's callable functions, documents,
//! and prompt templates to AI clients through a JSON-RPC 2.0 protocol,
//! reachable over two transports: HTTP and newline-delimited stdio.
//!
//! # Architecture
//!
//! The transports are thin: identical business logic (tools, resources,
//! prompts) serves both without duplication.
//!
//! - **Protocol core**: parses envelopes, routes by method, builds responses
//! - **Registries**: in-memory, insertion-ordered tool/resource/prompt maps
//! - **Security pipeline**: body-size → CORS → basic-auth → API-key checks
//! - **Statistics**: counters plus a capped rolling timing buffer
//! - **Gateway**: process-wide table of named server instances
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — Protocol, registries, transports, security, statistics

pub mod config;
pub mod error;
pub mod mcp;
