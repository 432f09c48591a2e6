//! In-memory registries for tools, resources, and prompts.
//!
//! Each registry is a name/URI-keyed, insertion-ordered map. Registration
//! overwrites silently on duplicate keys; listing returns entries in
//! insertion order. Definitions are cheap to clone (handlers are shared
//! behind `Arc`), so lookups hand out owned copies that outlive any lock.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Argument map passed to tool and prompt handlers.
pub type ArgumentMap = Map<String, Value>;

/// A tool handler: `(argument map) -> (result value or failure message)`.
pub type ToolHandler = Arc<dyn Fn(&ArgumentMap) -> Result<Value, String> + Send + Sync>;

/// A resource handler: zero-argument producer of content text.
pub type ResourceHandler = Arc<dyn Fn() -> Result<String, String> + Send + Sync>;

/// A prompt handler: `(argument map) -> ordered list of messages`.
pub type PromptHandler =
    Arc<dyn Fn(&ArgumentMap) -> Result<Vec<PromptMessage>, String> + Send + Sync>;

/// One entry of a tool's argument descriptor list.
#[derive(Debug, Clone, Serialize)]
pub struct ToolArg {
    /// Argument name.
    pub name: String,
    /// JSON type name ("string", "integer", "number", "boolean", ...).
    #[serde(rename = "type")]
    pub arg_type: String,
    /// Whether the argument must be supplied.
    pub required: bool,
    /// Human-readable description.
    pub description: String,
}

impl ToolArg {
    /// Creates a required string argument.
    #[must_use]
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type: "string".to_string(),
            required: true,
            description: description.into(),
        }
    }

    /// Creates an optional string argument.
    #[must_use]
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type: "string".to_string(),
            required: false,
            description: description.into(),
        }
    }

    /// Overrides the JSON type name.
    #[must_use]
    pub fn with_type(mut self, arg_type: impl Into<String>) -> Self {
        self.arg_type = arg_type.into();
        self
    }
}

/// A named, callable capability with a described argument schema.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Ordered argument descriptors.
    pub args: Vec<ToolArg>,
    /// The invocation handler.
    pub handler: ToolHandler,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        args: Vec<ToolArg>,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args,
            handler,
        }
    }

    /// Derives a JSON-Schema object from the argument descriptors.
    ///
    /// Derivation happens at listing time, not registration time, so later
    /// edits to the descriptors are reflected.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for arg in &self.args {
            properties.insert(
                arg.name.clone(),
                json!({
                    "type": arg.arg_type,
                    "description": arg.description,
                }),
            );
            if arg.required {
                required.push(Value::String(arg.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Renders the MCP wire shape for `tools/list`.
    #[must_use]
    pub fn wire_entry(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A named, URI-addressable read-only data source.
///
/// Content is produced lazily on read, never cached by the gateway.
#[derive(Clone)]
pub struct ResourceDefinition {
    /// Unique resource URI (registry key).
    pub uri: String,
    /// Human-readable name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// MIME type of the produced content.
    pub mime_type: String,
    /// The content producer.
    pub handler: ResourceHandler,
}

impl ResourceDefinition {
    /// Creates a new resource definition.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
        handler: ResourceHandler,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: mime_type.into(),
            handler,
        }
    }

    /// Renders the MCP wire shape for `resources/list`.
    #[must_use]
    pub fn wire_entry(&self) -> Value {
        json!({
            "uri": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
        })
    }
}

impl std::fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

/// One entry of a prompt's argument specification.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArg {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the argument must be supplied to `prompts/get`.
    pub required: bool,
}

impl PromptArg {
    /// Creates a prompt argument specification.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

/// One role/content message produced by a prompt handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Message role ("user", "assistant", "system").
    pub role: String,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A named, parameterised template producing a structured message list.
#[derive(Clone)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Argument specifications.
    pub args: Vec<PromptArg>,
    /// The message generator.
    pub handler: PromptHandler,
}

impl PromptDefinition {
    /// Creates a new prompt definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        args: Vec<PromptArg>,
        handler: PromptHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args,
            handler,
        }
    }

    /// Renders the MCP wire shape for `prompts/list`.
    #[must_use]
    pub fn wire_entry(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.args,
        })
    }
}

impl std::fmt::Debug for PromptDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A definition that knows its own registry key.
pub trait Keyed {
    /// Returns the registry key (tool/prompt name, resource URI).
    fn key(&self) -> &str;
}

impl Keyed for ToolDefinition {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Keyed for ResourceDefinition {
    fn key(&self) -> &str {
        &self.uri
    }
}

impl Keyed for PromptDefinition {
    fn key(&self) -> &str {
        &self.name
    }
}

/// An insertion-ordered registry of definitions.
#[derive(Debug)]
pub struct Registry<T> {
    entries: IndexMap<String, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T: Keyed + Clone> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, overwriting any existing entry with the
    /// same key.
    pub fn register(&mut self, definition: T) {
        self.entries
            .insert(definition.key().to_string(), definition);
    }

    /// Removes a definition. Returns `true` if an entry was removed.
    ///
    /// Uses an order-preserving removal so listings stay in insertion order.
    pub fn unregister(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// Looks up a definition by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).cloned()
    }

    /// Returns `true` if a definition with the key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all definitions.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns all definitions in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<T> {
        self.entries.values().cloned().collect()
    }

    /// Returns all registry keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Registry of tools, keyed by name.
pub type ToolRegistry = Registry<ToolDefinition>;
/// Registry of resources, keyed by URI.
pub type ResourceRegistry = Registry<ResourceDefinition>;
/// Registry of prompts, keyed by name.
pub type PromptRegistry = Registry<PromptDefinition>;
