//! Server instance: one named, independently configured collection of
//! tool/resource/prompt registries plus its own security and statistics
//! state.
//!
//! Instances are shared across transports behind `Arc` and must stay safe
//! under concurrent overlapping calls: each mutable part sits behind its
//! own mutex, and no lock is held across an await point. Configuration
//! mutators are fluent (`&self -> &Self`) so call sites can chain them;
//! chaining order carries no meaning.

use std::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mcp::events::{EventHook, RequestContext};
use crate::mcp::registry::{
    PromptDefinition, PromptRegistry, ResourceDefinition, ResourceRegistry, ToolDefinition,
    ToolRegistry,
};
use crate::mcp::security::{ApiKeyProvider, BasicAuthCredentials, SecurityPolicy};
use crate::mcp::stats::{ServerStats, StatsReport, StatsSummary};

/// Mutable instance settings guarded by one lock.
#[derive(Debug, Clone)]
struct InstanceSettings {
    description: String,
    version: String,
    security: SecurityPolicy,
}

/// One named server instance.
pub struct ServerInstance {
    name: String,
    settings: Mutex<InstanceSettings>,
    tools: Mutex<ToolRegistry>,
    resources: Mutex<ResourceRegistry>,
    prompts: Mutex<PromptRegistry>,
    stats: Mutex<ServerStats>,
    hooks: Mutex<Vec<Arc<dyn EventHook>>>,
}

/// Locks a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServerInstance {
    /// Creates an instance with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Mutex::new(InstanceSettings {
                description: String::new(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                security: SecurityPolicy::default(),
            }),
            tools: Mutex::new(ToolRegistry::new()),
            resources: Mutex::new(ResourceRegistry::new()),
            prompts: Mutex::new(PromptRegistry::new()),
            stats: Mutex::new(ServerStats::new()),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// The instance name (gateway registry key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured description.
    #[must_use]
    pub fn description(&self) -> String {
        lock(&self.settings).description.clone()
    }

    /// The configured version string.
    #[must_use]
    pub fn version(&self) -> String {
        lock(&self.settings).version.clone()
    }

    /// A snapshot of the current security policy.
    #[must_use]
    pub fn security_policy(&self) -> SecurityPolicy {
        lock(&self.settings).security.clone()
    }

    // === Fluent configuration ===

    /// Sets the description.
    pub fn with_description(&self, description: impl Into<String>) -> &Self {
        lock(&self.settings).description = description.into();
        self
    }

    /// Sets the version string.
    pub fn with_version(&self, version: impl Into<String>) -> &Self {
        lock(&self.settings).version = version.into();
        self
    }

    /// Replaces the CORS origin allow-list.
    pub fn with_cors_origins(&self, origins: Vec<String>) -> &Self {
        lock(&self.settings).security.allowed_origins = origins;
        self
    }

    /// Appends one CORS origin pattern, ignoring duplicates.
    pub fn add_cors_origin(&self, origin: impl Into<String>) -> &Self {
        let origin = origin.into();
        let mut settings = lock(&self.settings);
        if !settings.security.allowed_origins.contains(&origin) {
            settings.security.allowed_origins.push(origin);
        }
        drop(settings);
        self
    }

    /// Enables basic authentication with the given credentials.
    pub fn with_basic_auth(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> &Self {
        lock(&self.settings).security.basic_auth = Some(BasicAuthCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets the body-size limit in bytes; 0 disables the check.
    pub fn with_body_limit(&self, max_body_bytes: usize) -> &Self {
        lock(&self.settings).security.max_body_bytes = max_body_bytes;
        self
    }

    /// Installs a custom API-key verification callback.
    pub fn with_api_key_provider<F>(&self, provider: F) -> &Self
    where
        F: Fn(&str, &mut RequestContext) -> Result<bool, String> + Send + Sync + 'static,
    {
        lock(&self.settings).security.api_key_provider = Some(Arc::new(provider) as ApiKeyProvider);
        self
    }

    /// Enables or disables the strict-transport-security response header.
    pub fn with_strict_transport_security(&self, enabled: bool) -> &Self {
        lock(&self.settings).security.strict_transport_security = enabled;
        self
    }

    /// Enables or disables statistics tracking.
    pub fn with_stats_enabled(&self, enabled: bool) -> &Self {
        lock(&self.stats).set_enabled(enabled);
        self
    }

    /// Registers an event hook observing this instance's dispatches.
    pub fn add_event_hook(&self, hook: Arc<dyn EventHook>) -> &Self {
        lock(&self.hooks).push(hook);
        self
    }

    pub(crate) fn hooks_snapshot(&self) -> Vec<Arc<dyn EventHook>> {
        lock(&self.hooks).clone()
    }

    // === Tool registry ===

    /// Registers a tool, overwriting any existing tool with the same name.
    pub fn register_tool(&self, tool: ToolDefinition) -> &Self {
        lock(&self.tools).register(tool);
        self
    }

    /// Removes a tool. Returns `true` if one was removed.
    pub fn unregister_tool(&self, name: &str) -> bool {
        lock(&self.tools).unregister(name)
    }

    /// Returns `true` if a tool with the name is registered.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        lock(&self.tools).contains(name)
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<ToolDefinition> {
        lock(&self.tools).get(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        lock(&self.tools).len()
    }

    /// Returns all tools in insertion order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        lock(&self.tools).list()
    }

    /// Removes all tools.
    pub fn clear_tools(&self) {
        lock(&self.tools).clear();
    }

    // === Resource registry ===

    /// Registers a resource, overwriting any existing entry with the same URI.
    pub fn register_resource(&self, resource: ResourceDefinition) -> &Self {
        lock(&self.resources).register(resource);
        self
    }

    /// Removes a resource. Returns `true` if one was removed.
    pub fn unregister_resource(&self, uri: &str) -> bool {
        lock(&self.resources).unregister(uri)
    }

    /// Returns `true` if a resource with the URI is registered.
    #[must_use]
    pub fn has_resource(&self, uri: &str) -> bool {
        lock(&self.resources).contains(uri)
    }

    /// Looks up a resource by URI.
    #[must_use]
    pub fn get_resource(&self, uri: &str) -> Option<ResourceDefinition> {
        lock(&self.resources).get(uri)
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        lock(&self.resources).len()
    }

    /// Returns all resources in insertion order.
    #[must_use]
    pub fn list_resources(&self) -> Vec<ResourceDefinition> {
        lock(&self.resources).list()
    }

    /// Removes all resources.
    pub fn clear_resources(&self) {
        lock(&self.resources).clear();
    }

    // === Prompt registry ===

    /// Registers a prompt, overwriting any existing prompt with the same name.
    pub fn register_prompt(&self, prompt: PromptDefinition) -> &Self {
        lock(&self.prompts).register(prompt);
        self
    }

    /// Removes a prompt. Returns `true` if one was removed.
    pub fn unregister_prompt(&self, name: &str) -> bool {
        lock(&self.prompts).unregister(name)
    }

    /// Returns `true` if a prompt with the name is registered.
    #[must_use]
    pub fn has_prompt(&self, name: &str) -> bool {
        lock(&self.prompts).contains(name)
    }

    /// Looks up a prompt by name.
    #[must_use]
    pub fn get_prompt(&self, name: &str) -> Option<PromptDefinition> {
        lock(&self.prompts).get(name)
    }

    /// Returns the number of registered prompts.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Returns all prompts in insertion order.
    #[must_use]
    pub fn list_prompts(&self) -> Vec<PromptDefinition> {
        lock(&self.prompts).list()
    }

    /// Removes all prompts.
    pub fn clear_prompts(&self) {
        lock(&self.prompts).clear();
    }

    // === Statistics ===

    /// Returns the lightweight statistics summary.
    #[must_use]
    pub fn stats_summary(&self) -> StatsSummary {
        lock(&self.stats).summary()
    }

    /// Returns the full statistics breakdown.
    #[must_use]
    pub fn stats_report(&self) -> StatsReport {
        lock(&self.stats).report()
    }

    /// Zeroes all statistics counters and timing buffers.
    pub fn reset_stats(&self) {
        lock(&self.stats).reset();
    }

    pub(crate) fn with_stats<R>(&self, f: impl FnOnce(&mut ServerStats) -> R) -> R {
        f(&mut lock(&self.stats))
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("name", &self.name)
            .field("tools", &self.tool_count())
            .field("resources", &self.resource_count())
            .field("prompts", &self.prompt_count())
            .finish_non_exhaustive()
    }
}
