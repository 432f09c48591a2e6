//! Declarative-metadata scanner.
//!
//! Discovers tool/resource/prompt registrations from JSON descriptor files
//! instead of imperative `register_*` calls. A descriptor file is
//! recognised by its top-level `"mcp"` marker key; files without the
//! marker are skipped. Each descriptor names a handler binding supplied by
//! the host application; the scanner builds the same definition the manual
//! registration path uses, so there is one canonical registration path.
//!
//! Scanning is idempotent: re-scanning re-registers (overwrites) rather
//! than duplicating.
//!
//! # Descriptor format
//!
//! ```json
//! {
//!   "mcp": {
//!     "tools": [
//!       {
//!         "handler": "echo",
//!         "description": "Echo the text argument back",
//!         "args": [
//!           {"name": "text", "type": "string", "required": true,
//!            "description": "Text to echo"}
//!         ]
//!       }
//!     ],
//!     "resources": [
//!       {"uri": "doc://readme", "handler": "readme",
//!        "mimeType": "text/markdown"}
//!     ],
//!     "prompts": [
//!       {"handler": "greet", "doc": "Greeting prompt",
//!        "arguments": [{"name": "name", "required": true}]}
//!     ]
//!   }
//! }
//! ```
//!
//! `name` and `description` default from the handler binding name and the
//! descriptor's `doc` text when omitted.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ScanError;
use crate::mcp::registry::{
    PromptArg, PromptDefinition, PromptHandler, PromptMessage, ResourceDefinition,
    ResourceHandler, ToolArg, ToolDefinition, ToolHandler,
};
use crate::mcp::server::ServerInstance;

/// Host-supplied handler implementations, keyed by binding name.
#[derive(Default, Clone)]
pub struct HandlerBindings {
    tools: HashMap<String, ToolHandler>,
    resources: HashMap<String, ResourceHandler>,
    prompts: HashMap<String, PromptHandler>,
}

impl HandlerBindings {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a tool handler.
    #[must_use]
    pub fn bind_tool<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&serde_json::Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.tools.insert(name.into(), std::sync::Arc::new(handler));
        self
    }

    /// Binds a resource handler.
    #[must_use]
    pub fn bind_resource<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Result<String, String> + Send + Sync + 'static,
    {
        self.resources
            .insert(name.into(), std::sync::Arc::new(handler));
        self
    }

    /// Binds a prompt handler.
    #[must_use]
    pub fn bind_prompt<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&serde_json::Map<String, Value>) -> Result<Vec<PromptMessage>, String>
            + Send
            + Sync
            + 'static,
    {
        self.prompts
            .insert(name.into(), std::sync::Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for HandlerBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBindings")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files inspected (with or without the marker).
    pub files_scanned: usize,
    /// Tools registered.
    pub tools_registered: usize,
    /// Resources registered.
    pub resources_registered: usize,
    /// Prompts registered.
    pub prompts_registered: usize,
    /// Descriptors skipped because their handler binding was missing.
    pub skipped_unbound: usize,
}

impl ScanReport {
    fn absorb(&mut self, other: Self) {
        self.files_scanned += other.files_scanned;
        self.tools_registered += other.tools_registered;
        self.resources_registered += other.resources_registered;
        self.prompts_registered += other.prompts_registered;
        self.skipped_unbound += other.skipped_unbound;
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorSet {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(default)]
    resources: Vec<ResourceDescriptor>,
    #[serde(default)]
    prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolDescriptor {
    handler: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    doc: Option<String>,
    #[serde(default)]
    args: Vec<ArgDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgDescriptor {
    name: String,
    #[serde(rename = "type", default = "default_arg_type")]
    arg_type: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: String,
}

fn default_arg_type() -> String {
    "string".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceDescriptor {
    uri: String,
    handler: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    doc: Option<String>,
    #[serde(rename = "mimeType", default = "default_mime_type")]
    mime_type: String,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptDescriptor {
    handler: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    doc: Option<String>,
    #[serde(default)]
    arguments: Vec<PromptArgDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptArgDescriptor {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required: bool,
}

/// Scans descriptor files and registers their definitions.
#[derive(Debug)]
pub struct AnnotationScanner {
    bindings: HandlerBindings,
}

impl AnnotationScanner {
    /// Creates a scanner with the given handler bindings.
    #[must_use]
    pub const fn new(bindings: HandlerBindings) -> Self {
        Self { bindings }
    }

    /// Scans a descriptor file, or every `*.json` file under a directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the path cannot be read or a marker file
    /// contains malformed descriptors. Files without the `"mcp"` marker
    /// are skipped silently.
    pub fn scan(&self, instance: &ServerInstance, path: &Path) -> Result<ScanReport, ScanError> {
        if path.is_dir() {
            self.scan_directory(instance, path)
        } else {
            self.scan_file(instance, path)
        }
    }

    fn scan_directory(
        &self,
        instance: &ServerInstance,
        dir: &Path,
    ) -> Result<ScanReport, ScanError> {
        let pattern = dir.join("**").join("*.json");
        let pattern_text = pattern.to_string_lossy().to_string();

        let entries = glob::glob(&pattern_text).map_err(|e| ScanError::PatternError {
            pattern: pattern_text.clone(),
            source: e,
        })?;

        let mut report = ScanReport::default();
        for entry in entries {
            let file = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                ScanError::ReadError {
                    path,
                    source: e.into_error(),
                }
            })?;
            report.absorb(self.scan_file(instance, &file)?);
        }
        Ok(report)
    }

    fn scan_file(&self, instance: &ServerInstance, path: &Path) -> Result<ScanReport, ScanError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ScanError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let document: Value =
            serde_json::from_str(&contents).map_err(|e| ScanError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut report = ScanReport {
            files_scanned: 1,
            ..ScanReport::default()
        };

        // Files without the marker are not descriptor files.
        let Some(marker) = document.get("mcp") else {
            return Ok(report);
        };

        let set: DescriptorSet =
            serde_json::from_value(marker.clone()).map_err(|e| ScanError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        self.register_set(instance, &set, &mut report);
        tracing::debug!(
            path = %path.display(),
            tools = report.tools_registered,
            resources = report.resources_registered,
            prompts = report.prompts_registered,
            "scanned descriptor file"
        );
        Ok(report)
    }

    fn register_set(&self, instance: &ServerInstance, set: &DescriptorSet, report: &mut ScanReport) {
        for descriptor in &set.tools {
            let Some(handler) = self.bindings.tools.get(&descriptor.handler) else {
                tracing::warn!(handler = %descriptor.handler, "no tool binding for descriptor");
                report.skipped_unbound += 1;
                continue;
            };

            let args = descriptor
                .args
                .iter()
                .map(|arg| ToolArg {
                    name: arg.name.clone(),
                    arg_type: arg.arg_type.clone(),
                    required: arg.required,
                    description: arg.description.clone(),
                })
                .collect();

            instance.register_tool(ToolDefinition::new(
                named(descriptor.name.as_deref(), &descriptor.handler),
                documented(descriptor.description.as_deref(), descriptor.doc.as_deref()),
                args,
                handler.clone(),
            ));
            report.tools_registered += 1;
        }

        for descriptor in &set.resources {
            let Some(handler) = self.bindings.resources.get(&descriptor.handler) else {
                tracing::warn!(handler = %descriptor.handler, "no resource binding for descriptor");
                report.skipped_unbound += 1;
                continue;
            };

            instance.register_resource(ResourceDefinition::new(
                descriptor.uri.clone(),
                named(descriptor.name.as_deref(), &descriptor.handler),
                documented(descriptor.description.as_deref(), descriptor.doc.as_deref()),
                descriptor.mime_type.clone(),
                handler.clone(),
            ));
            report.resources_registered += 1;
        }

        for descriptor in &set.prompts {
            let Some(handler) = self.bindings.prompts.get(&descriptor.handler) else {
                tracing::warn!(handler = %descriptor.handler, "no prompt binding for descriptor");
                report.skipped_unbound += 1;
                continue;
            };

            let args = descriptor
                .arguments
                .iter()
                .map(|arg| PromptArg::new(&arg.name, &arg.description, arg.required))
                .collect();

            instance.register_prompt(PromptDefinition::new(
                named(descriptor.name.as_deref(), &descriptor.handler),
                documented(descriptor.description.as_deref(), descriptor.doc.as_deref()),
                args,
                handler.clone(),
            ));
            report.prompts_registered += 1;
        }
    }
}

fn named(explicit: Option<&str>, handler: &str) -> String {
    explicit.unwrap_or(handler).to_string()
}

fn documented(description: Option<&str>, doc: Option<&str>) -> String {
    description.or(doc).unwrap_or_default().to_string()
}
