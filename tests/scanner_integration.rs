//! Annotation scanner integration: descriptors discovered on disk end up
//! callable through the normal dispatch path.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use toolbridge_mcp::mcp::registry::PromptMessage;
use toolbridge_mcp::mcp::scanner::{AnnotationScanner, HandlerBindings};
use toolbridge_mcp::mcp::server::ServerInstance;

fn write_file(dir: &Path, name: &str, contents: &str) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

fn bindings() -> HandlerBindings {
    HandlerBindings::new()
        .bind_tool("word_count", |args| {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("");
            Ok(Value::from(text.split_whitespace().count()))
        })
        .bind_resource("changelog", || Ok("## 0.1.0\n- initial".to_string()))
        .bind_prompt("summarise", |args| {
            let topic = args.get("topic").and_then(Value::as_str).unwrap_or("it");
            Ok(vec![PromptMessage::user(format!("Summarise {topic}."))])
        })
}

const DESCRIPTORS: &str = r#"{
    "mcp": {
        "tools": [
            {
                "handler": "word_count",
                "doc": "Count the words in the text argument",
                "args": [
                    {"name": "text", "required": true, "description": "Input text"}
                ]
            }
        ],
        "resources": [
            {
                "uri": "doc://changelog",
                "handler": "changelog",
                "mimeType": "text/markdown"
            }
        ],
        "prompts": [
            {
                "handler": "summarise",
                "arguments": [{"name": "topic", "required": true}]
            }
        ]
    }
}"#;

#[test]
fn test_scanned_definitions_are_dispatchable() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "capabilities.json", DESCRIPTORS);

    let instance = ServerInstance::new("scan-it");
    let report = AnnotationScanner::new(bindings())
        .scan(&instance, dir.path())
        .unwrap();
    assert_eq!(report.tools_registered, 1);
    assert_eq!(report.resources_registered, 1);
    assert_eq!(report.prompts_registered, 1);

    // Tool call through the protocol core
    let response = serde_json::to_value(instance.handle_request(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"word_count","arguments":{"text":"one two three"}}}"#,
    ))
    .unwrap();
    assert_eq!(response.get("result").unwrap(), 3);

    // Resource read
    let response = serde_json::to_value(instance.handle_request(
        r#"{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{"uri":"doc://changelog"}}"#,
    ))
    .unwrap();
    assert_eq!(
        response.pointer("/result/contents/0/mimeType").unwrap(),
        "text/markdown"
    );

    // Prompt generation
    let response = serde_json::to_value(instance.handle_request(
        r#"{"jsonrpc":"2.0","id":3,"method":"prompts/get","params":{"name":"summarise","arguments":{"topic":"the release"}}}"#,
    ))
    .unwrap();
    assert_eq!(
        response.pointer("/result/messages/0/content/text").unwrap(),
        "Summarise the release."
    );
}

#[test]
fn test_rescan_is_idempotent_through_listing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "capabilities.json", DESCRIPTORS);

    let instance = ServerInstance::new("scan-idem");
    let scanner = AnnotationScanner::new(bindings());
    scanner.scan(&instance, dir.path()).unwrap();
    scanner.scan(&instance, dir.path()).unwrap();

    let response = serde_json::to_value(
        instance.handle_request(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#),
    )
    .unwrap();
    let tools = response.pointer("/result/tools").unwrap().as_array().unwrap();
    assert_eq!(tools.len(), 1);
}

#[test]
fn test_scanner_defaults_name_from_handler_binding() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "minimal.json",
        r#"{"mcp": {"tools": [{"handler": "word_count"}]}}"#,
    );

    let instance = ServerInstance::new("scan-defaults");
    AnnotationScanner::new(bindings())
        .scan(&instance, dir.path())
        .unwrap();

    assert!(instance.has_tool("word_count"));
}

#[test]
fn test_manual_registration_coexists_with_scan() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "capabilities.json", DESCRIPTORS);

    let instance = ServerInstance::new("scan-mixed");
    instance.register_tool(toolbridge_mcp::mcp::registry::ToolDefinition::new(
        "manual",
        "Registered by hand",
        vec![],
        Arc::new(|_args| Ok(Value::Bool(true))),
    ));
    AnnotationScanner::new(bindings())
        .scan(&instance, dir.path())
        .unwrap();

    assert!(instance.has_tool("manual"));
    assert!(instance.has_tool("word_count"));
    assert_eq!(instance.tool_count(), 2);
}
