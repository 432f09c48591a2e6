//! Integration tests for JSON-RPC 2.0 protocol handling.
//!
//! These tests verify envelope parsing and serialisation, including
//! error responses and id echoing.

use toolbridge_mcp::mcp::protocol::{parse_request, RequestId, ResponseEnvelope};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let req = parse_request(json).unwrap();
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, Some(RequestId::Number(1)));
}

#[test]
fn test_parse_tools_list_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }"#;

    let req = parse_request(json).unwrap();
    assert_eq!(req.method, "tools/list");
    assert_eq!(req.id, Some(RequestId::Number(2)));
}

#[test]
fn test_parse_request_with_null_id() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": null,
        "method": "ping"
    }"#;

    let req = parse_request(json).unwrap();
    assert_eq!(req.id, None);
}

#[test]
fn test_parse_invalid_json() {
    let json = "not valid json";

    let result = parse_request(json);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().error.code, -32700);
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = parse_request(json);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().error.code, -32600);
}

// =============================================================================
// Envelope Serialisation Tests
// =============================================================================

#[test]
fn test_error_envelope_echoes_string_id() {
    let json = r#"{"jsonrpc": "2.0", "id": "abc", "method": "bogus/method"}"#;
    let req = parse_request(json).unwrap();
    assert_eq!(req.id, Some(RequestId::String("abc".to_string())));
}

#[test]
fn test_envelope_serialises_to_single_line() {
    let req =
        parse_request(r#"{"jsonrpc": "2.0", "id": 5, "method": "ping"}"#).unwrap();
    let envelope = ResponseEnvelope::Success(
        toolbridge_mcp::mcp::protocol::JsonRpcResponse::success(
            req.id,
            serde_json::json!({"nested": {"value": true}}),
        ),
    );

    let line = envelope.to_json_line();
    assert!(!line.contains('\n'));
    assert!(line.contains(r#""id":5"#));
}
