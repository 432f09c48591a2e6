//! Security pipeline behaviour from a transport's point of view.
//!
//! Exercises the fixed check order and the denial semantics: denials
//! short-circuit before the protocol core runs and never increment the
//! "successful" statistics counter.

use std::sync::Arc;

use toolbridge_mcp::mcp::events::RequestContext;
use toolbridge_mcp::mcp::security::{
    run_pipeline, SecurityDenial, SecurityRequest,
};
use toolbridge_mcp::mcp::server::ServerInstance;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

fn basic_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{username}:{password}"))
    )
}

#[test]
fn test_body_over_limit_rejected_before_dispatch() {
    let instance = ServerInstance::new("sec-size");
    instance.with_body_limit(32);
    let policy = instance.security_policy();

    let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{"padding":"xxxxxxxxxxxxxxxxxxxxxxxxxxxx"}}"#;
    let mut ctx = RequestContext::new("sec-size");
    let denial = run_pipeline(
        &policy,
        &SecurityRequest {
            body_len: body.len(),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .unwrap_err();

    assert_eq!(denial, SecurityDenial::BodyTooLarge { limit: 32 });
    // The protocol core never ran, so nothing was recorded
    assert_eq!(instance.stats_summary().total_requests, 0);
}

#[test]
fn test_cors_allow_list_matrix() {
    let instance = ServerInstance::new("sec-cors");
    instance.with_cors_origins(vec!["*.example.com".to_string()]);
    let permissive = instance.security_policy();

    let mut ctx = RequestContext::new("sec-cors");
    assert!(run_pipeline(
        &permissive,
        &SecurityRequest {
            origin: Some("https://x.example.com"),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .is_ok());

    instance.with_cors_origins(vec!["https://other.com".to_string()]);
    let restrictive = instance.security_policy();

    let denial = run_pipeline(
        &restrictive,
        &SecurityRequest {
            origin: Some("https://x.example.com"),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(denial, SecurityDenial::OriginForbidden);
}

#[test]
fn test_basic_auth_matrix() {
    let instance = ServerInstance::new("sec-auth");
    instance.with_basic_auth("admin", "secret");
    let policy = instance.security_policy();
    let mut ctx = RequestContext::new("sec-auth");

    let good = basic_header("admin", "secret");
    assert!(run_pipeline(
        &policy,
        &SecurityRequest {
            authorization: Some(&good),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .is_ok());

    // Correct username, wrong password
    let bad = basic_header("admin", "nope");
    assert!(run_pipeline(
        &policy,
        &SecurityRequest {
            authorization: Some(&bad),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .is_err());

    // No credentials at all
    assert!(run_pipeline(&policy, &SecurityRequest::default(), &mut ctx).is_err());
}

#[test]
fn test_api_key_callback_tags_request_context() {
    let instance = ServerInstance::new("sec-key");
    instance.with_api_key_provider(|key, ctx| {
        if key.starts_with("tenant-") {
            let tenant = key.trim_start_matches("tenant-").to_string();
            ctx.set_attribute("tenant", serde_json::Value::String(tenant));
            Ok(true)
        } else {
            Ok(false)
        }
    });
    let policy = instance.security_policy();

    let mut ctx = RequestContext::new("sec-key");
    assert!(run_pipeline(
        &policy,
        &SecurityRequest {
            api_key: Some("tenant-acme"),
            ..SecurityRequest::default()
        },
        &mut ctx,
    )
    .is_ok());
    assert_eq!(
        ctx.attribute("tenant"),
        Some(&serde_json::Value::String("acme".to_string()))
    );
}

#[test]
fn test_denied_request_never_counts_as_successful() {
    let instance = ServerInstance::new("sec-stats");
    instance.with_basic_auth("admin", "secret");

    // Simulate what a transport does on denial: record the failure, skip
    // dispatch entirely.
    let policy = instance.security_policy();
    let mut ctx = RequestContext::new("sec-stats");
    let denial = run_pipeline(&policy, &SecurityRequest::default(), &mut ctx).unwrap_err();
    assert!(matches!(denial, SecurityDenial::Unauthorized { .. }));

    let summary = instance.stats_summary();
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.total_requests, 0);
}

#[test]
fn test_before_hook_veto_layered_on_builtin_pipeline() {
    use toolbridge_mcp::mcp::events::EventHook;

    struct DenyWrites;
    impl EventHook for DenyWrites {
        fn before_request(&self, ctx: &mut RequestContext) {
            if ctx.method() == "tools/call" {
                ctx.reject("tool calls are disabled for this tenant");
            }
        }
    }

    let instance = ServerInstance::new("sec-hook");
    instance.register_tool(toolbridge_mcp::mcp::registry::ToolDefinition::new(
        "echo",
        "Echoes",
        vec![],
        Arc::new(|args| Ok(args.get("text").cloned().unwrap_or(serde_json::Value::Null))),
    ));
    instance.add_event_hook(Arc::new(DenyWrites));

    // Reads still work
    let ping = serde_json::to_value(
        instance.handle_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
    )
    .unwrap();
    assert!(ping.get("result").is_some());

    // Writes are vetoed with a transport-level error
    let call = serde_json::to_value(instance.handle_request(
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo"}}"#,
    ))
    .unwrap();
    assert_eq!(call.pointer("/error/code").unwrap().as_i64().unwrap(), -32000);
}
