//! Layered security pipeline applied by a transport before dispatch.
//!
//! Checks run in a fixed order, short-circuiting on the first failure:
//!
//! 1. Body-size limit
//! 2. CORS origin allow-list
//! 3. Basic authentication
//! 4. Custom API-key provider callback
//!
//! Each check is independently optional; absent configuration is a
//! pass-through with zero overhead. Denial messages are client-safe and
//! never leak configured credentials or internal paths.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

use crate::mcp::events::RequestContext;

/// Fixed security response headers applied to every transport response.
///
/// Header names are lowercase so they can be used as static HTTP header
/// names directly.
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    ),
];

/// Strict-transport-security header, emitted only when enabled on the
/// instance security policy.
pub const HSTS_HEADER: (&str, &str) = (
    "strict-transport-security",
    "max-age=31536000; includeSubDomains",
);

/// Challenge header sent with basic-auth failures.
pub const BASIC_CHALLENGE: (&str, &str) = ("www-authenticate", "Basic realm=\"mcp\"");

/// Configured basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuthCredentials {
    /// Expected username.
    pub username: String,
    /// Expected password.
    pub password: String,
}

/// Custom API-key verification callback.
///
/// Receives the presented key and the request context; may mutate
/// request-scoped attributes (e.g. tag the caller's tenant). Returning
/// `Ok(false)` or `Err` rejects the request.
pub type ApiKeyProvider =
    Arc<dyn Fn(&str, &mut RequestContext) -> Result<bool, String> + Send + Sync>;

/// Security configuration for one server instance.
#[derive(Clone, Default)]
pub struct SecurityPolicy {
    /// Maximum request body size in bytes; 0 disables the check.
    pub max_body_bytes: usize,
    /// CORS origin allow-list: exact origins, `*`, or `*.suffix` patterns.
    /// Empty disables the check.
    pub allowed_origins: Vec<String>,
    /// Basic-auth credentials; `None` disables the check.
    pub basic_auth: Option<BasicAuthCredentials>,
    /// API-key verification callback; `None` disables the check.
    pub api_key_provider: Option<ApiKeyProvider>,
    /// Whether to emit the strict-transport-security header.
    pub strict_transport_security: bool,
}

impl std::fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("max_body_bytes", &self.max_body_bytes)
            .field("allowed_origins", &self.allowed_origins)
            .field("basic_auth_configured", &self.basic_auth.is_some())
            .field("api_key_configured", &self.api_key_provider.is_some())
            .field(
                "strict_transport_security",
                &self.strict_transport_security,
            )
            .finish()
    }
}

/// Transport-agnostic view of one inbound request, as far as the security
/// pipeline needs to see it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityRequest<'a> {
    /// Payload length in bytes.
    pub body_len: usize,
    /// `Origin` header, if presented.
    pub origin: Option<&'a str>,
    /// `Authorization` header, if presented (Basic or Bearer).
    pub authorization: Option<&'a str>,
    /// Dedicated API-key header, if presented.
    pub api_key: Option<&'a str>,
}

/// A security-pipeline denial, produced before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDenial {
    /// The payload exceeded the configured body-size limit.
    BodyTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },
    /// A cross-origin request did not match the allow-list.
    OriginForbidden,
    /// Credentials were missing or wrong.
    Unauthorized {
        /// Whether a basic-auth challenge header should be sent.
        basic_challenge: bool,
    },
}

impl SecurityDenial {
    /// Client-safe denial message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::BodyTooLarge { limit } => {
                format!("Request body exceeds the configured limit of {limit} bytes")
            }
            Self::OriginForbidden => "Origin not allowed".to_string(),
            Self::Unauthorized { .. } => "Unauthorized".to_string(),
        }
    }

    /// The HTTP status equivalent for this denial.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::BodyTooLarge { .. } => 413,
            Self::OriginForbidden => 403,
            Self::Unauthorized { .. } => 401,
        }
    }
}

/// Runs the fixed-order security pipeline.
///
/// # Errors
///
/// Returns the first failing check as a [`SecurityDenial`]; later checks
/// do not run.
pub fn run_pipeline(
    policy: &SecurityPolicy,
    request: &SecurityRequest<'_>,
    ctx: &mut RequestContext,
) -> Result<(), SecurityDenial> {
    check_body_size(policy, request.body_len)?;
    check_origin(policy, request.origin)?;
    check_basic_auth(policy, request.authorization)?;
    check_api_key(policy, request, ctx)?;
    Ok(())
}

fn check_body_size(policy: &SecurityPolicy, body_len: usize) -> Result<(), SecurityDenial> {
    if policy.max_body_bytes > 0 && body_len > policy.max_body_bytes {
        return Err(SecurityDenial::BodyTooLarge {
            limit: policy.max_body_bytes,
        });
    }
    Ok(())
}

fn check_origin(policy: &SecurityPolicy, origin: Option<&str>) -> Result<(), SecurityDenial> {
    // Same-origin and non-browser requests carry no Origin header and pass.
    let Some(origin) = origin else {
        return Ok(());
    };
    if policy.allowed_origins.is_empty() {
        return Ok(());
    }
    if origin_allowed(origin, &policy.allowed_origins) {
        return Ok(());
    }
    Err(SecurityDenial::OriginForbidden)
}

fn check_basic_auth(
    policy: &SecurityPolicy,
    authorization: Option<&str>,
) -> Result<(), SecurityDenial> {
    let Some(expected) = policy.basic_auth.as_ref() else {
        return Ok(());
    };

    let denied = SecurityDenial::Unauthorized {
        basic_challenge: true,
    };

    let presented = authorization
        .and_then(|header| header.strip_prefix("Basic "))
        .and_then(decode_basic_credentials)
        .ok_or(denied.clone())?;

    if presented.username == expected.username && presented.password == expected.password {
        Ok(())
    } else {
        Err(denied)
    }
}

fn check_api_key(
    policy: &SecurityPolicy,
    request: &SecurityRequest<'_>,
    ctx: &mut RequestContext,
) -> Result<(), SecurityDenial> {
    let Some(provider) = policy.api_key_provider.as_ref() else {
        return Ok(());
    };

    let denied = SecurityDenial::Unauthorized {
        basic_challenge: false,
    };

    let key = request
        .api_key
        .or_else(|| {
            request
                .authorization
                .and_then(|header| header.strip_prefix("Bearer "))
        })
        .ok_or(denied.clone())?;

    match provider(key, ctx) {
        Ok(true) => Ok(()),
        Ok(false) => Err(denied),
        Err(reason) => {
            tracing::warn!(reason = %reason, "API key provider rejected request");
            Err(denied)
        }
    }
}

/// Matches an Origin header value against the allow-list.
///
/// Patterns may be exact origin strings, the wildcard `*`, or `*.suffix`
/// subdomain patterns matched against the origin's host.
#[must_use]
pub fn origin_allowed(origin: &str, patterns: &[String]) -> bool {
    let host = origin_host(origin);

    patterns.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            return host == suffix || host.ends_with(&format!(".{suffix}"));
        }
        pattern == origin || pattern == host
    })
}

/// Extracts the host from an origin value such as `https://x.example.com:8443`.
fn origin_host(origin: &str) -> &str {
    let rest = origin
        .split_once("://")
        .map_or(origin, |(_, after)| after);
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest)
}

fn decode_basic_credentials(encoded: &str) -> Option<BasicAuthCredentials> {
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some(BasicAuthCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(username: &str, password: &str) -> String {
        format!(
            "Basic {}",
            BASE64_STANDARD.encode(format!("{username}:{password}"))
        )
    }

    #[test]
    fn empty_policy_passes_everything() {
        let policy = SecurityPolicy::default();
        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            body_len: 1_000_000,
            origin: Some("https://anywhere.test"),
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_ok());
    }

    #[test]
    fn body_size_limit_rejects_oversized() {
        let policy = SecurityPolicy {
            max_body_bytes: 64,
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");

        let request = SecurityRequest {
            body_len: 65,
            ..SecurityRequest::default()
        };
        let denial = run_pipeline(&policy, &request, &mut ctx).unwrap_err();
        assert_eq!(denial, SecurityDenial::BodyTooLarge { limit: 64 });
        assert_eq!(denial.http_status(), 413);

        let request = SecurityRequest {
            body_len: 64,
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_ok());
    }

    #[test]
    fn cors_subdomain_pattern_matches() {
        let patterns = vec!["*.example.com".to_string()];
        assert!(origin_allowed("https://x.example.com", &patterns));
        assert!(origin_allowed("https://deep.x.example.com", &patterns));
        assert!(origin_allowed("https://example.com", &patterns));
        assert!(!origin_allowed("https://example.org", &patterns));
        assert!(!origin_allowed("https://notexample.com", &patterns));
    }

    #[test]
    fn cors_exact_and_wildcard_patterns() {
        assert!(origin_allowed(
            "https://app.test",
            &["https://app.test".to_string()]
        ));
        assert!(origin_allowed("https://anything.test", &["*".to_string()]));
        assert!(!origin_allowed(
            "https://x.example.com",
            &["https://other.com".to_string()]
        ));
    }

    #[test]
    fn cors_denies_unlisted_origin() {
        let policy = SecurityPolicy {
            allowed_origins: vec!["https://other.com".to_string()],
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            origin: Some("https://x.example.com"),
            ..SecurityRequest::default()
        };
        let denial = run_pipeline(&policy, &request, &mut ctx).unwrap_err();
        assert_eq!(denial, SecurityDenial::OriginForbidden);
        assert_eq!(denial.http_status(), 403);
    }

    #[test]
    fn cors_passes_without_origin_header() {
        let policy = SecurityPolicy {
            allowed_origins: vec!["https://other.com".to_string()],
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        assert!(run_pipeline(&policy, &SecurityRequest::default(), &mut ctx).is_ok());
    }

    #[test]
    fn basic_auth_accepts_correct_credentials() {
        let policy = SecurityPolicy {
            basic_auth: Some(BasicAuthCredentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let header = basic_header("admin", "secret");
        let request = SecurityRequest {
            authorization: Some(&header),
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_ok());
    }

    #[test]
    fn basic_auth_rejects_wrong_password() {
        let policy = SecurityPolicy {
            basic_auth: Some(BasicAuthCredentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let header = basic_header("admin", "wrong");
        let request = SecurityRequest {
            authorization: Some(&header),
            ..SecurityRequest::default()
        };
        let denial = run_pipeline(&policy, &request, &mut ctx).unwrap_err();
        assert_eq!(
            denial,
            SecurityDenial::Unauthorized {
                basic_challenge: true
            }
        );
        assert_eq!(denial.http_status(), 401);
    }

    #[test]
    fn basic_auth_rejects_missing_header() {
        let policy = SecurityPolicy {
            basic_auth: Some(BasicAuthCredentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let denial = run_pipeline(&policy, &SecurityRequest::default(), &mut ctx).unwrap_err();
        assert_eq!(
            denial,
            SecurityDenial::Unauthorized {
                basic_challenge: true
            }
        );
    }

    #[test]
    fn api_key_provider_checks_dedicated_header() {
        let policy = SecurityPolicy {
            api_key_provider: Some(Arc::new(|key, ctx| {
                if key == "k-123" {
                    ctx.set_attribute("tenant", serde_json::Value::String("acme".to_string()));
                    Ok(true)
                } else {
                    Ok(false)
                }
            })),
            ..SecurityPolicy::default()
        };

        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            api_key: Some("k-123"),
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_ok());
        assert_eq!(
            ctx.attribute("tenant"),
            Some(&serde_json::Value::String("acme".to_string()))
        );

        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            api_key: Some("bogus"),
            ..SecurityRequest::default()
        };
        let denial = run_pipeline(&policy, &request, &mut ctx).unwrap_err();
        assert_eq!(
            denial,
            SecurityDenial::Unauthorized {
                basic_challenge: false
            }
        );
    }

    #[test]
    fn api_key_provider_accepts_bearer_token() {
        let policy = SecurityPolicy {
            api_key_provider: Some(Arc::new(|key, _ctx| Ok(key == "k-456"))),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            authorization: Some("Bearer k-456"),
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_ok());
    }

    #[test]
    fn api_key_provider_error_is_denial() {
        let policy = SecurityPolicy {
            api_key_provider: Some(Arc::new(|_key, _ctx| Err("backend down".to_string()))),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            api_key: Some("any"),
            ..SecurityRequest::default()
        };
        assert!(run_pipeline(&policy, &request, &mut ctx).is_err());
    }

    #[test]
    fn pipeline_order_body_size_first() {
        // Oversized body with bad credentials: the body-size denial wins.
        let policy = SecurityPolicy {
            max_body_bytes: 8,
            basic_auth: Some(BasicAuthCredentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..SecurityPolicy::default()
        };
        let mut ctx = RequestContext::new("default");
        let request = SecurityRequest {
            body_len: 100,
            ..SecurityRequest::default()
        };
        let denial = run_pipeline(&policy, &request, &mut ctx).unwrap_err();
        assert!(matches!(denial, SecurityDenial::BodyTooLarge { .. }));
    }

    #[test]
    fn denial_messages_are_client_safe() {
        let denial = SecurityDenial::Unauthorized {
            basic_challenge: true,
        };
        assert_eq!(denial.message(), "Unauthorized");
        assert!(!denial.message().contains("secret"));
    }

    #[test]
    fn decode_rejects_malformed_base64() {
        assert!(decode_basic_credentials("!!not-base64!!").is_none());
        assert!(decode_basic_credentials(&BASE64_STANDARD.encode("no-colon")).is_none());
    }
}
