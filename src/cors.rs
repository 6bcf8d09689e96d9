use crate::config::{CorsConfig, CorsPolicy};

/// Whether this request passes the origin check (spec.md §6 "CORS"). No
/// `Origin` header means same-origin, always allowed.
pub fn is_allowed(config: &CorsConfig, origin: Option<&str>) -> bool {
    match origin {
        Some(origin) => config.is_origin_allowed(origin),
        None => true,
    }
}

/// Builds the `Access-Control-*` headers for a simple (non-preflight)
/// cross-origin response, once the origin has already been allowed.
pub fn simple_response_headers(origin: &str) -> Vec<(String, String)> {
    vec![("Access-Control-Allow-Origin".to_string(), origin.to_string())]
}

/// Builds the `200` preflight response headers for an `OPTIONS` request
/// carrying `Access-Control-Request-Method`, echoing the requested method
/// and headers.
pub fn preflight_response_headers(
    config: &CorsConfig,
    origin: &str,
    requested_method: &str,
    requested_headers: Option<&str>,
) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Access-Control-Allow-Origin".to_string(), origin.to_string()),
        ("Access-Control-Allow-Methods".to_string(), requested_method.to_string()),
        ("Access-Control-Max-Age".to_string(), config.preflight_max_age.to_string()),
    ];
    if let Some(requested_headers) = requested_headers {
        headers.push(("Access-Control-Allow-Headers".to_string(), requested_headers.to_string()));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_origin_is_same_origin_and_allowed() {
        let config = CorsConfig::default();
        assert!(is_allowed(&config, None));
    }

    #[test]
    fn explicit_allowlist_entry_is_allowed_under_deny_default() {
        let config = CorsConfig {
            allowed_origins: vec!["https://good.example".to_string()],
            default_policy: CorsPolicy::Deny,
            preflight_max_age: 600,
        };
        assert!(is_allowed(&config, Some("https://good.example")));
        assert!(!is_allowed(&config, Some("https://bad.example")));
    }

    #[test]
    fn preflight_headers_echo_requested_method_and_headers() {
        let config = CorsConfig::default();
        let headers = preflight_response_headers(&config, "https://good.example", "POST", Some("X-Custom"));
        assert!(headers.contains(&("Access-Control-Allow-Origin".to_string(), "https://good.example".to_string())));
        assert!(headers.contains(&("Access-Control-Allow-Methods".to_string(), "POST".to_string())));
        assert!(headers.contains(&("Access-Control-Allow-Headers".to_string(), "X-Custom".to_string())));
        assert!(headers.contains(&("Access-Control-Max-Age".to_string(), "600".to_string())));
    }
}
