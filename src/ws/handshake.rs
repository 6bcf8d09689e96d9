use std::collections::HashMap;

use base64::prelude::*;
use rand::random;
use sha1::{Digest, Sha1};

use crate::error::Error;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(sha1(key + GUID))`, the value both sides compute independently
/// during the upgrade handshake (RFC 6455 §1.3).
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// 16 random bytes, base64-encoded, sent as `Sec-WebSocket-Key` by a client.
pub fn generate_key() -> String {
    let bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(bytes)
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers.get(&name.to_ascii_lowercase()).map(String::as_str)
}

/// The result of validating an inbound upgrade request: the computed
/// accept key, ready to be echoed back in the `101` response.
pub struct ServerHandshake {
    pub accept_key: String,
}

/// Server-side validation of an inbound HTTP upgrade request (spec.md
/// §4.D, steps 1-3). Headers are expected pre-lowercased by the caller's
/// HTTP adapter, matching `http::request`'s convention.
pub fn validate_server_request(headers: &HashMap<String, String>) -> Result<ServerHandshake, Error> {
    let version = header(headers, "sec-websocket-version").ok_or(Error::UnsupportedWebsocketVersion)?;
    if version != "13" {
        return Err(Error::UnsupportedWebsocketVersion);
    }

    let upgrade = header(headers, "upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }

    let connection = header(headers, "connection").ok_or(Error::NoConnectionHeaderPresent)?;
    if !connection.to_ascii_lowercase().contains("upgrade") {
        return Err(Error::NoConnectionHeaderPresent);
    }

    if header(headers, "host").is_none() {
        return Err(Error::NoHostHeaderPresent);
    }

    let key = header(headers, "sec-websocket-key").ok_or(Error::NoSecWebsocketKey)?;

    Ok(ServerHandshake { accept_key: accept_key(key) })
}

/// Builds the `101 Switching Protocols` response headers for a validated
/// request. The caller writes these through its `HttpConnection` adapter.
pub fn server_response_headers(accept: &str) -> Vec<(String, String)> {
    vec![
        ("Upgrade".to_string(), "websocket".to_string()),
        ("Connection".to_string(), "Upgrade".to_string()),
        ("Sec-WebSocket-Accept".to_string(), accept.to_string()),
    ]
}

/// Builds the raw upgrade request line + headers for the client dial path.
pub fn client_request_headers(host: &str, key: &str) -> Vec<(String, String)> {
    vec![
        ("Host".to_string(), host.to_string()),
        ("Connection".to_string(), "Upgrade".to_string()),
        ("Upgrade".to_string(), "websocket".to_string()),
        ("Sec-WebSocket-Key".to_string(), key.to_string()),
        ("Sec-WebSocket-Version".to_string(), "13".to_string()),
    ]
}

/// Client-side validation of the server's handshake response (spec.md
/// §4.D "Handshake (client side)").
pub fn validate_client_response(
    status: u16,
    headers: &HashMap<String, String>,
    client_key: &str,
) -> Result<(), Error> {
    if status != 101 {
        return Err(Error::NoUpgrade);
    }
    let upgrade = header(headers, "upgrade").ok_or(Error::NoUpgrade)?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgrade);
    }
    let accept = header(headers, "sec-websocket-accept").ok_or(Error::InvalidAcceptKey)?;
    if accept != accept_key(client_key) {
        return Err(Error::InvalidAcceptKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.to_string())).collect()
    }

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // The canonical example from RFC 6455 §1.3.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn valid_upgrade_request_yields_matching_accept_key() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let headers = headers(&[
            ("Sec-WebSocket-Version", "13"),
            ("Upgrade", "websocket"),
            ("Connection", "keep-alive, Upgrade"),
            ("Host", "example.com"),
            ("Sec-WebSocket-Key", key),
        ]);
        let result = validate_server_request(&headers).unwrap();
        assert_eq!(result.accept_key, accept_key(key));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let headers = headers(&[
            ("Sec-WebSocket-Version", "8"),
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Host", "example.com"),
            ("Sec-WebSocket-Key", "x"),
        ]);
        assert!(matches!(validate_server_request(&headers), Err(Error::UnsupportedWebsocketVersion)));
    }

    #[test]
    fn missing_key_is_rejected() {
        let headers = headers(&[
            ("Sec-WebSocket-Version", "13"),
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Host", "example.com"),
        ]);
        assert!(matches!(validate_server_request(&headers), Err(Error::NoSecWebsocketKey)));
    }

    #[test]
    fn client_response_round_trips_with_generated_key() {
        let key = generate_key();
        let expected = accept_key(&key);
        let headers = headers(&[("Upgrade", "websocket"), ("Sec-WebSocket-Accept", &expected)]);
        assert!(validate_client_response(101, &headers, &key).is_ok());
    }

    #[test]
    fn client_response_with_wrong_accept_is_rejected() {
        let key = generate_key();
        let headers = headers(&[("Upgrade", "websocket"), ("Sec-WebSocket-Accept", "bogus")]);
        assert!(matches!(validate_client_response(101, &headers, &key), Err(Error::InvalidAcceptKey)));
    }
}
