use std::time::Duration;

/// Top-level configuration for a [`crate::server::WebTransportServer`].
///
/// A plain config struct rather than the object properties
/// (`base-path`, `standalone`, `enable-websocket`, `origin-policy`) this was
/// distilled from.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// URL prefix under which `/handshake`, `/lp/*` and `/ws` are routed.
    /// Defaults to `/transport`.
    pub base_path: String,

    /// Whether the WebSocket mechanism can be negotiated.
    pub enable_websocket: bool,

    /// Whether the long-polling mechanism can be negotiated.
    pub enable_long_polling: bool,

    /// When `true`, the server owns a private `PeerRegistry` instead of
    /// sharing the process-wide default one.
    pub standalone: bool,

    pub web_socket_config: WebSocketConfig,
    pub long_polling_config: LongPollingConfig,
    pub cors_config: CorsConfig,
    pub peer_registry_config: PeerRegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            base_path: "/transport".to_string(),
            enable_websocket: true,
            enable_long_polling: true,
            standalone: false,
            web_socket_config: WebSocketConfig::default(),
            long_polling_config: LongPollingConfig::default(),
            cors_config: CorsConfig::default(),
            peer_registry_config: PeerRegistryConfig::default(),
        }
    }
}

/// Client-side WebSocket dial configuration: the client role of the
/// handshake and framing described in spec.md §4.D.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum size of a single frame payload. Frames exceeding this close
    /// the connection with code 1009.
    pub max_frame_size: usize,
    /// Maximum size of a reassembled (possibly fragmented) message.
    pub max_message_size: usize,
    /// How long to wait for the peer's CLOSE acknowledgment before forcing
    /// the connection closed.
    pub close_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 256 << 20, // 256 MiB, spec §4.D
            max_message_size: 1 << 30, // 1 GiB, spec §4.D
            close_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LongPollingConfig {
    /// Fragment size used when chunking large drains across writes. This is
    /// purely a buffering concern; it has no wire-visible effect since the
    /// chunked transfer-encoding already delimits writes.
    pub write_chunk_size: usize,
}

impl Default for LongPollingConfig {
    fn default() -> Self {
        LongPollingConfig {
            write_chunk_size: 64 * 1024,
        }
    }
}

/// Policy applied when a peer's backlog is full (spec §7 `backlog-full`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklogPolicy {
    /// Reject the `push` with `Error::BacklogFull`. Default.
    Reject,
    /// Silently drop the oldest queued message to make room.
    DropOldest,
    /// Silently drop the message being pushed.
    DropNew,
}

impl Default for BacklogPolicy {
    fn default() -> Self {
        BacklogPolicy::Reject
    }
}

#[derive(Debug, Clone)]
pub struct PeerRegistryConfig {
    /// How often `sweep` is allowed to actually run (spec §3/§4.B).
    pub cleanup_interval: Duration,
    /// Liveness threshold: a peer not touched within this long, and holding
    /// no parked carrier, is reaped on the next sweep.
    pub peer_timeout: Duration,
    /// Maximum number of backlogged messages per peer.
    pub max_backlog_len: usize,
    pub backlog_policy: BacklogPolicy,
}

impl Default for PeerRegistryConfig {
    fn default() -> Self {
        PeerRegistryConfig {
            cleanup_interval: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(5),
            max_backlog_len: 1024,
            backlog_policy: BacklogPolicy::default(),
        }
    }
}

/// Default cross-origin policy applied when an `Origin` header is present
/// but not in [`CorsConfig::allowed_origins`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsPolicy {
    Allow,
    Deny,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        CorsPolicy::Allow
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub default_policy: CorsPolicy,
    pub preflight_max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: Vec::new(),
            default_policy: CorsPolicy::default(),
            preflight_max_age: 600,
        }
    }
}

impl CorsConfig {
    /// Whether `origin` may access the service: explicitly allowlisted, or
    /// allowed by the default policy.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin) || self.default_policy == CorsPolicy::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_matches_spec_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.base_path, "/transport");
        assert!(config.enable_websocket);
        assert!(config.enable_long_polling);
        assert_eq!(config.peer_registry_config.cleanup_interval, Duration::from_secs(5));
        assert_eq!(config.web_socket_config.max_frame_size, 256 << 20);
        assert_eq!(config.web_socket_config.max_message_size, 1 << 30);
    }

    #[test]
    fn cors_allows_explicit_origin_even_under_deny_default() {
        let config = CorsConfig {
            allowed_origins: vec!["https://example.com".to_string()],
            default_policy: CorsPolicy::Deny,
            preflight_max_age: 600,
        };
        assert!(config.is_origin_allowed("https://example.com"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }
}
