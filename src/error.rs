use std::string::FromUtf8Error;

use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

/// The crate-wide error type.
///
/// Grouped the same way the error taxonomy in spec.md §7 groups errors:
/// protocol errors close the connection they occurred on and never surface
/// past it, while `NotConnected`, `Closed`, `BacklogFull`, `Timeout`, `Io`
/// and `Cancelled` are the ones a caller of the transport façade actually
/// observes.
#[derive(Error, Debug)]
pub enum Error {
    // --- Façade-visible errors ---
    #[error("peer has no bound carrier")]
    NotConnected,

    #[error("peer is closed")]
    Closed,

    #[error("peer backlog is full")]
    BacklogFull,

    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    // --- Handshake / negotiation errors ---
    #[error("invalid HTTP handshake request")]
    InvalidHttpHandshake,

    #[error("Connection: Upgrade header missing in the request")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing in the request")]
    NoUpgradeHeaderPresent,

    #[error("Host header missing in the request")]
    NoHostHeaderPresent,

    #[error("Sec-WebSocket-Key header missing in the request")]
    NoSecWebsocketKey,

    #[error("unsupported Sec-WebSocket-Version, expected 13")]
    UnsupportedWebsocketVersion,

    #[error("server didn't upgrade the connection")]
    NoUpgrade,

    #[error("server didn't send a valid Sec-WebSocket-Accept value")]
    InvalidAcceptKey,

    #[error("no X-Org-EventDance-WebTransport-Mechanism header present")]
    NoMechanismRequested,

    #[error("no requested mechanism could be negotiated")]
    NoMechanismNegotiable,

    #[error("peer was rejected during validation")]
    PeerRejected,

    #[error("origin is not allowed")]
    OriginNotAllowed,

    // --- WebSocket protocol errors ---
    #[error("reserved bits must be zero")]
    RsvNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame payload cannot exceed 125 bytes")]
    ControlFramePayloadSize,

    #[error("server requires masked frames from clients")]
    MaskRequired,

    #[error("client must not receive masked frames from a server")]
    UnexpectedMask,

    #[error("frame payload exceeds the single-fragment limit")]
    MaxFrameSize,

    #[error("reassembled message exceeds the maximum message size")]
    MaxMessageSize,

    #[error("invalid frame while a fragmented message is in progress")]
    InvalidFrameFragmentation,

    #[error("continuation frame with no fragmented message in progress")]
    InvalidContinuationFrame,

    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("{source}")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },

    // --- HTTP / URL errors ---
    #[error("{source}")]
    UrlParse {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws:// or wss://")]
    InvalidSchemeUrl,

    #[error("URL has no host")]
    UrlNoHost,

    #[error("{source}")]
    HttpParse {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete HTTP request")]
    IncompleteHttpRequest,

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    // --- Long-polling envelope errors ---
    #[error("malformed long-polling envelope header")]
    InvalidEnvelopeHeader,

    #[error("unknown long-polling action")]
    UnknownLongPollingAction,

    #[error("unknown peer id")]
    UnknownPeer,

    #[error("a peer with this id is already registered")]
    PeerAlreadyExists,
}

pub type Result<T> = std::result::Result<T, Error>;
