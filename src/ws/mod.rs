pub mod client;
pub mod codec;
pub mod handshake;
pub mod transport;

pub use client::connect;
pub use codec::{FrameReader, FrameWriter, Role};
pub use transport::WebSocketTransport;
