//! A bidirectional web transport server for browser-like clients, built on
//! the Tokio runtime.
//!
//! A single handshake endpoint negotiates one of two carriers for a peer —
//! a full-duplex [WebSocket Protocol RFC](https://datatracker.ietf.org/doc/html/rfc6455)
//! connection, or a long-polling pair of HTTP requests — and from then on
//! the application only sees [`Message`]s and [`event::Event`]s through one
//! [`event::EventStream`], never which carrier delivered them.
//!
//! [`server::WebTransportServer`] is the entry point: it owns the peer
//! registry, runs the handshake, and implements [`facade::TransportFacade`]
//! so application code can `send`/`close_peer` without caring which
//! sub-transport is currently bound.

pub mod config;
pub mod cors;
pub mod error;
pub mod event;
pub mod facade;
pub mod frame;
pub mod http;
pub mod lp;
pub mod message;
pub mod peer;
pub mod registry;
pub mod server;
pub mod validate;
pub mod ws;

pub use config::ServerConfig;
pub use error::Error;
pub use event::{Event, EventStream};
pub use facade::TransportFacade;
pub use message::Message;
pub use peer::PeerId;
pub use server::WebTransportServer;
