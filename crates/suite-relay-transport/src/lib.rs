//! Transports feeding the event relay.
//!
//! Provides:
//! - Inbound payload decoding (single messages and batches)
//! - HTTP endpoint (`POST /`)
//! - WebSocket endpoint (`GET /ws`) with per-message acks
//! - `RelayServer` - start/stop lifecycle for both listeners

pub mod http;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use http::{RelayState, create_http_router};
pub use protocol::{ProtocolError, decode_body, decode_message};
pub use server::{RelayServer, ServerError};
pub use websocket::create_ws_router;
