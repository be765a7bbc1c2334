//! Convoy Transport Layer
//!
//! Connections to backend hosts, wrapped in one of two envelopes:
//!
//! - **[`Envelope::Framed`]**: every message is prefixed with its length as
//!   a 4-byte big-endian integer, so record boundaries survive stream
//!   fragmentation.
//! - **[`Envelope::Buffered`]**: messages travel as newline-delimited
//!   records over a buffered stream with a configurable buffer size.
//!
//! Message payloads are produced by [`JsonCodec`]; the pool itself treats
//! them as opaque bytes.

pub mod codec;
pub mod conn;

pub use codec::JsonCodec;
pub use conn::{Connection, Envelope, DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT};
