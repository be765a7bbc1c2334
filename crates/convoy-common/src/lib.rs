//! Convoy Common Types and Transport
//!
//! This crate provides the protocol definitions and connection envelopes
//! shared by the convoy client-side RPC connection pool.
//!
//! # Overview
//!
//! Convoy manages a bounded set of live connections to a cluster of
//! equivalent backend hosts. This crate contains the pieces that are
//! independent of pooling policy:
//!
//! - **Protocol Layer**: request/response types and the error taxonomy
//! - **Transport Layer**: TCP connections wrapped in a framed or buffered
//!   envelope, plus the JSON codec used on the wire
//!
//! # Wire Format
//!
//! - **Framed envelope**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Buffered envelope**: newline-delimited JSON records over a buffered
//!   stream
//!
//! # Components
//!
//! - [`protocol`] - [`Request`], [`Response`] and argument types
//! - [`transport`] - [`Connection`], [`Envelope`] and [`JsonCodec`]
//! - [`error`] - [`ConvoyError`] and the crate-wide [`Result`] alias

pub mod error;
pub mod protocol;
pub mod transport;

pub use error::{ConvoyError, Result};
pub use protocol::{CallId, Request, Response, RpcArgs};
pub use transport::{Connection, Envelope, JsonCodec, DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT};
