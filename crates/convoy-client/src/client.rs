use async_trait::async_trait;
use convoy_common::{Connection, ConvoyError, JsonCodec, Request, Result, RpcArgs};
use serde_json::Value;
use std::sync::Arc;

/// A live RPC client bound to one connection.
///
/// The pool is agnostic to the concrete method surface: methods are
/// dispatched by name with JSON arguments, so one pool type serves any
/// service. Implementations decide how a named method maps onto the wire;
/// [`JsonClient`] is the stock implementation for backends speaking the
/// convoy codec. Hand-written clients for generated service stubs plug in
/// the same way.
#[async_trait]
pub trait RpcClient: Send {
    /// Invoke `method` with `args` and wait for the reply.
    ///
    /// A void remote method yields [`Value::Null`]. Errors for which
    /// [`ConvoyError::is_application`] returns true mean the remote
    /// procedure ran and rejected the request; any other error marks the
    /// connection that carried the call as unusable.
    async fn invoke(&mut self, method: &str, args: RpcArgs) -> Result<Value>;
}

impl std::fmt::Debug for dyn RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}

/// Constructor capability supplied by the caller at pool creation: given an
/// opened, enveloped connection, produce the client handle. Invoked once
/// per dialed connection.
pub type ClientFactory = Arc<dyn Fn(Connection) -> Box<dyn RpcClient> + Send + Sync>;

/// Stock [`RpcClient`] speaking the convoy request/response codec.
pub struct JsonClient {
    conn: Connection,
}

impl JsonClient {
    pub fn new(conn: Connection) -> Self {
        JsonClient { conn }
    }
}

#[async_trait]
impl RpcClient for JsonClient {
    async fn invoke(&mut self, method: &str, args: RpcArgs) -> Result<Value> {
        let request = Request::new(method, args);
        let encoded = JsonCodec::encode_request(&request)?;
        let raw = self.conn.round_trip(&encoded).await?;
        let response = JsonCodec::decode_response(&raw)?;

        if response.id != request.id {
            return Err(ConvoyError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        if response.ok {
            // Void methods reply without a payload.
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            Err(ConvoyError::Application(
                response
                    .error
                    .unwrap_or_else(|| "unspecified remote failure".to_string()),
            ))
        }
    }
}

/// Factory producing [`JsonClient`] handles.
pub fn json_client_factory() -> ClientFactory {
    Arc::new(|conn| Box::new(JsonClient::new(conn)))
}
