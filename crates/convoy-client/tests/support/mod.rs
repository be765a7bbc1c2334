//! Shared test backend speaking the framed convoy protocol.
//!
//! Handled methods:
//! - `echo` - replies with the request args
//! - `conn_id` - replies with the server-side id of the carrying connection
//! - `reject` - replies with a business failure (application error)
//! - anything else - business failure naming the method
//!
//! With `fail_calls` enabled the server closes a connection as soon as a
//! request arrives on it, without replying, which the client observes as a
//! transport failure. New connections are still accepted, so dials keep
//! succeeding while every call fails.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use convoy_client::PoolConfig;
use convoy_common::{Connection, Envelope, JsonCodec, Response};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

pub struct TestServer {
    addr: String,
    accepted: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    fail_calls: Arc<AtomicBool>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let open = Arc::new(AtomicUsize::new(0));
        let fail_calls = Arc::new(AtomicBool::new(false));

        {
            let accepted = accepted.clone();
            let open = open.clone();
            let fail_calls = fail_calls.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let conn_id = accepted.fetch_add(1, Ordering::SeqCst);
                    open.fetch_add(1, Ordering::SeqCst);
                    let open = open.clone();
                    let fail_calls = fail_calls.clone();
                    tokio::spawn(async move {
                        serve(stream, conn_id, fail_calls).await;
                        open.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }

        TestServer {
            addr,
            accepted,
            open,
            fail_calls,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Total connections ever accepted.
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// When enabled, every request closes its connection without a reply.
    pub fn fail_calls(&self, on: bool) {
        self.fail_calls.store(on, Ordering::SeqCst);
    }

    /// Handle to the fail-calls flag, for flipping it from a spawned task.
    pub fn fail_flag(&self) -> Arc<AtomicBool> {
        self.fail_calls.clone()
    }
}

async fn serve(stream: TcpStream, conn_id: usize, fail_calls: Arc<AtomicBool>) {
    let mut conn = Connection::from_stream(stream, Envelope::Framed);
    loop {
        let Ok(raw) = conn.recv().await else {
            return;
        };
        if fail_calls.load(Ordering::SeqCst) {
            // Hang up mid-call, as a crashed backend would.
            return;
        }
        let request = JsonCodec::decode_request(&raw).unwrap();
        let response = match request.method.as_str() {
            "echo" => Response::success(request.id, request.args),
            "conn_id" => Response::success(request.id, json!(conn_id)),
            "reject" => Response::failure(request.id, "rejected by handler"),
            other => Response::failure(request.id, format!("unknown method `{other}`")),
        };
        let encoded = JsonCodec::encode_response(&response).unwrap();
        if conn.send(&encoded).await.is_err() {
            return;
        }
    }
}

/// Framed pool settings pointing at one backend address.
pub fn framed_config(addr: &str) -> PoolConfig {
    PoolConfig {
        framed: true,
        ..PoolConfig::new(vec![addr.to_string()])
    }
}

/// An address with nothing listening on it.
pub async fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
