//! Convoy Client-Side Connection Pool
//!
//! A generic client-side connection pool for request/response RPC
//! backends. The pool manages a bounded set of live connections to a
//! cluster of equivalent hosts, hands them out to concurrent callers,
//! recycles or discards them based on health and age, and retries failed
//! calls with backoff while bounding blast radius when the whole backend
//! is flaky.
//!
//! # Components
//!
//! - [`Pool`] - idle cache, active accounting, blocking acquire / release /
//!   mass invalidation
//! - [`PooledClient`] - a borrowed connection: call dispatch, sticky error
//!   tracking, retry helper, release back to the pool
//! - [`RpcClient`] / [`ClientFactory`] - the seam through which callers
//!   plug in their concrete RPC client; [`JsonClient`] is the stock
//!   implementation
//! - [`PoolRegistry`] - explicit named map from pool identifier to pool,
//!   populated once from configuration
//! - [`PoolConfig`] / [`RegistryConfig`] - serde-backed settings, loadable
//!   from YAML
//!
//! # Example
//!
//! ```no_run
//! use convoy_client::{json_client_factory, Pool, PoolConfig};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> convoy_common::Result<()> {
//! let config = PoolConfig::new(vec!["10.0.0.6:8087".into(), "10.0.0.7:8087".into()]);
//! let pool = Pool::new("user-service", config, json_client_factory());
//!
//! let mut client = pool.get().await?;
//! let profile = client.call("get_profile", json!({"uid": 7})).await?;
//! client.release().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod connect;
pub mod pool;
pub mod registry;

pub use client::{json_client_factory, ClientFactory, JsonClient, RpcClient};
pub use config::{PoolConfig, RegistryConfig};
pub use pool::{Pool, PooledClient, PoolStats};
pub use registry::PoolRegistry;
