//! Host selection and connection construction.
//!
//! Every dial visits the candidate hosts in a fresh uniformly random order
//! and takes the first one that accepts, spreading load across an uneven
//! host list and avoiding herd behavior toward the first entry.

use rand::seq::SliceRandom;
use tracing::debug;

use convoy_common::{Connection, ConvoyError, Result};

use crate::client::{ClientFactory, RpcClient};
use crate::config::PoolConfig;

/// Opens a connection to the first reachable host and hands it to the
/// client factory.
pub(crate) async fn open_client(
    name: &str,
    config: &PoolConfig,
    factory: &ClientFactory,
) -> Result<Box<dyn RpcClient>> {
    let conn = dial(name, config).await?;
    Ok(factory(conn))
}

async fn dial(name: &str, config: &PoolConfig) -> Result<Connection> {
    if config.hosts.is_empty() {
        return Err(ConvoyError::Config(format!(
            "pool `{name}` has no hosts configured"
        )));
    }

    let mut order: Vec<&str> = config.hosts.iter().map(String::as_str).collect();
    order.shuffle(&mut rand::thread_rng());

    let mut last_err = None;
    for host in order {
        match Connection::open(host, config.envelope(), config.connect_timeout()).await {
            Ok(conn) => {
                debug!(pool = %name, host = %host, "opened backend connection");
                return Ok(conn);
            }
            Err(e) => {
                debug!(pool = %name, host = %host, error = %e, "host refused connection");
                last_err = Some(e);
            }
        }
    }

    Err(ConvoyError::Connection(format!(
        "pool `{name}`: no backend host reachable: {}",
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no hosts attempted".to_string())
    )))
}
