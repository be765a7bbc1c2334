use std::collections::HashMap;
use std::sync::Arc;

use convoy_common::{ConvoyError, Result};

use crate::client::ClientFactory;
use crate::config::{PoolConfig, RegistryConfig};
use crate::pool::Pool;

/// Named map from pool identifier to pool instance.
///
/// Built once at startup and read many times afterwards. The registry is
/// an explicit object passed around by the embedding application rather
/// than an ambient global, so tests can construct isolated registries.
#[derive(Default)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<Pool>>,
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration, pairing every configured pool
    /// with its caller-supplied client factory. Every configured pool must
    /// have a factory; leftover factories are ignored.
    pub fn from_config(
        config: &RegistryConfig,
        mut factories: HashMap<String, ClientFactory>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (name, pool_config) in &config.pools {
            let factory = factories.remove(name).ok_or_else(|| {
                ConvoyError::Config(format!("no client factory registered for pool `{name}`"))
            })?;
            registry.register(name.clone(), pool_config.clone(), factory);
        }
        Ok(registry)
    }

    /// Registers a pool under `name`, replacing any previous registration
    /// with that name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        config: PoolConfig,
        factory: ClientFactory,
    ) -> Arc<Pool> {
        let name = name.into();
        let pool = Pool::new(name.clone(), config, factory);
        self.pools.insert(name, pool.clone());
        pool
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Pool>> {
        self.pools.get(name)
    }

    /// Like [`get`](Self::get), but maps a miss to
    /// [`ConvoyError::UnknownPool`].
    pub fn lookup(&self, name: &str) -> Result<&Arc<Pool>> {
        self.pools
            .get(name)
            .ok_or_else(|| ConvoyError::UnknownPool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::json_client_factory;

    #[test]
    fn register_then_lookup() {
        let mut registry = PoolRegistry::new();
        registry.register(
            "user-service",
            PoolConfig::new(vec!["127.0.0.1:1".into()]),
            json_client_factory(),
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.get("user-service").is_some());
        assert!(registry.lookup("user-service").is_ok());
        assert!(matches!(
            registry.lookup("missing"),
            Err(ConvoyError::UnknownPool(_))
        ));
    }

    #[test]
    fn from_config_requires_a_factory_per_pool() {
        let raw = r#"
pools:
  billing:
    hosts: ["127.0.0.1:1"]
"#;
        let config = RegistryConfig::from_yaml_str(raw).unwrap();

        let err = PoolRegistry::from_config(&config, HashMap::new()).unwrap_err();
        assert!(matches!(err, ConvoyError::Config(_)), "{err:?}");

        let mut factories = HashMap::new();
        factories.insert("billing".to_string(), json_client_factory());
        let registry = PoolRegistry::from_config(&config, factories).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregistration_replaces_the_pool() {
        let mut registry = PoolRegistry::new();
        let first = registry.register(
            "svc",
            PoolConfig::new(vec!["127.0.0.1:1".into()]),
            json_client_factory(),
        );
        let second = registry.register(
            "svc",
            PoolConfig::new(vec!["127.0.0.1:2".into()]),
            json_client_factory(),
        );
        assert_eq!(registry.len(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            registry.get("svc").unwrap().config().hosts,
            vec!["127.0.0.1:2".to_string()]
        );
    }
}
