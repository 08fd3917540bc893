//! # Host Registry
//!
//! Logical label -> adapter mapping, populated once at startup and
//! read-only afterwards. Facades hold an `Arc` to it instead of reaching
//! for global state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::RedisAdapter;
use crate::config::CacheHostsConfig;
use crate::connection::SharedConnection;
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: HashMap<String, Arc<RedisAdapter>>,
}

/// Registry shared by every facade in the process
pub type SharedRegistry = Arc<HostRegistry>;

impl HostRegistry {
    /// Build one adapter per configured section, keyed by its label.
    ///
    /// Sections sharing a label overwrite each other; the last one wins.
    /// When `conn` is given every adapter reuses it instead of dialing.
    pub fn register(config: &CacheHostsConfig, conn: Option<SharedConnection>) -> Self {
        let mut registry = Self::default();
        for (section, host) in config.iter() {
            let adapter = RedisAdapter::from_config(host, conn.clone());
            tracing::info!(
                section,
                label = %host.label,
                host = %host.host,
                port = host.port,
                "Registered cache host"
            );
            if registry.insert(host.label.clone(), adapter).is_some() {
                tracing::warn!(section, label = %host.label, "Cache host label registered twice; keeping the later section");
            }
        }
        registry
    }

    /// Like [`register`](Self::register), wrapped for sharing.
    pub fn shared(config: &CacheHostsConfig, conn: Option<SharedConnection>) -> SharedRegistry {
        Arc::new(Self::register(config, conn))
    }

    /// Add or replace the adapter under `label`, returning the previous one.
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        adapter: RedisAdapter,
    ) -> Option<Arc<RedisAdapter>> {
        self.hosts.insert(label.into(), Arc::new(adapter))
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Arc<RedisAdapter>> {
        self.hosts.get(label)
    }

    /// Adapter for `label`, or [`CacheError::UnknownHost`].
    pub fn adapter(&self, label: &str) -> Result<&Arc<RedisAdapter>> {
        self.get(label)
            .ok_or_else(|| CacheError::UnknownHost(label.to_string()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::connection::MemoryConnection;

    #[test]
    fn test_last_registration_wins() {
        let config = CacheHostsConfig::default()
            .with_section("primary", HostConfig::new("global", "10.0.0.1", 6379))
            .with_section("replacement", HostConfig::new("global", "10.0.0.2", 6380))
            .with_section("sessions", HostConfig::new("sessions", "10.0.0.3", 6379));

        let registry = HostRegistry::register(&config, None);
        assert_eq!(registry.len(), 2);

        let global = registry.adapter("global").unwrap();
        assert_eq!(global.host(), "10.0.0.2");
        assert_eq!(global.port(), 6380);
        assert!(!global.is_connected());
    }

    #[test]
    fn test_lookup_returns_same_instance() {
        let registry = HostRegistry::register(&CacheHostsConfig::single(HostConfig::default()), None);
        let first = registry.adapter("global").unwrap();
        let second = registry.adapter("global").unwrap();
        assert!(Arc::ptr_eq(first, second));
    }

    #[test]
    fn test_unknown_label() {
        let registry = HostRegistry::default();
        let err = registry.adapter("missing").unwrap_err();
        assert!(matches!(err, CacheError::UnknownHost(label) if label == "missing"));
    }

    #[tokio::test]
    async fn test_shared_connection_used_by_every_adapter() {
        let config = CacheHostsConfig::default()
            .with_section("a", HostConfig::new("one", "localhost", 6379))
            .with_section("b", HostConfig::new("two", "localhost", 6379));
        let registry = HostRegistry::register(&config, Some(MemoryConnection::shared()));

        let one = registry.adapter("one").unwrap();
        let two = registry.adapter("two").unwrap();
        assert!(one.is_connected() && two.is_connected());

        one.set("shared", "yes", None, None, false).await.unwrap();
        assert_eq!(two.get("shared", None).await.unwrap().as_deref(), Some("yes"));

        let mut labels: Vec<&str> = registry.labels().collect();
        labels.sort_unstable();
        assert_eq!(labels, vec!["one", "two"]);
    }
}
