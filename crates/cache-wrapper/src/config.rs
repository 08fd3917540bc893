//! # Cache Configuration
//!
//! Host records consumed at startup by the registry, and the static
//! per-facade namespace configuration.

use serde::Deserialize;
use std::env;

use crate::error::{CacheError, Result};

pub const DEFAULT_LABEL: &str = "global";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MSET_WITH_EXPIRE_MAX_KEYS: usize = 100;

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One Redis endpoint, registered under a logical label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    #[serde(rename = "LABEL", default = "default_label")]
    pub label: String,

    #[serde(rename = "REDIS_HOST", default = "default_host")]
    pub host: String,

    #[serde(rename = "REDIS_PORT", default = "default_port")]
    pub port: u16,
}

impl HostConfig {
    pub fn new(label: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            port,
        }
    }

    /// Connection URL for this endpoint
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL, DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// Named host sections, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHostsConfig {
    sections: Vec<(String, HostConfig)>,
}

impl CacheHostsConfig {
    #[must_use]
    pub fn single(config: HostConfig) -> Self {
        Self {
            sections: vec![("default".to_string(), config)],
        }
    }

    /// Add a section. Sections are registered in insertion order.
    #[must_use]
    pub fn with_section(mut self, name: impl Into<String>, config: HostConfig) -> Self {
        self.sections.push((name.into(), config));
        self
    }

    /// Parse `{"<section>": {"LABEL": .., "REDIS_HOST": .., "REDIS_PORT": ..}, ..}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let sections: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| CacheError::Config(format!("invalid cache hosts document: {e}")))?;

        let sections = sections
            .into_iter()
            .map(|(name, value)| {
                serde_json::from_value::<HostConfig>(value)
                    .map(|config| (name.clone(), config))
                    .map_err(|e| CacheError::Config(format!("section '{name}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { sections })
    }

    /// Load from environment variables.
    ///
    /// `CACHE_HOSTS` holds the full JSON document; without it a single
    /// section is built from `CACHE_LABEL`, `REDIS_HOST` and `REDIS_PORT`.
    pub fn from_env() -> Result<Self> {
        if let Ok(raw) = env::var("CACHE_HOSTS") {
            return Self::from_json(&raw);
        }

        let port = match env::var("REDIS_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| CacheError::Config(format!("REDIS_PORT '{raw}': {e}")))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self::single(HostConfig {
            label: env::var("CACHE_LABEL").unwrap_or_else(|_| default_label()),
            host: env::var("REDIS_HOST").unwrap_or_else(|_| default_host()),
            port,
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostConfig)> {
        self.sections.iter().map(|(name, config)| (name.as_str(), config))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Static configuration of one cache facade.
///
/// Physical keys are `service_prefix + delimiter + key_prefix + delimiter + key`.
/// The delimiter is not escaped inside user keys, so `a:b` under namespace
/// `x` cannot be told apart from `b` under namespace `x:a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    /// Registry label of the backing host
    pub host: String,
    pub service_prefix: String,
    pub key_prefix: String,
    pub delimiter: String,
    /// TTL applied when a write does not pass one; `None` keeps keys forever
    pub expire_in_sec: Option<u64>,
    pub mset_with_expire_max_keys: usize,
}

impl CacheNamespace {
    pub fn new(service_prefix: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            service_prefix: service_prefix.into(),
            key_prefix: key_prefix.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_host(mut self, label: impl Into<String>) -> Self {
        self.host = label.into();
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    #[must_use]
    pub const fn with_expire(mut self, seconds: u64) -> Self {
        self.expire_in_sec = Some(seconds);
        self
    }

    #[must_use]
    pub const fn with_mset_limit(mut self, max_keys: usize) -> Self {
        self.mset_with_expire_max_keys = max_keys;
        self
    }

    /// Physical key for a caller-supplied key.
    ///
    /// Segments are joined verbatim. A delimiter inside `key` is not
    /// escaped, so `"b:c"` under prefix `a` and `"c"` under prefix `a:b`
    /// land on the same physical key.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        let mut out = String::with_capacity(
            self.service_prefix.len() + self.key_prefix.len() + key.len() + 2 * self.delimiter.len(),
        );
        out.push_str(&self.service_prefix);
        out.push_str(&self.delimiter);
        out.push_str(&self.key_prefix);
        out.push_str(&self.delimiter);
        out.push_str(key);
        out
    }
}

impl Default for CacheNamespace {
    fn default() -> Self {
        Self {
            host: DEFAULT_LABEL.to_string(),
            service_prefix: "service".to_string(),
            key_prefix: "base".to_string(),
            delimiter: ":".to_string(),
            expire_in_sec: None,
            mset_with_expire_max_keys: DEFAULT_MSET_WITH_EXPIRE_MAX_KEYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_key_default() {
        let ns = CacheNamespace::default();
        assert_eq!(ns.prefixed_key("testKey"), "service:base:testKey");
    }

    #[test]
    fn test_prefixed_key_does_not_escape_delimiter() {
        let nested = CacheNamespace::new("svc", "a").prefixed_key("b:c");
        let flat = CacheNamespace::new("svc", "a:b").prefixed_key("c");
        assert_eq!(nested, flat);
    }

    #[test]
    fn test_custom_delimiter() {
        let ns = CacheNamespace::new("svc", "users").with_delimiter("|");
        assert_eq!(ns.prefixed_key("42"), "svc|users|42");
    }

    #[test]
    fn test_host_config_defaults() {
        let parsed = CacheHostsConfig::from_json(r#"{"main": {}}"#).unwrap();
        let (name, config) = parsed.iter().next().unwrap();
        assert_eq!(name, "main");
        assert_eq!(config, &HostConfig::default());
        assert_eq!(config.url(), "redis://localhost:6379");
    }

    #[test]
    fn test_sections_keep_document_order() {
        let raw = r#"{
            "zeta": {"LABEL": "global", "REDIS_HOST": "10.0.0.2", "REDIS_PORT": 6380},
            "alpha": {"LABEL": "sessions", "REDIS_HOST": "10.0.0.3"}
        }"#;
        let parsed = CacheHostsConfig::from_json(raw).unwrap();
        let names: Vec<&str> = parsed.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let (_, sessions) = parsed.iter().nth(1).unwrap();
        assert_eq!(sessions.label, "sessions");
        assert_eq!(sessions.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_section_is_config_error() {
        let err = CacheHostsConfig::from_json(r#"{"bad": {"REDIS_PORT": "not a port"}}"#)
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(msg) if msg.contains("bad")));
    }

    #[test]
    fn test_namespace_builders() {
        let ns = CacheNamespace::new("svc", "k")
            .with_host("sessions")
            .with_expire(30)
            .with_mset_limit(5);
        assert_eq!(ns.host, "sessions");
        assert_eq!(ns.expire_in_sec, Some(30));
        assert_eq!(ns.mset_with_expire_max_keys, 5);
        assert_eq!(ns.delimiter, ":");
    }
}
