//! Cache Probe CLI
//!
//! Registers the configured cache hosts and runs a short smoke sequence
//! against each label.

mod config;

use anyhow::{ensure, Result};
use cache_wrapper::{CacheNamespace, HostRegistry, MemoryConnection, RedisCache, SetOptions};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::{Backend, ProbeConfig};

#[derive(Parser, Debug)]
#[command(name = "cache-probe")]
#[command(about = "Smoke-test the configured cache hosts")]
struct Args {
    /// Backend override (defaults to CACHE_BACKEND)
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Number of keys written per host
    #[arg(short, long, default_value = "5")]
    keys: usize,

    /// TTL of every probe key in seconds
    #[arg(long, default_value = "60")]
    expire: u64,
}

/// Outcome of one smoke run.
#[derive(Debug, Default, Serialize)]
struct SmokeReport {
    label: String,
    written: usize,
    read_back: usize,
    counter: i64,
    deleted: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = ProbeConfig::from_env()?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(fmt::layer().json())
        .init();

    info!(
        backend = %config.backend,
        hosts = config.hosts.len(),
        "Starting cache probe"
    );

    let shared = match config.backend {
        Backend::Memory => Some(MemoryConnection::shared()),
        Backend::Redis => None,
    };
    let registry = HostRegistry::shared(&config.hosts, shared);

    let run_id = Uuid::new_v4();
    let mut labels: Vec<String> = registry.labels().map(ToString::to_string).collect();
    labels.sort();

    let mut failures = 0;
    for label in labels {
        let namespace = CacheNamespace::new(
            config.service_prefix.clone(),
            format!("{}:{run_id}", config.key_prefix),
        )
        .with_host(label.clone())
        .with_expire(args.expire);
        let cache = RedisCache::new(registry.clone(), namespace);

        match smoke(&cache, args.keys, args.expire).await {
            Ok(report) => info!(report = %json!(report), "Smoke run passed"),
            Err(e) => {
                failures += 1;
                error!(label = %label, error = %e, "Smoke run failed");
            }
        }
    }

    ensure!(failures == 0, "{failures} host(s) failed the smoke run");
    info!("Cache probe finished");
    Ok(())
}

/// Write, read back, count and clean up a batch of keys under `cache`'s namespace.
async fn smoke(cache: &RedisCache, keys: usize, expire: u64) -> Result<SmokeReport> {
    let mut report = SmokeReport {
        label: cache.namespace().host.clone(),
        ..SmokeReport::default()
    };

    let entries: Vec<(String, serde_json::Value)> = (0..keys)
        .map(|seq| (format!("item:{seq}"), json!({ "seq": seq, "probe": "cache-probe" })))
        .collect();

    // mset_with_expire refuses oversized batches
    let batch = cache.namespace().mset_with_expire_max_keys.max(1);
    for chunk in entries.chunks(batch) {
        cache.mset_with_expire(chunk, Some(expire)).await?;
        report.written += chunk.len();
    }

    cache
        .set_with("greeting", "hello", SetOptions::new().expire(expire))
        .await?;
    let greeting: Option<String> = cache.get("greeting").await?;
    ensure!(
        greeting.as_deref() == Some("hello"),
        "greeting read back as {greeting:?}"
    );

    let names: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
    let values: Vec<Option<serde_json::Value>> = cache.mget(&names).await?;
    report.read_back = values.iter().flatten().count();
    ensure!(
        report.read_back == report.written,
        "wrote {} keys, read back {}",
        report.written,
        report.read_back
    );

    cache.incr("counter", 1).await?;
    report.counter = cache.incr("counter", 1).await?;
    ensure!(report.counter == 2, "counter reached {}", report.counter);

    report.deleted = cache.delete_by_prefix("item:").await?;
    cache.delete(&["greeting", "counter"]).await?;
    ensure!(
        cache.keys("*").await?.is_empty(),
        "namespace not empty after cleanup"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_wrapper::{CacheHostsConfig, HostConfig};
    use tokio_test::assert_ok;

    fn memory_cache(mset_limit: usize) -> RedisCache {
        let registry = HostRegistry::shared(
            &CacheHostsConfig::single(HostConfig::default()),
            Some(MemoryConnection::shared()),
        );
        let namespace = CacheNamespace::new("probe", format!("smoke:{}", Uuid::new_v4()))
            .with_mset_limit(mset_limit);
        RedisCache::new(registry, namespace)
    }

    #[tokio::test]
    async fn test_smoke_against_memory() {
        let cache = memory_cache(100);
        let report = assert_ok!(smoke(&cache, 5, 60).await);

        assert_eq!(report.label, "global");
        assert_eq!(report.written, 5);
        assert_eq!(report.read_back, 5);
        assert_eq!(report.counter, 2);
        assert_eq!(report.deleted, 5);
    }

    #[tokio::test]
    async fn test_smoke_splits_large_batches() {
        let cache = memory_cache(3);
        let report = assert_ok!(smoke(&cache, 10, 60).await);
        assert_eq!(report.written, 10);
        assert_eq!(report.deleted, 10);
    }

    #[tokio::test]
    async fn test_smoke_with_no_keys() {
        let cache = memory_cache(100);
        let report = assert_ok!(smoke(&cache, 0, 60).await);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_smoke_with_zero_expire_keeps_keys_persistent() {
        let registry = HostRegistry::shared(
            &CacheHostsConfig::single(HostConfig::default()),
            Some(MemoryConnection::shared()),
        );
        let namespace = CacheNamespace::new("probe", format!("smoke:{}", Uuid::new_v4()))
            .with_expire(0);
        let cache = RedisCache::new(registry, namespace);

        let report = assert_ok!(smoke(&cache, 4, 0).await);
        assert_eq!(report.written, 4);
        assert_eq!(report.deleted, 4);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["cache-probe", "--backend", "memory", "--keys", "3"]);
        assert_eq!(args.backend, Some(Backend::Memory));
        assert_eq!(args.keys, 3);
        assert_eq!(args.expire, 60);
    }
}
