//! # Cache Wrapper Library
//!
//! Typed, namespaced access to one or more Redis hosts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RedisCache (facade)                         │
//! │    prefixes keys, JSON-encodes values, logs every call       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  host label
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HostRegistry                             │
//! │              label ──▶ Arc<RedisAdapter>                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  lazy, single connect
//!                              ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │    RedisConnection      │   │      MemoryConnection        │
//! │  (ConnectionManager)    │   │   (feature `memory`, tests)  │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `memory`: Enable the in-process store emulator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cache_wrapper::{CacheHostsConfig, CacheNamespace, HostRegistry, RedisCache};
//!
//! let registry = HostRegistry::shared(&CacheHostsConfig::from_env()?, None);
//! let cache = RedisCache::new(registry, CacheNamespace::new("orders", "v2").with_expire(300));
//!
//! cache.set("42", &order).await?;          // orders:v2:42 = {"id":42,...}
//! let order: Option<Order> = cache.get("42").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;

// Re-export commonly used types
pub use adapter::RedisAdapter;
pub use cache::{RedisCache, SetOptions};
pub use config::{CacheHostsConfig, CacheNamespace, HostConfig};
#[cfg(any(test, feature = "memory"))]
pub use connection::MemoryConnection;
pub use connection::{Connection, RedisConnection, SharedConnection};
pub use error::{CacheError, Result};
pub use registry::{HostRegistry, SharedRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
