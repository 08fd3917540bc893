//! # Cache Module
//!
//! Namespaced, JSON-encoding facade over the registered adapters.

pub mod call_log;
pub mod client;

pub use client::{RedisCache, SetOptions};
