//! Adapters behind the domain ports.
//!
//! `in_memory` holds the default volatile adapters; `rocksdb` the durable
//! store, compiled with the `storage-rocksdb` feature.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
