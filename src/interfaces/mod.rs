//! File-facing adapters used by the binary: the catalog seed, the gateway
//! event feed and the course report.

pub mod csv;
pub mod seed;
pub mod webhook;
