//! Chunked, bounded-concurrency granule downloads with integrity checks.

pub mod error;
pub mod integrity;
pub mod pool;
pub mod transport;
