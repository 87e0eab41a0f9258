//! Configuration for widecol.
//!
//! This module provides configuration structures for the mapper and the
//! table handle pool.

mod mapper;

pub use mapper::{MapperConfig, PoolSettings};
