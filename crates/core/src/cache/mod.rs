//! SQLite-backed store of named cache generations.
//!
//! This module provides persistent storage for cached HTTP responses using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named generations, each an independent request -> response map
//! - Atomic bulk writes and last-write-wins single-key overwrites
//! - Whole-generation deletion (entries cascade)
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::CachedResponse;
