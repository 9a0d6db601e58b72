//! Client code for offcache.
//!
//! This crate provides the HTTP implementation of the network interface
//! the offline cache agent consumes.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork};
