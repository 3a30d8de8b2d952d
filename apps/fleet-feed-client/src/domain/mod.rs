//! Domain Layer - Core fleet tracking types and business logic.
//!
//! This layer contains the vehicle snapshot and connection state types
//! with no I/O. All types here are pure Rust with serialization support.

/// Vehicle records and the latest-per-vehicle snapshot.
pub mod vehicle;

/// Connection status, feed errors and the published state tuple.
pub mod connection;
