//! Cartwright Core - Shared types library.
//!
//! This crate provides the types shared by every Cartwright component:
//! - `checkout` - Cart store, inventory ledger and order assembly
//! - `cli` - Command-line tools for migrations, seeding and stock inspection
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access. The optional `postgres` feature adds `sqlx` encode/decode impls so
//! the same types can be bound directly in queries.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, quantities and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
