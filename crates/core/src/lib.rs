//! Tutaville Core - Shared domain types.
//!
//! This crate provides the value types used across all Tutaville components:
//! - `app` - Timesheet and roster services plus their storage/identity adapters
//! - `cli` - Operator command-line tools
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. Every type here validates on construction, so a value that exists
//! is a value that satisfies its invariant.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, roles, statuses, hours and hourly rates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
