//! Tutaville application library.
//!
//! Tutors log worked hours against the subjects they are assigned to, and
//! administrators review those hours and manage the roster of subjects,
//! tutors and per-subject hourly rates. This crate holds the domain services
//! that enforce those rules and the adapters that connect them to the
//! outside world.
//!
//! # Layers
//!
//! - [`services`] - Timesheet lifecycle, roster management and role resolution
//! - [`store`] - The [`store::DataStore`] trait, cascade plans, and an in-memory store
//! - [`identity`] - The [`identity::IdentityProvider`] trait, a Supabase auth client,
//!   and an in-memory provider
//! - [`db`] - `PostgreSQL` implementation of [`store::DataStore`]
//! - [`auth`] - The explicit [`auth::AuthContext`] passed to every service call
//! - [`models`] - Entity and projection types
//! - [`config`] - Environment-driven configuration
//! - [`error`] - The [`error::DomainError`] taxonomy returned by every service
//!
//! # Authorization
//!
//! Role checks made here are advisory. The hosted database enforces the real
//! rules through row-level policies; these checks exist so that a tutor's
//! session cannot drive an admin-only flow through this library by mistake.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod store;

pub use auth::AuthContext;
pub use error::{DomainError, ValidationError};
