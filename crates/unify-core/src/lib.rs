//! Core types and trait definitions for the Unify identity deduplication
//! engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the domain model, the matcher strategies, the merge preconditions and
//! field-backfill policy, the [`store::IdentityStore`] abstraction, and the
//! [`engine::Engine`] service built on top of it.

pub mod artifact;
pub mod candidate;
pub mod engine;
pub mod error;
pub mod matching;
pub mod merge;
pub mod patient;
pub mod store;

pub use error::{Error, ErrorKind, Result};
