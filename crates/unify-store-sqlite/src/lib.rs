//! SQLite backend for the Unify identity store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. A merge is one `BEGIN IMMEDIATE`
//! transaction; see [`merge`].

mod audit;
mod candidates;
mod encode;
mod patients;
mod schema;
mod store;

pub mod error;
pub mod merge;
pub mod reassign;

pub use error::{Error, Result};
pub use store::{DEFAULT_BUSY_TIMEOUT, SqliteStore};
