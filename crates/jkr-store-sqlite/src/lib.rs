//! SQLite backend for the site register.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. One connection is shared by
//! every clone of the store, which is what makes the explicit
//! `begin`/`commit`/`rollback` calls of [`jkr_core::store::SiteStore`] work.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
