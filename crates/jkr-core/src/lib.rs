//! Core types and trait definitions for the waste-collection site register.
//!
//! This crate is deliberately free of database dependencies. The conflation
//! engine and the storage backends depend on it; it depends on nothing
//! proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod codes;
pub mod error;
pub mod period;
pub mod record;
pub mod site;
pub mod store;

pub use error::{Error, Result};
