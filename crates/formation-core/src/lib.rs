//! Core types and trait definitions for the formation sales pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! money arithmetic, the access gate and the progress tracker live here so
//! that every storage backend and every transport shares one definition of
//! them.

pub mod access;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod money;
pub mod progress;
pub mod store;

pub use error::{Error, Result};
