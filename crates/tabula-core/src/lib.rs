//! # Tabula Core
//!
//! Shared, WASM-safe logic for Tabula: the record model, typed filter
//! expressions, the tabular query engine, table sessions, and per-record
//! memoized derivations.
//!
//! This crate contains no tokio, network, or filesystem dependencies. The
//! calling application acquires the dataset and hands snapshots to
//! [`query::run`] (directly or through a [`session::TableSession`]).

pub mod filter;
pub mod memo;
pub mod query;
pub mod record;
pub mod session;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;
