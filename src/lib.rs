//! # Tabula
//!
//! Resilient acquisition of a remote dataset, served through a tabular
//! filter/sort/page query engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Transport │──▶│ FetchPipeline │──▶│ AnnexCatalog │
//! │ (reqwest) │   │ retry+backoff │   │ lazy dataset │
//! └───────────┘   └───────────────┘   └──────┬───────┘
//!                                            │
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                ┌──────────────┐     ┌─────────────┐
//!                │ TableSession │     │  Memoized   │
//!                │ live/snapshot│     │ select opts │
//!                └──────┬───────┘     └─────────────┘
//!                       ▼
//!                ┌──────────────┐
//!                │ query::run   │
//!                └──────────────┘
//! ```
//!
//! The query engine, sessions and memoization live in `tabula-core`, which
//! has no tokio, network or filesystem dependencies.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Annex record and response envelope |
//! | [`envelope`] | Case-insensitive body decoding |
//! | [`transport`] | Single-request HTTP transport |
//! | [`shutdown`] | Session teardown signal |
//! | [`fetch`] | Retrying fetch pipeline |
//! | [`catalog`] | Lazily materialized annex dataset |
//! | [`query_cmd`] | CLI commands |

pub mod catalog;
pub mod config;
pub mod envelope;
pub mod fetch;
pub mod models;
pub mod query_cmd;
pub mod shutdown;
pub mod transport;

pub use tabula_core;
