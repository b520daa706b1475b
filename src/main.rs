//! # Tabula CLI (`tabula`)
//!
//! Fetches the annex dataset from the configured source (with retries,
//! backoff and an optional fallback) and queries it.
//!
//! ## Usage
//!
//! ```bash
//! tabula --config ./config/tabula.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tabula fetch` | Fetch the dataset once and report every attempt |
//! | `tabula query` | Filter, sort and page the dataset |
//! | `tabula list` | Print select options, optionally by sphere/statement |
//!
//! ## Examples
//!
//! ```bash
//! # State-level DCA annexes, sorted by name, second page of 20
//! tabula query --filter esfera=E --filter demonstrativo=DCA --sort anexo --page 2
//!
//! # Everything mentioning RGF, as JSON
//! tabula query --filter 'anexo~rgf' --no-paging --json
//!
//! # Municipal options
//! tabula list --sphere m
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `tabula=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tabula::config;
use tabula::query_cmd::{self, QueryArgs};
use tabula::shutdown;

/// Tabula: resilient remote dataset acquisition with a tabular query engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tabula.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "tabula", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tabula.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the dataset once and print every attempt.
    ///
    /// Exits non-zero when no data could be obtained (neither remote nor
    /// fallback).
    Fetch,

    /// Query the dataset.
    Query {
        /// Condition `FIELD<op>VALUE`; ops: = != ^= > >= < <= ~ !~.
        /// Repeatable; conditions are AND-ed unless `--any` is given.
        #[arg(long = "filter", value_name = "EXPR")]
        filters: Vec<String>,

        /// Combine filters with OR instead of AND.
        #[arg(long)]
        any: bool,

        /// Field to sort by.
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending.
        #[arg(long, requires = "sort")]
        desc: bool,

        /// 1-based page index (default 1).
        #[arg(long)]
        page: Option<usize>,

        /// Page size (default from `table.page_size`).
        #[arg(long)]
        page_size: Option<usize>,

        /// Return every matching row. Live queries still page.
        #[arg(long, conflicts_with_all = ["page", "page_size"])]
        no_paging: bool,

        /// Query a frozen snapshot instead of the live dataset.
        #[arg(long)]
        snapshot: bool,

        /// Mark the request as a search.
        #[arg(long)]
        search: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the dataset as select options.
    List {
        /// Sphere code (C, E, M, U), case-insensitive.
        #[arg(long)]
        sphere: Option<String>,

        /// Statement type (DCA, QDCC), case-insensitive.
        #[arg(long)]
        statement: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabula=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(shutdown::trigger_on_ctrl_c(trigger));

    let catalog = query_cmd::build_catalog(&cfg, signal)?;

    match cli.command {
        Commands::Fetch => {
            query_cmd::run_fetch(&catalog).await?;
        }
        Commands::Query {
            filters,
            any,
            sort,
            desc,
            page,
            page_size,
            no_paging,
            snapshot,
            search,
            json,
        } => {
            let args = QueryArgs {
                filters,
                any,
                sort,
                desc,
                page,
                page_size,
                no_paging,
                snapshot,
                search,
                json,
            };
            query_cmd::run_query(&cfg, &catalog, &args).await?;
        }
        Commands::List { sphere, statement } => {
            query_cmd::run_list(&catalog, sphere.as_deref(), statement.as_deref()).await?;
        }
    }

    Ok(())
}
