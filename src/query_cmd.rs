//! CLI commands: `fetch`, `query` and `list`.
//!
//! Each command builds an [`AnnexCatalog`] from the loaded configuration and
//! prints to stdout. Logs go to stderr, so `query --json` output can be
//! piped.

use anyhow::{Context, Result};
use tabula_core::filter::Filter;
use tabula_core::query::{page_count, PageRequest, QueryResult, QuerySpec, SortSpec};

use crate::catalog::AnnexCatalog;
use crate::config::Config;
use crate::envelope::decode_items;
use crate::fetch::{DataOrigin, FetchError, FetchPipeline};
use crate::models::Annex;
use crate::shutdown::Shutdown;
use crate::transport::{HttpTransport, Transport};

/// Wire the catalog from configuration: reqwest transport, fallback dataset
/// (if configured) and the session shutdown signal.
pub fn build_catalog(cfg: &Config, shutdown: Shutdown) -> Result<AnnexCatalog<HttpTransport>> {
    let policy = cfg.source.policy();
    let transport = HttpTransport::new(policy.attempt_timeout)?;
    let mut pipeline = FetchPipeline::new(transport).with_shutdown(shutdown);

    if let Some(path) = &cfg.source.fallback_path {
        pipeline = pipeline.with_fallback(load_fallback(path)?);
    }

    let url = cfg.source.url().unwrap_or_default().to_string();
    Ok(AnnexCatalog::new(pipeline, url, policy).with_page_size(cfg.table.page_size))
}

fn load_fallback(path: &std::path::Path) -> Result<Vec<Annex>> {
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read fallback dataset: {}", path.display()))?;
    decode_items(&body)
        .with_context(|| format!("Failed to parse fallback dataset: {}", path.display()))
}

/// `tabula fetch`: fetch once and report every attempt.
pub async fn run_fetch<C: Transport>(catalog: &AnnexCatalog<C>) -> Result<()> {
    let outcome = catalog.refresh().await;

    for attempt in &outcome.attempts {
        let retry = match attempt.backoff {
            Some(delay) => format!("retry in {}ms", delay.as_millis()),
            None => String::new(),
        };
        println!(
            "attempt {:<3} {:<40} {:>8}ms  {}",
            attempt.number,
            attempt.outcome.to_string(),
            attempt.elapsed.as_millis(),
            retry
        );
    }

    println!();
    println!("items:  {}", outcome.items.len());
    println!("origin: {}", outcome.origin);

    match (&outcome.error, outcome.origin) {
        (None, _) => Ok(()),
        (Some(err), DataOrigin::Fallback) => {
            println!("error:  {}", err);
            Ok(())
        }
        (Some(FetchError::Canceled), _) => anyhow::bail!("fetch canceled"),
        (Some(err), _) => anyhow::bail!("no data available: {}", err),
    }
}

/// Options for `tabula query`.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub filters: Vec<String>,
    pub any: bool,
    pub sort: Option<String>,
    pub desc: bool,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub no_paging: bool,
    pub snapshot: bool,
    pub search: bool,
    pub json: bool,
}

/// `tabula query`: run one query against the dataset.
pub async fn run_query<C: Transport>(
    cfg: &Config,
    catalog: &AnnexCatalog<C>,
    args: &QueryArgs,
) -> Result<()> {
    let spec = build_spec(cfg, args)?;
    let mut session = catalog.session().await;

    let result = if args.snapshot {
        session.query_snapshot(&spec)?
    } else {
        session.query_live(&spec)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    // live queries are always paged; mirror the page they fell back to
    let page = if args.snapshot {
        spec.page.filter(|_| spec.paging_enabled)
    } else {
        Some(
            spec.page
                .unwrap_or_else(|| PageRequest::new(1, session.page_size())),
        )
    };
    print_table(&result, page);
    Ok(())
}

fn build_spec(cfg: &Config, args: &QueryArgs) -> Result<QuerySpec> {
    let mut spec = QuerySpec::new();

    if let Some(filter) = Filter::parse_all(&args.filters, args.any)? {
        spec = spec.filter(filter);
    }

    if let Some(field) = args.sort.as_deref().filter(|f| !f.trim().is_empty()) {
        spec = spec.sort(if args.desc {
            SortSpec::desc(field)
        } else {
            SortSpec::asc(field)
        });
    }

    if !args.no_paging {
        let size = args.page_size.unwrap_or(cfg.table.page_size);
        let options = &cfg.table.page_size_options;
        if !options.is_empty() && !options.contains(&size) {
            anyhow::bail!("page size {} is not one of {:?}", size, options);
        }
        spec = spec.page(args.page.unwrap_or(1), size);
    }

    if args.search {
        spec = spec.declare_search();
    }

    Ok(spec)
}

fn print_table(result: &QueryResult<Annex>, page: Option<PageRequest>) {
    if result.items.is_empty() {
        println!("No results.");
    } else {
        println!("{:<5} {:<7} {:<10} ANNEX", "ID", "SPHERE", "STATEMENT");
        for row in &result.items {
            println!(
                "{:<5} {:<7} {:<10} {}",
                row.id, row.sphere, row.statement, row.annex
            );
        }
    }

    println!();
    match page {
        Some(page) => println!(
            "page {} of {} ({} matching)",
            page.index,
            page_count(result.total, page.size),
            result.total
        ),
        None => println!("{} matching", result.total),
    }
    println!(
        "filtered: {}  sorted: {}  search: {}",
        yes_no(result.is_filtered),
        yes_no(result.is_sorted),
        yes_no(result.is_search)
    );
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// `tabula list`: print the dataset as select options, optionally narrowed
/// by sphere and/or statement.
pub async fn run_list<C: Transport>(
    catalog: &AnnexCatalog<C>,
    sphere: Option<&str>,
    statement: Option<&str>,
) -> Result<()> {
    let rows = match (sphere, statement) {
        (Some(s), None) => catalog.by_sphere(s).await?,
        (None, Some(d)) => catalog.by_statement(d).await?,
        (Some(s), Some(d)) => {
            catalog
                .select(Filter::All(vec![
                    Filter::equals_ignore_case("esfera", s.trim()),
                    Filter::equals_ignore_case("demonstrativo", d.trim()),
                ]))
                .await?
        }
        (None, None) => catalog.load().await.as_ref().clone(),
    };

    if rows.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{:<32} TEXT", "VALUE");
    for row in &rows {
        let option = catalog.option(row);
        println!("{:<32} {}", option.value, option.text);
    }
    Ok(())
}
