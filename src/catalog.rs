//! The annex catalog: the dataset the rest of the application serves.
//!
//! The catalog materializes the dataset through the [`FetchPipeline`] the
//! first time anything asks for it and then holds it for the rest of the
//! session. It is never refetched behind the caller's back; [`refresh`]
//! does that explicitly.
//!
//! Concurrent first accesses share one fetch: the slot is a
//! `tokio::sync::Mutex` held across the fetch, so later callers wait for
//! the first one's result instead of issuing their own requests.
//!
//! [`refresh`]: AnnexCatalog::refresh

use std::sync::Arc;

use tabula_core::filter::Filter;
use tabula_core::memo::Memoized;
use tabula_core::query::{self, QueryError, QuerySpec};
use tabula_core::session::{TableSession, DEFAULT_PAGE_SIZE};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::fetch::{FetchError, FetchOutcome, FetchPipeline, FetchPolicy};
use crate::models::{assign_ids, Annex, SelectOption};
use crate::transport::Transport;

type OptionFn = fn(&Annex) -> SelectOption;

pub struct AnnexCatalog<C> {
    pipeline: FetchPipeline<C, Annex>,
    url: String,
    policy: FetchPolicy,
    page_size: usize,
    dataset: Mutex<Option<Arc<Vec<Annex>>>>,
    options: Memoized<Annex, SelectOption, OptionFn>,
}

fn select_option(annex: &Annex) -> SelectOption {
    SelectOption::from(annex)
}

impl<C: Transport> AnnexCatalog<C> {
    pub fn new(pipeline: FetchPipeline<C, Annex>, url: impl Into<String>, policy: FetchPolicy) -> Self {
        Self {
            pipeline,
            url: url.into(),
            policy,
            page_size: DEFAULT_PAGE_SIZE,
            dataset: Mutex::new(None),
            options: Memoized::new(select_option as OptionFn),
        }
    }

    /// Default page size for sessions started from this catalog.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// The dataset, fetching it on first access.
    pub async fn load(&self) -> Arc<Vec<Annex>> {
        let mut slot = self.dataset.lock().await;
        if let Some(rows) = slot.as_ref() {
            return Arc::clone(rows);
        }
        let outcome = self.acquire().await;
        let rows = Arc::new(outcome.items);
        if outcome.error != Some(FetchError::Canceled) {
            *slot = Some(Arc::clone(&rows));
        }
        rows
    }

    /// Fetch again and replace the held dataset. Returns the full outcome
    /// so callers can report on the attempts.
    pub async fn refresh(&self) -> FetchOutcome<Annex> {
        let mut slot = self.dataset.lock().await;
        let outcome = self.acquire().await;
        if outcome.error != Some(FetchError::Canceled) {
            *slot = Some(Arc::new(outcome.items.clone()));
            self.options.clear();
        }
        outcome
    }

    async fn acquire(&self) -> FetchOutcome<Annex> {
        let mut outcome = self.pipeline.fetch(&self.url, &self.policy).await;
        assign_ids(&mut outcome.items);
        info!(
            items = outcome.items.len(),
            origin = %outcome.origin,
            "annex dataset materialized"
        );
        outcome
    }

    /// Annexes for one sphere (C, E, M, U), matched case-insensitively.
    pub async fn by_sphere(&self, sphere: &str) -> Result<Vec<Annex>, QueryError> {
        self.select(Filter::equals_ignore_case("esfera", sphere.trim())).await
    }

    /// Annexes for one statement type (DCA, QDCC), matched case-insensitively.
    pub async fn by_statement(&self, statement: &str) -> Result<Vec<Annex>, QueryError> {
        self.select(Filter::equals_ignore_case("demonstrativo", statement.trim()))
            .await
    }

    pub async fn select(&self, filter: Filter) -> Result<Vec<Annex>, QueryError> {
        let rows = self.load().await;
        debug!(filter = %filter, "selecting annexes");
        let result = query::run(rows.as_slice(), &QuerySpec::new().filter(filter))?;
        Ok(result.items)
    }

    /// A table session over the current dataset.
    pub async fn session(&self) -> TableSession<Annex> {
        TableSession::from_shared(self.load().await).with_page_size(self.page_size)
    }

    /// The select option for a row, derived once per distinct row.
    pub fn option(&self, annex: &Annex) -> Arc<SelectOption> {
        self.options.get(annex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{ScriptedTransport, Step};
    use crate::fetch::DataOrigin;
    use std::time::Duration;

    const BODY: &str = r#"{
        "items": [
            {"esfera": "C", "demonstrativo": "QDCC", "anexo": "RGF-Anexo 01"},
            {"esfera": "E", "demonstrativo": "DCA", "anexo": "Anexo I-AB"},
            {"esfera": "E", "demonstrativo": "DCA", "anexo": "Anexo I-C"},
            {"esfera": "e", "demonstrativo": "QDCC", "anexo": "RGF-Anexo 01"},
            {"esfera": "M", "demonstrativo": "dca", "anexo": "Anexo I-AB"}
        ],
        "hasMore": false, "limit": 5000, "offset": 0, "count": 5, "links": []
    }"#;

    fn policy() -> FetchPolicy {
        FetchPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(10),
            use_fallback: true,
        }
    }

    fn catalog(transport: &ScriptedTransport) -> AnnexCatalog<ScriptedTransport> {
        AnnexCatalog::new(
            FetchPipeline::new(transport.clone()),
            "http://example.test/annexes",
            policy(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_dataset_is_fetched_once() {
        let transport = ScriptedTransport::always(Step::Respond(200, BODY.into()));
        let catalog = catalog(&transport);

        let (a, b, c) = tokio::join!(catalog.load(), catalog.load(), catalog.by_sphere("E"));
        assert_eq!(transport.calls(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(c.unwrap().len(), 3);

        catalog.session().await;
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_follow_dataset_order() {
        let transport = ScriptedTransport::always(Step::Respond(200, BODY.into()));
        let rows = catalog(&transport).load().await;
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_ignore_case() {
        let transport = ScriptedTransport::always(Step::Respond(200, BODY.into()));
        let catalog = catalog(&transport);

        let spheres: Vec<u64> = catalog.by_sphere("e").await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(spheres, vec![2, 3, 4]);

        let dca: Vec<u64> = catalog
            .by_statement("DCA")
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(dca, vec![2, 3, 5]);

        assert!(catalog.by_sphere("X").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_refetches() {
        let transport = ScriptedTransport::new(
            vec![Step::Respond(200, BODY.into())],
            Step::Respond(
                200,
                r#"{"items": [{"esfera": "U", "demonstrativo": "DCA", "anexo": "DCA-Anexo I-C"}]}"#.into(),
            ),
        );
        let catalog = catalog(&transport);
        assert_eq!(catalog.load().await.len(), 5);

        let outcome = catalog.refresh().await;
        assert_eq!(outcome.origin, DataOrigin::Remote);
        assert_eq!(outcome.items[0].id, 1);
        assert_eq!(catalog.load().await.len(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_degrades_to_fallback() {
        let transport = ScriptedTransport::always(Step::Respond(503, String::new()));
        let catalog = AnnexCatalog::new(
            FetchPipeline::new(transport.clone())
                .with_fallback(vec![Annex::new("E", "DCA", "Anexo I-C")]),
            "http://example.test/annexes",
            policy(),
        );
        let rows = catalog.load().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(transport.calls(), 2);

        // held, not refetched
        catalog.load().await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_uses_catalog_page_size() {
        let transport = ScriptedTransport::always(Step::Respond(200, BODY.into()));
        let catalog = catalog(&transport).with_page_size(2);
        let session = catalog.session().await;
        let page = session.query_live(&QuerySpec::new()).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_options_are_memoized_per_row() {
        let transport = ScriptedTransport::always(Step::Respond(200, BODY.into()));
        let catalog = catalog(&transport);
        let rows = catalog.load().await;

        let first = catalog.option(&rows[2]);
        let again = catalog.option(&rows[2]);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.text, "E - DCA - Anexo I-C");
        assert_eq!(first.value, "E|DCA|Anexo I-C");

        let other = catalog.option(&rows[1]);
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
