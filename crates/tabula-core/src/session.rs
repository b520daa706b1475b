//! Table sessions: the two query entry points over one dataset.
//!
//! A [`TableSession`] owns the live dataset and, once a search session has
//! started, a frozen snapshot of it. Both entry points delegate to
//! [`query::run`]; they differ only in which dataset they hand over and in
//! their paging defaults.
//!
//! | Entry point | Dataset | Paging |
//! |-------------|---------|--------|
//! | [`query_live`](TableSession::query_live) | live rows, including edits | always |
//! | [`query_snapshot`](TableSession::query_snapshot) | snapshot taken on first use | as requested |
//!
//! The live dataset is copy-on-write (`Arc<Vec<T>>`), so a snapshot is just a
//! second handle to the same allocation until the next edit.

use std::sync::Arc;

use crate::query::{self, PageRequest, QueryError, QueryResult, QuerySpec};
use crate::record::{Identified, Record};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// How a row passed to [`TableSession::save`] should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemChange {
    Add,
    Update,
}

pub struct TableSession<T> {
    live: Arc<Vec<T>>,
    snapshot: Option<Arc<Vec<T>>>,
    page_size: usize,
}

impl<T: Record + Clone> TableSession<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self::from_shared(Arc::new(rows))
    }

    /// Start a session over an already shared dataset without copying it.
    pub fn from_shared(rows: Arc<Vec<T>>) -> Self {
        Self {
            live: rows,
            snapshot: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Default page size used when a live query does not request a page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// A handle to the current live rows. Later edits do not affect it.
    pub fn live(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.live)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Query the live dataset. The result is always paged; without an
    /// explicit page the first page at the session page size is returned.
    pub fn query_live(&self, spec: &QuerySpec) -> Result<QueryResult<T>, QueryError> {
        let mut spec = spec.clone();
        spec.paging_enabled = true;
        if spec.page.is_none() {
            spec.page = Some(PageRequest::new(1, self.page_size));
        }
        query::run(self.live.as_slice(), &spec)
    }

    /// Query the frozen snapshot, taking it first if this search session
    /// has none yet (or holds an empty one).
    pub fn query_snapshot(&mut self, spec: &QuerySpec) -> Result<QueryResult<T>, QueryError> {
        let snapshot = self.snapshot();
        query::run(snapshot.as_slice(), spec)
    }

    /// The current snapshot, taken from the live rows if needed.
    pub fn snapshot(&mut self) -> Arc<Vec<T>> {
        match &self.snapshot {
            Some(s) if !s.is_empty() => Arc::clone(s),
            _ => {
                let taken = Arc::clone(&self.live);
                self.snapshot = Some(Arc::clone(&taken));
                taken
            }
        }
    }

    /// End the current search session; the next snapshot query re-reads
    /// the live rows.
    pub fn reset_snapshot(&mut self) {
        self.snapshot = None;
    }

    pub fn replace_all(&mut self, rows: Vec<T>) {
        self.live = Arc::new(rows);
    }

    /// Remove every live row whose key is in `keys`. Returns how many rows
    /// were removed.
    pub fn delete(&mut self, keys: &[T::Key]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let rows = Arc::make_mut(&mut self.live);
        let before = rows.len();
        rows.retain(|r| !keys.contains(&r.key()));
        before - rows.len()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.live.iter().find(|r| &r.key() == key)
    }
}

impl<T: Identified + Clone> TableSession<T> {
    /// Apply an add or an edit to the live dataset.
    ///
    /// `Add` assigns the first unused key counting up from `len + 1` and
    /// returns it. `Update` replaces the row with the same key in place
    /// (identity unchanged) and returns `None` when no such row exists.
    pub fn save(&mut self, mut row: T, change: ItemChange) -> Option<u64> {
        let rows = Arc::make_mut(&mut self.live);
        match change {
            ItemChange::Add => {
                let mut key = rows.len() as u64 + 1;
                while rows.iter().any(|r| r.key() == key) {
                    key += 1;
                }
                row.assign_key(key);
                rows.push(row);
                Some(key)
            }
            ItemChange::Update => {
                let key = row.key();
                let slot = rows.iter_mut().find(|r| r.key() == key)?;
                *slot = row;
                Some(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::query::SortSpec;
    use crate::testing::{staff, Staff};

    fn session(n: u64) -> TableSession<Staff> {
        TableSession::new((1..=n).map(|i| staff(i, &format!("s{}", i), i as i64, &[])).collect())
    }

    #[test]
    fn test_live_query_is_always_paged() {
        let s = session(30).with_page_size(10);
        let result = s.query_live(&QuerySpec::new().paging(false)).unwrap();
        assert_eq!(result.items.len(), 10);
        assert_eq!(result.total, 30);

        let result = s.query_live(&QuerySpec::new().page(3, 12)).unwrap();
        assert_eq!(result.items.len(), 6);
    }

    #[test]
    fn test_snapshot_paging_optional() {
        let mut s = session(30);
        let all = s.query_snapshot(&QuerySpec::new()).unwrap();
        assert_eq!(all.items.len(), 30);
        let paged = s.query_snapshot(&QuerySpec::new().page(2, 25)).unwrap();
        assert_eq!(paged.items.len(), 5);
    }

    #[test]
    fn test_entry_points_share_engine() {
        let mut s = session(12);
        let spec = QuerySpec::new()
            .filter(Filter::parse("count>4").unwrap())
            .sort(SortSpec::desc("count"))
            .page(1, 5)
            .declare_search();
        let live = s.query_live(&spec).unwrap();
        let frozen = s.query_snapshot(&spec).unwrap();
        assert_eq!(live.items, frozen.items);
        assert_eq!(live.total, frozen.total);
        assert_eq!(live.is_sorted, frozen.is_sorted);
        assert_eq!(live.is_search, frozen.is_search);
    }

    #[test]
    fn test_snapshot_ignores_later_edits() {
        let mut s = session(3);
        assert_eq!(s.query_snapshot(&QuerySpec::new()).unwrap().total, 3);

        s.delete(&[1, 2]);
        s.save(staff(0, "new", 9, &[]), ItemChange::Add);

        assert_eq!(s.query_snapshot(&QuerySpec::new()).unwrap().total, 3);
        assert_eq!(s.query_live(&QuerySpec::new()).unwrap().total, 2);

        s.reset_snapshot();
        assert_eq!(s.query_snapshot(&QuerySpec::new()).unwrap().total, 2);
    }

    #[test]
    fn test_empty_snapshot_is_retaken() {
        let mut s = TableSession::<Staff>::new(Vec::new());
        assert_eq!(s.query_snapshot(&QuerySpec::new()).unwrap().total, 0);
        s.replace_all(vec![staff(1, "a", 1, &[])]);
        assert_eq!(s.query_snapshot(&QuerySpec::new()).unwrap().total, 1);
    }

    #[test]
    fn test_add_assigns_first_free_key() {
        let mut s = TableSession::new(vec![staff(2, "a", 0, &[]), staff(3, "b", 0, &[])]);
        let key = s.save(staff(0, "c", 0, &[]), ItemChange::Add);
        assert_eq!(key, Some(4));
        let key = s.save(staff(0, "d", 0, &[]), ItemChange::Add);
        assert_eq!(key, Some(5));
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_update_replaces_whole_row() {
        let mut s = session(2);
        let updated = s.save(staff(2, "renamed", 42, &["Golf"]), ItemChange::Update);
        assert_eq!(updated, Some(2));
        let row = s.get(&2).unwrap();
        assert_eq!(row.name, "renamed");
        assert_eq!(row.count, 42);

        assert_eq!(s.save(staff(99, "ghost", 0, &[]), ItemChange::Update), None);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_delete_counts_removed() {
        let mut s = session(5);
        assert_eq!(s.delete(&[2, 4, 99]), 2);
        assert_eq!(s.delete(&[]), 0);
        assert_eq!(s.len(), 3);
    }
}
