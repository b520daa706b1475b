//! Tabular query engine: filter, sort, count, paginate.
//!
//! [`run`] is a pure function of a dataset snapshot and a [`QuerySpec`]. It
//! never mutates or locks the dataset, so any number of callers may run
//! queries against the same snapshot concurrently.
//!
//! # Pipeline
//!
//! 1. Keep records matching `spec.filter` (relative order preserved).
//! 2. If a sort field is given, stable-sort by that field.
//! 3. `total` = number of records after steps 1 and 2.
//! 4. If paging is enabled and a page is requested, slice the window
//!    `[(index-1)*size, index*size)` clipped to the sequence.
//! 5. Report which stages were exercised in the [`QueryResult`] flags.

use std::cmp::Ordering;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::filter::Filter;
use crate::record::Record;
use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort by one field. Values order as [`Value::compare`] does, so text is
/// case-insensitive with byte order breaking ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A 1-based page request.
///
/// `index == 0` or `size == 0` is a caller error; the engine answers it
/// with an empty page rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    /// The half-open window this page covers in a sequence of `total` items.
    pub fn window(&self, total: usize) -> Range<usize> {
        if self.index == 0 || self.size == 0 {
            return 0..0;
        }
        let start = (self.index - 1).saturating_mul(self.size).min(total);
        let end = start.saturating_add(self.size).min(total);
        start..end
    }
}

/// Number of pages needed to show `total` items at `size` per page.
pub fn page_count(total: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        total.div_ceil(size)
    }
}

/// One query request.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub filter: Option<Filter>,
    pub sort: Option<SortSpec>,
    pub page: Option<PageRequest>,
    pub paging_enabled: bool,
    /// Report `is_filtered` even when no filter is attached.
    pub filter_declared: bool,
    pub search_declared: bool,
    pub advanced_search: bool,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Request a page and enable paging.
    pub fn page(mut self, index: usize, size: usize) -> Self {
        self.page = Some(PageRequest::new(index, size));
        self.paging_enabled = true;
        self
    }

    pub fn paging(mut self, enabled: bool) -> Self {
        self.paging_enabled = enabled;
        self
    }

    pub fn declare_filter(mut self) -> Self {
        self.filter_declared = true;
        self
    }

    pub fn declare_search(mut self) -> Self {
        self.search_declared = true;
        self
    }

    pub fn advanced(mut self) -> Self {
        self.advanced_search = true;
        self
    }

    fn sort_field(&self) -> Option<&SortSpec> {
        self.sort.as_ref().filter(|s| !s.field.trim().is_empty())
    }
}

/// The page produced by [`run`], plus metadata for the caller's display.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    /// Records matching the filter, before paging.
    pub total: usize,
    pub is_filtered: bool,
    pub is_sorted: bool,
    pub is_search: bool,
    pub is_advanced_search: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown sort field '{0}'")]
    UnknownField(String),
    #[error("sort field '{field}' mixes {left} and {right} values")]
    IncomparableField {
        field: String,
        left: ValueKind,
        right: ValueKind,
    },
    #[error("sort field '{0}' holds a list and cannot be ordered")]
    UnsortableField(String),
}

/// Run one query against a dataset snapshot.
pub fn run<T: Record + Clone>(dataset: &[T], spec: &QuerySpec) -> Result<QueryResult<T>, QueryError> {
    let mut rows: Vec<&T> = match &spec.filter {
        Some(filter) => dataset.iter().filter(|r| filter.matches(*r)).collect(),
        None => dataset.iter().collect(),
    };

    let sort = spec.sort_field();
    if let Some(sort) = sort {
        rows = sort_rows(rows, sort)?;
    }

    let total = rows.len();
    let window = match (spec.paging_enabled, spec.page) {
        (true, Some(page)) => page.window(total),
        _ => 0..total,
    };
    let items = rows[window].iter().map(|r| (*r).clone()).collect();

    Ok(QueryResult {
        items,
        total,
        is_filtered: spec.filter.is_some() || spec.filter_declared,
        is_sorted: sort.is_some(),
        is_search: spec.search_declared,
        is_advanced_search: spec.advanced_search,
    })
}

/// Stable sort by one field. Keys are read once per record, then checked
/// for mutual comparability before sorting so the comparator is total.
fn sort_rows<'a, T: Record>(rows: Vec<&'a T>, sort: &SortSpec) -> Result<Vec<&'a T>, QueryError> {
    let field = sort.field.trim();
    let mut keyed: Vec<(Value, &'a T)> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = row
            .field(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        keyed.push((key, row));
    }

    let mut seen: Option<ValueKind> = None;
    for (key, _) in &keyed {
        match key.kind() {
            ValueKind::Null => {}
            ValueKind::List => return Err(QueryError::UnsortableField(field.to_string())),
            kind => match seen {
                None => seen = Some(kind),
                Some(prev) if prev != kind => {
                    return Err(QueryError::IncomparableField {
                        field: field.to_string(),
                        left: prev,
                        right: kind,
                    })
                }
                Some(_) => {}
            },
        }
    }

    // `sort_by` is stable; reversing the comparator keeps ties in filter order.
    match sort.direction {
        SortDirection::Asc => keyed.sort_by(|a, b| a.0.compare(&b.0).unwrap_or(Ordering::Equal)),
        SortDirection::Desc => keyed.sort_by(|a, b| b.0.compare(&a.0).unwrap_or(Ordering::Equal)),
    }

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{staff, Staff};

    fn dataset(n: u64) -> Vec<Staff> {
        (1..=n)
            .map(|i| staff(i, &format!("name-{}", i), (i % 3) as i64, &[]))
            .collect()
    }

    fn ids(items: &[Staff]) -> Vec<u64> {
        items.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_total_counts_filtered_before_paging() {
        let data = dataset(20);
        let filter = Filter::equals("count", 1i64);
        let expected = data.iter().filter(|s| s.count == 1).count();

        for (index, size) in [(1, 3), (2, 3), (5, 2), (0, 4), (1, 0), (99, 10)] {
            let spec = QuerySpec::new().filter(filter.clone()).page(index, size);
            let result = run(&data, &spec).unwrap();
            assert_eq!(result.total, expected, "page ({}, {})", index, size);
        }
    }

    #[test]
    fn test_paging_disabled_returns_everything() {
        let data = dataset(9);
        let spec = QuerySpec::new().page(1, 2).paging(false);
        let result = run(&data, &spec).unwrap();
        assert_eq!(result.items.len(), result.total);
        assert_eq!(result.total, 9);
    }

    #[test]
    fn test_page_length_formula() {
        let data = dataset(17);
        for size in 1..=6usize {
            for index in 1..=6usize {
                let result = run(&data, &QuerySpec::new().page(index, size)).unwrap();
                let expected = size.min(result.total.saturating_sub((index - 1) * size));
                assert_eq!(result.items.len(), expected, "page ({}, {})", index, size);
            }
        }
    }

    #[test]
    fn test_seven_records_third_page_of_three() {
        let data = dataset(7);
        let spec = QuerySpec::new().declare_filter().page(3, 3);
        let result = run(&data, &spec).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.total, 7);
        assert_eq!(ids(&result.items), vec![7]);
    }

    #[test]
    fn test_no_match_reports_filtered_empty_page() {
        let data = dataset(5);
        let spec = QuerySpec::new()
            .filter(Filter::equals("name", "nobody"))
            .page(1, 10);
        let result = run(&data, &spec).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total, 0);
        assert!(result.is_filtered);
        assert!(!result.is_sorted);
    }

    #[test]
    fn test_invalid_page_clamps_to_empty() {
        let data = dataset(5);
        assert!(run(&data, &QuerySpec::new().page(0, 3)).unwrap().items.is_empty());
        assert!(run(&data, &QuerySpec::new().page(2, 0)).unwrap().items.is_empty());
        let far = run(&data, &QuerySpec::new().page(usize::MAX, usize::MAX)).unwrap();
        assert!(far.items.is_empty());
        assert_eq!(far.total, 5);
    }

    #[test]
    fn test_sort_is_stable_both_directions() {
        // counts cycle 1,2,0,1,2,0,... so every key has ties
        let data = dataset(9);
        let asc = run(&data, &QuerySpec::new().sort(SortSpec::asc("count"))).unwrap();
        assert_eq!(ids(&asc.items), vec![3, 6, 9, 1, 4, 7, 2, 5, 8]);
        assert!(asc.is_sorted);

        let desc = run(&data, &QuerySpec::new().sort(SortSpec::desc("count"))).unwrap();
        assert_eq!(ids(&desc.items), vec![2, 5, 8, 1, 4, 7, 3, 6, 9]);
    }

    #[test]
    fn test_sort_ties_follow_filter_order() {
        let data = vec![
            staff(10, "b", 1, &[]),
            staff(3, "a", 1, &[]),
            staff(7, "b", 2, &[]),
            staff(1, "b", 1, &[]),
        ];
        let spec = QuerySpec::new()
            .filter(Filter::equals("name", "b"))
            .sort(SortSpec::asc("count"));
        let result = run(&data, &spec).unwrap();
        assert_eq!(ids(&result.items), vec![10, 1, 7]);
    }

    #[test]
    fn test_text_sort_ignores_case() {
        let data = vec![
            staff(1, "zeta", 0, &[]),
            staff(2, "Beta", 0, &[]),
            staff(3, "alpha", 0, &[]),
            staff(4, "beta", 0, &[]),
            staff(5, "Zeta", 0, &[]),
        ];
        let asc = run(&data, &QuerySpec::new().sort(SortSpec::asc("name"))).unwrap();
        assert_eq!(ids(&asc.items), vec![3, 2, 4, 5, 1]);

        let desc = run(&data, &QuerySpec::new().sort(SortSpec::desc("name"))).unwrap();
        assert_eq!(ids(&desc.items), vec![1, 5, 4, 2, 3]);
    }

    #[test]
    fn test_text_filter_matches_literal_as_typed() {
        let data = vec![
            staff(1, "007", 0, &[]),
            staff(2, "7", 0, &[]),
            staff(3, "1.50", 0, &[]),
            staff(4, "2024-01-01", 0, &[]),
            staff(5, "a7", 0, &[]),
        ];
        for (expr, expected) in [
            ("name=007", vec![1]),
            ("name=1.50", vec![3]),
            ("name=2024-01-01", vec![4]),
            ("name~007", vec![1]),
        ] {
            let spec = QuerySpec::new().filter(Filter::parse(expr).unwrap());
            let result = run(&data, &spec).unwrap();
            assert_eq!(result.total, expected.len(), "{}", expr);
            assert_eq!(ids(&result.items), expected, "{}", expr);
        }
    }

    #[test]
    fn test_blank_sort_field_is_not_sorting() {
        let data = dataset(4);
        let result = run(&data, &QuerySpec::new().sort(SortSpec::asc("  "))).unwrap();
        assert!(!result.is_sorted);
        assert_eq!(ids(&result.items), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_errors() {
        let data = dataset(3);
        let err = run(&data, &QuerySpec::new().sort(SortSpec::asc("salary"))).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("salary".into()));

        let err = run(&data, &QuerySpec::new().sort(SortSpec::asc("hobbies"))).unwrap_err();
        assert_eq!(err, QueryError::UnsortableField("hobbies".into()));
    }

    #[test]
    fn test_sort_empty_filter_result_is_ok() {
        let data = dataset(3);
        let spec = QuerySpec::new()
            .filter(Filter::equals("name", "nobody"))
            .sort(SortSpec::asc("salary"));
        let result = run(&data, &spec).unwrap();
        assert_eq!(result.total, 0);
    }

    #[test]
    fn test_declared_flags_pass_through() {
        let data = dataset(2);
        let spec = QuerySpec::new().declare_search().advanced();
        let result = run(&data, &spec).unwrap();
        assert!(result.is_search);
        assert!(result.is_advanced_search);
        assert!(!result.is_filtered);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(7, 3), 3);
        assert_eq!(page_count(6, 3), 2);
        assert_eq!(page_count(0, 3), 0);
        assert_eq!(page_count(5, 0), 0);
    }

    #[test]
    fn test_result_serializes() {
        let data = dataset(1);
        let result = run(&data, &QuerySpec::new().page(1, 1)).unwrap();
        let ids_only = QueryResult {
            items: ids(&result.items),
            total: result.total,
            is_filtered: result.is_filtered,
            is_sorted: result.is_sorted,
            is_search: result.is_search,
            is_advanced_search: result.is_advanced_search,
        };
        let json = serde_json::to_value(&ids_only).unwrap();
        assert_eq!(json["items"], serde_json::json!([1]));
        assert_eq!(json["total"], 1);
        assert_eq!(json["is_filtered"], false);
    }
}
