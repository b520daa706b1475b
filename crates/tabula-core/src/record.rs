//! Record abstraction consumed by the query engine.

use std::fmt::Debug;
use std::hash::Hash;

use crate::value::Value;

/// An entity the query engine can filter and sort.
///
/// The engine never assumes a schema beyond "fields addressable by name".
/// Implementations should match field names case-insensitively and return
/// `None` for names they do not have.
pub trait Record {
    /// Stable identity. Immutable once assigned.
    type Key: Clone + Eq + Hash + Debug;

    fn key(&self) -> Self::Key;

    fn field(&self, name: &str) -> Option<Value>;
}

/// A record with a numeric identity that a table session can assign when a
/// new row is added.
pub trait Identified: Record<Key = u64> {
    fn assign_key(&mut self, key: u64);
}
