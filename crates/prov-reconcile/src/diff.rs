//! Set reconciliation between existing and candidate collections
//!
//! Provides [`DiffEngine`], the primitive every target handler uses to turn a
//! desired collection into added / updated / deleted subsets against what is
//! already provisioned.

use indexmap::{IndexMap, IndexSet};
use prov_model::Definition;
use std::fmt;
use std::hash::Hash;

/// Snapshot of existing items indexed by identity
///
/// Built once from the existing collection and never mutated afterwards;
/// every query is a pure function of its `candidates` argument.
///
/// # Invariants
/// - For any candidates, `added`, `updated` and the unchanged remainder
///   partition the candidates
/// - `deleted` depends only on identity keys, never on value equality
pub struct DiffEngine<T, K, F>
where
    F: Fn(&T) -> K,
{
    /// Identity key -> existing item (last duplicate wins)
    existing: IndexMap<K, T>,
    /// Identity function
    identity: F,
}

impl<T, K, F> DiffEngine<T, K, F>
where
    T: Clone + PartialEq,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    /// Build engine from the existing collection
    ///
    /// O(existing). The source collection is consumed, not mutated in place.
    pub fn build<I>(existing: I, identity: F) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let existing = existing
            .into_iter()
            .map(|item| (identity(&item), item))
            .collect();
        Self { existing, identity }
    }

    /// Candidates whose identity is absent from the existing snapshot.
    ///
    /// Candidate order is preserved.
    #[must_use]
    pub fn added(&self, candidates: &[T]) -> Vec<T> {
        candidates
            .iter()
            .filter(|c| !self.existing.contains_key(&(self.identity)(*c)))
            .cloned()
            .collect()
    }

    /// Candidates present in the snapshot whose value differs.
    ///
    /// Candidate order is preserved.
    #[must_use]
    pub fn updated(&self, candidates: &[T]) -> Vec<T> {
        candidates
            .iter()
            .filter(|c| {
                self.existing
                    .get(&(self.identity)(*c))
                    .is_some_and(|existing| existing != *c)
            })
            .cloned()
            .collect()
    }

    /// Existing items whose identity is absent from the candidates.
    ///
    /// Returned in snapshot order.
    #[must_use]
    pub fn deleted(&self, candidates: &[T]) -> Vec<T> {
        let keys: IndexSet<K> = candidates.iter().map(|c| (self.identity)(c)).collect();
        self.existing
            .iter()
            .filter(|(key, _)| !keys.contains(*key))
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// All three subsets at once
    #[must_use]
    pub fn diff(&self, candidates: &[T]) -> Delta<T> {
        Delta {
            added: self.added(candidates),
            updated: self.updated(candidates),
            deleted: self.deleted(candidates),
        }
    }

    /// Number of items in the existing snapshot
    #[inline]
    #[must_use]
    pub fn existing_len(&self) -> usize {
        self.existing.len()
    }
}

impl<T> DiffEngine<T, T::Key, fn(&T) -> T::Key>
where
    T: Definition,
{
    /// Build engine keyed by [`Definition::key`]
    pub fn of<I>(existing: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self::build(existing, T::key as fn(&T) -> T::Key)
    }
}

impl<T, K, F> fmt::Debug for DiffEngine<T, K, F>
where
    F: Fn(&T) -> K,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffEngine")
            .field("existing", &self.existing.len())
            .finish_non_exhaustive()
    }
}

/// Result of one reconciliation query
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<T> {
    /// Candidates with no existing counterpart
    pub added: Vec<T>,
    /// Candidates whose existing counterpart differs
    pub updated: Vec<T>,
    /// Existing items no longer among the candidates
    pub deleted: Vec<T>,
}

impl<T> Delta<T> {
    /// Whether nothing changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}

impl<T> Default for Delta<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use prov_model::KpiDefinition;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        value: &'static str,
    }

    fn item(id: u32, value: &'static str) -> Item {
        Item { id, value }
    }

    fn engine(existing: Vec<Item>) -> DiffEngine<Item, u32, impl Fn(&Item) -> u32> {
        DiffEngine::build(existing, |i: &Item| i.id)
    }

    #[test]
    fn added_preserves_candidate_order() {
        let engine = engine(vec![item(1, "a")]);
        let added = engine.added(&[item(3, "c"), item(1, "a"), item(2, "b")]);

        assert_eq!(added, vec![item(3, "c"), item(2, "b")]);
    }

    #[test]
    fn updated_uses_value_equality() {
        let engine = engine(vec![item(1, "a"), item(2, "b")]);
        let updated = engine.updated(&[item(1, "a"), item(2, "changed")]);

        assert_eq!(updated, vec![item(2, "changed")]);
    }

    #[test]
    fn deleted_ignores_value_differences() {
        let engine = engine(vec![item(1, "a"), item(2, "b")]);
        let deleted = engine.deleted(&[item(1, "different")]);

        assert_eq!(deleted, vec![item(2, "b")]);
    }

    #[test]
    fn empty_existing_makes_everything_added() {
        let engine = engine(Vec::new());
        let delta = engine.diff(&[item(1, "a")]);

        assert_eq!(delta.added.len(), 1);
        assert!(delta.updated.is_empty());
        assert!(delta.deleted.is_empty());
    }

    #[test]
    fn queries_are_repeatable() {
        let engine = engine(vec![item(1, "a"), item(2, "b")]);
        let candidates = [item(2, "x"), item(3, "c")];

        let first = engine.diff(&candidates);
        let second = engine.diff(&candidates);

        assert_eq!(first, second);
        assert_eq!(engine.existing_len(), 2);
    }

    #[test]
    fn definition_engine_keys_by_name() {
        let existing = vec![KpiDefinition::new("a", "cell", "x")];
        let engine = DiffEngine::of(existing);

        let delta = engine.diff(&[KpiDefinition::new("a", "cell", "y")]);
        assert_eq!(delta.updated.len(), 1);
        assert!(delta.added.is_empty());
        assert_eq!(delta.len(), 1);
    }
}
