//! Definition Trait
//!
//! Defines the identity contract shared by every provisionable entity.
//! Each definition kind names its identity key and carries full value
//! equality through `PartialEq`.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait for provisionable definitions
///
/// Implement this trait for each kind of entity that is diffed, provisioned
/// downstream or persisted in a dictionary/runtime store.
///
/// # Contract
/// - `key()` is stable: two values describing the same entity return equal keys
/// - `PartialEq` compares the full value, not just the key
/// - `KIND` is a short lowercase identifier used in logs and metrics
///
/// # Example
/// ```rust,ignore
/// impl Definition for KpiDefinition {
///     type Key = String;
///
///     const KIND: &'static str = "kpi";
///
///     fn key(&self) -> Self::Key {
///         self.name.clone()
///     }
/// }
/// ```
pub trait Definition: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Identity key type
    type Key: Clone + Debug + Display + Eq + Hash + Ord + Send + Sync + 'static;

    /// Kind identifier for logging and metrics
    const KIND: &'static str;

    /// Identity key of this definition
    fn key(&self) -> Self::Key;
}

/// Collect identity keys of a slice of definitions, preserving order
#[inline]
#[must_use]
pub fn keys_of<T: Definition>(items: &[T]) -> Vec<T::Key> {
    items.iter().map(Definition::key).collect()
}
