//! Staged write batches.
//!
//! Every multi-key write in this crate is described as a [`WriteBatch`]
//! before it touches a backend. A batch is plain data: it records which keys
//! are overwritten and which counters are incremented, but carries no
//! connection or lock state. Backends apply a batch as one indivisible unit
//! and register every key it touches in the membership set in the same unit.
//!
//! Because a batch is built once from the caller's inputs and never mutated by
//! the commit path, a backend that has to re-run a commit after a write
//! conflict simply replays the same batch.
//!
//! [`WriteBatch::stage`] resolves a batch against the current values of its
//! keys into the exact set of overwrites to commit. Every backend stages the
//! same way, so counters carry one canonical text form regardless of where
//! they are stored.
//!
//! # Examples
//!
//! ```
//! use playstat_storage::batch::{BatchOperation, WriteBatch};
//!
//! let mut batch = WriteBatch::new();
//! batch.set("ORGE:S3:ios:short.mp4:a1", "{}");
//! batch.increment("AGGRHIST:playing:S3:ios:short.mp4", 2.0);
//!
//! assert_eq!(batch.len(), 2);
//! assert_eq!(batch.keys(), vec!["ORGE:S3:ios:short.mp4:a1", "AGGRHIST:playing:S3:ios:short.mp4"]);
//! assert!(matches!(batch.operations()[1], BatchOperation::Increment { .. }));
//! ```

use std::collections::{BTreeMap, HashSet};

use crate::error::{StorageError, StorageResult};

/// Parses a counter's canonical text form.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if `raw` is not a decimal number.
pub fn parse_counter(key: &str, raw: &str) -> StorageResult<f64> {
    raw.trim().parse::<f64>().map_err(|e| {
        StorageError::serialization_with_source(format!("counter {key} holds {raw:?}"), e)
    })
}

/// Renders a counter in its canonical decimal text form.
///
/// Whole numbers carry no fractional part (`3`, not `3.0`).
#[must_use]
pub fn format_counter(value: f64) -> String {
    value.to_string()
}

/// A single staged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Overwrite `key` with `value`.
    Set {
        /// Target key.
        key: String,
        /// Canonical text value.
        value: String,
    },
    /// Add `delta` to the counter at `key`, treating an absent counter as zero.
    Increment {
        /// Counter key.
        key: String,
        /// Amount to add.
        delta: f64,
    },
}

impl BatchOperation {
    /// Returns the key this operation writes.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Increment { key, .. } => key,
        }
    }
}

/// An ordered list of staged mutations applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch of overwrites from parallel key and value lists.
    ///
    /// Returns `None` if the lists differ in length.
    #[must_use]
    pub fn from_pairs(keys: Vec<String>, values: Vec<String>) -> Option<Self> {
        if keys.len() != values.len() {
            return None;
        }
        let operations = keys
            .into_iter()
            .zip(values)
            .map(|(key, value)| BatchOperation::Set { key, value })
            .collect();
        Some(Self { operations })
    }

    /// Builds a batch of counter increments, preserving input order.
    #[must_use]
    pub fn from_increments(deltas: &[(String, f64)]) -> Self {
        let operations = deltas
            .iter()
            .map(|(key, delta)| BatchOperation::Increment { key: key.clone(), delta: *delta })
            .collect();
        Self { operations }
    }

    /// Stages an overwrite.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.operations.push(BatchOperation::Set { key: key.into(), value: value.into() });
        self
    }

    /// Stages a counter increment.
    pub fn increment(&mut self, key: impl Into<String>, delta: f64) -> &mut Self {
        self.operations.push(BatchOperation::Increment { key: key.into(), delta });
        self
    }

    /// Returns the staged operations in insertion order.
    #[must_use]
    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Returns the number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the distinct keys written by this batch, in first-touch order.
    ///
    /// This is the data-key part of the watch set; backends add their
    /// membership-set key on top.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::with_capacity(self.operations.len());
        self.operations.iter().map(BatchOperation::key).filter(|key| seen.insert(*key)).collect()
    }

    /// Returns the number of increment operations.
    #[must_use]
    pub fn increment_count(&self) -> usize {
        self.operations.iter().filter(|op| matches!(op, BatchOperation::Increment { .. })).count()
    }

    /// Resolves the batch against the current values of its keys.
    ///
    /// `current` returns the stored text for a key, or `None` if absent.
    /// Operations are applied in order, so a later operation on the same key
    /// sees the earlier one's result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if an incremented key holds
    /// text that is not a number. Nothing should be written in that case.
    pub fn stage<'a, F>(&self, mut current: F) -> StorageResult<StagedWrites>
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        let mut writes: BTreeMap<String, String> = BTreeMap::new();
        let mut results = Vec::with_capacity(self.increment_count());
        for op in &self.operations {
            match op {
                BatchOperation::Set { key, value } => {
                    writes.insert(key.clone(), value.clone());
                },
                BatchOperation::Increment { key, delta } => {
                    let base = match writes.get(key) {
                        Some(raw) => parse_counter(key, raw)?,
                        None => match current(key) {
                            Some(raw) => parse_counter(key, raw)?,
                            None => 0.0,
                        },
                    };
                    let updated = base + delta;
                    writes.insert(key.clone(), format_counter(updated));
                    results.push(updated);
                },
            }
        }
        Ok(StagedWrites { writes, results })
    }
}

/// The outcome of [`WriteBatch::stage`]: final values to write and the
/// increment results to hand back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedWrites {
    /// Final text value of every written key.
    pub writes: BTreeMap<String, String>,
    /// New value of every increment, in batch order.
    pub results: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_rejects_length_mismatch() {
        let keys = vec!["a".to_owned(), "b".to_owned()];
        let values = vec!["1".to_owned()];
        assert!(WriteBatch::from_pairs(keys, values).is_none());
    }

    #[test]
    fn test_from_pairs_preserves_order() {
        let keys = vec!["b".to_owned(), "a".to_owned()];
        let values = vec!["2".to_owned(), "1".to_owned()];
        let batch = WriteBatch::from_pairs(keys, values).expect("equal lengths");
        assert_eq!(batch.keys(), vec!["b", "a"]);
        assert_eq!(batch.increment_count(), 0);
    }

    #[test]
    fn test_keys_are_deduplicated() {
        let deltas = vec![("c".to_owned(), 1.0), ("d".to_owned(), 2.0), ("c".to_owned(), 3.0)];
        let batch = WriteBatch::from_increments(&deltas);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.keys(), vec!["c", "d"]);
        assert_eq!(batch.increment_count(), 3);
    }

    #[test]
    fn test_stage_reads_current_values() {
        let mut batch = WriteBatch::new();
        batch.increment("c", 1.5).increment("fresh", 2.0).increment("c", 1.0);
        let staged = batch.stage(|key| (key == "c").then_some("2")).expect("numeric");

        assert_eq!(staged.results, vec![3.5, 2.0, 4.5]);
        assert_eq!(staged.writes.get("c").map(String::as_str), Some("4.5"));
        assert_eq!(staged.writes.get("fresh").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_stage_set_then_increment_sees_set() {
        let mut batch = WriteBatch::new();
        batch.set("c", "10").increment("c", 1.0);
        let staged = batch.stage(|_| None).expect("numeric");
        assert_eq!(staged.results, vec![11.0]);
    }

    #[test]
    fn test_stage_rejects_non_numeric_counter() {
        let mut batch = WriteBatch::new();
        batch.increment("text", 1.0);
        let result = batch.stage(|_| Some("{}"));
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }

    #[test]
    fn test_counter_text_form() {
        assert_eq!(format_counter(3.0), "3");
        assert_eq!(format_counter(2.5), "2.5");
        assert_eq!(parse_counter("k", " 7 ").ok(), Some(7.0));
        assert!(parse_counter("k", "abc").is_err());
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert!(batch.keys().is_empty());
    }
}
