//! Atomic write batches.
//!
//! A [`Batch`] is an immutable, ordered sequence of put/delete mutations
//! that an engine applies as a single atomic unit. Batches are constructed
//! through [`BatchBuilder`], which validates entries before anything
//! reaches an engine; a batch that fails validation is never submitted.

use crate::error::{EngineError, EngineResult};

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Stores `value` under `key`.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The value to store.
        value: Vec<u8>,
    },
    /// Removes `key`.
    Delete {
        /// The key to remove.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// An immutable, ordered sequence of mutations applied atomically.
///
/// Entries targeting the same key apply in submission order, so the last
/// writer wins. An empty batch is legal and applies as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates a batch holding a single put.
    #[must_use]
    pub fn single_put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            ops: vec![BatchOp::Put { key, value }],
        }
    }

    /// Creates a batch holding a single delete.
    #[must_use]
    pub fn single_delete(key: Vec<u8>) -> Self {
        Self {
            ops: vec![BatchOp::Delete { key }],
        }
    }

    /// Returns the operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of operations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch contains no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Accumulates mutations into an atomic [`Batch`].
///
/// The builder is pure and synchronous: it performs no I/O and touches no
/// engine. Validation happens in [`build`](Self::build); failures are
/// reported without submitting anything.
///
/// # Example
///
/// ```rust
/// use strata_engine::BatchBuilder;
///
/// let batch = BatchBuilder::new()
///     .put(b"k2".to_vec(), b"v2".to_vec())
///     .put(b"k3".to_vec(), b"v3".to_vec())
///     .delete(b"k3".to_vec())
///     .build()
///     .unwrap();
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct BatchBuilder {
    ops: Vec<BatchOp>,
}

impl BatchBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put of `value` under `key`.
    #[must_use]
    pub fn put(mut self, key: Vec<u8>, value: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Put { key, value });
        self
    }

    /// Appends a delete of `key`.
    #[must_use]
    pub fn delete(mut self, key: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }

    /// Validates the accumulated entries and produces an immutable batch.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if any entry has an empty key.
    /// Empty values are legal.
    pub fn build(self) -> EngineResult<Batch> {
        for (index, op) in self.ops.iter().enumerate() {
            if op.key().is_empty() {
                return Err(EngineError::invalid_argument(format!(
                    "batch entry {index} has an empty key"
                )));
            }
        }
        Ok(Batch { ops: self.ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_preserves_order() {
        let batch = BatchBuilder::new()
            .put(b"a".to_vec(), b"1".to_vec())
            .put(b"b".to_vec(), b"2".to_vec())
            .delete(b"a".to_vec())
            .build()
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.ops()[2],
            BatchOp::Delete { key: b"a".to_vec() }
        );
    }

    #[test]
    fn empty_batch_is_legal() {
        let batch = BatchBuilder::new().build().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn empty_key_rejected() {
        let result = BatchBuilder::new()
            .put(b"ok".to_vec(), b"v".to_vec())
            .delete(Vec::new())
            .build();

        match result {
            Err(EngineError::InvalidArgument { message }) => {
                assert!(message.contains("entry 1"));
            }
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[test]
    fn empty_value_is_legal() {
        let batch = BatchBuilder::new()
            .put(b"k".to_vec(), Vec::new())
            .build()
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn single_op_constructors() {
        let put = Batch::single_put(b"k".to_vec(), b"v".to_vec());
        assert_eq!(put.len(), 1);

        let del = Batch::single_delete(b"k".to_vec());
        assert_eq!(del.ops()[0].key(), b"k");
    }
}
