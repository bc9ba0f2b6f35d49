//! Property-based test generators.

use proptest::collection::vec;
use proptest::prelude::*;
use strata_engine::{Batch, BatchBuilder, BatchOp};

/// Strategy for non-empty keys up to 64 bytes.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 1..=64)
}

/// Strategy for values up to 256 bytes (empty values are legal).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..=256)
}

/// Strategy for a single batch operation with a valid key.
pub fn batch_op_strategy() -> impl Strategy<Value = BatchOp> {
    prop_oneof![
        (key_strategy(), value_strategy())
            .prop_map(|(key, value)| BatchOp::Put { key, value }),
        key_strategy().prop_map(|key| BatchOp::Delete { key }),
    ]
}

/// Strategy for a valid batch of up to 32 operations.
pub fn batch_strategy() -> impl Strategy<Value = Batch> {
    vec(batch_op_strategy(), 0..=32).prop_map(|ops| {
        let mut builder = BatchBuilder::new();
        for op in ops {
            builder = match op {
                BatchOp::Put { key, value } => builder.put(key, value),
                BatchOp::Delete { key } => builder.delete(key),
            };
        }
        builder.build().expect("generated keys are non-empty")
    })
}
