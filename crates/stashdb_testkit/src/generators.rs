//! Property-based test generators using proptest.

use crate::fixtures::Pojo;
use proptest::prelude::*;

/// Strategy for transient pojos with arbitrary payloads.
pub fn pojo_strategy() -> impl Strategy<Value = Pojo> {
    (any::<i32>(), ".{0,64}").prop_map(|(int_value, string_value)| Pojo {
        id: None,
        int_value,
        string_value,
    })
}

/// Strategy for ids usable as file stems.
pub fn stem_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,24}").expect("Invalid regex")
}

/// Strategy for a sequence of save (`true`) and delete (`false`) steps
/// over a small id space.
pub fn write_steps_strategy(ids: u8, len: usize) -> impl Strategy<Value = Vec<(bool, u8)>> {
    prop::collection::vec((any::<bool>(), 0..ids), 1..=len)
}
