//! Debug assertion macros for promise and registry invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! in release builds. Release builds leave the corresponding misuse as
//! undefined behaviour of the protocol, exactly like the data structures
//! these checks guard.

/// Assert that a produced index is strictly greater than the previous one.
///
/// A single producer must fulfil indices in strictly increasing order; a
/// repeated index would be a double-set, a smaller one a monotonicity
/// violation. Both are programming errors.
macro_rules! debug_assert_increasing_index {
    ($prev:expr, $index:expr) => {
        debug_assert!(
            ($index as i64) > $prev,
            "promise index {} not past previous index {} (double set or out-of-order set)",
            $index,
            $prev
        )
    };
}

/// Assert that a requested index lies within the promise bounds.
macro_rules! debug_assert_index_in_bounds {
    ($index:expr, $max:expr) => {
        debug_assert!(
            $index <= $max,
            "requested index {} past maximum index {}",
            $index,
            $max
        )
    };
}

pub(crate) use debug_assert_increasing_index;
pub(crate) use debug_assert_index_in_bounds;
