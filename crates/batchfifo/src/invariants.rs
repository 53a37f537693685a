//! Debug assertion macros for queue invariants.
//!
//! Only active in debug builds; release builds pay nothing.

/// Assert that an occupancy count stays within capacity.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "occupancy {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the number of terminated producers never exceeds the number
/// of registered producers.
macro_rules! debug_assert_termination_count {
    ($done:expr, $producers:expr) => {
        debug_assert!(
            $done <= $producers,
            "{} producers terminated but only {} registered (double terminate)",
            $done,
            $producers
        )
    };
}

/// Assert that a chunk claim stays within the chunk's slot window.
macro_rules! debug_assert_claim_in_window {
    ($start:expr, $take:expr, $capacity:expr) => {
        debug_assert!(
            $start + $take <= $capacity,
            "claimed slots {}..{} past chunk capacity {}",
            $start,
            $start + $take,
            $capacity
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_claim_in_window;
pub(crate) use debug_assert_termination_count;
