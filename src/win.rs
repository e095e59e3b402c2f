// src/win.rs
// Win detection: always derived from the marked set, never stored.

use crate::defs::{Number, WINNING_THRESHOLD};

pub fn is_winner(marked_numbers: &[Number]) -> bool {
    marked_numbers.len() == WINNING_THRESHOLD
}

/// Numbers still to mark before the card wins.
pub fn remaining(marked_numbers: &[Number]) -> usize {
    WINNING_THRESHOLD.saturating_sub(marked_numbers.len())
}
