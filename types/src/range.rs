//! Inclusive chain block ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range of chain block heights, `from <= to` always.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Build a range, or `None` if `from > to`.
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// The next unprocessed range after `cursor`, capped at `max_len` blocks.
    ///
    /// Returns `None` when `head <= cursor`, so a lagging or regressed head never
    /// produces an inverted range.
    pub fn following(cursor: u64, head: u64, max_len: u64) -> Option<Self> {
        let from = cursor.checked_add(1)?;
        if head < from || max_len == 0 {
            return None;
        }
        let to = head.min(from.saturating_add(max_len - 1));
        Some(Self { from, to })
    }

    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn contains(&self, height: u64) -> bool {
        height >= self.from && height <= self.to
    }

    /// Split into two halves; `None` for a single-block range.
    pub fn bisect(&self) -> Option<(Self, Self)> {
        if self.from == self.to {
            return None;
        }
        let mid = self.from + (self.to - self.from) / 2;
        Some((
            Self {
                from: self.from,
                to: mid,
            },
            Self {
                from: mid + 1,
                to: self.to,
            },
        ))
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}
