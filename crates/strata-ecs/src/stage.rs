//! Storage stages.
//!
//! Every staged storage keeps its dense data split into three contiguous
//! regions, in this order: settled, added, removed.

use std::fmt;

/// One region of a staged storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Data that survived at least one promotion.
    Settled = 0,
    /// Data inserted since the last promotion.
    Added = 1,
    /// Data erased since the last promotion; still addressable, no longer alive.
    Removed = 2,
}

impl Stage {
    /// Position of the stage's lower boundary in the offset table.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A half-open span of adjacent stages, `[begin, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageRange {
    begin: u8,
    end: u8,
}

impl StageRange {
    /// Settled only.
    pub const SETTLED: Self = Self::new(0, 1);
    /// Added this tick only.
    pub const ADDED: Self = Self::new(1, 2);
    /// Removed this tick only.
    pub const REMOVED: Self = Self::new(2, 3);
    /// Settled and added: everything alive right now.
    pub const ALIVE: Self = Self::new(0, 2);
    /// Added and removed: everything that changed this tick.
    pub const TERMINAL: Self = Self::new(1, 3);
    /// Every stage, including removed entries.
    pub const ALL: Self = Self::new(0, 3);

    const fn new(begin: u8, end: u8) -> Self {
        assert!(begin < end && end <= 3);
        Self { begin, end }
    }

    /// Index of the first stage boundary.
    #[must_use]
    pub const fn begin(self) -> usize {
        self.begin as usize
    }

    /// Index of the boundary one past the last stage.
    #[must_use]
    pub const fn end(self) -> usize {
        self.end as usize
    }

    /// Whether the range covers the given stage.
    #[must_use]
    pub const fn contains(self, stage: Stage) -> bool {
        let idx = stage as u8;
        idx >= self.begin && idx < self.end
    }
}

impl Default for StageRange {
    fn default() -> Self {
        Self::ALIVE
    }
}

impl fmt::Debug for StageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.begin, self.end) {
            (0, 1) => "SETTLED",
            (1, 2) => "ADDED",
            (2, 3) => "REMOVED",
            (0, 2) => "ALIVE",
            (1, 3) => "TERMINAL",
            _ => "ALL",
        };
        write!(f, "StageRange::{name}")
    }
}
