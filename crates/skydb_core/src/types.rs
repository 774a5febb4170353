//! Core type definitions for SkyDB.

use std::fmt;

/// Identifier grouping events into a path. Zero is reserved.
pub type ObjectId = u64;

/// Event timestamp.
pub type Timestamp = i64;

/// Structural version of a data file.
///
/// Bumped on every mutation that moves bytes or remaps the region. Pointers
/// handed out by the block layer remember the generation they were made at
/// and are refused once it has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// Creates a new generation.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw generation value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_next() {
        let g = Generation::new(5);
        assert_eq!(g.next().as_u64(), 6);
        assert!(g < g.next());
    }

    #[test]
    fn generation_display() {
        assert_eq!(format!("{}", Generation::new(42)), "gen:42");
    }
}
