//! Integer frame ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive integer frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    /// First frame.
    pub start: i32,
    /// Last frame.
    pub end: i32,
}

impl FrameRange {
    /// Creates a range as given, possibly reversed.
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Returns the range with `start <= end`.
    pub fn normalized(self) -> Self {
        if self.start > self.end {
            Self::new(self.end, self.start)
        } else {
            self
        }
    }

    /// True when start is after end.
    pub fn is_reversed(&self) -> bool {
        self.start > self.end
    }

    /// Number of frames spanned, `end - start`, as written to logs.
    pub fn span(&self) -> i32 {
        self.end - self.start
    }

    /// Iterates every integer frame of the normalized range.
    pub fn frames(&self) -> impl Iterator<Item = i32> {
        let r = self.normalized();
        r.start..=r.end
    }

    /// True when `frame` lies inside the normalized range.
    pub fn contains(&self, frame: f64) -> bool {
        let r = self.normalized();
        frame >= f64::from(r.start) && frame <= f64::from(r.end)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_swaps_reversed() {
        let r = FrameRange::new(20, 10);
        assert!(r.is_reversed());
        assert_eq!(r.normalized(), FrameRange::new(10, 20));
        assert_eq!(r.frames().count(), 11);
    }

    #[test]
    fn test_contains_and_display() {
        let r = FrameRange::new(1, 5);
        assert!(r.contains(1.0));
        assert!(r.contains(5.0));
        assert!(!r.contains(5.5));
        assert_eq!(r.to_string(), "1-5");
        assert_eq!(r.span(), 4);
    }
}
