//! Source positions, ranges and file locations.
//!
//! Every artifact produced by the compiler and the linker carries its place of
//! origin so that diagnostics can be rendered against the source text long
//! after the text itself has been dropped. Positions are zero-based
//! line/column pairs, ranges are ordered position pairs and locations bind a
//! range to the file it came from. All three are plain serialisable values
//! because they are persisted inside objectfiles.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A zero-based line/column position inside a source file.
///
/// Columns count UTF-8 bytes from the start of the line, which is sufficient
/// for range arithmetic and stable across serialisation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line index
    pub line: u32,
    /// Zero-based column in bytes
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

/// A half-open span of source text between two positions with `start <= end`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Creates a range, swapping the endpoints when they arrive out of order.
    pub fn new(start: Position, end: Position) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Returns true if `position` lies inside the range. Both endpoints are
    /// treated as inclusive so that a cursor sitting directly behind a token
    /// still hits it.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Returns true if `other` lies completely inside this range.
    pub fn includes(&self, other: &Range) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    /// Size of the range as a `(line span, column span)` pair. Ordering these
    /// tuples lexicographically orders ranges by extent.
    pub fn length(&self) -> (u32, u32) {
        let lines = self.end.line - self.start.line;
        let characters = if lines == 0 {
            self.end.character.saturating_sub(self.start.character)
        } else {
            self.end.character
        };
        (lines, characters)
    }

    /// The smallest range covering both inputs.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A range bound to the file that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub range: Range,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, range: Range) -> Self {
        Self { path: path.into(), range }
    }

    /// Rebinds the location to a different range in the same file.
    pub fn with_range(&self, range: Range) -> Self {
        Self { path: self.path.clone(), range }
    }

    pub fn contains(&self, path: &Path, position: Position) -> bool {
        self.path == path && self.range.contains(position)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.range.start)
    }
}
