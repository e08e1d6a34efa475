//! Source spans and line/column locations

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A byte offset span in a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Creates a span covering `start..end`
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Byte range of the span
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length of the span in bytes
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub fn cover(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A one-based line and column position
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LineCol {
    /// Line number, starting at 1
    pub line: u32,
    /// Column number in characters, starting at 1
    pub column: u32,
}

/// Maps byte offsets to line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of each line
    line_starts: Vec<u32>,
    text: String,
}

impl LineIndex {
    /// Builds the index for `text`
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset as u32 + 1);
            }
        }
        Self {
            line_starts,
            text: text.to_string(),
        }
    }

    /// Line/column of a byte offset; offsets past the end clamp to the last position
    pub fn line_col(&self, offset: u32) -> LineCol {
        let offset = offset.min(self.text.len() as u32);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line] as usize;
        let column = self
            .text
            .get(line_start..offset as usize)
            .map_or(0, |prefix| prefix.chars().count());
        LineCol {
            line: line as u32 + 1,
            column: column as u32 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_first_line() {
        let index = LineIndex::new("x = 1\ny = 2\n");
        assert_eq!(index.line_col(0), LineCol { line: 1, column: 1 });
        assert_eq!(index.line_col(4), LineCol { line: 1, column: 5 });
    }

    #[test]
    fn test_line_col_after_newline() {
        let index = LineIndex::new("x = 1\ny = 2\n");
        assert_eq!(index.line_col(6), LineCol { line: 2, column: 1 });
        assert_eq!(index.line_col(10), LineCol { line: 2, column: 5 });
    }

    #[test]
    fn test_span_cover() {
        let joined = Span::new(4, 6).cover(Span::new(1, 5));
        assert_eq!(joined, Span::new(1, 6));
        assert_eq!(joined.len(), 5);
    }
}
