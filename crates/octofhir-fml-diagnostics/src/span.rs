//! Source span and location tracking for FML parsing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// The exact source extent of a token or parse-tree node.
///
/// `start_index` and `stop_index` are byte offsets and both are inclusive, so the
/// covered text is `source[start_index..=stop_index]`. `line` and `column` address
/// the first character and are 1-based (columns count characters, not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenSpan {
    /// Line of the first character (1-based)
    pub line: usize,
    /// Column of the first character (1-based)
    pub column: usize,
    /// Byte offset of the first character
    pub start_index: usize,
    /// Byte offset of the last byte (inclusive)
    pub stop_index: usize,
}

impl TokenSpan {
    /// Create a new token span
    #[inline]
    pub const fn new(line: usize, column: usize, start_index: usize, stop_index: usize) -> Self {
        Self {
            line,
            column,
            start_index,
            stop_index,
        }
    }

    /// Length of the covered text in bytes
    #[inline]
    pub const fn len(&self) -> usize {
        self.stop_index + 1 - self.start_index
    }

    /// A token span always covers at least one byte
    #[inline]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Span from the start of `self` to the end of `other`
    #[inline]
    pub fn to(self, other: Self) -> Self {
        if other.stop_index < self.stop_index {
            return self;
        }
        Self {
            stop_index: other.stop_index,
            ..self
        }
    }

    /// Check if this span contains another span
    #[inline]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start_index <= other.start_index && other.stop_index <= self.stop_index
    }

    /// Exclusive byte range for slicing source text
    #[inline]
    pub const fn byte_range(&self) -> Range<usize> {
        self.start_index..self.stop_index + 1
    }

    /// Slice the covered text out of `source`
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.byte_range())
    }

    /// Convert to a source location
    pub const fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.start_index, self.len())
    }
}

impl fmt::Display for TokenSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source location with line and column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Byte offset from start (0-based)
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub const fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }

    /// Create a point location with length 1
    pub const fn point(line: usize, column: usize, offset: usize) -> Self {
        Self::new(line, column, offset, 1)
    }

    /// Create a location for a byte offset inside `source`
    pub fn at_offset(source: &str, offset: usize, length: usize) -> Self {
        let (line, column) = offset_to_line_col(source, offset);
        Self {
            line,
            column,
            offset,
            length,
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::new(1, 1, 0, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl From<TokenSpan> for SourceLocation {
    fn from(span: TokenSpan) -> Self {
        span.location()
    }
}

/// Convert a byte offset to line and column numbers
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_span_text_is_inclusive() {
        let source = "group tutorial";
        let span = TokenSpan::new(1, 7, 6, 13);
        assert_eq!(span.text(source), Some("tutorial"));
        assert_eq!(span.len(), 8);
    }

    #[test]
    fn test_token_span_to() {
        let a = TokenSpan::new(1, 1, 0, 4);
        let b = TokenSpan::new(2, 3, 10, 14);
        let joined = a.to(b);
        assert_eq!(joined, TokenSpan::new(1, 1, 0, 14));
        assert!(joined.contains(&a));
        assert!(joined.contains(&b));
    }

    #[test]
    fn test_offset_to_line_col() {
        let source = "line1\nline2\nline3";
        assert_eq!(offset_to_line_col(source, 0), (1, 1));
        assert_eq!(offset_to_line_col(source, 5), (1, 6));
        assert_eq!(offset_to_line_col(source, 6), (2, 1));
        assert_eq!(offset_to_line_col(source, 12), (3, 1));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(TokenSpan::new(12, 5, 100, 104).location().to_string(), "12:5");
    }
}
