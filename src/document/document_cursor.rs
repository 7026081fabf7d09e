use std::{fmt, sync::Arc};

use super::{DocumentPosition, document_info::DocumentInfo};

#[derive(Clone)]
pub struct DocumentCursor {
    /// The source info containing text and line starts.
    source: Arc<DocumentInfo>,
    /// The current byte offset in the source string.
    offset: usize,
    /// The byte offset where iteration should stop (exclusive).
    end: usize,
}

impl DocumentCursor {
    pub fn new(source: String) -> Self {
        let end = source.len();
        Self {
            offset: 0,
            end,
            source: Arc::new(DocumentInfo::new(source)),
        }
    }

    pub fn range(&self) -> DocumentRange {
        DocumentRange {
            source: self.source.clone(),
            start: self.offset,
            end: self.end,
        }
    }

    /// An empty range at the end of this cursor, used to point at the end of input.
    pub fn end_range(&self) -> DocumentRange {
        DocumentRange {
            source: self.source.clone(),
            start: self.end,
            end: self.end,
        }
    }
}

impl Iterator for DocumentCursor {
    type Item = DocumentRange;
    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }
        let start_offset = self.offset;
        self.source.text[self.offset..self.end]
            .chars()
            .next()
            .map(|ch| {
                self.offset += ch.len_utf8();
                DocumentRange {
                    source: self.source.clone(),
                    start: start_offset,
                    end: self.offset,
                }
            })
    }
}

/// A DocumentRange represents a range in a document.
///
/// Ranges produced by the cursor cover exactly one character; ranges are
/// widened with [`DocumentRange::to`] as tokens are assembled.
#[derive(Clone)]
pub struct DocumentRange {
    /// The source info containing the document text and line starts.
    source: Arc<DocumentInfo>,
    /// the start byte offset for this range in the document (inclusive).
    start: usize,
    /// the end byte offset for this range in the document (exclusive).
    end: usize,
}

impl DocumentRange {
    /// Get the first char from the range.
    ///
    /// Returns `'\0'` for an empty range at the end of the document.
    pub fn ch(&self) -> char {
        self.source.text[self.start..].chars().next().unwrap_or('\0')
    }

    /// Extend a range to encompass another range that occurs
    /// later in the document.
    pub fn to(self, other: DocumentRange) -> Self {
        debug_assert!(other.start >= self.start);
        debug_assert!(other.end >= self.end);
        DocumentRange {
            source: self.source,
            start: self.start,
            end: other.end,
        }
    }

    /// Extend a document range with an iterator of document ranges
    /// producing a single document range.
    pub fn extend<I>(self, iter: I) -> Self
    where
        I: IntoIterator<Item = DocumentRange>,
    {
        iter.into_iter().fold(self, |acc, range| acc.to(range))
    }

    /// Get the underlying string slice for this document range.
    pub fn as_str(&self) -> &str {
        &self.source.text[self.start..self.end]
    }

    /// Get the full source text for the document that this
    /// document range is a part of.
    pub(super) fn full_source(&self) -> &str {
        &self.source.text
    }

    /// Get a string cursor for this document range.
    pub fn cursor(&self) -> DocumentCursor {
        DocumentCursor {
            source: self.source.clone(),
            offset: self.start,
            end: self.end,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn start_position(&self) -> DocumentPosition {
        self.source.offset_to_position(self.start)
    }

    pub fn end_position(&self) -> DocumentPosition {
        self.source.offset_to_position(self.end)
    }

    pub fn contains(&self, other: &DocumentRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersection(&self, other: &DocumentRange) -> Option<DocumentRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);

        if start < end {
            Some(DocumentRange {
                source: self.source.clone(),
                start,
                end,
            })
        } else {
            None
        }
    }
}

impl fmt::Debug for DocumentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} {:?}", self.start, self.end, self.as_str())
    }
}

impl fmt::Display for DocumentRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Ranged {
    fn range(&self) -> &DocumentRange;
}

impl<T: Ranged> Ranged for &T {
    fn range(&self) -> &DocumentRange {
        (*self).range()
    }
}

impl Ranged for DocumentRange {
    fn range(&self) -> &DocumentRange {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_yields_one_range_per_char() {
        let cursor = DocumentCursor::new("aé\nb".to_string());
        let chars: Vec<char> = cursor.map(|r| r.ch()).collect();
        assert_eq!(chars, vec!['a', 'é', '\n', 'b']);
    }

    #[test]
    fn ranges_report_line_and_column() {
        let mut cursor = DocumentCursor::new("ab\ncd".to_string());
        let a = cursor.next().unwrap();
        assert_eq!(a.start_position(), DocumentPosition { line: 0, column: 0 });
        let d = cursor.last().unwrap();
        assert_eq!(d.start_position(), DocumentPosition { line: 1, column: 1 });
        assert_eq!(d.end_position(), DocumentPosition { line: 1, column: 2 });
    }

    #[test]
    fn to_widens_a_range() {
        let mut cursor = DocumentCursor::new("hello world".to_string());
        let h = cursor.next().unwrap();
        let o = cursor.nth(3).unwrap();
        assert_eq!(h.to(o).as_str(), "hello");
    }

    #[test]
    fn intersection_of_disjoint_ranges_is_none() {
        let mut cursor = DocumentCursor::new("abc".to_string());
        let a = cursor.next().unwrap();
        let c = cursor.nth(1).unwrap();
        assert!(a.intersection(&c).is_none());
        assert!(a.clone().to(c.clone()).contains(&c));
    }
}
