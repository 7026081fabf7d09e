use super::DocumentPosition;

/// Holds source text and precomputed line start offsets for
/// efficient position lookups.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    /// The source text.
    pub(super) text: String,
    /// Byte offsets where each line starts.
    /// First line always starts at 0.
    pub(super) line_starts: Vec<usize>,
}

impl DocumentInfo {
    pub fn new(text: String) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in text.char_indices() {
            if ch == '\n' {
                line_starts.push(i + ch.len_utf8());
            }
        }
        Self { text, line_starts }
    }

    /// Convert a byte offset to a position (line, column), where the
    /// column counts characters from the start of the line.
    pub fn offset_to_position(&self, offset: usize) -> DocumentPosition {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };

        let line_start_byte = self.line_starts[line_idx];
        let column = self.text[line_start_byte..offset].chars().count();

        DocumentPosition {
            line: line_idx,
            column,
        }
    }
}
