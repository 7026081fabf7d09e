use std::fmt;

/// A position in source code with 0-based line and column numbers.
///
/// Columns count characters, not bytes.
#[derive(Debug, Clone, Hash, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentPosition {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for DocumentPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}
