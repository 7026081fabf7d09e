use crate::document::{DocumentRange, Ranged};
use thiserror::Error;

use super::token::Token;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, range: DocumentRange },

    #[error("Unterminated string literal")]
    UnterminatedString { range: DocumentRange },

    #[error("Unmatched '{ch}'")]
    UnmatchedBracket { ch: char, range: DocumentRange },

    #[error("'{ch}' was never closed")]
    UnclosedBracket { ch: char, range: DocumentRange },

    #[error("Unindent does not match any outer indentation level")]
    InconsistentDedent { range: DocumentRange },

    #[error("Unexpected indent")]
    UnexpectedIndent { range: DocumentRange },

    #[error("Expected an indented block")]
    ExpectedIndentedBlock { range: DocumentRange },

    #[error("Expected '{expected}' but got '{actual}'")]
    ExpectedTokenButGot {
        expected: Token,
        actual: Token,
        range: DocumentRange,
    },

    #[error("Expected '{expected}' but reached end of file")]
    ExpectedTokenButGotEof {
        expected: Token,
        range: DocumentRange,
    },

    #[error("Unexpected '{token}'")]
    UnexpectedToken { token: Token, range: DocumentRange },

    #[error("Unexpected end of file")]
    UnexpectedEof { range: DocumentRange },

    #[error("Unsupported statement")]
    UnsupportedStatement { range: DocumentRange },
}

impl Ranged for ParseError {
    fn range(&self) -> &DocumentRange {
        match self {
            ParseError::UnexpectedCharacter { range, .. }
            | ParseError::UnterminatedString { range }
            | ParseError::UnmatchedBracket { range, .. }
            | ParseError::UnclosedBracket { range, .. }
            | ParseError::InconsistentDedent { range }
            | ParseError::UnexpectedIndent { range }
            | ParseError::ExpectedIndentedBlock { range }
            | ParseError::ExpectedTokenButGot { range, .. }
            | ParseError::ExpectedTokenButGotEof { range, .. }
            | ParseError::UnexpectedToken { range, .. }
            | ParseError::UnexpectedEof { range }
            | ParseError::UnsupportedStatement { range } => range,
        }
    }
}

impl ParseError {
    /// Whether the parser may recover from this error by keeping the
    /// offending statement as opaque text.
    ///
    /// Errors produced by the tokenizer or by the block structure are never
    /// recoverable since the extent of the statement is unknown, and neither
    /// is a statement that stops short, e.g. `x =`.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ParseError::ExpectedTokenButGot { actual: token, .. }
            | ParseError::UnexpectedToken { token, .. } => !token.ends_statement()
                && !matches!(token, Token::Indent | Token::Dedent),
            ParseError::UnsupportedStatement { .. } => true,
            _ => false,
        }
    }
}
