use std::collections::VecDeque;
use std::iter::Peekable;

use crate::document::{DocumentCursor, DocumentRange};

use super::{parse_error::ParseError, token::Token};

/// Python tokenizer producing logical-line structure (`Newline`, `Indent`,
/// `Dedent`) alongside ordinary tokens.
pub struct Tokenizer {
    iter: Peekable<DocumentCursor>,
    eof: DocumentRange,
    /// Tokens produced ahead of time, e.g. several dedents for one line.
    pending: VecDeque<(Token, DocumentRange)>,
    /// Indentation widths of the enclosing blocks, innermost last.
    indents: Vec<usize>,
    /// Open brackets, innermost last.
    brackets: Vec<(char, DocumentRange)>,
    at_line_start: bool,
    finished: bool,
}

impl From<DocumentCursor> for Tokenizer {
    fn from(cursor: DocumentCursor) -> Self {
        Self {
            eof: cursor.end_range(),
            iter: cursor.peekable(),
            pending: VecDeque::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            finished: false,
        }
    }
}

impl From<&str> for Tokenizer {
    fn from(input: &str) -> Self {
        Self::from(DocumentCursor::new(input.to_string()))
    }
}

impl Iterator for Tokenizer {
    type Item = Result<(Token, DocumentRange), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.pop_front() {
            return Some(Ok(token));
        }
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if result.is_err() {
            self.finished = true;
            self.pending.clear();
        }
        match result {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self.pending.pop_front().map(Ok),
            Err(err) => Some(Err(err)),
        }
    }
}

impl Tokenizer {
    fn next_token(&mut self) -> Result<Option<(Token, DocumentRange)>, ParseError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if let Some(token) = self.line_start()? {
                    return Ok(Some(token));
                }
                if !self.pending.is_empty() || self.finished {
                    return Ok(None);
                }
            }

            self.skip_whitespace();

            let Some(start) = self.iter.next() else {
                return self.finish().map(|_| None);
            };

            let token = match start.ch() {
                '\n' => {
                    if !self.brackets.is_empty() {
                        continue;
                    }
                    self.at_line_start = true;
                    Ok((Token::Newline, start))
                }
                '#' => Ok(self.comment(start)),
                '\\' => match self.iter.next_if(|s| s.ch() == '\n' || s.ch() == '\r') {
                    Some(s) => {
                        if s.ch() == '\r' {
                            self.iter.next_if(|s| s.ch() == '\n');
                        }
                        continue;
                    }
                    None => Err(ParseError::UnexpectedCharacter {
                        ch: '\\',
                        range: start,
                    }),
                },
                '\'' | '"' => self.string(start.clone(), start, ""),
                '(' | '[' | '{' => {
                    self.brackets.push((start.ch(), start.clone()));
                    Ok((Self::delimiter(start.ch()), start))
                }
                ')' | ']' | '}' => {
                    let expected = match start.ch() {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match self.brackets.last() {
                        Some((open, _)) if *open == expected => {
                            self.brackets.pop();
                            Ok((Self::delimiter(start.ch()), start))
                        }
                        _ => Err(ParseError::UnmatchedBracket {
                            ch: start.ch(),
                            range: start,
                        }),
                    }
                }
                '.' => {
                    if self.iter.peek().is_some_and(|s| s.ch().is_ascii_digit()) {
                        Ok(self.number(start))
                    } else if let Some(second) = self.iter.next_if(|s| s.ch() == '.') {
                        match self.iter.next_if(|s| s.ch() == '.') {
                            Some(third) => Ok((Token::Ellipsis, start.to(third))),
                            None => Err(ParseError::UnexpectedCharacter {
                                ch: '.',
                                range: second,
                            }),
                        }
                    } else {
                        Ok((Token::Dot, start))
                    }
                }
                ch if ch.is_ascii_digit() => Ok(self.number(start)),
                ch if ch.is_alphabetic() || ch == '_' => self.word(start),
                _ => self.operator(start),
            };
            return token.map(Some);
        }
    }

    /// Measure the indentation of a new logical line, producing `Indent`
    /// or `Dedent` tokens. Blank lines are skipped and comment-only lines
    /// produce a `Comment` without touching the indentation.
    fn line_start(&mut self) -> Result<Option<(Token, DocumentRange)>, ParseError> {
        loop {
            let mut width = 0;
            while let Some(s) = self
                .iter
                .next_if(|s| matches!(s.ch(), ' ' | '\t' | '\x0c'))
            {
                width = match s.ch() {
                    '\t' => (width / 8 + 1) * 8,
                    '\x0c' => 0,
                    _ => width + 1,
                };
            }
            match self.iter.peek().map(|s| s.ch()) {
                None => {
                    self.finish()?;
                    return Ok(None);
                }
                Some('\n') | Some('\r') => {
                    self.iter.next();
                }
                Some('#') => {
                    let start = self.iter.next().ok_or_else(|| ParseError::UnexpectedEof {
                        range: self.eof.clone(),
                    })?;
                    let comment = self.comment(start);
                    self.iter.next_if(|s| s.ch() == '\n');
                    return Ok(Some(comment));
                }
                Some(_) => {
                    self.at_line_start = false;
                    let here = match self.iter.peek() {
                        Some(range) => range.clone(),
                        None => self.eof.clone(),
                    };
                    let current = self.indents.last().copied().unwrap_or(0);
                    if width > current {
                        self.indents.push(width);
                        return Ok(Some((Token::Indent, here)));
                    }
                    while self.indents.last().is_some_and(|&w| w > width) {
                        self.indents.pop();
                        self.pending.push_back((Token::Dedent, here.clone()));
                    }
                    if self.indents.last().copied().unwrap_or(0) != width {
                        return Err(ParseError::InconsistentDedent { range: here });
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// End of input: close the last logical line and every open block.
    fn finish(&mut self) -> Result<(), ParseError> {
        if let Some((ch, range)) = self.brackets.pop() {
            return Err(ParseError::UnclosedBracket { ch, range });
        }
        if !self.finished {
            self.finished = true;
            if !self.at_line_start {
                self.pending.push_back((Token::Newline, self.eof.clone()));
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.pending.push_back((Token::Dedent, self.eof.clone()));
            }
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self
            .iter
            .next_if(|s| matches!(s.ch(), ' ' | '\t' | '\r' | '\x0c'))
            .is_some()
        {}
    }

    fn comment(&mut self, start: DocumentRange) -> (Token, DocumentRange) {
        let mut range = start;
        while let Some(s) = self.iter.next_if(|s| s.ch() != '\n' && s.ch() != '\r') {
            range = range.to(s);
        }
        (Token::Comment(range.as_str().trim_end().to_string()), range)
    }

    fn word(&mut self, start: DocumentRange) -> Result<(Token, DocumentRange), ParseError> {
        let mut range = start;
        while let Some(s) = self
            .iter
            .next_if(|s| s.ch().is_alphanumeric() || s.ch() == '_')
        {
            range = range.to(s);
        }
        let is_prefix = range.as_str().len() <= 2
            && range
                .as_str()
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'f' | 'u'));
        if is_prefix {
            if let Some(quote) = self.iter.next_if(|s| s.ch() == '\'' || s.ch() == '"') {
                let prefix = range.as_str().to_ascii_lowercase();
                return self.string(range, quote, &prefix);
            }
        }
        Ok((Token::from_word(range.as_str()), range))
    }

    fn number(&mut self, start: DocumentRange) -> (Token, DocumentRange) {
        let mut range = start;
        loop {
            let exponent = matches!(range.as_str().chars().last(), Some('e' | 'E'))
                && !range.as_str().starts_with("0x")
                && !range.as_str().starts_with("0X");
            match self.iter.next_if(|s| {
                s.ch().is_ascii_alphanumeric()
                    || s.ch() == '_'
                    || s.ch() == '.'
                    || (exponent && (s.ch() == '+' || s.ch() == '-'))
            }) {
                Some(s) => range = range.to(s),
                None => break,
            }
        }
        (Token::Number(range.as_str().to_string()), range)
    }

    /// Scan a string literal whose opening quote is `quote`. The token range
    /// starts at `start`, which includes any prefix.
    fn string(
        &mut self,
        start: DocumentRange,
        quote: DocumentRange,
        prefix: &str,
    ) -> Result<(Token, DocumentRange), ParseError> {
        let q = quote.ch();
        let mut range = start.to(quote);
        let triple = {
            let mut lookahead = self.iter.clone();
            lookahead.next().is_some_and(|s| s.ch() == q)
                && lookahead.next().is_some_and(|s| s.ch() == q)
        };
        if triple {
            for _ in 0..2 {
                if let Some(s) = self.iter.next() {
                    range = range.to(s);
                }
            }
        }
        let body_start = range.end();
        let mut body_end;
        let raw = prefix.contains('r');
        loop {
            let Some(s) = self.iter.next() else {
                return Err(ParseError::UnterminatedString { range });
            };
            body_end = s.start();
            let ch = s.ch();
            range = range.to(s);
            match ch {
                '\\' => {
                    if let Some(escaped) = self.iter.next() {
                        range = range.to(escaped);
                    }
                }
                '\n' if !triple => {
                    return Err(ParseError::UnterminatedString { range });
                }
                c if c == q => {
                    if !triple {
                        break;
                    }
                    let mut lookahead = self.iter.clone();
                    let closes = lookahead.next().is_some_and(|s| s.ch() == q)
                        && lookahead.next().is_some_and(|s| s.ch() == q);
                    if closes {
                        for _ in 0..2 {
                            if let Some(s) = self.iter.next() {
                                range = range.to(s);
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        if raw || prefix.contains('b') || prefix.contains('f') {
            return Ok((Token::PrefixedStr(range.as_str().to_string()), range));
        }
        let text = range.as_str();
        let offset = range.start();
        let body = &text[body_start - offset..body_end - offset];
        match decode_escapes(body) {
            Some(value) => Ok((Token::Str(value), range)),
            None => Ok((Token::PrefixedStr(range.as_str().to_string()), range)),
        }
    }

    fn operator(&mut self, start: DocumentRange) -> Result<(Token, DocumentRange), ParseError> {
        let ch = start.ch();
        let next_is = |iter: &mut Peekable<DocumentCursor>, c: char| iter.next_if(|s| s.ch() == c);
        let (token, range) = match ch {
            ',' => (Token::Comma, start),
            ';' => (Token::Semicolon, start),
            '~' => (Token::Tilde, start),
            ':' => match next_is(&mut self.iter, '=') {
                Some(end) => (Token::Walrus, start.to(end)),
                None => (Token::Colon, start),
            },
            '=' => match next_is(&mut self.iter, '=') {
                Some(end) => (Token::Eq, start.to(end)),
                None => (Token::Assign, start),
            },
            '!' => match next_is(&mut self.iter, '=') {
                Some(end) => (Token::NotEq, start.to(end)),
                None => return Err(ParseError::UnexpectedCharacter { ch, range: start }),
            },
            '-' => {
                if let Some(end) = next_is(&mut self.iter, '>') {
                    (Token::Arrow, start.to(end))
                } else {
                    self.maybe_augmented(start, Token::Minus)
                }
            }
            '<' => {
                if let Some(end) = next_is(&mut self.iter, '<') {
                    self.maybe_augmented(start.to(end), Token::LeftShift)
                } else if let Some(end) = next_is(&mut self.iter, '=') {
                    (Token::LessThanOrEqual, start.to(end))
                } else {
                    (Token::LessThan, start)
                }
            }
            '>' => {
                if let Some(end) = next_is(&mut self.iter, '>') {
                    self.maybe_augmented(start.to(end), Token::RightShift)
                } else if let Some(end) = next_is(&mut self.iter, '=') {
                    (Token::GreaterThanOrEqual, start.to(end))
                } else {
                    (Token::GreaterThan, start)
                }
            }
            '*' => match next_is(&mut self.iter, '*') {
                Some(end) => self.maybe_augmented(start.to(end), Token::DoubleAsterisk),
                None => self.maybe_augmented(start, Token::Asterisk),
            },
            '/' => match next_is(&mut self.iter, '/') {
                Some(end) => self.maybe_augmented(start.to(end), Token::DoubleSlash),
                None => self.maybe_augmented(start, Token::Slash),
            },
            '+' => self.maybe_augmented(start, Token::Plus),
            '%' => self.maybe_augmented(start, Token::Percent),
            '@' => self.maybe_augmented(start, Token::At),
            '&' => self.maybe_augmented(start, Token::Ampersand),
            '|' => self.maybe_augmented(start, Token::Pipe),
            '^' => self.maybe_augmented(start, Token::Caret),
            _ => return Err(ParseError::UnexpectedCharacter { ch, range: start }),
        };
        Ok((token, range))
    }

    /// Turn a binary operator into its augmented assignment form when it
    /// is directly followed by `=`.
    fn maybe_augmented(&mut self, range: DocumentRange, token: Token) -> (Token, DocumentRange) {
        match self.iter.next_if(|s| s.ch() == '=') {
            Some(end) => {
                let range = range.to(end);
                (Token::AugAssign(range.as_str().to_string()), range)
            }
            None => (token, range),
        }
    }

    fn delimiter(ch: char) -> Token {
        match ch {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            '{' => Token::LeftBrace,
            _ => Token::RightBrace,
        }
    }
}

/// Decode the escape sequences of a plain string body.
///
/// Returns `None` for escapes that are kept verbatim by the caller, such
/// as named unicode escapes.
fn decode_escapes(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            '\n' => {}
            '\r' => {
                chars.next_if_eq(&'\n');
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = escaped.to_digit(8)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value)?);
            }
            'x' | 'u' | 'U' => {
                let len = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..len).filter_map(|_| chars.next()).collect();
                if digits.len() != len {
                    return None;
                }
                let value = u32::from_str_radix(&digits, 16).ok()?;
                out.push(char::from_u32(value)?);
            }
            'N' => return None,
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}
