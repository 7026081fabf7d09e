use crate::document::{DocumentCursor, DocumentRange};
use crate::syntax::{
    Argument, BinOp, BoolOpKind, CmpOp, Expr, Header, Literal, Module, Opaque, Provenance, Stmt,
    UnaryOp, WithItem,
};

use super::parse_error::ParseError;
use super::token::Token;
use super::tokenizer::Tokenizer;

/// Keywords that open a compound statement the engine keeps as a `Block`.
const COMPOUND_KEYWORDS: [&str; 9] = [
    "def", "class", "for", "while", "with", "try", "except", "finally", "async",
];

/// Number of binary operator precedence levels, see `binary_operator`.
const BINARY_LEVELS: usize = 6;

/// Parse a Python source file.
pub fn parse(source: &str) -> Result<Module, ParseError> {
    Parser::new(source)?.parse_module()
}

pub struct Parser {
    tokens: Vec<(Token, DocumentRange)>,
    pos: usize,
    eof: DocumentRange,
    /// Start offsets of comments written inside brackets. They are dropped
    /// from the token stream, so statements containing them are kept as
    /// opaque text to preserve the comments.
    nested_comments: Vec<usize>,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let cursor = DocumentCursor::new(source.to_string());
        let eof = cursor.end_range();
        let mut tokens = Vec::new();
        let mut nested_comments = Vec::new();
        let mut depth = 0usize;
        for result in Tokenizer::from(cursor) {
            let (token, range) = result?;
            match token {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                Token::RightParen | Token::RightBracket | Token::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                Token::Comment(_) if depth > 0 => {
                    nested_comments.push(range.start());
                    continue;
                }
                _ => {}
            }
            tokens.push((token, range));
        }
        Ok(Self {
            tokens,
            pos: 0,
            eof,
            nested_comments,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(token, _)| token)
    }

    fn peek_range(&self) -> DocumentRange {
        match self.tokens.get(self.pos) {
            Some((_, range)) => range.clone(),
            None => self.eof.clone(),
        }
    }

    fn advance(&mut self) -> Option<(Token, DocumentRange)> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn advance_if(&mut self, token: &Token) -> Option<DocumentRange> {
        match self.tokens.get(self.pos) {
            Some((t, range)) if t == token => {
                let range = range.clone();
                self.pos += 1;
                Some(range)
            }
            _ => None,
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<DocumentRange, ParseError> {
        match self.advance() {
            Some((token, range)) if token == *expected => Ok(range),
            Some((actual, range)) => Err(ParseError::ExpectedTokenButGot {
                expected: expected.clone(),
                actual,
                range,
            }),
            None => Err(ParseError::ExpectedTokenButGotEof {
                expected: expected.clone(),
                range: self.eof.clone(),
            }),
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.tokens.get(self.pos) {
            Some((token, range)) => ParseError::UnexpectedToken {
                token: token.clone(),
                range: range.clone(),
            },
            None => ParseError::UnexpectedEof {
                range: self.eof.clone(),
            },
        }
    }

    fn at_statement_end(&self) -> bool {
        self.peek().is_none_or(Token::ends_statement)
    }

    fn expect_statement_end(&self) -> Result<(), ParseError> {
        if self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Source text covered by the tokens in `start..end`.
    fn text(&self, start: usize, end: usize) -> String {
        if end <= start {
            return String::new();
        }
        match (self.tokens.get(start), self.tokens.get(end - 1)) {
            (Some((_, first)), Some((_, last))) => {
                first.clone().to(last.clone()).as_str().to_string()
            }
            _ => String::new(),
        }
    }

    fn spans_nested_comment(&self, start: usize, end: usize) -> bool {
        if end <= start {
            return false;
        }
        let (Some((_, first)), Some((_, last))) = (self.tokens.get(start), self.tokens.get(end - 1))
        else {
            return false;
        };
        let (from, to) = (first.start(), last.end());
        self.nested_comments
            .iter()
            .any(|&offset| offset >= from && offset < to)
    }

    /// Index of the colon ending the compound statement header that starts
    /// at the current position, if the current line has one.
    fn header_colon(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut lambdas = 0usize;
        for (i, (token, _)) in self.tokens.iter().enumerate().skip(self.pos) {
            match token {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                Token::RightParen | Token::RightBracket | Token::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                Token::Lambda if depth == 0 => lambdas += 1,
                Token::Colon if depth == 0 && lambdas > 0 => lambdas -= 1,
                Token::Colon if depth == 0 => return Some(i),
                Token::Newline => return None,
                _ => {}
            }
        }
        None
    }

    fn missing_colon(&self) -> ParseError {
        let end = self.tokens[self.pos..]
            .iter()
            .find(|(token, _)| token.ends_statement());
        match end {
            Some((actual, range)) => ParseError::ExpectedTokenButGot {
                expected: Token::Colon,
                actual: actual.clone(),
                range: range.clone(),
            },
            None => ParseError::ExpectedTokenButGotEof {
                expected: Token::Colon,
                range: self.eof.clone(),
            },
        }
    }

    fn at_block_header(&self) -> bool {
        match self.peek() {
            Some(Token::Keyword(word)) if COMPOUND_KEYWORDS.contains(&word.as_str()) => true,
            Some(Token::Else) => true,
            _ => self.header_colon().is_some_and(|colon| {
                matches!(
                    self.tokens.get(colon + 1),
                    Some((Token::Newline | Token::Comment(_), _))
                )
            }),
        }
    }

    /// Advance past a bracketed group starting at the current token.
    fn skip_brackets(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            match self.advance() {
                Some((Token::LeftParen | Token::LeftBracket | Token::LeftBrace, _)) => depth += 1,
                Some((Token::RightParen | Token::RightBracket | Token::RightBrace, _)) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => {
                    return Err(ParseError::UnexpectedEof {
                        range: self.eof.clone(),
                    });
                }
            }
        }
    }

    // module = statement* Eof
    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut body = Vec::new();
        while self.peek().is_some() {
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        match self.peek() {
            Some(Token::Comment(text)) => {
                let text = text.clone();
                self.pos += 1;
                Ok(vec![Stmt::Comment {
                    text,
                    inline: false,
                }])
            }
            Some(Token::Newline) => {
                self.pos += 1;
                Ok(Vec::new())
            }
            Some(Token::If) => Ok(vec![self.parse_if()?]),
            Some(Token::Indent) => Err(ParseError::UnexpectedIndent {
                range: self.peek_range(),
            }),
            Some(Token::Elif | Token::Dedent) => Err(self.unexpected()),
            _ if self.at_block_header() => Ok(vec![self.parse_block()?]),
            _ => self.parse_simple_statements(),
        }
    }

    // if = ("if" | "elif") test ":" suite ( elif | "else" ":" suite )?
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let test = self.parse_header_test()?;
        self.expect_token(&Token::Colon)?;
        let body = self.parse_suite()?;
        let orelse = match (self.peek(), self.peek_nth(1)) {
            (Some(Token::Elif), _) => vec![self.parse_if()?],
            (Some(Token::Else), Some(Token::Colon)) => {
                self.pos += 2;
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt::If { test, body, orelse })
    }

    /// Parse the test of an `if` or `elif`, keeping it as opaque text when
    /// it falls outside the supported expression syntax.
    fn parse_header_test(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        match self.parse_test() {
            Ok(expr)
                if self.peek() == Some(&Token::Colon)
                    && !self.spans_nested_comment(start, self.pos) =>
            {
                Ok(expr)
            }
            Ok(_) => self.parse_opaque_test(start),
            Err(err) if err.is_recoverable() => self.parse_opaque_test(start),
            Err(err) => Err(err),
        }
    }

    fn parse_opaque_test(&mut self, start: usize) -> Result<Expr, ParseError> {
        self.pos = start;
        let colon = self.header_colon().ok_or_else(|| self.missing_colon())?;
        if colon == start {
            return Err(self.unexpected());
        }
        let text = self.text(start, colon);
        self.pos = colon;
        Ok(Expr::Other(Opaque::new(text)))
    }

    // block = header ":" suite
    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pos;
        let colon = self.header_colon().ok_or_else(|| self.missing_colon())?;
        let header = match self.parse_header() {
            Ok(header) if self.pos == colon && !self.spans_nested_comment(start, colon) => header,
            _ => Header::Other(Opaque::new(self.text(start, colon + 1))),
        };
        self.pos = colon + 1;
        let body = self.parse_suite()?;
        Ok(Stmt::Block { header, body })
    }

    // header = "while" test
    //        | "for" target_list "in" expr_list
    //        | "with" test ("as" binary)? ("," test ("as" binary)?)*
    fn parse_header(&mut self) -> Result<Header, ParseError> {
        let keyword = match self.peek() {
            Some(Token::Keyword(word)) if matches!(word.as_str(), "while" | "for" | "with") => {
                word.clone()
            }
            _ => {
                return Err(ParseError::UnsupportedStatement {
                    range: self.peek_range(),
                });
            }
        };
        self.pos += 1;
        match keyword.as_str() {
            "while" => Ok(Header::While(self.parse_test()?)),
            "for" => {
                let target_start = self.pos;
                let target = self.parse_target_list()?;
                if !is_assignable(&target) {
                    return Err(ParseError::UnsupportedStatement {
                        range: self.tokens[target_start].1.clone(),
                    });
                }
                self.expect_token(&Token::In)?;
                let iter = self.parse_expr_list()?;
                Ok(Header::For { target, iter })
            }
            _ => {
                let mut items = Vec::new();
                loop {
                    let context = self.parse_test()?;
                    let alias = match self.peek() {
                        Some(Token::Keyword(word)) if word == "as" => {
                            self.pos += 1;
                            Some(self.parse_binary(0)?)
                        }
                        _ => None,
                    };
                    items.push(WithItem { context, alias });
                    if self.advance_if(&Token::Comma).is_none() {
                        break;
                    }
                }
                Ok(Header::With(items))
            }
        }
    }

    // target_list = binary ("," binary)* ","?
    fn parse_target_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_binary(0)?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.advance_if(&Token::Comma).is_some() {
            if self.peek() == Some(&Token::In) {
                break;
            }
            items.push(self.parse_binary(0)?);
        }
        Ok(Expr::Tuple(items))
    }

    // suite = comment? Newline comment* Indent statement+ Dedent
    //       | simple_statements
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        if let Some(Token::Comment(text)) = self.peek() {
            body.push(Stmt::Comment {
                text: text.clone(),
                inline: true,
            });
            self.pos += 1;
        }
        if self.advance_if(&Token::Newline).is_none() {
            body.extend(self.parse_simple_statements()?);
            return Ok(body);
        }
        while let Some(Token::Comment(text)) = self.peek() {
            body.push(Stmt::Comment {
                text: text.clone(),
                inline: false,
            });
            self.pos += 1;
        }
        if self.advance_if(&Token::Indent).is_none() {
            return Err(ParseError::ExpectedIndentedBlock {
                range: self.peek_range(),
            });
        }
        loop {
            match self.peek() {
                Some(Token::Dedent) => {
                    self.pos += 1;
                    break;
                }
                None => break,
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    // simple_statements = simple (";" simple)* ";"? comment? Newline
    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = vec![self.parse_simple_statement()?];
        while self.advance_if(&Token::Semicolon).is_some() {
            if self.at_statement_end() {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }
        if let Some(Token::Comment(text)) = self.peek() {
            stmts.push(Stmt::Comment {
                text: text.clone(),
                inline: true,
            });
            self.pos += 1;
        }
        match self.advance() {
            Some((Token::Newline, _)) | None => Ok(stmts),
            Some((token, range)) => Err(ParseError::UnexpectedToken { token, range }),
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pos;
        match self.parse_interpreted_statement(start) {
            Ok(stmt) if !self.spans_nested_comment(start, self.pos) => Ok(stmt),
            Ok(_) => self.parse_opaque_statement(start),
            Err(err) if err.is_recoverable() => self.parse_opaque_statement(start),
            Err(err) => Err(err),
        }
    }

    fn parse_opaque_statement(&mut self, start: usize) -> Result<Stmt, ParseError> {
        self.pos = start;
        while !self.at_statement_end() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(Stmt::Other(Opaque::new(self.text(start, self.pos))))
    }

    fn parse_interpreted_statement(&mut self, start: usize) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Pass) => {
                self.pos += 1;
                self.expect_statement_end()?;
                Ok(Stmt::Pass)
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expr_list()?)
                };
                self.expect_statement_end()?;
                Ok(Stmt::Return(value))
            }
            Some(Token::Keyword(word)) if word == "assert" => {
                self.pos += 1;
                let test = self.parse_test()?;
                let msg = if self.advance_if(&Token::Comma).is_some() {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                self.expect_statement_end()?;
                Ok(Stmt::Assert { test, msg })
            }
            Some(Token::Keyword(_)) => Err(ParseError::UnsupportedStatement {
                range: self.peek_range(),
            }),
            _ => {
                let first = self.parse_expr_list()?;
                if self.advance_if(&Token::Colon).is_some() {
                    let annotation = self.parse_test()?;
                    let value = if self.advance_if(&Token::Assign).is_some() {
                        Some(self.parse_expr_list()?)
                    } else {
                        None
                    };
                    self.expect_statement_end()?;
                    if !is_single_target(&first) {
                        return Err(ParseError::UnsupportedStatement {
                            range: self.tokens[start].1.clone(),
                        });
                    }
                    return Ok(Stmt::AnnAssign {
                        target: first,
                        annotation,
                        value,
                    });
                }
                if let Some(Token::AugAssign(op)) = self.peek() {
                    let op = augmented_operator(op).ok_or_else(|| {
                        ParseError::UnsupportedStatement {
                            range: self.peek_range(),
                        }
                    })?;
                    self.pos += 1;
                    let value = self.parse_expr_list()?;
                    self.expect_statement_end()?;
                    if !is_single_target(&first) {
                        return Err(ParseError::UnsupportedStatement {
                            range: self.tokens[start].1.clone(),
                        });
                    }
                    return Ok(Stmt::AugAssign {
                        target: first,
                        op,
                        value,
                    });
                }
                if self.peek() != Some(&Token::Assign) {
                    self.expect_statement_end()?;
                    return Ok(Stmt::Expr(first));
                }
                let mut targets = vec![first];
                while self.advance_if(&Token::Assign).is_some() {
                    targets.push(self.parse_expr_list()?);
                }
                self.expect_statement_end()?;
                let Some(value) = targets.pop() else {
                    return Err(self.unexpected());
                };
                if !targets.iter().all(is_assignable) {
                    return Err(ParseError::UnsupportedStatement {
                        range: self.tokens[start].1.clone(),
                    });
                }
                Ok(Stmt::Assign { targets, value })
            }
        }
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek(),
            None | Some(
                Token::Newline
                    | Token::Semicolon
                    | Token::Comment(_)
                    | Token::Assign
                    | Token::AugAssign(_)
                    | Token::Colon
                    | Token::RightParen
                    | Token::RightBracket
                    | Token::RightBrace
            )
        )
    }

    // expr_list = test ("," test)* ","?
    fn parse_expr_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_test()?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.advance_if(&Token::Comma).is_some() {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    // test = lambda | or ("if" or "else" test)?
    fn parse_test(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Lambda) {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if self.advance_if(&Token::If).is_none() {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.expect_token(&Token::Else)?;
        let orelse = self.parse_test()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    /// Lambdas are kept as opaque text.
    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut depth = 0usize;
        loop {
            match self.advance() {
                Some((Token::LeftParen | Token::LeftBracket | Token::LeftBrace, _)) => depth += 1,
                Some((Token::RightParen | Token::RightBracket | Token::RightBrace, _)) => {
                    depth = depth.saturating_sub(1)
                }
                Some((Token::Colon, _)) if depth == 0 => break,
                Some((token, range)) if depth == 0 && token.ends_statement() => {
                    return Err(ParseError::UnexpectedToken { token, range });
                }
                Some(_) => {}
                None => {
                    return Err(ParseError::UnexpectedEof {
                        range: self.eof.clone(),
                    });
                }
            }
        }
        self.parse_test()?;
        Ok(Expr::Other(Opaque::new(self.text(start, self.pos))))
    }

    // or = and ("or" and)*
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut values = vec![self.parse_and()?];
        while self.advance_if(&Token::Or).is_some() {
            values.push(self.parse_and()?);
        }
        Ok(bool_op(BoolOpKind::Or, values))
    }

    // and = not ("and" not)*
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut values = vec![self.parse_not()?];
        while self.advance_if(&Token::And).is_some() {
            values.push(self.parse_not()?);
        }
        Ok(bool_op(BoolOpKind::And, values))
    }

    // not = "not" not | comparison
    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.advance_if(&Token::Not).is_some() {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    // comparison = binary (cmp_op binary)*
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_binary(0)?;
        let mut comparisons = Vec::new();
        while let Some(op) = self.advance_comparison_operator() {
            comparisons.push((op, self.parse_binary(0)?));
        }
        if comparisons.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            comparisons,
        })
    }

    fn advance_comparison_operator(&mut self) -> Option<CmpOp> {
        let (op, len) = match (self.peek(), self.peek_nth(1)) {
            (Some(Token::Eq), _) => (CmpOp::Eq, 1),
            (Some(Token::NotEq), _) => (CmpOp::NotEq, 1),
            (Some(Token::LessThan), _) => (CmpOp::Lt, 1),
            (Some(Token::LessThanOrEqual), _) => (CmpOp::LtE, 1),
            (Some(Token::GreaterThan), _) => (CmpOp::Gt, 1),
            (Some(Token::GreaterThanOrEqual), _) => (CmpOp::GtE, 1),
            (Some(Token::In), _) => (CmpOp::In, 1),
            (Some(Token::Not), Some(Token::In)) => (CmpOp::NotIn, 2),
            (Some(Token::Is), Some(Token::Not)) => (CmpOp::IsNot, 2),
            (Some(Token::Is), _) => (CmpOp::Is, 1),
            _ => return None,
        };
        self.pos += len;
        Some(op)
    }

    // binary = binary(level + 1) (op(level) binary(level + 1))*
    fn parse_binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level == BINARY_LEVELS {
            return self.parse_factor();
        }
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.peek().and_then(|token| binary_operator(token, level)) {
            self.pos += 1;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    // factor = ("-" | "+" | "~") factor | power
    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            Some(Token::Tilde) => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.parse_factor()?),
        })
    }

    // power = primary ("**" factor)?
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if self.advance_if(&Token::DoubleAsterisk).is_none() {
            return Ok(base);
        }
        let exponent = self.parse_factor()?;
        Ok(Expr::Binary {
            left: Box::new(base),
            op: BinOp::Pow,
            right: Box::new(exponent),
        })
    }

    // primary = atom ("." Name | "(" arguments ")" | "[" subscript "]")*
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some((Token::Name(attr), _)) => {
                            expr = Expr::Attribute {
                                value: Box::new(expr),
                                attr,
                            }
                        }
                        Some((token, range)) => {
                            return Err(ParseError::UnexpectedToken { token, range });
                        }
                        None => {
                            return Err(ParseError::UnexpectedEof {
                                range: self.eof.clone(),
                            });
                        }
                    }
                }
                Some(Token::LeftParen) => {
                    let open = self.pos;
                    match self.parse_arguments() {
                        Ok(args) => {
                            expr = Expr::Call {
                                func: Box::new(expr),
                                args,
                            }
                        }
                        Err(err) if err.is_recoverable() => {
                            self.pos = open;
                            self.skip_brackets()?;
                            expr = Expr::Other(Opaque::new(self.text(start, self.pos)));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Some(Token::LeftBracket) => {
                    self.pos += 1;
                    let index = self.parse_subscript()?;
                    self.expect_token(&Token::RightBracket)?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    // arguments = "(" (argument ("," argument)* ","?)? ")"
    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        self.expect_token(&Token::LeftParen)?;
        let mut args = Vec::new();
        while self.peek() != Some(&Token::RightParen) {
            let arg = match (self.peek(), self.peek_nth(1)) {
                (Some(Token::Asterisk), _) => {
                    self.pos += 1;
                    Argument::Star(self.parse_test()?)
                }
                (Some(Token::DoubleAsterisk), _) => {
                    self.pos += 1;
                    Argument::DoubleStar(self.parse_test()?)
                }
                (Some(Token::Name(name)), Some(Token::Assign)) => {
                    let name = name.clone();
                    self.pos += 2;
                    Argument::Keyword {
                        name,
                        value: self.parse_test()?,
                    }
                }
                _ => Argument::Positional(self.parse_test()?),
            };
            args.push(arg);
            if self.advance_if(&Token::Comma).is_none() {
                break;
            }
        }
        self.expect_token(&Token::RightParen)?;
        Ok(args)
    }

    // subscript = slice ("," slice)* ","?
    fn parse_subscript(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_slice()?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.advance_if(&Token::Comma).is_some() {
            if self.peek() == Some(&Token::RightBracket) {
                break;
            }
            items.push(self.parse_slice()?);
        }
        Ok(Expr::Tuple(items))
    }

    // slice = test | test? ":" test? (":" test?)?
    fn parse_slice(&mut self) -> Result<Expr, ParseError> {
        let lower = if self.peek() == Some(&Token::Colon) {
            None
        } else {
            Some(self.parse_test()?)
        };
        if self.advance_if(&Token::Colon).is_none() {
            return lower.ok_or_else(|| self.unexpected());
        }
        let upper = if self.slice_part_follows() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        let step = if self.advance_if(&Token::Colon).is_some() && self.slice_part_follows() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::Slice {
            lower: lower.map(Box::new),
            upper,
            step,
        })
    }

    fn slice_part_follows(&self) -> bool {
        !matches!(
            self.peek(),
            None | Some(Token::Colon | Token::Comma | Token::RightBracket)
        )
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let Some((token, range)) = self.advance() else {
            return Err(ParseError::UnexpectedEof {
                range: self.eof.clone(),
            });
        };
        match token {
            Token::Name(name) => Ok(Expr::Name(name)),
            Token::Number(raw) => Ok(number_literal(&raw)),
            Token::Str(_) | Token::PrefixedStr(_) => {
                self.pos -= 1;
                Ok(self.parse_strings())
            }
            Token::None => Ok(Expr::literal(Literal::None, Provenance::Source)),
            Token::True => Ok(Expr::literal(Literal::Bool(true), Provenance::Source)),
            Token::False => Ok(Expr::literal(Literal::Bool(false), Provenance::Source)),
            Token::Ellipsis => Ok(Expr::Other(Opaque::new("..."))),
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => {
                let open = self.pos - 1;
                match self.parse_display(&token) {
                    Ok(expr) => Ok(expr),
                    Err(err) if err.is_recoverable() => {
                        // comprehensions, starred items and the like
                        self.pos = open;
                        self.skip_brackets()?;
                        Ok(Expr::Other(Opaque::new(self.text(open, self.pos))))
                    }
                    Err(err) => Err(err),
                }
            }
            token => Err(ParseError::UnexpectedToken { token, range }),
        }
    }

    /// Adjacent string literals are concatenated. Any prefixed string among
    /// them keeps the whole group verbatim.
    fn parse_strings(&mut self) -> Expr {
        let start = self.pos;
        let mut value = String::new();
        let mut verbatim = false;
        while let Some(token) = self.peek() {
            match token {
                Token::Str(s) => value.push_str(s),
                Token::PrefixedStr(_) => verbatim = true,
                _ => break,
            }
            self.pos += 1;
        }
        if verbatim {
            Expr::Other(Opaque::new(self.text(start, self.pos)))
        } else {
            Expr::literal(Literal::Str(value), Provenance::Source)
        }
    }

    // display = "(" tuple_or_parenthesized ")" | "[" items "]" | "{" dict_or_set "}"
    fn parse_display(&mut self, open: &Token) -> Result<Expr, ParseError> {
        match open {
            Token::LeftParen => {
                if self.advance_if(&Token::RightParen).is_some() {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_test()?;
                if self.advance_if(&Token::RightParen).is_some() {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.advance_if(&Token::Comma).is_some() {
                    if self.peek() == Some(&Token::RightParen) {
                        break;
                    }
                    items.push(self.parse_test()?);
                }
                self.expect_token(&Token::RightParen)?;
                Ok(Expr::Tuple(items))
            }
            Token::LeftBracket => Ok(Expr::List(self.parse_items(&Token::RightBracket)?)),
            _ => {
                if self.advance_if(&Token::RightBrace).is_some() {
                    return Ok(Expr::Dict {
                        entries: Vec::new(),
                        provenance: Provenance::Source,
                    });
                }
                let first = self.parse_test()?;
                if self.advance_if(&Token::Colon).is_none() {
                    let mut items = vec![first];
                    if self.advance_if(&Token::Comma).is_some() {
                        items.extend(self.parse_items(&Token::RightBrace)?);
                    } else {
                        self.expect_token(&Token::RightBrace)?;
                    }
                    return Ok(Expr::Set(items));
                }
                let mut entries = vec![(first, self.parse_test()?)];
                while self.advance_if(&Token::Comma).is_some() {
                    if self.peek() == Some(&Token::RightBrace) {
                        break;
                    }
                    let key = self.parse_test()?;
                    self.expect_token(&Token::Colon)?;
                    entries.push((key, self.parse_test()?));
                }
                self.expect_token(&Token::RightBrace)?;
                Ok(Expr::Dict {
                    entries,
                    provenance: Provenance::Source,
                })
            }
        }
    }

    // items = (test ("," test)* ","?)? close
    fn parse_items(&mut self, close: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while self.peek() != Some(close) {
            items.push(self.parse_test()?);
            if self.advance_if(&Token::Comma).is_none() {
                break;
            }
        }
        self.expect_token(close)?;
        Ok(items)
    }
}

fn bool_op(op: BoolOpKind, mut values: Vec<Expr>) -> Expr {
    if values.len() == 1 {
        values.pop().unwrap_or_default()
    } else {
        Expr::BoolOp { op, values }
    }
}

/// Binary operators by precedence level, loosest first.
fn binary_operator(token: &Token, level: usize) -> Option<BinOp> {
    match (level, token) {
        (0, Token::Pipe) => Some(BinOp::BitOr),
        (1, Token::Caret) => Some(BinOp::BitXor),
        (2, Token::Ampersand) => Some(BinOp::BitAnd),
        (3, Token::LeftShift) => Some(BinOp::LShift),
        (3, Token::RightShift) => Some(BinOp::RShift),
        (4, Token::Plus) => Some(BinOp::Add),
        (4, Token::Minus) => Some(BinOp::Sub),
        (5, Token::Asterisk) => Some(BinOp::Mul),
        (5, Token::Slash) => Some(BinOp::Div),
        (5, Token::DoubleSlash) => Some(BinOp::FloorDiv),
        (5, Token::Percent) => Some(BinOp::Mod),
        (5, Token::At) => Some(BinOp::MatMul),
        _ => None,
    }
}

/// The operator of an augmented assignment token such as `+=`.
fn augmented_operator(token: &str) -> Option<BinOp> {
    match token.strip_suffix('=')? {
        "+" => Some(BinOp::Add),
        "-" => Some(BinOp::Sub),
        "*" => Some(BinOp::Mul),
        "@" => Some(BinOp::MatMul),
        "/" => Some(BinOp::Div),
        "//" => Some(BinOp::FloorDiv),
        "%" => Some(BinOp::Mod),
        "**" => Some(BinOp::Pow),
        "<<" => Some(BinOp::LShift),
        ">>" => Some(BinOp::RShift),
        "|" => Some(BinOp::BitOr),
        "^" => Some(BinOp::BitXor),
        "&" => Some(BinOp::BitAnd),
        _ => None,
    }
}

fn is_single_target(target: &Expr) -> bool {
    matches!(
        target,
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
    )
}

fn is_assignable(target: &Expr) -> bool {
    match target {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
        Expr::Tuple(items) | Expr::List(items) => !items.is_empty() && items.iter().all(is_assignable),
        _ => false,
    }
}

/// Decimal integers and floats become literals. Other spellings (hex, octal,
/// binary, imaginary, out of range) are kept as written.
fn number_literal(raw: &str) -> Expr {
    let digits: String = raw.chars().filter(|c| *c != '_').collect();
    if digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(value) = digits.parse::<i64>() {
            return Expr::literal(Literal::Int(value), Provenance::Source);
        }
    } else if digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        if let Ok(value) = digits.parse::<f64>() {
            if value.is_finite() {
                return Expr::literal(Literal::Float(value), Provenance::Source);
            }
        }
    }
    Expr::Other(Opaque::new(raw))
}
