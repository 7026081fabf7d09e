use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Name(String),
    /// A numeric literal exactly as written, e.g. `0x1F` or `1_000.5e-3`.
    Number(String),
    /// A plain or `u`-prefixed string literal with escapes decoded.
    Str(String),
    /// A string literal with an `f`, `r` or `b` prefix, kept verbatim.
    PrefixedStr(String),
    Comment(String),
    /// Reserved words the parser does not interpret, e.g. `def` or `import`.
    Keyword(String),
    Newline,
    Indent,
    Dedent,
    // Keywords
    And,
    Or,
    Not,
    If,
    Elif,
    Else,
    In,
    Is,
    None,
    True,
    False,
    Lambda,
    Pass,
    Return,
    // Operators and delimiters
    /// Augmented assignment such as `+=`.
    AugAssign(String),
    Assign,
    Walrus,
    Eq,
    NotEq,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Asterisk,
    DoubleAsterisk,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    LeftShift,
    RightShift,
    Dot,
    Ellipsis,
    Comma,
    Colon,
    Semicolon,
    Arrow,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
}

impl Token {
    /// Map a scanned identifier to its keyword token, if it is one.
    pub fn from_word(word: &str) -> Token {
        match word {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "if" => Token::If,
            "elif" => Token::Elif,
            "else" => Token::Else,
            "in" => Token::In,
            "is" => Token::Is,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            "lambda" => Token::Lambda,
            "pass" => Token::Pass,
            "return" => Token::Return,
            "as" | "assert" | "async" | "await" | "break" | "class" | "continue" | "def"
            | "del" | "except" | "finally" | "for" | "from" | "global" | "import"
            | "nonlocal" | "raise" | "try" | "while" | "with" | "yield" => {
                Token::Keyword(word.to_string())
            }
            _ => Token::Name(word.to_string()),
        }
    }

    pub fn opposite_token(&self) -> Option<Token> {
        match self {
            Token::LeftBrace => Some(Token::RightBrace),
            Token::LeftBracket => Some(Token::RightBracket),
            Token::LeftParen => Some(Token::RightParen),
            _ => None,
        }
    }

    /// Whether this token ends a simple statement.
    pub fn ends_statement(&self) -> bool {
        matches!(
            self,
            Token::Newline | Token::Semicolon | Token::Comment(_)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "{}", name),
            Token::Number(raw) => write!(f, "{}", raw),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::PrefixedStr(raw) => write!(f, "{}", raw),
            Token::Comment(text) => write!(f, "{}", text),
            Token::Keyword(word) => write!(f, "{}", word),
            Token::Newline => write!(f, "newline"),
            Token::Indent => write!(f, "indent"),
            Token::Dedent => write!(f, "dedent"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::In => write!(f, "in"),
            Token::Is => write!(f, "is"),
            Token::None => write!(f, "None"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::Lambda => write!(f, "lambda"),
            Token::Pass => write!(f, "pass"),
            Token::Return => write!(f, "return"),
            Token::AugAssign(op) => write!(f, "{}", op),
            Token::Assign => write!(f, "="),
            Token::Walrus => write!(f, ":="),
            Token::Eq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::GreaterThan => write!(f, ">"),
            Token::LessThanOrEqual => write!(f, "<="),
            Token::GreaterThanOrEqual => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::DoubleAsterisk => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::At => write!(f, "@"),
            Token::Ampersand => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::LeftShift => write!(f, "<<"),
            Token::RightShift => write!(f, ">>"),
            Token::Dot => write!(f, "."),
            Token::Ellipsis => write!(f, "..."),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::Arrow => write!(f, "->"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
        }
    }
}
