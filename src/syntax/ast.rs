use std::cmp::Ordering;

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// Source text the engine does not interpret.
///
/// The identifiers mentioned anywhere in the text are recorded so that the
/// binding analysis can tell when a name escapes into text it cannot
/// rewrite. The scan is deliberately coarse: words inside string literals
/// and keywords are recorded too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    pub text: String,
    pub names: Vec<String>,
}

impl Opaque {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut names: Vec<String> = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((start, ch)) = chars.next() {
            if !(ch.is_alphabetic() || ch == '_') {
                if ch.is_ascii_digit() {
                    // skip the rest of a number so that `1e5` yields no `e5`
                    while chars
                        .next_if(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
                        .is_some()
                    {}
                }
                continue;
            }
            let mut end = start + ch.len_utf8();
            while let Some((i, c)) = chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_') {
                end = i + c.len_utf8();
            }
            let name = &text[start..end];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Self { text, names }
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// An expression evaluated for its effect, e.g. `do_work()`.
    Expr(Expr),

    /// `a = b = value`. Targets are kept in source order.
    Assign { targets: Vec<Expr>, value: Expr },

    /// `target: annotation = value`, the value being optional.
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },

    /// `target op= value`
    AugAssign { target: Expr, op: BinOp, value: Expr },

    /// `assert test, msg`
    Assert { test: Expr, msg: Option<Expr> },

    /// `if test: body else: orelse`. An `elif` is an `If` that is the
    /// sole statement of its parent's `orelse`.
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },

    Pass,

    Return(Option<Expr>),

    /// Any compound statement other than `if`. The engine rewrites the
    /// expressions of its header and its body, but never drops it.
    Block { header: Header, body: Vec<Stmt> },

    /// A comment. Inline comments trail the statement before them.
    Comment { text: String, inline: bool },

    /// A simple statement the engine does not interpret.
    Other(Opaque),
}

/// The header line of a [`Stmt::Block`].
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    /// `while test:`
    While(Expr),
    /// `for target in iter:`
    For { target: Expr, iter: Expr },
    /// `with a as b, c:`
    With(Vec<WithItem>),
    /// Any other header, kept as written including its colon, e.g.
    /// `def f(a):` or `else:`.
    Other(Opaque),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub alias: Option<Expr>,
}

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Written by the author of the source.
    Source,
    /// Produced by the engine, directly or transitively from the flag value.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    MatMul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expr),
    Keyword { name: String, value: Expr },
    /// `*args`
    Star(Expr),
    /// `**kwargs`
    DoubleStar(Expr),
}

impl Argument {
    pub fn value(&self) -> &Expr {
        match self {
            Argument::Positional(value)
            | Argument::Keyword { value, .. }
            | Argument::Star(value)
            | Argument::DoubleStar(value) => value,
        }
    }

    pub fn value_mut(&mut self) -> &mut Expr {
        match self {
            Argument::Positional(value)
            | Argument::Keyword { value, .. }
            | Argument::Star(value)
            | Argument::DoubleStar(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A variable reference, e.g. `user`
    Name(String),

    /// A scalar literal, e.g. `"flag"`, `7` or `True`
    Literal {
        value: Literal,
        provenance: Provenance,
    },

    /// An object literal, e.g. `{"key": "flag"}`. Entries keep source order.
    Dict {
        entries: Vec<(Expr, Expr)>,
        provenance: Provenance,
    },

    List(Vec<Expr>),

    Tuple(Vec<Expr>),

    Set(Vec<Expr>),

    /// Attribute access, e.g. `client.variable`
    Attribute { value: Box<Expr>, attr: String },

    /// Index access, e.g. `flag["value"]`
    Subscript { value: Box<Expr>, index: Box<Expr> },

    /// `lower:upper:step`, only valid as a subscript index.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },

    Call { func: Box<Expr>, args: Vec<Argument> },

    /// `a and b and c`; always holds at least two values.
    BoolOp { op: BoolOpKind, values: Vec<Expr> },

    /// `left op1 right1 op2 right2 ...`
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CmpOp, Expr)>,
    },

    Not(Box<Expr>),

    Unary { op: UnaryOp, operand: Box<Expr> },

    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },

    /// An expression the engine does not interpret, e.g. a lambda or an
    /// f-string.
    Other(Opaque),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Literal {
            value: Literal::None,
            provenance: Provenance::Source,
        }
    }
}

impl Literal {
    /// Python truthiness of the value.
    pub fn truthy(&self) -> bool {
        match self {
            Literal::None => false,
            Literal::Bool(b) => *b,
            Literal::Int(i) => *i != 0,
            Literal::Float(f) => *f != 0.0,
            Literal::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of bools and ints.
    fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Bool(b) => Some(i64::from(*b)),
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Python `==`. Values of unrelated types are never equal.
    pub fn py_eq(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::None, Literal::None) => true,
            (Literal::Str(a), Literal::Str(b)) => a == b,
            _ => self.py_partial_cmp(other) == Some(Ordering::Equal),
        }
    }

    /// Python ordering. `None` where Python raises a `TypeError`, and for
    /// NaN.
    pub fn py_partial_cmp(&self, other: &Literal) -> Option<Ordering> {
        match (self, other) {
            (Literal::Str(a), Literal::Str(b)) => Some(a.cmp(b)),
            (Literal::Float(a), Literal::Float(b)) => a.partial_cmp(b),
            (Literal::Float(f), _) => Some(cmp_int_float(other.as_int()?, *f)?.reverse()),
            (_, Literal::Float(f)) => cmp_int_float(self.as_int()?, *f),
            _ => Some(self.as_int()?.cmp(&other.as_int()?)),
        }
    }
}

/// Exact comparison of an integer with a float. Converting the integer to
/// `f64` would round it above 2^53.
fn cmp_int_float(int: i64, float: f64) -> Option<Ordering> {
    // 2^63, exactly representable
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return None;
    }
    if float >= LIMIT {
        return Some(Ordering::Less);
    }
    if float < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = float.trunc();
    Some(int.cmp(&(whole as i64)).then_with(|| {
        if float > whole {
            Ordering::Less
        } else if float < whole {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }))
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn literal(value: Literal, provenance: Provenance) -> Self {
        Expr::Literal { value, provenance }
    }

    pub fn synthetic(value: Literal) -> Self {
        Expr::Literal {
            value,
            provenance: Provenance::Synthetic,
        }
    }

    /// The literal carried by a synthetic literal node.
    pub fn as_synthetic_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal {
                value,
                provenance: Provenance::Synthetic,
            } => Some(value),
            _ => None,
        }
    }

    pub fn is_synthetic_dict(&self) -> bool {
        matches!(
            self,
            Expr::Dict {
                provenance: Provenance::Synthetic,
                ..
            }
        )
    }

    /// Call `f` on every direct child expression.
    pub fn for_each_child<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        match self {
            Expr::Name(_) | Expr::Literal { .. } | Expr::Other(_) => {}
            Expr::Dict { entries, .. } => {
                for (key, value) in entries {
                    f(key);
                    f(value);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                items.iter().for_each(f);
            }
            Expr::Attribute { value, .. } => f(value),
            Expr::Subscript { value, index } => {
                f(value);
                f(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    f(part);
                }
            }
            Expr::Call { func, args } => {
                f(func);
                for arg in args {
                    f(arg.value());
                }
            }
            Expr::BoolOp { values, .. } => values.iter().for_each(f),
            Expr::Compare { left, comparisons } => {
                f(left);
                for (_, right) in comparisons {
                    f(right);
                }
            }
            Expr::Not(operand) | Expr::Unary { operand, .. } => f(operand),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::IfExp { test, body, orelse } => {
                f(test);
                f(body);
                f(orelse);
            }
        }
    }

    /// Call `f` on every direct child expression with mutable access.
    pub fn for_each_child_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Expr),
    {
        match self {
            Expr::Name(_) | Expr::Literal { .. } | Expr::Other(_) => {}
            Expr::Dict { entries, .. } => {
                for (key, value) in entries {
                    f(key);
                    f(value);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                items.iter_mut().for_each(f);
            }
            Expr::Attribute { value, .. } => f(value),
            Expr::Subscript { value, index } => {
                f(value);
                f(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    f(part);
                }
            }
            Expr::Call { func, args } => {
                f(func);
                for arg in args {
                    f(arg.value_mut());
                }
            }
            Expr::BoolOp { values, .. } => values.iter_mut().for_each(f),
            Expr::Compare { left, comparisons } => {
                f(left);
                for (_, right) in comparisons {
                    f(right);
                }
            }
            Expr::Not(operand) | Expr::Unary { operand, .. } => f(operand),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::IfExp { test, body, orelse } => {
                f(test);
                f(body);
                f(orelse);
            }
        }
    }

    /// Recursively traverses this expression and all nested expressions
    pub fn traverse<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        f(self);
        self.for_each_child(&mut |child| child.traverse(f));
    }
}

impl Stmt {
    /// Call `f` on every expression held directly by this statement.
    /// Expressions of nested statements are not visited.
    pub fn for_each_expr<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        match self {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => f(expr),
            Stmt::Assign { targets, value } => {
                targets.iter().for_each(&mut *f);
                f(value);
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                f(target);
                f(annotation);
                value.iter().for_each(f);
            }
            Stmt::AugAssign { target, value, .. } => {
                f(target);
                f(value);
            }
            Stmt::Assert { test, msg } => {
                f(test);
                msg.iter().for_each(f);
            }
            Stmt::If { test, .. } => f(test),
            Stmt::Block { header, .. } => match header {
                Header::While(test) => f(test),
                Header::For { target, iter } => {
                    f(target);
                    f(iter);
                }
                Header::With(items) => {
                    for item in items {
                        f(&item.context);
                        item.alias.iter().for_each(&mut *f);
                    }
                }
                Header::Other(_) => {}
            },
            Stmt::Pass | Stmt::Return(None) | Stmt::Comment { .. } | Stmt::Other(_) => {}
        }
    }

    /// Call `f` on every expression held directly by this statement with
    /// mutable access.
    pub fn for_each_expr_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Expr),
    {
        match self {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => f(expr),
            Stmt::Assign { targets, value } => {
                targets.iter_mut().for_each(&mut *f);
                f(value);
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                f(target);
                f(annotation);
                value.iter_mut().for_each(f);
            }
            Stmt::AugAssign { target, value, .. } => {
                f(target);
                f(value);
            }
            Stmt::Assert { test, msg } => {
                f(test);
                msg.iter_mut().for_each(f);
            }
            Stmt::If { test, .. } => f(test),
            Stmt::Block { header, .. } => match header {
                Header::While(test) => f(test),
                Header::For { target, iter } => {
                    f(target);
                    f(iter);
                }
                Header::With(items) => {
                    for item in items {
                        f(&mut item.context);
                        item.alias.iter_mut().for_each(&mut *f);
                    }
                }
                Header::Other(_) => {}
            },
            Stmt::Pass | Stmt::Return(None) | Stmt::Comment { .. } | Stmt::Other(_) => {}
        }
    }

    /// The statement lists nested directly inside this statement.
    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match self {
            Stmt::If { body, orelse, .. } => vec![body, orelse],
            Stmt::Block { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Traverse this statement and all nested statements with a closure
    pub fn traverse<F>(&self, f: &mut F)
    where
        F: FnMut(&Stmt),
    {
        f(self);
        match self {
            Stmt::If { body, orelse, .. } => {
                for stmt in body.iter().chain(orelse) {
                    stmt.traverse(f);
                }
            }
            Stmt::Block { body, .. } => {
                for stmt in body {
                    stmt.traverse(f);
                }
            }
            _ => {}
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Stmt::Comment { .. })
    }
}

impl Module {
    /// Call `f` on every expression of every statement, nested ones included.
    pub fn for_each_expr_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Expr),
    {
        fn visit<F: FnMut(&mut Expr)>(stmts: &mut [Stmt], f: &mut F) {
            for stmt in stmts {
                stmt.for_each_expr_mut(f);
                for body in stmt.bodies_mut() {
                    visit(body, f);
                }
            }
        }
        visit(&mut self.body, f);
    }

    /// Traverse every statement of the module, nested ones included.
    pub fn traverse<F>(&self, f: &mut F)
    where
        F: FnMut(&Stmt),
    {
        for stmt in &self.body {
            stmt.traverse(f);
        }
    }
}
