pub mod ast;

pub use ast::{
    Argument, BinOp, BoolOpKind, CmpOp, Expr, Header, Literal, Module, Opaque, Provenance, Stmt,
    UnaryOp, WithItem,
};
