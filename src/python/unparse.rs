use std::fmt::Write as _;

use pretty::BoxDoc;
use thiserror::Error;

use crate::syntax::{
    Argument, BinOp, BoolOpKind, CmpOp, Expr, Header, Literal, Module, Stmt, UnaryOp,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SerializationError {
    #[error("Cannot write non-finite number {value} as a Python literal")]
    NonFiniteNumber { value: f64 },
}

type Doc = BoxDoc<'static, ()>;

// Binding strength of expressions, loosest first.
const LAMBDA: u8 = 0;
const TEST: u8 = 1;
const OR: u8 = 2;
const AND: u8 = 3;
const NOT: u8 = 4;
const COMPARISON: u8 = 5;
const BIT_OR: u8 = 6;
const BIT_XOR: u8 = 7;
const BIT_AND: u8 = 8;
const SHIFT: u8 = 9;
const ARITH: u8 = 10;
const TERM: u8 = 11;
const FACTOR: u8 = 12;
const POWER: u8 = 13;
const PRIMARY: u8 = 14;
const ATOM: u8 = 15;

/// Render a module as Python source.
///
/// The output is canonical: blocks are indented with four spaces, an
/// `elif` is re-formed from an `If` nested alone in an `else`, and `pass`
/// is written into any block that has no statements left.
pub fn unparse(module: &Module) -> Result<String, SerializationError> {
    if module.body.is_empty() {
        return Ok(String::new());
    }
    let doc = statements_doc(&module.body)?;
    Ok(format!("{}\n", doc.pretty(80)))
}

/// Render a single expression.
pub fn unparse_expr(expr: &Expr) -> Result<String, SerializationError> {
    top_level(expr)
}

fn statements_doc(stmts: &[Stmt]) -> Result<Doc, SerializationError> {
    let mut lines: Vec<Doc> = Vec::new();
    // Whether an inline comment can trail the last line.
    let mut attachable = false;
    for stmt in stmts {
        match stmt {
            Stmt::Comment { text, inline: true } if attachable => {
                if let Some(last) = lines.pop() {
                    lines.push(last.append(Doc::text("  ")).append(Doc::text(text.clone())));
                }
                attachable = false;
            }
            Stmt::Comment { text, .. } => {
                lines.push(Doc::text(text.clone()));
                attachable = false;
            }
            Stmt::If { test, body, orelse } => {
                lines.push(if_doc("if", test, body, orelse)?);
                attachable = false;
            }
            Stmt::Block { header, body } => {
                lines.push(suite_doc(header_text(header)?, body)?);
                attachable = false;
            }
            simple => {
                lines.push(Doc::text(simple_statement(simple)?));
                attachable = true;
            }
        }
    }
    Ok(Doc::intersperse(lines, Doc::hardline()))
}

fn if_doc(
    keyword: &str,
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
) -> Result<Doc, SerializationError> {
    let mut test_text = String::new();
    write_expr(&mut test_text, test, TEST)?;
    let doc = suite_doc(format!("{} {}:", keyword, test_text), body)?;
    Ok(match orelse {
        [] => doc,
        [Stmt::If { test, body, orelse }] => doc
            .append(Doc::hardline())
            .append(if_doc("elif", test, body, orelse)?),
        _ => doc
            .append(Doc::hardline())
            .append(suite_doc("else:".to_string(), orelse)?),
    })
}

/// A header line followed by its indented body. A leading inline comment
/// of the body trails the header.
fn suite_doc(header: String, body: &[Stmt]) -> Result<Doc, SerializationError> {
    let mut header = Doc::text(header);
    let mut rest = body;
    if let Some((Stmt::Comment { text, inline: true }, tail)) = body.split_first() {
        header = header.append(Doc::text("  ")).append(Doc::text(text.clone()));
        rest = tail;
    }
    let inner = if rest.is_empty() {
        Doc::text("pass")
    } else if rest.iter().all(Stmt::is_comment) {
        statements_doc(rest)?
            .append(Doc::hardline())
            .append(Doc::text("pass"))
    } else {
        statements_doc(rest)?
    };
    Ok(header.append(Doc::hardline().append(inner).nest(4)))
}

fn header_text(header: &Header) -> Result<String, SerializationError> {
    let mut out = String::new();
    match header {
        Header::While(test) => {
            out.push_str("while ");
            write_expr(&mut out, test, TEST)?;
            out.push(':');
        }
        Header::For { target, iter } => {
            let _ = write!(out, "for {} in {}:", top_level(target)?, top_level(iter)?);
        }
        Header::With(items) => {
            out.push_str("with ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(&mut out, &item.context, TEST)?;
                if let Some(alias) = &item.alias {
                    out.push_str(" as ");
                    write_expr(&mut out, alias, TEST)?;
                }
            }
            out.push(':');
        }
        Header::Other(opaque) => out.push_str(&opaque.text),
    }
    Ok(out)
}

fn simple_statement(stmt: &Stmt) -> Result<String, SerializationError> {
    Ok(match stmt {
        Stmt::Expr(expr) => top_level(expr)?,
        Stmt::Assign { targets, value } => {
            let mut out = String::new();
            for target in targets {
                out.push_str(&top_level(target)?);
                out.push_str(" = ");
            }
            out.push_str(&top_level(value)?);
            out
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
        } => {
            let mut out = top_level(target)?;
            out.push_str(": ");
            write_expr(&mut out, annotation, TEST)?;
            if let Some(value) = value {
                out.push_str(" = ");
                out.push_str(&top_level(value)?);
            }
            out
        }
        Stmt::AugAssign { target, op, value } => format!(
            "{} {}= {}",
            top_level(target)?,
            binary_operator(*op),
            top_level(value)?
        ),
        Stmt::Assert { test, msg } => {
            let mut out = "assert ".to_string();
            write_expr(&mut out, test, TEST)?;
            if let Some(msg) = msg {
                out.push_str(", ");
                write_expr(&mut out, msg, TEST)?;
            }
            out
        }
        Stmt::Pass => "pass".to_string(),
        Stmt::Return(None) => "return".to_string(),
        Stmt::Return(Some(value)) => format!("return {}", top_level(value)?),
        Stmt::Other(opaque) => opaque.text.clone(),
        Stmt::Comment { text, .. } => text.clone(),
        Stmt::If { .. } | Stmt::Block { .. } => String::new(),
    })
}

/// Expressions in statement position, where a tuple needs no parentheses.
fn top_level(expr: &Expr) -> Result<String, SerializationError> {
    let mut out = String::new();
    match expr {
        Expr::Tuple(items) if !items.is_empty() => {
            write_items(&mut out, items)?;
            if items.len() == 1 {
                out.push(',');
            }
        }
        _ => write_expr(&mut out, expr, LAMBDA)?,
    }
    Ok(out)
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Other(opaque) if opaque.text.starts_with("lambda") => LAMBDA,
        Expr::IfExp { .. } => TEST,
        Expr::BoolOp {
            op: BoolOpKind::Or, ..
        } => OR,
        Expr::BoolOp {
            op: BoolOpKind::And,
            ..
        } => AND,
        Expr::Not(_) => NOT,
        Expr::Compare { .. } => COMPARISON,
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary { .. } => FACTOR,
        Expr::Attribute { .. } | Expr::Subscript { .. } | Expr::Call { .. } => PRIMARY,
        _ => ATOM,
    }
}

fn binary_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => BIT_OR,
        BinOp::BitXor => BIT_XOR,
        BinOp::BitAnd => BIT_AND,
        BinOp::LShift | BinOp::RShift => SHIFT,
        BinOp::Add | BinOp::Sub => ARITH,
        BinOp::Mul | BinOp::MatMul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => TERM,
        BinOp::Pow => POWER,
    }
}

fn write_expr(out: &mut String, expr: &Expr, min: u8) -> Result<(), SerializationError> {
    if precedence(expr) < min {
        out.push('(');
        write_expr(out, expr, LAMBDA)?;
        out.push(')');
        return Ok(());
    }
    match expr {
        Expr::Name(name) => out.push_str(name),
        Expr::Literal { value, .. } => write_literal(out, value)?,
        Expr::Dict { entries, .. } => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, key, TEST)?;
                out.push_str(": ");
                write_expr(out, value, TEST)?;
            }
            out.push('}');
        }
        Expr::List(items) => {
            out.push('[');
            write_items(out, items)?;
            out.push(']');
        }
        Expr::Tuple(items) => {
            out.push('(');
            write_items(out, items)?;
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::Set(items) if items.is_empty() => out.push_str("set()"),
        Expr::Set(items) => {
            out.push('{');
            write_items(out, items)?;
            out.push('}');
        }
        Expr::Attribute { value, attr } => {
            if matches!(**value, Expr::Literal { value: Literal::Int(_), .. }) {
                out.push('(');
                write_expr(out, value, LAMBDA)?;
                out.push(')');
            } else {
                write_expr(out, value, PRIMARY)?;
            }
            out.push('.');
            out.push_str(attr);
        }
        Expr::Subscript { value, index } => {
            write_expr(out, value, PRIMARY)?;
            out.push('[');
            match &**index {
                Expr::Tuple(items) if !items.is_empty() => {
                    write_items(out, items)?;
                    if items.len() == 1 {
                        out.push(',');
                    }
                }
                index => write_expr(out, index, LAMBDA)?,
            }
            out.push(']');
        }
        Expr::Slice { lower, upper, step } => {
            if let Some(lower) = lower {
                write_expr(out, lower, TEST)?;
            }
            out.push(':');
            if let Some(upper) = upper {
                write_expr(out, upper, TEST)?;
            }
            if let Some(step) = step {
                out.push(':');
                write_expr(out, step, TEST)?;
            }
        }
        Expr::Call { func, args } => {
            write_expr(out, func, PRIMARY)?;
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match arg {
                    Argument::Positional(value) => write_expr(out, value, LAMBDA)?,
                    Argument::Keyword { name, value } => {
                        out.push_str(name);
                        out.push('=');
                        write_expr(out, value, LAMBDA)?;
                    }
                    Argument::Star(value) => {
                        out.push('*');
                        write_expr(out, value, TEST)?;
                    }
                    Argument::DoubleStar(value) => {
                        out.push_str("**");
                        write_expr(out, value, TEST)?;
                    }
                }
            }
            out.push(')');
        }
        Expr::BoolOp { op, values } => {
            let (keyword, strength) = match op {
                BoolOpKind::And => (" and ", AND),
                BoolOpKind::Or => (" or ", OR),
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(keyword);
                }
                write_expr(out, value, strength + 1)?;
            }
        }
        Expr::Compare { left, comparisons } => {
            write_expr(out, left, BIT_OR)?;
            for (op, right) in comparisons {
                out.push(' ');
                out.push_str(comparison_operator(*op));
                out.push(' ');
                write_expr(out, right, BIT_OR)?;
            }
        }
        Expr::Not(operand) => {
            out.push_str("not ");
            write_expr(out, operand, NOT)?;
        }
        Expr::Unary { op, operand } => {
            out.push(match op {
                UnaryOp::Neg => '-',
                UnaryOp::Pos => '+',
                UnaryOp::Invert => '~',
            });
            write_expr(out, operand, FACTOR)?;
        }
        Expr::Binary { left, op, right } => {
            let strength = binary_precedence(*op);
            let (left_min, right_min) = if *op == BinOp::Pow {
                (PRIMARY, FACTOR)
            } else {
                (strength, strength + 1)
            };
            write_expr(out, left, left_min)?;
            out.push(' ');
            out.push_str(binary_operator(*op));
            out.push(' ');
            write_expr(out, right, right_min)?;
        }
        Expr::IfExp { test, body, orelse } => {
            write_expr(out, body, OR)?;
            out.push_str(" if ");
            write_expr(out, test, OR)?;
            out.push_str(" else ");
            write_expr(out, orelse, TEST)?;
        }
        Expr::Other(opaque) => out.push_str(&opaque.text),
    }
    Ok(())
}

fn write_items(out: &mut String, items: &[Expr]) -> Result<(), SerializationError> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, LAMBDA)?;
    }
    Ok(())
}

fn comparison_operator(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::NotEq => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        CmpOp::In => "in",
        CmpOp::NotIn => "not in",
        CmpOp::Is => "is",
        CmpOp::IsNot => "is not",
    }
}

fn binary_operator(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::MatMul => "@",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::LShift => "<<",
        BinOp::RShift => ">>",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::BitAnd => "&",
    }
}

fn write_literal(out: &mut String, literal: &Literal) -> Result<(), SerializationError> {
    match literal {
        Literal::None => out.push_str("None"),
        Literal::Bool(true) => out.push_str("True"),
        Literal::Bool(false) => out.push_str("False"),
        Literal::Int(value) => out.push_str(&value.to_string()),
        Literal::Float(value) => out.push_str(&float_repr(*value)?),
        Literal::Str(value) => out.push_str(&string_repr(value)),
    }
    Ok(())
}

/// Python's `repr` of a float: the shortest digits that round-trip, in
/// positional notation for exponents in `-4..16` and scientific otherwise.
pub fn float_repr(value: f64) -> Result<String, SerializationError> {
    if !value.is_finite() {
        return Err(SerializationError::NonFiniteNumber { value });
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exponent) {
        let sign_of_exponent = if exponent < 0 { '-' } else { '+' };
        return Ok(format!(
            "{}{}e{}{:02}",
            sign,
            mantissa,
            sign_of_exponent,
            exponent.abs()
        ));
    }
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return Ok(format!("{}0.{}{}", sign, zeros, digits));
    }
    let integer_len = exponent as usize + 1;
    if digits.len() <= integer_len {
        let zeros = "0".repeat(integer_len - digits.len());
        Ok(format!("{}{}{}.0", sign, digits, zeros))
    } else {
        let (integer, fraction) = digits.split_at(integer_len);
        Ok(format!("{}{}.{}", sign, integer, fraction))
    }
}

/// Python's `repr` of a string.
pub fn string_repr(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                let _ = if code < 0x100 {
                    write!(out, "\\x{:02x}", code)
                } else if code < 0x10000 {
                    write!(out, "\\u{:04x}", code)
                } else {
                    write!(out, "\\U{:08x}", code)
                };
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python's `str.isprintable` for one character. Control, format, private
/// use and separator characters other than the ASCII space are escaped.
fn is_printable(c: char) -> bool {
    !(c.is_control()
        || matches!(
            c,
            // space and line/paragraph separators
            '\u{a0}'
                | '\u{1680}'
                | '\u{2000}'..='\u{200a}'
                | '\u{2028}'
                | '\u{2029}'
                | '\u{202f}'
                | '\u{205f}'
                | '\u{3000}'
                // format
                | '\u{ad}'
                | '\u{600}'..='\u{605}'
                | '\u{61c}'
                | '\u{6dd}'
                | '\u{70f}'
                | '\u{890}'..='\u{891}'
                | '\u{8e2}'
                | '\u{180e}'
                | '\u{200b}'..='\u{200f}'
                | '\u{202a}'..='\u{202e}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{206f}'
                | '\u{feff}'
                | '\u{fff9}'..='\u{fffb}'
                | '\u{110bd}'
                | '\u{110cd}'
                | '\u{13430}'..='\u{1343f}'
                | '\u{1bca0}'..='\u{1bca3}'
                | '\u{1d173}'..='\u{1d17a}'
                | '\u{e0001}'
                | '\u{e0020}'..='\u{e007f}'
                // private use
                | '\u{e000}'..='\u{f8ff}'
                | '\u{f0000}'..='\u{ffffd}'
                | '\u{100000}'..='\u{10fffd}'
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::parser::parse;
    use crate::syntax::{Expr, Provenance};
    use expect_test::{Expect, expect};
    use indoc::indoc;

    fn check(source: &str, expected: Expect) {
        let module = parse(source).expect("source should parse");
        let output = unparse(&module).expect("module should unparse");
        let reparsed = parse(&output).expect("output should parse");
        assert_eq!(unparse(&reparsed).as_deref(), Ok(output.as_str()));
        expected.assert_eq(&output);
    }

    #[test]
    fn should_write_statements_canonically() {
        check(
            indoc! {"
                import os


                x  =  client.variable( user , 'flag' , False )
                def   f(a):
                  return  a , 1
            "},
            expect![[r#"
                import os
                x = client.variable(user, 'flag', False)
                def   f(a):
                    return a, 1
            "#]],
        );
    }

    #[test]
    fn should_re_form_elif_chains() {
        check(
            indoc! {"
                if a:
                    A()
                else:
                    if b:
                        B()
                    else:
                        C()
            "},
            expect![[r#"
                if a:
                    A()
                elif b:
                    B()
                else:
                    C()
            "#]],
        );
    }

    #[test]
    fn should_keep_comments_in_place() {
        check(
            indoc! {"
                # header
                x = 1  # one
                if x:  # test
                    # body
                    y = 2
                else:
                    # nothing here
                    pass
            "},
            expect![[r#"
                # header
                x = 1  # one
                if x:  # test
                    # body
                    y = 2
                else:
                    # nothing here
                    pass
            "#]],
        );
    }

    #[test]
    fn should_insert_pass_into_empty_blocks() {
        let module = Module {
            body: vec![Stmt::If {
                test: Expr::name("x"),
                body: vec![Stmt::Comment {
                    text: "# only a comment".to_string(),
                    inline: false,
                }],
                orelse: Vec::new(),
            }],
        };
        expect![[r#"
            if x:
                # only a comment
                pass
        "#]]
        .assert_eq(&unparse(&module).unwrap());
    }

    #[test]
    fn should_parenthesize_by_precedence() {
        check(
            indoc! {"
                a = (b or c) and not (d == e)
                f = (-g) ** 2 + h * (i - j)
                k = (l if m else n).o
                p = (q, r)[0]
                s = (lambda: t) or u
                v = (1).real
            "},
            expect![[r#"
                a = (b or c) and not d == e
                f = (-g) ** 2 + h * (i - j)
                k = (l if m else n).o
                p = (q, r)[0]
                s = (lambda: t) or u
                v = (1).real
            "#]],
        );
    }

    #[test]
    fn should_write_collections_and_calls() {
        check(
            indoc! {"
                x = {'a': [1, 2.5], \"b\": {3}, 'c': ()}
                y = f(*args, key=value, **kwargs)[1:2, ::3]
                z = x['it\\'s'] if 'q' not in x else None
            "},
            expect![[r#"
                x = {'a': [1, 2.5], 'b': {3}, 'c': ()}
                y = f(*args, key=value, **kwargs)[1:2, ::3]
                z = x["it's"] if 'q' not in x else None
            "#]],
        );
    }

    #[test]
    fn should_write_loops_and_annotated_statements() {
        check(
            indoc! {"
                while  not done :
                    count  +=  1
                for  key , value  in  items.items() :
                    total: int=value
                with  open(path)  as  fh , lock :
                    assert  fh , 'missing'
                for x in a, b:
                    assert x
                else:
                    pending: list
            "},
            expect![[r#"
                while not done:
                    count += 1
                for key, value in items.items():
                    total: int = value
                with open(path) as fh, lock:
                    assert fh, 'missing'
                for x in a, b:
                    assert x
                else:
                    pending: list
            "#]],
        );
    }

    #[test]
    fn float_repr_should_match_python() {
        let cases = [7.0, 7.5, 0.1, 100000.0, 1e16, 1.5e-5, 0.0001, -2.25, 123.456, 0.0];
        let actual: Vec<String> = cases.iter().map(|v| float_repr(*v).unwrap()).collect();
        expect![[r#"
            [
                "7.0",
                "7.5",
                "0.1",
                "100000.0",
                "1e+16",
                "1.5e-05",
                "0.0001",
                "-2.25",
                "123.456",
                "0.0",
            ]
        "#]]
        .assert_debug_eq(&actual);
    }

    #[test]
    fn string_repr_should_match_python() {
        expect![[r#"'plain'"#]].assert_eq(&string_repr("plain"));
        expect![[r#""it's""#]].assert_eq(&string_repr("it's"));
        expect![[r#"'both \' and "'"#]].assert_eq(&string_repr("both ' and \""));
        expect![[r#"'tab\there\nnew \\ \x00'"#]].assert_eq(&string_repr("tab\there\nnew \\ \0"));
    }

    #[test]
    fn string_repr_should_escape_separators_and_format_characters() {
        expect![[r#"'é\u2028\u2029\x00'"#]].assert_eq(&string_repr("é\u{2028}\u{2029}\0"));
        expect![[r#"'zero\u200bwidth\ufeff \xa0'"#]]
            .assert_eq(&string_repr("zero\u{200b}width\u{feff} \u{a0}"));
        expect![[r#"'emoji 🎉'"#]].assert_eq(&string_repr("emoji 🎉"));
    }

    #[test]
    fn should_reject_non_finite_numbers() {
        let module = Module {
            body: vec![Stmt::Expr(Expr::literal(
                Literal::Float(f64::NAN),
                Provenance::Synthetic,
            ))],
        };
        assert!(matches!(
            unparse(&module),
            Err(SerializationError::NonFiniteNumber { .. })
        ));
    }
}
