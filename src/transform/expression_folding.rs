use std::cmp::Ordering;

use crate::syntax::{BoolOpKind, CmpOp, Expr, Literal, Module, Provenance};

use super::{BindingMap, Pass};

/// A pass that evaluates boolean operators, comparisons and negations whose
/// outcome is decided by engine-produced values.
///
/// Operands are looked up in the [`BindingMap`], so a variable bound to a
/// flag value counts as that value. Values written by the author are never
/// folded on their own: `if True == True:` is left as is.
pub struct ExpressionFoldingPass<'a> {
    bindings: &'a BindingMap,
}

/// What the first two operands of a boolean operator reduce to.
enum Outcome {
    Constant(bool),
    /// The operand at this index.
    Operand(usize),
}

impl<'a> ExpressionFoldingPass<'a> {
    pub fn new(bindings: &'a BindingMap) -> Self {
        Self { bindings }
    }

    fn literal_of<'e>(&'e self, expr: &'e Expr) -> Option<(&'e Literal, Provenance)> {
        match self.bindings.resolve(expr) {
            Expr::Literal { value, provenance } => Some((value, *provenance)),
            _ => None,
        }
    }

    fn synthetic_of<'e>(&'e self, expr: &'e Expr) -> Option<&'e Literal> {
        self.literal_of(expr)
            .filter(|(_, provenance)| *provenance == Provenance::Synthetic)
            .map(|(value, _)| value)
    }

    fn fold(&self, expr: &mut Expr, changed: &mut bool) {
        expr.for_each_child_mut(&mut |child| self.fold(child, changed));

        let folded = match expr {
            Expr::BoolOp { op, values } => self.fold_bool_op(*op, values),
            Expr::Compare { left, comparisons } if comparisons.len() == 1 => {
                let (op, right) = &comparisons[0];
                self.fold_compare(left, *op, right)
            }
            Expr::Not(operand) => self
                .synthetic_of(operand)
                .map(|value| Expr::synthetic(Literal::Bool(!value.truthy()))),
            _ => None,
        };
        if let Some(folded) = folded {
            *expr = folded;
            *changed = true;
        }
    }

    /// Folds the first two operands only. Further operands are kept in a
    /// new operator for a later run.
    fn fold_bool_op(&self, op: BoolOpKind, values: &mut Vec<Expr>) -> Option<Expr> {
        if values.len() < 2 {
            return None;
        }
        let head = match self.bool_op_outcome(op, &values[0], &values[1])? {
            Outcome::Constant(value) => Expr::synthetic(Literal::Bool(value)),
            Outcome::Operand(index) => std::mem::take(&mut values[index]),
        };
        let rest: Vec<Expr> = values.drain(2..).collect();
        if !rest.is_empty() {
            return Some(Expr::BoolOp {
                op,
                values: std::iter::once(head).chain(rest).collect(),
            });
        }
        Some(match head {
            Expr::Literal { value, .. } => Expr::synthetic(value),
            other => other,
        })
    }

    fn bool_op_outcome(&self, op: BoolOpKind, left: &Expr, right: &Expr) -> Option<Outcome> {
        let decided_by = |known: bool, other: usize| match (op, known) {
            (BoolOpKind::And, false) => Outcome::Constant(false),
            (BoolOpKind::Or, true) => Outcome::Constant(true),
            _ => Outcome::Operand(other),
        };

        let left_value = self.synthetic_of(left);
        if let Some(known) = left_value.and_then(Literal::as_bool) {
            return Some(decided_by(known, 1));
        }
        if let Some(known) = self.synthetic_of(right).and_then(Literal::as_bool) {
            return Some(decided_by(known, 0));
        }
        // any other value short-circuits on its truthiness
        Some(match (op, left_value?.truthy()) {
            (BoolOpKind::And, true) | (BoolOpKind::Or, false) => Outcome::Operand(1),
            (BoolOpKind::And, false) | (BoolOpKind::Or, true) => Outcome::Operand(0),
        })
    }

    fn fold_compare(&self, left: &Expr, op: CmpOp, right: &Expr) -> Option<Expr> {
        let (left, left_provenance) = self.literal_of(left)?;
        let (right, right_provenance) = self.literal_of(right)?;
        if left_provenance == Provenance::Source && right_provenance == Provenance::Source {
            return None;
        }
        let result = match op {
            CmpOp::Eq => left.py_eq(right),
            CmpOp::Lt => left.py_partial_cmp(right)? == Ordering::Less,
            CmpOp::LtE => left.py_partial_cmp(right)? != Ordering::Greater,
            CmpOp::Gt => left.py_partial_cmp(right)? == Ordering::Greater,
            CmpOp::GtE => left.py_partial_cmp(right)? != Ordering::Less,
            _ => return None,
        };
        Some(Expr::synthetic(Literal::Bool(result)))
    }
}

impl Pass for ExpressionFoldingPass<'_> {
    fn name(&self) -> &'static str {
        "expression_folding"
    }

    fn run(&self, module: &mut Module) -> bool {
        let mut changed = false;
        module.for_each_expr_mut(&mut |expr| self.fold(expr, &mut changed));
        changed
    }
}
