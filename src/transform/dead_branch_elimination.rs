use crate::syntax::{Expr, Module, Stmt};

use super::{BindingMap, Pass};

/// A pass that removes the branch of an `if` statement or conditional
/// expression that can no longer be taken.
///
/// A condition is known when it is an engine-produced value, or a variable
/// bound to one. The taken branch replaces the whole `if`.
pub struct DeadBranchEliminationPass<'a> {
    bindings: &'a BindingMap,
}

impl<'a> DeadBranchEliminationPass<'a> {
    pub fn new(bindings: &'a BindingMap) -> Self {
        Self { bindings }
    }

    fn known_condition(&self, test: &Expr) -> Option<bool> {
        self.bindings
            .resolve(test)
            .as_synthetic_literal()
            .map(|value| value.truthy())
    }

    fn transform_statements(&self, statements: Vec<Stmt>, changed: &mut bool) -> Vec<Stmt> {
        let mut result = Vec::with_capacity(statements.len());
        for mut stmt in statements {
            // Nested bodies first, so a spliced branch is already clean
            for body in stmt.bodies_mut() {
                *body = self.transform_statements(std::mem::take(body), changed);
            }
            stmt.for_each_expr_mut(&mut |expr| self.eliminate_conditional(expr, changed));

            match stmt {
                Stmt::If { test, body, orelse } => match self.known_condition(&test) {
                    Some(taken) => {
                        *changed = true;
                        let mut branch = if taken { body } else { orelse };
                        // a comment trailing the `if` header has no line to trail anymore
                        if let Some(Stmt::Comment { inline, .. }) = branch.first_mut() {
                            *inline = false;
                        }
                        result.extend(branch);
                    }
                    None => result.push(Stmt::If { test, body, orelse }),
                },
                other => result.push(other),
            }
        }
        result
    }

    fn eliminate_conditional(&self, expr: &mut Expr, changed: &mut bool) {
        expr.for_each_child_mut(&mut |child| self.eliminate_conditional(child, changed));

        if let Expr::IfExp { test, body, orelse } = expr {
            if let Some(taken) = self.known_condition(test) {
                let branch = if taken {
                    std::mem::take(&mut **body)
                } else {
                    std::mem::take(&mut **orelse)
                };
                *expr = branch;
                *changed = true;
            }
        }
    }
}

impl Pass for DeadBranchEliminationPass<'_> {
    fn name(&self) -> &'static str {
        "dead_branch_elimination"
    }

    fn run(&self, module: &mut Module) -> bool {
        let mut changed = false;
        module.body = self.transform_statements(std::mem::take(&mut module.body), &mut changed);
        changed
    }
}
