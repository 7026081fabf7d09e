use crate::syntax::{Expr, Module, Stmt};

use super::{BindingMap, Pass};

/// A pass that inlines the variables of a [`BindingMap`] that hold a
/// boolean or a flag object.
///
/// The target is removed from its assignment, and the assignment is
/// removed once it has no targets left. Every reference receives its own
/// copy of the value. A comment trailing a removed assignment is kept on
/// its own line.
pub struct BindingEliminationPass<'a> {
    bindings: &'a BindingMap,
}

impl<'a> BindingEliminationPass<'a> {
    pub fn new(bindings: &'a BindingMap) -> Self {
        Self { bindings }
    }

    fn transform_statements(&self, statements: Vec<Stmt>, changed: &mut bool) -> Vec<Stmt> {
        let mut result = Vec::with_capacity(statements.len());
        let mut removed_previous = false;
        for mut stmt in statements {
            if let Stmt::Comment { inline, .. } = &mut stmt {
                if removed_previous {
                    *inline = false;
                }
            }
            removed_previous = false;

            if let Stmt::Assign { targets, .. } = &mut stmt {
                let before = targets.len();
                targets.retain(|target| {
                    !matches!(target, Expr::Name(name) if self.bindings.inlinable(name).is_some())
                });
                if targets.len() != before {
                    *changed = true;
                }
                if targets.is_empty() {
                    removed_previous = true;
                    continue;
                }
            }

            for body in stmt.bodies_mut() {
                *body = self.transform_statements(std::mem::take(body), changed);
            }
            stmt.for_each_expr_mut(&mut |expr| self.inline_references(expr, changed));
            result.push(stmt);
        }
        result
    }

    fn inline_references(&self, expr: &mut Expr, changed: &mut bool) {
        if let Expr::Name(name) = expr {
            if let Some(value) = self.bindings.inlinable(name) {
                *expr = value.clone();
                *changed = true;
            }
            return;
        }
        expr.for_each_child_mut(&mut |child| self.inline_references(child, changed));
    }
}

impl Pass for BindingEliminationPass<'_> {
    fn name(&self) -> &'static str {
        "binding_elimination"
    }

    fn run(&self, module: &mut Module) -> bool {
        if self.bindings.is_empty() {
            return false;
        }
        let mut changed = false;
        module.body = self.transform_statements(std::mem::take(&mut module.body), &mut changed);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::testing::{before_after, boolean_flag, substituted};
    use crate::transform::ProjectionReductionPass;
    use expect_test::{Expect, expect};
    use indoc::indoc;

    fn check(source: &str, expected: Expect) {
        let mut module = substituted(source, &boolean_flag("true"));
        ProjectionReductionPass.run(&mut module);
        let bindings = BindingMap::build(&module);
        expected.assert_eq(&before_after(&BindingEliminationPass::new(&bindings), module));
    }

    #[test]
    fn should_inline_boolean_variables() {
        check(
            indoc! {r#"
                enabled = client.variable(user, "flag", False).value
                if enabled:
                    show(enabled)
            "#},
            expect![[r#"
                -- before --
                enabled = True
                if enabled:
                    show(enabled)

                -- after --
                if True:
                    show(True)
            "#]],
        );
    }

    #[test]
    fn should_inline_flag_objects() {
        check(
            indoc! {r#"
                obj = client.variable(user, "flag", False)
                print(obj.value)
            "#},
            expect![[r#"
                -- before --
                obj = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}
                print(obj.value)

                -- after --
                print({'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}.value)
            "#]],
        );
    }

    #[test]
    fn should_keep_variables_holding_other_literals() {
        check(
            indoc! {r#"
                key = client.variable(user, "flag", False).key
                print(key)
            "#},
            expect![[r#"
                -- before --
                key = 'flag'
                print(key)

                -- after --
                key = 'flag'
                print(key)
            "#]],
        );
    }

    #[test]
    fn should_keep_the_trailing_comment_of_a_removed_assignment() {
        check(
            indoc! {r#"
                def render(user):
                    enabled = client.variable(user, "flag", False).value  # flag state
                    return enabled
            "#},
            expect![[r#"
                -- before --
                def render(user):
                    enabled = True  # flag state
                    return enabled

                -- after --
                def render(user):
                    # flag state
                    return True
            "#]],
        );
    }

    #[test]
    fn should_keep_assignments_with_remaining_targets() {
        check(
            indoc! {r#"
                enabled = cache[user] = client.variable(user, "flag", False).value
            "#},
            expect![[r#"
                -- before --
                enabled = cache[user] = True

                -- after --
                cache[user] = True
            "#]],
        );
    }
}
