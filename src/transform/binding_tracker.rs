use std::collections::{BTreeMap, HashMap, HashSet};

use crate::syntax::{Expr, Header, Literal, Module, Stmt};

/// A variable assigned once to an engine-produced value.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    /// Whether references may be replaced by the value. Only booleans and
    /// flag objects are inlined; other literals are kept as variables but
    /// their value can still be used to decide conditions.
    pub inlinable: bool,
    pub value: Expr,
}

/// The variables of a module that are bound to engine-produced values.
///
/// A variable is only tracked when the module assigns it exactly once, by
/// a plain `name = value` target outside any class body, and never
/// mentions it in text the engine does not interpret. Anything else (a loop
/// variable, a function parameter, `x += 1`, `del x`, a tuple target) could
/// rebind it behind the engine's back. Class attributes are not visible to
/// the methods of the class under their bare name.
#[derive(Debug, Clone, Default)]
pub struct BindingMap {
    bindings: BTreeMap<String, Binding>,
}

#[derive(Default)]
struct Census {
    assignments: HashMap<String, usize>,
    escaped: HashSet<String>,
}

impl Census {
    fn visit_statements(&mut self, stmts: &[Stmt], in_class: bool) {
        for stmt in stmts {
            self.visit_stmt(stmt, in_class);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt, in_class: bool) {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for target in targets {
                    match target {
                        Expr::Name(name) if !in_class => {
                            *self.assignments.entry(name.clone()).or_default() += 1;
                        }
                        other => self.escape(other),
                    }
                }
            }
            Stmt::AnnAssign { target, .. } | Stmt::AugAssign { target, .. } => self.escape(target),
            Stmt::Block { header, .. } => match header {
                Header::For { target, .. } => self.escape(target),
                Header::With(items) => {
                    for alias in items.iter().filter_map(|item| item.alias.as_ref()) {
                        self.escape(alias);
                    }
                }
                Header::While(_) => {}
                Header::Other(opaque) => self.escaped.extend(opaque.names.iter().cloned()),
            },
            Stmt::Other(opaque) => self.escaped.extend(opaque.names.iter().cloned()),
            _ => {}
        }
        stmt.for_each_expr(&mut |expr| {
            expr.traverse(&mut |expr| {
                if let Expr::Other(opaque) = expr {
                    self.escaped.extend(opaque.names.iter().cloned());
                }
            })
        });
        match stmt {
            Stmt::If { body, orelse, .. } => {
                self.visit_statements(body, in_class);
                self.visit_statements(orelse, in_class);
            }
            Stmt::Block { header, body } => {
                self.visit_statements(body, opens_class_body(header, in_class));
            }
            _ => {}
        }
    }

    /// Every name bound by `target`.
    fn escape(&mut self, target: &Expr) {
        target.traverse(&mut |expr| {
            if let Expr::Name(name) = expr {
                self.escaped.insert(name.clone());
            }
        });
    }

    fn is_tracked(&self, name: &str) -> bool {
        self.assignments.get(name) == Some(&1) && !self.escaped.contains(name)
    }
}

/// Whether the body under `header` runs in a class body.
fn opens_class_body(header: &Header, in_class: bool) -> bool {
    let Header::Other(opaque) = header else {
        return in_class;
    };
    let mut words = opaque.names.iter().map(String::as_str);
    match (words.next(), words.next()) {
        (Some("class"), _) => true,
        (Some("def"), _) | (Some("async"), Some("def")) => false,
        _ => in_class,
    }
}

impl BindingMap {
    pub fn build(module: &Module) -> Self {
        let mut census = Census::default();
        census.visit_statements(&module.body, false);

        let mut bindings = BTreeMap::new();
        module.traverse(&mut |stmt| {
            let Stmt::Assign { targets, value } = stmt else {
                return;
            };
            let inlinable = match value {
                Expr::Literal { .. } => match value.as_synthetic_literal() {
                    Some(Literal::Bool(_)) => true,
                    Some(_) => false,
                    None => return,
                },
                _ if value.is_synthetic_dict() => true,
                _ => return,
            };
            for target in targets {
                if let Expr::Name(name) = target {
                    if census.is_tracked(name) {
                        bindings.insert(
                            name.clone(),
                            Binding {
                                name: name.clone(),
                                inlinable,
                                value: value.clone(),
                            },
                        );
                    }
                }
            }
        });
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// The value references to `name` should be replaced with.
    pub fn inlinable(&self, name: &str) -> Option<&Expr> {
        self.get(name)
            .filter(|binding| binding.inlinable)
            .map(|binding| &binding.value)
    }

    /// The value `expr` is known to hold: the bound value for a tracked
    /// variable, the expression itself otherwise.
    pub fn resolve<'a>(&'a self, expr: &'a Expr) -> &'a Expr {
        match expr {
            Expr::Name(name) => self.get(name).map_or(expr, |binding| &binding.value),
            _ => expr,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::unparse::unparse_expr;
    use crate::transform::testing::{boolean_flag, substituted};
    use crate::transform::{Pass, ProjectionReductionPass};
    use expect_test::{Expect, expect};
    use indoc::indoc;

    fn check(source: &str, expected: Expect) {
        let mut module = substituted(source, &boolean_flag("true"));
        ProjectionReductionPass.run(&mut module);
        let bindings = BindingMap::build(&module);
        let actual = bindings
            .iter()
            .map(|binding| {
                format!(
                    "{}{} = {}\n",
                    binding.name,
                    if binding.inlinable { "" } else { " (kept)" },
                    unparse_expr(&binding.value).unwrap()
                )
            })
            .collect::<String>();
        expected.assert_eq(&actual);
    }

    #[test]
    fn should_track_objects_and_synthetic_literals() {
        check(
            indoc! {r#"
                obj = client.variable(user, "flag", False)
                enabled = client.variable(user, "flag", False).value
                key = client.variable(user, "flag", False).key
                plain = True
                other = compute()
            "#},
            expect![[r#"
                enabled = True
                key (kept) = 'flag'
                obj = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}
            "#]],
        );
    }

    #[test]
    fn should_track_every_target_of_a_chained_assignment() {
        check(
            indoc! {r#"
                a = b = client.variable(user, "flag", False).value
            "#},
            expect![[r#"
                a = True
                b = True
            "#]],
        );
    }

    #[test]
    fn should_not_track_reassigned_variables() {
        check(
            indoc! {r#"
                a = client.variable(user, "flag", False).value
                a = False
                b = client.variable(user, "flag", False).value
                b += 1
                c = client.variable(user, "flag", False).value
                for c in items:
                    pass
                d = client.variable(user, "flag", False).value
                d, e = pair
                f = client.variable(user, "flag", False).value
                g = client.variable(user, "flag", False).value
                handler = lambda: g
            "#},
            expect![[r#"
                f = True
            "#]],
        );
    }

    #[test]
    fn should_not_track_class_attributes() {
        check(
            indoc! {r#"
                class Settings:
                    on = client.variable(user, "flag", False).value
                    if ready:
                        shown = client.variable(user, "flag", False).value

                    def render(self):
                        local = client.variable(user, "flag", False).value
                        return on and local
                top = client.variable(user, "flag", False).value
            "#},
            expect![[r#"
                local = True
                top = True
            "#]],
        );
    }

    #[test]
    fn should_not_track_annotated_loop_or_context_targets() {
        check(
            indoc! {r#"
                a: bool = client.variable(user, "flag", False).value
                b = client.variable(user, "flag", False).value
                b: bool = False
                c = client.variable(user, "flag", False).value
                with open(path) as c:
                    pass
                d = client.variable(user, "flag", False).value
                while d:
                    pass
            "#},
            expect![[r#"
                d = True
            "#]],
        );
    }

    #[test]
    fn resolve_should_follow_tracked_variables_only() {
        let module = substituted(
            "on = client.variable(user, 'flag', False)\n",
            &boolean_flag("true"),
        );
        let bindings = BindingMap::build(&module);
        assert!(bindings.resolve(&Expr::name("on")).is_synthetic_dict());
        assert_eq!(bindings.resolve(&Expr::name("off")), &Expr::name("off"));
        assert!(bindings.inlinable("on").is_some());
        assert!(bindings.inlinable("off").is_none());
    }
}
