use crate::syntax::{Expr, Literal, Module, Provenance};

use super::Pass;

/// A pass that reduces field accesses on engine-produced objects to the
/// field value, e.g. `{'value': True, ...}.value` becomes `True`.
///
/// Both attribute access and subscripts with a literal key are reduced.
/// Accesses to fields the object does not carry are left alone.
pub struct ProjectionReductionPass;

impl ProjectionReductionPass {
    fn lookup(object: &Expr, key: &Literal) -> Option<Expr> {
        let Expr::Dict {
            entries,
            provenance: Provenance::Synthetic,
        } = object
        else {
            return None;
        };
        entries
            .iter()
            .find(|(field, _)| {
                matches!(field, Expr::Literal { value, .. } if value.py_eq(key))
            })
            .map(|(_, value)| Self::mark_synthetic(value.clone()))
    }

    fn mark_synthetic(expr: Expr) -> Expr {
        match expr {
            Expr::Literal { value, .. } => Expr::synthetic(value),
            Expr::Dict { entries, .. } => Expr::Dict {
                entries,
                provenance: Provenance::Synthetic,
            },
            other => other,
        }
    }

    fn reduce(expr: &mut Expr, changed: &mut bool) {
        expr.for_each_child_mut(&mut |child| Self::reduce(child, changed));

        let field = match expr {
            Expr::Attribute { value, attr } => {
                Self::lookup(value, &Literal::Str(attr.clone()))
            }
            Expr::Subscript { value, index } => match &**index {
                Expr::Literal { value: key, .. } => Self::lookup(value, key),
                _ => None,
            },
            _ => None,
        };
        if let Some(field) = field {
            *expr = field;
            *changed = true;
        }
    }
}

impl Pass for ProjectionReductionPass {
    fn name(&self) -> &'static str {
        "projection_reduction"
    }

    fn run(&self, module: &mut Module) -> bool {
        let mut changed = false;
        module.for_each_expr_mut(&mut |expr| Self::reduce(expr, &mut changed));
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{FlagSpec, FlagType};
    use crate::syntax::Stmt;
    use crate::transform::testing::{before_after, boolean_flag, substituted};
    use expect_test::{Expect, expect};
    use indoc::indoc;

    fn check(flag: FlagSpec, source: &str, expected: Expect) {
        let module = substituted(source, &flag);
        expected.assert_eq(&before_after(&ProjectionReductionPass, module));
    }

    #[test]
    fn should_reduce_attribute_access() {
        check(
            boolean_flag("true"),
            indoc! {r#"
                enabled = client.variable(user, "flag", False).value
                key = client.variable(user, "flag", False).key
            "#},
            expect![[r#"
                -- before --
                enabled = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}.value
                key = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}.key

                -- after --
                enabled = True
                key = 'flag'
            "#]],
        );
    }

    #[test]
    fn should_reduce_subscripts_with_literal_keys() {
        check(
            boolean_flag("false"),
            indoc! {r#"
                a = client.variable(user, "flag", False)["isDefaulted"]
                b = client.variable(user, "flag", False)[field]
            "#},
            expect![[r#"
                -- before --
                a = {'key': 'flag', 'value': False, 'defaultValue': False, 'isDefaulted': True}['isDefaulted']
                b = {'key': 'flag', 'value': False, 'defaultValue': False, 'isDefaulted': True}[field]

                -- after --
                a = True
                b = {'key': 'flag', 'value': False, 'defaultValue': False, 'isDefaulted': True}[field]
            "#]],
        );
    }

    #[test]
    fn should_reduce_nested_json_fields() {
        check(
            FlagSpec::new("flag", FlagType::Json, r#"{"theme": {"color": "red"}}"#),
            indoc! {r#"
                color = client.variable(user, "flag", {}).value["theme"]["color"]
            "#},
            expect![[r#"
                -- before --
                color = {'key': 'flag', 'value': {'theme': {'color': 'red'}}, 'defaultValue': {'theme': {'color': 'red'}}, 'isDefaulted': True}.value['theme']['color']

                -- after --
                color = 'red'
            "#]],
        );
    }

    #[test]
    fn should_leave_unknown_fields_and_source_dicts_alone() {
        check(
            boolean_flag("true"),
            indoc! {r#"
                a = client.variable(user, "flag", False).evaluated
                b = {"value": 1}["value"]
            "#},
            expect![[r#"
                -- before --
                a = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}.evaluated
                b = {'value': 1}['value']

                -- after --
                a = {'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True}.evaluated
                b = {'value': 1}['value']
            "#]],
        );
    }

    #[test]
    fn reduced_values_should_be_synthetic() {
        let mut module = substituted(
            "x = client.variable(u, 'flag', 0)['value']\n",
            &boolean_flag("true"),
        );
        assert!(ProjectionReductionPass.run(&mut module));
        let Stmt::Assign { value, .. } = &module.body[0] else {
            panic!("expected an assignment");
        };
        assert_eq!(value.as_synthetic_literal(), Some(&Literal::Bool(true)));
    }
}
