use std::collections::BTreeSet;

use crate::flag::{FlagSpec, TypeCoercionError, materialize};
use crate::syntax::{Argument, Expr, Header, Literal, Module, Opaque, Stmt};

use super::Pass;

/// Attribute name of the SDK method that evaluates a flag.
const ACCESSOR: &str = "variable";

/// A pass that replaces every SDK call evaluating the flag, e.g.
/// `client.variable(user, "my-flag", False)`, with the object the call
/// evaluates to when the flag is fixed.
///
/// Other calls are left as written, arguments included: a flag call passed
/// to a function keeps its SDK object.
pub struct FlagSubstitutionPass {
    key: String,
    aliases: BTreeSet<String>,
    object: Expr,
}

impl FlagSubstitutionPass {
    pub fn new(flag: &FlagSpec) -> Result<Self, TypeCoercionError> {
        Ok(Self {
            key: flag.key.clone(),
            aliases: flag.aliases.clone(),
            object: materialize(flag)?,
        })
    }

    /// The key argument is the second positional argument of the call. It
    /// matches when it is the key as a string, or a variable named like the
    /// key or one of its aliases.
    fn is_flag_call(&self, expr: &Expr) -> bool {
        let Expr::Call { func, args } = expr else {
            return false;
        };
        if !matches!(&**func, Expr::Attribute { attr, .. } if attr == ACCESSOR) {
            return false;
        }
        let key_argument = args
            .iter()
            .filter_map(|arg| match arg {
                Argument::Positional(value) => Some(value),
                _ => None,
            })
            .nth(1);
        match key_argument {
            Some(Expr::Literal {
                value: Literal::Str(key),
                ..
            }) => *key == self.key,
            Some(Expr::Name(name)) => *name == self.key || self.aliases.contains(name),
            _ => false,
        }
    }

    fn substitute(&self, expr: &mut Expr, changed: &mut bool) {
        if self.is_flag_call(expr) {
            *expr = self.object.clone();
            *changed = true;
            return;
        }
        if matches!(expr, Expr::Call { .. }) {
            return;
        }
        expr.for_each_child_mut(&mut |child| self.substitute(child, changed));
    }

    /// Whether text kept as written looks like it evaluates the flag.
    fn mentions_flag(&self, opaque: &Opaque) -> bool {
        opaque.mentions(ACCESSOR)
            && (opaque.mentions(&self.key)
                || self.aliases.iter().any(|alias| opaque.mentions(alias))
                || opaque.text.contains(&format!("'{}'", self.key))
                || opaque.text.contains(&format!("\"{}\"", self.key)))
    }

    /// Number of fragments kept as written, such as comprehensions,
    /// lambdas, f-strings or `def` headers, that appear to evaluate the
    /// flag. Those evaluations are never replaced.
    pub fn count_opaque_evaluations(&self, module: &Module) -> usize {
        let mut count = 0;
        let mut visit = |opaque: &Opaque| {
            if self.mentions_flag(opaque) {
                count += 1;
            }
        };
        module.traverse(&mut |stmt| {
            if let Stmt::Other(opaque)
            | Stmt::Block {
                header: Header::Other(opaque),
                ..
            } = stmt
            {
                visit(opaque);
            }
            stmt.for_each_expr(&mut |expr| {
                expr.traverse(&mut |expr| {
                    if let Expr::Other(opaque) = expr {
                        visit(opaque);
                    }
                })
            });
        });
        count
    }
}

impl Pass for FlagSubstitutionPass {
    fn name(&self) -> &'static str {
        "flag_substitution"
    }

    fn run(&self, module: &mut Module) -> bool {
        let mut changed = false;
        module.for_each_expr_mut(&mut |expr| self.substitute(expr, &mut changed));
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagType;
    use crate::python::parse;
    use crate::transform::testing::before_after;
    use expect_test::{Expect, expect};
    use indoc::indoc;

    fn check(flag: FlagSpec, source: &str, expected: Expect) {
        let pass = FlagSubstitutionPass::new(&flag).unwrap();
        let module = parse(source).unwrap();
        expected.assert_eq(&before_after(&pass, module));
    }

    fn string_flag() -> FlagSpec {
        FlagSpec::new("color", FlagType::String, "blue")
    }

    #[test]
    fn should_replace_calls_with_the_flag_key() {
        check(
            string_flag(),
            indoc! {r#"
                color = client.variable(user, "color", "red")
                other = client.variable(user, "size", 3)
            "#},
            expect![[r#"
                -- before --
                color = client.variable(user, 'color', 'red')
                other = client.variable(user, 'size', 3)

                -- after --
                color = {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}
                other = client.variable(user, 'size', 3)
            "#]],
        );
    }

    #[test]
    fn should_match_variables_named_like_the_key_or_an_alias() {
        check(
            string_flag().with_alias("COLOR_KEY"),
            indoc! {r#"
                a = client.variable(user, COLOR_KEY, "red")
                b = client.variable(user, color, "red")
                c = client.variable(user, SIZE_KEY, "red")
            "#},
            expect![[r#"
                -- before --
                a = client.variable(user, COLOR_KEY, 'red')
                b = client.variable(user, color, 'red')
                c = client.variable(user, SIZE_KEY, 'red')

                -- after --
                a = {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}
                b = {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}
                c = client.variable(user, SIZE_KEY, 'red')
            "#]],
        );
    }

    #[test]
    fn should_replace_calls_nested_in_expressions_and_blocks() {
        check(
            string_flag(),
            indoc! {r#"
                def render(user):
                    if client.variable(user, "color", "red").value == "blue":
                        return [client.variable(user, "color", "red")["value"], 1]
            "#},
            expect![[r#"
                -- before --
                def render(user):
                    if client.variable(user, 'color', 'red').value == 'blue':
                        return [client.variable(user, 'color', 'red')['value'], 1]

                -- after --
                def render(user):
                    if {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}.value == 'blue':
                        return [{'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}['value'], 1]
            "#]],
        );
    }

    #[test]
    fn should_leave_calls_passed_to_other_calls_untouched() {
        check(
            string_flag(),
            indoc! {r#"
                paint(client.variable(user, "color", "red"))
                print(client.variable(user, "color", "red").value)
                log.info(label=client.variable(user, "color", "red"))
            "#},
            expect![[r#"
                -- before --
                paint(client.variable(user, 'color', 'red'))
                print(client.variable(user, 'color', 'red').value)
                log.info(label=client.variable(user, 'color', 'red'))

                -- after --
                paint(client.variable(user, 'color', 'red'))
                print(client.variable(user, 'color', 'red').value)
                log.info(label=client.variable(user, 'color', 'red'))
            "#]],
        );
    }

    #[test]
    fn should_replace_calls_in_loop_headers_and_annotated_statements() {
        check(
            string_flag(),
            indoc! {r#"
                while client.variable(user, "color", "red").value:
                    pass
                for part in client.variable(user, "color", "red").value:
                    pass
                with client.variable(user, "color", "red") as obj:
                    pass
                chosen: str = client.variable(user, "color", "red").value
                assert client.variable(user, "color", "red").isDefaulted
            "#},
            expect![[r#"
                -- before --
                while client.variable(user, 'color', 'red').value:
                    pass
                for part in client.variable(user, 'color', 'red').value:
                    pass
                with client.variable(user, 'color', 'red') as obj:
                    pass
                chosen: str = client.variable(user, 'color', 'red').value
                assert client.variable(user, 'color', 'red').isDefaulted

                -- after --
                while {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}.value:
                    pass
                for part in {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}.value:
                    pass
                with {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True} as obj:
                    pass
                chosen: str = {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}.value
                assert {'key': 'color', 'value': 'blue', 'defaultValue': 'blue', 'isDefaulted': True}.isDefaulted
            "#]],
        );
    }

    #[test]
    fn should_count_evaluations_left_in_opaque_text() {
        let pass = FlagSubstitutionPass::new(&string_flag().with_alias("COLOR_KEY")).unwrap();
        let module = parse(indoc! {r#"
            shades = [s for s in client.variable(user, "color", "red").value]
            pick = lambda u: client.variable(u, COLOR_KEY, "red")
            def render(c=client.variable(user, "color", "red")):
                print(f"{client.variable(user, 'color', 'red').value}")
            f(a,  # note
              client.variable(user, "color", "red"))
            sizes = [s for s in client.variable(user, "size", 1).value]
            names = [n for n in color_names]
        "#})
        .unwrap();
        assert_eq!(pass.count_opaque_evaluations(&module), 5);
    }

    #[test]
    fn should_ignore_other_methods_and_keyword_keys() {
        check(
            string_flag(),
            indoc! {r#"
                client.track(user, "color")
                client.variable(user, key="color")
                client.variable("color")
                variable(user, "color", "red")
            "#},
            expect![[r#"
                -- before --
                client.track(user, 'color')
                client.variable(user, key='color')
                client.variable('color')
                variable(user, 'color', 'red')

                -- after --
                client.track(user, 'color')
                client.variable(user, key='color')
                client.variable('color')
                variable(user, 'color', 'red')
            "#]],
        );
    }
}
