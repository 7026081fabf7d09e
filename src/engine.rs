use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::flag::{FlagSpec, TypeCoercionError};
use crate::{log_debug, log_warn};
use crate::python::{ParseError, PythonFrontend, SerializationError};
use crate::syntax::Module;
use crate::transform::{
    BindingEliminationPass, BindingMap, DeadBranchEliminationPass, ExpressionFoldingPass,
    FlagSubstitutionPass, Pass, ProjectionReductionPass,
};

/// Upper bound on fixpoint iterations for a single artifact.
pub const MAX_ITERATIONS: usize = 10;

/// Converts between source text and the syntax tree the passes rewrite.
pub trait Frontend {
    fn parse(&self, source: &str) -> Result<Module, ParseError>;
    fn unparse(&self, module: &Module) -> Result<String, SerializationError>;
}

/// Where a rewritten artifact goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Print the result, changed or not.
    #[default]
    Console,
    /// Overwrite the artifact, only when something changed.
    File,
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub output: OutputMode,
    /// Variable names holding the flag key, in addition to those of the flag.
    pub aliases: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: ParseError },

    #[error("Failed to write {} as source: {source}", path.display())]
    Serialization {
        path: PathBuf,
        source: SerializationError,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// The outcome of the fixpoint loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub module: Module,
    /// Whether any iteration changed the module.
    pub dirty: bool,
    /// Number of iterations run, the final unchanged one included.
    pub iterations: usize,
}

/// The outcome of refactoring one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refactored {
    pub path: PathBuf,
    pub output: String,
    pub dirty: bool,
    /// Whether the artifact on disk was overwritten.
    pub written: bool,
    /// Fragments kept as written that still appear to evaluate the flag.
    pub opaque_evaluations: usize,
}

/// Removes one flag from source artifacts.
///
/// An engine holds no state between artifacts, so one engine may process
/// any number of them in turn.
pub struct Engine<F = PythonFrontend> {
    frontend: F,
    options: Options,
    substitution: FlagSubstitutionPass,
}

impl Engine<PythonFrontend> {
    pub fn new(flag: &FlagSpec, options: Options) -> Result<Self, TypeCoercionError> {
        Self::with_frontend(PythonFrontend, flag, options)
    }
}

impl<F: Frontend> Engine<F> {
    /// Fails when the flag value cannot be coerced to its declared type,
    /// before any artifact is looked at.
    pub fn with_frontend(
        frontend: F,
        flag: &FlagSpec,
        options: Options,
    ) -> Result<Self, TypeCoercionError> {
        let mut flag = flag.clone();
        flag.aliases.extend(options.aliases.iter().cloned());
        let substitution = FlagSubstitutionPass::new(&flag)?;
        Ok(Self {
            frontend,
            options,
            substitution,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run the passes until an iteration leaves the module unchanged, or
    /// until [`MAX_ITERATIONS`] iterations have run.
    pub fn rewrite(&self, mut module: Module) -> Rewritten {
        let mut dirty = false;
        let mut iterations = 0;
        while iterations < MAX_ITERATIONS {
            iterations += 1;
            let changed = self.iterate(&mut module);
            log_debug!(
                "rewrite",
                iteration = iterations,
                changed = if changed.is_empty() {
                    "none".to_string()
                } else {
                    changed.join(",")
                },
            );
            if changed.is_empty() {
                break;
            }
            dirty = true;
        }
        log_debug!("rewrite", iterations = iterations, dirty = dirty);
        Rewritten {
            module,
            dirty,
            iterations,
        }
    }

    /// One ordered run of every pass. Returns the names of the passes that
    /// changed the module.
    fn iterate(&self, module: &mut Module) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut run = |pass: &dyn Pass, module: &mut Module| {
            if pass.run(module) {
                changed.push(pass.name());
            }
        };
        run(&self.substitution, module);
        run(&ProjectionReductionPass, module);
        // Bindings are recomputed every iteration since the passes above
        // may have produced new ones.
        let bindings = BindingMap::build(module);
        run(&BindingEliminationPass::new(&bindings), module);
        run(&ExpressionFoldingPass::new(&bindings), module);
        run(&DeadBranchEliminationPass::new(&bindings), module);
        changed
    }

    /// Parse, rewrite and unparse in-memory source text.
    pub fn refactor_source(&self, source: &str) -> Result<Refactored, CleanupError> {
        self.refactor(Path::new("<source>"), source)
    }

    fn refactor(&self, path: &Path, source: &str) -> Result<Refactored, CleanupError> {
        let module = self
            .frontend
            .parse(source)
            .map_err(|source| CleanupError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let rewritten = self.rewrite(module);
        let opaque_evaluations = self.substitution.count_opaque_evaluations(&rewritten.module);
        if opaque_evaluations > 0 {
            log_warn!(
                "refactor",
                file = path.display(),
                remaining = opaque_evaluations,
                message = "flag evaluations in unsupported syntax were left as written",
            );
        }
        let output = if rewritten.dirty {
            self.frontend
                .unparse(&rewritten.module)
                .map_err(|source| CleanupError::Serialization {
                    path: path.to_path_buf(),
                    source,
                })?
        } else {
            source.to_string()
        };
        Ok(Refactored {
            path: path.to_path_buf(),
            output,
            dirty: rewritten.dirty,
            written: false,
            opaque_evaluations,
        })
    }

    /// Refactor the artifact at `path`.
    ///
    /// In console mode the result is written to `stdout` whether or not
    /// anything changed. In file mode the artifact is overwritten only when
    /// something changed. Nothing is written when any step fails.
    pub fn refactor_file(
        &self,
        path: &Path,
        stdout: &mut dyn Write,
    ) -> Result<Refactored, CleanupError> {
        let source = fs::read_to_string(path).map_err(|source| CleanupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut refactored = self.refactor(path, &source)?;
        let write_error = |source| CleanupError::Write {
            path: path.to_path_buf(),
            source,
        };
        match self.options.output {
            OutputMode::Console => {
                stdout
                    .write_all(refactored.output.as_bytes())
                    .map_err(write_error)?;
            }
            OutputMode::File if refactored.dirty => {
                fs::write(path, &refactored.output).map_err(write_error)?;
                refactored.written = true;
            }
            OutputMode::File => {}
        }
        Ok(refactored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagType;
    use crate::python::{parse, unparse};
    use expect_test::{Expect, expect};
    use indoc::indoc;
    use itertools::Itertools as _;
    use tempfile::TempDir;

    fn boolean_flag(value: &str) -> FlagSpec {
        FlagSpec::new("flag", FlagType::Boolean, value)
    }

    fn engine(flag: &FlagSpec) -> Engine {
        Engine::new(flag, Options::default()).unwrap()
    }

    fn check(flag: FlagSpec, source: &str, expected: Expect) {
        let refactored = engine(&flag).refactor_source(source).unwrap();
        expected.assert_eq(&refactored.output);
    }

    #[test]
    fn should_keep_the_true_branch_of_an_equality_check() {
        check(
            boolean_flag("true"),
            indoc! {r#"
                if client.variable(user, "flag", False).value == True:
                    A()
                else:
                    B()
            "#},
            expect![[r#"
                A()
            "#]],
        );
    }

    #[test]
    fn should_keep_the_else_branch_when_the_flag_is_off() {
        check(
            boolean_flag("false"),
            indoc! {r#"
                if client.variable(user, "flag", False).value == True:
                    A()
                else:
                    B()
            "#},
            expect![[r#"
                B()
            "#]],
        );
    }

    #[test]
    fn should_inline_flag_objects_and_finish_chains_over_iterations() {
        let source = indoc! {r#"
            x = client.variable(user, "flag", False)
            if x.value and True:
                C()
        "#};
        let engine = engine(&boolean_flag("true"));
        let rewritten = engine.rewrite(parse(source).unwrap());
        assert!(rewritten.dirty);
        assert_eq!(rewritten.iterations, 3);
        expect![[r#"
            C()
        "#]]
        .assert_eq(&unparse(&rewritten.module).unwrap());
    }

    #[test]
    fn should_fold_number_comparisons() {
        let source = indoc! {r#"
            if client.variable(user, "num", 7).value == 7:
                D()
            after()
        "#};
        check(
            FlagSpec::new("num", FlagType::Number, "7"),
            source,
            expect![[r#"
                D()
                after()
            "#]],
        );
        check(
            FlagSpec::new("num", FlagType::Number, "8"),
            source,
            expect![[r#"
                after()
            "#]],
        );
    }

    #[test]
    fn should_leave_sources_without_the_flag_untouched() {
        let source = indoc! {r#"
            import os
            if True == True:  # this shouldn't change
                print(os.getcwd())
            value = client.variable(user, "other", False).value


            print(value)
        "#};
        let refactored = engine(&boolean_flag("true")).refactor_source(source).unwrap();
        assert!(!refactored.dirty);
        assert_eq!(refactored.output, source);
    }

    #[test]
    fn should_be_idempotent() {
        let source = indoc! {r#"
            SHOW = "flag"
            enabled = client.variable(user, SHOW, False).value
            label = "on" if enabled else "off"
            if enabled and user.is_admin:
                show_admin()  # admins only
            elif not enabled:
                hide()
            for item in items:
                if client.variable(user, "flag", False).value or item.ready:
                    render(item)
        "#};
        let engine = Engine::new(
            &boolean_flag("true"),
            Options {
                aliases: ["SHOW".to_string()].into(),
                ..Options::default()
            },
        )
        .unwrap();
        let first = engine.refactor_source(source).unwrap();
        assert!(first.dirty);
        expect![[r#"
            SHOW = 'flag'
            label = 'on'
            if user.is_admin:
                show_admin()  # admins only
            for item in items:
                render(item)
        "#]]
        .assert_eq(&first.output);

        let second = engine.refactor_source(&first.output).unwrap();
        assert!(!second.dirty);
        assert_eq!(second.output, first.output);
    }

    #[test]
    fn aliases_should_substitute_the_same_object_as_the_key() {
        let by_key = engine(&boolean_flag("true"))
            .rewrite(parse("x = client.variable(user, 'flag', False)\nuse(x)\n").unwrap());
        let by_alias = Engine::new(
            &boolean_flag("true"),
            Options {
                aliases: ["FLAG_KEY".to_string()].into(),
                ..Options::default()
            },
        )
        .unwrap()
        .rewrite(parse("x = client.variable(user, FLAG_KEY, False)\nuse(x)\n").unwrap());
        assert_eq!(by_key.module, by_alias.module);
        expect![[r#"
            use({'key': 'flag', 'value': True, 'defaultValue': True, 'isDefaulted': True})
        "#]]
        .assert_eq(&unparse(&by_alias.module).unwrap());
    }

    #[test]
    fn boolean_operators_should_fold_soundly() {
        for b2 in [true, false] {
            let flag = boolean_flag(if b2 { "true" } else { "false" });
            let engine = engine(&flag);
            for op in ["and", "or"] {
                let source =
                    format!("if ready {op} client.variable(u, 'flag', 0).value:\n    go()\n");
                let output = engine.refactor_source(&source).unwrap().output;
                let expected = match (op, b2) {
                    ("and", false) => "",
                    ("or", true) => "go()\n",
                    _ => "if ready:\n    go()\n",
                };
                assert_eq!(output, expected, "ready {op} {b2}");
            }
        }
    }

    #[test]
    fn should_keep_flag_calls_passed_as_arguments() {
        let source = indoc! {r#"
            track(client.variable(u, "flag", False))
            print(client.variable(u, "flag", False).value)
        "#};
        let refactored = engine(&boolean_flag("true")).refactor_source(source).unwrap();
        assert!(!refactored.dirty);
        assert_eq!(refactored.output, source);
    }

    #[test]
    fn should_rewrite_loops_asserts_and_annotated_assignments() {
        check(
            boolean_flag("true"),
            indoc! {r#"
                enabled: bool = client.variable(u, "flag", False).value
                assert client.variable(u, "flag", False).value, "flag is off"
                while not client.variable(u, "flag", False).value:
                    wait()
                for item in items if client.variable(u, "flag", False).value else []:
                    render(item)
                retries += 1 if client.variable(u, "flag", False).value else 2
            "#},
            expect![[r#"
                enabled: bool = True
                assert True, 'flag is off'
                while False:
                    wait()
                for item in items:
                    render(item)
                retries += 1
            "#]],
        );
    }

    #[test]
    fn should_count_evaluations_it_cannot_rewrite() {
        let source = indoc! {r#"
            names = [n for n in users if client.variable(n, "flag", False).value]
            if client.variable(u, "flag", False).value:
                go()
        "#};
        let refactored = engine(&boolean_flag("true")).refactor_source(source).unwrap();
        assert!(refactored.dirty);
        assert_eq!(refactored.opaque_evaluations, 1);
        expect![[r#"
            names = [n for n in users if client.variable(n, "flag", False).value]
            go()
        "#]]
        .assert_eq(&refactored.output);
    }

    #[test]
    fn should_reject_values_of_the_wrong_type() {
        let Err(err) = Engine::new(
            &FlagSpec::new("num", FlagType::Number, "many"),
            Options::default(),
        ) else {
            panic!("expected a coercion error");
        };
        expect![[r#"Value "many" of flag 'num' is not a number"#]].assert_eq(&err.to_string());
    }

    #[test]
    fn should_report_parse_errors_with_the_path() {
        let err = engine(&boolean_flag("true"))
            .refactor_source("if (x:\n    pass\n")
            .unwrap_err();
        assert!(matches!(err, CleanupError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse <source>: "), "{err}");
    }

    #[test]
    fn file_mode_should_only_write_changed_files() {
        let dir = TempDir::new().unwrap();
        let changed = dir.path().join("changed.py");
        let unchanged = dir.path().join("unchanged.py");
        fs::write(&changed, "if client.variable(u, 'flag', False).value:\n    go()\n").unwrap();
        fs::write(&unchanged, "go()  # as is\n\n\n").unwrap();

        let engine = Engine::new(
            &boolean_flag("true"),
            Options {
                output: OutputMode::File,
                ..Options::default()
            },
        )
        .unwrap();
        let mut stdout = Vec::new();

        let result = engine.refactor_file(&changed, &mut stdout).unwrap();
        assert!(result.dirty && result.written);
        assert_eq!(fs::read_to_string(&changed).unwrap(), "go()\n");

        let result = engine.refactor_file(&unchanged, &mut stdout).unwrap();
        assert!(!result.dirty && !result.written);
        assert_eq!(fs::read_to_string(&unchanged).unwrap(), "go()  # as is\n\n\n");

        assert!(stdout.is_empty());
    }

    #[test]
    fn console_mode_should_print_without_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.py");
        let source = "if client.variable(u, 'flag', False).value:\n    go()\n";
        fs::write(&path, source).unwrap();

        let mut stdout = Vec::new();
        let result = engine(&boolean_flag("true"))
            .refactor_file(&path, &mut stdout)
            .unwrap();
        assert!(result.dirty && !result.written);
        assert_eq!(String::from_utf8(stdout).unwrap(), "go()\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn should_not_touch_files_that_fail_to_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.py");
        let source = "if client.variable(u, 'flag', False).value:\ngo()\n";
        fs::write(&path, source).unwrap();

        let engine = Engine::new(
            &boolean_flag("true"),
            Options {
                output: OutputMode::File,
                ..Options::default()
            },
        )
        .unwrap();
        let err = engine.refactor_file(&path, &mut io::sink()).unwrap_err();
        assert!(matches!(err, CleanupError::Parse { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn should_report_missing_files() {
        let dir = TempDir::new().unwrap();
        let err = engine(&boolean_flag("true"))
            .refactor_file(&dir.path().join("missing.py"), &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, CleanupError::Read { .. }));
    }

    /// Parses like Python but cannot write anything back.
    struct ReadOnlyFrontend;

    impl Frontend for ReadOnlyFrontend {
        fn parse(&self, source: &str) -> Result<Module, ParseError> {
            parse(source)
        }

        fn unparse(&self, _: &Module) -> Result<String, SerializationError> {
            Err(SerializationError::NonFiniteNumber { value: f64::NAN })
        }
    }

    #[test]
    fn should_not_touch_files_that_fail_to_serialize() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.py");
        let source = "if client.variable(u, 'flag', False).value:\n    go()\n";
        fs::write(&path, source).unwrap();

        let engine = Engine::with_frontend(
            ReadOnlyFrontend,
            &boolean_flag("true"),
            Options {
                output: OutputMode::File,
                ..Options::default()
            },
        )
        .unwrap();
        let err = engine.refactor_file(&path, &mut io::sink()).unwrap_err();
        assert!(matches!(err, CleanupError::Serialization { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn should_stop_after_the_iteration_cap() {
        // a chain folds one operand per iteration
        let chain = (0..MAX_ITERATIONS + 2)
            .map(|_| "client.variable(u, 'flag', 0).value")
            .join(" and ");
        let engine = engine(&boolean_flag("true"));
        let rewritten = engine.rewrite(parse(&format!("x = {chain}\n")).unwrap());
        assert!(rewritten.dirty);
        assert_eq!(rewritten.iterations, MAX_ITERATIONS);
        expect![[r#"
            x = True and True
        "#]]
        .assert_eq(&unparse(&rewritten.module).unwrap());
    }
}
