mod binding_elimination;
mod binding_tracker;
mod dead_branch_elimination;
mod expression_folding;
mod flag_substitution;
mod projection_reduction;

pub use binding_elimination::BindingEliminationPass;
pub use binding_tracker::{Binding, BindingMap};
pub use dead_branch_elimination::DeadBranchEliminationPass;
pub use expression_folding::ExpressionFoldingPass;
pub use flag_substitution::FlagSubstitutionPass;
pub use projection_reduction::ProjectionReductionPass;

use crate::syntax::Module;

pub trait Pass {
    /// Name used when logging which passes changed the module.
    fn name(&self) -> &'static str;

    /// Run the pass over the module, returning whether anything changed.
    fn run(&self, module: &mut Module) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{
        BindingEliminationPass, BindingMap, FlagSubstitutionPass, Pass, ProjectionReductionPass,
    };
    use crate::flag::{FlagSpec, FlagType};
    use crate::python::{parse, unparse};
    use crate::syntax::Module;

    pub fn boolean_flag(value: &str) -> FlagSpec {
        FlagSpec::new("flag", FlagType::Boolean, value)
    }

    /// Parse `source` and substitute the calls accessing `flag`.
    pub fn substituted(source: &str, flag: &FlagSpec) -> Module {
        let mut module = parse(source).expect("source should parse");
        let pass = FlagSubstitutionPass::new(flag).expect("flag should materialize");
        pass.run(&mut module);
        module
    }

    /// Substitute, reduce and inline, leaving folding to the caller.
    pub fn prepared(source: &str, flag: &FlagSpec) -> Module {
        let mut module = substituted(source, flag);
        ProjectionReductionPass.run(&mut module);
        let bindings = BindingMap::build(&module);
        BindingEliminationPass::new(&bindings).run(&mut module);
        module
    }

    /// Run `pass` over a copy of `module` and render both versions.
    pub fn before_after(pass: &dyn Pass, module: Module) -> String {
        let before = module;
        let mut after = before.clone();
        let changed = pass.run(&mut after);
        assert_eq!(changed, before != after, "{} misreported a change", pass.name());
        format!(
            "-- before --\n{}\n-- after --\n{}",
            unparse(&before).expect("before should unparse"),
            unparse(&after).expect("after should unparse"),
        )
    }
}
