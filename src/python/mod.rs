//! Python frontend: tokenizer, parser and unparser for the subset of Python
//! the engine rewrites. Everything else is carried through as opaque text.

pub mod parse_error;
pub mod parser;
pub mod token;
pub mod tokenizer;
pub mod unparse;

pub use parse_error::ParseError;
pub use parser::parse;
pub use unparse::{SerializationError, unparse};

use crate::engine::Frontend;
use crate::syntax::Module;

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonFrontend;

impl Frontend for PythonFrontend {
    fn parse(&self, source: &str) -> Result<Module, ParseError> {
        parse(source)
    }

    fn unparse(&self, module: &Module) -> Result<String, SerializationError> {
        unparse(module)
    }
}
