pub mod ast;
pub mod branch;
pub mod codegen;
pub mod coerce;
pub mod error;
mod expr;
pub mod options;
pub mod scope;
pub mod typeck;

pub use error::{CompileError, Diagnostic, Severity};
pub use options::Options;

use slate_bytecode::Code;
use tracing::debug;

use crate::ast::Program;

/// Translates programs with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    options: Options,
}

impl Translator {
    pub fn new(options: Options) -> Self {
        Translator { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Compile a program to a code container, or return the first error.
    pub fn translate(&self, program: &Program) -> Result<Code, CompileError> {
        let code = codegen::emit(program, &self.options)?;
        if self.options.validate {
            slate_bytecode::validate::validate(&code)?;
        }
        debug!(
            functions = code.functions().len(),
            constants = code.constants().len(),
            natives = code.natives().len(),
            "translation finished"
        );
        Ok(code)
    }
}

/// Compile a program with default options.
pub fn translate(program: &Program) -> Result<Code, CompileError> {
    Translator::default().translate(program)
}
