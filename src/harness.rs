use crate::{
    language::{
        ast::CompilationUnit,
        errors::SyntaxErrors,
        lazy_rewriter, parser,
        typecheck::{self, TypeError},
    },
    runtime::{error::RuntimeError, value::Value, Interpreter},
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax errors")]
    Syntax(SyntaxErrors),
    #[error("lazy rewrite failed")]
    Rewrite(SyntaxErrors),
    #[error("type errors")]
    Type(Vec<TypeError>),
}

impl CompileError {
    pub fn syntax_errors(&self) -> Option<&SyntaxErrors> {
        match self {
            CompileError::Syntax(errors) | CompileError::Rewrite(errors) => Some(errors),
            CompileError::Type(_) => None,
        }
    }
}

// parse -> lazy rewrite -> typecheck. The rewrite hook fires exactly once per
// fully parsed unit, before any type-checking; the checker sees the rewritten
// tree and nothing else.
pub fn compile(name: &str, path: PathBuf, source: &str) -> Result<CompilationUnit, CompileError> {
    let unit = parser::parse_unit(name, path, source).map_err(CompileError::Syntax)?;
    let unit = lazy_rewriter::rewrite_unit(&unit).map_err(CompileError::Rewrite)?;
    typecheck::check_unit(&unit).map_err(CompileError::Type)?;
    Ok(unit)
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

// Compiles a source string and invokes a named zero-argument function in a
// fresh interpreter, returning whatever it returns.
pub fn run_function(source: &str, function: &str) -> Result<Value, HarnessError> {
    let unit = compile("harness", PathBuf::from("harness.latte"), source)?;
    let mut interpreter = Interpreter::new(&unit);
    Ok(interpreter.invoke(function, Vec::new())?)
}
