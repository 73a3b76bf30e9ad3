//! Frontend: lexer, parser and semantic checker for Mx*.
//!
//! The IR core consumes the frontend's output through a narrow contract:
//! every identifier resolved, every expression typed (in `Checked::types`),
//! every break/continue targeted, every return path well-typed.

pub mod ast;
pub mod checker;
pub mod lexer;
pub mod parser;
pub mod token;

pub use checker::{check, Checked, ClassInfo, FuncSig, SemTy};

use crate::error::Result;

/// Lex, parse and check a whole Mx* source text.
pub fn parse_and_check(source: &str) -> Result<(ast::Program, Checked)> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::Parser::new(tokens).parse_program()?;
    let checked = check(&program)?;
    Ok((program, checked))
}
