//! Error types for the Mx* compiler.
//!
//! One enum covers the whole pipeline, from lexing through assembly emission.
//! User-facing errors (lexing, parsing, semantic checking) carry source
//! positions; everything downstream of the checker is a compiler bug and maps
//! to an internal variant with a function/block context string.

use thiserror::Error;

/// Main error type for the Mx* compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MxcError {
    /// Errors encountered while tokenizing source text.
    #[error("Lex Error: line {line}: {msg}")]
    Lex { line: u32, msg: String },
    /// Errors encountered during parsing.
    #[error("Parse Error: line {line}: {msg}")]
    Parse { line: u32, msg: String },
    /// Errors reported by the semantic checker.
    #[error("Semantic Error: line {line}: {msg}")]
    Semantic { line: u32, msg: String },
    /// IR-shape violations: missing terminators, pred/succ desync, phi arity
    /// mismatches. Always a compiler bug, never a user program defect.
    #[error("IR Error: {0}")]
    IrShape(String),
    /// The register allocator failed to converge within its iteration bound.
    #[error("Regalloc Error: {0}")]
    Regalloc(String),
    /// Errors during assembly emission.
    #[error("Codegen Error: {0}")]
    Codegen(String),
    /// I/O errors when reading source or writing assembly.
    #[error("IO Error: {0}")]
    Io(String),
    /// Internal compiler errors indicating bugs.
    #[error("Internal Error: {0}")]
    Internal(String),
}

impl MxcError {
    /// Shorthand for an IR-shape violation located in a function/block.
    pub fn ir_shape(func: &str, block: &str, msg: impl AsRef<str>) -> Self {
        MxcError::IrShape(format!("{}/{}: {}", func, block, msg.as_ref()))
    }
}

impl From<std::io::Error> for MxcError {
    fn from(err: std::io::Error) -> Self {
        MxcError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MxcError>;
