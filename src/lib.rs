//! Whole-program Mx* compiler targeting RV32IM textual assembly.
//!
//! The pipeline: frontend (lex, parse, check) → AST-to-IR lowering over a
//! memory-cell model → Mem2Reg promotion into SSA → dead-code elimination
//! and critical-edge splitting → iterated graph-coloring register
//! allocation → phi elimination by parallel-copy scheduling → assembly
//! emission. The output links against a small runtime (`builtin.s`)
//! providing I/O, string primitives and heap allocation.

pub mod codegen;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod passes;
pub mod regalloc;

use std::io::Write;

use rustc_hash::FxHashMap;

pub use error::{MxcError, Result};

/// Compile Mx* source text to RV32IM assembly.
pub fn compile_to_assembly<W: Write>(source: &str, output: &mut W) -> Result<()> {
    let mut module = compile_to_ir(source, true)?;
    let mut allocs = FxHashMap::default();
    for func in module.functions.iter_mut() {
        let alloc = regalloc::allocate(func)?;
        regalloc::phi_elim::eliminate(func, &alloc)?;
        func.validate()?;
        allocs.insert(func.name.clone(), alloc);
    }
    codegen::generate_assembly(&module, &allocs, output)
}

/// Front half of the pipeline: checked AST lowered to IR, optionally taken
/// through the middle-end passes. Exposed for `--emit-ir` and tests.
pub fn compile_to_ir(source: &str, run_passes: bool) -> Result<ir::Module> {
    let (program, checked) = frontend::parse_and_check(source)?;
    let mut module = ir::builder::build_module(&program, &checked)?;
    if run_passes {
        let pipeline = passes::PassPipeline::middle_end();
        pipeline.apply_to_module(&mut module)?;
    }
    Ok(module)
}
