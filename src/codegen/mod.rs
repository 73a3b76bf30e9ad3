//! Code generation backends.
//!
//! RV32IM is the only target; the per-target module layout keeps the
//! emitter's platform tables next to the code using them.

pub mod riscv;

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::ir::Module;
use crate::regalloc::Allocation;

/// Emit RV32IM assembly for a fully lowered module (phi-free, colored).
pub fn generate_assembly<W: Write>(
    module: &Module,
    allocs: &FxHashMap<String, Allocation>,
    writer: &mut W,
) -> Result<()> {
    riscv::generate(module, allocs, writer)
}
