//! The Mx* intermediate representation.
//!
//! An LLVM-style three-address IR over virtual registers and explicit memory
//! cells. The builder lowers the checked AST into memory-cell form (every
//! local behind an `alloca`); Mem2Reg promotes the non-escaping cells to SSA
//! with phi nodes; register allocation and phi elimination then bring the
//! module down to physically-assigned, phi-free form for the emitter.

pub mod builder;
pub mod function;
pub mod instruction;
pub mod module;
pub mod types;

pub use function::{Block, Function, FunctionBuilder, Param};
pub use instruction::{BinOp, CmpOp, CopySrc, Inst, Loc};
pub use module::{ClassLayout, GlobalVar, Module};
pub use types::{SlotId, SlotKind, SlotPool, Ty, VReg, VRegPool, Value};
