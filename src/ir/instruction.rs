//! Instruction definitions for the Mx* IR.
//!
//! Instructions are tagged variants sharing the three-address shape: an
//! optional result register plus value operands. Control-flow terminators
//! (`Br`, `Jmp`, `Ret`) are ordinary variants; every block ends with exactly
//! one of them.
//!
//! `Phi` appears only between Mem2Reg and phi elimination. `Copy` appears
//! only after register allocation, when phi elimination lowers each phi into
//! location-level moves in the predecessor blocks.

use std::fmt;

use super::types::{SlotId, Ty, VReg, Value};

/// Binary arithmetic and bitwise operations on i32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Srem,
    And,
    Or,
    Xor,
    Shl,
    Ashr,
}

impl BinOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Sdiv => "sdiv",
            BinOp::Srem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Ashr => "ashr",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison predicates, producing an i1 result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "slt",
            CmpOp::Le => "sle",
            CmpOp::Gt => "sgt",
            CmpOp::Ge => "sge",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A physical location, known only after register allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Loc {
    /// A physical register, by its ABI name.
    Reg(&'static str),
    /// A stack slot in the current frame.
    Slot(SlotId),
    /// The i-th stack-passed incoming argument (i >= 8).
    InArg(usize),
    /// The i-th stack-passed outgoing argument (i >= 8).
    OutArg(usize),
}

impl Loc {
    pub fn is_mem(&self) -> bool {
        !matches!(self, Loc::Reg(_))
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Reg(name) => write!(f, "{}", name),
            Loc::Slot(s) => write!(f, "{}", s),
            Loc::InArg(i) => write!(f, "inarg{}", i),
            Loc::OutArg(i) => write!(f, "outarg{}", i),
        }
    }
}

/// Source operand of a post-allocation copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CopySrc {
    Loc(Loc),
    Int(i32),
    Null,
    Global(String),
    Str(usize),
}

impl fmt::Display for CopySrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopySrc::Loc(l) => write!(f, "{}", l),
            CopySrc::Int(v) => write!(f, "{}", v),
            CopySrc::Null => write!(f, "null"),
            CopySrc::Global(name) => write!(f, "@{}", name),
            CopySrc::Str(idx) => write!(f, "@.str.{}", idx),
        }
    }
}

/// A single instruction in a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Reserve a stack cell; the result holds its address.
    Alloca { result: VReg, ty: Ty, slot: SlotId },
    Load {
        result: VReg,
        ty: Ty,
        ptr: Value,
    },
    Store {
        ty: Ty,
        value: Value,
        ptr: Value,
    },
    Binary {
        op: BinOp,
        result: VReg,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        op: CmpOp,
        result: VReg,
        lhs: Value,
        rhs: Value,
    },
    /// Address of a 4-byte field slot: `base + 4 * field_index`.
    GetFieldPtr {
        result: VReg,
        base: Value,
        field_index: usize,
    },
    /// Address of a 4-byte array element: `base + 4 * index`.
    GetElemPtr {
        result: VReg,
        base: Value,
        index: Value,
    },
    Call {
        result: Option<VReg>,
        func: String,
        args: Vec<Value>,
    },
    /// SSA merge. Operand order matches the block's predecessor order.
    Phi {
        result: VReg,
        ty: Ty,
        incoming: Vec<(Value, String)>,
    },
    Br {
        cond: Value,
        true_label: String,
        false_label: String,
    },
    Jmp {
        target: String,
    },
    Ret {
        value: Option<Value>,
    },
    /// Location-level move produced by phi elimination.
    Copy {
        dst: Loc,
        src: CopySrc,
    },
}

impl Inst {
    /// The register this instruction defines, if any.
    pub fn def_reg(&self) -> Option<VReg> {
        match self {
            Inst::Alloca { result, .. }
            | Inst::Load { result, .. }
            | Inst::Binary { result, .. }
            | Inst::Cmp { result, .. }
            | Inst::GetFieldPtr { result, .. }
            | Inst::GetElemPtr { result, .. }
            | Inst::Phi { result, .. } => Some(*result),
            Inst::Call { result, .. } => *result,
            _ => None,
        }
    }

    /// Registers read by this instruction. For `Phi` this includes every
    /// incoming operand; liveness and interference treat phis specially and
    /// match on the variant instead of calling this.
    pub fn used_regs(&self) -> Vec<VReg> {
        let mut out = Vec::new();
        self.for_each_value(|v| {
            if let Value::Reg(r) = v {
                out.push(*r);
            }
        });
        out
    }

    /// Visit every value operand.
    pub fn for_each_value(&self, mut f: impl FnMut(&Value)) {
        match self {
            Inst::Alloca { .. } | Inst::Jmp { .. } | Inst::Copy { .. } => {}
            Inst::Load { ptr, .. } => f(ptr),
            Inst::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            Inst::Binary { lhs, rhs, .. } | Inst::Cmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Inst::GetFieldPtr { base, .. } => f(base),
            Inst::GetElemPtr { base, index, .. } => {
                f(base);
                f(index);
            }
            Inst::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Inst::Phi { incoming, .. } => {
                for (v, _) in incoming {
                    f(v);
                }
            }
            Inst::Br { cond, .. } => f(cond),
            Inst::Ret { value } => {
                if let Some(v) = value {
                    f(v);
                }
            }
        }
    }

    /// Visit every value operand mutably.
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Inst::Alloca { .. } | Inst::Jmp { .. } | Inst::Copy { .. } => {}
            Inst::Load { ptr, .. } => f(ptr),
            Inst::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            Inst::Binary { lhs, rhs, .. } | Inst::Cmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Inst::GetFieldPtr { base, .. } => f(base),
            Inst::GetElemPtr { base, index, .. } => {
                f(base);
                f(index);
            }
            Inst::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Inst::Phi { incoming, .. } => {
                for (v, _) in incoming {
                    f(v);
                }
            }
            Inst::Br { cond, .. } => f(cond),
            Inst::Ret { value } => {
                if let Some(v) = value {
                    f(v);
                }
            }
        }
    }

    /// Replace the defined register. No-op for instructions without one.
    pub fn replace_def(&mut self, new: VReg) {
        match self {
            Inst::Alloca { result, .. }
            | Inst::Load { result, .. }
            | Inst::Binary { result, .. }
            | Inst::Cmp { result, .. }
            | Inst::GetFieldPtr { result, .. }
            | Inst::GetElemPtr { result, .. }
            | Inst::Phi { result, .. } => *result = new,
            Inst::Call { result, .. } => {
                if result.is_some() {
                    *result = Some(new);
                }
            }
            _ => {}
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Br { .. } | Inst::Jmp { .. } | Inst::Ret { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    /// Whether removing this instruction could change observable behavior
    /// even when its result is unused.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Inst::Store { .. }
                | Inst::Call { .. }
                | Inst::Br { .. }
                | Inst::Jmp { .. }
                | Inst::Ret { .. }
                | Inst::Copy { .. }
        )
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Alloca { result, ty, slot } => {
                write!(f, "{} = alloca.{} ({})", result, ty, slot)
            }
            Inst::Load { result, ty, ptr } => write!(f, "{} = load.{} {}", result, ty, ptr),
            Inst::Store { ty, value, ptr } => write!(f, "store.{} {}, {}", ty, value, ptr),
            Inst::Binary {
                op,
                result,
                lhs,
                rhs,
            } => write!(f, "{} = {} {}, {}", result, op, lhs, rhs),
            Inst::Cmp {
                op,
                result,
                lhs,
                rhs,
            } => write!(f, "{} = icmp {} {}, {}", result, op, lhs, rhs),
            Inst::GetFieldPtr {
                result,
                base,
                field_index,
            } => write!(f, "{} = getfieldptr {}, {}", result, base, field_index),
            Inst::GetElemPtr {
                result,
                base,
                index,
            } => write!(f, "{} = getelemptr {}, {}", result, base, index),
            Inst::Call { result, func, args } => {
                if let Some(res) = result {
                    write!(f, "{} = call @{}(", res, func)?;
                } else {
                    write!(f, "call @{}(", func)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Inst::Phi {
                result,
                ty,
                incoming,
            } => {
                write!(f, "{} = phi.{} ", result, ty)?;
                for (i, (val, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, {}]", val, label)?;
                }
                Ok(())
            }
            Inst::Br {
                cond,
                true_label,
                false_label,
            } => write!(f, "br {}, {}, {}", cond, true_label, false_label),
            Inst::Jmp { target } => write!(f, "jmp {}", target),
            Inst::Ret { value } => match value {
                Some(v) => write!(f, "ret {}", v),
                None => write!(f, "ret void"),
            },
            Inst::Copy { dst, src } => write!(f, "copy {} <- {}", dst, src),
        }
    }
}
