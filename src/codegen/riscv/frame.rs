//! Stack frame layout for RV32.
//!
//! From the stack pointer upward: the outgoing-argument overflow area (for
//! calls passing more than eight arguments), then the stack slots
//! (un-promoted locals and spill slots, one word each), then the saved
//! callee-saved registers with `ra` on top. The total is 16-byte aligned as
//! the ABI requires at every call. Incoming stack arguments live just above
//! the frame.

use rustc_hash::FxHashSet;

use crate::error::{MxcError, Result};
use crate::ir::{Function, Inst, SlotId};
use crate::regalloc::Allocation;

use super::regs::{is_callee_saved, ARG_REGS};

/// sw/lw offsets are 12-bit signed immediates.
const MAX_IMM_OFFSET: i32 = 2040;

#[derive(Debug, Default)]
pub struct FrameLayout {
    /// Words reserved at sp+0 for stack-passed outgoing arguments.
    out_arg_words: usize,
    num_slots: usize,
    /// Callee-saved registers this function's coloring actually uses,
    /// saved in the prologue in this order.
    pub saved: Vec<&'static str>,
    /// Total frame size in bytes, 16-byte aligned.
    pub size: i32,
}

impl FrameLayout {
    pub fn compute(func: &Function, alloc: &Allocation) -> Result<FrameLayout> {
        let mut out_arg_words = 0usize;
        let mut used: FxHashSet<&'static str> = FxHashSet::default();

        for p in &func.params {
            used.insert(alloc.reg_name(p.reg)?);
        }
        for block in &func.blocks {
            for inst in &block.insts {
                if let Inst::Call { args, .. } = inst {
                    out_arg_words = out_arg_words.max(args.len().saturating_sub(ARG_REGS.len()));
                }
                if let Inst::Copy { dst, .. } = inst {
                    if let crate::ir::Loc::Reg(r) = dst {
                        used.insert(*r);
                    }
                }
                if let Some(d) = inst.def_reg() {
                    used.insert(alloc.reg_name(d)?);
                }
                for r in inst.used_regs() {
                    used.insert(alloc.reg_name(r)?);
                }
            }
        }

        let mut saved: Vec<&'static str> = used
            .into_iter()
            .filter(|r| is_callee_saved(r))
            .collect();
        saved.sort();

        let num_slots = func.slots.len();
        let raw = (out_arg_words + num_slots + saved.len() + 1) * 4; // +1 for ra
        let size = ((raw + 15) & !15) as i32;

        let layout = FrameLayout {
            out_arg_words,
            num_slots,
            saved,
            size,
        };
        if size > MAX_IMM_OFFSET {
            return Err(MxcError::Codegen(format!(
                "frame of '{}' is {} bytes, beyond the addressable range",
                func.name, size
            )));
        }
        Ok(layout)
    }

    pub fn slot_offset(&self, slot: SlotId) -> i32 {
        debug_assert!((slot.0 as usize) < self.num_slots);
        (self.out_arg_words * 4 + slot.0 as usize * 4) as i32
    }

    /// Offset of the i-th argument (i >= 8) in the caller's outgoing area.
    pub fn out_arg_offset(&self, i: usize) -> i32 {
        ((i - ARG_REGS.len()) * 4) as i32
    }

    /// Offset of this function's own i-th stack-passed parameter (i >= 8),
    /// just above the frame.
    pub fn in_arg_offset(&self, i: usize) -> i32 {
        self.size + ((i - ARG_REGS.len()) * 4) as i32
    }

    /// Offset where `ra` is saved.
    pub fn ra_offset(&self) -> i32 {
        self.size - 4
    }

    /// Offset of the j-th entry of `saved`.
    pub fn saved_offset(&self, j: usize) -> i32 {
        self.size - 8 - (j as i32) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SlotKind, Ty, Value};
    use crate::regalloc;
    use crate::passes::cfg;

    #[test]
    fn test_frame_is_16_byte_aligned() {
        let mut func = FunctionBuilder::new("t", Ty::Void)
            .block("entry")
            .inst(Inst::Ret { value: None })
            .build();
        func.slots.alloc(SlotKind::Local);
        func.slots.alloc(SlotKind::Local);
        cfg::recompute(&mut func);
        let alloc = regalloc::allocate(&mut func).unwrap();
        let frame = FrameLayout::compute(&func, &alloc).unwrap();
        assert_eq!(frame.size % 16, 0);
        assert!(frame.size >= 3 * 4); // two slots + ra
    }

    #[test]
    fn test_out_arg_area_reserved() {
        let mut func = FunctionBuilder::new("t", Ty::Void)
            .block("entry")
            .inst(Inst::Call {
                result: None,
                func: "many".into(),
                args: (0..10).map(Value::Int).collect(),
            })
            .inst(Inst::Ret { value: None })
            .build();
        cfg::recompute(&mut func);
        let alloc = regalloc::allocate(&mut func).unwrap();
        let frame = FrameLayout::compute(&func, &alloc).unwrap();
        // Two stack-passed arguments at sp+0 and sp+4.
        assert_eq!(frame.out_arg_offset(8), 0);
        assert_eq!(frame.out_arg_offset(9), 4);
        // Slots would start above them.
        assert_eq!(frame.in_arg_offset(8), frame.size);
    }

    #[test]
    fn test_offsets_disjoint() {
        let mut func = FunctionBuilder::new("t", Ty::Void)
            .block("entry")
            .inst(Inst::Ret { value: None })
            .build();
        let s0 = func.slots.alloc(SlotKind::Spill);
        let s1 = func.slots.alloc(SlotKind::Spill);
        cfg::recompute(&mut func);
        let alloc = regalloc::allocate(&mut func).unwrap();
        let frame = FrameLayout::compute(&func, &alloc).unwrap();
        assert_ne!(frame.slot_offset(s0), frame.slot_offset(s1));
        assert!(frame.slot_offset(s1) < frame.ra_offset());
    }
}
