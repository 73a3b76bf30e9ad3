//! Dead-code elimination.
//!
//! Removes instructions whose results are never used and which have no side
//! effect (stores, calls and terminators always stay). Iterates to a fixed
//! point so chains of dead definitions disappear in one `apply`; a second
//! application removes nothing.

use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::ir::{Function, Inst, VReg};

use super::Pass;

/// Statistics from one DCE run.
#[derive(Debug, Default)]
pub struct DceStats {
    pub instructions_removed: usize,
}

#[derive(Default)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead_code_elimination"
    }

    fn description(&self) -> &'static str {
        "Remove side-effect-free instructions whose results are unused"
    }

    fn apply(&self, func: &mut Function) -> Result<bool> {
        Ok(run(func).instructions_removed > 0)
    }
}

pub fn run(func: &mut Function) -> DceStats {
    let mut stats = DceStats::default();
    loop {
        let used = used_registers(func);
        let mut removed = 0;
        for block in &mut func.blocks {
            let before = block.insts.len();
            block.insts.retain(|inst| {
                if inst.has_side_effects() || inst.is_terminator() {
                    return true;
                }
                match inst.def_reg() {
                    Some(r) => used.contains(&r),
                    None => true,
                }
            });
            removed += before - block.insts.len();
        }
        stats.instructions_removed += removed;
        if removed == 0 {
            return stats;
        }
    }
}

fn used_registers(func: &Function) -> FxHashSet<VReg> {
    let mut used = FxHashSet::default();
    for block in &func.blocks {
        for inst in &block.insts {
            match inst {
                Inst::Phi { incoming, result, .. } => {
                    // A phi keeps its operands alive only if the phi itself
                    // is alive somewhere else; self-feeding loops through a
                    // single phi still count here, which is conservative but
                    // cheap.
                    let _ = result;
                    for (v, _) in incoming {
                        if let Some(r) = v.as_reg() {
                            used.insert(r);
                        }
                    }
                }
                other => other.for_each_value(|v| {
                    if let Some(r) = v.as_reg() {
                        used.insert(r);
                    }
                }),
            }
        }
    }
    used
}
