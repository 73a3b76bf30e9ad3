//! Block-level liveness by iterative backward dataflow.
//!
//! `live_in[b] = use[b] ∪ (live_out[b] \ def[b])` and
//! `live_out[b] = ⋃ live_in[s]` over successors, iterated to a fixed point
//! in reverse order of layout (close enough to postorder for the loop shapes
//! the builder emits to converge in a few sweeps).
//!
//! Phis follow copy semantics: a phi's operand from predecessor p is live
//! out of p, not live into the phi's block; the phi's result is an ordinary
//! def of its block.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{Function, Inst, VReg};

/// Per-block liveness sets.
#[derive(Debug, Clone, Default)]
pub struct BlockLiveness {
    /// Upward-exposed uses: read before any local definition.
    pub use_set: FxHashSet<VReg>,
    /// Registers defined in this block (phi results included).
    pub def_set: FxHashSet<VReg>,
    pub live_in: FxHashSet<VReg>,
    pub live_out: FxHashSet<VReg>,
    /// Phi operands of the *successors* flowing along each outgoing edge,
    /// keyed by successor label. Included in `live_out`.
    pub phi_out: FxHashMap<String, FxHashSet<VReg>>,
}

/// Liveness result for one function, keyed by block label.
#[derive(Debug, Default)]
pub struct Liveness {
    pub blocks: FxHashMap<String, BlockLiveness>,
}

impl Liveness {
    pub fn of(&self, label: &str) -> &BlockLiveness {
        &self.blocks[label]
    }
}

pub fn analyze(func: &Function) -> Liveness {
    let mut result: FxHashMap<String, BlockLiveness> = FxHashMap::default();

    // One sweep for use/def plus the per-edge phi uses.
    for block in &func.blocks {
        let mut bl = BlockLiveness::default();
        for inst in &block.insts {
            match inst {
                Inst::Phi { result, .. } => {
                    // Operands are charged to the predecessors below.
                    bl.def_set.insert(*result);
                }
                _ => {
                    inst.for_each_value(|v| {
                        if let Some(r) = v.as_reg() {
                            if !bl.def_set.contains(&r) {
                                bl.use_set.insert(r);
                            }
                        }
                    });
                    if let Some(d) = inst.def_reg() {
                        bl.def_set.insert(d);
                    }
                }
            }
        }
        result.insert(block.label.clone(), bl);
    }

    for block in &func.blocks {
        for inst in block.phis() {
            let Inst::Phi { incoming, .. } = inst else {
                continue;
            };
            for (value, pred) in incoming {
                if let Some(r) = value.as_reg() {
                    if let Some(pred_bl) = result.get_mut(pred) {
                        pred_bl
                            .phi_out
                            .entry(block.label.clone())
                            .or_default()
                            .insert(r);
                    }
                }
            }
        }
    }

    // Parameters count as defined on entry.
    if let Some(entry) = result.get_mut(&func.entry) {
        for p in &func.params {
            entry.def_set.insert(p.reg);
        }
    }

    let labels: Vec<String> = func.blocks.iter().map(|b| b.label.clone()).collect();
    let succs: FxHashMap<String, Vec<String>> = func
        .blocks
        .iter()
        .map(|b| (b.label.clone(), b.succs.clone()))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for label in labels.iter().rev() {
            let mut new_out: FxHashSet<VReg> = FxHashSet::default();
            for succ in &succs[label] {
                if let Some(succ_bl) = result.get(succ) {
                    new_out.extend(succ_bl.live_in.iter().copied());
                }
            }
            if let Some(edge_uses) = result.get(label) {
                for set in edge_uses.phi_out.values() {
                    new_out.extend(set.iter().copied());
                }
            }

            let bl = result.get(label).expect("block analyzed");
            let mut new_in: FxHashSet<VReg> = bl.use_set.clone();
            new_in.extend(new_out.difference(&bl.def_set).copied());

            let bl = result.get_mut(label).expect("block analyzed");
            if new_in != bl.live_in || new_out != bl.live_out {
                bl.live_in = new_in;
                bl.live_out = new_out;
                changed = true;
            }
        }
    }

    Liveness { blocks: result }
}
