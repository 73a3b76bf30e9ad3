//! Control-flow graph maintenance.
//!
//! Blocks cache `preds`/`succs`; `recompute` derives both from the
//! terminators and is the single way passes re-establish the caches after a
//! terminator rewrite. `CfgBuild` additionally drops unreachable blocks so
//! downstream analyses only see the reachable graph. `SplitCriticalEdges`
//! guarantees phi elimination a private block per (pred, succ) pair.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::ir::{Block, Function, Inst};

use super::Pass;

/// Recompute predecessor/successor caches from the terminators. Duplicate
/// edges (a branch with both arms on one target) collapse to one edge so
/// that phi operands stay in bijection with predecessors.
pub fn recompute(func: &mut Function) {
    for block in &mut func.blocks {
        block.preds.clear();
        block.succs.clear();
    }
    let edges: Vec<(String, Vec<String>)> = func
        .blocks
        .iter()
        .map(|b| (b.label.clone(), b.terminator_targets()))
        .collect();
    for (from, targets) in edges {
        for target in targets {
            let from_block = func.get_block_mut(&from).expect("source block exists");
            if !from_block.succs.contains(&target) {
                from_block.succs.push(target.clone());
            }
            if let Some(to_block) = func.get_block_mut(&target) {
                if !to_block.preds.contains(&from) {
                    to_block.preds.push(from.clone());
                }
            }
        }
    }
}

/// Labels of blocks reachable from the entry, in depth-first order.
fn reachable(func: &Function) -> FxHashSet<String> {
    let mut seen = FxHashSet::default();
    let mut stack = vec![func.entry.clone()];
    while let Some(label) = stack.pop() {
        if !seen.insert(label.clone()) {
            continue;
        }
        if let Some(block) = func.get_block(&label) {
            for succ in block.terminator_targets() {
                stack.push(succ);
            }
        }
    }
    seen
}

/// Rebuild the CFG caches, removing unreachable blocks first.
#[derive(Default)]
pub struct CfgBuild;

impl Pass for CfgBuild {
    fn name(&self) -> &'static str {
        "cfg_build"
    }

    fn description(&self) -> &'static str {
        "Drop unreachable blocks and recompute predecessor/successor caches"
    }

    fn apply(&self, func: &mut Function) -> Result<bool> {
        let live = reachable(func);
        let before = func.blocks.len();
        func.blocks.retain(|b| live.contains(&b.label));
        recompute(func);
        Ok(func.blocks.len() != before)
    }
}

/// Split every critical edge: an edge (p -> s) where p has two or more
/// successors and s has two or more predecessors gets an empty block on the
/// edge, so copies realizing phi semantics for p have a block no other path
/// enters.
#[derive(Default)]
pub struct SplitCriticalEdges;

impl Pass for SplitCriticalEdges {
    fn name(&self) -> &'static str {
        "split_critical_edges"
    }

    fn description(&self) -> &'static str {
        "Insert a block on every edge whose source branches and target merges"
    }

    fn apply(&self, func: &mut Function) -> Result<bool> {
        recompute(func);
        let pred_counts: FxHashMap<String, usize> = func
            .blocks
            .iter()
            .map(|b| (b.label.clone(), b.preds.len()))
            .collect();

        let mut critical: Vec<(String, String)> = Vec::new();
        for block in &func.blocks {
            if block.succs.len() < 2 {
                continue;
            }
            for succ in &block.succs {
                if pred_counts.get(succ).copied().unwrap_or(0) >= 2 {
                    critical.push((block.label.clone(), succ.clone()));
                }
            }
        }
        if critical.is_empty() {
            return Ok(false);
        }

        for (i, (pred, succ)) in critical.iter().enumerate() {
            let split_label = format!("split.{}.{}", i, pred);
            let mut split = Block::new(split_label.clone());
            split.push(Inst::Jmp {
                target: succ.clone(),
            });
            func.add_block(split);

            let pred_block = func.get_block_mut(pred).expect("pred exists");
            if let Some(Inst::Br {
                true_label,
                false_label,
                ..
            }) = pred_block.terminator_mut()
            {
                if true_label == succ {
                    *true_label = split_label.clone();
                }
                if false_label == succ {
                    *false_label = split_label.clone();
                }
            }

            // Phi operands in the successor now flow in through the split
            // block.
            let succ_block = func.get_block_mut(succ).expect("succ exists");
            for inst in succ_block.insts.iter_mut() {
                if let Inst::Phi { incoming, .. } = inst {
                    for (_, label) in incoming.iter_mut() {
                        if label == pred {
                            *label = split_label.clone();
                        }
                    }
                }
            }
        }

        recompute(func);
        // Keep phi operand order aligned with the recomputed pred lists.
        align_phi_order(func);
        Ok(true)
    }
}

/// Reorder every phi's incoming list to match its block's predecessor order.
fn align_phi_order(func: &mut Function) {
    for block in &mut func.blocks {
        let preds = block.preds.clone();
        for inst in block.insts.iter_mut() {
            if let Inst::Phi { incoming, .. } = inst {
                incoming.sort_by_key(|(_, label)| {
                    preds.iter().position(|p| p == label).unwrap_or(usize::MAX)
                });
            }
        }
    }
}
