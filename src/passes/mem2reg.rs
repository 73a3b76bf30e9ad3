//! Mem2Reg: promote stack cells to SSA virtual registers.
//!
//! An alloca is promotable when every use of its address is a direct load or
//! store (no getelementptr, no escape through a call or store of the
//! address) — `AllocChecker` classifies this. For each promotable cell, phis
//! are placed on the iterated dominance frontier of its store blocks, then a
//! DFS over the dominator tree renames loads to the reaching definition and
//! fills phi operands from each predecessor. All promoted allocas, loads and
//! stores are removed.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::ir::{Function, Inst, Ty, VReg, Value};

use super::dominance::{self, Dominance};
use super::{cfg, Pass};

#[derive(Default)]
pub struct Mem2Reg;

impl Pass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn description(&self) -> &'static str {
        "Promote non-escaping stack cells to SSA registers, inserting phis"
    }

    fn apply(&self, func: &mut Function) -> Result<bool> {
        cfg::recompute(func);
        let cells = AllocChecker::promotable(func);
        if cells.is_empty() {
            return Ok(false);
        }
        let dom = dominance::compute(func);
        let phi_owner = place_phis(func, &cells, &dom);
        rename(func, &cells, &dom, &phi_owner);
        strip_promoted(func, &cells);
        Ok(true)
    }
}

/// Classifies which allocas can be promoted.
pub struct AllocChecker;

impl AllocChecker {
    /// The promotable cells: alloca result register -> pointee type.
    pub fn promotable(func: &Function) -> FxHashMap<VReg, Ty> {
        let mut cells: FxHashMap<VReg, Ty> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.insts {
                if let Inst::Alloca { result, ty, .. } = inst {
                    cells.insert(*result, *ty);
                }
            }
        }

        // Any appearance of the address outside a direct load/store pointer
        // position disqualifies the cell.
        let mut escaped: FxHashSet<VReg> = FxHashSet::default();
        for block in &func.blocks {
            for inst in &block.insts {
                match inst {
                    Inst::Alloca { .. } => {}
                    Inst::Load { ptr, .. } => {
                        // The pointer position of a load is a direct use.
                        let _ = ptr;
                    }
                    Inst::Store { value, .. } => {
                        // Storing the address itself lets it escape.
                        if let Some(r) = value.as_reg() {
                            if cells.contains_key(&r) {
                                escaped.insert(r);
                            }
                        }
                    }
                    other => {
                        other.for_each_value(|v| {
                            if let Some(r) = v.as_reg() {
                                if cells.contains_key(&r) {
                                    escaped.insert(r);
                                }
                            }
                        });
                    }
                }
            }
        }
        cells.retain(|reg, _| !escaped.contains(reg));
        cells
    }
}

/// Insert empty phis on the iterated dominance frontier of each cell's store
/// blocks. Returns phi result register -> cell it merges.
fn place_phis(
    func: &mut Function,
    cells: &FxHashMap<VReg, Ty>,
    dom: &Dominance,
) -> FxHashMap<VReg, VReg> {
    // Blocks containing a store to each cell.
    let mut def_blocks: FxHashMap<VReg, Vec<String>> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.insts {
            if let Inst::Store { ptr, .. } = inst {
                if let Some(cell) = ptr.as_reg() {
                    if cells.contains_key(&cell) {
                        let blocks = def_blocks.entry(cell).or_default();
                        if !blocks.contains(&block.label) {
                            blocks.push(block.label.clone());
                        }
                    }
                }
            }
        }
    }

    let mut phi_owner: FxHashMap<VReg, VReg> = FxHashMap::default();
    let mut sorted_cells: Vec<&VReg> = cells.keys().collect();
    sorted_cells.sort();
    for &cell in sorted_cells {
        let ty = cells[&cell];
        let mut worklist: Vec<String> = def_blocks.get(&cell).cloned().unwrap_or_default();
        let mut placed: FxHashSet<String> = FxHashSet::default();
        let mut defs: FxHashSet<String> = worklist.iter().cloned().collect();
        while let Some(block_label) = worklist.pop() {
            let Some(frontier) = dom.frontier.get(&block_label) else {
                continue;
            };
            for target in frontier.clone() {
                if !placed.insert(target.clone()) {
                    continue;
                }
                let result = func.vregs.alloc(ty);
                phi_owner.insert(result, cell);
                let target_block = func.get_block_mut(&target).expect("frontier block exists");
                let incoming = target_block
                    .preds
                    .iter()
                    .map(|p| (Value::Int(0), p.clone()))
                    .collect();
                target_block.insts.insert(
                    0,
                    Inst::Phi {
                        result,
                        ty,
                        incoming,
                    },
                );
                // The phi is itself a definition of the cell.
                if defs.insert(target.clone()) {
                    worklist.push(target);
                }
            }
        }
    }
    phi_owner
}

/// DFS over the dominator tree maintaining a stack of reaching definitions
/// per cell; rewrites loads, fills phi operands, and resolves chains through
/// a replacement map.
fn rename(
    func: &mut Function,
    cells: &FxHashMap<VReg, Ty>,
    dom: &Dominance,
    phi_owner: &FxHashMap<VReg, VReg>,
) {
    let mut stacks: FxHashMap<VReg, Vec<Value>> = FxHashMap::default();
    let mut replacement: FxHashMap<VReg, Value> = FxHashMap::default();

    // Undefined reads yield zero; the checker rules out programs where this
    // is observable for anything but uninitialized locals.
    fn current(stacks: &FxHashMap<VReg, Vec<Value>>, cell: VReg) -> Value {
        stacks
            .get(&cell)
            .and_then(|s| s.last().cloned())
            .unwrap_or(Value::Int(0))
    }

    fn resolve(replacement: &FxHashMap<VReg, Value>, mut v: Value) -> Value {
        while let Value::Reg(r) = v {
            match replacement.get(&r) {
                Some(next) => v = next.clone(),
                None => break,
            }
        }
        v
    }

    fn walk(
        func: &mut Function,
        dom: &Dominance,
        cells: &FxHashMap<VReg, Ty>,
        phi_owner: &FxHashMap<VReg, VReg>,
        stacks: &mut FxHashMap<VReg, Vec<Value>>,
        replacement: &mut FxHashMap<VReg, Value>,
        label: &str,
    ) {
        let mut pushed: Vec<VReg> = Vec::new();

        let block = func.get_block_mut(label).expect("block exists");
        for inst in block.insts.iter_mut() {
            // Rewrite operand uses to the resolved values first; phi
            // operands are filled from the predecessor side below.
            if !inst.is_phi() {
                inst.for_each_value_mut(|v| *v = resolve(replacement, v.clone()));
            }
            match inst {
                Inst::Phi { result, .. } => {
                    if let Some(cell) = phi_owner.get(result) {
                        stacks.entry(*cell).or_default().push(Value::Reg(*result));
                        pushed.push(*cell);
                    }
                }
                Inst::Store { value, ptr, .. } => {
                    if let Some(cell) = ptr.as_reg() {
                        if cells.contains_key(&cell) {
                            stacks.entry(cell).or_default().push(value.clone());
                            pushed.push(cell);
                        }
                    }
                }
                Inst::Load { result, ptr, .. } => {
                    if let Some(cell) = ptr.as_reg() {
                        if cells.contains_key(&cell) {
                            let value = current(stacks, cell);
                            replacement.insert(*result, value);
                        }
                    }
                }
                _ => {}
            }
        }

        // Fill phi operands of successors for the edge from this block.
        let succs = func
            .get_block(label)
            .map(|b| b.succs.clone())
            .unwrap_or_default();
        for succ in succs {
            let values: Vec<(VReg, Value)> = {
                let succ_block = func.get_block(&succ).expect("succ exists");
                succ_block
                    .phis()
                    .filter_map(|inst| match inst {
                        Inst::Phi { result, .. } => phi_owner
                            .get(result)
                            .map(|cell| (*result, current(stacks, *cell))),
                        _ => None,
                    })
                    .collect()
            };
            let succ_block = func.get_block_mut(&succ).expect("succ exists");
            for inst in succ_block.insts.iter_mut() {
                if let Inst::Phi { result, incoming, .. } = inst {
                    if let Some((_, value)) = values.iter().find(|(r, _)| r == result) {
                        for (v, pred) in incoming.iter_mut() {
                            if pred == label {
                                *v = value.clone();
                            }
                        }
                    }
                }
            }
        }

        for child in dom.children.get(label).cloned().unwrap_or_default() {
            walk(func, dom, cells, phi_owner, stacks, replacement, &child);
        }

        for cell in pushed {
            if let Some(stack) = stacks.get_mut(&cell) {
                stack.pop();
            }
        }
    }

    let entry = func.entry.clone();
    walk(
        func,
        dom,
        cells,
        phi_owner,
        &mut stacks,
        &mut replacement,
        &entry,
    );

    // Phi operands may themselves be loads that were later replaced; resolve
    // once more so no replaced register survives anywhere.
    for block in &mut func.blocks {
        for inst in &mut block.insts {
            inst.for_each_value_mut(|v| *v = resolve(&replacement, v.clone()));
        }
    }
}

/// Delete the promoted allocas and their loads/stores.
fn strip_promoted(func: &mut Function, cells: &FxHashMap<VReg, Ty>) {
    for block in &mut func.blocks {
        block.insts.retain(|inst| match inst {
            Inst::Alloca { result, .. } => !cells.contains_key(result),
            Inst::Store { ptr, .. } | Inst::Load { ptr, .. } => ptr
                .as_reg()
                .map(|cell| !cells.contains_key(&cell))
                .unwrap_or(true),
            _ => true,
        });
    }
}
