//! Register allocation by iterated graph coloring.
//!
//! Chaitin-style simplify/select without coalescing: repeatedly remove nodes
//! of insignificant degree, pick spill candidates (high degree, low use
//! density) when stuck, then pop and assign the lowest free color. Actual
//! spills rewrite the function — a stack slot with a fresh reload before
//! each use and a store after each def — and the whole cycle repeats, with a
//! dead-code sweep between iterations. In practice one or two iterations
//! suffice; after a bounded number the allocator reports failure.

pub mod interference;
pub mod parallel;
pub mod phi_elim;

use rustc_hash::FxHashMap;

use crate::codegen::riscv::regs::ALLOCATABLE;
use crate::error::{MxcError, Result};
use crate::ir::{Function, Inst, Loc, SlotKind, VReg, Value};
use crate::passes::{cfg, dce, liveness};

use interference::InterferenceGraph;

/// Bound on color/spill/rewrite rounds before giving up.
pub const MAX_SPILL_ITERS: usize = 10;

/// A complete physical assignment: every virtual register carries a color.
/// Spilled registers no longer exist by the time coloring succeeds — the
/// rewrite replaced them with short-lived reload/store temporaries.
#[derive(Debug, Default)]
pub struct Allocation {
    colors: FxHashMap<u32, &'static str>,
}

impl Allocation {
    pub fn reg_name(&self, reg: VReg) -> Result<&'static str> {
        self.colors
            .get(&reg.0)
            .copied()
            .ok_or_else(|| MxcError::Internal(format!("register {} left unassigned", reg)))
    }

    pub fn loc_of(&self, reg: VReg) -> Result<Loc> {
        Ok(Loc::Reg(self.reg_name(reg)?))
    }
}

/// Color a function, spilling and retrying until every virtual register has
/// a physical register.
pub fn allocate(func: &mut Function) -> Result<Allocation> {
    for round in 0..MAX_SPILL_ITERS {
        dce::run(func);
        cfg::recompute(func);
        let live = liveness::analyze(func);
        let graph = InterferenceGraph::build(func, &live);
        match select_colors(&graph) {
            Ok(colors) => {
                tracing::debug!(func = %func.name, round, "coloring converged");
                let colors = colors
                    .into_iter()
                    .map(|(id, c)| (id, ALLOCATABLE[c]))
                    .collect();
                return Ok(Allocation { colors });
            }
            Err(spills) => {
                tracing::debug!(func = %func.name, round, spilled = spills.len(), "spilling");
                rewrite_spills(func, &spills);
            }
        }
    }
    Err(MxcError::Regalloc(format!(
        "'{}' did not converge after {} spill iterations",
        func.name, MAX_SPILL_ITERS
    )))
}

/// Simplify/select over the interference graph. `Ok` maps every virtual
/// register id to a color index; `Err` lists the actual spills.
fn select_colors(graph: &InterferenceGraph) -> std::result::Result<FxHashMap<u32, usize>, Vec<VReg>> {
    let k = graph.num_phys();
    let n = graph.num_nodes();
    let mut active = vec![true; n];
    let mut stack: Vec<usize> = Vec::with_capacity(n - k);

    let degree_among_active = |node: usize, active: &[bool]| {
        graph
            .neighbors(node)
            .iter()
            .filter(|&&nb| active[nb])
            .count()
    };

    let mut remaining = n - k;
    while remaining > 0 {
        // Remove any virtual node of insignificant degree.
        let pick = (k..n).find(|&node| active[node] && degree_among_active(node, &active) < k);
        let node = match pick {
            Some(node) => node,
            None => {
                // All significant: choose a potential spill by high degree
                // and low use density, then optimistically push it anyway.
                (k..n)
                    .filter(|&node| active[node])
                    .max_by(|&a, &b| {
                        let score = |node: usize| {
                            let reg = VReg((node - k) as u32);
                            degree_among_active(node, &active) as f64
                                / (1.0 + graph.use_count(reg) as f64)
                        };
                        score(a)
                            .partial_cmp(&score(b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("some active node remains")
            }
        };
        active[node] = false;
        stack.push(node);
        remaining -= 1;
    }

    let mut assigned: FxHashMap<usize, usize> = FxHashMap::default();
    let mut spills: Vec<VReg> = Vec::new();
    while let Some(node) = stack.pop() {
        let mut taken = vec![false; k];
        for &nb in graph.neighbors(node) {
            let color = if graph.is_precolored(nb) {
                Some(nb)
            } else {
                assigned.get(&nb).copied()
            };
            if let Some(c) = color {
                taken[c] = true;
            }
        }
        match taken.iter().position(|&t| !t) {
            Some(color) => {
                assigned.insert(node, color);
            }
            None => spills.push(VReg((node - k) as u32)),
        }
    }

    if spills.is_empty() {
        Ok(assigned
            .into_iter()
            .map(|(node, color)| ((node - k) as u32, color))
            .collect())
    } else {
        spills.sort();
        Err(spills)
    }
}

/// Rewrite each spilled register into a stack slot with a fresh reload
/// before every use and a store after every def. Phi operands reload at the
/// tail of the corresponding predecessor; a spilled phi result stores right
/// after the phi group; a spilled parameter stores at function entry.
fn rewrite_spills(func: &mut Function, spills: &[VReg]) {
    for &spilled in spills {
        let ty = func.vregs.ty_of(spilled);
        let slot = func.slots.alloc(SlotKind::Spill);
        let is_param = func.params.iter().any(|p| p.reg == spilled);

        // (pred label, reload) pairs to append before predecessor
        // terminators, for phi operands.
        let mut pred_reloads: Vec<(String, Inst)> = Vec::new();

        for bi in 0..func.blocks.len() {
            let insts = std::mem::take(&mut func.blocks[bi].insts);
            let mut new_insts: Vec<Inst> = Vec::with_capacity(insts.len());
            let mut store_after_phis: Option<Inst> = None;

            for mut inst in insts {
                if let Inst::Phi {
                    result, incoming, ..
                } = &mut inst
                {
                    for (value, pred) in incoming.iter_mut() {
                        if value.as_reg() == Some(spilled) {
                            let reload = func.vregs.alloc(ty);
                            *value = Value::Reg(reload);
                            pred_reloads.push((
                                pred.clone(),
                                Inst::Load {
                                    result: reload,
                                    ty,
                                    ptr: Value::Slot(slot),
                                },
                            ));
                        }
                    }
                    if *result == spilled {
                        let fresh = func.vregs.alloc(ty);
                        *result = fresh;
                        store_after_phis = Some(Inst::Store {
                            ty,
                            value: Value::Reg(fresh),
                            ptr: Value::Slot(slot),
                        });
                    }
                    new_insts.push(inst);
                    continue;
                }

                let mut reload: Option<VReg> = None;
                inst.for_each_value_mut(|value| {
                    if value.as_reg() == Some(spilled) {
                        let fresh = *reload.get_or_insert_with(|| func.vregs.alloc(ty));
                        *value = Value::Reg(fresh);
                    }
                });
                if let Some(fresh) = reload {
                    new_insts.push(Inst::Load {
                        result: fresh,
                        ty,
                        ptr: Value::Slot(slot),
                    });
                }

                if inst.def_reg() == Some(spilled) {
                    let fresh = func.vregs.alloc(ty);
                    inst.replace_def(fresh);
                    new_insts.push(inst);
                    new_insts.push(Inst::Store {
                        ty,
                        value: Value::Reg(fresh),
                        ptr: Value::Slot(slot),
                    });
                } else {
                    new_insts.push(inst);
                }
            }

            if let Some(store) = store_after_phis {
                let at = new_insts.iter().take_while(|i| i.is_phi()).count();
                new_insts.insert(at, store);
            }
            func.blocks[bi].insts = new_insts;
        }

        for (pred, reload) in pred_reloads {
            if let Some(block) = func.get_block_mut(&pred) {
                let at = block.insts.len().saturating_sub(1);
                block.insts.insert(at, reload);
            }
        }

        if is_param {
            let entry = func.entry.clone();
            if let Some(block) = func.get_block_mut(&entry) {
                block.insts.insert(
                    0,
                    Inst::Store {
                        ty,
                        value: Value::Reg(spilled),
                        ptr: Value::Slot(slot),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FunctionBuilder, Ty};
    use crate::passes::liveness;

    /// Build a function with `n` values defined up front and all summed at
    /// the end, forcing `n` simultaneous live ranges.
    fn many_live(n: usize) -> Function {
        let mut fb = FunctionBuilder::new("pressure", Ty::I32);
        let regs: Vec<VReg> = (0..n).map(|_| fb.vreg(Ty::I32)).collect();
        let sum_regs: Vec<VReg> = (1..n).map(|_| fb.vreg(Ty::I32)).collect();
        let mut b = fb.block("entry");
        for (i, &r) in regs.iter().enumerate() {
            b = b.inst(Inst::Binary {
                op: BinOp::Add,
                result: r,
                lhs: Value::Int(i as i32),
                rhs: Value::Int(1),
            });
        }
        let mut acc = regs[0];
        for (i, &r) in regs[1..].iter().enumerate() {
            b = b.inst(Inst::Binary {
                op: BinOp::Add,
                result: sum_regs[i],
                lhs: Value::Reg(acc),
                rhs: Value::Reg(r),
            });
            acc = sum_regs[i];
        }
        b.inst(Inst::Ret {
            value: Some(Value::Reg(acc)),
        })
        .build()
    }

    /// Invariant: simultaneously live registers get different colors.
    fn assert_valid_coloring(func: &Function, alloc: &Allocation) {
        cfg::recompute(&mut func.clone());
        let live = liveness::analyze(func);
        let graph = InterferenceGraph::build(func, &live);
        for block in &func.blocks {
            for inst in &block.insts {
                if let Some(d) = inst.def_reg() {
                    for r in inst.used_regs() {
                        if graph.interferes(d, r) {
                            assert_ne!(
                                alloc.reg_name(d).unwrap(),
                                alloc.reg_name(r).unwrap(),
                                "{} and {} interfere but share a register",
                                d,
                                r
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_small_function_needs_no_spill() {
        let mut func = many_live(5);
        cfg::recompute(&mut func);
        let alloc = allocate(&mut func).unwrap();
        assert!(func.slots.is_empty(), "no spill slot expected");
        assert_valid_coloring(&func, &alloc);
    }

    #[test]
    fn test_high_pressure_forces_spill() {
        let n = ALLOCATABLE.len() + 5;
        let mut func = many_live(n);
        cfg::recompute(&mut func);
        let alloc = allocate(&mut func).unwrap();
        assert!(
            !func.slots.is_empty(),
            "{} simultaneous values must spill with k = {}",
            n,
            ALLOCATABLE.len()
        );
        // Every register appearing in the rewritten function is colored.
        for block in &func.blocks {
            for inst in &block.insts {
                if let Some(d) = inst.def_reg() {
                    alloc.reg_name(d).unwrap();
                }
                for r in inst.used_regs() {
                    alloc.reg_name(r).unwrap();
                }
            }
        }
        assert_valid_coloring(&func, &alloc);
    }

    #[test]
    fn test_interfering_pair_gets_distinct_registers() {
        let mut func = many_live(3);
        cfg::recompute(&mut func);
        let live = liveness::analyze(&func);
        let graph = InterferenceGraph::build(&func, &live);
        let alloc = allocate(&mut func.clone()).unwrap();
        for a in 0..func.vregs.len() as u32 {
            for b in (a + 1)..func.vregs.len() as u32 {
                if graph.interferes(VReg(a), VReg(b)) {
                    assert_ne!(
                        alloc.reg_name(VReg(a)).unwrap(),
                        alloc.reg_name(VReg(b)).unwrap()
                    );
                }
            }
        }
    }
}
