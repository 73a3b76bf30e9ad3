//! Interference graph construction.
//!
//! Nodes are the allocatable physical registers (precolored, occupying the
//! first indices) followed by the function's virtual registers. An edge
//! joins any two registers simultaneously live at some program point; at
//! each call, every value live across the call additionally interferes with
//! the whole caller-saved clobber set, which steers long-lived values into
//! callee-saved registers.

use rustc_hash::FxHashSet;

use crate::codegen::riscv::regs::{self, ALLOCATABLE};
use crate::ir::{Function, Inst, VReg};
use crate::passes::liveness::Liveness;

pub struct InterferenceGraph {
    /// Adjacency sets over node indices: `0..num_phys` precolored,
    /// `num_phys..` virtual registers by id.
    adjacency: Vec<FxHashSet<usize>>,
    num_phys: usize,
    /// Occurrence count (defs + uses) per virtual register, for the spill
    /// heuristic's use density.
    use_counts: Vec<u32>,
}

impl InterferenceGraph {
    pub fn num_phys(&self) -> usize {
        self.num_phys
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn node_of(&self, reg: VReg) -> usize {
        self.num_phys + reg.0 as usize
    }

    pub fn is_precolored(&self, node: usize) -> bool {
        node < self.num_phys
    }

    pub fn neighbors(&self, node: usize) -> &FxHashSet<usize> {
        &self.adjacency[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    pub fn use_count(&self, reg: VReg) -> u32 {
        self.use_counts[reg.0 as usize]
    }

    pub fn interferes(&self, a: VReg, b: VReg) -> bool {
        self.adjacency[self.node_of(a)].contains(&self.node_of(b))
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    pub fn build(func: &Function, liveness: &Liveness) -> Self {
        let num_phys = ALLOCATABLE.len();
        let num_vregs = func.vregs.len();
        let mut graph = InterferenceGraph {
            adjacency: vec![FxHashSet::default(); num_phys + num_vregs],
            num_phys,
            use_counts: vec![0; num_vregs],
        };

        let caller_saved_nodes: Vec<usize> = regs::CALLER_SAVED
            .iter()
            .filter_map(|r| regs::allocatable_index(r))
            .collect();

        for block in &func.blocks {
            let bl = liveness.of(&block.label);
            let mut live: FxHashSet<VReg> = bl.live_out.clone();

            for inst in block.insts.iter().rev() {
                if let Some(d) = inst.def_reg() {
                    graph.use_counts[d.0 as usize] += 1;
                    let d_node = graph.node_of(d);
                    for &u in live.iter() {
                        if u != d {
                            let u_node = graph.node_of(u);
                            graph.add_edge(d_node, u_node);
                        }
                    }
                    live.remove(&d);
                }

                // Values live across a call cannot sit in clobbered
                // registers.
                if matches!(inst, Inst::Call { .. }) {
                    for &u in live.iter() {
                        let u_node = graph.node_of(u);
                        for &p in &caller_saved_nodes {
                            graph.add_edge(u_node, p);
                        }
                    }
                }

                if !inst.is_phi() {
                    inst.for_each_value(|v| {
                        if let Some(r) = v.as_reg() {
                            graph.use_counts[r.0 as usize] += 1;
                            live.insert(r);
                        }
                    });
                } else if let Inst::Phi { incoming, .. } = inst {
                    for (v, _) in incoming {
                        if let Some(r) = v.as_reg() {
                            graph.use_counts[r.0 as usize] += 1;
                        }
                    }
                }
            }
        }

        // Parameters land simultaneously at function entry.
        for (i, a) in func.params.iter().enumerate() {
            for b in func.params.iter().skip(i + 1) {
                let (a_node, b_node) = (graph.node_of(a.reg), graph.node_of(b.reg));
                graph.add_edge(a_node, b_node);
            }
        }

        graph
    }
}
