//! Parallel-copy sequentialization.
//!
//! Given a set of copies `{ dst_i <- src_i }` with pairwise-distinct
//! destinations and parallel semantics, emit an equivalent sequential list:
//! repeatedly emit any copy whose destination is not the source of a pending
//! copy; when only cycles remain, save one cycle member into the scratch
//! register and redirect its readers there. The swap `{a<-b, b<-a}` costs
//! exactly one scratch use; a cycle of n costs n+1 copies.
//!
//! The same scheduler sequences phi copies on CFG edges, argument setup at
//! call sites, and parameter landing at function entry. Memory locations
//! (stack slots) participate as ordinary nodes; the emitter later expands a
//! memory-to-memory copy through the separate memory scratch.

use crate::codegen::riscv::regs::SCRATCH_REG;
use crate::ir::{CopySrc, Loc};

/// Sequentialize a parallel copy. Destinations must be pairwise distinct.
pub fn sequentialize(pairs: Vec<(Loc, CopySrc)>) -> Vec<(Loc, CopySrc)> {
    let scratch = Loc::Reg(SCRATCH_REG);

    // Identity copies are no-ops.
    let mut pending: Vec<(Loc, CopySrc)> = pairs
        .into_iter()
        .filter(|(dst, src)| !matches!(src, CopySrc::Loc(s) if s == dst))
        .collect();

    let mut out = Vec::with_capacity(pending.len() + 1);
    while !pending.is_empty() {
        let is_source = |loc: &Loc, pending: &[(Loc, CopySrc)]| {
            pending
                .iter()
                .any(|(_, src)| matches!(src, CopySrc::Loc(s) if s == loc))
        };

        if let Some(i) = (0..pending.len()).find(|&i| !is_source(&pending[i].0, &pending)) {
            let copy = pending.remove(i);
            out.push(copy);
            continue;
        }

        // Only cycles remain: every pending destination is also a pending
        // source. Save one destination into the scratch and redirect its
        // readers; that copy becomes emittable on the next round.
        let saved = pending[0].0;
        out.push((scratch, CopySrc::Loc(saved)));
        for (_, src) in pending.iter_mut() {
            if matches!(src, CopySrc::Loc(s) if *s == saved) {
                *src = CopySrc::Loc(scratch);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SlotId;
    use rustc_hash::FxHashMap;

    fn reg(name: &'static str) -> Loc {
        Loc::Reg(name)
    }

    /// Interpret a sequential copy list over a location -> value map and
    /// return the final state. Mirrors what the emitted moves do.
    fn interpret(
        initial: &FxHashMap<Loc, i64>,
        seq: &[(Loc, CopySrc)],
    ) -> FxHashMap<Loc, i64> {
        let mut state = initial.clone();
        for (dst, src) in seq {
            let v = match src {
                CopySrc::Loc(l) => *state.get(l).unwrap_or(&0),
                CopySrc::Int(v) => *v as i64,
                _ => 0,
            };
            state.insert(*dst, v);
        }
        state
    }

    /// Check that the sequence realizes the parallel semantics of `pairs`
    /// over `initial`.
    fn assert_parallel_semantics(initial: FxHashMap<Loc, i64>, pairs: Vec<(Loc, CopySrc)>) {
        let expected: Vec<(Loc, i64)> = pairs
            .iter()
            .map(|(dst, src)| {
                let v = match src {
                    CopySrc::Loc(l) => *initial.get(l).unwrap_or(&0),
                    CopySrc::Int(v) => *v as i64,
                    _ => 0,
                };
                (*dst, v)
            })
            .collect();
        let seq = sequentialize(pairs);
        let state = interpret(&initial, &seq);
        for (dst, v) in expected {
            assert_eq!(state.get(&dst), Some(&v), "wrong value in {}", dst);
        }
    }

    #[test]
    fn test_disjoint_copies_in_any_order() {
        let mut initial = FxHashMap::default();
        initial.insert(reg("t0"), 1);
        initial.insert(reg("t1"), 2);
        assert_parallel_semantics(
            initial,
            vec![
                (reg("a0"), CopySrc::Loc(reg("t0"))),
                (reg("a1"), CopySrc::Loc(reg("t1"))),
            ],
        );
    }

    #[test]
    fn test_identity_elided() {
        let seq = sequentialize(vec![(reg("a0"), CopySrc::Loc(reg("a0")))]);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_chain_ordering() {
        // { a1 <- a0, a2 <- a1 }: a2 must read a1 before a1 is overwritten.
        let mut initial = FxHashMap::default();
        initial.insert(reg("a0"), 10);
        initial.insert(reg("a1"), 20);
        assert_parallel_semantics(
            initial,
            vec![
                (reg("a1"), CopySrc::Loc(reg("a0"))),
                (reg("a2"), CopySrc::Loc(reg("a1"))),
            ],
        );
    }

    #[test]
    fn test_swap_uses_exactly_one_scratch() {
        let pairs = vec![
            (reg("a0"), CopySrc::Loc(reg("a1"))),
            (reg("a1"), CopySrc::Loc(reg("a0"))),
        ];
        let seq = sequentialize(pairs.clone());
        assert_eq!(seq.len(), 3);
        let scratch_writes = seq
            .iter()
            .filter(|(dst, _)| *dst == Loc::Reg(SCRATCH_REG))
            .count();
        assert_eq!(scratch_writes, 1);

        let mut initial = FxHashMap::default();
        initial.insert(reg("a0"), 7);
        initial.insert(reg("a1"), 9);
        assert_parallel_semantics(initial, pairs);
    }

    #[test]
    fn test_three_cycle() {
        // { a <- b, b <- c, c <- a }: three copies plus one scratch use.
        let pairs = vec![
            (reg("a0"), CopySrc::Loc(reg("a1"))),
            (reg("a1"), CopySrc::Loc(reg("a2"))),
            (reg("a2"), CopySrc::Loc(reg("a0"))),
        ];
        let seq = sequentialize(pairs.clone());
        assert_eq!(seq.len(), 4);

        let mut initial = FxHashMap::default();
        initial.insert(reg("a0"), 1);
        initial.insert(reg("a1"), 2);
        initial.insert(reg("a2"), 3);
        assert_parallel_semantics(initial, pairs);
    }

    #[test]
    fn test_constant_written_after_reads() {
        // { a0 <- 5, a1 <- a0 }: a1 must read the old a0 first.
        let mut initial = FxHashMap::default();
        initial.insert(reg("a0"), 42);
        assert_parallel_semantics(
            initial,
            vec![
                (reg("a0"), CopySrc::Int(5)),
                (reg("a1"), CopySrc::Loc(reg("a0"))),
            ],
        );
    }

    #[test]
    fn test_slot_locations_participate() {
        let s0 = Loc::Slot(SlotId(0));
        let s1 = Loc::Slot(SlotId(1));
        let pairs = vec![
            (s0, CopySrc::Loc(s1)),
            (s1, CopySrc::Loc(s0)),
        ];
        let seq = sequentialize(pairs.clone());
        assert_eq!(seq.len(), 3);
        let mut initial = FxHashMap::default();
        initial.insert(s0, 100);
        initial.insert(s1, 200);
        assert_parallel_semantics(initial, pairs);
    }

    #[test]
    fn test_fan_out_single_source() {
        // One source feeding two destinations, one of which is the source of
        // a swap with it.
        let pairs = vec![
            (reg("a1"), CopySrc::Loc(reg("a0"))),
            (reg("a2"), CopySrc::Loc(reg("a0"))),
            (reg("a0"), CopySrc::Loc(reg("a1"))),
        ];
        let mut initial = FxHashMap::default();
        initial.insert(reg("a0"), 1);
        initial.insert(reg("a1"), 2);
        assert_parallel_semantics(initial, pairs);
    }
}
