//! Property tests for parallel-copy sequentialization.
//!
//! For arbitrary parallel copies (permutations, chains, fan-out, constants,
//! register and stack-slot locations), interpreting the scheduled sequence
//! must leave every destination holding the value its source held before
//! the copy — the definition of parallel semantics.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use mxc::codegen::riscv::regs::{ALLOCATABLE, SCRATCH_REG};
use mxc::ir::{CopySrc, Loc, SlotId};
use mxc::regalloc::parallel::sequentialize;

fn loc_pool() -> Vec<Loc> {
    let mut pool: Vec<Loc> = ALLOCATABLE[..8].iter().map(|&r| Loc::Reg(r)).collect();
    for i in 0..4 {
        pool.push(Loc::Slot(SlotId(i)));
    }
    pool
}

fn interpret(initial: &FxHashMap<Loc, i64>, seq: &[(Loc, CopySrc)]) -> FxHashMap<Loc, i64> {
    let mut state = initial.clone();
    for (dst, src) in seq {
        let v = match src {
            CopySrc::Loc(l) => *state.get(l).unwrap_or(&-1),
            CopySrc::Int(v) => *v as i64,
            _ => -2,
        };
        state.insert(*dst, v);
    }
    state
}

proptest! {
    /// Random subsets of locations copied from random sources.
    #[test]
    fn sequential_copies_realize_parallel_semantics(
        dst_indices in proptest::collection::hash_set(0usize..12, 1..=10),
        src_picks in proptest::collection::vec(0usize..16, 12),
    ) {
        let pool = loc_pool();

        // Distinct initial value per location.
        let mut initial = FxHashMap::default();
        for (i, loc) in pool.iter().enumerate() {
            initial.insert(*loc, 100 + i as i64);
        }

        let mut pairs = Vec::new();
        for (slot, &di) in dst_indices.iter().enumerate() {
            let pick = src_picks[slot.min(src_picks.len() - 1)];
            let src = if pick < pool.len() {
                CopySrc::Loc(pool[pick])
            } else {
                CopySrc::Int(pick as i32)
            };
            pairs.push((pool[di], src));
        }

        let expected: Vec<(Loc, i64)> = pairs
            .iter()
            .map(|(dst, src)| {
                let v = match src {
                    CopySrc::Loc(l) => initial[l],
                    CopySrc::Int(v) => *v as i64,
                    _ => unreachable!(),
                };
                (*dst, v)
            })
            .collect();

        let seq = sequentialize(pairs);
        let state = interpret(&initial, &seq);
        for (dst, v) in expected {
            prop_assert_eq!(state.get(&dst), Some(&v), "wrong final value in {}", dst);
        }
    }

    /// Pure permutations: every destination sources another pool member.
    /// The scratch register is written at most once per cycle and the
    /// permutation is realized exactly.
    #[test]
    fn permutations_preserve_all_values(
        perm in Just(()).prop_flat_map(|_| {
            proptest::sample::subsequence((0usize..8).collect::<Vec<_>>(), 2..=8)
                .prop_shuffle()
        }),
    ) {
        let pool = loc_pool();
        let k = perm.len();
        let sorted = {
            let mut s = perm.clone();
            s.sort_unstable();
            s
        };

        // dst sorted[j] <- src perm[j]: a permutation of the chosen subset.
        let mut initial = FxHashMap::default();
        for (i, loc) in pool.iter().enumerate() {
            initial.insert(*loc, 1000 + i as i64);
        }
        let pairs: Vec<(Loc, CopySrc)> = (0..k)
            .map(|j| (pool[sorted[j]], CopySrc::Loc(pool[perm[j]])))
            .collect();

        let expected: Vec<(Loc, i64)> = pairs
            .iter()
            .map(|(dst, src)| {
                let CopySrc::Loc(l) = src else { unreachable!() };
                (*dst, initial[l])
            })
            .collect();

        let seq = sequentialize(pairs);
        let state = interpret(&initial, &seq);
        for (dst, v) in expected {
            prop_assert_eq!(state.get(&dst), Some(&v));
        }

        // Untouched pool members keep their values.
        let scratch = Loc::Reg(SCRATCH_REG);
        for (i, loc) in pool.iter().enumerate() {
            if !sorted.contains(&i) && *loc != scratch {
                prop_assert_eq!(state[loc], 1000 + i as i64);
            }
        }
    }
}
