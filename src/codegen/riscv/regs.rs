//! RV32I register file and calling-convention tables.
//!
//! The allocator colors over `ALLOCATABLE`: the 32 integer registers minus
//! `zero ra sp gp tp` and minus the two reserved scratch temporaries. `t6`
//! is the register scratch (parallel-copy cycle breaking, operand
//! materialization); `t5` is the separate memory scratch for staging
//! spill-slot traffic. Caller-saved registers are listed first so that
//! short-lived values prefer them, leaving the callee-saved `s` registers
//! for values living across calls.

/// Registers the allocator may assign, in preference order.
pub const ALLOCATABLE: &[&str] = &[
    "t0", "t1", "t2", "t3", "t4", // caller-saved temporaries
    "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7", // argument registers
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
];

/// Clobbered by any call under the ILP32 ABI.
pub const CALLER_SAVED: &[&str] = &[
    "t0", "t1", "t2", "t3", "t4", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7",
];

/// Preserved across calls; the prologue saves exactly the ones a function's
/// coloring uses.
pub const CALLEE_SAVED: &[&str] = &[
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
];

/// First eight arguments and the return value.
pub const ARG_REGS: &[&str] = &["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"];

/// Register scratch: parallel-copy cycle breaking and immediate/address
/// materialization. Never allocated.
pub const SCRATCH_REG: &str = "t6";

/// Memory scratch: staging register for slot-to-slot copies and spill
/// addressing. Never allocated, distinct from `SCRATCH_REG`.
pub const SCRATCH_MEM: &str = "t5";

pub fn allocatable_index(name: &str) -> Option<usize> {
    ALLOCATABLE.iter().position(|&r| r == name)
}

pub fn is_caller_saved(name: &str) -> bool {
    CALLER_SAVED.contains(&name)
}

pub fn is_callee_saved(name: &str) -> bool {
    CALLEE_SAVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_sets_are_disjoint_and_complete() {
        assert_eq!(ALLOCATABLE.len(), CALLER_SAVED.len() + CALLEE_SAVED.len());
        for r in CALLER_SAVED {
            assert!(ALLOCATABLE.contains(r));
            assert!(!CALLEE_SAVED.contains(r));
        }
        for r in CALLEE_SAVED {
            assert!(ALLOCATABLE.contains(r));
        }
        assert!(!ALLOCATABLE.contains(&SCRATCH_REG));
        assert!(!ALLOCATABLE.contains(&SCRATCH_MEM));
        assert_ne!(SCRATCH_REG, SCRATCH_MEM);
    }

    #[test]
    fn test_arg_regs_are_caller_saved() {
        for r in ARG_REGS {
            assert!(is_caller_saved(r));
        }
    }

    #[test]
    fn test_allocatable_index() {
        assert_eq!(allocatable_index("t0"), Some(0));
        assert_eq!(allocatable_index("s11"), Some(ALLOCATABLE.len() - 1));
        assert_eq!(allocatable_index("t6"), None);
        assert_eq!(allocatable_index("zero"), None);
    }
}
