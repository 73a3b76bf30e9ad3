//! IR transformation passes.
//!
//! Passes operate on one function at a time and can be composed into
//! pipelines. Each pass implements the `Pass` trait; it may assume the
//! invariants its predecessors establish and must re-establish any invariant
//! it breaks (the CFG caches in particular — rewrite a terminator, call
//! `cfg::recompute`).

pub mod cfg;
pub mod dce;
pub mod dominance;
pub mod liveness;
pub mod mem2reg;

pub use cfg::{CfgBuild, SplitCriticalEdges};
pub use dce::DeadCodeElimination;
pub use mem2reg::Mem2Reg;

use crate::error::{MxcError, Result};
use crate::ir::{Function, Module};

/// Trait for IR transformation passes.
pub trait Pass {
    /// Unique name for this pass.
    fn name(&self) -> &'static str;

    /// Description of what this pass does.
    fn description(&self) -> &'static str;

    /// Apply this pass to a function. Returns true if any changes were made.
    fn apply(&self, func: &mut Function) -> Result<bool>;
}

/// Statistics about a pipeline run.
#[derive(Debug, Default)]
pub struct PassStats {
    /// Number of passes that were run.
    pub passes_run: usize,
    /// Number of passes that made changes.
    pub passes_changed: usize,
}

/// A pipeline of passes applied in order.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add_pass<P: Pass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// The middle-end pipeline: rebuild the CFG, promote memory cells to
    /// SSA, clean up, and split critical edges for phi elimination.
    pub fn middle_end() -> Self {
        Self::new()
            .add_pass(CfgBuild)
            .add_pass(Mem2Reg)
            .add_pass(DeadCodeElimination)
            .add_pass(SplitCriticalEdges)
    }

    pub fn apply_to_function(&self, func: &mut Function) -> Result<PassStats> {
        let mut stats = PassStats::default();
        for pass in &self.passes {
            stats.passes_run += 1;
            tracing::debug!(pass = pass.name(), func = %func.name, "running pass");
            let changed = pass.apply(func).map_err(|e| match e {
                MxcError::IrShape(msg) => {
                    MxcError::IrShape(format!("pass '{}': {}", pass.name(), msg))
                }
                other => other,
            })?;
            if changed {
                stats.passes_changed += 1;
            }
            func.validate()?;
        }
        Ok(stats)
    }

    pub fn apply_to_module(&self, module: &mut Module) -> Result<PassStats> {
        let mut total = PassStats::default();
        for func in module.functions.iter_mut() {
            let stats = self.apply_to_function(func)?;
            total.passes_run += stats.passes_run;
            total.passes_changed += stats.passes_changed;
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}
