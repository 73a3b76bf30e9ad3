//! Functions and basic blocks of the Mx* IR.
//!
//! A function owns its blocks in source order (entry first), a virtual
//! register pool, and a stack-slot pool. Blocks cache their predecessor and
//! successor labels; `passes::cfg::recompute` re-establishes them after any
//! terminator rewrite.

use std::fmt;

use super::instruction::Inst;
use super::types::{SlotPool, Ty, VReg, VRegPool};
use crate::error::{MxcError, Result};

/// Function parameter: an incoming virtual register with its type.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub reg: VReg,
    pub ty: Ty,
}

/// A basic block: a label, instructions ending in one terminator, and cached
/// CFG edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub preds: Vec<String>,
    pub succs: Vec<String>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    /// The terminator, i.e. the last instruction.
    pub fn terminator(&self) -> Option<&Inst> {
        self.insts.last()
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Inst> {
        self.insts.last_mut()
    }

    pub fn has_terminator(&self) -> bool {
        self.terminator().map(|i| i.is_terminator()).unwrap_or(false)
    }

    /// Successor labels read off the terminator.
    pub fn terminator_targets(&self) -> Vec<String> {
        match self.terminator() {
            Some(Inst::Jmp { target }) => vec![target.clone()],
            Some(Inst::Br {
                true_label,
                false_label,
                ..
            }) => vec![true_label.clone(), false_label.clone()],
            _ => vec![],
        }
    }

    /// The leading phi instructions of this block.
    pub fn phis(&self) -> impl Iterator<Item = &Inst> {
        self.insts.iter().take_while(|i| i.is_phi())
    }

    /// Index of the first non-phi instruction.
    pub fn first_non_phi(&self) -> usize {
        self.insts.iter().take_while(|i| i.is_phi()).count()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.insts {
            writeln!(f, "  {}", inst)?;
        }
        Ok(())
    }
}

/// An IR function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Ty,
    /// Blocks in layout order; the entry block comes first.
    pub blocks: Vec<Block>,
    pub entry: String,
    pub vregs: VRegPool,
    pub slots: SlotPool,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: Ty) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret_ty,
            blocks: Vec::new(),
            entry: "entry".to_string(),
            vregs: VRegPool::new(),
            slots: SlotPool::new(),
        }
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn get_block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn get_block_mut(&mut self, label: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    /// Position of a block in layout order.
    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.get_block(&self.entry)
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Check the structural invariants every pass relies on: the entry block
    /// exists and has no predecessors or phis, labels are unique, and every
    /// block ends with exactly one terminator.
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry_block()
            .ok_or_else(|| MxcError::ir_shape(&self.name, &self.entry, "entry block not found"))?;
        if entry.phis().next().is_some() {
            return Err(MxcError::ir_shape(
                &self.name,
                &self.entry,
                "entry block has phi nodes",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for block in &self.blocks {
            if !seen.insert(&block.label) {
                return Err(MxcError::ir_shape(
                    &self.name,
                    &block.label,
                    "duplicate block label",
                ));
            }
            if !block.has_terminator() {
                return Err(MxcError::ir_shape(
                    &self.name,
                    &block.label,
                    "block has no terminator",
                ));
            }
            for inst in &block.insts[..block.insts.len() - 1] {
                if inst.is_terminator() {
                    return Err(MxcError::ir_shape(
                        &self.name,
                        &block.label,
                        "instruction after terminator",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn @{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.ty, p.reg)?;
        }
        writeln!(f, ") -> {} {{", self.ret_ty)?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

/// Builder used by tests and by the AST lowering to assemble functions.
pub struct FunctionBuilder {
    function: Function,
    current: Option<String>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, ret_ty: Ty) -> Self {
        Self {
            function: Function::new(name, ret_ty),
            current: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: Ty) -> Self {
        let reg = self.function.vregs.alloc(ty);
        self.function.params.push(Param {
            name: name.into(),
            reg,
            ty,
        });
        self
    }

    pub fn vreg(&mut self, ty: Ty) -> VReg {
        self.function.vregs.alloc(ty)
    }

    pub fn block(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.function.add_block(Block::new(label.clone()));
        self.current = Some(label);
        self
    }

    pub fn inst(mut self, inst: Inst) -> Self {
        if let Some(ref label) = self.current {
            if let Some(block) = self.function.get_block_mut(label) {
                block.push(inst);
            }
        }
        self
    }

    pub fn build(self) -> Function {
        self.function
    }
}
