//! Basic block IR.

use crate::instr::{Instr, InstrId};

/// IR for a basic block (ordered sequence of instructions).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block label, unique within its function.
    pub label: String,
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instrs: Vec::new(),
        }
    }

    /// Add an instruction to the end of the block.
    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Insert an instruction before position `index`.
    pub fn insert(&mut self, index: usize, instr: Instr) {
        self.instrs.insert(index, instr);
    }

    /// Index of the first position where non-phi code may be inserted.
    pub fn first_insertion_point(&self) -> Option<usize> {
        self.instrs.iter().position(|i| !i.is_phi())
    }

    /// Position of an instruction by id.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.instrs.iter().position(|i| i.id == id)
    }
}
