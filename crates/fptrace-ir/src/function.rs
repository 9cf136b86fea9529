//! Function IR.

use crate::attrs::{FnAttrs, ParamAttrs};
use crate::block::Block;
use crate::instr::{Instr, InstrId};
use crate::operand::Operand;
use crate::types::{FnType, Type};

/// A formal parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    /// SSA name (empty for unnamed declaration parameters).
    pub name: String,
    pub ty: Type,
    pub attrs: ParamAttrs,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: ParamAttrs::empty(),
        }
    }
}

/// A function definition or declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// Symbol name, unique within the module.
    pub name: String,
    pub ty: FnType,
    pub params: Vec<Param>,
    pub attrs: FnAttrs,
    /// Basic blocks; the first one is the entry block. Empty for declarations.
    pub blocks: Vec<Block>,
}

impl Function {
    /// Create a function definition without blocks yet.
    pub fn new(name: impl Into<String>, ret: Type, params: Vec<Param>) -> Self {
        let ty = FnType::new(ret, params.iter().map(|p| p.ty.clone()).collect(), false);
        Self {
            name: name.into(),
            ty,
            params,
            attrs: FnAttrs::empty(),
            blocks: Vec::new(),
        }
    }

    /// Create an external declaration with unnamed parameters.
    pub fn declaration(name: impl Into<String>, ty: FnType) -> Self {
        let params = ty.params.iter().map(|t| Param::new("", t.clone())).collect();
        Self {
            name: name.into(),
            ty,
            params,
            attrs: FnAttrs::empty(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Position of the first valid insertion point in the entry block.
    pub fn entry_insertion_point(&self) -> Option<usize> {
        self.blocks.first().and_then(Block::first_insertion_point)
    }

    /// Add a block and return its index.
    pub fn push_block(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Add attributes to parameter `index`. Returns `false` if there is no such parameter.
    pub fn add_param_attr(&mut self, index: usize, attrs: ParamAttrs) -> bool {
        self.params.get_mut(index).is_some_and(|p| {
            p.attrs |= attrs;
            true
        })
    }

    /// Iterate over all instructions in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.iter().flat_map(|block| block.instrs.iter())
    }

    /// Locate an instruction by id as (block index, position).
    pub fn find_instr(&self, id: InstrId) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(b, block)| block.position(id).map(|pos| (b, pos)))
    }

    /// Check if `operand` can be used at the entry block's first insertion point.
    ///
    /// Constants, globals, function references and parameters are available
    /// there; instruction results are not.
    pub fn is_available_at_entry(&self, operand: &Operand) -> bool {
        match operand.as_local() {
            Some(name) => self.params.iter().any(|p| p.name == name),
            None => true,
        }
    }

    fn has_local(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
            || self.instructions().any(|i| i.result.as_deref() == Some(name))
    }

    /// Pick a local name based on `base` that is not used yet.
    pub fn unique_local_name(&self, base: &str) -> String {
        if !self.has_local(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !self.has_local(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::InstrKind;

    #[test]
    fn test_param_attrs() {
        let sig = FnType::log_function(crate::host::LogSignature::Format);
        let mut decl = Function::declaration("printf", sig);
        assert!(decl.is_declaration());
        assert!(decl.add_param_attr(0, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE));
        assert!(!decl.add_param_attr(3, ParamAttrs::READONLY));
        assert_eq!(decl.params[0].attrs, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE);
    }

    #[test]
    fn test_entry_availability_and_local_names() {
        let fp_ty = FnType::new(Type::Void, vec![], false).ptr();
        let mut f = Function::new("dispatch", Type::Void, vec![Param::new("handler", fp_ty.clone())]);
        let mut entry = Block::new("entry");
        entry.push(Instr::new(
            InstrId(0),
            Some("tmp".into()),
            InstrKind::Load {
                ty: fp_ty.clone(),
                ptr: Operand::global("slot", fp_ty.clone()),
            },
        ));
        f.push_block(entry);

        assert!(f.is_available_at_entry(&Operand::local("handler", fp_ty.clone())));
        assert!(!f.is_available_at_entry(&Operand::local("tmp", fp_ty.clone())));
        assert!(f.is_available_at_entry(&Operand::global("slot", fp_ty)));
        assert_eq!(f.unique_local_name("tmp"), "tmp1");
        assert_eq!(f.unique_local_name("fresh"), "fresh");
        assert_eq!(f.find_instr(InstrId(0)), Some((0, 0)));
    }
}
