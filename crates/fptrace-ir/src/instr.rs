//! Single instruction IR.

use crate::operand::Operand;
use crate::types::{FnType, Type};

/// Module-unique instruction identity.
///
/// Only unique within one analysis run; it is not a stable identifier
/// across runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

/// Instruction kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstrKind {
    Alloca {
        ty: Type,
    },
    Load {
        ty: Type,
        ptr: Operand,
    },
    Add {
        lhs: Operand,
        rhs: Operand,
    },
    /// Pointer representation cast.
    Bitcast {
        value: Operand,
        to: Type,
    },
    /// SSA merge; `incoming` pairs a value with its predecessor block label.
    Phi {
        ty: Type,
        incoming: Vec<(Operand, String)>,
    },
    Call {
        callee: Operand,
        args: Vec<Operand>,
        fn_ty: FnType,
    },
    /// Call with an exceptional successor.
    Invoke {
        callee: Operand,
        args: Vec<Operand>,
        fn_ty: FnType,
        normal: String,
        unwind: String,
    },
    Br {
        target: String,
    },
    Ret {
        value: Option<Operand>,
    },
}

/// IR for a single instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instr {
    pub id: InstrId,
    /// Name of the SSA value this instruction defines, if any.
    pub result: Option<String>,
    pub kind: InstrKind,
}

impl Instr {
    pub const fn new(id: InstrId, result: Option<String>, kind: InstrKind) -> Self {
        Self { id, result, kind }
    }

    /// The operand used as the call target, whether or not it names a known function.
    pub const fn called_operand(&self) -> Option<&Operand> {
        match &self.kind {
            InstrKind::Call { callee, .. } | InstrKind::Invoke { callee, .. } => Some(callee),
            _ => None,
        }
    }

    /// The statically known callee, if the call target is a direct function reference.
    pub fn called_function(&self) -> Option<&str> {
        self.called_operand().and_then(Operand::as_function)
    }

    /// Call arguments (empty for non-calls).
    pub fn call_args(&self) -> &[Operand] {
        match &self.kind {
            InstrKind::Call { args, .. } | InstrKind::Invoke { args, .. } => args,
            _ => &[],
        }
    }

    pub const fn is_phi(&self) -> bool {
        matches!(self.kind, InstrKind::Phi { .. })
    }
}
