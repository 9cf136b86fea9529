//! Instruction operands.

use crate::types::{FnType, Type};

/// A value used by an instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// SSA value: a function parameter or an instruction result.
    Local { name: String, ty: Type },
    /// Direct reference to a module function.
    Function { name: String, ty: FnType },
    /// Address of a module global. `ty` is the global's value type.
    Global { name: String, ty: Type },
    ConstInt { ty: Type, value: i64 },
    /// Null pointer of the given pointer type.
    Null(Type),
}

impl Operand {
    pub fn local(name: impl Into<String>, ty: Type) -> Self {
        Self::Local {
            name: name.into(),
            ty,
        }
    }

    pub fn function(name: impl Into<String>, ty: FnType) -> Self {
        Self::Function {
            name: name.into(),
            ty,
        }
    }

    pub fn global(name: impl Into<String>, ty: Type) -> Self {
        Self::Global {
            name: name.into(),
            ty,
        }
    }

    pub const fn const_int(ty: Type, value: i64) -> Self {
        Self::ConstInt { ty, value }
    }

    /// Static type of this operand.
    pub fn ty(&self) -> Type {
        match self {
            Self::Local { ty, .. } | Self::ConstInt { ty, .. } | Self::Null(ty) => ty.clone(),
            Self::Function { ty, .. } => ty.ptr(),
            Self::Global { ty, .. } => Type::ptr_to(ty.clone()),
        }
    }

    /// Check if the operand's static type is pointer-like.
    pub const fn is_pointer(&self) -> bool {
        match self {
            Self::Local { ty, .. } | Self::ConstInt { ty, .. } | Self::Null(ty) => ty.is_pointer(),
            Self::Function { .. } | Self::Global { .. } => true,
        }
    }

    /// Name of the referenced function, if this is a direct function reference.
    pub fn as_function(&self) -> Option<&str> {
        match self {
            Self::Function { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Name of the SSA value, if this is a local.
    pub fn as_local(&self) -> Option<&str> {
        match self {
            Self::Local { name, .. } => Some(name),
            _ => None,
        }
    }
}
