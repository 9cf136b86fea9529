//! IR types.

use crate::host::LogSignature;

/// Static type of a value.
///
/// Pointers are typed, so turning a `[N x i8]*` into an `i8*` needs an
/// explicit cast.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Integer of the given bit width.
    Int(u32),
    /// Pointer to the inner type.
    Ptr(Box<Type>),
    Array { elem: Box<Type>, len: u64 },
    Function(FnType),
}

impl Type {
    pub const fn i8() -> Self {
        Self::Int(8)
    }

    pub const fn i32() -> Self {
        Self::Int(32)
    }

    /// Pointer to `pointee`.
    pub fn ptr_to(pointee: Self) -> Self {
        Self::Ptr(Box::new(pointee))
    }

    /// `i8*`, the C string pointer type.
    pub fn i8_ptr() -> Self {
        Self::ptr_to(Self::i8())
    }

    pub fn array(elem: Self, len: u64) -> Self {
        Self::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Check if values of this type are pointer-like.
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }
}

/// Function signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnType {
    pub ret: Box<Type>,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl FnType {
    pub fn new(ret: Type, params: Vec<Type>, variadic: bool) -> Self {
        Self {
            ret: Box::new(ret),
            params,
            variadic,
        }
    }

    /// Type of a log function of shape `sig`.
    pub fn log_function(sig: LogSignature) -> Self {
        let params = match sig {
            LogSignature::Format => vec![Type::i8_ptr()],
            LogSignature::FdFormat => vec![Type::i32(), Type::i8_ptr()],
        };
        Self::new(Type::i32(), params, true)
    }

    /// Type of a pointer to a function with this signature.
    pub fn ptr(&self) -> Type {
        Type::ptr_to(Type::Function(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_classification() {
        assert!(Type::i8_ptr().is_pointer());
        assert!(FnType::new(Type::Void, vec![], false).ptr().is_pointer());
        assert!(!Type::i32().is_pointer());
        assert!(!Type::array(Type::i8(), 4).is_pointer());
    }

    #[test]
    fn test_log_function_types() {
        let printf = FnType::log_function(LogSignature::Format);
        assert_eq!(printf.params, vec![Type::i8_ptr()]);
        assert!(printf.variadic);
        let dprintf = FnType::log_function(LogSignature::FdFormat);
        assert_eq!(dprintf.params, vec![Type::i32(), Type::i8_ptr()]);
    }
}
