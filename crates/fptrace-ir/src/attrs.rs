//! Attribute sets attached to functions and their parameters.

use bitflags::bitflags;

bitflags! {
    /// Function-level attributes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FnAttrs: u32 {
        /// The function never unwinds.
        const NOUNWIND = 0x0001;
    }
}

bitflags! {
    /// Parameter-level attributes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParamAttrs: u32 {
        /// The callee only reads through the pointer.
        const READONLY = 0x0001;
        /// The callee does not keep the pointer after returning.
        const NOCAPTURE = 0x0002;
    }
}
