//! The IR interface the fptrace passes run against.
//!
//! A host compiler exposes its module graph through [`IrView`] for read-only
//! traversal and [`IrEdit`] for the insertions the trace injector performs.
//! Handles are plain copyable ids that stay valid across insertions.

use std::hash::Hash;

use crate::error::Result;

/// Linkage of a global created by a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Linkage {
    #[default]
    External,
    /// Module-local, keeps its name.
    Internal,
    /// Module-local, may be renamed or merged.
    Private,
}

/// Shape of the external log function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogSignature {
    /// `i32 (ptr, ...)`, as `printf`.
    #[default]
    Format,
    /// `i32 (i32, ptr, ...)`, as `dprintf`: a file descriptor comes first.
    FdFormat,
}

impl LogSignature {
    /// Index of the format string parameter.
    pub const fn format_param(self) -> u32 {
        match self {
            Self::Format => 0,
            Self::FdFormat => 1,
        }
    }
}

/// Read-only view of a module.
pub trait IrView {
    type Function: Copy + Eq + Hash;
    type Instr: Copy + Eq;
    type Value: Clone;

    /// Functions in module order.
    fn functions(&self) -> Vec<Self::Function>;

    fn function_name(&self, func: Self::Function) -> String;

    /// Check if `func` has no body.
    fn is_declaration(&self, func: Self::Function) -> bool;

    /// Instructions of `func` in block order, then in-block order.
    fn instructions(&self, func: Self::Function) -> Vec<Self::Instr>;

    /// The value a call or invoke calls through; `None` for other instructions.
    fn called_operand(&self, instr: Self::Instr) -> Option<Self::Value>;

    /// Check if `value` is a direct reference to a function of the module.
    fn is_function_ref(&self, value: &Self::Value) -> bool;

    /// Check if the static type of `value` is pointer-like.
    fn is_pointer(&self, value: &Self::Value) -> bool;

    /// Human-readable instruction text.
    fn render_instr(&self, instr: Self::Instr) -> String;

    /// Human-readable value text.
    fn render_value(&self, value: &Self::Value) -> String;

    /// Identity of an instruction, unique within one analysis run.
    fn instr_identity(&self, instr: Self::Instr) -> String;

    /// Identity of a value used in `func`, unique within one analysis run.
    fn value_identity(&self, func: Self::Function, value: &Self::Value) -> String;
}

/// Symbol lookup and insertion on top of [`IrView`].
pub trait IrEdit: IrView {
    type Global: Copy + Eq;

    fn find_function(&self, name: &str) -> Option<Self::Function>;

    fn find_global(&self, name: &str) -> Option<Self::Global>;

    /// Check if the type of `func` matches `sig`.
    fn has_log_signature(&self, func: Self::Function, sig: LogSignature) -> bool;

    /// Declare an external variadic function of shape `sig`.
    fn declare_log_function(&mut self, name: &str, sig: LogSignature) -> Self::Function;

    /// Mark `func` as never unwinding.
    fn set_no_unwind(&mut self, func: Self::Function);

    /// Mark parameter `index` of `func` read-only and not captured.
    fn set_param_readonly_nocapture(&mut self, func: Self::Function, index: u32);

    /// Check if `global` holds a byte array of `len` bytes.
    fn is_byte_array(&self, global: Self::Global, len: usize) -> bool;

    fn has_initializer(&self, global: Self::Global) -> bool;

    /// Initialize `global` with `text` plus a trailing NUL.
    fn set_string_initializer(&mut self, global: Self::Global, text: &str);

    /// Add a constant NUL-terminated string global. `name` is a base name;
    /// the host picks a fresh one if it is taken.
    fn add_string_global(&mut self, name: &str, text: &str, linkage: Linkage) -> Self::Global;

    /// 32-bit integer constant.
    fn const_i32(&self, value: i32) -> Self::Value;

    /// Address of `global` as a value.
    fn global_ref(&self, global: Self::Global) -> Self::Value;

    /// First instruction of the entry block that non-phi code may precede.
    fn entry_insertion_point(&self, func: Self::Function) -> Option<Self::Instr>;

    /// Check if `value` can be used at the entry insertion point of `func`.
    fn is_available_at_entry(&self, func: Self::Function, value: &Self::Value) -> bool;

    /// Insert a cast of `value` to a byte pointer before `before`.
    fn insert_pointer_cast(
        &mut self,
        before: Self::Instr,
        value: Self::Value,
        name: &str,
    ) -> Result<Self::Value>;

    /// Insert a call of `callee` with `args` before `before`.
    fn insert_call(
        &mut self,
        before: Self::Instr,
        callee: Self::Function,
        args: &[Self::Value],
    ) -> Result<Self::Instr>;
}
