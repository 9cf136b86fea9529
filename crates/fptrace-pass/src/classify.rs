//! Call classification.

use fptrace_ir::IrView;

/// Classification of one instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallKind<V> {
    /// Not a call or invoke.
    NotACall,
    /// Call whose callee is a function of the module; carries the callee.
    DirectCall(V),
    /// Call through a runtime value; carries the called operand.
    IndirectCall(V),
}

impl<V> CallKind<V> {
    pub const fn is_indirect(&self) -> bool {
        matches!(self, Self::IndirectCall(_))
    }
}

/// Classify a single instruction.
pub fn classify<H: IrView + ?Sized>(ir: &H, instr: H::Instr) -> CallKind<H::Value> {
    let Some(callee) = ir.called_operand(instr) else {
        return CallKind::NotACall;
    };
    if ir.is_function_ref(&callee) {
        CallKind::DirectCall(callee)
    } else {
        CallKind::IndirectCall(callee)
    }
}

/// Target operand if `instr` is an indirect call through a pointer-typed value.
///
/// Indirect calls through non-pointer operands are neither reported nor
/// instrumented.
pub fn indirect_target<H: IrView + ?Sized>(ir: &H, instr: H::Instr) -> Option<H::Value> {
    match classify(ir, instr) {
        CallKind::IndirectCall(target) if ir.is_pointer(&target) => Some(target),
        _ => None,
    }
}
