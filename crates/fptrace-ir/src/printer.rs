//! Textual rendering of the IR.
//!
//! The output reads like LLVM assembly. Instruction and operand renderings
//! are echoed by the static reporter, so they must stay deterministic.

use std::fmt::{self, Display, Formatter};

use crate::instr::{Instr, InstrId, InstrKind};
use crate::operand::Operand;
use crate::types::{FnType, Type};

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::Ptr(inner) => write!(f, "{inner}*"),
            Self::Array { elem, len } => write!(f, "[{len} x {elem}]"),
            Self::Function(sig) => write!(f, "{sig}"),
        }
    }
}

impl Display for FnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { name, .. } => write!(f, "%{name}"),
            Self::Function { name, .. } | Self::Global { name, .. } => write!(f, "@{name}"),
            Self::ConstInt { value, .. } => write!(f, "{value}"),
            Self::Null(_) => f.write_str("null"),
        }
    }
}

impl Display for InstrId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "inst#{}", self.0)
    }
}

/// Operand rendered with its type, e.g. `i8* %fp`.
struct Typed<'a>(&'a Operand);

impl Display for Typed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0.ty(), self.0)
    }
}

fn join_typed(args: &[Operand]) -> String {
    args.iter()
        .map(|a| Typed(a).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Callee type as printed in a call: the full signature for variadic
/// callees, otherwise only the return type.
fn call_type(sig: &FnType) -> String {
    if sig.variadic {
        sig.to_string()
    } else {
        sig.ret.to_string()
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.result {
            write!(f, "%{name} = ")?;
        }
        match &self.kind {
            InstrKind::Alloca { ty } => write!(f, "alloca {ty}"),
            InstrKind::Load { ty, ptr } => write!(f, "load {ty}, {}", Typed(ptr)),
            InstrKind::Add { lhs, rhs } => write!(f, "add {} {lhs}, {rhs}", lhs.ty()),
            InstrKind::Bitcast { value, to } => write!(f, "bitcast {} to {to}", Typed(value)),
            InstrKind::Phi { ty, incoming } => {
                write!(f, "phi {ty} ")?;
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(v, label)| format!("[ {v}, %{label} ]"))
                    .collect();
                f.write_str(&arms.join(", "))
            }
            InstrKind::Call {
                callee,
                args,
                fn_ty,
            } => write!(f, "call {} {callee}({})", call_type(fn_ty), join_typed(args)),
            InstrKind::Invoke {
                callee,
                args,
                fn_ty,
                normal,
                unwind,
            } => write!(
                f,
                "invoke {} {callee}({}) to label %{normal} unwind label %{unwind}",
                call_type(fn_ty),
                join_typed(args)
            ),
            InstrKind::Br { target } => write!(f, "br label %{target}"),
            InstrKind::Ret { value: Some(v) } => write!(f, "ret {}", Typed(v)),
            InstrKind::Ret { value: None } => f.write_str("ret void"),
        }
    }
}
