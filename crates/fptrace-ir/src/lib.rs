//! Host IR interface for the fptrace passes, plus an in-memory host.
//!
//! The passes only see a compiler through the [`IrView`] and [`IrEdit`]
//! traits. [`Module`] implements both over a small LLVM-shaped graph: a
//! module owns globals and [`Function`]s, functions own [`Block`]s and
//! blocks own [`Instr`]s. It backs the pass tests and any tooling that
//! does not link a real compiler.

mod attrs;
mod block;
mod error;
mod function;
mod host;
mod instr;
mod module;
mod operand;
mod printer;
mod types;

pub use attrs::*;
pub use block::*;
pub use error::*;
pub use function::*;
pub use host::*;
pub use instr::*;
pub use module::*;
pub use operand::*;
pub use types::*;
