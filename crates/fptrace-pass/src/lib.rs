//! Indirect call detection and instrumentation.
//!
//! Every call instruction is classified as direct or indirect. Indirect
//! calls through a pointer-typed operand are handed to one of two sinks:
//!
//! - [`TraceInjector`] adds a runtime `printf` trace of the enclosing
//!   function name and the call target.
//! - [`StaticReporter`] appends one CSV row per call site to a report log.
//!
//! Both run against any host that implements the [`fptrace_ir::IrView`] and
//! [`fptrace_ir::IrEdit`] traits.

mod classify;
mod config;
mod driver;
mod error;
mod inject;
mod report;

pub use classify::*;
pub use config::*;
pub use driver::*;
pub use error::*;
pub use inject::*;
pub use report::*;
