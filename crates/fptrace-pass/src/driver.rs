//! Traversal over modules and functions.
//!
//! The walk is read-only and single-pass: functions in module order, blocks
//! in function order, instructions in block order. Mutating consumers first
//! collect owned [`IndirectSite`]s and edit the module afterwards, so
//! insertion never races with iteration.

use fptrace_ir::IrView;
use tracing::trace_span;

use crate::classify::indirect_target;

/// An indirect call site found during traversal.
pub struct IndirectSite<H: IrView + ?Sized> {
    /// Enclosing function.
    pub func: H::Function,
    /// The call or invoke.
    pub instr: H::Instr,
    /// Value holding the call target.
    pub target: H::Value,
}

impl<H: IrView + ?Sized> Clone for IndirectSite<H> {
    fn clone(&self) -> Self {
        Self {
            func: self.func,
            instr: self.instr,
            target: self.target.clone(),
        }
    }
}

/// Consumer of indirect call sites.
pub trait CallSiteSink<H: IrView + ?Sized> {
    fn on_indirect_call(&mut self, site: &IndirectSite<H>);
}

impl<H, F> CallSiteSink<H> for F
where
    H: IrView + ?Sized,
    F: FnMut(&IndirectSite<H>),
{
    fn on_indirect_call(&mut self, site: &IndirectSite<H>) {
        self(site);
    }
}

/// Feed every qualifying indirect call in `func` to `sink`.
///
/// Declarations have no call sites. Returns the number of sites found.
pub fn walk_function<H, S>(ir: &H, func: H::Function, sink: &mut S) -> usize
where
    H: IrView + ?Sized,
    S: CallSiteSink<H> + ?Sized,
{
    if ir.is_declaration(func) {
        return 0;
    }
    let mut found = 0;
    for instr in ir.instructions(func) {
        if let Some(target) = indirect_target(ir, instr) {
            sink.on_indirect_call(&IndirectSite {
                func,
                instr,
                target,
            });
            found += 1;
        }
    }
    found
}

/// Feed every qualifying indirect call in the module to `sink`.
pub fn walk_module<H, S>(ir: &H, sink: &mut S) -> usize
where
    H: IrView + ?Sized,
    S: CallSiteSink<H> + ?Sized,
{
    let _span = trace_span!("walk_module").entered();
    ir.functions()
        .into_iter()
        .map(|func| walk_function(ir, func, sink))
        .sum()
}

/// Collect all qualifying indirect call sites in discovery order.
pub fn collect_sites<H: IrView + ?Sized>(ir: &H) -> Vec<IndirectSite<H>> {
    let mut sites = Vec::new();
    walk_module(ir, &mut |site: &IndirectSite<H>| sites.push(site.clone()));
    sites
}
