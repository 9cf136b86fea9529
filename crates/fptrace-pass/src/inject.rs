//! Runtime trace injection for indirect calls.
//!
//! For each qualifying indirect call the injector emits
//!
//! ```text
//! %formatStr = bitcast [N x i8]* @PrintfFormatStr to i8*
//! %funcName  = bitcast [M x i8]* @fptrace.name to i8*
//! call i32 (i8*, ...) @printf(i8* %formatStr, i8* %funcName, <target>)
//! ```
//!
//! The logging declaration and the format string are created lazily, at
//! most once per module, and only if the module has a qualifying call.
//! Everything that can fail is checked before the first edit, so an error
//! leaves the module untouched.

use fptrace_ir::{IrEdit, Linkage};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace_span, warn};

use crate::config::{FORMAT_TEMPLATE, InjectConfig, STDERR_FD, TracePlacement, TraceStream};
use crate::driver::{IndirectSite, collect_sites};
use crate::error::{Error, Result};

/// Result of instrumenting one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InjectOutcome {
    /// Trace calls inserted.
    pub injected: usize,
    /// Entry-placed traces that went to their call site instead.
    pub relocated: usize,
    /// Functions that received at least one trace.
    pub functions: usize,
}

impl InjectOutcome {
    /// Check if the module was modified.
    pub const fn changed(&self) -> bool {
        self.injected > 0
    }
}

/// A site together with the instruction its trace goes in front of.
struct Placement<H: IrEdit + ?Sized> {
    site: IndirectSite<H>,
    anchor: H::Instr,
}

/// Symbols already present in the module that the injector may reuse.
struct ExistingSymbols<H: IrEdit + ?Sized> {
    log_fn: Option<H::Function>,
    format: Option<H::Global>,
}

/// Mutation context for one module.
///
/// Memoizes the symbols it creates, so every `ensure_*` call is
/// get-or-create and never adds a second copy.
struct InjectionContext<'a, H: IrEdit + ?Sized> {
    ir: &'a mut H,
    config: &'a InjectConfig,
    existing: ExistingSymbols<H>,
    log_fn: Option<H::Function>,
    format: Option<H::Global>,
    names: FxHashMap<H::Function, H::Global>,
}

impl<'a, H: IrEdit + ?Sized> InjectionContext<'a, H> {
    fn new(ir: &'a mut H, config: &'a InjectConfig, existing: ExistingSymbols<H>) -> Self {
        Self {
            ir,
            config,
            existing,
            log_fn: None,
            format: None,
            names: FxHashMap::default(),
        }
    }

    /// Look up or declare the external logging function.
    ///
    /// The function is marked non-throwing and its format parameter
    /// read-only and non-captured.
    fn ensure_log_function(&mut self) -> H::Function {
        if let Some(func) = self.log_fn {
            return func;
        }
        let sig = self.config.stream.signature();
        let func = match self.existing.log_fn {
            Some(func) => func,
            None => self.ir.declare_log_function(&self.config.log_function, sig),
        };
        self.ir.set_no_unwind(func);
        self.ir.set_param_readonly_nocapture(func, sig.format_param());
        self.log_fn = Some(func);
        func
    }

    /// Look up or create the shared format string global.
    ///
    /// An existing global keeps its linkage; its initializer is only written
    /// when it has none.
    fn ensure_format_constant(&mut self) -> H::Global {
        if let Some(global) = self.format {
            return global;
        }
        let global = match self.existing.format {
            Some(global) => {
                if !self.ir.has_initializer(global) {
                    self.ir.set_string_initializer(global, FORMAT_TEMPLATE);
                }
                global
            }
            None => self.ir.add_string_global(
                &self.config.format_global,
                FORMAT_TEMPLATE,
                Linkage::Internal,
            ),
        };
        self.format = Some(global);
        global
    }

    /// Private string holding the name of `func`, one per function.
    fn function_name_constant(&mut self, func: H::Function) -> H::Global {
        if let Some(global) = self.names.get(&func) {
            return *global;
        }
        let name = self.ir.function_name(func);
        let global = self
            .ir
            .add_string_global(&self.config.name_prefix, &name, Linkage::Private);
        self.names.insert(func, global);
        global
    }

    /// Emit one trace call for `site` right before `anchor`.
    fn inject_before(&mut self, site: &IndirectSite<H>, anchor: H::Instr) -> Result<()> {
        let log_fn = self.ensure_log_function();
        let format = self.ensure_format_constant();
        let name = self.function_name_constant(site.func);

        debug!(
            "Injecting call to {} inside {}",
            self.config.log_function,
            self.ir.function_name(site.func)
        );

        let format_ref = self.ir.global_ref(format);
        let format_ptr = self.ir.insert_pointer_cast(anchor, format_ref, "formatStr")?;
        let name_ref = self.ir.global_ref(name);
        let name_ptr = self.ir.insert_pointer_cast(anchor, name_ref, "funcName")?;

        let mut args = Vec::with_capacity(4);
        if self.config.stream == TraceStream::Stderr {
            args.push(self.ir.const_i32(STDERR_FD));
        }
        args.extend([format_ptr, name_ptr, site.target.clone()]);
        self.ir.insert_call(anchor, log_fn, &args)?;
        Ok(())
    }
}

/// Inserts runtime traces for indirect calls.
#[derive(Clone, Debug, Default)]
pub struct TraceInjector {
    config: InjectConfig,
}

impl TraceInjector {
    pub const fn new(config: InjectConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &InjectConfig {
        &self.config
    }

    /// Instrument every qualifying indirect call in the module.
    ///
    /// Sites are collected, placed and checked against existing symbols
    /// first; only then is the module edited. Traces that share an anchor
    /// are inserted in front of it one after another, so they keep
    /// discovery order.
    pub fn run<H: IrEdit + ?Sized>(&self, ir: &mut H) -> Result<InjectOutcome> {
        let _span = trace_span!("inject").entered();
        let sites = collect_sites(ir);
        let mut outcome = InjectOutcome::default();
        if sites.is_empty() {
            debug!("No indirect calls found");
            return Ok(outcome);
        }

        let placements = self.place(ir, sites, &mut outcome)?;
        let existing = self.check_symbols(ir)?;

        let mut ctx = InjectionContext::new(ir, &self.config, existing);
        let mut touched = FxHashSet::default();
        for Placement { site, anchor } in &placements {
            ctx.inject_before(site, *anchor)?;
            touched.insert(site.func);
            outcome.injected += 1;
        }

        outcome.functions = touched.len();
        info!(
            injected = outcome.injected,
            functions = outcome.functions,
            relocated = outcome.relocated,
            "Instrumented indirect calls"
        );
        Ok(outcome)
    }

    /// Pick the anchor instruction of every trace.
    fn place<H: IrEdit + ?Sized>(
        &self,
        ir: &H,
        sites: Vec<IndirectSite<H>>,
        outcome: &mut InjectOutcome,
    ) -> Result<Vec<Placement<H>>> {
        sites
            .into_iter()
            .map(|site| {
                let anchor = match self.config.placement {
                    TracePlacement::CallSite => site.instr,
                    TracePlacement::Entry if !ir.is_available_at_entry(site.func, &site.target) => {
                        warn!(
                            function = %ir.function_name(site.func),
                            target = %ir.render_value(&site.target),
                            "call target not available at function entry, tracing at the call site"
                        );
                        outcome.relocated += 1;
                        site.instr
                    }
                    TracePlacement::Entry => ir
                        .entry_insertion_point(site.func)
                        .ok_or_else(|| Error::MissingEntry(ir.function_name(site.func)))?,
                };
                Ok(Placement { site, anchor })
            })
            .collect()
    }

    /// Find reusable symbols, rejecting same-named symbols of another kind or type.
    fn check_symbols<H: IrEdit + ?Sized>(&self, ir: &H) -> Result<ExistingSymbols<H>> {
        let log_name = self.config.log_function.as_str();
        let log_fn = match ir.find_function(log_name) {
            Some(func) if ir.has_log_signature(func, self.config.stream.signature()) => Some(func),
            Some(_) => return Err(conflict(log_name, "a function of the log function type")),
            None if ir.find_global(log_name).is_some() => {
                return Err(conflict(log_name, "a function"));
            }
            None => None,
        };

        let format_name = self.config.format_global.as_str();
        let format = match ir.find_global(format_name) {
            Some(global) if ir.is_byte_array(global, FORMAT_TEMPLATE.len() + 1) => Some(global),
            Some(_) => return Err(conflict(format_name, "a byte array sized for the format")),
            None if ir.find_function(format_name).is_some() => {
                return Err(conflict(format_name, "a global"));
            }
            None => None,
        };

        Ok(ExistingSymbols { log_fn, format })
    }
}

fn conflict(name: &str, expected: &'static str) -> Error {
    Error::SymbolConflict {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use fptrace_ir::{
        Block, FnAttrs, FnType, Function, GlobalVar, Instr, InstrId, InstrKind, LogSignature,
        Module, Operand, Param, ParamAttrs, Type,
    };

    use super::*;
    use crate::config::DEFAULT_FORMAT_GLOBAL;

    fn cb_sig() -> FnType {
        FnType::new(Type::Void, vec![], false)
    }

    fn indirect_call(id: u32, target: Operand) -> Instr {
        Instr::new(
            InstrId(id),
            None,
            InstrKind::Call {
                callee: target,
                args: vec![],
                fn_ty: cb_sig(),
            },
        )
    }

    /// `void run(void ()* %cb) { entry: call %cb(); call %cb(); ret void }`
    fn module_with_param_calls() -> Module {
        let cb = Operand::local("cb", cb_sig().ptr());
        let mut f = Function::new("run", Type::Void, vec![Param::new("cb", cb_sig().ptr())]);
        let mut entry = Block::new("entry");
        entry.push(indirect_call(0, cb.clone()));
        entry.push(indirect_call(1, cb));
        entry.push(Instr::new(InstrId(2), None, InstrKind::Ret { value: None }));
        f.push_block(entry);
        let mut module = Module::new("m");
        module.add_function(f);
        module
    }

    fn printf_calls(function: &Function) -> Vec<&Instr> {
        function
            .instructions()
            .filter(|i| i.called_function() == Some("printf"))
            .collect()
    }

    #[test]
    fn test_symbols_created_once() {
        let mut module = module_with_param_calls();
        let outcome = TraceInjector::default().run(&mut module).unwrap();
        assert_eq!(outcome.injected, 2);
        let printf: Vec<_> = module.functions.iter().filter(|f| f.name == "printf").collect();
        let format: Vec<_> = module
            .globals
            .iter()
            .filter(|g| g.name == DEFAULT_FORMAT_GLOBAL)
            .collect();
        assert_eq!(printf.len(), 1);
        assert_eq!(format.len(), 1);
        assert_eq!(format[0].linkage, Linkage::Internal);
        assert!(format[0].constant);
    }

    #[test]
    fn test_second_run_reuses_symbols() {
        let mut module = module_with_param_calls();
        let injector = TraceInjector::default();
        injector.run(&mut module).unwrap();
        let declared = module.functions.len();
        injector.run(&mut module).unwrap();
        assert_eq!(module.functions.len(), declared);
        let format_globals = module
            .globals
            .iter()
            .filter(|g| g.name.starts_with(DEFAULT_FORMAT_GLOBAL))
            .count();
        assert_eq!(format_globals, 1);
    }

    #[test]
    fn test_log_function_attributes() {
        let mut module = module_with_param_calls();
        TraceInjector::default().run(&mut module).unwrap();
        let decl = module.functions.iter().find(|f| f.name == "printf").unwrap();
        assert!(decl.is_declaration());
        assert!(decl.ty.variadic);
        assert!(decl.attrs.contains(FnAttrs::NOUNWIND));
        assert_eq!(decl.params[0].attrs, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE);
    }

    #[test]
    fn test_existing_printf_is_reused_and_annotated() {
        let mut module = module_with_param_calls();
        let printf = module.add_function(Function::declaration(
            "printf",
            FnType::log_function(LogSignature::Format),
        ));
        TraceInjector::default().run(&mut module).unwrap();
        assert_eq!(module.functions.iter().filter(|f| f.name == "printf").count(), 1);
        let decl = module.function(printf).unwrap();
        assert!(decl.attrs.contains(FnAttrs::NOUNWIND));
        assert_eq!(decl.params[0].attrs, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE);
    }

    #[test]
    fn test_existing_printf_with_other_type_is_rejected() {
        let mut module = module_with_param_calls();
        module.add_function(Function::declaration("printf", cb_sig()));
        let before = module.clone();
        let err = TraceInjector::default().run(&mut module).unwrap_err();
        assert!(matches!(err, Error::SymbolConflict { ref name, .. } if name == "printf"));
        assert_eq!(module, before);
    }

    #[test]
    fn test_format_name_taken_by_function_leaves_module_unchanged() {
        let mut module = module_with_param_calls();
        module.add_function(Function::declaration(DEFAULT_FORMAT_GLOBAL, cb_sig()));
        let before = module.clone();
        let err = TraceInjector::default().run(&mut module).unwrap_err();
        assert!(matches!(err, Error::SymbolConflict { expected: "a global", .. }));
        assert_eq!(module, before);
        assert!(!module.functions.iter().any(|f| f.name == "printf"));
    }

    #[test]
    fn test_existing_format_global_keeps_initializer() {
        let mut module = module_with_param_calls();
        let mut existing =
            GlobalVar::c_string(DEFAULT_FORMAT_GLOBAL, FORMAT_TEMPLATE, Linkage::External);
        existing.constant = false;
        module.add_global(existing.clone());
        TraceInjector::default().run(&mut module).unwrap();
        let fmt: Vec<_> = module
            .globals
            .iter()
            .filter(|g| g.name == DEFAULT_FORMAT_GLOBAL)
            .collect();
        assert_eq!(fmt.len(), 1);
        assert_eq!(*fmt[0], existing);
    }

    #[test]
    fn test_existing_format_declaration_gets_initializer() {
        let mut module = module_with_param_calls();
        let ty = Type::array(Type::i8(), FORMAT_TEMPLATE.len() as u64 + 1);
        module.add_global(GlobalVar::external(DEFAULT_FORMAT_GLOBAL, ty));
        TraceInjector::default().run(&mut module).unwrap();
        let init = module.globals[0].initializer.as_deref().unwrap();
        assert_eq!(&init[..init.len() - 1], FORMAT_TEMPLATE.as_bytes());
        assert_eq!(module.globals[0].linkage, Linkage::External);
    }

    #[test]
    fn test_entry_placement_keeps_discovery_order() {
        let mut module = module_with_param_calls();
        let outcome = TraceInjector::default().run(&mut module).unwrap();
        assert_eq!(outcome.injected, 2);
        assert_eq!(outcome.functions, 1);
        assert!(outcome.changed());

        let run = &module.functions[0];
        let entry = &run.blocks[0];
        // 2 x (format cast, name cast, printf) then the original code.
        assert_eq!(entry.instrs.len(), 3 + 6);
        assert_eq!(printf_calls(run).len(), 2);
        assert_eq!(entry.instrs[2].called_function(), Some("printf"));
        assert_eq!(entry.instrs[5].called_function(), Some("printf"));
        assert_eq!(entry.instrs[6].id, InstrId(0));
        assert_eq!(entry.instrs[7].id, InstrId(1));
        // Format global plus one name string shared by both traces in `run`.
        assert_eq!(module.globals.len(), 2);
    }

    #[test]
    fn test_call_site_placement() {
        let mut module = module_with_param_calls();
        let injector = TraceInjector::new(InjectConfig::with_placement(TracePlacement::CallSite));
        injector.run(&mut module).unwrap();

        let entry = &module.functions[0].blocks[0];
        let first = entry.position(InstrId(0)).unwrap();
        let second = entry.position(InstrId(1)).unwrap();
        assert_eq!(entry.instrs[first - 1].called_function(), Some("printf"));
        assert_eq!(entry.instrs[second - 1].called_function(), Some("printf"));
        assert_eq!(second - first, 4);
    }

    #[test]
    fn test_stderr_stream_passes_fd() {
        let mut module = module_with_param_calls();
        let injector = TraceInjector::new(InjectConfig::default().to_stderr());
        injector.run(&mut module).unwrap();

        let decl = module.functions.iter().find(|f| f.name == "dprintf").unwrap();
        assert_eq!(decl.ty, FnType::log_function(LogSignature::FdFormat));
        assert_eq!(decl.params[1].attrs, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE);
        let call = module.functions[0]
            .instructions()
            .find(|i| i.called_function() == Some("dprintf"))
            .unwrap();
        assert_eq!(call.call_args()[0], Operand::const_int(Type::i32(), 2));
        assert_eq!(call.call_args().len(), 4);
    }

    #[test]
    fn test_unavailable_target_is_traced_at_call_site() {
        let slot_ty = cb_sig().ptr();
        let mut f = Function::new("main", Type::i32(), vec![]);
        let mut entry = Block::new("entry");
        entry.push(Instr::new(
            InstrId(0),
            Some("fp".into()),
            InstrKind::Alloca { ty: slot_ty.clone() },
        ));
        entry.push(Instr::new(
            InstrId(1),
            Some("loaded".into()),
            InstrKind::Load {
                ty: slot_ty.clone(),
                ptr: Operand::local("fp", Type::ptr_to(slot_ty.clone())),
            },
        ));
        entry.push(indirect_call(2, Operand::local("loaded", slot_ty)));
        entry.push(Instr::new(
            InstrId(3),
            None,
            InstrKind::Ret {
                value: Some(Operand::const_int(Type::i32(), 0)),
            },
        ));
        f.push_block(entry);
        let mut module = Module::new("m");
        module.add_function(f);

        let outcome = TraceInjector::default().run(&mut module).unwrap();
        assert_eq!(outcome.relocated, 1);
        let entry = &module.functions[0].blocks[0];
        let call_pos = entry.position(InstrId(2)).unwrap();
        assert_eq!(entry.instrs[call_pos - 1].called_function(), Some("printf"));
        // The load still precedes the trace that uses its result.
        assert!(entry.position(InstrId(1)).unwrap() < call_pos - 1);
    }

    #[test]
    fn test_missing_entry_insertion_point() {
        let cb = Operand::local("cb", cb_sig().ptr());
        let mut f = Function::new("odd", Type::Void, vec![Param::new("cb", cb_sig().ptr())]);
        f.push_block(Block::new("entry"));
        let mut body = Block::new("body");
        body.push(indirect_call(0, cb));
        f.push_block(body);
        let mut module = Module::new("m");
        module.add_function(f);

        let err = TraceInjector::default().run(&mut module).unwrap_err();
        assert!(matches!(err, Error::MissingEntry(name) if name == "odd"));
    }

    #[test]
    fn test_missing_entry_with_call_site_placement_is_fine() {
        let cb = Operand::local("cb", cb_sig().ptr());
        let mut f = Function::new("odd", Type::Void, vec![Param::new("cb", cb_sig().ptr())]);
        f.push_block(Block::new("entry"));
        let mut body = Block::new("body");
        body.push(indirect_call(0, cb));
        f.push_block(body);
        let mut module = Module::new("m");
        module.add_function(f);

        let injector = TraceInjector::new(InjectConfig::with_placement(TracePlacement::CallSite));
        assert_eq!(injector.run(&mut module).unwrap().injected, 1);
    }
}
