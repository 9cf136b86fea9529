//! LLVM pass plugin for fptrace.
//!
//! Load with `opt -load-pass-plugin=libfptrace_llvm.so` and pick a pass:
//!
//! - `-passes=fp-trace-inject` instruments every indirect call with a
//!   runtime trace (module pass).
//! - `-passes=fp-report` appends one CSV row per indirect call site to the
//!   report log (function pass).
//!
//! Both passes read their configuration from `FPTRACE_*` environment
//! variables; `FPTRACE_LOG` sets the log filter (default `warn`).

mod host;

pub use host::{FunctionScope, ModuleHost};

use fptrace_pass::{EnvOverlay, Error, InjectConfig, ReportConfig, StaticReporter, TraceInjector};
use llvm_plugin::inkwell::module::Module;
use llvm_plugin::inkwell::values::FunctionValue;
use llvm_plugin::{
    FunctionAnalysisManager, LlvmFunctionPass, LlvmModulePass, ModuleAnalysisManager, PassBuilder,
    PipelineParsing, PreservedAnalyses,
};
use parking_lot::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Pipeline name of the trace injector.
pub const INJECT_PASS: &str = "fp-trace-inject";

/// Pipeline name of the static reporter.
pub const REPORT_PASS: &str = "fp-report";

/// Module pass wrapping [`TraceInjector`].
pub struct InjectPass {
    injector: TraceInjector,
}

impl InjectPass {
    pub const fn new(config: InjectConfig) -> Self {
        Self {
            injector: TraceInjector::new(config),
        }
    }

    /// Default config overlaid with the environment.
    pub fn from_env() -> Self {
        let mut config = InjectConfig::default();
        config.overlay_env();
        Self::new(config)
    }
}

impl LlvmModulePass for InjectPass {
    fn run_pass(&self, module: &mut Module<'_>, _manager: &ModuleAnalysisManager) -> PreservedAnalyses {
        let mut host = ModuleHost::new(module);
        match self.injector.run(&mut host) {
            Ok(outcome) if outcome.changed() => PreservedAnalyses::None,
            Ok(_) => PreservedAnalyses::All,
            // Builder failures can strike after the first edit.
            Err(e @ Error::Ir(_)) => {
                error!("{INJECT_PASS}: {e}");
                PreservedAnalyses::None
            }
            Err(e) => {
                error!("{INJECT_PASS}: {e}");
                PreservedAnalyses::All
            }
        }
    }
}

/// Function pass wrapping [`StaticReporter`].
///
/// The reporter remembers whether the log was opened in this run, so one
/// instance is shared by every function the pass manager visits.
pub struct ReportPass {
    reporter: Mutex<StaticReporter>,
}

impl ReportPass {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            reporter: Mutex::new(StaticReporter::new(config)),
        }
    }

    /// Default config overlaid with the environment.
    pub fn from_env() -> Self {
        let mut config = ReportConfig::default();
        config.overlay_env();
        Self::new(config)
    }
}

impl LlvmFunctionPass for ReportPass {
    fn run_pass(
        &self,
        function: &mut FunctionValue,
        _manager: &FunctionAnalysisManager,
    ) -> PreservedAnalyses {
        let scope = FunctionScope::around(*function);
        if let Err(e) = self.reporter.lock().run_on_function(&scope, *function) {
            error!("{REPORT_PASS}: {e}");
        }
        PreservedAnalyses::All
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FPTRACE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // The host process may already own a global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[llvm_plugin::plugin(name = "fptrace", version = "0.1")]
fn plugin_registrar(builder: &mut PassBuilder) {
    init_logging();
    info!("fptrace plugin loaded");

    builder.add_module_pipeline_parsing_callback(|name, manager| {
        if name == INJECT_PASS {
            manager.add_pass(InjectPass::from_env());
            PipelineParsing::Parsed
        } else {
            PipelineParsing::NotParsed
        }
    });

    builder.add_function_pipeline_parsing_callback(|name, manager| {
        if name == REPORT_PASS {
            manager.add_pass(ReportPass::from_env());
            PipelineParsing::Parsed
        } else {
            PipelineParsing::NotParsed
        }
    });
}

#[cfg(test)]
mod tests {
    use fptrace_ir::{IrEdit, IrView};
    use fptrace_pass::{IndirectSite, collect_sites};
    use llvm_plugin::inkwell::AddressSpace;
    use llvm_plugin::inkwell::context::Context;
    use llvm_plugin::inkwell::values::InstructionOpcode;

    use super::*;

    /// `void run(ptr %cb) { call void %cb(); call void @helper(); ret void }`
    fn build_module(context: &Context) -> Module<'_> {
        let module = context.create_module("m");
        let builder = context.create_builder();
        let ptr = context.ptr_type(AddressSpace::default());
        let void_fn = context.void_type().fn_type(&[], false);
        let helper = module.add_function("helper", void_fn, None);
        let run = module.add_function("run", context.void_type().fn_type(&[ptr.into()], false), None);
        let entry = context.append_basic_block(run, "entry");
        builder.position_at_end(entry);
        let cb = run.get_nth_param(0).unwrap().into_pointer_value();
        builder.build_indirect_call(void_fn, cb, &[], "").unwrap();
        builder.build_call(helper, &[], "").unwrap();
        builder.build_return(None).unwrap();
        module
    }

    #[test]
    fn test_classifies_direct_and_indirect_calls() {
        let context = Context::create();
        let module = build_module(&context);
        let host = ModuleHost::new(&module);
        let sites: Vec<IndirectSite<ModuleHost<'_, '_>>> = collect_sites(&host);
        assert_eq!(sites.len(), 1);
        assert_eq!(host.function_name(sites[0].func), "run");
    }

    #[test]
    fn test_inject_emits_verified_ir() {
        let context = Context::create();
        let module = build_module(&context);
        let mut host = ModuleHost::new(&module);
        let outcome = TraceInjector::default().run(&mut host).unwrap();
        assert_eq!(outcome.injected, 1);
        assert!(module.verify().is_ok());

        let printf = host.find_function("printf").unwrap();
        let run = host.find_function("run").unwrap();
        let first = host.entry_insertion_point(run).unwrap();
        assert_eq!(first.get_opcode(), InstructionOpcode::Call);
        let callee = host.called_operand(first).unwrap();
        assert!(host.is_function_ref(&callee));
        assert_eq!(
            callee.into_pointer_value(),
            printf.as_global_value().as_pointer_value()
        );
        assert!(host.find_global("PrintfFormatStr").is_some());
    }

    #[test]
    fn test_function_scope_sees_siblings() {
        let context = Context::create();
        let module = build_module(&context);
        let run = module.get_function("run").unwrap();
        let scope = FunctionScope::around(run);
        assert_eq!(scope.functions().len(), 2);
    }
}
