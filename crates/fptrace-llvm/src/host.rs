//! [`IrView`] and [`IrEdit`] over inkwell.
//!
//! Instruction and value identities are the addresses of the underlying
//! `llvm::Value`s, so they are unique within one compiler invocation.

use fptrace_ir::{IrEdit, IrError, IrView, Linkage, LogSignature, Result};
use llvm_plugin::inkwell::AddressSpace;
use llvm_plugin::inkwell::attributes::{Attribute, AttributeLoc};
use llvm_plugin::inkwell::builder::Builder;
use llvm_plugin::inkwell::context::ContextRef;
use llvm_plugin::inkwell::module::{self, Module};
use llvm_plugin::inkwell::types::{AnyTypeEnum, FunctionType};
use llvm_plugin::inkwell::values::{
    AnyValue, AsValueRef, BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue,
    GlobalValue, InstructionOpcode, InstructionValue, PointerValue,
};

/// Instructions of `func` in block order.
fn instructions_of<'ctx>(func: FunctionValue<'ctx>) -> Vec<InstructionValue<'ctx>> {
    let mut out = Vec::new();
    for block in func.get_basic_blocks() {
        let mut next = block.get_first_instruction();
        while let Some(instr) = next {
            out.push(instr);
            next = instr.get_next_instruction();
        }
    }
    out
}

/// Callee operand of a call or invoke; LLVM keeps it last.
fn callee_of<'ctx>(instr: InstructionValue<'ctx>) -> Option<BasicValueEnum<'ctx>> {
    match instr.get_opcode() {
        InstructionOpcode::Call | InstructionOpcode::Invoke => {
            let last = instr.get_num_operands().checked_sub(1)?;
            instr.get_operand(last)?.left()
        }
        _ => None,
    }
}

fn function_address(func: FunctionValue<'_>) -> PointerValue<'_> {
    func.as_global_value().as_pointer_value()
}

fn is_function_address(functions: &[FunctionValue<'_>], value: &BasicValueEnum<'_>) -> bool {
    let BasicValueEnum::PointerValue(ptr) = value else {
        return false;
    };
    functions.iter().any(|f| function_address(*f) == *ptr)
}

fn address_of(value: &impl AsValueRef) -> String {
    format!("{:?}", value.as_value_ref())
}

fn name_of(func: FunctionValue<'_>) -> String {
    func.get_name().to_string_lossy().into_owned()
}

/// Read-only view of the functions around one function.
///
/// A function pass only sees its own function; the rest of the module is
/// reached through the sibling links, which is enough to tell direct calls
/// from indirect ones.
pub struct FunctionScope<'ctx> {
    functions: Vec<FunctionValue<'ctx>>,
}

impl<'ctx> FunctionScope<'ctx> {
    pub fn around(func: FunctionValue<'ctx>) -> Self {
        let mut first = func;
        while let Some(prev) = first.get_previous_function() {
            first = prev;
        }
        let mut functions = vec![first];
        while let Some(next) = functions.last().and_then(|f| f.get_next_function()) {
            functions.push(next);
        }
        Self { functions }
    }

    fn function_list(&self) -> Vec<FunctionValue<'ctx>> {
        self.functions.clone()
    }
}

/// Shared [`IrView`] body; `$list` names the host's function list method.
macro_rules! llvm_ir_view {
    ($list:ident) => {
        type Function = FunctionValue<'ctx>;
        type Instr = InstructionValue<'ctx>;
        type Value = BasicValueEnum<'ctx>;

        fn functions(&self) -> Vec<FunctionValue<'ctx>> {
            self.$list()
        }

        fn function_name(&self, func: FunctionValue<'ctx>) -> String {
            name_of(func)
        }

        fn is_declaration(&self, func: FunctionValue<'ctx>) -> bool {
            func.count_basic_blocks() == 0
        }

        fn instructions(&self, func: FunctionValue<'ctx>) -> Vec<InstructionValue<'ctx>> {
            instructions_of(func)
        }

        fn called_operand(&self, instr: InstructionValue<'ctx>) -> Option<BasicValueEnum<'ctx>> {
            callee_of(instr)
        }

        fn is_function_ref(&self, value: &BasicValueEnum<'ctx>) -> bool {
            is_function_address(&self.$list(), value)
        }

        fn is_pointer(&self, value: &BasicValueEnum<'ctx>) -> bool {
            value.is_pointer_value()
        }

        fn render_instr(&self, instr: InstructionValue<'ctx>) -> String {
            instr.print_to_string().to_string()
        }

        fn render_value(&self, value: &BasicValueEnum<'ctx>) -> String {
            value.print_to_string().to_string()
        }

        fn instr_identity(&self, instr: InstructionValue<'ctx>) -> String {
            address_of(&instr)
        }

        fn value_identity(&self, _func: FunctionValue<'ctx>, value: &BasicValueEnum<'ctx>) -> String {
            address_of(value)
        }
    };
}

impl<'ctx> IrView for FunctionScope<'ctx> {
    llvm_ir_view!(function_list);
}

/// Editable view of a whole module.
pub struct ModuleHost<'a, 'ctx> {
    module: &'a Module<'ctx>,
    context: ContextRef<'ctx>,
    builder: Builder<'ctx>,
}

impl<'a, 'ctx> ModuleHost<'a, 'ctx> {
    pub fn new(module: &'a Module<'ctx>) -> Self {
        let context = module.get_context();
        let builder = context.create_builder();
        Self {
            module,
            context,
            builder,
        }
    }

    fn log_type(&self, sig: LogSignature) -> FunctionType<'ctx> {
        let ptr = self.context.ptr_type(AddressSpace::default());
        let i32_type = self.context.i32_type();
        match sig {
            LogSignature::Format => i32_type.fn_type(&[ptr.into()], true),
            LogSignature::FdFormat => i32_type.fn_type(&[i32_type.into(), ptr.into()], true),
        }
    }

    fn function_list(&self) -> Vec<FunctionValue<'ctx>> {
        self.module.get_functions().collect()
    }

    fn enum_attribute(&self, name: &str) -> Attribute {
        let kind = Attribute::get_named_enum_kind_id(name);
        self.context.create_enum_attribute(kind, 0)
    }
}

impl<'ctx> IrView for ModuleHost<'_, 'ctx> {
    llvm_ir_view!(function_list);
}

const fn llvm_linkage(linkage: Linkage) -> module::Linkage {
    match linkage {
        Linkage::External => module::Linkage::External,
        Linkage::Internal => module::Linkage::Internal,
        Linkage::Private => module::Linkage::Private,
    }
}

fn builder_error(e: impl std::fmt::Display) -> IrError {
    IrError::Builder(e.to_string())
}

impl<'ctx> IrEdit for ModuleHost<'_, 'ctx> {
    type Global = GlobalValue<'ctx>;

    fn find_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.module.get_function(name)
    }

    fn find_global(&self, name: &str) -> Option<GlobalValue<'ctx>> {
        self.module.get_global(name)
    }

    fn has_log_signature(&self, func: FunctionValue<'ctx>, sig: LogSignature) -> bool {
        func.get_type() == self.log_type(sig)
    }

    fn declare_log_function(&mut self, name: &str, sig: LogSignature) -> FunctionValue<'ctx> {
        self.module
            .add_function(name, self.log_type(sig), Some(module::Linkage::External))
    }

    fn set_no_unwind(&mut self, func: FunctionValue<'ctx>) {
        func.add_attribute(AttributeLoc::Function, self.enum_attribute("nounwind"));
    }

    fn set_param_readonly_nocapture(&mut self, func: FunctionValue<'ctx>, index: u32) {
        for name in ["readonly", "nocapture"] {
            func.add_attribute(AttributeLoc::Param(index), self.enum_attribute(name));
        }
    }

    fn is_byte_array(&self, global: GlobalValue<'ctx>, len: usize) -> bool {
        match global.get_value_type() {
            AnyTypeEnum::ArrayType(array) => {
                usize::try_from(array.len()).is_ok_and(|n| n == len)
                    && array.get_element_type() == self.context.i8_type().into()
            }
            _ => false,
        }
    }

    fn has_initializer(&self, global: GlobalValue<'ctx>) -> bool {
        global.get_initializer().is_some()
    }

    fn set_string_initializer(&mut self, global: GlobalValue<'ctx>, text: &str) {
        global.set_initializer(&self.context.const_string(text.as_bytes(), true));
    }

    fn add_string_global(&mut self, name: &str, text: &str, linkage: Linkage) -> GlobalValue<'ctx> {
        let init = self.context.const_string(text.as_bytes(), true);
        let global = self.module.add_global(init.get_type(), None, name);
        global.set_initializer(&init);
        global.set_constant(true);
        global.set_linkage(llvm_linkage(linkage));
        global
    }

    fn const_i32(&self, value: i32) -> BasicValueEnum<'ctx> {
        // Sign-extended bit pattern; `const_int` takes the raw bits.
        let bits = u64::from_ne_bytes(i64::from(value).to_ne_bytes());
        self.context.i32_type().const_int(bits, true).into()
    }

    fn global_ref(&self, global: GlobalValue<'ctx>) -> BasicValueEnum<'ctx> {
        global.as_pointer_value().into()
    }

    fn entry_insertion_point(&self, func: FunctionValue<'ctx>) -> Option<InstructionValue<'ctx>> {
        let mut next = func.get_first_basic_block()?.get_first_instruction();
        while let Some(instr) = next {
            if !matches!(
                instr.get_opcode(),
                InstructionOpcode::Phi | InstructionOpcode::LandingPad
            ) {
                return Some(instr);
            }
            next = instr.get_next_instruction();
        }
        None
    }

    fn is_available_at_entry(&self, _func: FunctionValue<'ctx>, value: &BasicValueEnum<'ctx>) -> bool {
        value.as_instruction_value().is_none()
    }

    fn insert_pointer_cast(
        &mut self,
        before: InstructionValue<'ctx>,
        value: BasicValueEnum<'ctx>,
        name: &str,
    ) -> Result<BasicValueEnum<'ctx>> {
        let BasicValueEnum::PointerValue(ptr) = value else {
            return Err(IrError::Builder(format!(
                "cannot cast non-pointer {} to a byte pointer",
                value.print_to_string()
            )));
        };
        let to = self.context.ptr_type(AddressSpace::default());
        if ptr.get_type() == to {
            return Ok(value);
        }
        self.builder.position_before(&before);
        self.builder
            .build_pointer_cast(ptr, to, name)
            .map(Into::into)
            .map_err(builder_error)
    }

    fn insert_call(
        &mut self,
        before: InstructionValue<'ctx>,
        callee: FunctionValue<'ctx>,
        args: &[BasicValueEnum<'ctx>],
    ) -> Result<InstructionValue<'ctx>> {
        let args: Vec<BasicMetadataValueEnum<'ctx>> = args.iter().map(|v| (*v).into()).collect();
        self.builder.position_before(&before);
        let call = self
            .builder
            .build_call(callee, &args, "")
            .map_err(builder_error)?;
        call.try_as_basic_value()
            .left()
            .and_then(|v| v.as_instruction_value())
            .ok_or_else(|| IrError::Builder("call produced no instruction".to_string()))
    }
}
