//! In-memory module: the reference [`IrView`]/[`IrEdit`] host.

use crate::attrs::{FnAttrs, ParamAttrs};
use crate::error::{IrError, Result};
use crate::function::Function;
use crate::host::{IrEdit, IrView, Linkage, LogSignature};
use crate::instr::{Instr, InstrId, InstrKind};
use crate::operand::Operand;
use crate::types::{FnType, Type};

/// Index of a function within its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

/// Index of a global within its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub usize);

/// An instruction handle: the enclosing function plus the instruction id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrRef {
    pub func: FuncId,
    pub id: InstrId,
}

/// A global variable or constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: String,
    /// Value type; the symbol itself is a pointer to it.
    pub ty: Type,
    /// Raw initializer bytes, including any trailing NUL.
    pub initializer: Option<Vec<u8>>,
    pub constant: bool,
    pub linkage: Linkage,
}

impl GlobalVar {
    /// External global declaration without initializer.
    pub fn external(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            initializer: None,
            constant: false,
            linkage: Linkage::External,
        }
    }

    /// Constant NUL-terminated C string.
    pub fn c_string(name: impl Into<String>, text: &str, linkage: Linkage) -> Self {
        let bytes = c_bytes(text);
        Self {
            name: name.into(),
            ty: Type::array(Type::i8(), bytes.len() as u64),
            initializer: Some(bytes),
            constant: true,
            linkage,
        }
    }

    /// Address of this global.
    pub fn as_operand(&self) -> Operand {
        Operand::global(self.name.clone(), self.ty.clone())
    }
}

fn c_bytes(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// A compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalVar>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVar> {
        self.globals.get(id.0)
    }

    /// Add a function and return its id.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.push(function);
        FuncId(self.functions.len() - 1)
    }

    /// Add a global and return its id.
    pub fn add_global(&mut self, global: GlobalVar) -> GlobalId {
        self.globals.push(global);
        GlobalId(self.globals.len() - 1)
    }

    fn has_symbol(&self, name: &str) -> bool {
        self.find_function(name).is_some() || self.find_global(name).is_some()
    }

    /// Pick a symbol name based on `base` that is not used yet.
    pub fn unique_symbol_name(&self, base: &str) -> String {
        if !self.has_symbol(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !self.has_symbol(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Allocate an instruction id not used anywhere in the module.
    pub fn alloc_instr_id(&self) -> InstrId {
        let next = self
            .functions
            .iter()
            .flat_map(Function::instructions)
            .map(|i| i.id.0 + 1)
            .max()
            .unwrap_or(0);
        InstrId(next)
    }

    /// Look up an instruction by handle.
    pub fn instr(&self, at: InstrRef) -> Option<&Instr> {
        let function = self.function(at.func)?;
        let (b, pos) = function.find_instr(at.id)?;
        function.blocks.get(b)?.instrs.get(pos)
    }

    /// Insert `kind` before `before` and return the new instruction's handle.
    fn insert_before(
        &mut self,
        before: InstrRef,
        result: Option<String>,
        kind: InstrKind,
    ) -> Result<InstrRef> {
        let id = self.alloc_instr_id();
        let unknown = || IrError::UnknownInstr(before.id.to_string());
        let function = self.functions.get_mut(before.func.0).ok_or_else(unknown)?;
        let (b, pos) = function.find_instr(before.id).ok_or_else(unknown)?;
        function.blocks[b].insert(pos, Instr::new(id, result, kind));
        Ok(InstrRef {
            func: before.func,
            id,
        })
    }
}

impl IrView for Module {
    type Function = FuncId;
    type Instr = InstrRef;
    type Value = Operand;

    fn functions(&self) -> Vec<FuncId> {
        (0..self.functions.len()).map(FuncId).collect()
    }

    fn function_name(&self, func: FuncId) -> String {
        self.function(func).map(|f| f.name.clone()).unwrap_or_default()
    }

    fn is_declaration(&self, func: FuncId) -> bool {
        self.function(func).is_none_or(Function::is_declaration)
    }

    fn instructions(&self, func: FuncId) -> Vec<InstrRef> {
        self.function(func)
            .map(|f| f.instructions().map(|i| InstrRef { func, id: i.id }).collect())
            .unwrap_or_default()
    }

    fn called_operand(&self, instr: InstrRef) -> Option<Operand> {
        self.instr(instr)?.called_operand().cloned()
    }

    fn is_function_ref(&self, value: &Operand) -> bool {
        value.as_function().is_some()
    }

    fn is_pointer(&self, value: &Operand) -> bool {
        value.is_pointer()
    }

    fn render_instr(&self, instr: InstrRef) -> String {
        self.instr(instr).map(ToString::to_string).unwrap_or_default()
    }

    fn render_value(&self, value: &Operand) -> String {
        value.to_string()
    }

    fn instr_identity(&self, instr: InstrRef) -> String {
        instr.id.to_string()
    }

    fn value_identity(&self, func: FuncId, value: &Operand) -> String {
        match value.as_local() {
            Some(name) => format!("@{}:%{name}", self.function_name(func)),
            None => value.to_string(),
        }
    }
}

impl IrEdit for Module {
    type Global = GlobalId;

    fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions.iter().position(|f| f.name == name).map(FuncId)
    }

    fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals.iter().position(|g| g.name == name).map(GlobalId)
    }

    fn has_log_signature(&self, func: FuncId, sig: LogSignature) -> bool {
        self.function(func)
            .is_some_and(|f| f.ty == FnType::log_function(sig))
    }

    fn declare_log_function(&mut self, name: &str, sig: LogSignature) -> FuncId {
        self.add_function(Function::declaration(name, FnType::log_function(sig)))
    }

    fn set_no_unwind(&mut self, func: FuncId) {
        if let Some(f) = self.functions.get_mut(func.0) {
            f.attrs |= FnAttrs::NOUNWIND;
        }
    }

    fn set_param_readonly_nocapture(&mut self, func: FuncId, index: u32) {
        if let Some(f) = self.functions.get_mut(func.0) {
            f.add_param_attr(index as usize, ParamAttrs::READONLY | ParamAttrs::NOCAPTURE);
        }
    }

    fn is_byte_array(&self, global: GlobalId, len: usize) -> bool {
        self.global(global)
            .is_some_and(|g| g.ty == Type::array(Type::i8(), len as u64))
    }

    fn has_initializer(&self, global: GlobalId) -> bool {
        self.global(global).is_some_and(|g| g.initializer.is_some())
    }

    fn set_string_initializer(&mut self, global: GlobalId, text: &str) {
        if let Some(g) = self.globals.get_mut(global.0) {
            g.initializer = Some(c_bytes(text));
        }
    }

    fn add_string_global(&mut self, name: &str, text: &str, linkage: Linkage) -> GlobalId {
        let name = self.unique_symbol_name(name);
        self.add_global(GlobalVar::c_string(name, text, linkage))
    }

    fn const_i32(&self, value: i32) -> Operand {
        Operand::const_int(Type::i32(), i64::from(value))
    }

    fn global_ref(&self, global: GlobalId) -> Operand {
        self.global(global)
            .map_or(Operand::Null(Type::i8_ptr()), GlobalVar::as_operand)
    }

    fn entry_insertion_point(&self, func: FuncId) -> Option<InstrRef> {
        let function = self.function(func)?;
        let pos = function.entry_insertion_point()?;
        let instr = function.blocks.first()?.instrs.get(pos)?;
        Some(InstrRef { func, id: instr.id })
    }

    fn is_available_at_entry(&self, func: FuncId, value: &Operand) -> bool {
        self.function(func)
            .is_some_and(|f| f.is_available_at_entry(value))
    }

    fn insert_pointer_cast(&mut self, before: InstrRef, value: Operand, name: &str) -> Result<Operand> {
        let to = Type::i8_ptr();
        if value.ty() == to {
            return Ok(value);
        }
        let name = self
            .function(before.func)
            .map(|f| f.unique_local_name(name))
            .ok_or_else(|| IrError::UnknownInstr(before.id.to_string()))?;
        self.insert_before(
            before,
            Some(name.clone()),
            InstrKind::Bitcast {
                value,
                to: to.clone(),
            },
        )?;
        Ok(Operand::local(name, to))
    }

    fn insert_call(&mut self, before: InstrRef, callee: FuncId, args: &[Operand]) -> Result<InstrRef> {
        let (callee, fn_ty) = self
            .function(callee)
            .map(|f| (Operand::function(f.name.clone(), f.ty.clone()), f.ty.clone()))
            .ok_or_else(|| IrError::Builder(format!("unknown callee {}", callee.0)))?;
        self.insert_before(
            before,
            None,
            InstrKind::Call {
                callee,
                args: args.to_vec(),
                fn_ty,
            },
        )
    }
}
