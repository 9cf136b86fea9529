//! Fixture modules shared by the integration tests.

#![allow(dead_code)]

use fptrace_ir::{Block, FnType, Function, Instr, InstrId, InstrKind, Module, Operand, Param, Type};

/// `void ()`, the signature of every callback in the fixtures.
pub fn callback_sig() -> FnType {
    FnType::new(Type::Void, vec![], false)
}

pub fn callback_ptr() -> Type {
    callback_sig().ptr()
}

/// Builds functions with sequential instruction ids.
pub struct Fixture {
    next_id: u32,
}

impl Fixture {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    fn id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn indirect_call(&mut self, target: &str) -> Instr {
        Instr::new(
            self.id(),
            None,
            InstrKind::Call {
                callee: Operand::local(target, callback_ptr()),
                args: vec![],
                fn_ty: callback_sig(),
            },
        )
    }

    pub fn direct_call(&mut self, callee: &str) -> Instr {
        Instr::new(
            self.id(),
            None,
            InstrKind::Call {
                callee: Operand::function(callee, callback_sig()),
                args: vec![],
                fn_ty: callback_sig(),
            },
        )
    }

    pub fn add(&mut self, result: &str) -> Instr {
        Instr::new(
            self.id(),
            Some(result.to_string()),
            InstrKind::Add {
                lhs: Operand::const_int(Type::i32(), 1),
                rhs: Operand::const_int(Type::i32(), 2),
            },
        )
    }

    pub fn ret_void(&mut self) -> Instr {
        Instr::new(self.id(), None, InstrKind::Ret { value: None })
    }

    pub fn ret_zero(&mut self) -> Instr {
        Instr::new(
            self.id(),
            None,
            InstrKind::Ret {
                value: Some(Operand::const_int(Type::i32(), 0)),
            },
        )
    }

    /// `void name(void ()* %cb)` with `sites` indirect calls through `%cb`.
    pub fn callback_user(&mut self, name: &str, sites: usize) -> Function {
        let mut f = Function::new(name, Type::Void, vec![Param::new("cb", callback_ptr())]);
        let mut entry = Block::new("entry");
        for _ in 0..sites {
            entry.push(self.indirect_call("cb"));
        }
        entry.push(self.ret_void());
        f.push_block(entry);
        f
    }

    /// `i32 main(void ()* %callback)` calling `%callback` once.
    pub fn main_with_callback(&mut self) -> Function {
        let mut f = Function::new("main", Type::i32(), vec![Param::new("callback", callback_ptr())]);
        let mut entry = Block::new("entry");
        entry.push(self.add("x"));
        entry.push(self.indirect_call("callback"));
        entry.push(self.ret_zero());
        f.push_block(entry);
        f
    }

    /// `void name(void ()* %cb)` whose entry block is empty; the call through
    /// `%cb` sits in a second block.
    pub fn empty_entry(&mut self, name: &str) -> Function {
        let mut f = Function::new(name, Type::Void, vec![Param::new("cb", callback_ptr())]);
        f.push_block(Block::new("entry"));
        let mut body = Block::new("body");
        body.push(self.indirect_call("cb"));
        body.push(self.ret_void());
        f.push_block(body);
        f
    }

    /// `void plain()` without calls.
    pub fn plain(&mut self, name: &str) -> Function {
        let mut f = Function::new(name, Type::Void, vec![]);
        let mut entry = Block::new("entry");
        entry.push(self.add("x"));
        entry.push(self.ret_void());
        f.push_block(entry);
        f
    }

    /// Function calling `helper` directly, twice.
    pub fn direct_only(&mut self, name: &str) -> Function {
        let mut f = Function::new(name, Type::Void, vec![]);
        let mut entry = Block::new("entry");
        entry.push(self.direct_call("helper"));
        entry.push(self.direct_call("helper"));
        entry.push(self.ret_void());
        f.push_block(entry);
        f
    }
}

/// Module holding `functions` after a `helper` declaration.
pub fn module_with(functions: Vec<Function>) -> Module {
    let mut module = Module::new("fixture");
    module.add_function(Function::declaration("helper", callback_sig()));
    for f in functions {
        module.add_function(f);
    }
    module
}
