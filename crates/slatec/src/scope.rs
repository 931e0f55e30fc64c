//! Variable and function name resolution across nested function contexts.
//!
//! Every function being compiled owns a [`FunctionContext`]: its per-type
//! slot counters, its parameters and a stack of block scopes. Contexts are
//! stacked innermost last, so a name missing from the current function is
//! looked up in the enclosing ones and yields a cross-context [`Slot`].
//!
//! Slots are never reclaimed. Leaving a block only drops its name mappings,
//! so every variable of a function keeps a distinct slot for its type.

use std::collections::HashMap;
use std::mem;

use slate_bytecode::{Bytecode, SlotCounts, VarType};

/// Storage location of a variable: the owning function and the index in
/// that function's local array for `ty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub context: u16,
    pub index: u16,
    pub ty: VarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only the current function.
    Local,
    /// The current function, then every enclosing one, innermost first.
    Enclosing,
}

#[derive(Debug, Default)]
struct BlockScope {
    vars: HashMap<String, Slot>,
    functions: HashMap<String, u16>,
}

/// Compilation state of one function.
#[derive(Debug)]
pub struct FunctionContext {
    pub id: u16,
    pub return_type: VarType,
    pub bytecode: Bytecode,
    /// Scope id of the function's body block, once entered.
    pub body_scope: Option<u16>,
    slots: SlotCounts,
    params: HashMap<String, Slot>,
    blocks: Vec<BlockScope>,
}

impl FunctionContext {
    pub fn new(id: u16, return_type: VarType) -> Self {
        FunctionContext {
            id,
            return_type,
            bytecode: Bytecode::new(),
            body_scope: None,
            slots: SlotCounts::default(),
            params: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    pub fn slots(&self) -> SlotCounts {
        self.slots
    }

    fn allocate(&mut self, ty: VarType) -> Option<Slot> {
        let index = self.slots.allocate(ty)?;
        Some(Slot {
            context: self.id,
            index,
            ty,
        })
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        self.blocks
            .iter()
            .rev()
            .find_map(|block| block.vars.get(name))
            .or_else(|| self.params.get(name))
            .copied()
    }

    fn lookup_function(&self, name: &str) -> Option<u16> {
        self.blocks
            .iter()
            .rev()
            .find_map(|block| block.functions.get(name))
            .copied()
    }
}

/// The stack of functions currently being compiled, innermost last.
#[derive(Debug)]
pub struct ScopeStack {
    current: FunctionContext,
    enclosing: Vec<FunctionContext>,
    next_scope: u16,
}

impl ScopeStack {
    pub fn new(top: FunctionContext) -> Self {
        ScopeStack {
            current: top,
            enclosing: Vec::new(),
            next_scope: 0,
        }
    }

    pub fn current(&self) -> &FunctionContext {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut FunctionContext {
        &mut self.current
    }

    /// Number of open functions, the top-level one included.
    pub fn depth(&self) -> usize {
        self.enclosing.len() + 1
    }

    pub fn push_context(&mut self, ctx: FunctionContext) {
        let outer = mem::replace(&mut self.current, ctx);
        self.enclosing.push(outer);
    }

    /// Close the current function and return its state. `None` when only
    /// the top-level function is open.
    pub fn pop_context(&mut self) -> Option<FunctionContext> {
        let outer = self.enclosing.pop()?;
        Some(mem::replace(&mut self.current, outer))
    }

    /// Consume the stack, returning the top-level function's state.
    pub fn into_top(mut self) -> FunctionContext {
        if self.enclosing.is_empty() {
            self.current
        } else {
            self.enclosing.swap_remove(0)
        }
    }

    pub fn enter_block(&mut self) -> u16 {
        let id = self.next_scope;
        self.next_scope = self.next_scope.wrapping_add(1);
        if self.current.body_scope.is_none() {
            self.current.body_scope = Some(id);
        }
        self.current.blocks.push(BlockScope::default());
        id
    }

    pub fn exit_block(&mut self) {
        self.current.blocks.pop();
    }

    /// Give a parameter the next slot of its type. Parameters must be
    /// declared before anything else in the function.
    pub fn declare_param(&mut self, name: &str, ty: VarType) -> Option<Slot> {
        let slot = self.current.allocate(ty)?;
        self.current.params.insert(name.to_string(), slot);
        Some(slot)
    }

    /// Allocate a slot for `name` in the innermost block. The name refers to
    /// the new slot for the rest of the block.
    pub fn declare(&mut self, name: &str, ty: VarType) -> Option<Slot> {
        if self.current.blocks.is_empty() {
            return None;
        }
        let slot = self.current.allocate(ty)?;
        if let Some(block) = self.current.blocks.last_mut() {
            block.vars.insert(name.to_string(), slot);
        }
        Some(slot)
    }

    /// A slot no name refers to.
    pub fn allocate_hidden(&mut self, ty: VarType) -> Option<Slot> {
        self.current.allocate(ty)
    }

    /// Bind a function name in the innermost block. Returns false if the
    /// block already has a function of that name.
    pub fn declare_function(&mut self, name: &str, id: u16) -> bool {
        let Some(block) = self.current.blocks.last_mut() else {
            return false;
        };
        if block.functions.contains_key(name) {
            return false;
        }
        block.functions.insert(name.to_string(), id);
        true
    }

    pub fn resolve(&self, name: &str, lookup: Lookup) -> Option<Slot> {
        let local = self.current.lookup(name);
        match lookup {
            Lookup::Local => local,
            Lookup::Enclosing => local.or_else(|| {
                self.enclosing
                    .iter()
                    .rev()
                    .find_map(|ctx| ctx.lookup(name))
            }),
        }
    }

    pub fn resolve_function(&self, name: &str) -> Option<u16> {
        self.current.lookup_function(name).or_else(|| {
            self.enclosing
                .iter()
                .rev()
                .find_map(|ctx| ctx.lookup_function(name))
        })
    }
}
