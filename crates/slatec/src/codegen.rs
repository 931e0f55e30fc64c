use slate_bytecode::{
    Bytecode, BytecodeError, Code, Function, NativeAddress, Op, Signature, Site, VarType,
};
use tracing::debug;

use crate::ast::*;
use crate::branch::{patch_sites, PendingBranch};
use crate::error::CompileError;
use crate::expr::{arithmetic_op, Compiled};
use crate::options::Options;
use crate::scope::{FunctionContext, Lookup, ScopeStack, Slot};
use crate::typeck::TypeCache;

/// Translate a program into a code container.
///
/// The first error stops all further emission; it is returned instead of
/// the container.
pub fn emit(program: &Program, options: &Options) -> Result<Code, CompileError> {
    let top = &program.top;
    let mut code = Code::new();
    let id = code.add_function(Function::new(top.name.clone(), signature_of(top)))?;
    code.entry = id;

    let mut emitter = Emitter {
        code,
        scopes: ScopeStack::new(FunctionContext::new(id, top.return_type)),
        options,
        types: TypeCache::new(),
        error: None,
    };
    debug!(function = %top.name, id, "compiling function");
    emitter.emit_body(top);
    emitter.finish()
}

pub(crate) fn signature_of(def: &FnDef) -> Signature {
    Signature::new(
        def.return_type,
        def.params.iter().map(|p| (p.ty, p.name.clone())),
    )
}

fn storage_error(name: &str, ty: VarType, position: Position) -> CompileError {
    if ty.is_storable() {
        CompileError::invalid_operation(format!("too many {ty} variables, cannot declare `{name}`"), position)
    } else {
        CompileError::invalid_operation(format!("`{name}` cannot be declared as {ty}"), position)
    }
}

/// Move a finished function's bytecode and slot sizes into the container.
fn store_function(code: &mut Code, ctx: FunctionContext) -> Result<(), CompileError> {
    ctx.bytecode.ensure_patched()?;
    if ctx.bytecode.len() > slate_bytecode::bytecode::MAX_TARGET {
        return Err(BytecodeError::CodeTooLarge(ctx.bytecode.len()).into());
    }
    let func = code
        .function_by_id_mut(ctx.id)
        .ok_or_else(|| CompileError::Invariant(format!("function id {} is not registered", ctx.id)))?;
    func.slots = ctx.slots();
    func.scope_id = ctx.body_scope.unwrap_or(0);
    func.bytecode = ctx.bytecode;
    debug!(function = %func.name, bytes = func.bytecode.len(), slots = func.slots.total(), "function compiled");
    Ok(())
}

pub(crate) struct Emitter<'o> {
    pub(crate) code: Code,
    pub(crate) scopes: ScopeStack,
    options: &'o Options,
    pub(crate) types: TypeCache,
    /// First error reported; once set, every later visit is a no-op.
    error: Option<CompileError>,
}

impl Emitter<'_> {
    fn finish(self) -> Result<Code, CompileError> {
        let Emitter {
            mut code,
            scopes,
            error,
            ..
        } = self;
        if let Some(err) = error {
            return Err(err);
        }
        store_function(&mut code, scopes.into_top())?;
        Ok(code)
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }

    fn latch(&mut self, result: Result<(), CompileError>) {
        if let Err(err) = result {
            if self.error.is_none() {
                debug!(error = %err, position = ?err.position(), "translation failed");
                self.error = Some(err);
            }
        }
    }

    // === Buffer helpers ===

    pub(crate) fn bc(&mut self) -> &mut Bytecode {
        &mut self.scopes.current_mut().bytecode
    }

    pub(crate) fn offset(&self) -> usize {
        self.scopes.current().bytecode.offset()
    }

    /// `JA` with a target to be patched.
    pub(crate) fn emit_jump(&mut self) -> Site {
        let bc = self.bc();
        bc.emit(Op::Ja);
        bc.reserve_u16()
    }

    /// `JA` to an address already emitted.
    pub(crate) fn emit_jump_to(&mut self, target: usize) -> Result<(), CompileError> {
        let target = u16::try_from(target).map_err(|_| BytecodeError::CodeTooLarge(target))?;
        self.bc().emit_with_u16(Op::Ja, target);
        Ok(())
    }

    /// Two-target conditional branch with both targets open.
    pub(crate) fn emit_branch(&mut self, op: Op) -> PendingBranch {
        let bc = self.bc();
        bc.emit(op);
        let on_true = bc.reserve_u16();
        let on_false = bc.reserve_u16();
        PendingBranch::new(on_true, on_false)
    }

    pub(crate) fn patch(&mut self, sites: &[Site], target: usize) -> Result<(), CompileError> {
        patch_sites(self.bc(), sites, target)?;
        Ok(())
    }

    // === Variables ===

    pub(crate) fn resolve_var(&self, name: &str, position: Position) -> Result<Slot, CompileError> {
        self.scopes
            .resolve(name, Lookup::Enclosing)
            .ok_or_else(|| CompileError::UndefinedVariable {
                name: name.to_string(),
                position,
            })
    }

    pub(crate) fn emit_load(&mut self, slot: Slot) -> Result<(), CompileError> {
        let cross_context = slot.context != self.scopes.current().id;
        let op = Op::load_var(slot.ty, cross_context)
            .ok_or_else(|| CompileError::Invariant(format!("no load instruction for {}", slot.ty)))?;
        self.emit_var_access(op, slot, cross_context);
        Ok(())
    }

    pub(crate) fn emit_store(&mut self, slot: Slot) -> Result<(), CompileError> {
        let cross_context = slot.context != self.scopes.current().id;
        let op = Op::store_var(slot.ty, cross_context)
            .ok_or_else(|| CompileError::Invariant(format!("no store instruction for {}", slot.ty)))?;
        self.emit_var_access(op, slot, cross_context);
        Ok(())
    }

    fn emit_var_access(&mut self, op: Op, slot: Slot, cross_context: bool) {
        let bc = self.bc();
        bc.emit(op);
        if cross_context {
            bc.emit_u16(slot.context);
        }
        bc.emit_u16(slot.index);
    }

    // === Functions ===

    fn compile_function(&mut self, def: &FnDef, id: u16) {
        if self.failed() {
            return;
        }
        debug!(function = %def.name, id, depth = self.scopes.depth(), "compiling function");
        self.scopes
            .push_context(FunctionContext::new(id, def.return_type));
        self.emit_body(def);
        let result = match self.scopes.pop_context() {
            Some(ctx) => store_function(&mut self.code, ctx),
            None => Err(CompileError::Invariant("function context stack underflow".into())),
        };
        self.latch(result);
    }

    fn emit_body(&mut self, def: &FnDef) {
        match &def.body {
            FnBody::Block(block) => {
                let result = self.emit_prologue(def);
                self.latch(result);
                self.emit_block(block);
            }
            FnBody::Native { symbol } => {
                let result = self.emit_native_stub(def, symbol);
                self.latch(result);
            }
        }
        if !self.failed() {
            self.bc().emit(Op::Return);
        }
    }

    /// Arguments arrive with the first one on top of the stack; store them
    /// into the parameter slots in declaration order.
    fn emit_prologue(&mut self, def: &FnDef) -> Result<(), CompileError> {
        for param in &def.params {
            let slot = self
                .scopes
                .declare_param(&param.name, param.ty)
                .ok_or_else(|| storage_error(&param.name, param.ty, def.position))?;
            self.emit_store(slot)?;
        }
        Ok(())
    }

    fn emit_native_stub(&mut self, def: &FnDef, symbol: &str) -> Result<(), CompileError> {
        let address = self
            .options
            .native_address(symbol)
            .ok_or_else(|| CompileError::UnresolvedNative {
                symbol: symbol.to_string(),
                position: def.position,
            })?;
        let native =
            self.code
                .make_native_function(symbol, signature_of(def), NativeAddress(address))?;
        self.bc().emit_with_u16(Op::CallNative, native);
        Ok(())
    }

    // === Blocks ===

    pub(crate) fn emit_block(&mut self, block: &Block) {
        if self.failed() {
            return;
        }
        self.scopes.enter_block();
        let ids = match self.declare_block(block) {
            Ok(ids) => ids,
            Err(err) => {
                self.latch(Err(err));
                Vec::new()
            }
        };
        for (def, id) in block.functions.iter().zip(ids) {
            self.compile_function(def, id);
        }
        for stmt in &block.stmts {
            self.emit_stmt(stmt);
        }
        self.scopes.exit_block();
    }

    /// Allocate the block's variables and register its functions, so every
    /// statement and nested body sees all of them.
    fn declare_block(&mut self, block: &Block) -> Result<Vec<u16>, CompileError> {
        for var in &block.vars {
            self.scopes
                .declare(&var.name, var.ty)
                .ok_or_else(|| storage_error(&var.name, var.ty, var.position))?;
        }
        let mut ids = Vec::with_capacity(block.functions.len());
        for def in &block.functions {
            let id = self
                .code
                .add_function(Function::new(def.name.clone(), signature_of(def)))?;
            if !self.scopes.declare_function(&def.name, id) {
                return Err(CompileError::DuplicateFunction {
                    name: def.name.clone(),
                    position: def.position,
                });
            }
            ids.push(id);
        }
        Ok(ids)
    }

    // === Statements ===

    fn emit_stmt(&mut self, stmt: &Stmt) {
        if self.failed() {
            return;
        }
        let result = self.try_emit_stmt(stmt);
        self.latch(result);
    }

    fn try_emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Store {
                name,
                op,
                value,
                position,
            } => self.emit_store_stmt(name, *op, value, *position),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.emit_if(cond, then_block, else_block.as_ref()),
            Stmt::While { cond, body } => self.emit_while(cond, body),
            Stmt::For {
                var,
                low,
                high,
                body,
                position,
            } => self.emit_for(var, low, high, body, *position),
            Stmt::Print { args, .. } => {
                for arg in args {
                    let compiled = self.emit_expr(arg)?;
                    let ty = self.materialize_value(compiled)?;
                    let op = Op::print(ty).ok_or_else(|| {
                        CompileError::invalid_operation(format!("cannot print a {ty} value"), arg.position)
                    })?;
                    self.bc().emit(op);
                }
                Ok(())
            }
            Stmt::Return { value, position } => self.emit_return(value.as_ref(), *position),
            Stmt::Expr(expr) => match self.emit_expr(expr)? {
                Compiled::Value(VarType::Void) => Ok(()),
                Compiled::Value(_) => {
                    self.bc().emit(Op::Pop);
                    Ok(())
                }
                Compiled::Branch(branch) => {
                    let next = self.offset();
                    branch.resolve(self.bc(), next)?;
                    Ok(())
                }
            },
            Stmt::Block(block) => {
                self.emit_block(block);
                Ok(())
            }
        }
    }

    fn emit_store_stmt(
        &mut self,
        name: &str,
        op: StoreOp,
        value: &Expr,
        position: Position,
    ) -> Result<(), CompileError> {
        let slot = self.resolve_var(name, position)?;
        let update = match op {
            StoreOp::Assign => None,
            StoreOp::Incr => Some(BinOp::Add),
            StoreOp::Decr => Some(BinOp::Sub),
        };
        match update {
            None => {
                let compiled = self.emit_expr(value)?;
                self.coerce(compiled, slot.ty, value.position)?;
            }
            Some(bin) => {
                let arith = arithmetic_op(bin, slot.ty).ok_or_else(|| {
                    CompileError::invalid_operation(
                        format!("operator `{}=` is not defined for {}", bin.symbol(), slot.ty),
                        position,
                    )
                })?;
                self.emit_load(slot)?;
                let compiled = self.emit_expr(value)?;
                self.coerce(compiled, slot.ty, value.position)?;
                self.bc().emit(arith);
            }
        }
        self.emit_store(slot)
    }

    fn emit_return(&mut self, value: Option<&Expr>, position: Position) -> Result<(), CompileError> {
        let return_type = self.scopes.current().return_type;
        match (value, return_type) {
            (None, VarType::Void) => {}
            (None, ty) => {
                return Err(CompileError::invalid_operation(
                    format!("missing return value in function returning {ty}"),
                    position,
                ));
            }
            (Some(_), VarType::Void) => {
                return Err(CompileError::invalid_operation(
                    "cannot return a value from a void function",
                    position,
                ));
            }
            (Some(expr), ty) => {
                let compiled = self.emit_expr(expr)?;
                self.coerce(compiled, ty, expr.position)?;
            }
        }
        self.bc().emit(Op::Return);
        Ok(())
    }

    // === Control flow ===

    /// Layout: `JA cond; then; JA end; else; JA end; cond; end:`. The
    /// condition comes last so both of its targets are already known.
    fn emit_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        let to_cond = self.emit_jump();

        let then_start = self.offset();
        self.emit_block(then_block);
        let then_exit = self.emit_jump();

        let else_start = self.offset();
        if let Some(block) = else_block {
            self.emit_block(block);
        }
        let else_exit = self.emit_jump();

        let cond_start = self.offset();
        self.patch(&[to_cond], cond_start)?;
        let branch = self.emit_condition(cond)?;
        self.patch(&branch.true_sites, then_start)?;
        self.patch(&branch.false_sites, else_start)?;

        let end = self.offset();
        self.patch(&[then_exit, else_exit], end)
    }

    fn emit_while(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let cond_start = self.offset();
        let branch = self.emit_condition(cond)?;

        let body_start = self.offset();
        self.emit_block(body);
        self.emit_jump_to(cond_start)?;

        let exit = self.offset();
        self.patch(&branch.true_sites, body_start)?;
        self.patch(&branch.false_sites, exit)
    }

    /// Inclusive numeric range loop. The upper bound is evaluated once into
    /// a hidden slot.
    fn emit_for(
        &mut self,
        var: &str,
        low: &Expr,
        high: &Expr,
        body: &Block,
        position: Position,
    ) -> Result<(), CompileError> {
        let slot = self.resolve_var(var, position)?;
        let (compare, one, add) = match slot.ty {
            VarType::Int => (Op::ICmp, Op::ILoad1, Op::IAdd),
            VarType::Double => (Op::DCmp, Op::DLoad1, Op::DAdd),
            ty => {
                return Err(CompileError::invalid_operation(
                    format!("loop variable `{var}` must be int or double, not {ty}"),
                    position,
                ));
            }
        };
        let bound = self
            .scopes
            .allocate_hidden(slot.ty)
            .ok_or_else(|| storage_error(var, slot.ty, position))?;

        let compiled = self.emit_expr(low)?;
        self.coerce(compiled, slot.ty, low.position)?;
        self.emit_store(slot)?;
        let compiled = self.emit_expr(high)?;
        self.coerce(compiled, slot.ty, high.position)?;
        self.emit_store(bound)?;

        let head = self.offset();
        self.emit_load(slot)?;
        self.emit_load(bound)?;
        let bc = self.bc();
        bc.emit(compare);
        bc.emit(Op::ILoad0);
        let branch = self.emit_branch(Op::IfICmpLe);

        let body_start = self.offset();
        self.emit_block(body);
        self.emit_load(slot)?;
        let bc = self.bc();
        bc.emit(one);
        bc.emit(add);
        self.emit_store(slot)?;
        self.emit_jump_to(head)?;

        let exit = self.offset();
        self.patch(&branch.true_sites, body_start)?;
        self.patch(&branch.false_sites, exit)
    }
}
