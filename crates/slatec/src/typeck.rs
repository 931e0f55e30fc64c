use std::collections::HashMap;

use slate_bytecode::{Code, Function, VarType};

use crate::ast::*;
use crate::error::CompileError;
use crate::scope::{Lookup, ScopeStack};

/// Static types already computed, keyed by node address.
///
/// The program stays borrowed for the whole translation, so a node's
/// address identifies it for as long as the cache lives.
#[derive(Debug, Default)]
pub struct TypeCache {
    types: HashMap<*const Expr, VarType>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Static type of an expression, computed without emitting code.
///
/// Mirrors the emitter's typing rules so the emitter can tell, before
/// compiling a right operand, whether the left one will have to be widened.
/// Boolean-valued expressions are `Logic`. Every node is typed at most once
/// per cache.
pub fn type_of(
    scopes: &ScopeStack,
    code: &Code,
    cache: &mut TypeCache,
    expr: &Expr,
) -> Result<VarType, CompileError> {
    let key: *const Expr = expr;
    if let Some(&ty) = cache.types.get(&key) {
        return Ok(ty);
    }
    let ty = match &expr.kind {
        ExprKind::Int(_) => VarType::Int,
        ExprKind::Double(_) => VarType::Double,
        ExprKind::Str(_) => VarType::String,
        ExprKind::Load(name) => scopes
            .resolve(name, Lookup::Enclosing)
            .map(|slot| slot.ty)
            .ok_or_else(|| CompileError::UndefinedVariable {
                name: name.clone(),
                position: expr.position,
            })?,
        ExprKind::Binary { op, left, right } => {
            let left = value_type(type_of(scopes, code, cache, left)?);
            let right = value_type(type_of(scopes, code, cache, right)?);
            if op.is_comparison() || op.is_logical() {
                VarType::Logic
            } else {
                VarType::common(left, right)
            }
        }
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => {
            type_of(scopes, code, cache, operand)?;
            VarType::Logic
        }
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => value_type(type_of(scopes, code, cache, operand)?),
        ExprKind::Call { name, .. } => resolve_function(scopes, code, name)
            .and_then(|id| code.function_by_id(id))
            .map(Function::return_type)
            .ok_or_else(|| CompileError::UndefinedFunction {
                name: name.clone(),
                position: expr.position,
            })?,
    };
    cache.types.insert(key, ty);
    Ok(ty)
}

/// Type an expression has once used as a value: booleans become ints.
pub fn value_type(ty: VarType) -> VarType {
    if ty == VarType::Logic {
        VarType::Int
    } else {
        ty
    }
}

/// Function lookup through the lexically enclosing blocks. The entry
/// function is bound in no block and is found by its name.
pub fn resolve_function(scopes: &ScopeStack, code: &Code, name: &str) -> Option<u16> {
    scopes.resolve_function(name).or_else(|| {
        code.entry_function()
            .filter(|f| f.name == name)
            .and_then(Function::id)
    })
}
