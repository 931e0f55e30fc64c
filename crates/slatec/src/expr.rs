use slate_bytecode::{Op, VarType};

use crate::ast::*;
use crate::branch::PendingBranch;
use crate::codegen::Emitter;
use crate::error::CompileError;
use crate::typeck::{self, value_type};

/// Result of compiling an expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Compiled {
    /// A value of this type was pushed (nothing for `Void`).
    Value(VarType),
    /// A boolean that still has to be routed somewhere.
    Branch(PendingBranch),
}

/// Typed instruction for an arithmetic or bitwise operator.
pub(crate) fn arithmetic_op(op: BinOp, ty: VarType) -> Option<Op> {
    Some(match (op, ty) {
        (BinOp::Add, VarType::Int) => Op::IAdd,
        (BinOp::Add, VarType::Double) => Op::DAdd,
        (BinOp::Sub, VarType::Int) => Op::ISub,
        (BinOp::Sub, VarType::Double) => Op::DSub,
        (BinOp::Mul, VarType::Int) => Op::IMul,
        (BinOp::Mul, VarType::Double) => Op::DMul,
        (BinOp::Div, VarType::Int) => Op::IDiv,
        (BinOp::Div, VarType::Double) => Op::DDiv,
        (BinOp::Mod, VarType::Int) => Op::IMod,
        (BinOp::BitAnd, VarType::Int) => Op::IAAnd,
        (BinOp::BitOr, VarType::Int) => Op::IAOr,
        (BinOp::BitXor, VarType::Int) => Op::IAXor,
        _ => return None,
    })
}

fn branch_op(op: BinOp) -> Option<Op> {
    Some(match op {
        BinOp::Eq => Op::IfICmpE,
        BinOp::Neq => Op::IfICmpNe,
        BinOp::Lt => Op::IfICmpL,
        BinOp::Lte => Op::IfICmpLe,
        BinOp::Gt => Op::IfICmpG,
        BinOp::Gte => Op::IfICmpGe,
        _ => return None,
    })
}

impl Emitter<'_> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> Result<Compiled, CompileError> {
        match &expr.kind {
            ExprKind::Int(value) => {
                let bc = self.bc();
                bc.emit(Op::ILoad);
                bc.emit_i64(*value);
                Ok(Compiled::Value(VarType::Int))
            }
            ExprKind::Double(value) => {
                let bc = self.bc();
                bc.emit(Op::DLoad);
                bc.emit_f64(*value);
                Ok(Compiled::Value(VarType::Double))
            }
            ExprKind::Str(value) => {
                let id = self.code.make_string_constant(value)?;
                self.bc().emit_with_u16(Op::SLoad, id);
                Ok(Compiled::Value(VarType::String))
            }
            ExprKind::Load(name) => {
                let slot = self.resolve_var(name, expr.position)?;
                self.emit_load(slot)?;
                Ok(Compiled::Value(slot.ty))
            }
            ExprKind::Binary { op, left, right } => match op {
                BinOp::And | BinOp::Or => self.emit_logical(*op, left, right),
                op if op.is_comparison() => self.emit_comparison(*op, left, right, expr.position),
                op => self.emit_arithmetic(*op, left, right, expr.position),
            },
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(Compiled::Branch(self.emit_condition(operand)?.negate())),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let compiled = self.emit_expr(operand)?;
                let ty = self.materialize_value(compiled)?;
                let (minus_one, mul) = match ty {
                    VarType::Int => (Op::ILoadM1, Op::IMul),
                    VarType::Double => (Op::DLoadM1, Op::DMul),
                    ty => {
                        return Err(CompileError::invalid_operation(
                            format!("unary `-` is not defined for {ty}"),
                            expr.position,
                        ));
                    }
                };
                let bc = self.bc();
                bc.emit(minus_one);
                bc.emit(mul);
                Ok(Compiled::Value(ty))
            }
            ExprKind::Call { name, args } => self.emit_call(name, args, expr.position),
        }
    }

    /// Compile an expression used as a condition.
    pub(crate) fn emit_condition(&mut self, expr: &Expr) -> Result<PendingBranch, CompileError> {
        let compiled = self.emit_expr(expr)?;
        self.branch_on_value(compiled, expr.position)
    }

    /// Compile both operands of a binary operator and convert them to their
    /// common numeric type, which is returned.
    ///
    /// An int left operand that the right one will widen gets a one-byte
    /// conversion site right after its code, predicted from the right
    /// operand's static type and filled once that operand is compiled.
    fn emit_operands(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<VarType, CompileError> {
        let predicted = typeck::type_of(&self.scopes, &self.code, &mut self.types, right)
            .map(value_type)
            .unwrap_or(VarType::Invalid);

        let compiled = self.emit_expr(left)?;
        let left_ty = self.materialize_value(compiled)?;
        let site = (left_ty == VarType::Int && VarType::common(left_ty, predicted) == VarType::Double)
            .then(|| self.bc().reserve_op());

        let compiled = self.emit_expr(right)?;
        let right_ty = self.materialize_value(compiled)?;

        let common = VarType::common(left_ty, right_ty);
        if !common.is_numeric() {
            return Err(CompileError::invalid_operation(
                format!(
                    "operator `{}` cannot be applied to {left_ty} and {right_ty}",
                    op.symbol()
                ),
                position,
            ));
        }
        match site {
            Some(site) => self.convert(left_ty, common, Some(site), left.position)?,
            None if left_ty != common => {
                return Err(CompileError::Invariant(format!(
                    "no conversion site for the left operand of `{}`",
                    op.symbol()
                )));
            }
            None => {}
        }
        self.convert(right_ty, common, None, right.position)?;
        Ok(common)
    }

    fn emit_arithmetic(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<Compiled, CompileError> {
        let ty = self.emit_operands(op, left, right, position)?;
        let instruction = arithmetic_op(op, ty).ok_or_else(|| {
            CompileError::invalid_operation(
                format!("operator `{}` is not defined for {ty}", op.symbol()),
                position,
            )
        })?;
        self.bc().emit(instruction);
        Ok(Compiled::Value(ty))
    }

    /// `cmp(left, right)` compared against zero by a two-target branch.
    fn emit_comparison(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<Compiled, CompileError> {
        let branch = branch_op(op)
            .ok_or_else(|| CompileError::Invariant(format!("`{}` is not a comparison", op.symbol())))?;
        let ty = self.emit_operands(op, left, right, position)?;
        let compare = if ty == VarType::Double { Op::DCmp } else { Op::ICmp };
        let bc = self.bc();
        bc.emit(compare);
        bc.emit(Op::ILoad0);
        Ok(Compiled::Branch(self.emit_branch(branch)))
    }

    /// Short-circuit `&&` / `||`: the right operand is only entered along
    /// the edge where the left one does not decide the result.
    fn emit_logical(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Compiled, CompileError> {
        let lhs = self.emit_condition(left)?;
        let right_start = self.offset();
        if op == BinOp::And {
            self.patch(&lhs.true_sites, right_start)?;
        } else {
            self.patch(&lhs.false_sites, right_start)?;
        }
        let rhs = self.emit_condition(right)?;
        Ok(Compiled::Branch(if op == BinOp::And {
            PendingBranch::and(lhs, rhs)
        } else {
            PendingBranch::or(lhs, rhs)
        }))
    }

    /// Arguments are pushed rightmost first, each converted to its
    /// parameter type.
    fn emit_call(&mut self, name: &str, args: &[Expr], position: Position) -> Result<Compiled, CompileError> {
        let id = typeck::resolve_function(&self.scopes, &self.code, name).ok_or_else(|| {
            CompileError::UndefinedFunction {
                name: name.to_string(),
                position,
            }
        })?;
        let signature = self
            .code
            .function_by_id(id)
            .map(|f| f.signature.clone())
            .ok_or_else(|| CompileError::Invariant(format!("function id {id} is not registered")))?;
        if args.len() != signature.param_count() {
            return Err(CompileError::ParameterCountMismatch {
                name: name.to_string(),
                expected: signature.param_count(),
                got: args.len(),
                position,
            });
        }
        for (index, arg) in args.iter().enumerate().rev() {
            let compiled = self.emit_expr(arg)?;
            let ty = signature.param_type(index).unwrap_or(VarType::Invalid);
            self.coerce(compiled, ty, arg.position)?;
        }
        self.bc().emit_with_u16(Op::Call, id);
        Ok(Compiled::Value(signature.return_type()))
    }
}
