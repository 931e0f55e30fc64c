use slate_bytecode::{Op, Site, VarType};
use tracing::trace;

use crate::ast::Position;
use crate::branch::PendingBranch;
use crate::codegen::Emitter;
use crate::error::CompileError;
use crate::expr::Compiled;

/// Conversion instruction between two value types, if the pair has one.
pub fn conversion_op(from: VarType, to: VarType) -> Option<Op> {
    match (from, to) {
        (VarType::Int, VarType::Double) => Some(Op::I2D),
        (VarType::Double, VarType::Int) => Some(Op::D2I),
        (VarType::String, VarType::Int) => Some(Op::S2I),
        _ => None,
    }
}

impl Emitter<'_> {
    /// Make a compiled expression a value of type `to`.
    pub(crate) fn coerce(
        &mut self,
        compiled: Compiled,
        to: VarType,
        position: Position,
    ) -> Result<(), CompileError> {
        match compiled {
            Compiled::Value(from) => self.convert(from, to, None, position),
            Compiled::Branch(branch) => match to {
                VarType::Int | VarType::Double => self.materialize(branch, to),
                VarType::Void => {
                    let next = self.offset();
                    branch.resolve(self.bc(), next)?;
                    Ok(())
                }
                to => Err(CompileError::InvalidConversion {
                    from: VarType::Logic,
                    to,
                    position,
                }),
            },
        }
    }

    /// Convert the value produced at `site`, or the value just emitted when
    /// there is no site.
    pub(crate) fn convert(
        &mut self,
        from: VarType,
        to: VarType,
        site: Option<Site>,
        position: Position,
    ) -> Result<(), CompileError> {
        if from == to || to == VarType::Void {
            return Ok(());
        }
        let op = conversion_op(from, to).ok_or(CompileError::InvalidConversion { from, to, position })?;
        match site {
            Some(site) => {
                trace!(site = site.offset(), %op, "conversion rewritten in place");
                self.bc().patch_op_site(site, op)?;
            }
            None => self.bc().emit(op),
        }
        Ok(())
    }

    /// Turn a pending branch into a typed 1 or 0 on the stack.
    pub(crate) fn materialize(&mut self, branch: PendingBranch, ty: VarType) -> Result<(), CompileError> {
        let (one, zero) = match ty {
            VarType::Int => (Op::ILoad1, Op::ILoad0),
            VarType::Double => (Op::DLoad1, Op::DLoad0),
            ty => {
                return Err(CompileError::Invariant(format!(
                    "cannot materialize a boolean as {ty}"
                )))
            }
        };
        let true_start = self.offset();
        self.bc().emit(one);
        let join = self.emit_jump();
        let false_start = self.offset();
        self.bc().emit(zero);
        let end = self.offset();

        self.patch(&[join], end)?;
        self.patch(&branch.true_sites, true_start)?;
        self.patch(&branch.false_sites, false_start)
    }

    /// Value type of a compiled expression, materializing booleans as ints.
    pub(crate) fn materialize_value(&mut self, compiled: Compiled) -> Result<VarType, CompileError> {
        match compiled {
            Compiled::Value(ty) => Ok(ty),
            Compiled::Branch(branch) => {
                self.materialize(branch, VarType::Int)?;
                Ok(VarType::Int)
            }
        }
    }

    /// Turn a value used as a condition into a branch on "not zero".
    pub(crate) fn branch_on_value(
        &mut self,
        compiled: Compiled,
        position: Position,
    ) -> Result<PendingBranch, CompileError> {
        match compiled {
            Compiled::Branch(branch) => Ok(branch),
            Compiled::Value(VarType::Int) => {
                self.bc().emit(Op::ILoad0);
                Ok(self.emit_branch(Op::IfICmpNe))
            }
            Compiled::Value(VarType::Double) => {
                let bc = self.bc();
                bc.emit(Op::DLoad0);
                bc.emit(Op::DCmp);
                bc.emit(Op::ILoad0);
                Ok(self.emit_branch(Op::IfICmpNe))
            }
            Compiled::Value(from) => Err(CompileError::InvalidConversion {
                from,
                to: VarType::Logic,
                position,
            }),
        }
    }
}
