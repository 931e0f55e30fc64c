//! Property-based tests for conditional code generation.
//!
//! Random boolean trees over three int variables are compiled as the
//! condition of an `if`/`else`. A small walker follows the emitted
//! compare-and-branch code for concrete variable values and checks that it
//! lands on the `then` block exactly when the tree evaluates to true.

use std::collections::BTreeMap;

use proptest::prelude::*;
use slate_bytecode::{Code, Instruction, Op, VarType};
use slate_compiler::ast::{BinOp, Block, Expr, FnDef, Program, Stmt};
use slate_compiler::translate;

const VARS: [&str; 3] = ["a", "b", "c"];

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Cond {
    Cmp(BinOp, usize, usize),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    fn eval(&self, vars: &[i64; 3]) -> bool {
        match self {
            Cond::Cmp(op, l, r) => {
                let (l, r) = (vars[*l], vars[*r]);
                match op {
                    BinOp::Eq => l == r,
                    BinOp::Neq => l != r,
                    BinOp::Lt => l < r,
                    BinOp::Lte => l <= r,
                    BinOp::Gt => l > r,
                    BinOp::Gte => l >= r,
                    _ => unreachable!("not a comparison"),
                }
            }
            Cond::Not(inner) => !inner.eval(vars),
            Cond::And(l, r) => l.eval(vars) && r.eval(vars),
            Cond::Or(l, r) => l.eval(vars) || r.eval(vars),
        }
    }

    fn to_expr(&self) -> Expr {
        match self {
            Cond::Cmp(op, l, r) => Expr::binary(*op, Expr::load(VARS[*l]), Expr::load(VARS[*r])),
            Cond::Not(inner) => Expr::logical_not(inner.to_expr()),
            Cond::And(l, r) => Expr::binary(BinOp::And, l.to_expr(), r.to_expr()),
            Cond::Or(l, r) => Expr::binary(BinOp::Or, l.to_expr(), r.to_expr()),
        }
    }

    fn comparisons(&self) -> usize {
        match self {
            Cond::Cmp(..) => 1,
            Cond::Not(inner) => inner.comparisons(),
            Cond::And(l, r) | Cond::Or(l, r) => l.comparisons() + r.comparisons(),
        }
    }
}

fn comparison() -> impl Strategy<Value = BinOp> {
    prop_oneof![
        Just(BinOp::Eq),
        Just(BinOp::Neq),
        Just(BinOp::Lt),
        Just(BinOp::Lte),
        Just(BinOp::Gt),
        Just(BinOp::Gte),
    ]
}

/// Strategy: boolean trees up to four levels deep.
fn cond() -> impl Strategy<Value = Cond> {
    let leaf = (comparison(), 0..3usize, 0..3usize).prop_map(|(op, l, r)| Cond::Cmp(op, l, r));
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|c| Cond::Not(Box::new(c))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Cond::And(Box::new(l), Box::new(r))),
            (inner.clone(), inner).prop_map(|(l, r)| Cond::Or(Box::new(l), Box::new(r))),
        ]
    })
}

/// Strategy: small values so equal operands are common.
fn values() -> impl Strategy<Value = [i64; 3]> {
    [-2i64..3, -2i64..3, -2i64..3]
}

fn if_else_program(cond: Expr) -> Program {
    let mut body = Block::new();
    for name in VARS {
        body = body.var(name, VarType::Int);
    }
    let body = body.stmt(Stmt::If {
        cond,
        then_block: Block::new().stmt(Stmt::print(vec![Expr::int(1)])),
        else_block: Some(Block::new().stmt(Stmt::print(vec![Expr::int(2)]))),
    });
    Program::new(FnDef::new("main", VarType::Void, body))
}

fn main_listing(code: &Code) -> Vec<Instruction<'_>> {
    code.entry_function()
        .expect("entry function")
        .bytecode
        .instructions()
        .collect::<Result<_, _>>()
        .expect("decode failed")
}

/// `(then_start, else_start, cond_start)` of the single if/else in main.
fn if_layout(insns: &[Instruction<'_>]) -> (usize, usize, usize) {
    (insns[1].offset, insns[4].offset, insns[7].offset)
}

/// Follow the condition code from `start` until it reaches one of `exits`.
fn walk(insns: &[Instruction<'_>], start: usize, exits: &[usize], vars: &[i64; 3]) -> usize {
    let by_offset: BTreeMap<usize, Instruction<'_>> = insns.iter().map(|i| (i.offset, *i)).collect();
    let mut stack: Vec<i64> = Vec::new();
    let mut pc = start;
    for _ in 0..10_000 {
        if exits.contains(&pc) {
            return pc;
        }
        let insn = by_offset.get(&pc).expect("jump into the middle of an instruction");
        let mut next = insn.next_offset();
        match insn.op {
            Op::LoadIVar => {
                let slot = insn.u16_operand(0).expect("slot operand");
                stack.push(vars[usize::from(slot)]);
            }
            Op::ILoad0 => stack.push(0),
            Op::ICmp => {
                let r = stack.pop().expect("stack underflow");
                let l = stack.pop().expect("stack underflow");
                stack.push((l > r) as i64 - (l < r) as i64);
            }
            Op::Ja => next = insn.targets()[0],
            op if op.is_branch() => {
                let r = stack.pop().expect("stack underflow");
                let l = stack.pop().expect("stack underflow");
                let taken = match op {
                    Op::IfICmpE => l == r,
                    Op::IfICmpNe => l != r,
                    Op::IfICmpL => l < r,
                    Op::IfICmpLe => l <= r,
                    Op::IfICmpG => l > r,
                    Op::IfICmpGe => l >= r,
                    _ => unreachable!(),
                };
                let targets = insn.targets();
                next = if taken { targets[0] } else { targets[1] };
            }
            op => panic!("unexpected {op} in condition code at {pc}"),
        }
        pc = next;
    }
    panic!("condition code does not terminate");
}

// ============================================================================
// Routing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_condition_routes_to_matching_block(c in cond(), vars in values()) {
        let code = translate(&if_else_program(c.to_expr())).unwrap();
        let insns = main_listing(&code);
        let (then_start, else_start, cond_start) = if_layout(&insns);

        let exit = walk(&insns, cond_start, &[then_start, else_start], &vars);
        let expected = if c.eval(&vars) { then_start } else { else_start };
        prop_assert_eq!(exit, expected);
    }

    #[test]
    fn prop_one_branch_per_comparison(c in cond()) {
        let code = translate(&if_else_program(c.to_expr())).unwrap();
        let insns = main_listing(&code);
        let branches = insns.iter().filter(|i| i.op.is_branch()).count();
        prop_assert_eq!(branches, c.comparisons());
        // No reserved opcode slot is left behind.
        prop_assert!(insns.iter().all(|i| i.op != Op::Invalid));
    }

    #[test]
    fn prop_double_negation_is_free(c in cond()) {
        let plain = translate(&if_else_program(c.to_expr())).unwrap();
        let doubled = translate(&if_else_program(Expr::logical_not(Expr::logical_not(c.to_expr())))).unwrap();
        prop_assert_eq!(
            plain.entry_function().unwrap().bytecode.as_bytes(),
            doubled.entry_function().unwrap().bytecode.as_bytes()
        );
    }

    #[test]
    fn prop_materialized_condition_compiles(c in cond()) {
        let mut body = Block::new();
        for name in VARS {
            body = body.var(name, VarType::Int);
        }
        let body = body.var("x", VarType::Int).stmt(Stmt::assign("x", c.to_expr()));
        let program = Program::new(FnDef::new("main", VarType::Void, body));
        let code = translate(&program).unwrap();
        let insns = main_listing(&code);
        prop_assert_eq!(insns.last().map(|i| i.op), Some(Op::Return));
        prop_assert_eq!(insns[insns.len() - 2].op, Op::StoreIVar);
    }
}

// ============================================================================
// Short-circuit edges
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_and_skips_right_operand_when_left_is_false(nots in 0usize..4, op in comparison()) {
        let mut left = Expr::binary(op, Expr::load("a"), Expr::load("b"));
        for _ in 0..nots {
            left = Expr::logical_not(left);
        }
        let right = Expr::binary(BinOp::Lt, Expr::load("b"), Expr::load("c"));
        let code = translate(&if_else_program(Expr::binary(BinOp::And, left, right))).unwrap();
        let insns = main_listing(&code);
        let (_, else_start, _) = if_layout(&insns);
        let first = *insns.iter().find(|i| i.op.is_branch()).unwrap();
        let right_start = first.next_offset();

        let expected = if nots % 2 == 0 {
            vec![right_start, else_start]
        } else {
            vec![else_start, right_start]
        };
        prop_assert_eq!(first.targets(), expected);
    }

    #[test]
    fn prop_or_skips_right_operand_when_left_is_true(nots in 0usize..4, op in comparison()) {
        let mut left = Expr::binary(op, Expr::load("a"), Expr::load("b"));
        for _ in 0..nots {
            left = Expr::logical_not(left);
        }
        let right = Expr::binary(BinOp::Lt, Expr::load("b"), Expr::load("c"));
        let code = translate(&if_else_program(Expr::binary(BinOp::Or, left, right))).unwrap();
        let insns = main_listing(&code);
        let (then_start, _, _) = if_layout(&insns);
        let first = *insns.iter().find(|i| i.op.is_branch()).unwrap();
        let right_start = first.next_offset();

        let expected = if nots % 2 == 0 {
            vec![then_start, right_start]
        } else {
            vec![right_start, then_start]
        };
        prop_assert_eq!(first.targets(), expected);
    }
}

// ============================================================================
// Slots
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Variables of nested blocks never share a slot, even after the block
    /// that declared one has been left.
    #[test]
    fn prop_block_variables_get_distinct_slots(depths in prop::collection::vec(0usize..3, 1..8)) {
        let mut body = Block::new();
        for (i, depth) in depths.iter().enumerate() {
            let name = format!("v{i}");
            let mut block = Block::new()
                .var(name.clone(), VarType::Int)
                .stmt(Stmt::assign(name, Expr::int(i as i64)));
            for _ in 0..*depth {
                block = Block::new().stmt(Stmt::Block(block));
            }
            body = body.stmt(Stmt::Block(block));
        }
        let program = Program::new(FnDef::new("main", VarType::Void, body));
        let code = translate(&program).unwrap();

        let slots: Vec<u16> = main_listing(&code)
            .iter()
            .filter(|i| i.op == Op::StoreIVar)
            .filter_map(|i| i.u16_operand(0))
            .collect();
        let expected: Vec<u16> = (0..depths.len() as u16).collect();
        prop_assert_eq!(slots, expected);
        prop_assert_eq!(code.entry_function().unwrap().slots.ints as usize, depths.len());
    }
}
