use serde::{Deserialize, Serialize};
use slate_bytecode::VarType;

/// Source position of a node, as reported by the parser.
pub type Position = u32;

/// A complete program: the top-level function and everything nested in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub top: FnDef,
}

impl Program {
    pub fn new(top: FnDef) -> Self {
        Program { top }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDef {
    pub name: String,
    pub return_type: VarType,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: FnBody,
    #[serde(default)]
    pub position: Position,
}

impl FnDef {
    pub fn new(name: impl Into<String>, return_type: VarType, body: Block) -> Self {
        FnDef {
            name: name.into(),
            return_type,
            params: Vec::new(),
            body: FnBody::Block(body),
            position: 0,
        }
    }

    /// A function implemented by the embedder and bound by symbol name.
    pub fn native(name: impl Into<String>, return_type: VarType, symbol: impl Into<String>) -> Self {
        FnDef {
            name: name.into(),
            return_type,
            params: Vec::new(),
            body: FnBody::Native {
                symbol: symbol.into(),
            },
            position: 0,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: VarType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: VarType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FnBody {
    Block(Block),
    Native { symbol: String },
}

/// A scope: its variables and nested functions are visible to every
/// statement of the block, regardless of declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub vars: Vec<VarDecl>,
    #[serde(default)]
    pub functions: Vec<FnDef>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, name: impl Into<String>, ty: VarType) -> Self {
        self.vars.push(VarDecl {
            name: name.into(),
            ty,
            position: 0,
        });
        self
    }

    pub fn function(mut self, def: FnDef) -> Self {
        self.functions.push(def);
        self
    }

    pub fn stmt(mut self, stmt: Stmt) -> Self {
        self.stmts.push(stmt);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: VarType,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// `=`
    Assign,
    /// `+=`
    Incr,
    /// `-=`
    Decr,
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Store {
        name: String,
        op: StoreOp,
        value: Expr,
        #[serde(default)]
        position: Position,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    /// `for (var in low..high)`, both bounds inclusive.
    For {
        var: String,
        low: Expr,
        high: Expr,
        body: Block,
        #[serde(default)]
        position: Position,
    },
    Print {
        args: Vec<Expr>,
        #[serde(default)]
        position: Position,
    },
    Return {
        value: Option<Expr>,
        #[serde(default)]
        position: Position,
    },
    Expr(Expr),
    Block(Block),
}

impl Stmt {
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Store {
            name: name.into(),
            op: StoreOp::Assign,
            value,
            position: 0,
        }
    }

    pub fn print(args: Vec<Expr>) -> Self {
        Stmt::Print { args, position: 0 }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return { value, position: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i64),
    Double(f64),
    Str(String),
    Load(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, position: 0 }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn int(value: i64) -> Self {
        Expr::new(ExprKind::Int(value))
    }

    pub fn double(value: f64) -> Self {
        Expr::new(ExprKind::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::new(ExprKind::Str(value.into()))
    }

    pub fn load(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Load(name.into()))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn logical_not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            name: name.into(),
            args,
        })
    }
}
