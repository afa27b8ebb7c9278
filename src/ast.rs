#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Concat, // ~
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Const),
    Name(String),
    Getattr {
        node: Box<Expr>,
        attr: String,
    }, // foo.bar
    Getitem {
        node: Box<Expr>,
        arg: Box<Expr>,
    }, // foo['bar']
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        node: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Compare {
        expr: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    Filter {
        node: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Test {
        node: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        negated: bool,
    },
    Call {
        node: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    CondExpr {
        test: Box<Expr>,
        expr1: Box<Expr>,
        expr2: Option<Box<Expr>>,
    }, // expr1 if test else expr2
}

/// Name of the slot a child expression occupies in its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Node,
    Expr,
    Test,
    Expr1,
    Expr2,
    Left,
    Right,
    Args,
    Kwargs,
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn getattr(node: Expr, attr: impl Into<String>) -> Self {
        Expr::Getattr {
            node: Box::new(node),
            attr: attr.into(),
        }
    }

    /// Child expressions keyed by the field that holds them.
    ///
    /// List-valued fields are flattened, so a field may repeat. The index of
    /// a `Getitem` is not reported; walkers that need it read `arg` directly.
    pub fn fields(&self) -> Vec<(Field, &Expr)> {
        match self {
            Expr::Const(_) | Expr::Name(_) => Vec::new(),
            Expr::Getattr { node, .. } | Expr::Getitem { node, .. } => {
                vec![(Field::Node, &**node)]
            }
            Expr::List(items) => items.iter().map(|item| (Field::Args, item)).collect(),
            Expr::Unary { node, .. } => vec![(Field::Node, &**node)],
            Expr::BinOp { left, right, .. } => {
                vec![(Field::Left, &**left), (Field::Right, &**right)]
            }
            Expr::Compare { expr, ops } => std::iter::once((Field::Expr, &**expr))
                .chain(ops.iter().map(|(_, operand)| (Field::Args, operand)))
                .collect(),
            Expr::Filter {
                node, args, kwargs, ..
            }
            | Expr::Call { node, args, kwargs } => std::iter::once((Field::Node, &**node))
                .chain(args.iter().map(|arg| (Field::Args, arg)))
                .chain(kwargs.iter().map(|(_, value)| (Field::Kwargs, value)))
                .collect(),
            Expr::Test { node, args, .. } => std::iter::once((Field::Node, &**node))
                .chain(args.iter().map(|arg| (Field::Args, arg)))
                .collect(),
            Expr::CondExpr { test, expr1, expr2 } => std::iter::once((Field::Test, &**test))
                .chain(std::iter::once((Field::Expr1, &**expr1)))
                .chain(expr2.iter().map(|expr| (Field::Expr2, &**expr)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Text(String),
    Output(Vec<Expr>),
    For {
        targets: Vec<String>, // e.g., ["message"] or ["key", "value"]
        iter: Expr,
        filter: Option<Expr>, // {% for x in xs if cond %}
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        elifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },
    Set {
        target: String,
        value: Expr,
    },
    Block {
        name: String,
        body: Vec<Stmt>,
    },
}

pub type Template = Vec<Stmt>;
