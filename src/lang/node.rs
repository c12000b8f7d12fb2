use super::span::Span;
use super::types::Type;

/// Access to the static type the frontend resolved for a node.
pub trait Typed {
    fn get_type(&self) -> &Type;
}

/// One compilation unit: a source module and its top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub body: Vec<Stmt>,
}

// ───────────────────────────── Statements ─────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Left-hand side of a declaration: a name, or a destructuring pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    /// `[a, , b = 1, ...rest]`; `None` elements are holes.
    Array {
        elements: Vec<Option<BindingElement>>,
        rest: Option<Box<Pattern>>,
    },
    /// `{ key: target = default }`; shorthand `{ a }` has key and name `a`.
    Object(Vec<(String, BindingElement)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingElement {
    pub target: Pattern,
    /// Used when the extracted value is `undefined`.
    pub default: Option<Expr>,
}

impl Pattern {
    /// Every name the pattern binds, left to right.
    pub fn for_each_name(&self, visit: &mut dyn FnMut(&str)) {
        match self {
            Pattern::Ident(name) => visit(name),
            Pattern::Array { elements, rest } => {
                for element in elements.iter().flatten() {
                    element.target.for_each_name(visit);
                }
                if let Some(rest) = rest {
                    rest.for_each_name(visit);
                }
            }
            Pattern::Object(props) => {
                for (_, element) in props {
                    element.target.for_each_name(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Var {
        kind: DeclKind,
        decls: Vec<Declarator>,
    },
    Function(FunctionDecl),
    Class(ClassDecl),
    Return(Option<Expr>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (const name of iterable) body`
    ForOf {
        name: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

/// A `case test:` clause, or `default:` when `test` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

// ───────────────────────────── Functions ─────────────────────────────

/// `name` binds the argument as passed. A parameter written as a pattern
/// gets a name the source cannot spell, and `pattern` destructures it.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub return_type: Type,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body: `(x) => x + 1`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub arrow: bool,
    pub return_type: Type,
}

// ───────────────────────────── Classes ─────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub extends: Option<Expr>,
    /// The class derives from `SmartContract`; its properties live in storage.
    pub smart_contract: bool,
    pub is_abstract: bool,
    pub exported: bool,
    pub constructor: Option<Constructor>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constructor {
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub kind: MemberKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Method {
        params: Vec<Param>,
        body: Vec<Stmt>,
        return_type: Type,
        /// Invoked for the verification trigger.
        verify: bool,
    },
    Getter {
        body: Vec<Stmt>,
        return_type: Type,
    },
    Setter {
        param: Param,
        body: Vec<Stmt>,
    },
    Property {
        ty: Type,
        init: Option<Expr>,
        readonly: bool,
    },
}

// ───────────────────────────── Expressions ─────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Type,
}

impl Typed for Expr {
    fn get_type(&self) -> &Type {
        &self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    TypeOf,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    InstanceOf,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProp {
    pub key: String,
    pub kind: PropKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKind {
    Value(Expr),
    Method(FunctionExpr),
    Getter(Vec<Stmt>),
    Setter(Param, Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(i64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    This,
    Array(Vec<Expr>),
    Object(Vec<ObjectProp>),
    Function(Box<FunctionExpr>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `target = value`, or `target op= value` when `op` is set.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    SuperCall(Vec<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
}

impl ExprKind {
    /// Short description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::Number(_) => "number literal",
            ExprKind::Str(_) => "string literal",
            ExprKind::Bool(_) => "boolean literal",
            ExprKind::Null => "null",
            ExprKind::Undefined => "undefined",
            ExprKind::Ident(_) => "identifier",
            ExprKind::This => "this",
            ExprKind::Array(_) => "array literal",
            ExprKind::Object(_) => "object literal",
            ExprKind::Function(_) => "function expression",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Logical { .. } => "logical expression",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::Update { .. } => "update expression",
            ExprKind::Conditional { .. } => "conditional expression",
            ExprKind::Call { .. } => "call",
            ExprKind::New { .. } => "new expression",
            ExprKind::SuperCall(_) => "super call",
            ExprKind::Member { .. } => "member access",
            ExprKind::Index { .. } => "index access",
        }
    }
}
