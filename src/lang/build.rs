//! Constructors for assembling typed syntax trees by hand.
//!
//! Frontends and tests use these instead of spelling out every struct. Types
//! that follow from the operator (arithmetic yields `number`, comparisons
//! yield `boolean`) are filled in; everything else is passed explicitly.

use super::node::*;
use super::span::Span;
use super::types::Type;

fn expr(kind: ExprKind, ty: Type) -> Expr {
    Expr {
        kind,
        span: Span::default(),
        ty,
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt {
        kind,
        span: Span::default(),
    }
}

impl Expr {
    pub fn at(mut self, line: u32, col: u32) -> Expr {
        self.span = Span::new(line, col);
        self
    }
}

impl Stmt {
    pub fn at(mut self, line: u32, col: u32) -> Stmt {
        self.span = Span::new(line, col);
        self
    }
}

// ───────────────────────────── Expressions ─────────────────────────────

pub fn num(n: i64) -> Expr {
    expr(ExprKind::Number(n), Type::Number)
}

pub fn string(s: &str) -> Expr {
    expr(ExprKind::Str(s.to_string()), Type::String)
}

pub fn boolean(b: bool) -> Expr {
    expr(ExprKind::Bool(b), Type::Boolean)
}

pub fn null() -> Expr {
    expr(ExprKind::Null, Type::Null)
}

pub fn undefined() -> Expr {
    expr(ExprKind::Undefined, Type::Undefined)
}

pub fn ident(name: &str, ty: Type) -> Expr {
    expr(ExprKind::Ident(name.to_string()), ty)
}

pub fn this(ty: Type) -> Expr {
    expr(ExprKind::This, ty)
}

pub fn array(items: Vec<Expr>, element: Type) -> Expr {
    expr(ExprKind::Array(items), Type::array(element))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    let ty = Type::Tuple(items.iter().map(|e| e.ty.clone()).collect());
    expr(ExprKind::Array(items), ty)
}

pub fn object(props: Vec<(&str, Expr)>) -> Expr {
    let props = props
        .into_iter()
        .map(|(key, value)| ObjectProp {
            key: key.to_string(),
            span: value.span,
            kind: PropKind::Value(value),
        })
        .collect();
    expr(ExprKind::Object(props), Type::Object)
}

pub fn object_with(props: Vec<ObjectProp>) -> Expr {
    expr(ExprKind::Object(props), Type::Object)
}

pub fn getter_prop(key: &str, body: Vec<Stmt>) -> ObjectProp {
    ObjectProp {
        key: key.to_string(),
        kind: PropKind::Getter(body),
        span: Span::default(),
    }
}

pub fn setter_prop(key: &str, param: Param, body: Vec<Stmt>) -> ObjectProp {
    ObjectProp {
        key: key.to_string(),
        kind: PropKind::Setter(param, body),
        span: Span::default(),
    }
}

pub fn value_prop(key: &str, value: Expr) -> ObjectProp {
    ObjectProp {
        key: key.to_string(),
        span: value.span,
        kind: PropKind::Value(value),
    }
}

pub fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
        pattern: None,
    }
}

/// A destructured parameter; the whole argument stays reachable as `name`.
pub fn pattern_param(name: &str, pattern: Pattern, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
        pattern: Some(pattern),
    }
}

// ───────────────────────────── Patterns ─────────────────────────────

pub fn bind(name: &str) -> BindingElement {
    BindingElement {
        target: Pattern::Ident(name.to_string()),
        default: None,
    }
}

pub fn bind_or(name: &str, default: Expr) -> BindingElement {
    BindingElement {
        target: Pattern::Ident(name.to_string()),
        default: Some(default),
    }
}

pub fn nested(pattern: Pattern) -> BindingElement {
    BindingElement {
        target: pattern,
        default: None,
    }
}

pub fn array_pattern(elements: Vec<Option<BindingElement>>, rest: Option<&str>) -> Pattern {
    Pattern::Array {
        elements,
        rest: rest.map(|name| Box::new(Pattern::Ident(name.to_string()))),
    }
}

pub fn object_pattern(props: Vec<(&str, BindingElement)>) -> Pattern {
    Pattern::Object(props.into_iter().map(|(k, e)| (k.to_string(), e)).collect())
}

pub fn arrow(params: Vec<Param>, body: Vec<Stmt>, ret: Type) -> Expr {
    let func = FunctionExpr {
        params,
        body: FunctionBody::Block(body),
        arrow: true,
        return_type: ret.clone(),
    };
    expr(ExprKind::Function(Box::new(func)), Type::function(ret))
}

pub fn arrow_expr(params: Vec<Param>, body: Expr) -> Expr {
    let ret = body.ty.clone();
    let func = FunctionExpr {
        params,
        body: FunctionBody::Expr(Box::new(body)),
        arrow: true,
        return_type: ret.clone(),
    };
    expr(ExprKind::Function(Box::new(func)), Type::function(ret))
}

pub fn function_expr(params: Vec<Param>, body: Vec<Stmt>, ret: Type) -> Expr {
    let func = FunctionExpr {
        params,
        body: FunctionBody::Block(body),
        arrow: false,
        return_type: ret.clone(),
    };
    expr(ExprKind::Function(Box::new(func)), Type::function(ret))
}

pub fn unary(op: UnaryOp, arg: Expr) -> Expr {
    let ty = match op {
        UnaryOp::Not => Type::Boolean,
        UnaryOp::Minus => Type::Number,
        UnaryOp::TypeOf => Type::String,
        UnaryOp::Void => Type::Undefined,
    };
    expr(
        ExprKind::Unary {
            op,
            arg: Box::new(arg),
        },
        ty,
    )
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let ty = match op {
        BinaryOp::Add => {
            if left.ty.is_kind(super::types::ValueKind::String)
                || right.ty.is_kind(super::types::ValueKind::String)
            {
                Type::String
            } else {
                Type::Number
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Type::Number,
        _ => Type::Boolean,
    };
    expr(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn strict_eq(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::StrictEq, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Lt, left, right)
}

pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let ty = if left.ty == right.ty {
        left.ty.clone()
    } else {
        Type::Union(vec![left.ty.clone(), right.ty.clone()])
    };
    expr(
        ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    let ty = value.ty.clone();
    expr(
        ExprKind::Assign {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        },
        ty,
    )
}

pub fn compound(op: BinaryOp, target: Expr, value: Expr) -> Expr {
    let ty = target.ty.clone();
    expr(
        ExprKind::Assign {
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
        },
        ty,
    )
}

pub fn update(op: UpdateOp, prefix: bool, target: Expr) -> Expr {
    expr(
        ExprKind::Update {
            op,
            prefix,
            target: Box::new(target),
        },
        Type::Number,
    )
}

pub fn cond(test: Expr, then: Expr, otherwise: Expr) -> Expr {
    let ty = then.ty.clone();
    expr(
        ExprKind::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        ty,
    )
}

/// A call whose result type is taken from the callee's function type.
pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    let ty = callee.ty.return_type();
    call_typed(callee, args, ty)
}

pub fn call_typed(callee: Expr, args: Vec<Expr>, ty: Type) -> Expr {
    expr(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        ty,
    )
}

pub fn new_expr(callee: Expr, args: Vec<Expr>, ty: Type) -> Expr {
    expr(
        ExprKind::New {
            callee: Box::new(callee),
            args,
        },
        ty,
    )
}

pub fn super_call(args: Vec<Expr>) -> Expr {
    expr(ExprKind::SuperCall(args), Type::Undefined)
}

pub fn member(object: Expr, property: &str, ty: Type) -> Expr {
    expr(
        ExprKind::Member {
            object: Box::new(object),
            property: property.to_string(),
        },
        ty,
    )
}

pub fn index(object: Expr, idx: Expr, ty: Type) -> Expr {
    expr(
        ExprKind::Index {
            object: Box::new(object),
            index: Box::new(idx),
        },
        ty,
    )
}

/// `object.method(args)` with an explicit result type.
pub fn method_call(object: Expr, method: &str, args: Vec<Expr>, ty: Type) -> Expr {
    let callee = member(object, method, Type::function(ty.clone()));
    call_typed(callee, args, ty)
}

// ───────────────────────────── Statements ─────────────────────────────

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

fn decl(kind: DeclKind, name: &str, init: Option<Expr>) -> Stmt {
    decl_pattern(kind, Pattern::Ident(name.to_string()), init)
}

fn decl_pattern(kind: DeclKind, target: Pattern, init: Option<Expr>) -> Stmt {
    stmt(StmtKind::Var {
        kind,
        decls: vec![Declarator {
            target,
            init,
            span: Span::default(),
        }],
    })
}

/// `const <pattern> = init`
pub fn const_pattern(target: Pattern, init: Expr) -> Stmt {
    decl_pattern(DeclKind::Const, target, Some(init))
}

/// `let <pattern> = init`
pub fn let_pattern(target: Pattern, init: Expr) -> Stmt {
    decl_pattern(DeclKind::Let, target, Some(init))
}

pub fn let_(name: &str, init: Expr) -> Stmt {
    decl(DeclKind::Let, name, Some(init))
}

pub fn let_uninit(name: &str) -> Stmt {
    decl(DeclKind::Let, name, None)
}

pub fn const_(name: &str, init: Expr) -> Stmt {
    decl(DeclKind::Const, name, Some(init))
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return(Some(value)))
}

pub fn ret_void() -> Stmt {
    stmt(StmtKind::Return(None))
}

pub fn if_(test: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
    stmt(StmtKind::If {
        test,
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    })
}

pub fn block(body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(body))
}

pub fn for_(init: Option<Stmt>, test: Option<Expr>, update: Option<Expr>, body: Stmt) -> Stmt {
    stmt(StmtKind::For {
        init: init.map(Box::new),
        test,
        update,
        body: Box::new(body),
    })
}

pub fn for_of(name: &str, iterable: Expr, body: Stmt) -> Stmt {
    stmt(StmtKind::ForOf {
        name: name.to_string(),
        iterable,
        body: Box::new(body),
    })
}

pub fn while_(test: Expr, body: Stmt) -> Stmt {
    stmt(StmtKind::While {
        test,
        body: Box::new(body),
    })
}

pub fn do_while(body: Stmt, test: Expr) -> Stmt {
    stmt(StmtKind::DoWhile {
        body: Box::new(body),
        test,
    })
}

pub fn break_(label: Option<&str>) -> Stmt {
    stmt(StmtKind::Break(label.map(str::to_string)))
}

pub fn continue_(label: Option<&str>) -> Stmt {
    stmt(StmtKind::Continue(label.map(str::to_string)))
}

pub fn labeled(label: &str, body: Stmt) -> Stmt {
    stmt(StmtKind::Labeled {
        label: label.to_string(),
        body: Box::new(body),
    })
}

pub fn throw(value: Expr) -> Stmt {
    stmt(StmtKind::Throw(value))
}

pub fn try_catch(block: Vec<Stmt>, param: Option<&str>, handler: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        block,
        handler: Some(CatchClause {
            param: param.map(str::to_string),
            body: handler,
        }),
        finalizer: None,
    })
}

pub fn try_finally(block: Vec<Stmt>, finalizer: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        block,
        handler: None,
        finalizer: Some(finalizer),
    })
}

pub fn try_full(
    block: Vec<Stmt>,
    param: Option<&str>,
    handler: Vec<Stmt>,
    finalizer: Vec<Stmt>,
) -> Stmt {
    stmt(StmtKind::Try {
        block,
        handler: Some(CatchClause {
            param: param.map(str::to_string),
            body: handler,
        }),
        finalizer: Some(finalizer),
    })
}

pub fn switch(discriminant: Expr, cases: Vec<(Option<Expr>, Vec<Stmt>)>) -> Stmt {
    stmt(StmtKind::Switch {
        discriminant,
        cases: cases
            .into_iter()
            .map(|(test, body)| SwitchCase { test, body })
            .collect(),
    })
}

pub fn function(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        params,
        body,
        return_type: ret,
        exported: false,
        span: Span::default(),
    }
}

pub fn export(mut func: FunctionDecl) -> FunctionDecl {
    func.exported = true;
    func
}

pub fn function_stmt(func: FunctionDecl) -> Stmt {
    let span = func.span;
    Stmt {
        kind: StmtKind::Function(func),
        span,
    }
}

pub fn class_stmt(class: ClassDecl) -> Stmt {
    let span = class.span;
    Stmt {
        kind: StmtKind::Class(class),
        span,
    }
}

// ───────────────────────────── Classes ─────────────────────────────

pub fn class(name: &str, extends: Option<Expr>, members: Vec<ClassMember>) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        extends,
        smart_contract: false,
        is_abstract: false,
        exported: false,
        constructor: None,
        members,
        span: Span::default(),
    }
}

pub fn contract(name: &str, members: Vec<ClassMember>) -> ClassDecl {
    ClassDecl {
        smart_contract: true,
        exported: true,
        ..class(name, None, members)
    }
}

impl ClassDecl {
    pub fn with_constructor(mut self, params: Vec<Param>, body: Vec<Stmt>) -> ClassDecl {
        self.constructor = Some(Constructor {
            params,
            body,
            span: Span::default(),
        });
        self
    }

    pub fn extending(mut self, base: Expr) -> ClassDecl {
        self.extends = Some(base);
        self
    }

    pub fn abstract_(mut self) -> ClassDecl {
        self.is_abstract = true;
        self
    }
}

fn member_of(name: &str, kind: MemberKind) -> ClassMember {
    ClassMember {
        name: name.to_string(),
        visibility: Visibility::Public,
        is_static: false,
        kind,
        span: Span::default(),
    }
}

pub fn method(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> ClassMember {
    member_of(
        name,
        MemberKind::Method {
            params,
            body,
            return_type: ret,
            verify: false,
        },
    )
}

pub fn verify_method(name: &str, body: Vec<Stmt>) -> ClassMember {
    member_of(
        name,
        MemberKind::Method {
            params: Vec::new(),
            body,
            return_type: Type::Boolean,
            verify: true,
        },
    )
}

pub fn getter(name: &str, ret: Type, body: Vec<Stmt>) -> ClassMember {
    member_of(
        name,
        MemberKind::Getter {
            body,
            return_type: ret,
        },
    )
}

pub fn setter(name: &str, param: Param, body: Vec<Stmt>) -> ClassMember {
    member_of(name, MemberKind::Setter { param, body })
}

pub fn property(name: &str, ty: Type, init: Option<Expr>) -> ClassMember {
    member_of(
        name,
        MemberKind::Property {
            ty,
            init,
            readonly: false,
        },
    )
}

pub fn readonly_property(name: &str, ty: Type, init: Option<Expr>) -> ClassMember {
    member_of(
        name,
        MemberKind::Property {
            ty,
            init,
            readonly: true,
        },
    )
}

impl ClassMember {
    pub fn private(mut self) -> ClassMember {
        self.visibility = Visibility::Private;
        self
    }

    pub fn static_(mut self) -> ClassMember {
        self.is_static = true;
        self
    }
}

pub fn module(name: &str, body: Vec<Stmt>) -> Module {
    Module {
        name: name.to_string(),
        body,
    }
}
