//! Classes.
//!
//! A class value is a function object whose `call` is the constructor and
//! whose `prototype` property holds the methods and accessors shared by its
//! instances. Instances link to that prototype internally, and a derived
//! prototype links to its base prototype the same way.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bytecode::{CompileError, Op};
use crate::compile::builtins::emit_error;
use crate::compile::ctx::{CResult, ClassFrame, Ctx};
use crate::compile::diagnostic::DiagnosticCode;
use crate::compile::expr::{emit_args, emit_value, is_global};
use crate::compile::function::{BodyRef, emit_closure, emit_closure_with};
use crate::compile::helpers::Helper;
use crate::compile::helpers::map::new_map;
use crate::compile::helpers::object::{PROTOTYPE, define_accessor, define_data, define_internal};
use crate::compile::helpers::types::push_undefined;
use crate::lang::node::{ClassDecl, ClassMember, Expr, MemberKind, Param};
use crate::lang::{Span, Stmt};

/// Getter and setter bodies of one accessor name.
type AccessorPair<'a> = (Option<&'a [Stmt]>, Option<(&'a Param, &'a [Stmt])>);

/// ( -- w(class) )
pub fn emit_class(ctx: &mut Ctx, decl: &ClassDecl) -> CResult {
    debug!(class = %decl.name, derived = decl.extends.is_some(), "class");
    let fields = decl
        .members
        .iter()
        .filter(|m| !m.is_static)
        .filter_map(|m| match &m.kind {
            MemberKind::Property { init, .. } => Some((m.name.clone(), init.clone())),
            _ => None,
        })
        .collect();
    ctx.classes.push(ClassFrame {
        name: decl.name.clone(),
        extends: decl.extends.clone(),
        smart_contract: decl.smart_contract,
        fields,
    });
    let result = emit_class_body(ctx, decl);
    ctx.classes.pop();
    result
}

fn emit_class_body(ctx: &mut Ctx, decl: &ClassDecl) -> CResult {
    // proto
    match &decl.extends {
        Some(base) => {
            emit_value(ctx, base)?;
            ctx.em.push_str(PROTOTYPE);
            ctx.helpers(&[Helper::FindObjectProperty, Helper::NewObjectWithProto])?;
        }
        None => ctx.helper(Helper::NewObject)?,
    }
    emit_members(ctx, decl.members.iter().filter(|m| !m.is_static))?;

    // proto cw
    let derived = decl.extends.is_some();
    match &decl.constructor {
        Some(ctor) => {
            ctx.em.set_span(ctor.span);
            emit_closure_with(
                ctx,
                &ctor.params,
                BodyRef::Block(&ctor.body),
                false,
                &mut |ctx| if derived { Ok(()) } else { emit_field_inits(ctx) },
            )?;
        }
        None if derived => {
            emit_closure_with(ctx, &[], BodyRef::Block(&[]), false, &mut |ctx| {
                ctx.em.emit(Op::Dup);
                invoke_base(ctx)?;
                emit_field_inits(ctx)
            })?;
        }
        None => {
            emit_closure_with(ctx, &[], BodyRef::Block(&[]), false, &mut emit_field_inits)?;
        }
    }
    ctx.helper(Helper::FunctionObject)?;
    if let Some(base) = &decl.extends {
        // Statics are inherited through the constructor's own link.
        emit_value(ctx, base)?;
        define_internal(ctx, PROTOTYPE);
    }
    emit_members(ctx, decl.members.iter().filter(|m| m.is_static))?;

    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    define_data(ctx, "constructor");
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Swap);
    define_data(ctx, PROTOTYPE);
    Ok(())
}

/// ( w(object) -- w(object) ) define methods, accessors and, for statics,
/// initialized properties
fn emit_members<'a>(
    ctx: &mut Ctx,
    members: impl Iterator<Item = &'a ClassMember>,
) -> CResult {
    let mut accessors: BTreeMap<&str, AccessorPair> = BTreeMap::new();
    for member in members {
        ctx.em.set_span(member.span);
        match &member.kind {
            MemberKind::Method { params, body, .. } => {
                emit_closure(ctx, params, BodyRef::Block(body), false)?;
                ctx.helper(Helper::FunctionObject)?;
                define_data(ctx, &member.name);
            }
            MemberKind::Getter { body, .. } => {
                accessors.entry(member.name.as_str()).or_default().0 = Some(body);
            }
            MemberKind::Setter { param, body } => {
                accessors.entry(member.name.as_str()).or_default().1 = Some((param, body));
            }
            MemberKind::Property { init, .. } if member.is_static => {
                match init {
                    Some(init) => emit_value(ctx, init)?,
                    None => push_undefined(ctx),
                }
                define_data(ctx, &member.name);
            }
            MemberKind::Property { .. } => {}
        }
    }
    for (name, (get, set)) in accessors {
        match get {
            Some(body) => emit_closure(ctx, &[], BodyRef::Block(body), false)?,
            None => ctx.em.push_null(),
        }
        match set {
            Some((param, body)) => {
                emit_closure(ctx, std::slice::from_ref(param), BodyRef::Block(body), false)?
            }
            None => ctx.em.push_null(),
        }
        define_accessor(ctx, name);
    }
    Ok(())
}

/// ( -- ) instance fields. Smart contract properties live in storage and
/// are initialized on deploy instead.
fn emit_field_inits(ctx: &mut Ctx) -> CResult {
    let Some(frame) = ctx.class().cloned() else {
        return Ok(());
    };
    if frame.smart_contract {
        return Ok(());
    }
    for (name, init) in &frame.fields {
        ctx.helper(Helper::PushThis)?;
        match init {
            Some(init) => emit_value(ctx, init)?,
            None => push_undefined(ctx),
        }
        define_data(ctx, name);
        ctx.em.emit(Op::Drop);
    }
    Ok(())
}

/// ( args -- ) run the base constructor on the current `this`
fn invoke_base(ctx: &mut Ctx) -> CResult {
    let base = ctx
        .class()
        .and_then(|c| c.extends.clone())
        .ok_or_else(|| CompileError::internal("no base class"))?;
    emit_value(ctx, &base)?;
    ctx.helper(Helper::GetCallable)?;
    ctx.helper(Helper::PushThis)?;
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);
    Ok(())
}

/// ( -- ) `super(args)`, followed by the derived class's field initializers
pub fn emit_super_call(ctx: &mut Ctx, args: &[Expr], span: Span) -> CResult {
    if ctx.class().and_then(|c| c.extends.as_ref()).is_none() {
        return ctx.error(
            DiagnosticCode::UnsupportedSyntax,
            span,
            "super() outside of a derived class constructor",
            0,
        );
    }
    emit_args(ctx, args)?;
    invoke_base(ctx)?;
    emit_field_inits(ctx)
}

/// ( -- w ) `new callee(args)`
pub fn emit_new(ctx: &mut Ctx, callee: &Expr, args: &[Expr], span: Span) -> CResult {
    if is_global(ctx, callee, "Map") {
        if !args.is_empty() {
            return ctx.error(
                DiagnosticCode::UnsupportedSyntax,
                span,
                "new Map() takes no arguments",
                0,
            );
        }
        new_map(ctx);
        return Ok(());
    }
    if is_global(ctx, callee, "Error") {
        return emit_error(ctx, args, span);
    }

    // cw obj args
    emit_value(ctx, callee)?;
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(PROTOTYPE);
    ctx.helpers(&[Helper::FindObjectProperty, Helper::NewObjectWithProto])?;
    emit_args(ctx, args)?;
    ctx.em.emit(Op::Rot);
    ctx.helper(Helper::GetCallable)?;
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compile::driver::tests::run_module;
    use crate::lang::build::*;
    use crate::lang::node::BinaryOp;
    use crate::lang::types::Type;
    use crate::runtime::StackItem;

    fn num_member(obj: crate::lang::Expr, name: &str) -> crate::lang::Expr {
        member(obj, name, Type::Number)
    }

    fn main_returning(value: crate::lang::Expr) -> crate::lang::Stmt {
        function_stmt(export(function("main", vec![], Type::Unknown, vec![ret(value)])))
    }

    #[test]
    fn test_fields_constructor_and_methods() {
        // class Point { x = 1; constructor(y) { this.y = y; } sum() { return this.x + this.y; } }
        let point = class(
            "Point",
            None,
            vec![
                property("x", Type::Number, Some(num(1))),
                method(
                    "sum",
                    vec![],
                    Type::Number,
                    vec![ret(add(
                        num_member(this(Type::Object), "x"),
                        num_member(this(Type::Object), "y"),
                    ))],
                ),
            ],
        )
        .with_constructor(
            vec![param("y", Type::Number)],
            vec![expr_stmt(assign(
                num_member(this(Type::Object), "y"),
                ident("y", Type::Number),
            ))],
        );
        let created = new_expr(
            ident("Point", Type::Class("Point".into())),
            vec![num(41)],
            Type::Object,
        );
        let m = module(
            "m",
            vec![
                class_stmt(point),
                main_returning(method_call(created, "sum", vec![], Type::Number)),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(42));
    }

    #[test]
    fn test_derived_class_runs_fields_after_super() {
        // class A { constructor(v) { this.v = v; } get double() { return this.v * 2; } }
        // class B extends A { bonus = 1; constructor() { super(20); } total() { return this.double + this.bonus; } }
        let a = class(
            "A",
            None,
            vec![getter(
                "double",
                Type::Number,
                vec![ret(binary(
                    BinaryOp::Mul,
                    num_member(this(Type::Object), "v"),
                    num(2),
                ))],
            )],
        )
        .with_constructor(
            vec![param("v", Type::Number)],
            vec![expr_stmt(assign(
                num_member(this(Type::Object), "v"),
                ident("v", Type::Number),
            ))],
        );
        let b = class(
            "B",
            Some(ident("A", Type::Class("A".into()))),
            vec![
                property("bonus", Type::Number, Some(num(1))),
                method(
                    "total",
                    vec![],
                    Type::Number,
                    vec![ret(add(
                        num_member(this(Type::Object), "double"),
                        num_member(this(Type::Object), "bonus"),
                    ))],
                ),
            ],
        )
        .with_constructor(vec![], vec![expr_stmt(super_call(vec![num(20)]))]);
        let created = new_expr(ident("B", Type::Class("B".into())), vec![], Type::Object);
        let m = module(
            "m",
            vec![
                class_stmt(a),
                class_stmt(b),
                main_returning(method_call(created, "total", vec![], Type::Number)),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(41));
    }

    #[test]
    fn test_instanceof_follows_the_prototype_chain() {
        let base = class("Base", None, vec![]);
        let derived = class("Derived", Some(ident("Base", Type::Class("Base".into()))), vec![]);
        let created = new_expr(ident("Derived", Type::Class("Derived".into())), vec![], Type::Object);
        let m = module(
            "m",
            vec![
                class_stmt(base),
                class_stmt(derived),
                main_returning(binary(
                    BinaryOp::InstanceOf,
                    created,
                    ident("Base", Type::Class("Base".into())),
                )),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Boolean(true));
    }

    #[test]
    fn test_static_methods_live_on_the_class() {
        let util = class(
            "Util",
            None,
            vec![method(
                "twice",
                vec![param("x", Type::Number)],
                Type::Number,
                vec![ret(binary(BinaryOp::Mul, ident("x", Type::Number), num(2)))],
            )
            .static_()],
        );
        let m = module(
            "m",
            vec![
                class_stmt(util),
                main_returning(method_call(
                    ident("Util", Type::Class("Util".into())),
                    "twice",
                    vec![num(4)],
                    Type::Number,
                )),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(8));
    }
}
