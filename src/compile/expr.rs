//! Expressions.
//!
//! An expression emitted with `push_value` leaves exactly one wrapped value;
//! without it, the stack is left as found. Operators pick their lowering
//! from the operand types the frontend resolved, and fall back to a runtime
//! dispatch on the tag only where the type allows several representations.

use tracing::trace;

use crate::bytecode::{CompileError, JumpKind, Op};
use crate::compile::builtins;
use crate::compile::class;
use crate::compile::ctx::{CResult, Ctx, StorageKind};
use crate::compile::diagnostic::DiagnosticCode;
use crate::compile::function::{self, BodyRef};
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::emit_if;
use crate::compile::helpers::object::{define_accessor, define_data};
use crate::compile::helpers::storage;
use crate::compile::helpers::types::{push_undefined, type_of_name, unwrap, unwrap_pair, wrap};
use crate::compile::options::EmitOptions;
use crate::compile::scope::{load_slot, store_slot};
use crate::lang::node::{
    BinaryOp, Expr, ExprKind, LogicalOp, ObjectProp, PropKind, UnaryOp, UpdateOp,
};
use crate::lang::{Span, Type, ValueKind};

/// Names resolved by the compiler itself when no binding shadows them.
/// They are only meaningful as a callee or the object of a member access.
pub const GLOBALS: &[&str] = &[
    "Blockchain",
    "console",
    "Error",
    "Map",
    "notify",
    "checkWitness",
    "SmartContract",
];

pub fn emit_value(ctx: &mut Ctx, e: &Expr) -> CResult {
    emit_expr(ctx, e, EmitOptions::VALUE)
}

pub fn emit_expr(ctx: &mut Ctx, e: &Expr, opts: EmitOptions) -> CResult {
    ctx.em.set_span(e.span);
    match &e.kind {
        ExprKind::Assign { op, target, value } => {
            return emit_assign(ctx, *op, target, value, e, opts);
        }
        ExprKind::Update { op, prefix, target } => {
            return emit_update(ctx, *op, *prefix, target, opts);
        }
        ExprKind::SuperCall(args) => {
            class::emit_super_call(ctx, args, e.span)?;
            if opts.push_value {
                push_undefined(ctx);
            }
            return Ok(());
        }
        _ => {}
    }
    emit_pushing(ctx, e)?;
    if !opts.push_value && ctx.em.depth().is_some() {
        ctx.em.emit(Op::Drop);
    }
    Ok(())
}

/// The kind `ty` always has at runtime, if it has exactly one.
pub fn kind_of(ty: &Type) -> Option<ValueKind> {
    ty.single_kind().ok()
}

/// True when `name` refers to a compiler global at this point.
pub fn is_global(ctx: &Ctx, e: &Expr, name: &str) -> bool {
    match &e.kind {
        ExprKind::Ident(n) => n == name && ctx.scopes.lookup(n).is_none(),
        _ => false,
    }
}

fn emit_pushing(ctx: &mut Ctx, e: &Expr) -> CResult {
    match &e.kind {
        ExprKind::Number(n) => {
            ctx.em.push_int(*n);
            wrap(ctx, ValueKind::Number);
        }
        ExprKind::Str(s) => {
            ctx.em.push_str(s);
            wrap(ctx, ValueKind::String);
        }
        ExprKind::Bool(b) => {
            ctx.em.push_bool(*b);
            wrap(ctx, ValueKind::Boolean);
        }
        ExprKind::Null => ctx.helper(Helper::PushNullValue)?,
        ExprKind::Undefined => push_undefined(ctx),
        ExprKind::Ident(name) => emit_ident(ctx, name, e.span)?,
        ExprKind::This => ctx.helper(Helper::PushThis)?,
        ExprKind::Array(items) => {
            for item in items {
                emit_value(ctx, item)?;
            }
            ctx.helper(Helper::PackArgs(items.len()))?;
            wrap(ctx, ValueKind::Array);
        }
        ExprKind::Object(props) => emit_object(ctx, props)?,
        ExprKind::Function(f) => {
            let body = BodyRef::from(&f.body);
            function::emit_closure(ctx, &f.params, body, f.arrow)?;
            ctx.helper(Helper::FunctionObject)?;
        }
        ExprKind::Unary { op, arg } => emit_unary(ctx, *op, arg)?,
        ExprKind::Binary { op, left, right } => emit_binary(ctx, *op, left, right, e)?,
        ExprKind::Logical { op, left, right } => emit_logical(ctx, *op, left, right)?,
        ExprKind::Conditional {
            test,
            then,
            otherwise,
        } => {
            emit_value(ctx, test)?;
            ctx.helper(Helper::ToBoolean(kind_of(&test.ty)))?;
            emit_if(
                ctx,
                &mut |ctx| emit_value(ctx, then),
                Some(&mut |ctx| emit_value(ctx, otherwise)),
            )?;
        }
        ExprKind::Call { callee, args } => emit_call(ctx, callee, args, e)?,
        ExprKind::New { callee, args } => class::emit_new(ctx, callee, args, e.span)?,
        ExprKind::Member { object, property } => emit_member(ctx, object, property, e.span)?,
        ExprKind::Index { object, index } => emit_index(ctx, object, index, e.span)?,
        ExprKind::Assign { .. } | ExprKind::Update { .. } | ExprKind::SuperCall(_) => {
            emit_expr(ctx, e, EmitOptions::VALUE)?;
        }
    }
    Ok(())
}

// =============================================================================
// Names
// =============================================================================

/// ( -- w ) a bound name, faulting while it is still uninitialized
pub fn load_binding(ctx: &mut Ctx, name: &str, frame: usize, slot: usize) -> CResult {
    let ok = ctx.em.new_label();
    load_slot(ctx, frame, slot);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::IsNull);
    ctx.em.jump(JumpKind::IfFalse, ok);
    ctx.em.emit(Op::Drop);
    ctx.helper(Helper::ThrowTypeError(format!(
        "'{}' is used before its initialization",
        name
    )))?;
    ctx.em.mark(ok);
    Ok(())
}

fn emit_ident(ctx: &mut Ctx, name: &str, span: Span) -> CResult {
    if let Some((frame, slot)) = ctx.scopes.lookup(name) {
        return load_binding(ctx, name, frame, slot);
    }
    if name == "undefined" {
        push_undefined(ctx);
        return Ok(());
    }
    if GLOBALS.contains(&name) {
        return ctx.error(
            DiagnosticCode::UnsupportedSyntax,
            span,
            format!("'{}' can only be called or have its members read", name),
            0,
        );
    }
    ctx.error(
        DiagnosticCode::UnresolvedReference,
        span,
        format!("'{}' is not defined", name),
        0,
    )
}

// =============================================================================
// Literals
// =============================================================================

fn emit_object(ctx: &mut Ctx, props: &[ObjectProp]) -> CResult {
    ctx.helper(Helper::NewObject)?;
    let mut done_accessors: Vec<&str> = Vec::new();
    for prop in props {
        ctx.em.set_span(prop.span);
        match &prop.kind {
            PropKind::Value(value) => {
                emit_value(ctx, value)?;
                define_data(ctx, &prop.key);
            }
            PropKind::Method(f) => {
                function::emit_closure(ctx, &f.params, BodyRef::from(&f.body), f.arrow)?;
                ctx.helper(Helper::FunctionObject)?;
                define_data(ctx, &prop.key);
            }
            PropKind::Getter(_) | PropKind::Setter(_, _) => {
                if done_accessors.contains(&prop.key.as_str()) {
                    continue;
                }
                done_accessors.push(&prop.key);
                let getter = props.iter().find_map(|p| match &p.kind {
                    PropKind::Getter(body) if p.key == prop.key => Some(body),
                    _ => None,
                });
                let setter = props.iter().find_map(|p| match &p.kind {
                    PropKind::Setter(param, body) if p.key == prop.key => Some((param, body)),
                    _ => None,
                });
                match getter {
                    Some(body) => function::emit_closure(ctx, &[], BodyRef::Block(body), false)?,
                    None => ctx.em.push_null(),
                }
                match setter {
                    Some((param, body)) => function::emit_closure(
                        ctx,
                        std::slice::from_ref(param),
                        BodyRef::Block(body),
                        false,
                    )?,
                    None => ctx.em.push_null(),
                }
                define_accessor(ctx, &prop.key);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Operators
// =============================================================================

fn emit_unary(ctx: &mut Ctx, op: UnaryOp, arg: &Expr) -> CResult {
    match op {
        UnaryOp::Not => {
            emit_value(ctx, arg)?;
            ctx.helper(Helper::ToBoolean(kind_of(&arg.ty)))?;
            ctx.em.emit(Op::Not);
            wrap(ctx, ValueKind::Boolean);
        }
        UnaryOp::Minus => {
            emit_value(ctx, arg)?;
            if numeric_operands(ctx, &[&arg.ty], arg.span)? {
                unwrap(ctx);
                ctx.em.emit(Op::Negate);
                wrap(ctx, ValueKind::Number);
            }
        }
        UnaryOp::TypeOf => {
            let name = match &arg.ty {
                Type::Function(_) | Type::Class(_) => Some("function"),
                ty => kind_of(ty)
                    .filter(|k| *k != ValueKind::Object)
                    .map(type_of_name),
            };
            match name {
                Some(name) => {
                    emit_expr(ctx, arg, EmitOptions::EFFECT)?;
                    ctx.em.push_str(name);
                    wrap(ctx, ValueKind::String);
                }
                None => {
                    emit_value(ctx, arg)?;
                    ctx.helper(Helper::TypeOf)?;
                }
            }
        }
        UnaryOp::Void => {
            emit_expr(ctx, arg, EmitOptions::EFFECT)?;
            push_undefined(ctx);
        }
    }
    Ok(())
}

/// Check operands that must be numbers. On failure a diagnostic is
/// recorded, the operands are consumed and `false` is returned.
fn numeric_operands(ctx: &mut Ctx, types: &[&Type], span: Span) -> Result<bool, CompileError> {
    for ty in types {
        match ty.single_kind() {
            Ok(ValueKind::Number) => {}
            Ok(kind) => {
                ctx.error(
                    DiagnosticCode::UnsupportedSyntax,
                    span,
                    format!("arithmetic on a value of type {}", kind),
                    types.len(),
                )?;
                return Ok(false);
            }
            Err(ambiguous) => {
                ctx.error(
                    DiagnosticCode::AmbiguousType,
                    span,
                    ambiguous.to_string(),
                    types.len(),
                )?;
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn is_nullish_literal(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Null | ExprKind::Undefined)
        || matches!(&e.kind, ExprKind::Ident(n) if n == "undefined")
}

fn emit_binary(ctx: &mut Ctx, op: BinaryOp, left: &Expr, right: &Expr, e: &Expr) -> CResult {
    match op {
        BinaryOp::InstanceOf if is_global(ctx, right, "Error") => {
            emit_value(ctx, left)?;
            ctx.helper(Helper::TypeTag)?;
            ctx.em.push_int(ValueKind::Error.tag());
            ctx.em.emit(Op::NumEqual);
            wrap(ctx, ValueKind::Boolean);
        }
        BinaryOp::InstanceOf => {
            emit_value(ctx, left)?;
            emit_value(ctx, right)?;
            ctx.helper(Helper::InstanceOf)?;
        }
        BinaryOp::In => {
            emit_value(ctx, left)?;
            emit_value(ctx, right)?;
            ctx.helper(Helper::HasOwnProperty)?;
        }
        BinaryOp::Eq | BinaryOp::Ne if is_nullish_literal(left) || is_nullish_literal(right) => {
            let other = if is_nullish_literal(left) { right } else { left };
            emit_value(ctx, other)?;
            ctx.helper(Helper::TypeTag)?;
            ctx.em.push_int(ValueKind::Null.tag());
            ctx.em.emit(Op::Le);
            if op == BinaryOp::Ne {
                ctx.em.emit(Op::Not);
            }
            wrap(ctx, ValueKind::Boolean);
        }
        _ => {
            emit_value(ctx, left)?;
            emit_value(ctx, right)?;
            apply_binary(ctx, op, &left.ty, &right.ty, &e.ty, e.span)?;
        }
    }
    Ok(())
}

/// ( lw rw -- w ) the operators that need no special evaluation order
pub fn apply_binary(
    ctx: &mut Ctx,
    op: BinaryOp,
    left: &Type,
    right: &Type,
    result: &Type,
    span: Span,
) -> CResult {
    trace!(?op, %left, %right, "binary");
    match op {
        BinaryOp::StrictEq | BinaryOp::Eq => {
            ctx.em.emit(Op::Equal);
            wrap(ctx, ValueKind::Boolean);
        }
        BinaryOp::StrictNe | BinaryOp::Ne => {
            ctx.em.emit(Op::Equal);
            ctx.em.emit(Op::Not);
            wrap(ctx, ValueKind::Boolean);
        }
        BinaryOp::Add
            if result.is_kind(ValueKind::String)
                || left.is_kind(ValueKind::String)
                || right.is_kind(ValueKind::String) =>
        {
            ctx.em.emit(Op::Swap);
            ctx.helper(Helper::ToRawString(kind_of(left)))?;
            ctx.em.emit(Op::Swap);
            ctx.helper(Helper::ToRawString(kind_of(right)))?;
            ctx.em.emit(Op::Cat);
            wrap(ctx, ValueKind::String);
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            if numeric_operands(ctx, &[left, right], span)? {
                unwrap_pair(ctx);
                ctx.em.emit(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    _ => Op::Mod,
                });
                wrap(ctx, ValueKind::Number);
            }
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            if numeric_operands(ctx, &[left, right], span)? {
                unwrap_pair(ctx);
                ctx.em.emit(match op {
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Le => Op::Le,
                    _ => Op::Ge,
                });
                wrap(ctx, ValueKind::Boolean);
            }
        }
        BinaryOp::InstanceOf | BinaryOp::In => {
            return ctx.error(
                DiagnosticCode::UnsupportedSyntax,
                span,
                "operator cannot be combined with assignment",
                2,
            );
        }
    }
    Ok(())
}

fn emit_logical(ctx: &mut Ctx, op: LogicalOp, left: &Expr, right: &Expr) -> CResult {
    let end = ctx.em.new_label();
    emit_value(ctx, left)?;
    ctx.em.emit(Op::Dup);
    match op {
        LogicalOp::And => {
            ctx.helper(Helper::ToBoolean(kind_of(&left.ty)))?;
            ctx.em.jump(JumpKind::IfFalse, end);
        }
        LogicalOp::Or => {
            ctx.helper(Helper::ToBoolean(kind_of(&left.ty)))?;
            ctx.em.jump(JumpKind::IfTrue, end);
        }
        LogicalOp::Nullish => {
            ctx.helper(Helper::TypeTag)?;
            ctx.em.push_int(ValueKind::Null.tag());
            ctx.em.emit(Op::Le);
            ctx.em.jump(JumpKind::IfFalse, end);
        }
    }
    ctx.em.emit(Op::Drop);
    emit_value(ctx, right)?;
    ctx.em.mark(end);
    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Contract whose storage `object.prop` reads, when `object` is `this`
/// inside a smart contract class.
pub fn storage_owner(ctx: &Ctx, object: &Expr) -> Option<String> {
    if !matches!(object.kind, ExprKind::This) {
        return None;
    }
    match &object.ty {
        Type::SmartContract(name) => Some(name.clone()),
        _ => ctx
            .class()
            .filter(|c| c.smart_contract)
            .map(|c| c.name.clone()),
    }
}

fn emit_member(ctx: &mut Ctx, object: &Expr, property: &str, span: Span) -> CResult {
    if is_global(ctx, object, "Blockchain") {
        return builtins::emit_blockchain_member(ctx, property, span);
    }
    if let Some(owner) = storage_owner(ctx, object) {
        if let Some(prop) = ctx.storage_prop(&owner, property) {
            match prop.kind {
                StorageKind::Common => storage::load_common(ctx, &prop.name)?,
                StorageKind::Map { key_parts } => {
                    storage::push_handle(ctx, ValueKind::MapStorage, &prop.name, key_parts)
                }
                StorageKind::Array => {
                    storage::push_handle(ctx, ValueKind::ArrayStorage, &prop.name, 0)
                }
            }
            return Ok(());
        }
    }
    emit_value(ctx, object)?;
    match object.ty.single_kind() {
        Ok(ValueKind::Object) => {
            ctx.em.push_str(property);
            ctx.helper(Helper::FindObjectProperty)
        }
        Ok(kind) => builtins::emit_builtin_member(ctx, kind, &object.ty, property, span),
        Err(_) if object.ty.may_be(ValueKind::Object) => {
            ctx.em.push_str(property);
            ctx.helper(Helper::FindObjectProperty)
        }
        Err(ambiguous) => ctx.error(DiagnosticCode::AmbiguousType, span, ambiguous.to_string(), 1),
    }
}

fn emit_index(ctx: &mut Ctx, object: &Expr, index: &Expr, span: Span) -> CResult {
    emit_value(ctx, object)?;
    emit_value(ctx, index)?;
    match object.ty.single_kind() {
        Ok(ValueKind::Array) => ctx.helper(Helper::ArrayGet),
        Ok(ValueKind::ArrayStorage) => storage::array_get(ctx),
        Ok(ValueKind::Object) => {
            unwrap(ctx);
            ctx.helper(Helper::FindObjectProperty)
        }
        Ok(kind) => ctx.error(
            DiagnosticCode::UnsupportedSyntax,
            span,
            format!("a value of type {} cannot be indexed", kind),
            2,
        ),
        Err(ambiguous) => ctx.error(DiagnosticCode::AmbiguousType, span, ambiguous.to_string(), 2),
    }
}

// =============================================================================
// Calls
// =============================================================================

/// ( -- args ) evaluate `args` left to right into an array
pub fn emit_args(ctx: &mut Ctx, args: &[Expr]) -> CResult {
    for arg in args {
        emit_value(ctx, arg)?;
    }
    ctx.helper(Helper::PackArgs(args.len()))
}

fn emit_call(ctx: &mut Ctx, callee: &Expr, args: &[Expr], e: &Expr) -> CResult {
    if builtins::try_emit_call(ctx, callee, args, e)? {
        return Ok(());
    }
    match &callee.kind {
        ExprKind::Member { object, property } if object.ty.may_be(ValueKind::Object) => {
            // obj fw args -> args obj callable
            emit_value(ctx, object)?;
            ctx.em.emit(Op::Dup);
            ctx.em.push_str(property);
            ctx.helper(Helper::FindObjectProperty)?;
            emit_args(ctx, args)?;
            ctx.em.emit(Op::Rot);
            ctx.em.emit(Op::Rot);
            ctx.helper(Helper::GetCallable)?;
        }
        _ => {
            // fw args -> args undefined callable
            emit_value(ctx, callee)?;
            emit_args(ctx, args)?;
            ctx.em.emit(Op::Swap);
            ctx.helper(Helper::GetCallable)?;
            push_undefined(ctx);
            ctx.em.emit(Op::Swap);
        }
    }
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])
}

// =============================================================================
// Assignment
// =============================================================================

/// Where an assignment writes. Places other than bindings and plain
/// storage properties keep two references on the stack while the value
/// is computed.
#[derive(Debug, Clone)]
enum Place {
    Binding { name: String, frame: usize, slot: usize },
    Common(String),
    /// w(object) key
    Property,
    /// w(array) w(index)
    Element,
    /// w(handle) w(index)
    StorageElement,
}

impl Place {
    fn refs(&self) -> usize {
        match self {
            Place::Binding { .. } | Place::Common(_) => 0,
            _ => 2,
        }
    }
}

/// ( -- refs ) or None after reporting an invalid target
fn prepare_place(ctx: &mut Ctx, target: &Expr) -> Result<Option<Place>, CompileError> {
    match &target.kind {
        ExprKind::Ident(name) => match ctx.scopes.lookup(name) {
            Some((frame, slot)) => Ok(Some(Place::Binding {
                name: name.clone(),
                frame,
                slot,
            })),
            None => {
                ctx.error(
                    DiagnosticCode::UnresolvedReference,
                    target.span,
                    format!("'{}' is not defined", name),
                    0,
                )?;
                Ok(None)
            }
        },
        ExprKind::Member { object, property } => {
            if let Some(owner) = storage_owner(ctx, object) {
                if let Some(prop) = ctx.storage_prop(&owner, property) {
                    if prop.kind != StorageKind::Common {
                        ctx.error(
                            DiagnosticCode::UnsupportedSyntax,
                            target.span,
                            format!("storage collection '{}' cannot be reassigned", property),
                            0,
                        )?;
                        return Ok(None);
                    }
                    return Ok(Some(Place::Common(prop.name)));
                }
            }
            if !object.ty.may_be(ValueKind::Object) {
                ctx.error(
                    DiagnosticCode::UnsupportedSyntax,
                    target.span,
                    format!("cannot assign to '{}' on a value of type {}", property, object.ty),
                    0,
                )?;
                return Ok(None);
            }
            emit_value(ctx, object)?;
            ctx.em.push_str(property);
            Ok(Some(Place::Property))
        }
        ExprKind::Index { object, index } => {
            let place = match object.ty.single_kind() {
                Ok(ValueKind::Array) => Place::Element,
                Ok(ValueKind::ArrayStorage) => Place::StorageElement,
                Ok(ValueKind::Object) => Place::Property,
                _ => {
                    ctx.error(
                        DiagnosticCode::UnsupportedSyntax,
                        target.span,
                        format!("cannot assign through an index on type {}", object.ty),
                        0,
                    )?;
                    return Ok(None);
                }
            };
            emit_value(ctx, object)?;
            emit_value(ctx, index)?;
            if matches!(place, Place::Property) {
                unwrap(ctx);
            }
            Ok(Some(place))
        }
        other => {
            ctx.error(
                DiagnosticCode::UnsupportedSyntax,
                target.span,
                format!("{} is not assignable", other.describe()),
                0,
            )?;
            Ok(None)
        }
    }
}

/// ( refs -- refs w )
fn read_place(ctx: &mut Ctx, place: &Place) -> CResult {
    if place.refs() == 2 {
        ctx.em.emit(Op::Over);
        ctx.em.emit(Op::Over);
    }
    match place {
        Place::Binding { name, frame, slot } => load_binding(ctx, name, *frame, *slot),
        Place::Common(name) => storage::load_common(ctx, name),
        Place::Property => ctx.helper(Helper::FindObjectProperty),
        Place::Element => ctx.helper(Helper::ArrayGet),
        Place::StorageElement => storage::array_get(ctx),
    }
}

/// ( refs w -- )
fn write_place(ctx: &mut Ctx, place: &Place) -> CResult {
    match place {
        Place::Binding { frame, slot, .. } => {
            store_slot(ctx, *frame, *slot);
            Ok(())
        }
        Place::Common(name) => storage::store_common(ctx, name),
        Place::Property => ctx.helper(Helper::SetObjectProperty),
        Place::Element => ctx.helper(Helper::ArraySet),
        Place::StorageElement => storage::array_set(ctx),
    }
}

/// ( refs w -- w refs w ) keep the value of the expression below the refs
fn stash(ctx: &mut Ctx, place: &Place) {
    match place.refs() {
        0 => ctx.em.emit(Op::Dup),
        n => {
            ctx.em.push_int(n as i64 + 1);
            ctx.em.emit(Op::XTuck);
        }
    }
}

fn emit_assign(
    ctx: &mut Ctx,
    op: Option<BinaryOp>,
    target: &Expr,
    value: &Expr,
    e: &Expr,
    opts: EmitOptions,
) -> CResult {
    let place = match prepare_place(ctx, target)? {
        Some(place) => place,
        None => return Ok(()),
    };
    match op {
        None => emit_value(ctx, value)?,
        Some(op) => {
            read_place(ctx, &place)?;
            emit_value(ctx, value)?;
            apply_binary(ctx, op, &target.ty, &value.ty, &e.ty, e.span)?;
        }
    }
    if opts.push_value {
        stash(ctx, &place);
    }
    write_place(ctx, &place)
}

fn emit_update(
    ctx: &mut Ctx,
    op: UpdateOp,
    prefix: bool,
    target: &Expr,
    opts: EmitOptions,
) -> CResult {
    let place = match prepare_place(ctx, target)? {
        Some(place) => place,
        None => return Ok(()),
    };
    read_place(ctx, &place)?;
    if !numeric_operands(ctx, &[&target.ty], target.span)? {
        return Ok(());
    }
    if opts.push_value && !prefix {
        stash(ctx, &place);
    }
    unwrap(ctx);
    ctx.em.emit(match op {
        UpdateOp::Inc => Op::Inc,
        UpdateOp::Dec => Op::Dec,
    });
    wrap(ctx, ValueKind::Number);
    if opts.push_value && prefix {
        stash(ctx, &place);
    }
    write_place(ctx, &place)
}

#[cfg(test)]
mod tests {
    use crate::compile::driver::tests::run_module;
    use crate::lang::build::*;
    use crate::lang::node::{BinaryOp, LogicalOp, UnaryOp, UpdateOp};
    use crate::lang::types::Type;
    use crate::lang::Stmt;
    use crate::runtime::StackItem;

    fn run_main(body: Vec<Stmt>) -> StackItem {
        let module = module(
            "m",
            vec![function_stmt(export(function("main", vec![], Type::Unknown, body)))],
        );
        run_module(&module, "main", vec![]).unwrap()
    }

    #[test]
    fn test_string_concatenation_converts_numbers() {
        let out = run_main(vec![ret(add(string("n="), num(42)))]);
        assert_eq!(out, StackItem::bytes("n=42"));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        let out = run_main(vec![ret(logical(LogicalOp::Or, num(0), string("fallback")))]);
        assert_eq!(out, StackItem::bytes("fallback"));

        let out = run_main(vec![ret(logical(LogicalOp::Nullish, null(), num(5)))]);
        assert_eq!(out, StackItem::Integer(5));
    }

    #[test]
    fn test_compound_assignment_on_array_element() {
        let xs = || ident("xs", Type::array(Type::Number));
        let out = run_main(vec![
            let_("xs", array(vec![num(1), num(2)], Type::Number)),
            expr_stmt(compound(BinaryOp::Add, index(xs(), num(1), Type::Number), num(40))),
            ret(index(xs(), num(1), Type::Number)),
        ]);
        assert_eq!(out, StackItem::Integer(42));
    }

    #[test]
    fn test_postfix_update_yields_old_value() {
        let out = run_main(vec![
            let_("i", num(1)),
            let_("old", update(UpdateOp::Inc, false, ident("i", Type::Number))),
            ret(add(
                binary(BinaryOp::Mul, ident("old", Type::Number), num(10)),
                ident("i", Type::Number),
            )),
        ]);
        assert_eq!(out, StackItem::Integer(12));
    }

    #[test]
    fn test_loose_equality_with_null_accepts_undefined() {
        let out = run_main(vec![ret(binary(BinaryOp::Eq, undefined(), null()))]);
        assert_eq!(out, StackItem::Boolean(true));
    }

    #[test]
    fn test_typeof_of_number_is_static() {
        let out = run_main(vec![ret(unary(UnaryOp::TypeOf, num(1)))]);
        assert_eq!(out, StackItem::bytes("number"));
    }
}
