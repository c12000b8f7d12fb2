//! Globals and the methods of built-in value kinds.
//!
//! Everything here is resolved statically from the receiver's type; a
//! builtin never goes through a property lookup at runtime.

use std::ops::RangeInclusive;

use crate::bytecode::{CompileError, JumpKind, Op, Syscall};
use crate::compile::contract::{unwrap_result, wrap_raw};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::diagnostic::DiagnosticCode;
use crate::compile::expr::{emit_value, is_global, kind_of};
use crate::compile::helpers::types::{push_undefined, unwrap, wrap};
use crate::compile::helpers::{Helper, array, iterator, map, storage};
use crate::compile::metadata::EventInfo;
use crate::lang::node::{Expr, ExprKind};
use crate::lang::{ContractInterface, Span, Type, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    ArrayPush,
    ArrayPop,
    ArrayMap,
    ArrayFilter,
    ArrayForEach,
    ArrayReduce,
    ArraySome,
    ArrayEvery,
    ArraySlice,
    ArrayIncludes,
    ArrayValues,
    BufferSlice,
    MapGet,
    MapSet,
    MapHas,
    MapDelete,
    MapForEach,
    MapKeys,
    MapValues,
    IteratorNext,
    StorageGet,
    StorageSet,
    StorageHas,
    StorageDelete,
    StorageForEach,
    StorageAt,
    StoragePush,
    StoragePop,
    StorageArrayForEach,
}

fn lookup(kind: ValueKind, name: &str) -> Option<(Method, RangeInclusive<usize>)> {
    use Method::*;
    let found = match (kind, name) {
        (ValueKind::Array, "push") => (ArrayPush, 1..=1),
        (ValueKind::Array, "pop") => (ArrayPop, 0..=0),
        (ValueKind::Array, "map") => (ArrayMap, 1..=1),
        (ValueKind::Array, "filter") => (ArrayFilter, 1..=1),
        (ValueKind::Array, "forEach") => (ArrayForEach, 1..=1),
        (ValueKind::Array, "reduce") => (ArrayReduce, 2..=2),
        (ValueKind::Array, "some") => (ArraySome, 1..=1),
        (ValueKind::Array, "every") => (ArrayEvery, 1..=1),
        (ValueKind::Array, "slice") => (ArraySlice, 0..=2),
        (ValueKind::Array, "includes") => (ArrayIncludes, 1..=1),
        (ValueKind::Array, "values") => (ArrayValues, 0..=0),
        (ValueKind::Buffer, "slice") => (BufferSlice, 0..=2),
        (ValueKind::Map, "get") => (MapGet, 1..=1),
        (ValueKind::Map, "set") => (MapSet, 2..=2),
        (ValueKind::Map, "has") => (MapHas, 1..=1),
        (ValueKind::Map, "delete") => (MapDelete, 1..=1),
        (ValueKind::Map, "forEach") => (MapForEach, 1..=1),
        (ValueKind::Map, "keys") => (MapKeys, 0..=0),
        (ValueKind::Map, "values") => (MapValues, 0..=0),
        (ValueKind::IterableIterator, "next") => (IteratorNext, 0..=0),
        (ValueKind::MapStorage, "get") => (StorageGet, 1..=1),
        (ValueKind::MapStorage, "set") => (StorageSet, 2..=2),
        (ValueKind::MapStorage, "has") => (StorageHas, 1..=1),
        (ValueKind::MapStorage, "delete") => (StorageDelete, 1..=1),
        (ValueKind::MapStorage, "forEach") => (StorageForEach, 1..=1),
        (ValueKind::MapStorage, "at") => (StorageAt, 1..=1),
        (ValueKind::ArrayStorage, "push") => (StoragePush, 1..=1),
        (ValueKind::ArrayStorage, "pop") => (StoragePop, 0..=0),
        (ValueKind::ArrayStorage, "forEach") => (StorageArrayForEach, 1..=1),
        _ => return None,
    };
    Some(found)
}

/// Key kind of a `Map` or `MapStorage` type.
fn key_kind(ctx: &mut Ctx, ty: &Type, span: Span) -> Result<Option<ValueKind>, CompileError> {
    let key = match ty {
        Type::Map(k, _) | Type::MapStorage(k, _) => k,
        _ => return Ok(Some(ValueKind::Undefined)),
    };
    match key.single_kind() {
        Ok(kind) => Ok(Some(kind)),
        Err(ambiguous) => {
            ctx.error(DiagnosticCode::AmbiguousType, span, ambiguous.to_string(), 0)?;
            Ok(None)
        }
    }
}

/// Emit a call that the compiler lowers itself. Returns false when the
/// callee is an ordinary function value.
pub fn try_emit_call(
    ctx: &mut Ctx,
    callee: &Expr,
    args: &[Expr],
    e: &Expr,
) -> Result<bool, CompileError> {
    match &callee.kind {
        ExprKind::Ident(name) if is_global(ctx, callee, name) => match name.as_str() {
            "notify" => emit_notify(ctx, args, e.span).map(|_| true),
            "checkWitness" => {
                if !arity(ctx, args, 1..=1, "checkWitness", e.span)? {
                    return Ok(true);
                }
                emit_value(ctx, &args[0])?;
                unwrap(ctx);
                ctx.em.emit(Op::Syscall(Syscall::CheckWitness));
                wrap(ctx, ValueKind::Boolean);
                Ok(true)
            }
            "Error" => {
                emit_error(ctx, args, e.span)?;
                Ok(true)
            }
            _ => Ok(false),
        },
        ExprKind::Member { object, property } => {
            if is_global(ctx, object, "console") {
                if property != "log" {
                    unknown_member(ctx, "console", property, e.span, 0)?;
                    return Ok(true);
                }
                emit_log(ctx, args)?;
                return Ok(true);
            }
            if is_global(ctx, object, "Blockchain") {
                emit_blockchain_call(ctx, property, args, e.span)?;
                return Ok(true);
            }
            if is_global(ctx, object, "SmartContract") {
                emit_contract_for(ctx, property, args, e)?;
                return Ok(true);
            }
            if let Type::Contract(iface) = &object.ty {
                emit_contract_method(ctx, iface, object, property, args, e.span)?;
                return Ok(true);
            }
            let kind = match object.ty.single_kind() {
                Ok(kind) => kind,
                Err(_) => return Ok(false),
            };
            let (method, range) = match lookup(kind, property) {
                Some(found) => found,
                None => return Ok(false),
            };
            if !arity(ctx, args, range, property, e.span)? {
                return Ok(true);
            }
            emit_method(ctx, method, object, args, e.span)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn arity(
    ctx: &mut Ctx,
    args: &[Expr],
    range: RangeInclusive<usize>,
    name: &str,
    span: Span,
) -> Result<bool, CompileError> {
    if range.contains(&args.len()) {
        return Ok(true);
    }
    ctx.error(
        DiagnosticCode::UnsupportedSyntax,
        span,
        format!(
            "'{}' expects {} to {} arguments, got {}",
            name,
            range.start(),
            range.end(),
            args.len()
        ),
        0,
    )?;
    Ok(false)
}

fn unknown_member(ctx: &mut Ctx, owner: &str, property: &str, span: Span, consumed: usize) -> CResult {
    ctx.error(
        DiagnosticCode::UnsupportedSyntax,
        span,
        format!("'{}' has no member '{}'", owner, property),
        consumed,
    )
}

fn emit_method(ctx: &mut Ctx, method: Method, object: &Expr, args: &[Expr], span: Span) -> CResult {
    use Method::*;
    let key = match method {
        MapForEach | MapKeys | StorageGet | StorageSet | StorageHas | StorageDelete
        | StorageForEach => match key_kind(ctx, &object.ty, span)? {
            Some(kind) => kind,
            None => return Ok(()),
        },
        _ => ValueKind::Undefined,
    };
    if method == StorageForEach && matches!(&object.ty, Type::MapStorage(k, _) if matches!(**k, Type::Tuple(_)))
    {
        return ctx.error(
            DiagnosticCode::UnsupportedSyntax,
            span,
            "forEach over a storage map with compound keys; fix the leading parts with at() first",
            0,
        );
    }

    emit_value(ctx, object)?;
    match method {
        ArraySlice | BufferSlice => {
            match args.first() {
                Some(start) => emit_value(ctx, start)?,
                None => {
                    ctx.em.push_int(0);
                    wrap(ctx, ValueKind::Number);
                }
            }
            match args.get(1) {
                Some(end) => emit_value(ctx, end)?,
                None => {
                    ctx.em.push_int(i64::MAX);
                    wrap(ctx, ValueKind::Number);
                }
            }
        }
        _ => {
            for arg in args {
                emit_value(ctx, arg)?;
            }
        }
    }

    match method {
        ArrayPush => array::push(ctx),
        ArrayPop => array::pop(ctx),
        ArrayMap => array::map(ctx)?,
        ArrayFilter => array::filter(ctx)?,
        ArrayForEach => array::for_each(ctx)?,
        ArrayReduce => array::reduce(ctx)?,
        ArraySome => array::some_or_every(ctx, true)?,
        ArrayEvery => array::some_or_every(ctx, false)?,
        ArraySlice => array::slice(ctx)?,
        ArrayIncludes => array::includes(ctx)?,
        ArrayValues => array::values(ctx)?,
        BufferSlice => ctx.helper(Helper::BufferSlice)?,
        MapGet => map::get(ctx),
        MapSet => map::set(ctx),
        MapHas => map::has(ctx),
        MapDelete => map::delete(ctx),
        MapForEach => map::for_each(ctx, key)?,
        MapKeys => map::keys(ctx, key)?,
        MapValues => map::values(ctx)?,
        IteratorNext => ctx.helper(Helper::IteratorNext)?,
        StorageGet => storage::map_get(ctx, key)?,
        StorageSet => storage::map_set(ctx, key)?,
        StorageHas => storage::map_has(ctx, key)?,
        StorageDelete => storage::map_delete(ctx, key)?,
        StorageForEach => storage::map_for_each(ctx, key)?,
        StorageAt => storage::map_at(ctx),
        StoragePush => storage::array_push(ctx)?,
        StoragePop => storage::array_pop(ctx)?,
        StorageArrayForEach => storage::array_for_each(ctx)?,
    }
    Ok(())
}

/// ( w -- w ) a property of a value whose kind has no own properties
pub fn emit_builtin_member(
    ctx: &mut Ctx,
    kind: ValueKind,
    ty: &Type,
    property: &str,
    span: Span,
) -> CResult {
    let field = |ctx: &mut Ctx, index: i64, kind: ValueKind| {
        unwrap(ctx);
        ctx.em.push_int(index);
        ctx.em.emit(Op::PickItem);
        wrap(ctx, kind);
    };
    if let Type::Contract(iface) = ty {
        let prop_ty = match iface.property(property) {
            Some(prop_ty) => prop_ty.clone(),
            None => return unknown_member(ctx, &iface.name, property, span, 1),
        };
        unwrap(ctx);
        return emit_contract_call(ctx, property, &[], &[], &prop_ty, span);
    }
    match (kind, property) {
        (ValueKind::Array, "length") => array::length(ctx),
        (ValueKind::String | ValueKind::Buffer, "length") => {
            unwrap(ctx);
            ctx.em.emit(Op::Size);
            wrap(ctx, ValueKind::Number);
        }
        (ValueKind::Map, "size") => map::size(ctx),
        (ValueKind::IteratorResult, "done") => iterator::result_done(ctx),
        (ValueKind::IteratorResult, "value") => iterator::result_value(ctx),
        (ValueKind::Error, "message") => unwrap(ctx),
        (ValueKind::Transaction | ValueKind::Account | ValueKind::Block, "hash") => {
            field(ctx, 0, ValueKind::Buffer)
        }
        (ValueKind::Block, "index") => field(ctx, 1, ValueKind::Number),
        (ValueKind::ArrayStorage, "length") => storage::array_length(ctx)?,
        _ => return unknown_member(ctx, &ty.to_string(), property, span, 1),
    }
    Ok(())
}

/// ( -- w ) `Blockchain.<property>`
pub fn emit_blockchain_member(ctx: &mut Ctx, property: &str, span: Span) -> CResult {
    match property {
        "currentHeight" => {
            ctx.em.emit(Op::Syscall(Syscall::GetHeight));
            wrap(ctx, ValueKind::Number);
        }
        "currentBlockTime" => {
            ctx.em.emit(Op::Syscall(Syscall::GetTime));
            wrap(ctx, ValueKind::Number);
        }
        "currentTransaction" => {
            ctx.em.emit(Op::Syscall(Syscall::GetScriptContainer));
            wrap(ctx, ValueKind::Transaction);
        }
        _ => return unknown_member(ctx, "Blockchain", property, span, 0),
    }
    Ok(())
}

fn emit_blockchain_call(ctx: &mut Ctx, property: &str, args: &[Expr], span: Span) -> CResult {
    match property {
        "getBlock" => {
            if !arity(ctx, args, 1..=1, property, span)? {
                return Ok(());
            }
            let missing = ctx.em.new_label();
            let end = ctx.em.new_label();
            emit_value(ctx, &args[0])?;
            unwrap(ctx);
            ctx.em.emit(Op::Syscall(Syscall::GetBlock));
            ctx.em.emit(Op::Dup);
            ctx.em.emit(Op::IsNull);
            ctx.em.jump(JumpKind::IfTrue, missing);
            wrap(ctx, ValueKind::Block);
            ctx.em.jump(JumpKind::Always, end);
            ctx.em.mark(missing);
            ctx.em.emit(Op::Drop);
            push_undefined(ctx);
            ctx.em.mark(end);
        }
        "getAccount" => {
            if !arity(ctx, args, 1..=1, property, span)? {
                return Ok(());
            }
            emit_value(ctx, &args[0])?;
            unwrap(ctx);
            ctx.em.emit(Op::Syscall(Syscall::GetAccount));
            wrap(ctx, ValueKind::Account);
        }
        _ => return unknown_member(ctx, "Blockchain", property, span, 0),
    }
    Ok(())
}

// =============================================================================
// Other contracts
// =============================================================================

/// ( -- w ) `SmartContract.for<T>(hash)`; the interface comes from the
/// call's static type.
fn emit_contract_for(ctx: &mut Ctx, property: &str, args: &[Expr], e: &Expr) -> CResult {
    if property != "for" {
        return unknown_member(ctx, "SmartContract", property, e.span, 0);
    }
    if !matches!(e.ty, Type::Contract(_)) {
        return ctx.error(
            DiagnosticCode::UnsupportedSyntax,
            e.span,
            "SmartContract.for needs the contract's interface as its type argument",
            0,
        );
    }
    if !arity(ctx, args, 1..=1, "SmartContract.for", e.span)? {
        return Ok(());
    }
    emit_value(ctx, &args[0])?;
    unwrap(ctx);
    wrap(ctx, ValueKind::Buffer);
    Ok(())
}

fn emit_contract_method(
    ctx: &mut Ctx,
    iface: &ContractInterface,
    object: &Expr,
    property: &str,
    args: &[Expr],
    span: Span,
) -> CResult {
    let sig = match iface.method(property) {
        Some(sig) => sig,
        None => return unknown_member(ctx, &iface.name, property, span, 0),
    };
    let count = sig.params.len();
    if !arity(ctx, args, count..=count, property, span)? {
        return Ok(());
    }
    emit_value(ctx, object)?;
    unwrap(ctx);
    emit_contract_call(ctx, property, args, &sig.params, &sig.ret, span)
}

/// ( hash -- w ) run `method` of the contract at `hash`. Arguments cross
/// the boundary raw and the result is wrapped as `ret`, the same
/// conversions the callee's dispatcher applies on its side.
fn emit_contract_call(
    ctx: &mut Ctx,
    method: &str,
    args: &[Expr],
    params: &[Type],
    ret: &Type,
    span: Span,
) -> CResult {
    ctx.em.push_str(method);
    for (arg, ty) in args.iter().zip(params) {
        emit_value(ctx, arg)?;
        unwrap_result(ctx, ty)?;
    }
    ctx.helper(Helper::PackArgs(args.len()))?;
    ctx.em.emit(Op::Syscall(Syscall::ContractCall));
    wrap_raw(ctx, ret, &format!("result of '{}'", method), span)
}

/// `console.log(a, b, ..)` logs the arguments as strings joined by spaces.
fn emit_log(ctx: &mut Ctx, args: &[Expr]) -> CResult {
    if args.is_empty() {
        ctx.em.push_bytes(&[]);
    }
    for (i, arg) in args.iter().enumerate() {
        emit_value(ctx, arg)?;
        ctx.helper(Helper::ToRawString(kind_of(&arg.ty)))?;
        if i > 0 {
            ctx.em.push_str(" ");
            ctx.em.emit(Op::Swap);
            ctx.em.emit(Op::Cat);
            ctx.em.emit(Op::Cat);
        }
    }
    ctx.em.emit(Op::Syscall(Syscall::Log));
    push_undefined(ctx);
    Ok(())
}

/// `notify("Name", ..args)` raises `Array[name, ..raw args]`.
fn emit_notify(ctx: &mut Ctx, args: &[Expr], span: Span) -> CResult {
    let name = match args.first().map(|a| &a.kind) {
        Some(ExprKind::Str(name)) => name.clone(),
        _ => {
            return ctx.error(
                DiagnosticCode::UnsupportedSyntax,
                span,
                "the first argument of notify must be a string literal naming the event",
                0,
            );
        }
    };
    ctx.em.push_str(&name);
    for arg in &args[1..] {
        emit_value(ctx, arg)?;
        unwrap(ctx);
    }
    ctx.helper(Helper::PackArgs(args.len()))?;
    ctx.em.emit(Op::Syscall(Syscall::Notify));
    push_undefined(ctx);
    ctx.record_event(EventInfo {
        name,
        params: args[1..].iter().map(|a| a.ty.clone()).collect(),
    });
    Ok(())
}

/// ( -- w(error) ) `Error(message)`, also reached through `new`
pub fn emit_error(ctx: &mut Ctx, args: &[Expr], span: Span) -> CResult {
    if !arity(ctx, args, 0..=1, "Error", span)? {
        return Ok(());
    }
    match args.first() {
        Some(message) => {
            emit_value(ctx, message)?;
            ctx.helper(Helper::ToRawString(kind_of(&message.ty)))?;
        }
        None => ctx.em.push_bytes(&[]),
    }
    wrap(ctx, ValueKind::String);
    ctx.helper(Helper::NewError)
}

#[cfg(test)]
mod tests {
    use crate::compile::driver::tests::{run_module, run_module_with_host};
    use crate::compile::{CompilerConfig, compile};
    use crate::lang::build::*;
    use crate::lang::types::{ContractInterface, MethodSignature, Type};
    use crate::lang::Stmt;
    use crate::runtime::{MemoryHost, StackItem};

    fn main_module(body: Vec<Stmt>) -> crate::lang::Module {
        module(
            "m",
            vec![function_stmt(export(function("main", vec![], Type::Unknown, body)))],
        )
    }

    #[test]
    fn test_array_methods_chain() {
        let xs = || ident("xs", Type::array(Type::Number));
        let double = arrow_expr(
            vec![param("x", Type::Number)],
            binary(
                crate::lang::node::BinaryOp::Mul,
                ident("x", Type::Number),
                num(2),
            ),
        );
        let body = vec![
            let_("xs", array(vec![num(1), num(2), num(3)], Type::Number)),
            expr_stmt(method_call(xs(), "push", vec![num(4)], Type::Number)),
            let_(
                "ys",
                method_call(xs(), "map", vec![double], Type::array(Type::Number)),
            ),
            ret(member(
                ident("ys", Type::array(Type::Number)),
                "length",
                Type::Number,
            )),
        ];
        let out = run_module(&main_module(body), "main", vec![]).unwrap();
        assert_eq!(out, StackItem::Integer(4));
    }

    #[test]
    fn test_map_get_and_size() {
        let map_ty = Type::Map(Box::new(Type::String), Box::new(Type::Number));
        let m = || ident("m", map_ty.clone());
        let body = vec![
            const_("m", new_expr(ident("Map", Type::Unknown), vec![], map_ty.clone())),
            expr_stmt(method_call(m(), "set", vec![string("a"), num(1)], map_ty.clone())),
            expr_stmt(method_call(m(), "set", vec![string("b"), num(2)], map_ty.clone())),
            ret(add(
                method_call(m(), "get", vec![string("b")], Type::Number),
                member(m(), "size", Type::Number),
            )),
        ];
        let out = run_module(&main_module(body), "main", vec![]).unwrap();
        assert_eq!(out, StackItem::Integer(4));
    }

    #[test]
    fn test_notify_and_log_reach_the_host() {
        let body = vec![
            expr_stmt(call_typed(
                ident("notify", Type::Unknown),
                vec![string("Transfer"), num(7)],
                Type::Void,
            )),
            expr_stmt(method_call(
                ident("console", Type::Unknown),
                "log",
                vec![string("total"), num(7)],
                Type::Void,
            )),
            ret_void(),
        ];
        let (_, host, output) =
            run_module_with_host(&main_module(body), "main", vec![], MemoryHost::new()).unwrap();
        assert_eq!(
            host.notifications,
            vec![StackItem::array(vec![
                StackItem::bytes("Transfer"),
                StackItem::Integer(7),
            ])]
        );
        assert_eq!(host.logs, vec!["total 7".to_string()]);
        let event = output.metadata.and_then(|m| m.event("Transfer").cloned());
        assert_eq!(event.map(|e| e.params), Some(vec![Type::Number]));
    }

    fn calc_interface() -> Type {
        Type::Contract(Box::new(ContractInterface {
            name: "Calc".to_string(),
            methods: vec![
                MethodSignature {
                    name: "add".to_string(),
                    params: vec![Type::Number, Type::Number],
                    ret: Type::Number,
                },
                MethodSignature {
                    name: "twice".to_string(),
                    params: vec![Type::Number],
                    ret: Type::array(Type::Number),
                },
            ],
            properties: vec![("label".to_string(), Type::String)],
        }))
    }

    /// Host with the compiled `Calc` contract deployed under `b"calc"`.
    fn host_with_calc() -> MemoryHost {
        let a = || ident("a", Type::Number);
        let b = || ident("b", Type::Number);
        let calc = module(
            "calc",
            vec![class_stmt(contract(
                "Calc",
                vec![
                    method(
                        "add",
                        vec![param("a", Type::Number), param("b", Type::Number)],
                        Type::Number,
                        vec![ret(add(a(), b()))],
                    ),
                    method(
                        "twice",
                        vec![param("a", Type::Number)],
                        Type::array(Type::Number),
                        vec![ret(array(vec![a(), a()], Type::Number))],
                    ),
                    getter("label", Type::String, vec![ret(string("calc"))]),
                ],
            ))],
        );
        let output = compile(&calc, &CompilerConfig::default()).unwrap();
        let mut host = MemoryHost::new();
        host.deploy(b"calc".to_vec(), output.script.unwrap());
        host
    }

    fn calc_handle() -> Stmt {
        const_(
            "calc",
            call_typed(
                member(ident("SmartContract", Type::Unknown), "for", Type::Unknown),
                vec![ident("hash", Type::Buffer)],
                calc_interface(),
            ),
        )
    }

    fn caller(body: Vec<Stmt>) -> crate::lang::Module {
        module(
            "m",
            vec![function_stmt(export(function(
                "main",
                vec![param("hash", Type::Buffer)],
                Type::Unknown,
                body,
            )))],
        )
    }

    #[test]
    fn test_calls_a_method_of_another_contract() {
        let calc = || ident("calc", calc_interface());
        let body = vec![
            calc_handle(),
            ret(add(
                method_call(calc(), "add", vec![num(2), num(3)], Type::Number),
                member(
                    method_call(calc(), "twice", vec![num(4)], Type::array(Type::Number)),
                    "length",
                    Type::Number,
                ),
            )),
        ];
        let (out, _, _) = run_module_with_host(
            &caller(body),
            "main",
            vec![StackItem::bytes("calc")],
            host_with_calc(),
        )
        .unwrap();
        assert_eq!(out, StackItem::Integer(7));
    }

    #[test]
    fn test_reads_a_property_of_another_contract() {
        let body = vec![
            calc_handle(),
            ret(member(ident("calc", calc_interface()), "label", Type::String)),
        ];
        let (out, _, _) = run_module_with_host(
            &caller(body),
            "main",
            vec![StackItem::bytes("calc")],
            host_with_calc(),
        )
        .unwrap();
        assert_eq!(out, StackItem::bytes("calc"));
    }

    #[test]
    fn test_array_result_of_another_contract_is_rewrapped() {
        let body = vec![
            calc_handle(),
            ret(index(
                method_call(
                    ident("calc", calc_interface()),
                    "twice",
                    vec![num(21)],
                    Type::array(Type::Number),
                ),
                num(1),
                Type::Number,
            )),
        ];
        let (out, _, _) = run_module_with_host(
            &caller(body),
            "main",
            vec![StackItem::bytes("calc")],
            host_with_calc(),
        )
        .unwrap();
        assert_eq!(out, StackItem::Integer(21));
    }

    #[test]
    fn test_calling_an_undeployed_contract_faults() {
        let body = vec![
            calc_handle(),
            ret(method_call(
                ident("calc", calc_interface()),
                "add",
                vec![num(1), num(1)],
                Type::Number,
            )),
        ];
        let err = run_module(&caller(body), "main", vec![StackItem::bytes("nobody")]).unwrap_err();
        assert!(err.message.contains("no contract deployed"));
    }

    #[test]
    fn test_method_missing_from_the_interface_is_reported() {
        let body = vec![
            calc_handle(),
            ret(method_call(
                ident("calc", calc_interface()),
                "mul",
                vec![num(1)],
                Type::Number,
            )),
        ];
        let output = compile(&caller(body), &CompilerConfig::default()).unwrap();
        assert!(output.script.is_none());
        assert!(output.errors().any(|d| d.message.contains("'Calc' has no member 'mul'")));
    }

    #[test]
    fn test_buffer_slice_from_a_parameter() {
        let m = module(
            "m",
            vec![function_stmt(export(function(
                "main",
                vec![param("data", Type::Buffer)],
                Type::Buffer,
                vec![ret(method_call(
                    ident("data", Type::Buffer),
                    "slice",
                    vec![num(-3)],
                    Type::Buffer,
                ))],
            )))],
        );
        let out = run_module(&m, "main", vec![StackItem::bytes([1u8, 2, 3, 4, 5])]).unwrap();
        assert_eq!(out, StackItem::bytes([3u8, 4, 5]));
    }

    #[test]
    fn test_current_height_reads_the_host() {
        let body = vec![ret(member(
            ident("Blockchain", Type::Blockchain),
            "currentHeight",
            Type::Number,
        ))];
        let mut host = MemoryHost::new();
        host.height = 99;
        let (out, _, _) = run_module_with_host(&main_module(body), "main", vec![], host).unwrap();
        assert_eq!(out, StackItem::Integer(99));
    }
}
