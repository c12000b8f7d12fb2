//! Harness for running emitted fragments on the VM, and the stack-contract
//! checks every helper must pass.

use super::*;
use crate::bytecode::Op;
use crate::compile::config::CompilerConfig;
use crate::runtime::{MemoryHost, RuntimeError, StackItem, Vm};

/// Run the code `build` emits with `inputs` on the stack (first input
/// deepest) and return what it leaves, bottom first. Uncaught throws come
/// back as the VM's thrown error.
pub fn run_with(
    inputs: Vec<StackItem>,
    build: impl FnOnce(&mut Ctx) -> CResult,
) -> Result<Vec<StackItem>, RuntimeError> {
    run_with_host(MemoryHost::new(), inputs, build).map(|(out, _)| out)
}

/// [`run_with`] against a given host, handing the host back afterwards.
pub fn run_with_host(
    host: MemoryHost,
    inputs: Vec<StackItem>,
    build: impl FnOnce(&mut Ctx) -> CResult,
) -> Result<(Vec<StackItem>, MemoryHost), RuntimeError> {
    let config = CompilerConfig::default();
    let mut ctx = Ctx::new(&config, 1);
    let n = inputs.len();

    // context: Array[scopes, this, global]
    ctx.em.emit(Op::NewMap);
    types::push_undefined(&mut ctx);
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.em.pack(3);
    ctx.em.emit(Op::ToAlt);

    ctx.em.emit(Op::Dup);
    ctx.em.emit_dynamic(Op::Unpack, n as i32);
    ctx.em.emit(Op::Drop);

    build(&mut ctx).expect("fragment emits");

    if let Some(depth) = ctx.em.depth() {
        ctx.em.pack((depth - 1) as usize);
        ctx.em.emit(Op::Nip);
        ctx.em.emit(Op::Ret);
    }
    let catch = ctx.targets.catch;
    if ctx.em.is_referenced(catch) {
        ctx.em.mark(catch);
        ctx.em.emit_all(&[Op::Nip, Op::Nip, Op::Throw]);
    }
    ctx.emit_shared_bodies();
    let script = ctx.em.assemble().expect("fragment assembles");

    let args = StackItem::array(inputs.into_iter().rev().collect());
    let mut vm = Vm::new(host);
    let result = vm.run(&script, args)?;
    // PACK leaves the top of the stack at index 0.
    let out = match result {
        StackItem::Array(items) => items.borrow().iter().rev().cloned().collect(),
        other => panic!("expected result array, got {:?}", other),
    };
    Ok((out, vm.into_host()))
}

pub fn run_helper(inputs: Vec<StackItem>, helpers: &[Helper]) -> Result<Vec<StackItem>, RuntimeError> {
    run_with(inputs, |ctx| ctx.helpers(helpers))
}

/// `w(object)` with the given data properties and no prototype.
pub fn object_item(props: Vec<(&str, StackItem)>) -> StackItem {
    let entries = props
        .into_iter()
        .map(|(k, v)| (StackItem::bytes(k), StackItem::array(vec![v])))
        .collect();
    StackItem::wrap(
        ValueKind::Object,
        StackItem::array(vec![StackItem::map(entries), StackItem::map(vec![])]),
    )
}

/// `w(array)` of numbers.
pub fn numbers(ns: &[i64]) -> StackItem {
    StackItem::wrap(
        ValueKind::Array,
        StackItem::array(ns.iter().map(|n| StackItem::number(*n)).collect()),
    )
}

fn every_helper() -> Vec<Helper> {
    use Helper::*;
    vec![
        PushUndefined,
        PushNullValue,
        Wrap(ValueKind::Number),
        Unwrap,
        TypeTag,
        ToBoolean(None),
        ToBoolean(Some(ValueKind::Number)),
        ToBoolean(Some(ValueKind::String)),
        NumberToString,
        ToRawString(None),
        ToRawString(Some(ValueKind::Number)),
        TypeOf,
        NewObject,
        NewObjectWithProto,
        MapSetKeep("k".into()),
        FindObjectProperty,
        SetObjectProperty,
        HasOwnProperty,
        InstanceOf,
        FunctionObject,
        GetCallable,
        Invoke,
        CheckThrow,
        ArgOrUndefined(2),
        PackArgs(0),
        PackArgs(5),
        NewError,
        ArrayGet,
        ArraySet,
        BufferSlice,
        RawParts(ValueKind::Array),
        RawParts(ValueKind::String),
        StorageKey,
        StorageGet,
        StoragePut,
        ArrayStorageLength,
        SetArrayStorageLength,
        NewIterator,
        IteratorNext,
        PushThis,
        PushGlobal,
    ]
}

#[test]
fn test_every_helper_keeps_its_contract() {
    let config = CompilerConfig::default();
    for helper in every_helper() {
        let mut ctx = Ctx::new(&config, 1);
        for n in 0..7 {
            ctx.em.push_int(n);
        }
        let before = ctx.em.depth();
        ctx.helper(helper.clone())
            .unwrap_or_else(|e| panic!("{:?}: {}", helper, e));
        let (ins, outs) = helper.contract();
        assert_eq!(
            ctx.em.depth(),
            before.map(|d| d - ins + outs),
            "{:?}",
            helper
        );
        ctx.em.check().unwrap_or_else(|e| panic!("{:?}: {}", helper, e));
    }
}

#[test]
fn test_dropped_outputs_leave_depth_unchanged_but_inputs_consumed() {
    let config = CompilerConfig::default();
    let mut ctx = Ctx::new(&config, 1);
    for n in 0..3 {
        ctx.em.push_int(n);
    }
    ctx.helper_with(Helper::FindObjectProperty, EmitOptions::EFFECT)
        .unwrap();
    assert_eq!(ctx.em.depth(), Some(2));
}

#[test]
fn test_throw_type_error_ends_the_region() {
    let config = CompilerConfig::default();
    let mut ctx = Ctx::new(&config, 1);
    ctx.helper(Helper::ThrowTypeError("boom".into())).unwrap();
    assert_eq!(ctx.em.depth(), None);
    assert!(ctx.em.is_referenced(ctx.targets.catch));
}

#[test]
fn test_shared_bodies_are_emitted_once() {
    let config = CompilerConfig::default();
    let mut ctx = Ctx::new(&config, 1);
    let a = ctx.shared_body(SharedBody::IteratorNext);
    let b = ctx.shared_body(SharedBody::IteratorNext);
    assert_eq!(a, b);
    ctx.em.emit(Op::Ret);
    ctx.emit_shared_bodies();
    let len = ctx.em.ops().len();
    ctx.emit_shared_bodies();
    assert_eq!(ctx.em.ops().len(), len);
}

#[test]
fn test_harness_keeps_input_order() {
    let inputs = vec![StackItem::number(1), StackItem::number(2), StackItem::number(3)];
    assert_eq!(run_with(inputs.clone(), |_| Ok(())).unwrap(), inputs);
}

#[test]
fn test_harness_reports_top_of_stack_last() {
    let out = run_with(vec![StackItem::number(1), StackItem::number(2)], |ctx| {
        ctx.em.push_int(3);
        ctx.helper(Helper::Wrap(ValueKind::Number))
    })
    .unwrap();
    assert_eq!(
        out,
        vec![StackItem::number(1), StackItem::number(2), StackItem::number(3)]
    );
}
