//! Property objects.
//!
//! An object is `w(Array[properties, internal])`. Both halves are maps keyed
//! by raw property names. A property entry is `Array[value]` for data or
//! `Array[getter, setter]` for an accessor, each side a raw callable or null.
//! The internal map holds `call` for functions and `prototype` for objects
//! made from a class or another object.

use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::compile::helpers::types::{push_undefined, unwrap, wrap};
use crate::lang::ValueKind;

pub const PROTOTYPE: &str = "prototype";
pub const CALL: &str = "call";

/// ( -- props internal ) fresh halves
fn new_halves(ctx: &mut Ctx) {
    ctx.em.emit(Op::NewMap);
    ctx.em.emit(Op::NewMap);
}

/// ( props internal -- w(object) )
fn finish_object(ctx: &mut Ctx) {
    ctx.em.emit(Op::Swap);
    ctx.em.pack(2);
    wrap(ctx, ValueKind::Object);
}

pub fn new_object(ctx: &mut Ctx) {
    new_halves(ctx);
    finish_object(ctx);
}

pub fn new_object_with_proto(ctx: &mut Ctx) {
    // proto internal
    ctx.em.emit(Op::NewMap);
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(PROTOTYPE);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Roll);
    ctx.em.emit(Op::SetItem);
    ctx.em.emit(Op::NewMap);
    ctx.em.emit(Op::Swap);
    finish_object(ctx);
}

pub fn map_set_keep(ctx: &mut Ctx, key: &str) {
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Swap);
    ctx.em.push_str(key);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::SetItem);
}

/// ( w(object) -- internal )
fn internal_of(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
}

/// ( w(object) -- props )
fn props_of(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
}

/// ( w(object) -- internal bool ) whether a prototype link exists
fn has_proto(ctx: &mut Ctx) {
    internal_of(ctx);
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(PROTOTYPE);
    ctx.em.emit(Op::HasKey);
}

pub fn find_object_property(ctx: &mut Ctx) -> CResult {
    let lookup = ctx.em.new_label();
    let found = ctx.em.new_label();
    let missing = ctx.em.new_label();
    let accessor = ctx.em.new_label();
    let call = ctx.em.new_label();
    let end = ctx.em.new_label();

    // receiver key current
    ctx.em.emit(Op::Over);
    ctx.em.mark(lookup);
    ctx.em.emit(Op::Dup);
    props_of(ctx);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::HasKey);
    ctx.em.jump(JumpKind::IfTrue, found);
    has_proto(ctx);
    ctx.em.jump(JumpKind::IfFalse, missing);
    ctx.em.push_str(PROTOTYPE);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, lookup);

    ctx.em.mark(missing);
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.jump(JumpKind::Always, end);

    // receiver entry
    ctx.em.mark(found);
    props_of(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(1);
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfFalse, accessor);
    ctx.em.emit(Op::Nip);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, end);

    ctx.em.mark(accessor);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::IsNull);
    ctx.em.jump(JumpKind::IfFalse, call);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.jump(JumpKind::Always, end);

    // The getter runs with the original receiver as `this`.
    ctx.em.mark(call);
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.em.emit(Op::Reverse3);
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;

    ctx.em.mark(end);
    Ok(())
}

pub fn set_object_property(ctx: &mut Ctx) -> CResult {
    let lookup = ctx.em.new_label();
    let next = ctx.em.new_label();
    let none = ctx.em.new_label();
    let own = ctx.em.new_label();
    let accessor = ctx.em.new_label();
    let call = ctx.em.new_label();
    let end = ctx.em.new_label();

    // An accessor anywhere on the chain wins; otherwise the write lands on
    // the receiver itself.
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.mark(lookup);
    ctx.em.emit(Op::Dup);
    props_of(ctx);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::HasKey);
    ctx.em.jump(JumpKind::IfFalse, next);
    props_of(ctx);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(2);
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfTrue, accessor);
    ctx.em.emit(Op::Drop);
    ctx.em.jump(JumpKind::Always, own);

    ctx.em.mark(next);
    has_proto(ctx);
    ctx.em.jump(JumpKind::IfFalse, none);
    ctx.em.push_str(PROTOTYPE);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, lookup);

    ctx.em.mark(none);
    ctx.em.emit(Op::Drop);
    ctx.em.jump(JumpKind::Always, own);

    // receiver key value
    ctx.em.mark(own);
    ctx.em.pack(1);
    ctx.em.emit(Op::Rot);
    props_of(ctx);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::SetItem);
    ctx.em.jump(JumpKind::Always, end);

    // receiver key value entry
    ctx.em.mark(accessor);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::IsNull);
    ctx.em.jump(JumpKind::IfFalse, call);
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop, Op::Drop]);
    ctx.em.jump(JumpKind::Always, end);

    ctx.em.mark(call);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Swap);
    ctx.em.pack(1);
    ctx.em.emit(Op::Reverse3);
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);

    ctx.em.mark(end);
    Ok(())
}

pub fn has_own_property(ctx: &mut Ctx) {
    props_of(ctx);
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::HasKey);
    wrap(ctx, ValueKind::Boolean);
}

pub fn instance_of(ctx: &mut Ctx) -> CResult {
    let walk = ctx.em.new_label();
    let no = ctx.em.new_label();
    let end = ctx.em.new_label();

    ctx.em.push_str(PROTOTYPE);
    ctx.helper(Helper::FindObjectProperty)?;
    ctx.em.emit(Op::Swap);

    // target current
    ctx.em.mark(walk);
    has_proto(ctx);
    ctx.em.jump(JumpKind::IfFalse, no);
    ctx.em.push_str(PROTOTYPE);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Equal);
    ctx.em.jump(JumpKind::IfFalse, walk);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    ctx.em.push_bool(true);
    ctx.em.jump(JumpKind::Always, end);

    ctx.em.mark(no);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    ctx.em.push_bool(false);

    ctx.em.mark(end);
    wrap(ctx, ValueKind::Boolean);
    Ok(())
}

pub fn function_object(ctx: &mut Ctx) {
    // props internal
    ctx.em.emit(Op::NewMap);
    ctx.em.emit(Op::Swap);
    map_set_keep(ctx, CALL);
    ctx.em.emit(Op::NewMap);
    ctx.em.emit(Op::Swap);
    finish_object(ctx);
}

/// ( w(object) value -- w(object) ) define a data property
pub fn define_data(ctx: &mut Ctx, key: &str) {
    ctx.em.pack(1);
    ctx.em.emit(Op::Over);
    props_of(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.push_str(key);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::SetItem);
}

/// ( w(object) getter setter -- w(object) ) define an accessor; either side
/// may be null
pub fn define_accessor(ctx: &mut Ctx, key: &str) {
    ctx.em.emit(Op::Swap);
    ctx.em.pack(2);
    ctx.em.emit(Op::Over);
    props_of(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.push_str(key);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::SetItem);
}

/// ( w(object) value -- w(object) ) set an internal slot
pub fn define_internal(ctx: &mut Ctx, key: &str) {
    ctx.em.emit(Op::Over);
    internal_of(ctx);
    ctx.em.emit(Op::Swap);
    map_set_keep(ctx, key);
    ctx.em.emit(Op::Drop);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::helpers::tests::{object_item, run_helper, run_with};
    use crate::runtime::StackItem;

    #[test]
    fn test_find_own_data_property() {
        let obj = object_item(vec![("a", StackItem::number(1)), ("b", StackItem::string("x"))]);
        let out = run_helper(
            vec![obj.clone(), StackItem::bytes("a")],
            &[Helper::FindObjectProperty],
        )
        .unwrap();
        assert_eq!(out, vec![StackItem::number(1)]);
        let out = run_helper(
            vec![obj, StackItem::bytes("b")],
            &[Helper::FindObjectProperty],
        )
        .unwrap();
        assert_eq!(out, vec![StackItem::string("x")]);
    }

    #[test]
    fn test_missing_property_is_undefined() {
        let obj = object_item(vec![("a", StackItem::number(1))]);
        let out = run_helper(
            vec![obj, StackItem::bytes("zzz")],
            &[Helper::FindObjectProperty],
        )
        .unwrap();
        assert_eq!(out, vec![StackItem::undefined()]);
    }

    #[test]
    fn test_lookup_follows_prototype() {
        let proto = object_item(vec![("inherited", StackItem::number(7))]);
        let out = run_with(vec![proto], |ctx| {
            ctx.helper(Helper::NewObjectWithProto)?;
            ctx.em.push_str("inherited");
            ctx.helper(Helper::FindObjectProperty)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::number(7)]);
    }

    #[test]
    fn test_set_then_find_round_trips() {
        let out = run_with(vec![], |ctx| {
            ctx.helper(Helper::NewObject)?;
            ctx.em.emit(Op::Dup);
            ctx.em.push_str("k");
            ctx.em.push_int(5);
            ctx.helper(Helper::Wrap(ValueKind::Number))?;
            ctx.helper(Helper::SetObjectProperty)?;
            ctx.em.push_str("k");
            ctx.helper(Helper::FindObjectProperty)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::number(5)]);
    }

    #[test]
    fn test_write_shadows_prototype_value() {
        let proto = object_item(vec![("k", StackItem::number(1))]);
        let out = run_with(vec![proto.clone()], |ctx| {
            ctx.helper(Helper::NewObjectWithProto)?;
            ctx.em.emit(Op::Dup);
            ctx.em.push_str("k");
            ctx.em.push_int(2);
            ctx.helper(Helper::Wrap(ValueKind::Number))?;
            ctx.helper(Helper::SetObjectProperty)?;
            ctx.em.push_str("k");
            ctx.helper(Helper::FindObjectProperty)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::number(2)]);
        // The prototype keeps its own value.
        let out = run_helper(vec![proto, StackItem::bytes("k")], &[Helper::FindObjectProperty])
            .unwrap();
        assert_eq!(out, vec![StackItem::number(1)]);
    }

    #[test]
    fn test_has_own_property_ignores_prototype() {
        let proto = object_item(vec![("p", StackItem::number(1))]);
        let out = run_with(vec![StackItem::string("p"), proto], |ctx| {
            ctx.helper(Helper::NewObjectWithProto)?;
            ctx.helper(Helper::HasOwnProperty)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::boolean(false)]);
    }

    #[test]
    fn test_instance_of_walks_the_chain() {
        let proto = object_item(vec![]);
        let class_obj = object_item(vec![("prototype", proto.clone())]);
        let out = run_with(vec![proto, class_obj], |ctx| {
            // proto class -> object class
            ctx.em.emit(Op::Swap);
            ctx.helper(Helper::NewObjectWithProto)?;
            ctx.helper(Helper::NewObjectWithProto)?;
            ctx.em.emit(Op::Swap);
            ctx.helper(Helper::InstanceOf)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::boolean(true)]);

        let out = run_with(
            vec![object_item(vec![]), object_item(vec![("prototype", object_item(vec![]))])],
            |ctx| ctx.helper(Helper::InstanceOf),
        )
        .unwrap();
        assert_eq!(out, vec![StackItem::boolean(false)]);
    }
}
