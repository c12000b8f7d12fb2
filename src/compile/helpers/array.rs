//! Arrays: `w(Array[w...])`.
//!
//! Every builtin that visits elements is an instance of [`for_loop`] or
//! [`arr_reduce`] with its own `each` step; the callback offsets below are
//! relative to the layout those two helpers document.

use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::{arr_reduce, for_loop};
use crate::compile::helpers::types::{push_undefined, unwrap, unwrap_pair, wrap};
use crate::lang::ValueKind;

pub fn array_get(ctx: &mut Ctx) -> CResult {
    let oob = ctx.em.new_label();
    let end = ctx.em.new_label();
    unwrap_pair(ctx);
    // items i
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Gt);
    ctx.em.emit(Op::Over);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Ge);
    ctx.em.emit(Op::BoolAnd);
    ctx.em.jump(JumpKind::IfFalse, oob);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(oob);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.mark(end);
    Ok(())
}

/// Writing at `length` appends; any other index must already exist.
pub fn array_set(ctx: &mut Ctx) {
    let set = ctx.em.new_label();
    let end = ctx.em.new_label();
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    ctx.em.emit(Op::Rot);
    // items i v
    ctx.em.emit(Op::Over);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfFalse, set);
    ctx.em.emit(Op::Nip);
    ctx.em.emit(Op::Append);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(set);
    ctx.em.emit(Op::SetItem);
    ctx.em.mark(end);
}

/// ( acc v -- acc ) append v to the raw array acc
fn append_keep(ctx: &mut Ctx) {
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Append);
}

/// ( .. args -- .. result ) call the callable `depth` items below `args`
/// with an undefined receiver.
fn call_below(ctx: &mut Ctx, depth: i64) -> CResult {
    push_undefined(ctx);
    ctx.em.push_int(depth);
    ctx.em.emit(Op::Pick);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])
}

/// ( w(array) w(fn) -- callable items ) shared prologue of callback builtins
fn callback_prologue(ctx: &mut Ctx) -> CResult {
    ctx.helper(Helper::GetCallable)?;
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    Ok(())
}

/// ( w(array) -- w(number) )
pub fn length(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.emit(Op::Size);
    wrap(ctx, ValueKind::Number);
}

/// ( w(array) v -- w(number) ) new length
pub fn push(ctx: &mut Ctx) {
    ctx.em.emit(Op::Over);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Append);
    length(ctx);
}

/// ( w(array) -- w ) last element, undefined when empty
pub fn pop(ctx: &mut Ctx) {
    let empty = ctx.em.new_label();
    let end = ctx.em.new_label();
    unwrap(ctx);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Dup);
    ctx.em.jump(JumpKind::IfFalse, empty);
    ctx.em.emit(Op::Dec);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Remove);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(empty);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.mark(end);
}

/// ( w(array) w(fn) -- w(array) )
pub fn map(ctx: &mut Ctx) -> CResult {
    callback_prologue(ctx)?;
    // callable items acc
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    arr_reduce(ctx, &mut |ctx| {
        // callable items i acc v i
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::PackArgs(2))?;
        call_below(ctx, 5)?;
        append_keep(ctx);
        Ok(())
    })?;
    ctx.em.emit(Op::Nip);
    wrap(ctx, ValueKind::Array);
    Ok(())
}

/// ( w(array) w(fn) -- w(array) )
pub fn filter(ctx: &mut Ctx) -> CResult {
    callback_prologue(ctx)?;
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    arr_reduce(ctx, &mut |ctx| {
        let skip = ctx.em.new_label();
        let end = ctx.em.new_label();
        // acc v v w(i)
        ctx.em.emit(Op::Over);
        ctx.em.emit(Op::Swap);
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::PackArgs(2))?;
        call_below(ctx, 6)?;
        ctx.helper(Helper::ToBoolean(None))?;
        ctx.em.jump(JumpKind::IfFalse, skip);
        append_keep(ctx);
        ctx.em.jump(JumpKind::Always, end);
        ctx.em.mark(skip);
        ctx.em.emit(Op::Drop);
        ctx.em.mark(end);
        Ok(())
    })?;
    ctx.em.emit(Op::Nip);
    wrap(ctx, ValueKind::Array);
    Ok(())
}

/// ( w(array) w(fn) -- w(undefined) )
pub fn for_each(ctx: &mut Ctx) -> CResult {
    callback_prologue(ctx)?;
    for_loop(ctx, &mut |ctx| {
        // callable items i v i
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::PackArgs(2))?;
        call_below(ctx, 4)?;
        ctx.em.emit(Op::Drop);
        Ok(())
    })?;
    ctx.em.emit(Op::Drop);
    push_undefined(ctx);
    Ok(())
}

/// ( w(array) w(fn) w(initial) -- w )
pub fn reduce(ctx: &mut Ctx) -> CResult {
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    // initial array fn
    ctx.helper(Helper::GetCallable)?;
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    // callable initial array
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    arr_reduce(ctx, &mut |ctx| {
        // callable items i acc v i
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::PackArgs(3))?;
        call_below(ctx, 4)
    })?;
    ctx.em.emit(Op::Nip);
    Ok(())
}

/// ( w(array) w(fn) -- w(boolean) ) `some` when `any`, else `every`
pub fn some_or_every(ctx: &mut Ctx, any: bool) -> CResult {
    callback_prologue(ctx)?;
    ctx.em.push_bool(!any);
    arr_reduce(ctx, &mut |ctx| {
        let skip = ctx.em.new_label();
        let end = ctx.em.new_label();
        // Once decided, the remaining elements are not visited.
        ctx.em.push_int(2);
        ctx.em.emit(Op::Pick);
        let decided = if any { JumpKind::IfTrue } else { JumpKind::IfFalse };
        ctx.em.jump(decided, skip);
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::PackArgs(2))?;
        call_below(ctx, 5)?;
        ctx.helper(Helper::ToBoolean(None))?;
        ctx.em.emit(Op::Nip);
        ctx.em.jump(JumpKind::Always, end);
        ctx.em.mark(skip);
        ctx.em.emit_all(&[Op::Drop, Op::Drop]);
        ctx.em.mark(end);
        Ok(())
    })?;
    ctx.em.emit(Op::Nip);
    wrap(ctx, ValueKind::Boolean);
    Ok(())
}

/// ( w(array) w(start) w(end) -- w(array) ) indices are clamped, not
/// counted from the end
pub fn slice(ctx: &mut Ctx) -> CResult {
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    // start end items acc
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    arr_reduce(ctx, &mut |ctx| {
        let skip = ctx.em.new_label();
        let end = ctx.em.new_label();
        // start end items i acc v i
        ctx.em.emit(Op::Dup);
        ctx.em.push_int(7);
        ctx.em.emit(Op::Pick);
        ctx.em.emit(Op::Ge);
        ctx.em.emit(Op::Swap);
        ctx.em.push_int(6);
        ctx.em.emit(Op::Pick);
        ctx.em.emit(Op::Lt);
        ctx.em.emit(Op::BoolAnd);
        ctx.em.jump(JumpKind::IfFalse, skip);
        append_keep(ctx);
        ctx.em.jump(JumpKind::Always, end);
        ctx.em.mark(skip);
        ctx.em.emit(Op::Drop);
        ctx.em.mark(end);
        Ok(())
    })?;
    ctx.em.emit(Op::Nip);
    ctx.em.emit(Op::Nip);
    wrap(ctx, ValueKind::Array);
    Ok(())
}

/// ( w(array) w -- w(boolean) ) element equality is `EQUAL` on wrapped
/// values: by value for primitives, by identity for compounds
pub fn includes(ctx: &mut Ctx) -> CResult {
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.push_bool(false);
    arr_reduce(ctx, &mut |ctx| {
        // needle items i acc v i
        ctx.em.emit(Op::Drop);
        ctx.em.push_int(4);
        ctx.em.emit(Op::Pick);
        ctx.em.emit(Op::Equal);
        ctx.em.emit(Op::BoolOr);
        Ok(())
    })?;
    ctx.em.emit(Op::Nip);
    wrap(ctx, ValueKind::Boolean);
    Ok(())
}

/// ( w(array) -- w(iterator) )
pub fn values(ctx: &mut Ctx) -> CResult {
    unwrap(ctx);
    ctx.helper(Helper::NewIterator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::helpers::tests::{numbers, run_helper, run_with};
    use crate::runtime::StackItem;

    #[test]
    fn test_get_in_and_out_of_range() {
        let arr = numbers(&[10, 20]);
        let out = run_helper(vec![arr.clone(), StackItem::number(1)], &[Helper::ArrayGet]).unwrap();
        assert_eq!(out, vec![StackItem::number(20)]);
        let out = run_helper(vec![arr.clone(), StackItem::number(2)], &[Helper::ArrayGet]).unwrap();
        assert_eq!(out, vec![StackItem::undefined()]);
        let out = run_helper(vec![arr, StackItem::number(-1)], &[Helper::ArrayGet]).unwrap();
        assert_eq!(out, vec![StackItem::undefined()]);
    }

    #[test]
    fn test_set_at_length_appends() {
        let out = run_with(vec![numbers(&[1])], |ctx| {
            ctx.em.emit(Op::Dup);
            ctx.em.push_int(1);
            ctx.helper(Helper::Wrap(ValueKind::Number))?;
            ctx.em.push_int(9);
            ctx.helper(Helper::Wrap(ValueKind::Number))?;
            ctx.helper(Helper::ArraySet)
        })
        .unwrap();
        assert_eq!(out, vec![numbers(&[1, 9])]);
    }

    #[test]
    fn test_push_returns_new_length_and_pop_takes_last() {
        let out = run_with(vec![numbers(&[1, 2])], |ctx| {
            ctx.em.emit(Op::Dup);
            ctx.em.push_int(3);
            ctx.helper(Helper::Wrap(ValueKind::Number))?;
            push(ctx);
            ctx.em.emit(Op::Swap);
            pop(ctx);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::number(3), StackItem::number(3)]);
    }

    #[test]
    fn test_pop_on_empty_is_undefined() {
        let out = run_with(vec![numbers(&[])], |ctx| {
            pop(ctx);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::undefined()]);
    }

    #[test]
    fn test_slice_range() {
        let out = run_with(
            vec![numbers(&[0, 1, 2, 3, 4]), StackItem::number(1), StackItem::number(3)],
            slice,
        )
        .unwrap();
        assert_eq!(out, vec![numbers(&[1, 2])]);
    }

    #[test]
    fn test_includes_compares_by_value() {
        let out = run_with(vec![numbers(&[4, 5]), StackItem::number(5)], includes).unwrap();
        assert_eq!(out, vec![StackItem::boolean(true)]);
        let out = run_with(vec![numbers(&[4, 5]), StackItem::number(6)], includes).unwrap();
        assert_eq!(out, vec![StackItem::boolean(false)]);
    }
}
