//! `Map`: `w(Map{raw key: w})`. Keys are stored unwrapped, so their kind is
//! recovered from the static key type when they are handed back out.

use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::{arr_reduce, for_loop};
use crate::compile::helpers::types::{push_undefined, unwrap, unwrap_pair, wrap};
use crate::lang::ValueKind;

/// ( -- w(map) )
pub fn new_map(ctx: &mut Ctx) {
    ctx.em.emit(Op::NewMap);
    wrap(ctx, ValueKind::Map);
}

/// ( w(map) w(key) -- w )
pub fn get(ctx: &mut Ctx) {
    let missing = ctx.em.new_label();
    let end = ctx.em.new_label();
    unwrap_pair(ctx);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::HasKey);
    ctx.em.jump(JumpKind::IfFalse, missing);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(missing);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.mark(end);
}

/// ( w(map) w(key) w -- w(map) )
pub fn set(ctx: &mut Ctx) {
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Dup);
    unwrap(ctx);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Roll);
    unwrap(ctx);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Roll);
    ctx.em.emit(Op::SetItem);
}

/// ( w(map) w(key) -- w(boolean) )
pub fn has(ctx: &mut Ctx) {
    unwrap_pair(ctx);
    ctx.em.emit(Op::HasKey);
    wrap(ctx, ValueKind::Boolean);
}

/// ( w(map) w(key) -- w(boolean) ) whether an entry was removed
pub fn delete(ctx: &mut Ctx) {
    unwrap_pair(ctx);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::HasKey);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Remove);
    wrap(ctx, ValueKind::Boolean);
}

/// ( w(map) -- w(number) )
pub fn size(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.emit(Op::Size);
    wrap(ctx, ValueKind::Number);
}

/// ( w(map) w(fn) -- w(undefined) ) calls `fn(value, key)` in insertion order
pub fn for_each(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    ctx.helper(Helper::GetCallable)?;
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Keys);
    for_loop(ctx, &mut |ctx| {
        // callable map keys i k i
        ctx.em.emit(Op::Drop);
        ctx.em.push_int(3);
        ctx.em.emit(Op::Pick);
        ctx.em.emit(Op::Over);
        ctx.em.emit(Op::PickItem);
        ctx.em.emit(Op::Swap);
        wrap(ctx, key_kind);
        ctx.helper(Helper::PackArgs(2))?;
        push_undefined(ctx);
        ctx.em.push_int(5);
        ctx.em.emit(Op::Pick);
        ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
        ctx.em.emit(Op::Drop);
        Ok(())
    })?;
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    Ok(())
}

/// ( w(map) -- w(iterator) ) over the keys
pub fn keys(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    unwrap(ctx);
    ctx.em.emit(Op::Keys);
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    arr_reduce(ctx, &mut |ctx| {
        ctx.em.emit(Op::Drop);
        wrap(ctx, key_kind);
        ctx.em.emit(Op::Over);
        ctx.em.emit(Op::Swap);
        ctx.em.emit(Op::Append);
        Ok(())
    })?;
    ctx.helper(Helper::NewIterator)
}

/// ( w(map) -- w(iterator) ) over the values
pub fn values(ctx: &mut Ctx) -> CResult {
    unwrap(ctx);
    ctx.em.emit(Op::Values);
    ctx.helper(Helper::NewIterator)
}
