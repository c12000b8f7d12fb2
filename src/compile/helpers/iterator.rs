//! Iterators.
//!
//! An iterator is `w(Array[cursor, next])` where `cursor = Array[items, pos]`
//! and `next` is a closure whose only captured frame holds the cursor. All
//! iterators share one compiled `next` body; stepping one is an ordinary
//! call, so nothing here needs VM support for coroutines.

use crate::bytecode::{JumpKind, Op};
use crate::compile::completion::CompletionKind;
use crate::compile::ctx::{CResult, Ctx, SharedBody};
use crate::compile::helpers::Helper;
use crate::compile::helpers::types::{push_undefined, unwrap, wrap};
use crate::compile::scope::load_slot;
use crate::lang::ValueKind;

pub fn new_iterator(ctx: &mut Ctx) {
    let next = ctx.shared_body(SharedBody::IteratorNext);

    // cursor
    ctx.em.push_int(0);
    ctx.em.emit(Op::Swap);
    ctx.em.pack(2);

    // cursor callable; the closure's only frame is [cursor]
    ctx.em.emit(Op::Dup);
    ctx.em.pack(1);
    ctx.em.pack(1);
    ctx.em.emit(Op::DupFromAlt);
    ctx.em.push_int(2);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Swap);
    ctx.em.push_null();
    ctx.em.emit(Op::Swap);
    ctx.em.push_addr(next);
    ctx.em.pack(4);

    ctx.em.emit(Op::Swap);
    ctx.em.pack(2);
    wrap(ctx, ValueKind::IterableIterator);
}

pub fn iterator_next(ctx: &mut Ctx) -> CResult {
    unwrap(ctx);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.em.emit(Op::Swap);
    push_undefined(ctx);
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])
}

/// Body of the shared `next` closure: `[args] -- [kind w(result)]`.
pub fn emit_next_body(ctx: &mut Ctx) {
    let done = ctx.em.new_label();
    let result = ctx.em.new_label();

    // args cursor pos
    load_slot(ctx, 0, 0);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Over);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfFalse, done);

    // args v cursor pos+1
    ctx.em.emit(Op::Over);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Inc);
    ctx.em.push_int(1);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::SetItem);
    ctx.em.push_bool(false);
    ctx.em.jump(JumpKind::Always, result);

    ctx.em.mark(done);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.push_bool(true);

    // args value done
    ctx.em.mark(result);
    ctx.em.pack(2);
    wrap(ctx, ValueKind::IteratorResult);
    ctx.em.push_int(CompletionKind::Normal.code());
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Ret);
}

/// ( w(result) -- w(boolean) )
pub fn result_done(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    wrap(ctx, ValueKind::Boolean);
}

/// ( w(result) -- w )
pub fn result_value(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::helpers::tests::{numbers, run_with};
    use crate::runtime::StackItem;

    #[test]
    fn test_next_walks_items_then_reports_done() {
        let out = run_with(vec![numbers(&[5, 6])], |ctx| {
            unwrap(ctx);
            ctx.helper(Helper::NewIterator)?;
            for _ in 0..3 {
                ctx.em.emit(Op::Dup);
                ctx.helper(Helper::IteratorNext)?;
                ctx.em.emit(Op::Dup);
                result_done(ctx);
                ctx.em.emit(Op::Swap);
                result_value(ctx);
                ctx.em.push_int(2);
                ctx.em.emit(Op::Roll);
            }
            ctx.em.emit(Op::Drop);
            Ok(())
        })
        .unwrap();
        assert_eq!(
            out,
            vec![
                StackItem::boolean(false),
                StackItem::number(5),
                StackItem::boolean(false),
                StackItem::number(6),
                StackItem::boolean(true),
                StackItem::undefined(),
            ]
        );
    }
}
