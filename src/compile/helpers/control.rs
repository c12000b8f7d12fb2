//! Helpers parameterized by emission callbacks.
//!
//! Callbacks see the stack shape documented on each function and must leave
//! the shape documented for them. A callback may also end in an abrupt
//! completion; the helper then simply has one fewer path reaching its join.

use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::lang::ValueKind;

/// An emission callback.
pub type Emit<'a> = Box<dyn FnMut(&mut Ctx) -> CResult + 'a>;

/// Kinds handled by one arm of [`for_type`].
pub type TypeArm<'a> = (Vec<ValueKind>, Emit<'a>);

/// ( bool -- .. ) run `then` or `otherwise`; both must leave the same shape.
pub fn emit_if(
    ctx: &mut Ctx,
    then: &mut dyn FnMut(&mut Ctx) -> CResult,
    otherwise: Option<&mut dyn FnMut(&mut Ctx) -> CResult>,
) -> CResult {
    let other = ctx.em.new_label();
    let end = ctx.em.new_label();
    ctx.em.jump(JumpKind::IfFalse, other);
    then(ctx)?;
    match otherwise {
        Some(otherwise) => {
            if ctx.em.depth().is_some() {
                ctx.em.jump(JumpKind::Always, end);
            }
            ctx.em.mark(other);
            otherwise(ctx)?;
        }
        None => ctx.em.mark(other),
    }
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}

/// ( w -- .. ) branch on the runtime tag of `w`. Each arm starts with `w`
/// on top. A tag no arm lists throws a `TypeError`.
pub fn for_type(ctx: &mut Ctx, arms: &mut [TypeArm<'_>]) -> CResult {
    let entries: Vec<_> = arms.iter().map(|_| ctx.em.new_label()).collect();
    let end = ctx.em.new_label();

    ctx.em.emit(Op::Dup);
    ctx.helper(Helper::TypeTag)?;
    for (i, (kinds, _)) in arms.iter().enumerate() {
        for kind in kinds {
            ctx.em.emit(Op::Dup);
            ctx.em.push_int(kind.tag());
            ctx.em.emit(Op::NumEqual);
            ctx.em.jump(JumpKind::IfTrue, entries[i]);
        }
    }
    ctx.helper(Helper::ThrowTypeError("unexpected value type".to_string()))?;

    for (i, (_, arm)) in arms.iter_mut().enumerate() {
        if !ctx.em.is_referenced(entries[i]) {
            continue;
        }
        ctx.em.mark(entries[i]);
        ctx.em.emit(Op::Drop);
        arm(ctx)?;
        if ctx.em.depth().is_some() {
            ctx.em.jump(JumpKind::Always, end);
        }
    }
    if ctx.em.is_referenced(end) {
        ctx.em.mark(end);
    }
    Ok(())
}

/// One arm of [`case`]: `test ( -- bool )` and `body`.
pub type CaseArm<'a> = (Emit<'a>, Emit<'a>);

/// Run the body of the first arm whose test holds, else `default`. Bodies
/// and `default` must leave the same shape.
pub fn case(
    ctx: &mut Ctx,
    arms: &mut [CaseArm<'_>],
    default: &mut dyn FnMut(&mut Ctx) -> CResult,
) -> CResult {
    let end = ctx.em.new_label();
    for (test, body) in arms.iter_mut() {
        let next = ctx.em.new_label();
        test(ctx)?;
        ctx.em.jump(JumpKind::IfFalse, next);
        body(ctx)?;
        if ctx.em.depth().is_some() {
            ctx.em.jump(JumpKind::Always, end);
        }
        ctx.em.mark(next);
    }
    default(ctx)?;
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}

/// ( items -- ) call `each ( v i -- )` for every element, in index order.
/// The size is read again on every iteration.
pub fn for_loop(ctx: &mut Ctx, each: &mut dyn FnMut(&mut Ctx) -> CResult) -> CResult {
    let top = ctx.em.new_label();
    let exit = ctx.em.new_label();

    ctx.em.push_int(0);
    ctx.em.mark(top);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfFalse, exit);

    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Over);
    each(ctx)?;
    if ctx.em.depth().is_some() {
        ctx.em.emit(Op::Inc);
        ctx.em.jump(JumpKind::Always, top);
    }

    ctx.em.mark(exit);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Drop);
    Ok(())
}

/// ( items acc -- acc ) fold `each ( acc v i -- acc )` over the elements.
pub fn arr_reduce(ctx: &mut Ctx, each: &mut dyn FnMut(&mut Ctx) -> CResult) -> CResult {
    let top = ctx.em.new_label();
    let exit = ctx.em.new_label();

    // acc items i
    ctx.em.emit(Op::Swap);
    ctx.em.push_int(0);
    ctx.em.mark(top);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Lt);
    ctx.em.jump(JumpKind::IfFalse, exit);

    // items i acc v i
    ctx.em.emit(Op::Rot);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::PickItem);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    each(ctx)?;
    if ctx.em.depth().is_some() {
        ctx.em.emit(Op::Rot);
        ctx.em.emit(Op::Rot);
        ctx.em.emit(Op::Inc);
        ctx.em.jump(JumpKind::Always, top);
    }

    ctx.em.mark(exit);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Drop);
    Ok(())
}
