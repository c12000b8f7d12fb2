//! Calling convention.
//!
//! A callable is `Array[address, scopes, this, global]`. `this` is null for
//! ordinary functions and methods, which take the receiver from the call
//! site; arrow functions capture it. The callee starts with `[args]` on the
//! stack and the context `Array[scopes, this, global]` on top of the
//! alternate stack, and leaves `[kind value]`.

use crate::bytecode::{JumpKind, Op};
use crate::compile::completion::{CompletionKind, complete_with, jump_completion};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::object::CALL;
use crate::compile::helpers::types::{push_undefined, type_tag, unwrap, wrap};
use crate::lang::ValueKind;

pub fn get_callable(ctx: &mut Ctx) -> CResult {
    let bad = ctx.em.new_label();
    let ok = ctx.em.new_label();

    ctx.em.emit(Op::Dup);
    type_tag(ctx);
    ctx.em.push_int(ValueKind::Object.tag());
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfFalse, bad);
    unwrap(ctx);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(CALL);
    ctx.em.emit(Op::HasKey);
    ctx.em.jump(JumpKind::IfFalse, bad);
    ctx.em.push_str(CALL);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, ok);

    ctx.em.mark(bad);
    ctx.em.emit(Op::Drop);
    throw_type_error(ctx, "value is not a function")?;

    ctx.em.mark(ok);
    Ok(())
}

pub fn invoke(ctx: &mut Ctx) {
    let captured = ctx.em.new_label();
    let build = ctx.em.new_label();

    // args callable this
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(2);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::IsNull);
    ctx.em.jump(JumpKind::IfFalse, captured);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Swap);
    ctx.em.jump(JumpKind::Always, build);
    ctx.em.mark(captured);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Drop);

    ctx.em.mark(build);
    ctx.em.emit(Op::Over);
    ctx.em.push_int(3);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Swap);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.copy_array();
    ctx.em.pack(3);
    ctx.em.emit(Op::ToAlt);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::CallA);
    ctx.em.emit(Op::FromAlt);
    ctx.em.emit(Op::Drop);
}

pub fn check_throw(ctx: &mut Ctx) {
    let ok = ctx.em.new_label();
    ctx.em.emit(Op::Over);
    ctx.em.push_int(CompletionKind::Throw.code());
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfFalse, ok);
    let catch = ctx.targets.catch;
    jump_completion(ctx, catch);
    ctx.em.mark(ok);
    ctx.em.emit(Op::Nip);
}

pub fn arg_or_undefined(ctx: &mut Ctx, i: usize) -> CResult {
    let absent = ctx.em.new_label();
    let end = ctx.em.new_label();
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(i as i64);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfFalse, absent);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(i as i64);
    ctx.em.emit(Op::PickItem);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(absent);
    push_undefined(ctx);
    ctx.em.mark(end);
    Ok(())
}

pub fn pack_args(ctx: &mut Ctx, n: usize) {
    match n {
        0 | 1 => {}
        2 => ctx.em.emit(Op::Swap),
        3 => ctx.em.emit(Op::Reverse3),
        4 => ctx.em.emit(Op::Reverse4),
        _ => {
            ctx.em.push_int(n as i64);
            ctx.em.emit(Op::ReverseN);
        }
    }
    ctx.em.pack(n);
}

pub fn new_error(ctx: &mut Ctx) {
    wrap(ctx, ValueKind::Error);
}

pub fn throw_type_error(ctx: &mut Ctx, message: &str) -> CResult {
    if ctx.em.depth().is_none() {
        return Ok(());
    }
    ctx.em.push_str(&format!("TypeError: {}", message));
    wrap(ctx, ValueKind::String);
    new_error(ctx);
    let catch = ctx.targets.catch;
    complete_with(ctx, CompletionKind::Throw, catch);
    Ok(())
}
