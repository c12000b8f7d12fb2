use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::for_type;
use crate::lang::ValueKind;

pub fn push_undefined(ctx: &mut Ctx) {
    ctx.em.push_null();
    wrap(ctx, ValueKind::Undefined);
}

pub fn push_null_value(ctx: &mut Ctx) {
    ctx.em.push_null();
    wrap(ctx, ValueKind::Null);
}

pub fn wrap(ctx: &mut Ctx, kind: ValueKind) {
    ctx.em.push_int(kind.tag());
    ctx.em.pack_struct(2);
}

pub fn unwrap(ctx: &mut Ctx) {
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
}

pub fn type_tag(ctx: &mut Ctx) {
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
}

/// ( w -- bool ) for a value known to be `kind`
fn truthy_of(ctx: &mut Ctx, kind: ValueKind) {
    match kind {
        ValueKind::Boolean => unwrap(ctx),
        ValueKind::Number => {
            unwrap(ctx);
            ctx.em.push_int(0);
            ctx.em.emit(Op::NumNotEqual);
        }
        ValueKind::String | ValueKind::Buffer => {
            unwrap(ctx);
            ctx.em.emit(Op::Size);
            ctx.em.push_int(0);
            ctx.em.emit(Op::Gt);
        }
        ValueKind::Undefined | ValueKind::Null => {
            ctx.em.emit(Op::Drop);
            ctx.em.push_bool(false);
        }
        _ => {
            ctx.em.emit(Op::Drop);
            ctx.em.push_bool(true);
        }
    }
}

pub fn to_boolean(ctx: &mut Ctx, kind: Option<ValueKind>) -> CResult {
    match kind {
        Some(kind) => {
            truthy_of(ctx, kind);
            Ok(())
        }
        None => {
            // Every kind is covered, so the dispatch never throws.
            let mut arms: Vec<(Vec<ValueKind>, Box<dyn FnMut(&mut Ctx) -> CResult>)> = vec![
                (
                    vec![ValueKind::Undefined, ValueKind::Null],
                    Box::new(|ctx: &mut Ctx| {
                        truthy_of(ctx, ValueKind::Null);
                        Ok(())
                    }),
                ),
                (
                    vec![ValueKind::Boolean],
                    Box::new(|ctx: &mut Ctx| {
                        truthy_of(ctx, ValueKind::Boolean);
                        Ok(())
                    }),
                ),
                (
                    vec![ValueKind::Number],
                    Box::new(|ctx: &mut Ctx| {
                        truthy_of(ctx, ValueKind::Number);
                        Ok(())
                    }),
                ),
                (
                    vec![ValueKind::String, ValueKind::Buffer],
                    Box::new(|ctx: &mut Ctx| {
                        truthy_of(ctx, ValueKind::String);
                        Ok(())
                    }),
                ),
            ];
            let compound: Vec<ValueKind> = ValueKind::ALL
                .iter()
                .copied()
                .filter(|k| {
                    !matches!(
                        k,
                        ValueKind::Undefined
                            | ValueKind::Null
                            | ValueKind::Boolean
                            | ValueKind::Number
                            | ValueKind::String
                            | ValueKind::Buffer
                    )
                })
                .collect();
            arms.push((
                compound,
                Box::new(|ctx: &mut Ctx| {
                    truthy_of(ctx, ValueKind::Object);
                    Ok(())
                }),
            ));
            for_type(ctx, &mut arms)
        }
    }
}

/// ( n -- bytes )
///
/// Digits are taken from the value folded to `<= 0`, which every `i64` has.
pub fn number_to_string(ctx: &mut Ctx) {
    let folded = ctx.em.new_label();
    let digits = ctx.em.new_label();
    let unsigned = ctx.em.new_label();

    // n -- -|n| neg
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Lt);
    ctx.em.emit(Op::Dup);
    ctx.em.jump(JumpKind::IfTrue, folded);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Negate);
    ctx.em.emit(Op::Swap);
    ctx.em.mark(folded);

    // neg acc m
    ctx.em.emit(Op::Swap);
    ctx.em.push_bytes(b"");
    ctx.em.emit(Op::Swap);
    ctx.em.mark(digits);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(10);
    ctx.em.emit(Op::Mod);
    ctx.em.emit(Op::Negate);
    ctx.em.push_int(b'0' as i64);
    ctx.em.emit(Op::Add);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Cat);
    ctx.em.emit(Op::Swap);
    ctx.em.push_int(10);
    ctx.em.emit(Op::Div);
    ctx.em.emit(Op::Dup);
    ctx.em.jump(JumpKind::IfTrue, digits);

    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Swap);
    ctx.em.jump(JumpKind::IfFalse, unsigned);
    ctx.em.push_bytes(b"-");
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Cat);
    ctx.em.mark(unsigned);
}

fn raw_string_of(ctx: &mut Ctx, kind: ValueKind) {
    match kind {
        ValueKind::String => unwrap(ctx),
        ValueKind::Number => {
            unwrap(ctx);
            number_to_string(ctx);
        }
        ValueKind::Boolean => {
            let yes = ctx.em.new_label();
            let end = ctx.em.new_label();
            unwrap(ctx);
            ctx.em.jump(JumpKind::IfTrue, yes);
            ctx.em.push_bytes(b"false");
            ctx.em.jump(JumpKind::Always, end);
            ctx.em.mark(yes);
            ctx.em.push_bytes(b"true");
            ctx.em.mark(end);
        }
        ValueKind::Undefined | ValueKind::Null => {
            ctx.em.emit(Op::Drop);
            ctx.em.push_str(kind.name());
        }
        ValueKind::Error => {
            // The payload is the wrapped message.
            unwrap(ctx);
            unwrap(ctx);
            ctx.em.push_bytes(b"Error: ");
            ctx.em.emit(Op::Swap);
            ctx.em.emit(Op::Cat);
        }
        other => {
            ctx.em.emit(Op::Drop);
            ctx.em.push_str(&format!("[object {}]", other.name()));
        }
    }
}

pub fn to_raw_string(ctx: &mut Ctx, kind: Option<ValueKind>) -> CResult {
    if let Some(kind) = kind {
        raw_string_of(ctx, kind);
        return Ok(());
    }
    let mut arms: Vec<(Vec<ValueKind>, Box<dyn FnMut(&mut Ctx) -> CResult>)> = ValueKind::ALL
        .iter()
        .copied()
        .map(|kind| {
            let arm: Box<dyn FnMut(&mut Ctx) -> CResult> = Box::new(move |ctx: &mut Ctx| {
                raw_string_of(ctx, kind);
                Ok(())
            });
            (vec![kind], arm)
        })
        .collect();
    for_type(ctx, &mut arms)
}

/// `typeof` result for a value of `kind`.
pub fn type_of_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Undefined => "undefined",
        ValueKind::Boolean => "boolean",
        ValueKind::Number => "number",
        ValueKind::String => "string",
        ValueKind::Symbol => "symbol",
        _ => "object",
    }
}

/// ( w -- w(string) ) looked up by tag at runtime
pub fn type_of(ctx: &mut Ctx) {
    type_tag(ctx);
    // Pushed last-first so that index i holds the name for tag i.
    for kind in ValueKind::ALL.iter().rev() {
        ctx.em.push_str(type_of_name(*kind));
    }
    ctx.em.pack(ValueKind::ALL.len());
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::PickItem);
    wrap(ctx, ValueKind::String);
}

/// Convert two wrapped numbers on top of the stack to raw integers.
pub fn unwrap_pair(ctx: &mut Ctx) {
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
}

/// ( w -- w ) fault early with a `TypeError` unless the tag is `kind`.
pub fn expect_kind(ctx: &mut Ctx, kind: ValueKind, message: &str) -> CResult {
    let ok = ctx.em.new_label();
    ctx.em.emit(Op::Dup);
    type_tag(ctx);
    ctx.em.push_int(kind.tag());
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfTrue, ok);
    ctx.helper(Helper::ThrowTypeError(message.to_string()))?;
    ctx.em.mark(ok);
    Ok(())
}
