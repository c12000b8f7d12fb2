//! Destructuring.
//!
//! A pattern consumes the value on top of the stack and stores each piece
//! into the nearest binding of its name, so declarations and parameters
//! share the lowering once their slots exist.

use crate::bytecode::{CompileError, JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::expr::emit_value;
use crate::compile::helpers::Helper;
use crate::compile::helpers::array;
use crate::compile::helpers::types::{expect_kind, type_tag, wrap};
use crate::compile::scope::store_slot;
use crate::lang::ValueKind;
use crate::lang::node::{BindingElement, Pattern};

/// ( w -- )
pub fn bind_pattern(ctx: &mut Ctx, pattern: &Pattern) -> CResult {
    match pattern {
        Pattern::Ident(name) => {
            let (frame, slot) = ctx.scopes.lookup(name).ok_or_else(|| {
                CompileError::internal(format!("binding '{}' has no slot", name))
            })?;
            store_slot(ctx, frame, slot);
            Ok(())
        }
        Pattern::Array { elements, rest } => bind_array(ctx, elements, rest.as_deref()),
        Pattern::Object(props) => bind_object(ctx, props),
    }
}

fn bind_array(
    ctx: &mut Ctx,
    elements: &[Option<BindingElement>],
    rest: Option<&Pattern>,
) -> CResult {
    expect_kind(ctx, ValueKind::Array, "value is not an array and cannot be destructured")?;
    for (i, element) in elements.iter().enumerate() {
        let Some(element) = element else {
            continue;
        };
        ctx.em.emit(Op::Dup);
        ctx.em.push_int(i as i64);
        wrap(ctx, ValueKind::Number);
        ctx.helper(Helper::ArrayGet)?;
        bind_element(ctx, element)?;
    }
    match rest {
        Some(rest) => {
            ctx.em.push_int(elements.len() as i64);
            wrap(ctx, ValueKind::Number);
            ctx.em.push_int(i64::MAX);
            wrap(ctx, ValueKind::Number);
            array::slice(ctx)?;
            bind_pattern(ctx, rest)
        }
        None => {
            ctx.em.emit(Op::Drop);
            Ok(())
        }
    }
}

fn bind_object(ctx: &mut Ctx, props: &[(String, BindingElement)]) -> CResult {
    expect_kind(ctx, ValueKind::Object, "value is not an object and cannot be destructured")?;
    for (key, element) in props {
        ctx.em.emit(Op::Dup);
        ctx.em.push_str(key);
        ctx.helper(Helper::FindObjectProperty)?;
        bind_element(ctx, element)?;
    }
    ctx.em.emit(Op::Drop);
    Ok(())
}

/// ( w -- ) substitute the default for `undefined`, then bind
fn bind_element(ctx: &mut Ctx, element: &BindingElement) -> CResult {
    if let Some(default) = &element.default {
        let keep = ctx.em.new_label();
        ctx.em.emit(Op::Dup);
        type_tag(ctx);
        ctx.em.push_int(ValueKind::Undefined.tag());
        ctx.em.emit(Op::NumEqual);
        ctx.em.jump(JumpKind::IfFalse, keep);
        ctx.em.emit(Op::Drop);
        emit_value(ctx, default)?;
        ctx.em.mark(keep);
    }
    bind_pattern(ctx, &element.target)
}
