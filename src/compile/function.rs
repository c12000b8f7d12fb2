//! Function bodies and closures.
//!
//! A function is compiled in place: a jump skips its body, which starts at
//! depth 1 with `[args]` and ends at a single exit label holding
//! `[args kind value]`. After the body, the creating code builds the
//! callable from the entry address and a copy of the current frame array,
//! so the closure shares the frames themselves with its creator.

use tracing::trace;

use crate::bytecode::{CompileError, JumpKind, Op};
use crate::compile::completion::{CompletionKind, Targets};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::expr::emit_value;
use crate::compile::helpers::Helper;
use crate::compile::helpers::bind::bind_pattern;
use crate::compile::helpers::types::push_undefined;
use crate::compile::scope::{BindingSite, load_slot, push_scopes, store_slot, with_scope};
use crate::compile::stmt::emit_stmts;
use crate::lang::node::{Expr, FunctionBody, Param, Stmt, StmtKind};

#[derive(Debug, Clone, Copy)]
pub enum BodyRef<'a> {
    Block(&'a [Stmt]),
    /// Concise arrow body; its value is the result.
    Expr(&'a Expr),
}

impl<'a> From<&'a FunctionBody> for BodyRef<'a> {
    fn from(body: &'a FunctionBody) -> Self {
        match body {
            FunctionBody::Block(stmts) => BodyRef::Block(stmts),
            FunctionBody::Expr(e) => BodyRef::Expr(e),
        }
    }
}

/// ( -- callable )
pub fn emit_closure(ctx: &mut Ctx, params: &[Param], body: BodyRef, arrow: bool) -> CResult {
    emit_closure_with(ctx, params, body, arrow, &mut |_| Ok(()))
}

/// ( -- callable ) like [`emit_closure`], running `prologue ( -- )` once the
/// parameters are bound. Constructors use it for field initializers.
pub fn emit_closure_with(
    ctx: &mut Ctx,
    params: &[Param],
    body: BodyRef,
    arrow: bool,
    prologue: &mut dyn FnMut(&mut Ctx) -> CResult,
) -> CResult {
    if ctx.em.depth().is_none() {
        return Ok(());
    }
    let after = ctx.em.new_label();
    let entry = ctx.em.new_label_at(1);
    let exit = ctx.em.new_label_at(3);
    trace!(params = params.len(), arrow, "function");

    ctx.em.jump(JumpKind::Always, after);
    ctx.em.mark(entry);

    let saved_targets = std::mem::replace(&mut ctx.targets, Targets::region(Some(exit), exit));
    let saved_label = ctx.pending_label.take();
    let stmts: &[Stmt] = match body {
        BodyRef::Block(stmts) => stmts,
        BodyRef::Expr(_) => &[],
    };
    let site = BindingSite::Function {
        params,
        body: stmts,
    };
    let result = with_scope(ctx, site, &mut |ctx| {
        for (i, p) in params.iter().enumerate() {
            ctx.helper(Helper::ArgOrUndefined(i))?;
            let (frame, slot) = ctx.scopes.lookup(&p.name).ok_or_else(|| {
                CompileError::internal(format!("parameter '{}' has no slot", p.name))
            })?;
            store_slot(ctx, frame, slot);
            if let Some(pattern) = &p.pattern {
                load_slot(ctx, frame, slot);
                bind_pattern(ctx, pattern)?;
            }
        }
        prologue(ctx)?;
        match body {
            BodyRef::Block(stmts) => {
                hoist_functions(ctx, stmts)?;
                emit_stmts(ctx, stmts)
            }
            BodyRef::Expr(e) => {
                emit_value(ctx, e)?;
                ctx.em.push_int(CompletionKind::Normal.code());
                ctx.em.emit(Op::Swap);
                Ok(())
            }
        }
    });
    ctx.targets = saved_targets;
    ctx.pending_label = saved_label;
    result?;

    if matches!(body, BodyRef::Block(_)) && ctx.em.depth().is_some() {
        ctx.em.push_int(CompletionKind::Normal.code());
        push_undefined(ctx);
    }
    ctx.em.mark(exit);
    ctx.em.emit_all(&[Op::Rot, Op::Drop, Op::Ret]);

    ctx.em.mark(after);
    ctx.helper(Helper::PushGlobal)?;
    if arrow {
        ctx.helper(Helper::PushThis)?;
    } else {
        ctx.em.push_null();
    }
    push_scopes(ctx);
    ctx.em.copy_array();
    ctx.em.push_addr(entry);
    ctx.em.pack(4);
    Ok(())
}

/// Bind every function declared directly in `stmts` before any of them
/// runs, so calls may precede the declaration.
pub fn hoist_functions(ctx: &mut Ctx, stmts: &[Stmt]) -> CResult {
    for stmt in stmts {
        if let StmtKind::Function(f) = &stmt.kind {
            ctx.em.set_span(f.span);
            emit_closure(ctx, &f.params, BodyRef::Block(&f.body), false)?;
            ctx.helper(Helper::FunctionObject)?;
            let (frame, slot) = ctx.scopes.lookup(&f.name).ok_or_else(|| {
                CompileError::internal(format!("function '{}' has no slot", f.name))
            })?;
            store_slot(ctx, frame, slot);
        }
    }
    Ok(())
}
