//! Statements.
//!
//! A statement that completes normally leaves the stack as it found it.
//! Loops and labeled statements install completion targets two items above
//! their base, where the `[kind value]` record of a break or continue lands;
//! `try` redirects every outer target through its `finally` block.

use tracing::trace;

use crate::bytecode::{CompileError, JumpKind, Label, Op};
use crate::compile::class::emit_class;
use crate::compile::completion::{
    CompletionKind, LabeledTarget, complete_empty, complete_with, jump_completion,
    redirect_targets,
};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::diagnostic::DiagnosticCode;
use crate::compile::expr::{emit_expr, emit_value, kind_of};
use crate::compile::function::hoist_functions;
use crate::compile::helpers::Helper;
use crate::compile::helpers::bind::bind_pattern;
use crate::compile::helpers::control::emit_if;
use crate::compile::helpers::iterator::{result_done, result_value};
use crate::compile::helpers::types::{push_undefined, unwrap};
use crate::compile::options::EmitOptions;
use crate::compile::scope::{BindingSite, count_bindings, push_scopes, store_slot, with_scope};
use crate::lang::node::{CatchClause, Expr, Stmt, StmtKind, SwitchCase};
use crate::lang::{Span, ValueKind};

pub fn emit_stmts(ctx: &mut Ctx, stmts: &[Stmt]) -> CResult {
    for stmt in stmts {
        emit_stmt(ctx, stmt)?;
    }
    Ok(())
}

pub fn emit_stmt(ctx: &mut Ctx, stmt: &Stmt) -> CResult {
    if ctx.em.depth().is_none() {
        trace!(at = %stmt.span, "unreachable statement");
        return Ok(());
    }
    ctx.em.set_span(stmt.span);
    match &stmt.kind {
        StmtKind::Expr(e) => emit_expr(ctx, e, EmitOptions::EFFECT),
        StmtKind::Var { decls, .. } => {
            for decl in decls {
                match &decl.init {
                    Some(init) => emit_value(ctx, init)?,
                    None => push_undefined(ctx),
                }
                bind_pattern(ctx, &decl.target)?;
            }
            Ok(())
        }
        StmtKind::Function(_) => Ok(()),
        StmtKind::Class(decl) => {
            emit_class(ctx, decl)?;
            store_binding(ctx, &decl.name)
        }
        StmtKind::Return(value) => {
            let Some(ret) = ctx.targets.ret else {
                return ctx.error(
                    DiagnosticCode::UnsupportedSyntax,
                    stmt.span,
                    "return outside of a function",
                    0,
                );
            };
            match value {
                Some(value) => emit_value(ctx, value)?,
                None => push_undefined(ctx),
            }
            complete_with(ctx, CompletionKind::Return, ret);
            Ok(())
        }
        StmtKind::If {
            test,
            then,
            otherwise,
        } => {
            emit_value(ctx, test)?;
            ctx.helper(Helper::ToBoolean(kind_of(&test.ty)))?;
            match otherwise {
                Some(otherwise) => emit_if(
                    ctx,
                    &mut |ctx| emit_stmt(ctx, then),
                    Some(&mut |ctx| emit_stmt(ctx, otherwise)),
                ),
                None => emit_if(ctx, &mut |ctx| emit_stmt(ctx, then), None),
            }
        }
        StmtKind::Block(body) => emit_block(ctx, body),
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            let label = ctx.pending_label.take();
            emit_for(ctx, init.as_deref(), test.as_ref(), update.as_ref(), body, label)
        }
        StmtKind::ForOf {
            name,
            iterable,
            body,
        } => {
            let label = ctx.pending_label.take();
            emit_for_of(ctx, name, iterable, body, label, stmt.span)
        }
        StmtKind::While { test, body } => {
            let label = ctx.pending_label.take();
            emit_while(ctx, test, body, label)
        }
        StmtKind::DoWhile { body, test } => {
            let label = ctx.pending_label.take();
            emit_do_while(ctx, body, test, label)
        }
        StmtKind::Break(label) => emit_jump(ctx, CompletionKind::Break, label.as_deref(), stmt.span),
        StmtKind::Continue(label) => {
            emit_jump(ctx, CompletionKind::Continue, label.as_deref(), stmt.span)
        }
        StmtKind::Labeled { label, body } => match body.kind {
            StmtKind::For { .. }
            | StmtKind::ForOf { .. }
            | StmtKind::While { .. }
            | StmtKind::DoWhile { .. } => {
                ctx.pending_label = Some(label.clone());
                emit_stmt(ctx, body)
            }
            _ => emit_labeled_block(ctx, label, body),
        },
        StmtKind::Throw(value) => {
            emit_value(ctx, value)?;
            let catch = ctx.targets.catch;
            complete_with(ctx, CompletionKind::Throw, catch);
            Ok(())
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => match finalizer {
            Some(finalizer) => emit_try_finally(ctx, block, handler.as_ref(), finalizer),
            None => emit_protected(ctx, block, handler.as_ref()),
        },
        StmtKind::Switch {
            discriminant,
            cases,
        } => emit_switch(ctx, discriminant, cases),
        StmtKind::Empty => Ok(()),
    }
}

/// ( w -- ) store into the nearest binding named `name`
fn store_binding(ctx: &mut Ctx, name: &str) -> CResult {
    let (frame, slot) = ctx
        .scopes
        .lookup(name)
        .ok_or_else(|| CompileError::internal(format!("declaration '{}' has no slot", name)))?;
    store_slot(ctx, frame, slot);
    Ok(())
}

pub fn emit_block(ctx: &mut Ctx, body: &[Stmt]) -> CResult {
    with_scope(ctx, BindingSite::Block(body), &mut |ctx| {
        hoist_functions(ctx, body)?;
        emit_stmts(ctx, body)
    })
}

// =============================================================================
// Loops
// =============================================================================

/// Run `body` with break and continue going to `brk` and `cont`.
fn with_loop_targets(
    ctx: &mut Ctx,
    brk: Label,
    cont: Label,
    label: Option<String>,
    body: &mut dyn FnMut(&mut Ctx) -> CResult,
) -> CResult {
    let saved = ctx.targets.clone();
    ctx.targets.brk = Some(brk);
    ctx.targets.cont = Some(cont);
    if let Some(name) = label {
        ctx.targets.labeled.push(LabeledTarget {
            name,
            break_to: brk,
            continue_to: Some(cont),
        });
    }
    let result = body(ctx);
    ctx.targets = saved;
    result
}

/// Where a `[kind value]` record caught at `label` is dropped, when anything
/// jumped there. Control falls through to whatever follows.
fn place_handler(ctx: &mut Ctx, label: Label, after: Label) {
    if !ctx.em.is_referenced(label) {
        return;
    }
    if ctx.em.depth().is_some() {
        ctx.em.jump(JumpKind::Always, after);
    }
    ctx.em.mark(label);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
}

/// Give the innermost frame a fresh copy, so closures created by earlier
/// iterations keep the bindings they saw.
fn renew_frame(ctx: &mut Ctx) {
    push_scopes(ctx);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Dec);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::PickItem);
    ctx.em.copy_array();
    ctx.em.emit(Op::SetItem);
}

fn loop_labels(ctx: &mut Ctx) -> Result<(Label, Label), CompileError> {
    let depth = ctx
        .em
        .depth()
        .ok_or_else(|| CompileError::internal("loop entered in unreachable code"))?;
    Ok((ctx.em.new_label_at(depth + 2), ctx.em.new_label_at(depth + 2)))
}

fn emit_while(ctx: &mut Ctx, test: &Expr, body: &Stmt, label: Option<String>) -> CResult {
    let (brk, cont) = loop_labels(ctx)?;
    let top = ctx.em.new_label();
    let exit = ctx.em.new_label();

    ctx.em.mark(top);
    emit_value(ctx, test)?;
    ctx.helper(Helper::ToBoolean(kind_of(&test.ty)))?;
    ctx.em.jump(JumpKind::IfFalse, exit);
    with_loop_targets(ctx, brk, cont, label, &mut |ctx| emit_stmt(ctx, body))?;
    place_handler(ctx, cont, top);
    if ctx.em.depth().is_some() {
        ctx.em.jump(JumpKind::Always, top);
    }
    place_handler(ctx, brk, exit);
    ctx.em.mark(exit);
    Ok(())
}

fn emit_do_while(ctx: &mut Ctx, body: &Stmt, test: &Expr, label: Option<String>) -> CResult {
    let (brk, cont) = loop_labels(ctx)?;
    let top = ctx.em.new_label();
    let check = ctx.em.new_label();
    let exit = ctx.em.new_label();

    ctx.em.mark(top);
    with_loop_targets(ctx, brk, cont, label, &mut |ctx| emit_stmt(ctx, body))?;
    place_handler(ctx, cont, check);
    if ctx.em.is_referenced(check) || ctx.em.depth().is_some() {
        ctx.em.mark(check);
        emit_value(ctx, test)?;
        ctx.helper(Helper::ToBoolean(kind_of(&test.ty)))?;
        ctx.em.jump(JumpKind::IfTrue, top);
    }
    place_handler(ctx, brk, exit);
    if ctx.em.is_referenced(exit) || ctx.em.depth().is_some() {
        ctx.em.mark(exit);
    }
    Ok(())
}

fn emit_for(
    ctx: &mut Ctx,
    init: Option<&Stmt>,
    test: Option<&Expr>,
    update: Option<&Expr>,
    body: &Stmt,
    label: Option<String>,
) -> CResult {
    let per_iteration = count_bindings(BindingSite::ForInit(init)) > 0;
    let mut label = label;
    with_scope(ctx, BindingSite::ForInit(init), &mut |ctx| {
        if let Some(init) = init {
            emit_stmt(ctx, init)?;
        }
        let (brk, cont) = loop_labels(ctx)?;
        let top = ctx.em.new_label();
        let step = ctx.em.new_label();
        let exit = ctx.em.new_label();

        ctx.em.mark(top);
        if let Some(test) = test {
            emit_value(ctx, test)?;
            ctx.helper(Helper::ToBoolean(kind_of(&test.ty)))?;
            ctx.em.jump(JumpKind::IfFalse, exit);
        }
        with_loop_targets(ctx, brk, cont, label.take(), &mut |ctx| emit_stmt(ctx, body))?;
        place_handler(ctx, cont, step);
        if ctx.em.is_referenced(step) || ctx.em.depth().is_some() {
            ctx.em.mark(step);
            if per_iteration {
                renew_frame(ctx);
            }
            if let Some(update) = update {
                emit_expr(ctx, update, EmitOptions::EFFECT)?;
            }
            ctx.em.jump(JumpKind::Always, top);
        }
        place_handler(ctx, brk, exit);
        if ctx.em.is_referenced(exit) || ctx.em.depth().is_some() {
            ctx.em.mark(exit);
        }
        Ok(())
    })
}

fn emit_for_of(
    ctx: &mut Ctx,
    name: &str,
    iterable: &Expr,
    body: &Stmt,
    label: Option<String>,
    span: Span,
) -> CResult {
    let kind = match iterable.ty.single_kind() {
        Ok(kind @ (ValueKind::Array | ValueKind::IterableIterator)) => kind,
        Ok(kind) => {
            return ctx.error(
                DiagnosticCode::UnsupportedSyntax,
                span,
                format!("for..of over a value of type {}", kind),
                0,
            );
        }
        Err(ambiguous) => {
            return ctx.error(DiagnosticCode::AmbiguousType, span, ambiguous.to_string(), 0);
        }
    };
    let mut label = label;
    with_scope(ctx, BindingSite::Single(Some(name)), &mut |ctx| {
        let top = ctx.em.new_label();
        let exit = ctx.em.new_label();
        emit_value(ctx, iterable)?;

        if kind == ValueKind::Array {
            // items i
            unwrap(ctx);
            ctx.em.push_int(0);
            let (brk, cont) = loop_labels(ctx)?;
            let step = ctx.em.new_label();
            ctx.em.mark(top);
            ctx.em.emit(Op::Dup);
            ctx.em.push_int(2);
            ctx.em.emit(Op::Pick);
            ctx.em.emit(Op::Size);
            ctx.em.emit(Op::Lt);
            ctx.em.jump(JumpKind::IfFalse, exit);
            ctx.em.emit(Op::Over);
            ctx.em.emit(Op::Over);
            ctx.em.emit(Op::PickItem);
            renew_frame(ctx);
            store_binding(ctx, name)?;
            with_loop_targets(ctx, brk, cont, label.take(), &mut |ctx| emit_stmt(ctx, body))?;
            place_handler(ctx, cont, step);
            if ctx.em.is_referenced(step) || ctx.em.depth().is_some() {
                ctx.em.mark(step);
                ctx.em.emit(Op::Inc);
                ctx.em.jump(JumpKind::Always, top);
            }
            place_handler(ctx, brk, exit);
            ctx.em.mark(exit);
            ctx.em.emit_all(&[Op::Drop, Op::Drop]);
            return Ok(());
        }

        // it
        let (brk, cont) = loop_labels(ctx)?;
        let done = ctx.em.new_label();
        ctx.em.mark(top);
        ctx.em.emit(Op::Dup);
        ctx.helper(Helper::IteratorNext)?;
        ctx.em.emit(Op::Dup);
        result_done(ctx);
        unwrap(ctx);
        ctx.em.jump(JumpKind::IfTrue, done);
        result_value(ctx);
        renew_frame(ctx);
        store_binding(ctx, name)?;
        with_loop_targets(ctx, brk, cont, label.take(), &mut |ctx| emit_stmt(ctx, body))?;
        place_handler(ctx, cont, top);
        if ctx.em.depth().is_some() {
            ctx.em.jump(JumpKind::Always, top);
        }
        if ctx.em.is_referenced(brk) {
            ctx.em.mark(brk);
            ctx.em.emit_all(&[Op::Drop, Op::Drop]);
            ctx.em.jump(JumpKind::Always, exit);
        }
        ctx.em.mark(done);
        ctx.em.emit(Op::Drop);
        ctx.em.mark(exit);
        ctx.em.emit(Op::Drop);
        Ok(())
    })
}

fn emit_jump(ctx: &mut Ctx, kind: CompletionKind, label: Option<&str>, span: Span) -> CResult {
    let word = if kind == CompletionKind::Break {
        "break"
    } else {
        "continue"
    };
    let target = match label {
        None if kind == CompletionKind::Break => ctx.targets.brk,
        None => ctx.targets.cont,
        Some(name) => ctx.targets.find_label(name).and_then(|t| {
            if kind == CompletionKind::Break {
                Some(t.break_to)
            } else {
                t.continue_to
            }
        }),
    };
    match target {
        Some(target) => {
            complete_empty(ctx, kind, target);
            Ok(())
        }
        None => {
            let message = match label {
                Some(name) => format!("{} to unknown or unsuitable label '{}'", word, name),
                None => format!("{} outside of a loop", word),
            };
            ctx.error(DiagnosticCode::UnsupportedSyntax, span, message, 0)
        }
    }
}

fn emit_labeled_block(ctx: &mut Ctx, label: &str, body: &Stmt) -> CResult {
    let (brk, _) = loop_labels(ctx)?;
    let end = ctx.em.new_label();
    let saved = ctx.targets.clone();
    ctx.targets.labeled.push(LabeledTarget {
        name: label.to_string(),
        break_to: brk,
        continue_to: None,
    });
    let result = emit_stmt(ctx, body);
    ctx.targets = saved;
    result?;
    place_handler(ctx, brk, end);
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}

// =============================================================================
// Exceptions
// =============================================================================

/// `try { block } catch (param) { handler }` with throws from `block` going
/// to the handler and everything else to the current targets.
fn emit_protected(ctx: &mut Ctx, block: &[Stmt], handler: Option<&CatchClause>) -> CResult {
    let Some(handler) = handler else {
        return emit_block(ctx, block);
    };
    let depth = ctx
        .em
        .depth()
        .ok_or_else(|| CompileError::internal("try entered in unreachable code"))?;
    let catch = ctx.em.new_label_at(depth + 2);
    let end = ctx.em.new_label();

    let saved = ctx.targets.catch;
    ctx.targets.catch = catch;
    let result = emit_block(ctx, block);
    ctx.targets.catch = saved;
    result?;

    if !ctx.em.is_referenced(catch) {
        return Ok(());
    }
    if ctx.em.depth().is_some() {
        ctx.em.jump(JumpKind::Always, end);
    }
    ctx.em.mark(catch);
    ctx.em.emit(Op::Nip);
    let param = handler.param.as_deref();
    with_scope(ctx, BindingSite::Single(param), &mut |ctx| {
        match param {
            Some(name) => store_binding(ctx, name)?,
            None => ctx.em.emit(Op::Drop),
        }
        emit_block(ctx, &handler.body)
    })?;
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}

/// Every way out of the protected part reaches the finally block as
/// `[index kind value]`: index 0 for a normal finish, `i + 1` for the
/// completion redirected through stub `i`. Afterwards the completion is
/// resumed towards its original target.
fn emit_try_finally(
    ctx: &mut Ctx,
    block: &[Stmt],
    handler: Option<&CatchClause>,
    finalizer: &[Stmt],
) -> CResult {
    let depth = ctx
        .em
        .depth()
        .ok_or_else(|| CompileError::internal("try entered in unreachable code"))?;
    let finally = ctx.em.new_label_at(depth + 3);
    let end = ctx.em.new_label();

    let redirect = redirect_targets(ctx, Some(depth + 2));
    let protected = emit_protected(ctx, block, handler);
    if protected.is_err() {
        redirect.finish(ctx, &mut |_, _, _| Ok(()))?;
        return protected;
    }
    if ctx.em.depth().is_some() {
        ctx.em.push_int(0);
        ctx.em.push_int(CompletionKind::Normal.code());
        ctx.em.push_null();
        ctx.em.jump(JumpKind::Always, finally);
    }
    let mut resumed: Vec<(usize, Label)> = Vec::new();
    redirect.finish(ctx, &mut |ctx, i, orig| {
        ctx.em.push_int(i as i64 + 1);
        ctx.em.emit(Op::Rot);
        ctx.em.emit(Op::Rot);
        ctx.em.jump(JumpKind::Always, finally);
        resumed.push((i, orig));
        Ok(())
    })?;

    if !ctx.em.is_referenced(finally) {
        return Ok(());
    }
    ctx.em.mark(finally);
    emit_block(ctx, finalizer)?;
    if ctx.em.depth().is_none() {
        return Ok(());
    }

    // kind value index
    ctx.em.emit(Op::Rot);
    let resumes: Vec<(Label, Label)> = resumed
        .iter()
        .map(|(i, orig)| {
            let at = ctx.em.new_label();
            ctx.em.emit(Op::Dup);
            ctx.em.push_int(*i as i64 + 1);
            ctx.em.emit(Op::NumEqual);
            ctx.em.jump(JumpKind::IfTrue, at);
            (at, *orig)
        })
        .collect();
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop]);
    if !resumes.is_empty() {
        ctx.em.jump(JumpKind::Always, end);
    }
    for (at, orig) in resumes {
        ctx.em.mark(at);
        ctx.em.emit(Op::Drop);
        jump_completion(ctx, orig);
    }
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}

// =============================================================================
// Switch
// =============================================================================

fn emit_switch(ctx: &mut Ctx, discriminant: &Expr, cases: &[SwitchCase]) -> CResult {
    let mut label = ctx.pending_label.take();
    with_scope(ctx, BindingSite::Switch(cases), &mut |ctx| {
        for case in cases {
            hoist_functions(ctx, &case.body)?;
        }
        let (brk, _) = loop_labels(ctx)?;
        let exit = ctx.em.new_label();
        let bodies: Vec<Label> = cases.iter().map(|_| ctx.em.new_label()).collect();
        let mut stubs: Vec<(Label, Label)> = Vec::new();

        // d
        emit_value(ctx, discriminant)?;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let stub = ctx.em.new_label();
                ctx.em.emit(Op::Dup);
                emit_value(ctx, test)?;
                ctx.em.emit(Op::Equal);
                ctx.em.jump(JumpKind::IfTrue, stub);
                stubs.push((stub, bodies[i]));
            }
        }
        ctx.em.emit(Op::Drop);
        match cases.iter().position(|c| c.test.is_none()) {
            Some(default) => ctx.em.jump(JumpKind::Always, bodies[default]),
            None => ctx.em.jump(JumpKind::Always, exit),
        }
        for (stub, body) in stubs {
            ctx.em.mark(stub);
            ctx.em.emit(Op::Drop);
            ctx.em.jump(JumpKind::Always, body);
        }

        let saved = ctx.targets.clone();
        ctx.targets.brk = Some(brk);
        if let Some(name) = label.take() {
            ctx.targets.labeled.push(LabeledTarget {
                name,
                break_to: brk,
                continue_to: None,
            });
        }
        let mut result = Ok(());
        for (i, case) in cases.iter().enumerate() {
            if ctx.em.is_referenced(bodies[i]) || ctx.em.depth().is_some() {
                ctx.em.mark(bodies[i]);
            }
            result = emit_stmts(ctx, &case.body);
            if result.is_err() {
                break;
            }
        }
        ctx.targets = saved;
        result?;

        place_handler(ctx, brk, exit);
        if ctx.em.is_referenced(exit) || ctx.em.depth().is_some() {
            ctx.em.mark(exit);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use crate::compile::driver::tests::run_module;
    use crate::lang::build::*;
    use crate::lang::node::{BinaryOp, UpdateOp};
    use crate::lang::types::Type;
    use crate::lang::{Module, Stmt};
    use crate::runtime::StackItem;

    fn n(name: &str) -> crate::lang::Expr {
        ident(name, Type::Number)
    }

    fn incr(name: &str) -> Stmt {
        expr_stmt(update(UpdateOp::Inc, false, n(name)))
    }

    fn main_with(params: Vec<crate::lang::node::Param>, body: Vec<Stmt>) -> Module {
        module(
            "m",
            vec![function_stmt(export(function("main", params, Type::Unknown, body)))],
        )
    }

    #[test]
    fn test_labeled_continue_skips_to_outer_loop() {
        // let hits = 0;
        // outer: for (let i = 0; i < 3; i++)
        //   for (let j = 0; j < 3; j++) { if (j == 1) continue outer; hits++; }
        let inner = for_(
            Some(let_("j", num(0))),
            Some(lt(n("j"), num(3))),
            Some(update(UpdateOp::Inc, false, n("j"))),
            block(vec![
                if_(strict_eq(n("j"), num(1)), continue_(Some("outer")), None),
                incr("hits"),
            ]),
        );
        let outer = labeled(
            "outer",
            for_(
                Some(let_("i", num(0))),
                Some(lt(n("i"), num(3))),
                Some(update(UpdateOp::Inc, false, n("i"))),
                inner,
            ),
        );
        let m = main_with(vec![], vec![let_("hits", num(0)), outer, ret(n("hits"))]);
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(3));
    }

    #[test]
    fn test_throw_inside_loop_inside_try_reaches_catch() {
        // let i = 0;
        // try { while (true) { i++; if (i == 5) throw "stop"; } } catch (e) { return e + i; }
        let m = main_with(
            vec![],
            vec![
                let_("i", num(0)),
                try_catch(
                    vec![while_(
                        boolean(true),
                        block(vec![
                            incr("i"),
                            if_(strict_eq(n("i"), num(5)), throw(string("stop")), None),
                        ]),
                    )],
                    Some("e"),
                    vec![ret(add(ident("e", Type::String), n("i")))],
                ),
                ret(num(-1)),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::bytes("stop5"));
    }

    #[test]
    fn test_finally_runs_before_return_completes() {
        // let log = 0; function f() { try { return 1; } finally { log = 10; } }
        // return f() + log;
        let f = function(
            "f",
            vec![],
            Type::Number,
            vec![try_finally(
                vec![ret(num(1))],
                vec![expr_stmt(assign(n("log"), num(10)))],
            )],
        );
        let m = module(
            "m",
            vec![
                let_("log", num(0)),
                function_stmt(f),
                function_stmt(export(function(
                    "main",
                    vec![],
                    Type::Number,
                    vec![ret(add(call(ident("f", Type::function(Type::Number)), vec![]), n("log")))],
                ))),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(11));
    }

    #[test]
    fn test_break_through_finally_runs_it_once() {
        // let count = 0;
        // while (true) { try { break; } finally { count++; } }
        // return count;
        let m = main_with(
            vec![],
            vec![
                let_("count", num(0)),
                while_(
                    boolean(true),
                    try_finally(vec![break_(None)], vec![incr("count")]),
                ),
                ret(n("count")),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(1));
    }

    #[test]
    fn test_switch_falls_through_until_break() {
        // switch (x) { case 1: r += 1; case 2: r += 2; break; default: r = 100; }
        let body = |x: i64| {
            vec![
                let_("r", num(0)),
                switch(
                    num(x),
                    vec![
                        (Some(num(1)), vec![expr_stmt(compound(BinaryOp::Add, n("r"), num(1)))]),
                        (
                            Some(num(2)),
                            vec![
                                expr_stmt(compound(BinaryOp::Add, n("r"), num(2))),
                                break_(None),
                            ],
                        ),
                        (None, vec![expr_stmt(assign(n("r"), num(100)))]),
                    ],
                ),
                ret(n("r")),
            ]
        };
        for (x, expected) in [(1, 3), (2, 2), (7, 100)] {
            let m = main_with(vec![], body(x));
            assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(expected));
        }
    }

    #[test]
    fn test_for_of_sums_array_and_honors_break() {
        // let s = 0; for (const x of [1, 2, 3, 4]) { if (x == 3) break; s += x; } return s;
        let m = main_with(
            vec![],
            vec![
                let_("s", num(0)),
                for_of(
                    "x",
                    array(vec![num(1), num(2), num(3), num(4)], Type::Number),
                    block(vec![
                        if_(strict_eq(n("x"), num(3)), break_(None), None),
                        expr_stmt(compound(BinaryOp::Add, n("s"), n("x"))),
                    ]),
                ),
                ret(n("s")),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(3));
    }

    #[test]
    fn test_per_iteration_bindings_are_captured_separately() {
        // const fs = []; for (let i = 0; i < 3; i++) fs.push(() => i); return fs[0]() + fs[2]();
        let fn_ty = Type::function(Type::Number);
        let fs = || ident("fs", Type::array(fn_ty.clone()));
        let m = main_with(
            vec![],
            vec![
                const_("fs", array(vec![], fn_ty.clone())),
                for_(
                    Some(let_("i", num(0))),
                    Some(lt(n("i"), num(3))),
                    Some(update(UpdateOp::Inc, false, n("i"))),
                    expr_stmt(method_call(
                        fs(),
                        "push",
                        vec![arrow_expr(vec![], n("i"))],
                        Type::Number,
                    )),
                ),
                ret(add(
                    call(index(fs(), num(0), fn_ty.clone()), vec![]),
                    call(index(fs(), num(2), fn_ty.clone()), vec![]),
                )),
            ],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(2));
    }
}
