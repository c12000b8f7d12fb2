//! Lexical scopes and their runtime frames.
//!
//! At runtime the alternate stack holds the current context
//! `Array[scopes, this, global]`. `scopes` is an array of frames, one per
//! live lexical scope that declares bindings, outermost (the module frame)
//! at index 0. A frame is a plain array of slots.
//!
//! Resolution runs in two phases over one traversal, [`walk_bindings`]: the
//! counting pass fixes a scope's slot count before any code for it is
//! emitted, and the resolve pass hands out slots in the same order. A slot
//! past the counted size is a code generator bug and aborts compilation.

use tracing::trace;

use crate::bytecode::{CompileError, JumpKind, Op};
use crate::compile::completion::redirect_targets;
use crate::compile::ctx::{CResult, Ctx};
use crate::lang::node::{Param, Stmt, StmtKind, SwitchCase};

#[derive(Debug, Clone)]
struct Scope {
    names: Vec<String>,
    count: usize,
    frame: Option<usize>,
}

/// Compile-time mirror of the runtime frame chain.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
    frames: usize,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames live at runtime at this point.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Enter a scope with `count` slots. Returns its frame index, or None
    /// when the scope needs no frame.
    pub fn enter(&mut self, count: usize, force_frame: bool) -> Option<usize> {
        let frame = if count > 0 || force_frame {
            self.frames += 1;
            Some(self.frames - 1)
        } else {
            None
        };
        self.scopes.push(Scope {
            names: Vec::new(),
            count,
            frame,
        });
        frame
    }

    pub fn exit(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            if scope.frame.is_some() {
                self.frames -= 1;
            }
        }
    }

    /// Resolve pass: give `name` the next slot of the innermost scope.
    pub fn add(&mut self, name: &str) -> Result<usize, CompileError> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::internal("binding declared outside any scope"))?;
        if let Some(slot) = scope.names.iter().position(|n| n == name) {
            return Ok(slot);
        }
        let slot = scope.names.len();
        if slot >= scope.count {
            return Err(CompileError::slot_overflow(name, slot, scope.count));
        }
        scope.names.push(name.to_string());
        Ok(slot)
    }

    /// (frame, slot) of the nearest binding named `name`.
    pub fn lookup(&self, name: &str) -> Option<(usize, usize)> {
        self.scopes.iter().rev().find_map(|scope| {
            let frame = scope.frame?;
            let slot = scope.names.iter().position(|n| n == name)?;
            Some((frame, slot))
        })
    }
}

/// A construct that introduces a lexical scope.
#[derive(Debug, Clone, Copy)]
pub enum BindingSite<'a> {
    /// Module top level; always gets a frame.
    Module(&'a [Stmt]),
    Block(&'a [Stmt]),
    /// Parameters plus the declarations directly in the body.
    Function {
        params: &'a [Param],
        body: &'a [Stmt],
    },
    /// `for (init; ...)`
    ForInit(Option<&'a Stmt>),
    /// One name: a `for..of` variable or a `catch` parameter.
    Single(Option<&'a str>),
    Switch(&'a [SwitchCase]),
}

fn declared_in(stmt: &Stmt, visit: &mut dyn FnMut(&str)) {
    match &stmt.kind {
        StmtKind::Var { decls, .. } => {
            for d in decls {
                d.target.for_each_name(visit);
            }
        }
        StmtKind::Function(f) => visit(&f.name),
        StmtKind::Class(c) => visit(&c.name),
        _ => {}
    }
}

/// The single traversal both resolution passes use.
pub fn walk_bindings(site: BindingSite, visit: &mut dyn FnMut(&str)) {
    match site {
        BindingSite::Module(body) | BindingSite::Block(body) => {
            for stmt in body {
                declared_in(stmt, visit);
            }
        }
        BindingSite::Function { params, body } => {
            for p in params {
                visit(&p.name);
                if let Some(pattern) = &p.pattern {
                    pattern.for_each_name(visit);
                }
            }
            for stmt in body {
                declared_in(stmt, visit);
            }
        }
        BindingSite::ForInit(init) => {
            if let Some(stmt) = init {
                declared_in(stmt, visit);
            }
        }
        BindingSite::Single(name) => {
            if let Some(name) = name {
                visit(name);
            }
        }
        BindingSite::Switch(cases) => {
            for case in cases {
                for stmt in &case.body {
                    declared_in(stmt, visit);
                }
            }
        }
    }
}

/// Counting pass: distinct names the site declares.
pub fn count_bindings(site: BindingSite) -> usize {
    let mut names: Vec<String> = Vec::new();
    walk_bindings(site, &mut |name| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    });
    names.len()
}

// =============================================================================
// Frame emission
// =============================================================================

/// ( -- scopes )
pub fn push_scopes(ctx: &mut Ctx) {
    ctx.em.emit(Op::DupFromAlt);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
}

/// ( -- ) append a frame of `slots` nulls
pub fn frame_push(ctx: &mut Ctx, slots: usize) {
    push_scopes(ctx);
    ctx.em.push_int(slots as i64);
    ctx.em.emit(Op::NewArray);
    ctx.em.emit(Op::Append);
}

/// ( -- ) remove the innermost frame
pub fn frame_pop(ctx: &mut Ctx) {
    push_scopes(ctx);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Dec);
    ctx.em.emit(Op::Remove);
}

/// ( -- value ) raw slot contents
pub fn load_slot(ctx: &mut Ctx, frame: usize, slot: usize) {
    push_scopes(ctx);
    ctx.em.push_int(frame as i64);
    ctx.em.emit(Op::PickItem);
    ctx.em.push_int(slot as i64);
    ctx.em.emit(Op::PickItem);
}

/// ( value -- )
pub fn store_slot(ctx: &mut Ctx, frame: usize, slot: usize) {
    push_scopes(ctx);
    ctx.em.push_int(frame as i64);
    ctx.em.emit(Op::PickItem);
    ctx.em.push_int(slot as i64);
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::SetItem);
}

/// Run `body` inside the scope `site` introduces.
///
/// When the scope declares anything, a frame is pushed first and popped on
/// every way out: after a normal finish, and through a stub in front of each
/// outer completion target.
pub fn with_scope(
    ctx: &mut Ctx,
    site: BindingSite,
    body: &mut dyn FnMut(&mut Ctx) -> CResult,
) -> CResult {
    let force = matches!(site, BindingSite::Module(_));
    let count = count_bindings(site);
    if count == 0 && !force {
        ctx.scopes.enter(0, false);
        let result = body(ctx);
        ctx.scopes.exit();
        return result;
    }

    trace!(slots = count, frame = ctx.scopes.frames(), "scope frame");
    frame_push(ctx, count);
    ctx.scopes.enter(count, true);
    let mut names: Vec<String> = Vec::new();
    walk_bindings(site, &mut |name| names.push(name.to_string()));
    for name in &names {
        ctx.scopes.add(name)?;
    }

    // The module frame is never popped; the script returns instead.
    if force {
        let result = body(ctx);
        ctx.scopes.exit();
        return result;
    }

    let redirect = redirect_targets(ctx, None);
    let result = body(ctx);
    ctx.scopes.exit();
    result?;

    let end = ctx.em.new_label();
    let has_stubs = redirect.any_referenced(ctx);
    if ctx.em.depth().is_some() {
        frame_pop(ctx);
        if has_stubs {
            ctx.em.jump(JumpKind::Always, end);
        }
    }
    redirect.finish(ctx, &mut |ctx, _, orig| {
        frame_pop(ctx);
        ctx.em.jump(JumpKind::Always, orig);
        Ok(())
    })?;
    if ctx.em.is_referenced(end) || ctx.em.depth().is_some() {
        ctx.em.mark(end);
    }
    Ok(())
}
