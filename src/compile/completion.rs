//! Completion records.
//!
//! A statement that finishes normally leaves the stack as it found it. Any
//! other outcome materializes a record `[kind value]` (value on top) and
//! jumps to the label that handles that kind: the enclosing loop for
//! break/continue, the enclosing `catch` for throw, the function exit for
//! return. Every handler label is created with a preset depth, so a jump
//! from deeper inside an expression first discards whatever lies between
//! the record and the handler's base.

use crate::bytecode::{CompileError, JumpKind, Label, Op};
use crate::compile::ctx::{CResult, Ctx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum CompletionKind {
    Normal = 0,
    Return = 1,
    Break = 2,
    Continue = 3,
    Throw = 4,
}

impl CompletionKind {
    pub fn code(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTarget {
    pub name: String,
    pub break_to: Label,
    /// Only loops can be continued.
    pub continue_to: Option<Label>,
}

/// Where each completion kind goes from the current emission point.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    /// None outside function bodies.
    pub ret: Option<Label>,
    pub catch: Label,
    pub brk: Option<Label>,
    pub cont: Option<Label>,
    pub labeled: Vec<LabeledTarget>,
}

impl Targets {
    /// Targets at the top of a code region: only return and throw.
    pub fn region(ret: Option<Label>, catch: Label) -> Self {
        Targets {
            ret,
            catch,
            brk: None,
            cont: None,
            labeled: Vec::new(),
        }
    }

    /// Every distinct label, in a stable order.
    pub fn labels(&self) -> Vec<Label> {
        let mut out: Vec<Label> = Vec::new();
        let mut add = |l: Label| {
            if !out.contains(&l) {
                out.push(l);
            }
        };
        if let Some(l) = self.ret {
            add(l);
        }
        add(self.catch);
        if let Some(l) = self.brk {
            add(l);
        }
        if let Some(l) = self.cont {
            add(l);
        }
        for t in &self.labeled {
            add(t.break_to);
            if let Some(l) = t.continue_to {
                add(l);
            }
        }
        out
    }

    pub fn map(&self, f: impl Fn(Label) -> Label) -> Targets {
        Targets {
            ret: self.ret.map(&f),
            catch: f(self.catch),
            brk: self.brk.map(&f),
            cont: self.cont.map(&f),
            labeled: self
                .labeled
                .iter()
                .map(|t| LabeledTarget {
                    name: t.name.clone(),
                    break_to: f(t.break_to),
                    continue_to: t.continue_to.map(&f),
                })
                .collect(),
        }
    }

    pub fn find_label(&self, name: &str) -> Option<&LabeledTarget> {
        self.labeled.iter().rev().find(|t| t.name == name)
    }
}

/// ( .. kind value -- ) jump to `target`, first dropping every item between
/// the record and the target's base.
pub fn jump_completion(ctx: &mut Ctx, target: Label) {
    if let (Some(cur), Some(base)) = (ctx.em.depth(), ctx.em.label_depth(target)) {
        if cur < base {
            ctx.em.fail(CompileError::stack_mismatch(
                format!("completion jump to {}", target),
                base,
                cur,
            ));
        }
        for _ in base..cur {
            ctx.em.emit(Op::Rot);
            ctx.em.emit(Op::Drop);
        }
    }
    ctx.em.jump(JumpKind::Always, target);
}

/// ( value -- ) complete with `kind`, carrying the value on top.
pub fn complete_with(ctx: &mut Ctx, kind: CompletionKind, target: Label) {
    ctx.em.push_int(kind.code());
    ctx.em.emit(Op::Swap);
    jump_completion(ctx, target);
}

/// ( -- ) break or continue: the record carries no value.
pub fn complete_empty(ctx: &mut Ctx, kind: CompletionKind, target: Label) {
    ctx.em.push_int(kind.code());
    ctx.em.push_null();
    jump_completion(ctx, target);
}

/// Outer targets replaced by local stubs for the duration of a body.
///
/// Scopes use this to pop their frame on the way out, and `finally` to run
/// before the original target is reached.
pub struct Redirect {
    saved: Targets,
    stubs: Vec<(Label, Label)>,
}

/// Replace every current target with a fresh stub. Stubs get `depth` when
/// given, else the depth of the target they stand in for.
pub fn redirect_targets(ctx: &mut Ctx, depth: Option<i32>) -> Redirect {
    let saved = ctx.targets.clone();
    let mut stubs: Vec<(Label, Label)> = Vec::new();
    for orig in saved.labels() {
        let at = depth.or_else(|| ctx.em.label_depth(orig));
        let stub = match at {
            Some(d) => ctx.em.new_label_at(d),
            None => ctx.em.new_label(),
        };
        stubs.push((orig, stub));
    }
    ctx.targets = saved.map(|l| {
        stubs
            .iter()
            .find(|(orig, _)| *orig == l)
            .map(|(_, stub)| *stub)
            .unwrap_or(l)
    });
    Redirect { saved, stubs }
}

impl Redirect {
    pub fn any_referenced(&self, ctx: &Ctx) -> bool {
        self.stubs.iter().any(|(_, stub)| ctx.em.is_referenced(*stub))
    }

    /// Restore the outer targets, then place each stub that was jumped to and
    /// let `emit_stub(ctx, index, original)` emit its body. Stub bodies must
    /// not fall through.
    pub fn finish(
        self,
        ctx: &mut Ctx,
        emit_stub: &mut dyn FnMut(&mut Ctx, usize, Label) -> CResult,
    ) -> CResult {
        ctx.targets = self.saved;
        for (i, (orig, stub)) in self.stubs.into_iter().enumerate() {
            if !ctx.em.is_referenced(stub) {
                continue;
            }
            ctx.em.mark(stub);
            emit_stub(ctx, i, orig)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Emitter;

    #[test]
    fn test_targets_map_keeps_label_names() {
        let mut em = Emitter::new(0);
        let (a, b, c) = (em.new_label(), em.new_label(), em.new_label());
        let targets = Targets {
            ret: Some(a),
            catch: a,
            brk: Some(b),
            cont: None,
            labeled: vec![LabeledTarget {
                name: "outer".to_string(),
                break_to: b,
                continue_to: Some(c),
            }],
        };
        assert_eq!(targets.labels(), vec![a, b, c]);
        let mapped = targets.map(|l| if l == b { c } else { l });
        assert_eq!(mapped.brk, Some(c));
        assert_eq!(mapped.find_label("outer").map(|t| t.break_to), Some(c));
    }
}
