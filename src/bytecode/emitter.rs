use crate::bytecode::Op;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{Script, SourceMapEntry};
use crate::bytecode::jump::{JumpTable, Label};
use crate::lang::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Always,
    IfTrue,
    IfFalse,
}

/// Append-only instruction buffer with a running stack-height check.
///
/// The emitter knows nothing about the source language. It tracks the static
/// height of the evaluation stack relative to the entry of the code region
/// being emitted, and verifies that every path reaching a label agrees on
/// that height. After an unconditional transfer the height is unknown until
/// the next label is placed.
///
/// The first fatal problem is recorded and reported by [`Emitter::check`] and
/// [`Emitter::assemble`]; later ops are still accepted so callers need not
/// thread a `Result` through every single instruction.
#[derive(Debug)]
pub struct Emitter {
    ops: Vec<Op>,
    spans: Vec<Span>,
    jumps: JumpTable,
    depth: Option<i32>,
    span: Span,
    fault: Option<CompileError>,
}

impl Emitter {
    pub fn new(entry_depth: i32) -> Self {
        Self {
            ops: Vec::new(),
            spans: Vec::new(),
            jumps: JumpTable::new(),
            depth: Some(entry_depth),
            span: Span::default(),
            fault: None,
        }
    }

    pub fn depth(&self) -> Option<i32> {
        self.depth
    }

    pub fn set_depth(&mut self, depth: Option<i32>) {
        self.depth = depth;
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    pub fn offset(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn fail(&mut self, err: CompileError) {
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }

    /// Surface the first recorded fatal error, if any.
    pub fn check(&self) -> Result<(), CompileError> {
        match &self.fault {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn push_op(&mut self, op: Op) -> usize {
        let at = self.ops.len();
        self.ops.push(op);
        self.spans.push(self.span);
        at
    }

    fn adjust(&mut self, pops: i32, pushes: i32, op: &Op) {
        if let Some(depth) = self.depth {
            if depth < pops {
                let offset = self.ops.len();
                self.fail(CompileError::StackUnderflow {
                    op: format!("{:?}", op),
                    offset,
                });
            }
            self.depth = Some(depth - pops + pushes);
        }
    }

    /// Emit an op with a static stack effect.
    pub fn emit(&mut self, op: Op) {
        match op.effect() {
            Some((pops, pushes)) => self.adjust(pops, pushes, &op),
            None => {
                self.fail(CompileError::internal(format!(
                    "{:?} has a dynamic stack effect",
                    op
                )));
            }
        }
        if op.target().is_some() {
            self.fail(CompileError::internal(format!(
                "{:?} must be emitted through a label",
                op
            )));
        }
        let terminal = op.is_terminal();
        self.push_op(op);
        if terminal {
            self.depth = None;
        }
    }

    pub fn emit_all(&mut self, ops: &[Op]) {
        for op in ops {
            self.emit(op.clone());
        }
    }

    /// Emit an op whose effect depends on a runtime count, applying `net`.
    pub fn emit_dynamic(&mut self, op: Op, net: i32) {
        if let Some(depth) = self.depth {
            self.depth = Some(depth + net);
        }
        self.push_op(op);
    }

    pub fn push_int(&mut self, n: i64) {
        self.emit(Op::PushInt(n));
    }

    pub fn push_bool(&mut self, b: bool) {
        self.emit(Op::PushBool(b));
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.emit(Op::PushBytes(bytes.to_vec()));
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_null(&mut self) {
        self.emit(Op::PushNull);
    }

    /// ( xn-1 .. x0 -- array ) with x0 at index 0
    pub fn pack(&mut self, n: usize) {
        self.push_int(n as i64);
        self.emit_dynamic(Op::Pack, -(n as i32));
    }

    pub fn pack_struct(&mut self, n: usize) {
        self.push_int(n as i64);
        self.emit_dynamic(Op::PackStruct, -(n as i32));
    }

    /// ( array -- copy ) shallow copy of an array
    pub fn copy_array(&mut self) {
        self.emit_dynamic(Op::Unpack, 0);
        self.emit_dynamic(Op::Pack, 0);
    }

    // =========================================================================
    // Labels
    // =========================================================================

    pub fn new_label(&mut self) -> Label {
        self.jumps.create(None)
    }

    /// A label every path must reach with exactly `depth` items.
    pub fn new_label_at(&mut self, depth: i32) -> Label {
        self.jumps.create(Some(depth))
    }

    pub fn label_depth(&self, label: Label) -> Option<i32> {
        self.jumps.depth(label)
    }

    pub fn is_referenced(&self, label: Label) -> bool {
        self.jumps.is_referenced(label)
    }

    fn join(&mut self, label: Label, depth: i32) {
        match self.jumps.depth(label) {
            Some(expected) if expected != depth => {
                self.fail(CompileError::stack_mismatch(
                    format!("label {}", label),
                    expected,
                    depth,
                ));
            }
            Some(_) => {}
            None => {
                if let Err(err) = self.jumps.set_depth(label, depth) {
                    self.fail(err);
                }
            }
        }
    }

    /// Place the label at the current offset.
    pub fn mark(&mut self, label: Label) {
        let addr = self.ops.len() as u32;
        if let Err(err) = self.jumps.place(label, addr) {
            self.fail(err);
        }
        match self.depth {
            Some(depth) => self.join(label, depth),
            None => self.depth = self.jumps.depth(label),
        }
    }

    pub fn jump(&mut self, kind: JumpKind, label: Label) {
        let op = match kind {
            JumpKind::Always => Op::Jmp(label.0),
            JumpKind::IfTrue => Op::JmpIf(label.0),
            JumpKind::IfFalse => Op::JmpIfNot(label.0),
        };
        if kind != JumpKind::Always {
            self.adjust(1, 0, &op);
        }
        if let Some(depth) = self.depth {
            self.join(label, depth);
        }
        let at = self.push_op(op);
        if let Err(err) = self.jumps.reference(at, label) {
            self.fail(err);
        }
        if kind == JumpKind::Always {
            self.depth = None;
        }
    }

    /// ( -- ptr ) push the address of a label
    pub fn push_addr(&mut self, label: Label) {
        let op = Op::PushAddr(label.0);
        self.adjust(0, 1, &op);
        let at = self.push_op(op);
        if let Err(err) = self.jumps.reference(at, label) {
            self.fail(err);
        }
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Patch every jump and produce the final script.
    pub fn assemble(self) -> Result<Script, CompileError> {
        self.check()?;
        let Emitter {
            mut ops,
            spans,
            jumps,
            ..
        } = self;
        jumps.patch(&mut ops)?;

        let mut source_map: Vec<SourceMapEntry> = Vec::new();
        for (offset, span) in spans.into_iter().enumerate() {
            if source_map.last().map(|e| e.span) != Some(span) {
                source_map.push(SourceMapEntry {
                    offset: offset as u32,
                    span,
                });
            }
        }

        Ok(Script { ops, source_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_tracks_static_effects() {
        let mut em = Emitter::new(0);
        em.push_int(1);
        em.push_int(2);
        em.emit(Op::Add);
        assert_eq!(em.depth(), Some(1));
        em.emit(Op::Dup);
        assert_eq!(em.depth(), Some(2));
    }

    #[test]
    fn test_pack_counts_items() {
        let mut em = Emitter::new(0);
        em.push_int(1);
        em.push_int(2);
        em.push_int(3);
        em.pack(3);
        assert_eq!(em.depth(), Some(1));
    }

    #[test]
    fn test_underflow_is_recorded() {
        let mut em = Emitter::new(0);
        em.emit(Op::Drop);
        assert!(matches!(
            em.check(),
            Err(CompileError::StackUnderflow { .. })
        ));
    }

    #[test]
    fn test_if_else_join_agrees() {
        let mut em = Emitter::new(0);
        let otherwise = em.new_label();
        let end = em.new_label();
        em.push_bool(true);
        em.jump(JumpKind::IfFalse, otherwise);
        em.push_int(1);
        em.jump(JumpKind::Always, end);
        assert_eq!(em.depth(), None);
        em.mark(otherwise);
        assert_eq!(em.depth(), Some(0));
        em.push_int(2);
        em.mark(end);
        assert_eq!(em.depth(), Some(1));
        assert!(em.check().is_ok());

        let script = em.assemble().unwrap();
        assert_eq!(script.ops[1], Op::JmpIfNot(4));
        assert_eq!(script.ops[3], Op::Jmp(5));
    }

    #[test]
    fn test_mismatched_join_is_fatal() {
        let mut em = Emitter::new(0);
        let end = em.new_label();
        em.push_bool(true);
        em.jump(JumpKind::IfTrue, end);
        em.push_int(1);
        em.mark(end);
        assert!(matches!(
            em.check(),
            Err(CompileError::StackMismatch { .. })
        ));
    }

    #[test]
    fn test_preset_label_restores_depth_after_dead_code() {
        let mut em = Emitter::new(1);
        let target = em.new_label_at(3);
        let skip = em.new_label();
        em.jump(JumpKind::Always, skip);
        em.mark(target);
        assert_eq!(em.depth(), Some(3));
        em.emit(Op::Drop);
        em.emit(Op::Drop);
        em.mark(skip);
        assert!(em.check().is_ok());
    }

    #[test]
    fn test_unplaced_label_fails_assembly() {
        let mut em = Emitter::new(0);
        let nowhere = em.new_label();
        em.jump(JumpKind::Always, nowhere);
        assert!(matches!(
            em.assemble(),
            Err(CompileError::UnresolvedJump { .. })
        ));
    }

    #[test]
    fn test_source_map_records_span_changes() {
        let mut em = Emitter::new(0);
        em.set_span(Span::new(1, 1));
        em.push_int(1);
        em.push_int(2);
        em.set_span(Span::new(2, 5));
        em.emit(Op::Add);
        let script = em.assemble().unwrap();
        assert_eq!(script.source_map.len(), 2);
        assert_eq!(script.source_map[1].offset, 2);
        assert_eq!(script.span_at(2), Some(Span::new(2, 5)));
        assert_eq!(script.span_at(1), Some(Span::new(1, 1)));
    }
}
