use serde::{Deserialize, Serialize};

use crate::bytecode::Op;
use crate::bytecode::compile_error::CompileError;

/// Handle to a jump target that may not have an address yet.
///
/// A label becomes a jump target when some op refers to it. A target must be
/// placed exactly once before assembly. A label nothing refers to is only a
/// reservation: it may stay unplaced and is never written into an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub(crate) u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct LabelEntry {
    addr: Option<u32>,
    /// Stack height every path must have on arrival.
    depth: Option<i32>,
    refs: u32,
}

/// Arena of forward references, patched once their address is known.
#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    entries: Vec<LabelEntry>,
    /// (op index, label) pairs awaiting an address.
    fixups: Vec<(usize, Label)>,
}

impl JumpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, depth: Option<i32>) -> Label {
        let label = Label(self.entries.len() as u32);
        self.entries.push(LabelEntry {
            depth,
            ..LabelEntry::default()
        });
        label
    }

    fn entry(&self, label: Label) -> Result<&LabelEntry, CompileError> {
        self.entries
            .get(label.0 as usize)
            .ok_or_else(|| CompileError::internal(format!("unknown label {}", label)))
    }

    fn entry_mut(&mut self, label: Label) -> Result<&mut LabelEntry, CompileError> {
        self.entries
            .get_mut(label.0 as usize)
            .ok_or_else(|| CompileError::internal(format!("unknown label {}", label)))
    }

    pub fn depth(&self, label: Label) -> Option<i32> {
        self.entries.get(label.0 as usize).and_then(|e| e.depth)
    }

    pub fn set_depth(&mut self, label: Label, depth: i32) -> Result<(), CompileError> {
        self.entry_mut(label)?.depth = Some(depth);
        Ok(())
    }

    pub fn is_placed(&self, label: Label) -> bool {
        self.entries
            .get(label.0 as usize)
            .map(|e| e.addr.is_some())
            .unwrap_or(false)
    }

    /// True when some op jumps to (or takes the address of) the label.
    pub fn is_referenced(&self, label: Label) -> bool {
        self.entries
            .get(label.0 as usize)
            .map(|e| e.refs > 0)
            .unwrap_or(false)
    }

    pub fn reference(&mut self, at: usize, label: Label) -> Result<(), CompileError> {
        self.entry_mut(label)?.refs += 1;
        self.fixups.push((at, label));
        Ok(())
    }

    /// Fix the label's address. Each label is placed exactly once.
    pub fn place(&mut self, label: Label, addr: u32) -> Result<(), CompileError> {
        let entry = self.entry_mut(label)?;
        if entry.addr.is_some() {
            return Err(CompileError::DuplicateLabel { label });
        }
        entry.addr = Some(addr);
        Ok(())
    }

    pub fn addr(&self, label: Label) -> Result<u32, CompileError> {
        self.entry(label)?
            .addr
            .ok_or(CompileError::UnresolvedJump { label })
    }

    /// Labels that are referenced but have no address yet.
    pub fn unresolved(&self) -> Vec<Label> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.refs > 0 && e.addr.is_none())
            .map(|(i, _)| Label(i as u32))
            .collect()
    }

    /// Rewrite every recorded operand with its label's address. Fails on
    /// the first referenced label that was never placed.
    pub fn patch(&self, ops: &mut [Op]) -> Result<(), CompileError> {
        if let Some(&label) = self.unresolved().first() {
            return Err(CompileError::UnresolvedJump { label });
        }
        for &(at, label) in &self.fixups {
            let addr = self.addr(label)?;
            let op = ops
                .get_mut(at)
                .ok_or_else(|| CompileError::internal(format!("fixup past end at {}", at)))?;
            op.set_target(addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_resolves_forward_reference() {
        let mut table = JumpTable::new();
        let end = table.create(None);
        let mut ops = vec![Op::Jmp(0), Op::PushInt(1), Op::Drop];
        table.reference(0, end).unwrap();
        table.place(end, 3).unwrap();
        table.patch(&mut ops).unwrap();
        assert_eq!(ops[0], Op::Jmp(3));
    }

    #[test]
    fn test_unplaced_label_is_fatal() {
        let mut table = JumpTable::new();
        let lost = table.create(None);
        let mut ops = vec![Op::JmpIf(0)];
        table.reference(0, lost).unwrap();
        let err = table.patch(&mut ops).unwrap_err();
        assert_eq!(err, CompileError::UnresolvedJump { label: lost });
    }

    #[test]
    fn test_label_placed_twice_is_fatal() {
        let mut table = JumpTable::new();
        let label = table.create(None);
        table.place(label, 1).unwrap();
        assert!(matches!(
            table.place(label, 2),
            Err(CompileError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_reservation_without_references_needs_no_address() {
        let mut table = JumpTable::new();
        let spare = table.create(Some(2));
        assert!(!table.is_referenced(spare));
        assert_eq!(table.depth(spare), Some(2));
        assert!(table.unresolved().is_empty());
        let mut ops = vec![Op::Ret];
        assert!(table.patch(&mut ops).is_ok());
        assert_eq!(ops, vec![Op::Ret]);
    }

    #[test]
    fn test_every_referenced_label_is_patched() {
        let mut table = JumpTable::new();
        let back = table.create(None);
        let fwd = table.create(None);
        let mut ops = vec![Op::PushBool(true), Op::JmpIf(0), Op::Jmp(0), Op::Ret];
        table.place(back, 0).unwrap();
        table.reference(1, fwd).unwrap();
        table.reference(2, back).unwrap();
        assert_eq!(table.unresolved(), vec![fwd]);
        table.place(fwd, 3).unwrap();
        assert!(table.unresolved().is_empty());
        table.patch(&mut ops).unwrap();
        assert_eq!(ops[1], Op::JmpIf(3));
        assert_eq!(ops[2], Op::Jmp(0));
    }
}
