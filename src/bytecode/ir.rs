use crate::bytecode::Op;
use crate::lang::Span;
use serde::{Deserialize, Serialize};

/// Maps the op at `offset` (and every following op up to the next entry)
/// back to a source position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub offset: u32,
    pub span: Span,
}

/// An assembled script: one contiguous instruction stream.
///
/// Convention: execution starts at offset 0 with the invocation arguments
/// as the only stack item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub ops: Vec<Op>,
    pub source_map: Vec<SourceMapEntry>,
}

impl Script {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            source_map: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Source position of the op at `offset`.
    pub fn span_at(&self, offset: usize) -> Option<Span> {
        let idx = self
            .source_map
            .partition_point(|entry| entry.offset as usize <= offset);
        if idx == 0 {
            None
        } else {
            Some(self.source_map[idx - 1].span)
        }
    }

    /// Human-readable listing, one op per line.
    pub fn disassemble(&self) -> String {
        crate::bytecode::disasm::disassemble_to_string(self)
    }

    /// Encode the instruction stream as the deployable byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&self.ops)
    }

    /// Decode a byte buffer produced by [`Script::to_bytes`]. The source map
    /// is not part of the encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Script, postcard::Error> {
        let ops: Vec<Op> = postcard::from_bytes(bytes)?;
        Ok(Script::new(ops))
    }
}
