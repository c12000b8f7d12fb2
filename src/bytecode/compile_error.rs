use crate::bytecode::jump::Label;
use crate::bytecode::stack_check_error::StackCheckError;

/// A fatal code-generator failure.
///
/// These indicate a bug in the compiler rather than in the program being
/// compiled, so they abort the whole compilation. User errors are reported
/// as diagnostics instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A binding was resolved to a slot beyond its scope's counted size.
    SlotOverflow {
        name: String,
        slot: usize,
        count: usize,
    },
    /// A jump refers to a label that was never placed.
    UnresolvedJump { label: Label },
    /// A label was placed more than once.
    DuplicateLabel { label: Label },
    /// Two control-flow paths reach the same point with different stack heights.
    StackMismatch {
        at: String,
        expected: i32,
        found: i32,
    },
    /// The statically tracked stack height went negative.
    StackUnderflow { op: String, offset: usize },
    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn slot_overflow(name: &str, slot: usize, count: usize) -> Self {
        CompileError::SlotOverflow {
            name: name.to_string(),
            slot,
            count,
        }
    }

    pub fn stack_mismatch(at: impl Into<String>, expected: i32, found: i32) -> Self {
        CompileError::StackMismatch {
            at: at.into(),
            expected,
            found,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::SlotOverflow { name, slot, count } => write!(
                f,
                "compile error: binding '{}' resolved to slot {} but its scope holds {} slots",
                name, slot, count
            ),
            CompileError::UnresolvedJump { label } => {
                write!(f, "compile error: jump target {} was never placed", label)
            }
            CompileError::DuplicateLabel { label } => {
                write!(f, "compile error: jump target {} placed twice", label)
            }
            CompileError::StackMismatch {
                at,
                expected,
                found,
            } => write!(
                f,
                "compile error: stack height mismatch at {}: expected {}, found {}",
                at, expected, found
            ),
            CompileError::StackUnderflow { op, offset } => write!(
                f,
                "compile error: stack underflow emitting {} at offset {}",
                op, offset
            ),
            CompileError::Internal(msg) => {
                write!(f, "compile error: internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<StackCheckError> for CompileError {
    fn from(err: StackCheckError) -> Self {
        CompileError::Internal(err.to_string())
    }
}
