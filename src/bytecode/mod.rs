pub mod compile_error;
pub mod disasm;
pub mod emitter;
pub mod ir;
pub mod jump;
pub mod op;
pub mod stack_check_error;
pub mod syscall;

pub use compile_error::CompileError;
pub use emitter::{Emitter, JumpKind};
pub use ir::{Script, SourceMapEntry};
pub use jump::Label;
pub use op::Op;
pub use stack_check_error::{StackCheckError, check_script};
pub use syscall::Syscall;
