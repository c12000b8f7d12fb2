//! quill compiles typed JavaScript-family syntax trees into scripts for a
//! NEO-style stack VM.
//!
//! - [`lang`]: the typed tree handed in by a frontend.
//! - [`compile`]: code generation, diagnostics and contract metadata.
//! - [`bytecode`]: opcodes, the emitter and the assembled [`bytecode::Script`].
//! - [`runtime`]: a reference VM with an in-memory host, used to execute
//!   compiled scripts.

pub mod bytecode;
pub mod compile;
pub mod lang;
pub mod runtime;

pub use compile::{CompileOutput, CompilerConfig, Diagnostic, compile};
