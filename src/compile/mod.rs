//! # Code generation
//!
//! Lowers a typed [`Module`](crate::lang::Module) into a single
//! [`Script`](crate::bytecode::Script) for the stack VM.
//!
//! Every emission procedure takes a [`ctx::Ctx`] holding the emitter, the
//! scope chain and the current completion targets. Errors in the program
//! being compiled become [`Diagnostic`]s and a throwing placeholder; only a
//! fault in the generator itself aborts with a
//! [`CompileError`](crate::bytecode::CompileError).

pub mod builtins;
pub mod class;
pub mod completion;
pub mod config;
pub mod contract;
pub mod ctx;
pub mod diagnostic;
pub mod driver;
pub mod expr;
pub mod function;
pub mod helpers;
pub mod metadata;
pub mod options;
pub mod scope;
pub mod stmt;

pub use config::CompilerConfig;
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use driver::{CompileOutput, compile};
pub use metadata::ContractMetadata;
