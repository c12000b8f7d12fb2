//! # Typed syntax tree
//!
//! The compiler does not parse or type-check. An external frontend hands it a
//! [`node::Module`] in which every expression already carries its resolved
//! [`types::Type`]. The [`build`] module offers small constructors for
//! producing such trees by hand.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`, top of stack last.
//! - `w(x)` denotes a wrapped runtime value, `raw` an unwrapped VM item.

pub mod build;
pub mod node;
pub mod span;
pub mod types;

pub use node::{Expr, ExprKind, Module, Stmt, StmtKind, Typed};
pub use span::Span;
pub use types::{ContractInterface, MethodSignature, Type, ValueKind};
