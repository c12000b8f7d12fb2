use serde::{Deserialize, Serialize};

use crate::lang::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// A construct with no lowering.
    UnsupportedSyntax,
    /// A name that is neither bound in an enclosing scope nor a known global.
    UnresolvedReference,
    /// A type that needed exactly one runtime representation had several.
    AmbiguousType,
    /// The public surface of a contract is malformed.
    InvalidContractShape,
}

impl DiagnosticCode {
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticCode::UnsupportedSyntax => "UnsupportedSyntax",
            DiagnosticCode::UnresolvedReference => "UnresolvedReference",
            DiagnosticCode::AmbiguousType => "AmbiguousType",
            DiagnosticCode::InvalidContractShape => "InvalidContractShape",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A problem in the program being compiled.
///
/// Diagnostics never stop the compilation pass; the offending node is
/// replaced by code that throws a `TypeError` when reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span,
            severity: Severity::Error,
        }
    }

    pub fn warning(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span,
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}[{}] at {}: {}",
            level,
            self.code.name(),
            self.span,
            self.message
        )
    }
}
