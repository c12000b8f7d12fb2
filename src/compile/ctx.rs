use std::collections::HashMap;

use tracing::warn;

use crate::bytecode::{CompileError, Emitter, Label, Op};
use crate::compile::completion::Targets;
use crate::compile::config::CompilerConfig;
use crate::compile::diagnostic::{Diagnostic, DiagnosticCode};
use crate::compile::helpers::Helper;
use crate::compile::metadata::EventInfo;
use crate::compile::scope::ScopeChain;
use crate::lang::node::Expr;
use crate::lang::{Span, Type};

/// Result of emitting one node or helper.
pub type CResult = Result<(), CompileError>;

/// How a smart-contract property is persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageKind {
    /// One value under `[0x00] ++ name`.
    Common,
    /// Entries under `[0x01] ++ name ++ [0x00] ++ parts`.
    Map { key_parts: usize },
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageProp {
    pub name: String,
    pub ty: Type,
    pub kind: StorageKind,
    pub init: Option<Expr>,
}

/// Storage layout of one smart-contract class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractLayout {
    pub name: String,
    /// Base smart contract, if the class extends one.
    pub base: Option<String>,
    pub props: Vec<StorageProp>,
}

/// A class whose members are being emitted.
#[derive(Debug, Clone)]
pub struct ClassFrame {
    pub name: String,
    pub extends: Option<Expr>,
    pub smart_contract: bool,
    /// Instance properties and their initializers, in declaration order.
    pub fields: Vec<(String, Option<Expr>)>,
}

/// Function bodies emitted once, after the main region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedBody {
    IteratorNext,
}

/// Everything an emission procedure can see.
///
/// The context is threaded explicitly through every call; nothing about the
/// frame chain or the completion targets lives in ambient state.
pub struct Ctx<'c> {
    pub em: Emitter,
    pub config: &'c CompilerConfig,
    pub diagnostics: Vec<Diagnostic>,
    pub scopes: ScopeChain,
    pub targets: Targets,
    /// Label of a `label:` statement, waiting for the loop it names.
    pub pending_label: Option<String>,
    pub classes: Vec<ClassFrame>,
    pub contracts: HashMap<String, ContractLayout>,
    pub events: Vec<EventInfo>,
    shared: Vec<(SharedBody, Label)>,
    shared_emitted: usize,
}

impl<'c> Ctx<'c> {
    /// A context for a region entered with `entry_depth` items, whose
    /// uncaught throws go to `catch`.
    pub fn new(config: &'c CompilerConfig, entry_depth: i32) -> Self {
        let mut em = Emitter::new(entry_depth);
        let catch = em.new_label_at(entry_depth + 2);
        Ctx {
            em,
            config,
            diagnostics: Vec::new(),
            scopes: ScopeChain::new(),
            targets: Targets::region(None, catch),
            pending_label: None,
            classes: Vec::new(),
            contracts: HashMap::new(),
            events: Vec::new(),
            shared: Vec::new(),
            shared_emitted: 0,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        warn!(
            code = diagnostic.code.name(),
            at = %diagnostic.span,
            "{}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn warn(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.report(Diagnostic::warning(code, span, message));
    }

    /// Record an error and emit the placeholder for the failed node: drop
    /// the `consumed` operands it would have taken and throw a `TypeError`.
    pub fn error(
        &mut self,
        code: DiagnosticCode,
        span: Span,
        message: impl Into<String>,
        consumed: usize,
    ) -> CResult {
        let message = message.into();
        self.report(Diagnostic::error(code, span, message.clone()));
        if self.em.depth().is_none() {
            return Ok(());
        }
        for _ in 0..consumed {
            self.em.emit(Op::Drop);
        }
        self.helper(Helper::ThrowTypeError(message))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    /// Entry label of a shared body, requesting its emission.
    pub fn shared_body(&mut self, body: SharedBody) -> Label {
        if let Some((_, label)) = self.shared.iter().find(|(b, _)| *b == body) {
            return *label;
        }
        let label = self.em.new_label_at(1);
        self.shared.push((body, label));
        label
    }

    /// Shared bodies requested since the last call.
    pub fn take_shared(&mut self) -> Vec<(SharedBody, Label)> {
        let pending = self.shared[self.shared_emitted..].to_vec();
        self.shared_emitted = self.shared.len();
        pending
    }

    pub fn class(&self) -> Option<&ClassFrame> {
        self.classes.last()
    }

    /// Storage property `name` of contract `contract` or one of its bases.
    pub fn storage_prop(&self, contract: &str, name: &str) -> Option<StorageProp> {
        let mut current = self.contracts.get(contract);
        while let Some(layout) = current {
            if let Some(prop) = layout.props.iter().find(|p| p.name == name) {
                return Some(prop.clone());
            }
            current = layout.base.as_ref().and_then(|b| self.contracts.get(b));
        }
        None
    }

    pub fn record_event(&mut self, event: EventInfo) {
        if !self.events.iter().any(|e| e.name == event.name) {
            self.events.push(event);
        }
    }
}
