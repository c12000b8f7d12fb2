//! Invocation dispatcher.
//!
//! Runs after the module body, with `[args]` on the stack where
//! `args = Array[method-name, Array[params]]`. The application trigger
//! selects a case by name; the verification trigger asks the contract's
//! verify method. Every case leaves one raw result, which is what the
//! script returns.

use std::collections::HashSet;

use tracing::debug;

use crate::bytecode::{CompileError, JumpKind, Label, Op, Syscall};
use crate::compile::ctx::{CResult, Ctx, StorageKind};
use crate::compile::diagnostic::{Diagnostic, DiagnosticCode};
use crate::compile::expr::emit_value;
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::arr_reduce;
use crate::compile::helpers::object::PROTOTYPE;
use crate::compile::helpers::storage::{deployed_key, load_common, store_common};
use crate::compile::helpers::types::{push_undefined, unwrap, wrap};
use crate::compile::metadata::{ContractMetadata, MethodInfo, ParamInfo, PropertyInfo};
use crate::compile::scope::load_slot;
use crate::lang::node::{ClassDecl, ExprKind, FunctionDecl, MemberKind, Param, Visibility};
use crate::lang::{Module, Span, StmtKind, Type, ValueKind};
use crate::runtime::TRIGGER_APPLICATION;

pub const DEPLOY: &str = "deploy";
pub const UPGRADE: &str = "upgrade";
pub const APPROVE_UPGRADE: &str = "approveUpgrade";

/// What one case of the dispatcher runs.
#[derive(Debug, Clone, Copy)]
enum Entry<'a> {
    /// Exported top-level function of a module without a contract.
    Function(&'a FunctionDecl),
    Method {
        params: &'a [Param],
        return_type: &'a Type,
        verify: bool,
    },
    /// Common storage property read.
    Property {
        ty: &'a Type,
        readonly: bool,
    },
    Getter(&'a Type),
    Setter {
        property: &'a str,
        param: &'a Param,
    },
}

#[derive(Debug, Clone)]
struct Case<'a> {
    name: String,
    entry: Entry<'a>,
    /// Declaring class, for override resolution.
    owner: Option<&'a str>,
    span: Span,
}

/// The smart contract of a module, with its bases most-base-first.
struct Surface<'a> {
    contract: Option<&'a ClassDecl>,
    chain: Vec<&'a ClassDecl>,
    cases: Vec<Case<'a>>,
}

fn setter_case_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

fn classes(module: &Module) -> impl Iterator<Item = &ClassDecl> {
    module.body.iter().filter_map(|s| match &s.kind {
        StmtKind::Class(decl) => Some(decl),
        _ => None,
    })
}

/// Base contract named by `decl.extends`, if it is a smart contract of this
/// module.
fn base_of<'a>(module: &'a Module, decl: &ClassDecl) -> Option<&'a ClassDecl> {
    let name = match decl.extends.as_ref().map(|e| &e.kind) {
        Some(ExprKind::Ident(name)) => name,
        _ => return None,
    };
    classes(module).find(|c| &c.name == name && c.smart_contract)
}

fn collect_surface<'a>(ctx: &mut Ctx, module: &'a Module) -> Surface<'a> {
    let candidates: Vec<&ClassDecl> = classes(module)
        .filter(|c| c.smart_contract && c.exported && !c.is_abstract)
        .collect();
    for extra in candidates.iter().skip(1) {
        ctx.report(Diagnostic::error(
            DiagnosticCode::InvalidContractShape,
            extra.span,
            format!(
                "module declares more than one smart contract ('{}' and '{}')",
                candidates[0].name, extra.name
            ),
        ));
    }
    let contract = candidates.first().copied();

    let mut chain: Vec<&ClassDecl> = Vec::new();
    let mut current = contract;
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(decl) = current {
        if !seen.insert(decl.name.as_str()) {
            break;
        }
        chain.push(decl);
        current = base_of(module, decl);
    }
    chain.reverse();

    let mut cases: Vec<Case> = Vec::new();
    match contract {
        Some(_) => {
            for decl in chain.iter().copied() {
                class_cases(ctx, decl, &mut cases);
            }
        }
        None => {
            for stmt in &module.body {
                if let StmtKind::Function(f) = &stmt.kind {
                    if f.exported {
                        add_case(
                            ctx,
                            &mut cases,
                            Case {
                                name: f.name.clone(),
                                entry: Entry::Function(f),
                                owner: None,
                                span: f.span,
                            },
                        );
                    }
                }
            }
        }
    }

    let verifiers: Vec<&Case> = cases
        .iter()
        .filter(|c| matches!(c.entry, Entry::Method { verify: true, .. }))
        .collect();
    if let Some(extra) = verifiers.get(1) {
        let span = extra.span;
        ctx.report(Diagnostic::error(
            DiagnosticCode::InvalidContractShape,
            span,
            "more than one verify method",
        ));
    }

    Surface {
        contract,
        chain,
        cases,
    }
}

fn class_cases<'a>(ctx: &mut Ctx, decl: &'a ClassDecl, cases: &mut Vec<Case<'a>>) {
    for member in &decl.members {
        if member.is_static || member.visibility != Visibility::Public {
            continue;
        }
        let (name, entry) = match &member.kind {
            MemberKind::Method {
                params,
                return_type,
                verify,
                ..
            } => (
                member.name.clone(),
                Entry::Method {
                    params,
                    return_type,
                    verify: *verify,
                },
            ),
            MemberKind::Property { ty, readonly, .. } => {
                match ctx.storage_prop(&decl.name, &member.name).map(|p| p.kind) {
                    Some(StorageKind::Common) => (
                        member.name.clone(),
                        Entry::Property {
                            ty,
                            readonly: *readonly,
                        },
                    ),
                    _ => continue,
                }
            }
            MemberKind::Getter { return_type, .. } => (member.name.clone(), Entry::Getter(return_type)),
            MemberKind::Setter { param, .. } => (
                setter_case_name(&member.name),
                Entry::Setter {
                    property: &member.name,
                    param,
                },
            ),
        };
        add_case(
            ctx,
            cases,
            Case {
                name,
                entry,
                owner: Some(&decl.name),
                span: member.span,
            },
        );
    }
}

/// Add `case`, letting a derived class override its base, and report
/// collisions within one class or with the reserved names.
fn add_case<'a>(ctx: &mut Ctx, cases: &mut Vec<Case<'a>>, case: Case<'a>) {
    if case.name == DEPLOY || case.name == UPGRADE {
        ctx.report(Diagnostic::error(
            DiagnosticCode::InvalidContractShape,
            case.span,
            format!("public member '{}' collides with a reserved entry point", case.name),
        ));
        return;
    }
    match cases.iter().position(|c| c.name == case.name) {
        Some(i) if case.owner.is_some() && cases[i].owner != case.owner => {
            cases[i] = case;
        }
        Some(_) => {
            ctx.report(Diagnostic::error(
                DiagnosticCode::InvalidContractShape,
                case.span,
                format!("duplicate public member '{}'", case.name),
            ));
        }
        None => cases.push(case),
    }
}

// =============================================================================
// Conversions at the boundary
// =============================================================================

fn wrap_param(ctx: &mut Ctx, param: &Param) -> CResult {
    wrap_raw(ctx, &param.ty, &format!("parameter '{}'", param.name), Span::default())
}

/// ( raw -- w ) one level deep: array elements are wrapped by their kind.
/// `what` names the value in diagnostics.
pub(crate) fn wrap_raw(ctx: &mut Ctx, ty: &Type, what: &str, span: Span) -> CResult {
    let kind = match ty.single_kind() {
        Ok(kind) => kind,
        Err(ambiguous) => {
            let message = format!("{}: {}", what, ambiguous);
            return ctx.error(DiagnosticCode::AmbiguousType, span, message, 1);
        }
    };
    if kind == ValueKind::Array {
        let element = match ty.element().single_kind() {
            Ok(element) => element,
            Err(ambiguous) => {
                let message = format!("elements of {}: {}", what, ambiguous);
                return ctx.error(DiagnosticCode::AmbiguousType, span, message, 1);
            }
        };
        ctx.em.push_int(0);
        ctx.em.emit(Op::NewArray);
        arr_reduce(ctx, &mut |ctx| {
            // acc v i
            ctx.em.emit(Op::Drop);
            wrap(ctx, element);
            ctx.em.emit(Op::Over);
            ctx.em.emit(Op::Swap);
            ctx.em.emit(Op::Append);
            Ok(())
        })?;
    }
    wrap(ctx, kind);
    Ok(())
}

/// ( w -- raw ) inverse of [`wrap_raw`]
pub(crate) fn unwrap_result(ctx: &mut Ctx, ty: &Type) -> CResult {
    unwrap(ctx);
    if ty.single_kind() == Ok(ValueKind::Array) {
        ctx.em.push_int(0);
        ctx.em.emit(Op::NewArray);
        arr_reduce(ctx, &mut |ctx| {
            ctx.em.emit(Op::Drop);
            unwrap(ctx);
            ctx.em.emit(Op::Over);
            ctx.em.emit(Op::Swap);
            ctx.em.emit(Op::Append);
            Ok(())
        })?;
    }
    Ok(())
}

/// ( -- params ) the raw parameter array of the invocation
fn push_raw_params(ctx: &mut Ctx) -> CResult {
    let depth = ctx
        .em
        .depth()
        .ok_or_else(|| CompileError::internal("dispatcher case in unreachable code"))?;
    ctx.em.push_int((depth - 1) as i64);
    ctx.em.emit(Op::Pick);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    Ok(())
}

/// ( -- args ) the invocation parameters, wrapped for `params`
fn emit_params(ctx: &mut Ctx, params: &[Param]) -> CResult {
    push_raw_params(ctx)?;
    for (i, param) in params.iter().enumerate() {
        ctx.em.emit(Op::Dup);
        ctx.em.push_int(i as i64);
        ctx.em.emit(Op::PickItem);
        wrap_param(ctx, param)?;
        ctx.em.emit(Op::Swap);
    }
    ctx.em.emit(Op::Drop);
    ctx.helper(Helper::PackArgs(params.len()))
}

/// ( args inst -- args inst w ) call method `name` of `inst`
fn call_method(ctx: &mut Ctx, name: &str, params: &[Param]) -> CResult {
    emit_params(ctx, params)?;
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(name);
    ctx.helpers(&[
        Helper::FindObjectProperty,
        Helper::GetCallable,
        Helper::Invoke,
        Helper::CheckThrow,
    ])
}

/// ( -- w ) the value bound to a module-level declaration
fn load_module_binding(ctx: &mut Ctx, name: &str) -> CResult {
    let (frame, slot) = ctx
        .scopes
        .lookup(name)
        .ok_or_else(|| CompileError::internal(format!("'{}' is not bound in the module", name)))?;
    load_slot(ctx, frame, slot);
    Ok(())
}

// =============================================================================
// Cases
// =============================================================================

/// ( args inst -- args inst raw )
fn emit_case(ctx: &mut Ctx, case: &Case) -> CResult {
    ctx.em.set_span(case.span);
    match case.entry {
        Entry::Function(f) => {
            emit_params(ctx, &f.params)?;
            ctx.em.emit(Op::Over);
            load_module_binding(ctx, &f.name)?;
            ctx.helpers(&[Helper::GetCallable, Helper::Invoke, Helper::CheckThrow])?;
            unwrap_result(ctx, &f.return_type)
        }
        Entry::Method {
            params,
            return_type,
            ..
        } => {
            call_method(ctx, &case.name, params)?;
            unwrap_result(ctx, return_type)
        }
        Entry::Property { ty, .. } => {
            load_common(ctx, &case.name)?;
            unwrap_result(ctx, ty)
        }
        Entry::Getter(ty) => {
            ctx.em.emit(Op::Dup);
            ctx.em.push_str(&case.name);
            ctx.helper(Helper::FindObjectProperty)?;
            unwrap_result(ctx, ty)
        }
        Entry::Setter { property, param } => {
            // inst key value
            ctx.em.emit(Op::Dup);
            ctx.em.push_str(property);
            emit_params(ctx, std::slice::from_ref(param))?;
            ctx.em.push_int(0);
            ctx.em.emit(Op::PickItem);
            ctx.helper(Helper::SetObjectProperty)?;
            push_undefined(ctx);
            unwrap(ctx);
            Ok(())
        }
    }
}

/// ( args inst -- args inst bool ) first deploy only: storage initializers
/// of every contract in the chain, most-base-first, then the constructor.
fn emit_deploy(ctx: &mut Ctx, surface: &Surface) -> CResult {
    let Some(contract) = surface.contract else {
        ctx.em.push_bool(false);
        return Ok(());
    };
    let already = ctx.em.new_label();
    let end = ctx.em.new_label();

    ctx.em.push_bytes(&deployed_key());
    ctx.em.emit(Op::Syscall(Syscall::StorageGet));
    ctx.em.emit(Op::Size);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfTrue, already);
    ctx.em.push_bytes(&deployed_key());
    ctx.em.push_bytes(&[1]);
    ctx.em.emit(Op::Syscall(Syscall::StoragePut));

    for decl in &surface.chain {
        let props = ctx
            .contracts
            .get(&decl.name)
            .map(|layout| layout.props.clone())
            .unwrap_or_default();
        for prop in props {
            if let (StorageKind::Common, Some(init)) = (&prop.kind, &prop.init) {
                emit_value(ctx, init)?;
                store_common(ctx, &prop.name)?;
            }
        }
    }

    let ctor_params: &[Param] = surface
        .chain
        .iter()
        .rev()
        .find_map(|decl| decl.constructor.as_ref())
        .map(|ctor| ctor.params.as_slice())
        .unwrap_or(&[]);
    emit_params(ctx, ctor_params)?;
    ctx.em.emit(Op::Over);
    load_module_binding(ctx, &contract.name)?;
    ctx.helpers(&[Helper::GetCallable, Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);
    ctx.em.push_bool(true);
    ctx.em.jump(JumpKind::Always, end);

    ctx.em.mark(already);
    ctx.em.push_bool(false);
    ctx.em.mark(end);
    Ok(())
}

/// ( args inst -- args inst bool ) ask `approveUpgrade(script)`, then
/// migrate to the new script
fn emit_upgrade(ctx: &mut Ctx, surface: &Surface) -> CResult {
    let approvable = surface.chain.iter().any(|decl| {
        decl.members
            .iter()
            .any(|m| m.name == APPROVE_UPGRADE && matches!(m.kind, MemberKind::Method { .. }))
    });
    if !approvable {
        ctx.em.push_bool(false);
        return Ok(());
    }
    let refuse = ctx.em.new_label();
    let end = ctx.em.new_label();

    // args inst script
    push_raw_params(ctx)?;
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dup);
    wrap(ctx, ValueKind::Buffer);
    ctx.helper(Helper::PackArgs(1))?;
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Dup);
    ctx.em.push_str(APPROVE_UPGRADE);
    ctx.helpers(&[
        Helper::FindObjectProperty,
        Helper::GetCallable,
        Helper::Invoke,
        Helper::CheckThrow,
        Helper::ToBoolean(None),
    ])?;
    ctx.em.jump(JumpKind::IfFalse, refuse);
    ctx.em.emit(Op::Syscall(Syscall::Migrate));
    ctx.em.jump(JumpKind::Always, end);

    ctx.em.mark(refuse);
    ctx.em.emit(Op::Drop);
    ctx.em.push_bool(false);
    ctx.em.mark(end);
    Ok(())
}

// =============================================================================
// Dispatcher
// =============================================================================

/// ( args -- raw ) emit the dispatcher and return the public surface.
pub fn emit_dispatcher(ctx: &mut Ctx, module: &Module) -> Result<ContractMetadata, CompileError> {
    let surface = collect_surface(ctx, module);
    let metadata = build_metadata(ctx, module, &surface);
    debug!(
        contract = surface.contract.map(|c| c.name.as_str()),
        cases = surface.cases.len(),
        "dispatcher"
    );
    if ctx.em.depth().is_none() {
        return Ok(metadata);
    }

    // args inst
    match surface.contract {
        Some(contract) => {
            load_module_binding(ctx, &contract.name)?;
            ctx.em.push_str(PROTOTYPE);
            ctx.helpers(&[Helper::FindObjectProperty, Helper::NewObjectWithProto])?;
        }
        None => push_undefined(ctx),
    }
    let verification = ctx.em.new_label();
    let done = ctx.em.new_label_at(3);

    ctx.em.emit(Op::Syscall(Syscall::GetTrigger));
    ctx.em.push_int(TRIGGER_APPLICATION);
    ctx.em.emit(Op::NumEqual);
    ctx.em.jump(JumpKind::IfFalse, verification);

    // args inst name
    ctx.em.emit(Op::Over);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);

    let mut names: Vec<String> = surface.cases.iter().map(|c| c.name.clone()).collect();
    if surface.contract.is_some() {
        names.push(DEPLOY.to_string());
        if ctx.config.allow_upgrade {
            names.push(UPGRADE.to_string());
        }
    }
    let labels: Vec<Label> = names.iter().map(|_| ctx.em.new_label()).collect();
    for (name, label) in names.iter().zip(&labels) {
        ctx.em.emit(Op::Dup);
        ctx.em.push_str(name);
        ctx.em.emit(Op::Equal);
        ctx.em.jump(JumpKind::IfTrue, *label);
    }
    ctx.em.emit(Op::Drop);
    ctx.helper(Helper::ThrowTypeError("unknown method".to_string()))?;

    for (i, (name, label)) in names.iter().zip(&labels).enumerate() {
        ctx.em.mark(*label);
        ctx.em.emit(Op::Drop);
        match surface.cases.get(i) {
            Some(case) => emit_case(ctx, case)?,
            None if name == DEPLOY => emit_deploy(ctx, &surface)?,
            None => emit_upgrade(ctx, &surface)?,
        }
        if ctx.em.depth().is_some() {
            ctx.em.jump(JumpKind::Always, done);
        }
    }

    // args inst
    ctx.em.mark(verification);
    let verifier = surface
        .cases
        .iter()
        .find(|c| matches!(c.entry, Entry::Method { verify: true, .. }));
    match verifier {
        Some(case) => emit_case(ctx, case)?,
        None => ctx.em.push_bool(false),
    }

    ctx.em.mark(done);
    ctx.em.emit_all(&[Op::Nip, Op::Nip, Op::FromAlt, Op::Drop, Op::Ret]);
    Ok(metadata)
}

fn build_metadata(ctx: &Ctx, module: &Module, surface: &Surface) -> ContractMetadata {
    let info = |params: &[Param]| -> Vec<ParamInfo> {
        params
            .iter()
            .map(|p| ParamInfo {
                name: p.name.clone(),
                ty: p.ty.clone(),
            })
            .collect()
    };
    let mut metadata = ContractMetadata {
        name: surface
            .contract
            .map(|c| c.name.clone())
            .unwrap_or_else(|| module.name.clone()),
        ..ContractMetadata::default()
    };
    for case in &surface.cases {
        match case.entry {
            Entry::Function(f) => metadata.methods.push(MethodInfo {
                name: case.name.clone(),
                params: info(&f.params),
                return_type: f.return_type.clone(),
                verify: false,
            }),
            Entry::Method {
                params,
                return_type,
                verify,
            } => metadata.methods.push(MethodInfo {
                name: case.name.clone(),
                params: info(params),
                return_type: return_type.clone(),
                verify,
            }),
            Entry::Property { ty, readonly } => metadata.properties.push(PropertyInfo {
                name: case.name.clone(),
                ty: ty.clone(),
                readonly,
            }),
            Entry::Getter(ty) => {
                let settable = surface.cases.iter().any(
                    |c| matches!(c.entry, Entry::Setter { property, .. } if property == case.name),
                );
                metadata.properties.push(PropertyInfo {
                    name: case.name.clone(),
                    ty: ty.clone(),
                    readonly: !settable,
                });
            }
            Entry::Setter { param, .. } => metadata.methods.push(MethodInfo {
                name: case.name.clone(),
                params: info(std::slice::from_ref(param)),
                return_type: Type::Void,
                verify: false,
            }),
        }
    }
    if surface.contract.is_some() {
        let ctor_params = surface
            .chain
            .iter()
            .rev()
            .find_map(|decl| decl.constructor.as_ref())
            .map(|ctor| info(&ctor.params))
            .unwrap_or_default();
        metadata.methods.push(MethodInfo {
            name: DEPLOY.to_string(),
            params: ctor_params,
            return_type: Type::Boolean,
            verify: false,
        });
        if ctx.config.allow_upgrade {
            metadata.methods.push(MethodInfo {
                name: UPGRADE.to_string(),
                params: vec![ParamInfo {
                    name: "script".to_string(),
                    ty: Type::Buffer,
                }],
                return_type: Type::Boolean,
                verify: false,
            });
        }
    }
    metadata.events = ctx.events.clone();
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::driver::tests::run_module_with_host;
    use crate::lang::build::*;
    use crate::runtime::{MemoryHost, StackItem};

    fn upgradable(approve: bool) -> Module {
        let gate = method(
            APPROVE_UPGRADE,
            vec![param("script", Type::Buffer)],
            Type::Boolean,
            vec![ret(boolean(approve))],
        );
        module("m", vec![class_stmt(contract("Gated", vec![gate]))])
    }

    #[test]
    fn test_setter_case_names() {
        assert_eq!(setter_case_name("owner"), "setOwner");
        assert_eq!(setter_case_name("x"), "setX");
    }

    #[test]
    fn test_approved_upgrade_migrates() {
        let script = StackItem::bytes([0x40u8, 0x41]);
        let (result, host, _) =
            run_module_with_host(&upgradable(true), UPGRADE, vec![script], MemoryHost::new()).unwrap();
        assert_eq!(result, StackItem::Boolean(true));
        assert_eq!(host.migrated, vec![vec![0x40u8, 0x41]]);
    }

    #[test]
    fn test_refused_upgrade_leaves_the_host_alone() {
        let script = StackItem::bytes([0x40u8]);
        let (result, host, _) =
            run_module_with_host(&upgradable(false), UPGRADE, vec![script], MemoryHost::new()).unwrap();
        assert_eq!(result, StackItem::Boolean(false));
        assert!(host.migrated.is_empty());
    }
}
