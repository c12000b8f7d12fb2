use std::collections::HashSet;

use tracing::{debug, trace};

use crate::bytecode::disasm::op_frequency;
use crate::bytecode::{CompileError, Emitter, Op, Script, check_script};
use crate::compile::config::CompilerConfig;
use crate::compile::contract::emit_dispatcher;
use crate::compile::ctx::{ContractLayout, Ctx, StorageKind, StorageProp};
use crate::compile::diagnostic::Diagnostic;
use crate::compile::function::hoist_functions;
use crate::compile::helpers::types::push_undefined;
use crate::compile::metadata::ContractMetadata;
use crate::compile::scope::{BindingSite, with_scope};
use crate::compile::stmt::emit_stmts;
use crate::lang::node::{ExprKind, MemberKind};
use crate::lang::{Module, StmtKind, Type};

/// Result of compiling one module.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// None when any diagnostic is an error.
    pub script: Option<Script>,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: Option<ContractMetadata>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Compile `module` into a single script.
///
/// User errors come back as diagnostics in an `Ok` output; `Err` means the
/// code generator itself failed.
pub fn compile(module: &Module, config: &CompilerConfig) -> Result<CompileOutput, CompileError> {
    debug!(module = %module.name, statements = module.body.len(), "compile module");
    let mut ctx = Ctx::new(config, 1);
    register_contracts(&mut ctx, module);

    // context: Array[scopes, this, global]
    ctx.em.emit(Op::NewMap);
    push_undefined(&mut ctx);
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.em.pack(3);
    ctx.em.emit(Op::ToAlt);

    let mut metadata = None;
    with_scope(&mut ctx, BindingSite::Module(&module.body), &mut |ctx| {
        hoist_functions(ctx, &module.body)?;
        emit_stmts(ctx, &module.body)?;
        metadata = Some(emit_dispatcher(ctx, module)?);
        Ok(())
    })?;

    // Uncaught throws leave the script with the thrown value.
    let catch = ctx.targets.catch;
    if ctx.em.is_referenced(catch) {
        ctx.em.mark(catch);
        ctx.em.emit_all(&[Op::Nip, Op::Nip, Op::Throw]);
    }
    ctx.emit_shared_bodies();

    let diagnostics = std::mem::take(&mut ctx.diagnostics);
    let has_errors = diagnostics.iter().any(Diagnostic::is_error);
    let em = std::mem::replace(&mut ctx.em, Emitter::new(0));
    let mut script = em.assemble()?;
    if config.verify_stack && !has_errors {
        check_script(&script)?;
    }
    if !config.emit_source_map {
        script.source_map.clear();
    }
    debug!(
        ops = script.len(),
        diagnostics = diagnostics.len(),
        errors = has_errors,
        "assembled"
    );
    let top: Vec<_> = op_frequency(&script).into_iter().take(5).collect();
    trace!(?top, "op frequency");

    Ok(CompileOutput {
        script: (!has_errors).then_some(script),
        diagnostics,
        metadata,
    })
}

/// Record the storage layout of every smart contract class before any
/// code refers to its properties.
fn register_contracts(ctx: &mut Ctx, module: &Module) {
    let contracts: Vec<_> = module
        .body
        .iter()
        .filter_map(|s| match &s.kind {
            StmtKind::Class(decl) if decl.smart_contract => Some(decl),
            _ => None,
        })
        .collect();
    let names: HashSet<&str> = contracts.iter().map(|c| c.name.as_str()).collect();

    for decl in contracts {
        let base = match decl.extends.as_ref().map(|e| &e.kind) {
            Some(ExprKind::Ident(name)) if names.contains(name.as_str()) => Some(name.clone()),
            _ => None,
        };
        let props = decl
            .members
            .iter()
            .filter(|m| !m.is_static)
            .filter_map(|m| match &m.kind {
                MemberKind::Property { ty, init, .. } => Some(StorageProp {
                    name: m.name.clone(),
                    ty: ty.clone(),
                    kind: storage_kind(ty),
                    init: init.clone(),
                }),
                _ => None,
            })
            .collect();
        ctx.contracts.insert(
            decl.name.clone(),
            ContractLayout {
                name: decl.name.clone(),
                base,
                props,
            },
        );
    }
}

fn storage_kind(ty: &Type) -> StorageKind {
    match ty {
        Type::MapStorage(key, _) => StorageKind::Map {
            key_parts: match key.as_ref() {
                Type::Tuple(parts) => parts.len(),
                _ => 1,
            },
        },
        Type::ArrayStorage(_) => StorageKind::Array,
        _ => StorageKind::Common,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::compile::diagnostic::DiagnosticCode;
    use crate::compile::helpers::storage::{common_key, deployed_key};
    use crate::lang::build::*;
    use crate::lang::node::{BinaryOp, UpdateOp};
    use crate::runtime::serialize::deserialize;
    use crate::runtime::{MemoryHost, RuntimeError, StackItem, TRIGGER_VERIFICATION, Vm};

    /// Compile `module` and invoke `method` with raw `args`.
    pub fn run_module(
        module: &Module,
        method: &str,
        args: Vec<StackItem>,
    ) -> Result<StackItem, RuntimeError> {
        run_module_with_host(module, method, args, MemoryHost::new()).map(|(result, _, _)| result)
    }

    /// [`run_module`] against `host`, handing back the host and the
    /// compiler output.
    pub fn run_module_with_host(
        module: &Module,
        method: &str,
        args: Vec<StackItem>,
        host: MemoryHost,
    ) -> Result<(StackItem, MemoryHost, CompileOutput), RuntimeError> {
        let output = compile(module, &CompilerConfig::default()).expect("code generation succeeds");
        let script = match &output.script {
            Some(script) => script.clone(),
            None => panic!("module has errors: {:?}", output.diagnostics),
        };
        let mut vm = Vm::new(host);
        let result = vm.invoke(&script, method, args)?;
        Ok((result, vm.into_host(), output))
    }

    fn n(name: &str) -> crate::lang::Expr {
        ident(name, Type::Number)
    }

    fn main_fn(params: Vec<crate::lang::node::Param>, ret_ty: Type, body: Vec<crate::lang::Stmt>) -> crate::lang::Stmt {
        function_stmt(export(function("main", params, ret_ty, body)))
    }

    #[test]
    fn test_function_returns_argument_plus_one() {
        let f = function_stmt(export(function(
            "f",
            vec![param("x", Type::Number)],
            Type::Number,
            vec![ret(add(n("x"), num(1)))],
        )));
        let m = module("m", vec![f]);
        assert_eq!(
            run_module(&m, "f", vec![StackItem::Integer(41)]).unwrap(),
            StackItem::Integer(42)
        );
    }

    #[test]
    fn test_counter_closure_counts_across_calls() {
        // function make() { let n = 0; return () => { n += 1; return n; }; }
        let counter = Type::function(Type::Number);
        let make = function(
            "make",
            vec![],
            counter.clone(),
            vec![
                let_("n", num(0)),
                ret(arrow(
                    vec![],
                    vec![
                        expr_stmt(compound(BinaryOp::Add, n("n"), num(1))),
                        ret(n("n")),
                    ],
                    Type::Number,
                )),
            ],
        );
        let c = || ident("c", counter.clone());
        let m = module(
            "m",
            vec![
                function_stmt(make),
                main_fn(
                    vec![],
                    Type::array(Type::Number),
                    vec![
                        const_("c", call(ident("make", Type::function(counter.clone())), vec![])),
                        ret(array(vec![call(c(), vec![]), call(c(), vec![])], Type::Number)),
                    ],
                ),
            ],
        );
        assert_eq!(
            run_module(&m, "main", vec![]).unwrap(),
            StackItem::array(vec![StackItem::Integer(1), StackItem::Integer(2)])
        );
    }

    #[test]
    fn test_continue_skips_one_iteration() {
        // let sum = 0; for (let i = 0; i < 3; i++) { if (i === 1) continue; sum += i; }
        let m = module(
            "m",
            vec![main_fn(
                vec![],
                Type::Number,
                vec![
                    let_("sum", num(0)),
                    for_(
                        Some(let_("i", num(0))),
                        Some(lt(n("i"), num(3))),
                        Some(update(UpdateOp::Inc, false, n("i"))),
                        block(vec![
                            if_(strict_eq(n("i"), num(1)), continue_(None), None),
                            expr_stmt(compound(BinaryOp::Add, n("sum"), n("i"))),
                        ]),
                    ),
                    ret(n("sum")),
                ],
            )],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(2));
    }

    #[test]
    fn test_throw_in_loop_is_caught_and_stops_the_loop() {
        // let runs = 0; let flag = false;
        // try { for (let i = 0; i < 3; i++) { runs++; if (i === 1) throw new Error("boom"); } }
        // catch (e) { flag = true; }
        // return runs + (flag ? 100 : 0);
        let boom = new_expr(ident("Error", Type::Unknown), vec![string("boom")], Type::Error);
        let m = module(
            "m",
            vec![main_fn(
                vec![],
                Type::Number,
                vec![
                    let_("runs", num(0)),
                    let_("flag", boolean(false)),
                    try_catch(
                        vec![for_(
                            Some(let_("i", num(0))),
                            Some(lt(n("i"), num(3))),
                            Some(update(UpdateOp::Inc, false, n("i"))),
                            block(vec![
                                expr_stmt(update(UpdateOp::Inc, false, n("runs"))),
                                if_(strict_eq(n("i"), num(1)), throw(boom), None),
                            ]),
                        )],
                        Some("e"),
                        vec![expr_stmt(assign(ident("flag", Type::Boolean), boolean(true)))],
                    ),
                    ret(add(
                        n("runs"),
                        cond(ident("flag", Type::Boolean), num(100), num(0)),
                    )),
                ],
            )],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::Integer(102));
    }

    #[test]
    fn test_object_literal_properties_read_back() {
        let o = || ident("o", Type::Object);
        let m = module(
            "m",
            vec![main_fn(
                vec![],
                Type::String,
                vec![
                    const_("o", object(vec![("a", num(1)), ("b", string("x"))])),
                    ret(add(member(o(), "b", Type::String), member(o(), "a", Type::Number))),
                ],
            )],
        );
        assert_eq!(run_module(&m, "main", vec![]).unwrap(), StackItem::bytes("x1"));
    }

    #[test]
    fn test_uncaught_throw_fails_the_invocation() {
        let m = module("m", vec![main_fn(vec![], Type::Void, vec![throw(string("nope"))])]);
        assert!(run_module(&m, "main", vec![]).is_err());
    }

    // -------------------------------------------------------------------------
    // Contracts
    // -------------------------------------------------------------------------

    fn counter_contract() -> Module {
        let this_ty = Type::SmartContract("Counter".into());
        let count = || member(this(this_ty.clone()), "count", Type::Number);
        let counter = contract(
            "Counter",
            vec![
                property("count", Type::Number, Some(num(5))),
                method(
                    "increment",
                    vec![param("by", Type::Number)],
                    Type::Number,
                    vec![
                        expr_stmt(compound(BinaryOp::Add, count(), n("by"))),
                        ret(count()),
                    ],
                ),
                verify_method("verify", vec![ret(boolean(true))]),
            ],
        );
        module("counter", vec![class_stmt(counter)])
    }

    #[test]
    fn test_deploy_runs_once_and_initializes_storage() {
        let m = counter_contract();
        let (first, host, _) = run_module_with_host(&m, "deploy", vec![], MemoryHost::new()).unwrap();
        assert_eq!(first, StackItem::Boolean(true));
        assert_eq!(host.storage.get(&deployed_key()), Some(&vec![1u8]));
        let stored = host.storage.get(&common_key("count")).expect("count is stored");
        assert_eq!(deserialize(stored).unwrap(), StackItem::number(5));

        let (second, _, _) = run_module_with_host(&m, "deploy", vec![], host).unwrap();
        assert_eq!(second, StackItem::Boolean(false));
    }

    #[test]
    fn test_methods_and_property_getters_share_storage() {
        let m = counter_contract();
        let (_, host, _) = run_module_with_host(&m, "deploy", vec![], MemoryHost::new()).unwrap();
        let (after, host, _) =
            run_module_with_host(&m, "increment", vec![StackItem::Integer(2)], host).unwrap();
        assert_eq!(after, StackItem::Integer(7));
        let (read, _, _) = run_module_with_host(&m, "count", vec![], host).unwrap();
        assert_eq!(read, StackItem::Integer(7));
    }

    #[test]
    fn test_verification_trigger_uses_verify_method() {
        let m = counter_contract();
        let mut host = MemoryHost::new();
        host.trigger = TRIGGER_VERIFICATION;
        let (verdict, _, _) = run_module_with_host(&m, "", vec![], host).unwrap();
        assert_eq!(verdict, StackItem::Boolean(true));
    }

    #[test]
    fn test_unknown_method_throws() {
        assert!(run_module(&counter_contract(), "reset", vec![]).is_err());
    }

    #[test]
    fn test_metadata_describes_the_public_surface() {
        let output = compile(&counter_contract(), &CompilerConfig::default()).unwrap();
        let metadata = output.metadata.expect("metadata");
        assert_eq!(metadata.name, "Counter");
        let increment = metadata.method("increment").expect("increment");
        assert_eq!(increment.params[0].ty, Type::Number);
        assert!(metadata.method("verify").is_some_and(|m| m.verify));
        assert!(metadata.method("deploy").is_some());
        assert_eq!(metadata.properties[0].name, "count");
        assert!(metadata.to_json().unwrap().contains("\"increment\""));
    }

    #[test]
    fn test_map_storage_with_two_part_keys() {
        let this_ty = Type::SmartContract("Store".into());
        let map_ty = Type::map_storage(Type::Tuple(vec![Type::Number, Type::Number]), Type::Number);
        let balances = || member(this(this_ty.clone()), "balances", map_ty.clone());
        let key = |a: i64, b: i64| tuple(vec![num(a), num(b)]);
        let store = contract(
            "Store",
            vec![
                property("balances", map_ty.clone(), None),
                method(
                    "put",
                    vec![],
                    Type::Void,
                    vec![expr_stmt(method_call(balances(), "set", vec![key(1, 2), num(7)], Type::Void))],
                ),
                method(
                    "hit",
                    vec![],
                    Type::Number,
                    vec![ret(method_call(balances(), "get", vec![key(1, 2)], Type::Number))],
                ),
                method(
                    "miss",
                    vec![],
                    Type::String,
                    vec![ret(unary(
                        crate::lang::node::UnaryOp::TypeOf,
                        method_call(
                            balances(),
                            "get",
                            vec![key(1, 3)],
                            Type::Union(vec![Type::Number, Type::Undefined]),
                        ),
                    ))],
                ),
            ],
        );
        let m = module("store", vec![class_stmt(store)]);
        let (_, host, _) = run_module_with_host(&m, "put", vec![], MemoryHost::new()).unwrap();
        let (hit, host, _) = run_module_with_host(&m, "hit", vec![], host).unwrap();
        assert_eq!(hit, StackItem::Integer(7));
        let (miss, _, _) = run_module_with_host(&m, "miss", vec![], host).unwrap();
        assert_eq!(miss, StackItem::bytes("undefined"));
    }

    // -------------------------------------------------------------------------
    // Diagnostics and output
    // -------------------------------------------------------------------------

    #[test]
    fn test_two_contracts_are_an_invalid_shape() {
        let m = module(
            "m",
            vec![
                class_stmt(contract("A", vec![])),
                class_stmt(contract("B", vec![])),
            ],
        );
        let output = compile(&m, &CompilerConfig::default()).unwrap();
        assert!(output.script.is_none());
        assert!(
            output
                .errors()
                .any(|d| d.code == DiagnosticCode::InvalidContractShape)
        );
    }

    #[test]
    fn test_public_deploy_method_collides() {
        let m = module(
            "m",
            vec![class_stmt(contract(
                "A",
                vec![method("deploy", vec![], Type::Void, vec![])],
            ))],
        );
        let output = compile(&m, &CompilerConfig::default()).unwrap();
        assert!(output.has_errors());
        assert!(output.errors().all(|d| d.code == DiagnosticCode::InvalidContractShape));
    }

    #[test]
    fn test_unresolved_reference_reports_and_keeps_going() {
        // Code after a failed node is unreachable, so each function reports one.
        let m = module(
            "m",
            vec![
                main_fn(vec![], Type::Void, vec![expr_stmt(n("missing"))]),
                function_stmt(export(function(
                    "other",
                    vec![],
                    Type::Number,
                    vec![ret(add(n("alsoMissing"), num(1)))],
                ))),
            ],
        );
        let output = compile(&m, &CompilerConfig::default()).unwrap();
        assert!(output.script.is_none());
        let unresolved = output
            .errors()
            .filter(|d| d.code == DiagnosticCode::UnresolvedReference)
            .count();
        assert_eq!(unresolved, 2);
    }

    #[test]
    fn test_source_map_can_be_disabled() {
        let m = counter_contract();
        let with = compile(&m, &CompilerConfig::default()).unwrap();
        assert!(!with.script.unwrap().source_map.is_empty());
        let without = compile(&m, &CompilerConfig::default().with_source_map(false)).unwrap();
        assert!(without.script.unwrap().source_map.is_empty());
    }

    #[test]
    fn test_script_bytes_round_trip() {
        let script = compile(&counter_contract(), &CompilerConfig::default())
            .unwrap()
            .script
            .unwrap();
        let bytes = script.to_bytes().unwrap();
        assert_eq!(Script::from_bytes(&bytes).unwrap().ops, script.ops);
    }
}
