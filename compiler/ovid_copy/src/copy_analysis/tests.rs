use pretty_assertions::assert_eq;

use ovid_ir::{
    BodyBuilder, CallGraph, Callee, MethodBody, MethodId, MethodRole, Module, Name, Place, TypeId,
    TypePool,
};

use crate::classify::TypeClassifier;
use crate::graph::Condensation;
use crate::mutation::build_signatures;
use crate::origin::classify_origins;
use crate::test_helpers::{
    instance_method, mutate_param_body, pair_pool, read_param_body, static_method,
};

use super::*;

fn decide(pool: &TypePool, module: &Module, method: MethodId) -> DecisionTable {
    let graph = CallGraph::build(module);
    let cond = Condensation::compute(&graph);
    let sigs = build_signatures(module, &cond, 64);
    let classes = TypeClassifier::new(pool);
    let body = module
        .method(method)
        .and_then(|m| m.body.as_ref())
        .unwrap();
    let origins = classify_origins(body, &sigs);
    analyze_method_copies(body, &classes, &sigs, &origins)
}

fn make_pair(b: &mut BodyBuilder, pair: TypeId) -> ovid_ir::ExprId {
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    b.construct(vec![x, y], pair)
}

// ── Argument edges ──────────────────────────────────────────────

#[test]
fn non_mutating_callee_argument_never_copies() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let reader = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::INT, read_param_body(pair)));

    let mut b = BodyBuilder::new();
    let l = b.local(Name::from_raw(9), pair);
    let arg = b.read_local(l);
    let call = b.call(Callee::Static(reader), None, vec![arg], TypeId::INT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::NonMutatingCallee);
    assert_eq!(table.copy_count(), 0);
}

#[test]
fn mutating_callee_with_observable_argument_copies() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let mutator = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::UNIT, mutate_param_body(pair)));

    let mut b = BodyBuilder::new();
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Static(mutator), None, vec![arg], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::MutatingCallee);
    assert_eq!(table.copy_count(), 1);
}

#[test]
fn unresolved_callee_argument_copies() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Unknown(Name::from_raw(7)), None, vec![arg], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);

    let mut module = Module::default();
    let caller = module.push_method(static_method(1, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::UnresolvedCallee);
}

#[test]
fn fresh_argument_into_mutating_callee_needs_no_copy() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let mutator = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::UNIT, mutate_param_body(pair)));

    let mut b = BodyBuilder::new();
    let fresh = make_pair(&mut b, pair);
    let call = b.call(Callee::Static(mutator), None, vec![fresh], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::UnsharedValue);
}

// ── Returned-argument chains ────────────────────────────────────

fn return_param_body(param_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let p = b.read_param(0, param_ty);
    b.ret(Some(p));
    b.finish()
}

fn mutate_and_return_param_body(param_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let base = b.read_param(0, param_ty);
    let one = b.lit_int(1);
    b.assign(Place::Field { base, field: 0 }, one);
    let p = b.read_param(0, param_ty);
    b.ret(Some(p));
    b.finish()
}

#[test]
fn returned_argument_copies_at_store_not_at_call() {
    // b = id(a): the result aliases `a`, so the store boundary isolates
    // the pair and the call edge stays free.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let id_m = MethodId::new(0);
    module.push_method(static_method(1, &[pair], pair, return_param_body(pair)));

    let mut b = BodyBuilder::new();
    let dst = b.local(Name::from_raw(9), pair);
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Static(id_m), None, vec![arg], pair);
    let store = b.assign(Place::Local(dst), call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let arg_d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(arg_d.verdict, Verdict::NoCopy);
    assert_eq!(arg_d.reason, CopyReason::NonMutatingCallee);
    let store_d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(store_d.verdict, Verdict::InsertCopy);
    assert_eq!(store_d.reason, CopyReason::StoreBoundary);
    assert_eq!(table.copy_count(), 1);
}

#[test]
fn mutated_returned_argument_still_copies_only_at_store() {
    // b = bump(a) where bump writes a field and returns its argument:
    // the argument edge defers to the store copy; copying at the call
    // would detach the returned value from the mutation it carries.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let bump = MethodId::new(0);
    module.push_method(static_method(1, &[pair], pair, mutate_and_return_param_body(pair)));

    let mut b = BodyBuilder::new();
    let dst = b.local(Name::from_raw(9), pair);
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Static(bump), None, vec![arg], pair);
    let store = b.assign(Place::Local(dst), call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let arg_d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(arg_d.verdict, Verdict::NoCopy);
    assert_eq!(arg_d.reason, CopyReason::DeferredToStore);
    let store_d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(store_d.verdict, Verdict::InsertCopy);
    assert_eq!(table.copy_count(), 1);
}

#[test]
fn nested_return_chain_copies_at_the_mutating_hop_and_the_store() {
    // b = id(bump(id(a))): one copy where the chain is mutated, one at
    // the store; the pass-through hops stay free.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let id_m = MethodId::new(0);
    let bump = MethodId::new(1);
    module.push_method(static_method(1, &[pair], pair, return_param_body(pair)));
    module.push_method(static_method(2, &[pair], pair, mutate_and_return_param_body(pair)));

    let mut b = BodyBuilder::new();
    let dst = b.local(Name::from_raw(9), pair);
    let a = b.read_param(0, pair);
    let inner = b.call(Callee::Static(id_m), None, vec![a], pair);
    let middle = b.call(Callee::Static(bump), None, vec![inner], pair);
    let outer = b.call(Callee::Static(id_m), None, vec![middle], pair);
    let store = b.assign(Place::Local(dst), outer);
    b.ret(None);
    let caller = module.push_method(static_method(3, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let inner_d = table.get(UseEdge::Argument { call: inner, index: 0 }).unwrap();
    assert_eq!(inner_d.verdict, Verdict::NoCopy);
    assert_eq!(inner_d.reason, CopyReason::NonMutatingCallee);
    let middle_d = table.get(UseEdge::Argument { call: middle, index: 0 }).unwrap();
    assert_eq!(middle_d.verdict, Verdict::InsertCopy);
    assert_eq!(middle_d.reason, CopyReason::MutatingCallee);
    let outer_d = table.get(UseEdge::Argument { call: outer, index: 0 }).unwrap();
    assert_eq!(outer_d.verdict, Verdict::NoCopy);
    let store_d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(store_d.verdict, Verdict::InsertCopy);
    assert_eq!(table.copy_count(), 2);
}

#[test]
fn mutating_callee_without_store_consumer_copies_at_argument() {
    // bump(a) with the result discarded: nothing downstream isolates
    // the pair, so the argument edge must.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let bump = MethodId::new(0);
    module.push_method(static_method(1, &[pair], pair, mutate_and_return_param_body(pair)));

    let mut b = BodyBuilder::new();
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Static(bump), None, vec![arg], pair);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::MutatingCallee);
}

// ── Stores and returns ──────────────────────────────────────────

#[test]
fn storing_a_fresh_value_needs_no_copy() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let dst = b.local(Name::from_raw(9), pair);
    let fresh = make_pair(&mut b, pair);
    let store = b.assign(Place::Local(dst), fresh);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, m);
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::UnsharedValue);
}

#[test]
fn storing_another_variable_copies() {
    // b = a between two pair locals.
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let src = b.local(Name::from_raw(8), pair);
    let dst = b.local(Name::from_raw(9), pair);
    let read = b.read_local(src);
    let store = b.assign(Place::Local(dst), read);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, m);
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::StoreBoundary);
}

#[test]
fn field_store_of_observable_value_copies() {
    // this.a = p — a pair crossing into a field slot.
    let (mut pool, pair) = pair_pool();
    let outer = pool.record(Name::from_raw(200), &[(Name::from_raw(201), pair)]);

    let mut b = BodyBuilder::new();
    let this = b.read_receiver(outer);
    let p = b.read_param(0, pair);
    let store = b.assign(Place::Field { base: this, field: 0 }, p);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(instance_method(
        1,
        outer,
        &[pair],
        TypeId::UNIT,
        MethodRole::Normal,
        b.finish(),
    ));

    let table = decide(&pool, &module, m);
    let d = table.get(UseEdge::StoreField { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::StoreBoundary);
}

#[test]
fn return_edges_defer_to_the_caller() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[pair], pair, return_param_body(pair)));

    let table = decide(&pool, &module, m);
    let ret = table
        .iter()
        .find(|d| matches!(d.edge, UseEdge::ReturnValue { .. }))
        .unwrap();
    assert_eq!(ret.verdict, Verdict::NoCopy);
    assert_eq!(ret.reason, CopyReason::DeferredToStore);
}

// ── Construction operands ───────────────────────────────────────

#[test]
fn embedding_observable_storage_into_a_construction_copies() {
    // x = Wrapper(p); x.f.bump(): without the operand copy, x's field
    // IS the caller's pair and bumping it would write through `p`.
    let (mut pool, pair) = pair_pool();
    let wrapper = pool.record(Name::from_raw(200), &[(Name::from_raw(201), pair)]);

    let mut module = Module::default();
    let bump = MethodId::new(0);
    module.push_method(instance_method(
        1,
        pair,
        &[],
        TypeId::UNIT,
        MethodRole::Normal,
        mutating_instance_body(pair),
    ));

    let mut b = BodyBuilder::new();
    let x = b.local(Name::from_raw(9), wrapper);
    let p = b.read_param(0, pair);
    let wrapped = b.construct(vec![p], wrapper);
    let store = b.assign(Place::Local(x), wrapped);
    let xr = b.read_local(x);
    let field = b.read_field(xr, 0, pair);
    let call = b.call(Callee::Static(bump), Some(field), vec![], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let op = table
        .get(UseEdge::ConstructOperand { construct: wrapped, index: 0 })
        .unwrap();
    assert_eq!(op.verdict, Verdict::InsertCopy);
    assert_eq!(op.reason, CopyReason::StoreBoundary);
    // The aggregate itself is fresh; the store and the in-place
    // receiver stay free.
    let store_d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(store_d.verdict, Verdict::NoCopy);
    let recv_d = table.get(UseEdge::CallReceiver { call }).unwrap();
    assert_eq!(recv_d.verdict, Verdict::NoCopy);
    assert_eq!(table.copy_count(), 1);
}

#[test]
fn fresh_construction_operands_stay_free() {
    let (mut pool, pair) = pair_pool();
    let wrapper = pool.record(Name::from_raw(200), &[(Name::from_raw(201), pair)]);

    let mut b = BodyBuilder::new();
    let x = b.local(Name::from_raw(9), wrapper);
    let inner = make_pair(&mut b, pair);
    let wrapped = b.construct(vec![inner], wrapper);
    b.assign(Place::Local(x), wrapped);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, m);
    let op = table
        .get(UseEdge::ConstructOperand { construct: wrapped, index: 0 })
        .unwrap();
    assert_eq!(op.verdict, Verdict::NoCopy);
    assert_eq!(op.reason, CopyReason::UnsharedValue);
    assert_eq!(table.copy_count(), 0);
}

// ── Receiver edges ──────────────────────────────────────────────

fn mutating_instance_body(receiver_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let this = b.read_receiver(receiver_ty);
    let one = b.lit_int(1);
    b.assign(Place::Field { base: this, field: 0 }, one);
    b.ret(None);
    b.finish()
}

#[test]
fn mutating_method_on_a_local_runs_in_place() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let bump = MethodId::new(0);
    module.push_method(instance_method(
        1,
        pair,
        &[],
        TypeId::UNIT,
        MethodRole::Normal,
        mutating_instance_body(pair),
    ));

    let mut b = BodyBuilder::new();
    let l = b.local(Name::from_raw(9), pair);
    let recv = b.read_local(l);
    let call = b.call(Callee::Static(bump), Some(recv), vec![], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::CallReceiver { call }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::InPlaceReceiver);
}

#[test]
fn mutating_method_on_an_aliasing_result_copies_the_receiver() {
    // id(a).bump(): the temporary receiver aliases `a`, and the source
    // language would have bumped a detached copy.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let id_m = MethodId::new(0);
    let bump = MethodId::new(1);
    module.push_method(static_method(1, &[pair], pair, return_param_body(pair)));
    module.push_method(instance_method(
        2,
        pair,
        &[],
        TypeId::UNIT,
        MethodRole::Normal,
        mutating_instance_body(pair),
    ));

    let mut b = BodyBuilder::new();
    let a = b.read_param(0, pair);
    let aliased = b.call(Callee::Static(id_m), None, vec![a], pair);
    let call = b.call(Callee::Static(bump), Some(aliased), vec![], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let caller = module.push_method(static_method(3, &[pair], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, caller);
    let d = table.get(UseEdge::CallReceiver { call }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
    assert_eq!(d.reason, CopyReason::MutatingCallee);
}

// ── Misc ────────────────────────────────────────────────────────

#[test]
fn scalar_edges_are_not_tracked() {
    let pool = TypePool::new();
    let mut b = BodyBuilder::new();
    let x = b.lit_int(1);
    let call = b.call(Callee::Unknown(Name::from_raw(7)), None, vec![x], TypeId::INT);
    b.expr_stmt(call);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let table = decide(&pool, &module, m);
    assert!(table.is_empty());
}

#[test]
fn cursor_override_forces_no_copy() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let src = b.local(Name::from_raw(8), pair);
    let dst = b.local(Name::from_raw(9), pair);
    let read = b.read_local(src);
    let store = b.assign(Place::Local(dst), read);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let mut table = decide(&pool, &module, m);
    table.force_no_copy(
        UseEdge::StoreLocal { stmt: store },
        CopyReason::IterationIdentity,
    );
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::IterationIdentity);
    assert_eq!(table.copy_count(), 0);
}
