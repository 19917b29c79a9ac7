use pretty_assertions::assert_eq;

use ovid_ir::{
    BodyBuilder, CallGraph, Callee, MethodId, MethodRole, Module, Name, Place, TypeId, TypePool,
};

use crate::classify::TypeClassifier;
use crate::copy_analysis::analyze_method_copies;
use crate::graph::Condensation;
use crate::mutation::build_signatures;
use crate::origin::classify_origins;
use crate::test_helpers::{instance_method, mutate_param_body, pair_pool, read_param_body, static_method};

use super::*;

/// Full chain for one method: signatures, origins, decisions, then the
/// optimizer over the decided table.
fn optimize(pool: &TypePool, module: &Module, method: MethodId) -> (DecisionTable, MaterializationPlan) {
    let graph = CallGraph::build(module);
    let cond = Condensation::compute(&graph);
    let sigs = build_signatures(module, &cond, 64);
    let classes = TypeClassifier::new(pool);
    let body = module
        .method(method)
        .and_then(|m| m.body.as_ref())
        .unwrap();
    let origins = classify_origins(body, &sigs);
    let mut table = analyze_method_copies(body, &classes, &sigs, &origins);
    let plan = optimize_temporaries(body, &classes, &sigs, &mut table);
    (table, plan)
}

#[test]
fn elides_store_copy_when_both_sides_stay_untouched() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let reader = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::INT, read_param_body(pair)));

    let mut b = BodyBuilder::new();
    let a = b.local(Name::from_raw(8), pair);
    let bl = b.local(Name::from_raw(9), pair);
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    let fresh = b.construct(vec![x, y], pair);
    b.assign(Place::Local(a), fresh);
    let a_read = b.read_local(a);
    let store = b.assign(Place::Local(bl), a_read);
    let b_read = b.read_local(bl);
    let call = b.call(Callee::Static(reader), None, vec![b_read], TypeId::INT);
    b.expr_stmt(call);
    b.ret(None);
    let m = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert_eq!(plan.elided(), &[UseEdge::StoreLocal { stmt: store }]);
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::NoCopy);
    assert_eq!(d.reason, CopyReason::RedundantCopy);
    assert_eq!(table.copy_count(), 0);
}

#[test]
fn keeps_copy_when_the_source_is_written_later() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let a = b.local(Name::from_raw(8), pair);
    let bl = b.local(Name::from_raw(9), pair);
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    let fresh = b.construct(vec![x, y], pair);
    b.assign(Place::Local(a), fresh);
    let a_read = b.read_local(a);
    let store = b.assign(Place::Local(bl), a_read);
    let a_again = b.read_local(a);
    let one = b.lit_int(1);
    b.assign(Place::Field { base: a_again, field: 0 }, one);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert!(plan.elided().is_empty());
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
}

#[test]
fn keeps_copy_when_the_destination_is_reassigned() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let bl = b.local(Name::from_raw(9), pair);
    let first = b.read_param(0, pair);
    let store = b.assign(Place::Local(bl), first);
    let second = b.read_param(1, pair);
    b.assign(Place::Local(bl), second);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[pair, pair], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert!(plan.elided().is_empty());
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
}

#[test]
fn keeps_copy_when_the_source_is_mutated_in_place() {
    // b = a; a.bump() — the in-place receiver write makes the sides
    // diverge, so the store copy stays.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let bump = MethodId::new(0);
    module.push_method(instance_method(1, pair, &[], TypeId::UNIT, MethodRole::Normal, {
        let mut b = BodyBuilder::new();
        let this = b.read_receiver(pair);
        let one = b.lit_int(1);
        b.assign(Place::Field { base: this, field: 0 }, one);
        b.ret(None);
        b.finish()
    }));

    let mut b = BodyBuilder::new();
    let bl = b.local(Name::from_raw(9), pair);
    let a_read = b.read_param(0, pair);
    let store = b.assign(Place::Local(bl), a_read);
    let recv = b.read_param(0, pair);
    let call = b.call(Callee::Static(bump), Some(recv), vec![], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let m = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert!(plan.elided().is_empty());
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
}

#[test]
fn keeps_copy_when_the_source_is_written_through_an_alias() {
    // b = a; id(a).x = 1 — the field store reaches `a` through id's
    // returned alias, so the sides diverge and the copy stays.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let id_m = MethodId::new(0);
    module.push_method(static_method(1, &[pair], pair, {
        let mut b = BodyBuilder::new();
        let p = b.read_param(0, pair);
        b.ret(Some(p));
        b.finish()
    }));

    let mut b = BodyBuilder::new();
    let a = b.local(Name::from_raw(8), pair);
    let bl = b.local(Name::from_raw(9), pair);
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    let fresh = b.construct(vec![x, y], pair);
    b.assign(Place::Local(a), fresh);
    let a_read = b.read_local(a);
    let store = b.assign(Place::Local(bl), a_read);
    let a_again = b.read_local(a);
    let aliased = b.call(Callee::Static(id_m), None, vec![a_again], pair);
    let one = b.lit_int(1);
    b.assign(Place::Field { base: aliased, field: 0 }, one);
    b.ret(None);
    let m = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert!(plan.elided().is_empty());
    let d = table.get(UseEdge::StoreLocal { stmt: store }).unwrap();
    assert_eq!(d.verdict, Verdict::InsertCopy);
}

#[test]
fn copied_mutating_argument_does_not_block_elision() {
    // b = a; mutator(a) — the argument edge copies, so `a` itself never
    // changes and the store copy is still redundant.
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let mutator = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::UNIT, mutate_param_body(pair)));

    let mut b = BodyBuilder::new();
    let bl = b.local(Name::from_raw(9), pair);
    let a_read = b.read_param(0, pair);
    let store = b.assign(Place::Local(bl), a_read);
    let arg = b.read_param(0, pair);
    let call = b.call(Callee::Static(mutator), None, vec![arg], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    let m = module.push_method(static_method(2, &[pair], TypeId::UNIT, b.finish()));

    let (table, plan) = optimize(&pool, &module, m);
    assert_eq!(plan.elided(), &[UseEdge::StoreLocal { stmt: store }]);
    // The argument copy the analyzer required is untouched.
    let arg_d = table.get(UseEdge::Argument { call, index: 0 }).unwrap();
    assert_eq!(arg_d.verdict, Verdict::InsertCopy);
    assert_eq!(table.copy_count(), 1);
}

#[test]
fn read_only_multi_read_local_gets_a_slot() {
    let (pool, pair) = pair_pool();
    let mut module = Module::default();
    let reader = MethodId::new(0);
    module.push_method(static_method(1, &[pair], TypeId::INT, read_param_body(pair)));

    let mut b = BodyBuilder::new();
    let t = b.local(Name::from_raw(9), pair);
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    let fresh = b.construct(vec![x, y], pair);
    b.assign(Place::Local(t), fresh);
    let r1 = b.read_local(t);
    let c1 = b.call(Callee::Static(reader), None, vec![r1], TypeId::INT);
    b.expr_stmt(c1);
    let r2 = b.read_local(t);
    let c2 = b.call(Callee::Static(reader), None, vec![r2], TypeId::INT);
    b.expr_stmt(c2);
    b.ret(None);
    let m = module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    let (_table, plan) = optimize(&pool, &module, m);
    assert_eq!(plan.temp_slot(t), Some(0));
    assert_eq!(plan.slot_count(), 1);
}

#[test]
fn mutated_locals_get_no_slot() {
    let (pool, pair) = pair_pool();
    let mut b = BodyBuilder::new();
    let t = b.local(Name::from_raw(9), pair);
    let x = b.lit_int(1);
    let y = b.lit_int(2);
    let fresh = b.construct(vec![x, y], pair);
    b.assign(Place::Local(t), fresh);
    let r1 = b.read_local(t);
    b.expr_stmt(r1);
    let r2 = b.read_local(t);
    let one = b.lit_int(1);
    b.assign(Place::Field { base: r2, field: 0 }, one);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let (_table, plan) = optimize(&pool, &module, m);
    assert_eq!(plan.temp_slot(t), None);
    assert!(plan.is_empty());
}

#[test]
fn scalar_locals_get_no_slot() {
    let pool = TypePool::new();
    let mut b = BodyBuilder::new();
    let t = b.local(Name::from_raw(9), TypeId::INT);
    let one = b.lit_int(1);
    b.assign(Place::Local(t), one);
    let r1 = b.read_local(t);
    b.expr_stmt(r1);
    let r2 = b.read_local(t);
    b.expr_stmt(r2);
    b.ret(None);

    let mut module = Module::default();
    let m = module.push_method(static_method(1, &[], TypeId::UNIT, b.finish()));

    let (_table, plan) = optimize(&pool, &module, m);
    assert_eq!(plan.temp_slot(t), None);
}
