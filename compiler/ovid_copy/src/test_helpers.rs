//! Shared test utilities for the copy-analysis passes.
//!
//! Consolidates module/method factories used across the `graph`,
//! `mutation`, `origin`, `copy_analysis`, `iteration`, `temporaries`,
//! and pipeline tests. Only compiled in test builds.

use ovid_ir::{
    BodyBuilder, Callee, Method, MethodBody, MethodId, MethodRole, Module, Name, Param, Place,
    TypeId, TypePool,
};

/// A type pool with one two-field record (`Pair { a: int, b: int }`).
pub(crate) fn pair_pool() -> (TypePool, TypeId) {
    let mut pool = TypePool::new();
    let pair = pool.record(
        Name::from_raw(100),
        &[(Name::from_raw(101), TypeId::INT), (Name::from_raw(102), TypeId::INT)],
    );
    (pool, pair)
}

/// A static method with a body.
pub(crate) fn static_method(name: u32, params: &[TypeId], ret: TypeId, body: MethodBody) -> Method {
    Method {
        name: Name::from_raw(name),
        receiver: None,
        params: params
            .iter()
            .map(|&ty| Param {
                name: Name::EMPTY,
                ty,
            })
            .collect(),
        return_ty: ret,
        role: MethodRole::Normal,
        body: Some(body),
    }
}

/// An instance method with a body and a role.
pub(crate) fn instance_method(
    name: u32,
    receiver: TypeId,
    params: &[TypeId],
    ret: TypeId,
    role: MethodRole,
    body: MethodBody,
) -> Method {
    Method {
        name: Name::from_raw(name),
        receiver: Some(receiver),
        params: params
            .iter()
            .map(|&ty| Param {
                name: Name::EMPTY,
                ty,
            })
            .collect(),
        return_ty: ret,
        role,
        body: Some(body),
    }
}

/// An externally defined method (no body — fully conservative).
pub(crate) fn external_method(name: u32, params: &[TypeId], ret: TypeId) -> Method {
    Method {
        name: Name::from_raw(name),
        receiver: None,
        params: params
            .iter()
            .map(|&ty| Param {
                name: Name::EMPTY,
                ty,
            })
            .collect(),
        return_ty: ret,
        role: MethodRole::Normal,
        body: None,
    }
}

/// A body that stores `1` into field 0 of parameter 0 (direct mutation).
pub(crate) fn mutate_param_body(param_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let base = b.read_param(0, param_ty);
    let one = b.lit_int(1);
    b.assign(Place::Field { base, field: 0 }, one);
    b.ret(None);
    b.finish()
}

/// A body that only reads field 0 of parameter 0.
pub(crate) fn read_param_body(param_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let base = b.read_param(0, param_ty);
    let field = b.read_field(base, 0, TypeId::INT);
    b.ret(Some(field));
    b.finish()
}

/// A body that forwards parameter 0 to `callee` and returns nothing.
pub(crate) fn forward_param_body(callee: MethodId, param_ty: TypeId) -> MethodBody {
    let mut b = BodyBuilder::new();
    let arg = b.read_param(0, param_ty);
    let call = b.call(Callee::Static(callee), None, vec![arg], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    b.finish()
}

/// `n` static methods where method `i` calls method `i + 1`.
pub(crate) fn call_chain_module(n: usize) -> (Module, Vec<MethodId>) {
    let mut module = Module::default();
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let mut b = BodyBuilder::new();
        if i + 1 < n {
            let next = MethodId::new(u32::try_from(i + 1).unwrap_or(u32::MAX));
            let call = b.call(Callee::Static(next), None, vec![], TypeId::UNIT);
            b.expr_stmt(call);
        }
        b.ret(None);
        ids.push(module.push_method(static_method(
            u32::try_from(i + 1).unwrap_or(u32::MAX),
            &[],
            TypeId::UNIT,
            b.finish(),
        )));
    }
    (module, ids)
}

/// Two static methods that call each other.
pub(crate) fn mutually_recursive_module() -> (Module, MethodId, MethodId) {
    let mut module = Module::default();
    let a_id = MethodId::new(0);
    let b_id = MethodId::new(1);

    let mut a = BodyBuilder::new();
    let call = a.call(Callee::Static(b_id), None, vec![], TypeId::UNIT);
    a.expr_stmt(call);
    a.ret(None);
    module.push_method(static_method(1, &[], TypeId::UNIT, a.finish()));

    let mut b = BodyBuilder::new();
    let call = b.call(Callee::Static(a_id), None, vec![], TypeId::UNIT);
    b.expr_stmt(call);
    b.ret(None);
    module.push_method(static_method(2, &[], TypeId::UNIT, b.finish()));

    (module, a_id, b_id)
}
