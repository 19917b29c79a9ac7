//! Iteration-identity exception.
//!
//! External iteration acquires a value-typed cursor once and then
//! advances it in place, step after step, with the loop observing the
//! cursor's internal position. Copying that cursor anywhere along the
//! way silently disconnects the loop from the state it keeps advancing,
//! which corrupts iteration rather than merely costing a copy. The
//! general rules would copy it: the cursor is a value type returned
//! from a call and repeatedly handed to methods that mutate it.
//!
//! This recognizer matches exactly the acquire-then-repeatedly-advance
//! shape and nothing wider:
//!
//! - a local's single initializer is a call to a method the front-end
//!   marked [`MethodRole::CursorAcquire`];
//! - every other use of the local is the receiver of a
//!   [`CursorAdvance`](MethodRole::CursorAdvance) or
//!   [`CursorCurrent`](MethodRole::CursorCurrent) call;
//! - all of those step calls sit inside one loop construct (the advance
//!   usually being the loop condition itself).
//!
//! Any use outside that shape disqualifies the local. A matched cursor
//! is reported as a [`CursorUse`]; applying it retags the acquire
//! result and every step read as [`AliasOrigin::IterationHandle`],
//! which the copy analyzer then exempts on every edge.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use ovid_ir::{
    Callee, ExprId, ExprKind, LocalId, MethodBody, MethodRole, Module, Place, Stmt, StmtId,
};

use crate::origin::{AliasOrigin, OriginMap};

/// One recognized cursor local.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorUse {
    /// The local holding the cursor.
    pub local: LocalId,
    /// The statement storing the acquire result into the local.
    pub acquire_store: StmtId,
    /// The acquire call expression.
    pub acquire_call: ExprId,
    /// Every read of the cursor local, all of them step receivers.
    pub reads: SmallVec<[ExprId; 4]>,
    /// The advance/current calls stepping the cursor.
    pub step_calls: SmallVec<[ExprId; 4]>,
}

impl CursorUse {
    /// Retag the cursor's expressions so every downstream edge sees an
    /// iteration handle.
    pub fn apply(&self, origins: &mut OriginMap) {
        origins.set(self.acquire_call, AliasOrigin::IterationHandle);
        for &read in &self.reads {
            origins.set(read, AliasOrigin::IterationHandle);
        }
    }
}

/// Recognize every cursor local in `body`.
pub fn recognize_cursors(module: &Module, body: &MethodBody) -> Vec<CursorUse> {
    let mut cursors = Vec::new();

    for (local, acquire) in acquire_candidates(module, body) {
        if let Some(cursor) = check_candidate(module, body, local, acquire) {
            cursors.push(cursor);
        }
    }

    cursors
}

/// Locals with exactly one initializing store whose value is a
/// cursor-acquire call.
fn acquire_candidates(
    module: &Module,
    body: &MethodBody,
) -> Vec<(LocalId, (StmtId, ExprId))> {
    let mut stores: FxHashMap<LocalId, SmallVec<[(StmtId, ExprId); 2]>> = FxHashMap::default();
    for (idx, stmt) in body.stmts.iter().enumerate() {
        if let Stmt::Assign {
            target: Place::Local(l),
            value,
        } = stmt
        {
            stores
                .entry(*l)
                .or_default()
                .push((StmtId::new(u32::try_from(idx).unwrap_or(u32::MAX)), *value));
        }
    }

    let mut out: Vec<_> = stores
        .into_iter()
        .filter_map(|(local, sites)| match sites.as_slice() {
            [(stmt, value)] if callee_role(module, body, *value) == Some(MethodRole::CursorAcquire) => {
                Some((local, (*stmt, *value)))
            }
            _ => None,
        })
        .collect();
    out.sort_by_key(|(local, _)| *local);
    out
}

/// The role of the statically-resolved callee of `expr`, when `expr`
/// is a call.
fn callee_role(module: &Module, body: &MethodBody, expr: ExprId) -> Option<MethodRole> {
    let ExprKind::Call {
        callee: Callee::Static(id),
        ..
    } = &body.expr(expr).kind
    else {
        return None;
    };
    module.method(*id).map(|m| m.role)
}

fn check_candidate(
    module: &Module,
    body: &MethodBody,
    local: LocalId,
    (acquire_store, acquire_call): (StmtId, ExprId),
) -> Option<CursorUse> {
    let mut reads: SmallVec<[ExprId; 4]> = SmallVec::new();
    for (idx, expr) in body.exprs.iter().enumerate() {
        if expr.kind == ExprKind::ReadLocal(local) {
            reads.push(ExprId::new(u32::try_from(idx).unwrap_or(u32::MAX)));
        }
    }
    if reads.is_empty() {
        return None;
    }

    // Every read must be the receiver of a step call.
    let mut step_calls: SmallVec<[ExprId; 4]> = SmallVec::new();
    for &read in &reads {
        let call = step_call_over(module, body, read)?;
        step_calls.push(call);
    }

    // All steps confined to one loop.
    let containing = containing_stmts(body);
    let loop_stmt = enclosing_loop(body, step_calls.as_slice(), &containing)?;
    let inside = loop_region(body, loop_stmt);
    if !step_calls
        .iter()
        .all(|call| containing.get(call).is_some_and(|s| inside.contains(s)))
    {
        return None;
    }

    Some(CursorUse {
        local,
        acquire_store,
        acquire_call,
        reads,
        step_calls,
    })
}

/// The advance/current call whose receiver is exactly `read`, if any.
fn step_call_over(module: &Module, body: &MethodBody, read: ExprId) -> Option<ExprId> {
    for (idx, expr) in body.exprs.iter().enumerate() {
        let ExprKind::Call {
            callee: Callee::Static(id),
            receiver: Some(recv),
            ..
        } = &expr.kind
        else {
            continue;
        };
        if *recv != read {
            continue;
        }
        return match module.method(*id).map(|m| m.role) {
            Some(MethodRole::CursorAdvance | MethodRole::CursorCurrent) => {
                Some(ExprId::new(u32::try_from(idx).unwrap_or(u32::MAX)))
            }
            _ => None,
        };
    }
    None
}

/// The single `While` whose condition or body holds the first step, as
/// the anchor all steps are checked against.
fn enclosing_loop(
    body: &MethodBody,
    steps: &[ExprId],
    containing: &FxHashMap<ExprId, StmtId>,
) -> Option<StmtId> {
    let first = *steps.first()?;
    let first_stmt = *containing.get(&first)?;

    for (idx, stmt) in body.stmts.iter().enumerate() {
        if let Stmt::While { .. } = stmt {
            let id = StmtId::new(u32::try_from(idx).unwrap_or(u32::MAX));
            if loop_region(body, id).contains(&first_stmt) {
                return Some(id);
            }
        }
    }
    None
}

/// The loop statement plus every statement transitively inside it.
fn loop_region(body: &MethodBody, loop_stmt: StmtId) -> FxHashSet<StmtId> {
    let mut region = FxHashSet::default();
    let mut work = vec![loop_stmt];
    while let Some(id) = work.pop() {
        if !region.insert(id) {
            continue;
        }
        match body.stmt(id) {
            Stmt::While { body: inner, .. } => work.extend(inner.iter().copied()),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                work.extend(then_body.iter().copied());
                work.extend(else_body.iter().copied());
            }
            _ => {}
        }
    }
    region
}

/// Maps every expression to the statement whose tree it appears in.
fn containing_stmts(body: &MethodBody) -> FxHashMap<ExprId, StmtId> {
    let mut map = FxHashMap::default();
    for (idx, stmt) in body.stmts.iter().enumerate() {
        let id = StmtId::new(u32::try_from(idx).unwrap_or(u32::MAX));
        let mut mark = |expr: ExprId| mark_subtree(body, expr, id, &mut map);
        match stmt {
            Stmt::Assign { target, value } => {
                if let Place::Field { base, .. } = target {
                    mark(*base);
                }
                mark(*value);
            }
            Stmt::Expr(e) => mark(*e),
            Stmt::Return(Some(e)) => mark(*e),
            Stmt::Return(None) => {}
            Stmt::While { cond, .. } => mark(*cond),
            Stmt::If { cond, .. } => mark(*cond),
        }
    }
    map
}

fn mark_subtree(
    body: &MethodBody,
    expr: ExprId,
    stmt: StmtId,
    map: &mut FxHashMap<ExprId, StmtId>,
) {
    map.insert(expr, stmt);
    match &body.expr(expr).kind {
        ExprKind::ReadField { base, .. } => mark_subtree(body, *base, stmt, map),
        ExprKind::Construct { args } => {
            for &a in args {
                mark_subtree(body, a, stmt, map);
            }
        }
        ExprKind::Call { receiver, args, .. } => {
            if let Some(r) = receiver {
                mark_subtree(body, *r, stmt, map);
            }
            for &a in args {
                mark_subtree(body, a, stmt, map);
            }
        }
        ExprKind::Prim { lhs, rhs, .. } => {
            mark_subtree(body, *lhs, stmt, map);
            mark_subtree(body, *rhs, stmt, map);
        }
        ExprKind::ReadLocal(_)
        | ExprKind::ReadParam(_)
        | ExprKind::ReadReceiver
        | ExprKind::Literal(_) => {}
    }
}
