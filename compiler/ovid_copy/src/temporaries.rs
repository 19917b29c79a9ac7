//! Temporary materialization.
//!
//! Runs after the copy analyzer and refines its output in two strictly
//! copy-count-reducing ways:
//!
//! - **Copy elision.** A store-boundary copy isolates its destination
//!   from later writes to either side. When the body provably never
//!   writes to either side again (no reassignment, no field store, no
//!   uncopied handoff into a mutating slot, counting writes that reach
//!   a root through an aliasing call result), the two sides can never
//!   diverge and the copy buys nothing; it is elided.
//! - **Temp slots.** A composite local that is initialized once, read
//!   more than once, and never mutated is materialized into a reusable
//!   slot instead of being re-derived at every read. Slot assignment
//!   only labels the local; it changes no verdict.
//!
//! The mutation facts feeding the safety check come from the decided
//! table itself: an edge that already copies shields its storage from
//! the callee, so only `NoCopy` edges into mutating slots count as
//! writes. Elision never touches an edge whose copy the analyzer
//! required for a reason that still holds — the proof here is that the
//! reason no longer holds.

use rustc_hash::{FxHashMap, FxHashSet};

use ovid_ir::{ExprId, ExprKind, LocalId, MethodBody, Place, Stmt, StmtId};

use crate::copy_analysis::{CopyReason, DecisionTable, UseEdge, Verdict};
use crate::mutation::{MutatesThrough, ReturnAliasing, SignatureTable};
use crate::ValueClassification;

/// Storage roots a body can write through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Root {
    Local(LocalId),
    Param(u32),
    Receiver,
}

/// The storage behind a value expression, resolved through callees
/// that return an alias of one of their inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AliasedRoot {
    Root(Root),
    /// Fresh or pure value; no body-visible storage behind it.
    None,
    /// Cannot be pinned down; any root may back it.
    Unknown,
}

/// Roots the body may write through. `unknown` poisons the set: one
/// write through unresolvable storage blocks every elision.
#[derive(Debug, Default)]
struct WriteSet {
    roots: FxHashSet<Root>,
    unknown: bool,
}

impl WriteSet {
    fn touches(&self, root: Root) -> bool {
        self.unknown || self.roots.contains(&root)
    }

    fn record(&mut self, root: AliasedRoot) {
        match root {
            AliasedRoot::Root(r) => {
                self.roots.insert(r);
            }
            AliasedRoot::Unknown => self.unknown = true,
            AliasedRoot::None => {}
        }
    }
}

/// The optimizer's output for one method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaterializationPlan {
    elided: Vec<UseEdge>,
    temp_slots: Vec<(LocalId, u32)>,
}

impl MaterializationPlan {
    /// Edges whose copies were canceled, in body order.
    pub fn elided(&self) -> &[UseEdge] {
        &self.elided
    }

    /// The slot assigned to `local`, if it was materialized.
    pub fn temp_slot(&self, local: LocalId) -> Option<u32> {
        self.temp_slots
            .iter()
            .find(|(l, _)| *l == local)
            .map(|&(_, slot)| slot)
    }

    /// Number of distinct temp slots.
    pub fn slot_count(&self) -> usize {
        self.temp_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elided.is_empty() && self.temp_slots.is_empty()
    }
}

/// Elide redundant copies in `table` and assign temp slots.
pub fn optimize_temporaries<C: ValueClassification>(
    body: &MethodBody,
    classes: &C,
    sigs: &SignatureTable,
    table: &mut DecisionTable,
) -> MaterializationPlan {
    let mutated = mutated_roots(body, sigs, table);
    let store_counts = local_store_counts(body);
    let read_counts = local_read_counts(body);

    let mut plan = MaterializationPlan::default();

    // Copy elision over store boundaries.
    let candidates: Vec<(StmtId, LocalId, ExprId)> = body
        .stmts
        .iter()
        .enumerate()
        .filter_map(|(idx, stmt)| {
            let Stmt::Assign {
                target: Place::Local(dst),
                value,
            } = stmt
            else {
                return None;
            };
            Some((StmtId::new(u32::try_from(idx).unwrap_or(u32::MAX)), *dst, *value))
        })
        .collect();

    for (stmt, dst, value) in candidates {
        let edge = UseEdge::StoreLocal { stmt };
        let copies = table
            .get(edge)
            .is_some_and(|d| d.verdict == Verdict::InsertCopy);
        if !copies {
            continue;
        }
        let Some(src) = lvalue_root(body, value) else {
            continue;
        };
        let dst_untouched =
            store_counts.get(&dst).copied().unwrap_or(0) == 1 && !mutated.touches(Root::Local(dst));
        if dst_untouched && !mutated.touches(src) {
            table.force_no_copy(edge, CopyReason::RedundantCopy);
            plan.elided.push(edge);
        }
    }

    // Temp slots for read-only multi-read composites.
    let mut slot = 0u32;
    for (idx, decl) in body.locals.iter().enumerate() {
        if !classes.needs_copy_tracking(decl.ty) {
            continue;
        }
        let local = LocalId::new(u32::try_from(idx).unwrap_or(u32::MAX));
        let reads = read_counts.get(&local).copied().unwrap_or(0);
        let initialized_once = store_counts.get(&local).copied().unwrap_or(0) == 1;
        if reads >= 2 && initialized_once && !mutated.touches(Root::Local(local)) {
            plan.temp_slots.push((local, slot));
            slot += 1;
        }
    }

    plan
}

/// Roots the body writes through, with already-copied edges excluded:
/// a copy at an edge means the callee mutates the copy, not the root.
fn mutated_roots(body: &MethodBody, sigs: &SignatureTable, table: &DecisionTable) -> WriteSet {
    let mut mutated = WriteSet::default();

    let store_counts = local_store_counts(body);
    for stmt in &body.stmts {
        let Stmt::Assign { target, .. } = stmt else {
            continue;
        };
        match target {
            // The first store initializes; further stores mutate.
            Place::Local(l) => {
                if store_counts.get(l).copied().unwrap_or(0) > 1 {
                    mutated.record(AliasedRoot::Root(Root::Local(*l)));
                }
            }
            Place::Param(i) => {
                mutated.record(AliasedRoot::Root(Root::Param(*i)));
            }
            Place::Receiver => {
                mutated.record(AliasedRoot::Root(Root::Receiver));
            }
            Place::Field { base, .. } => {
                mutated.record(aliased_root(body, sigs, *base));
            }
        }
    }

    for (idx, expr) in body.exprs.iter().enumerate() {
        let call = ExprId::new(u32::try_from(idx).unwrap_or(u32::MAX));
        let ExprKind::Call {
            callee,
            receiver,
            args,
        } = &expr.kind
        else {
            continue;
        };
        let sig = match callee {
            ovid_ir::Callee::Static(id) => sigs.get(*id),
            ovid_ir::Callee::Unknown(_) => None,
        };

        if let Some(recv) = receiver {
            let fact = sig.map_or(MutatesThrough::Unknown, |s| s.receiver);
            if fact.forces_copy() && passes_uncopied(table, UseEdge::CallReceiver { call }) {
                mutated.record(aliased_root(body, sigs, *recv));
            }
        }
        for (i, &arg) in args.iter().enumerate() {
            let index = u32::try_from(i).unwrap_or(u32::MAX);
            let fact = sig.map_or(MutatesThrough::Unknown, |s| s.param(index));
            if fact.forces_copy() && passes_uncopied(table, UseEdge::Argument { call, index }) {
                mutated.record(aliased_root(body, sigs, arg));
            }
        }
    }

    mutated
}

/// Resolve the storage behind a value, chasing field chains and calls
/// whose signature reports return aliasing.
fn aliased_root(body: &MethodBody, sigs: &SignatureTable, expr: ExprId) -> AliasedRoot {
    match &body.expr(expr).kind {
        ExprKind::ReadLocal(l) => AliasedRoot::Root(Root::Local(*l)),
        ExprKind::ReadParam(i) => AliasedRoot::Root(Root::Param(*i)),
        ExprKind::ReadReceiver => AliasedRoot::Root(Root::Receiver),
        ExprKind::ReadField { base, .. } => aliased_root(body, sigs, *base),
        ExprKind::Call {
            callee,
            receiver,
            args,
        } => {
            let ovid_ir::Callee::Static(id) = callee else {
                return AliasedRoot::Unknown;
            };
            let Some(sig) = sigs.get(*id) else {
                return AliasedRoot::Unknown;
            };
            if sig.return_is_fresh {
                return AliasedRoot::None;
            }
            match sig.return_aliases {
                ReturnAliasing::Parameter(k) => args
                    .get(k as usize)
                    .map_or(AliasedRoot::Unknown, |&a| aliased_root(body, sigs, a)),
                ReturnAliasing::ReceiverOrUnknown => match receiver {
                    Some(r) if sig.is_non_mutating() => aliased_root(body, sigs, *r),
                    _ => AliasedRoot::Unknown,
                },
                ReturnAliasing::None => AliasedRoot::None,
            }
        }
        _ => AliasedRoot::None,
    }
}

/// Whether the edge hands its value over without a copy. Edges the
/// analyzer never tracked (scalars) pass uncopied by definition.
fn passes_uncopied(table: &DecisionTable, edge: UseEdge) -> bool {
    !table
        .get(edge)
        .is_some_and(|d| d.verdict == Verdict::InsertCopy)
}

fn lvalue_root(body: &MethodBody, expr: ExprId) -> Option<Root> {
    match &body.expr(expr).kind {
        ExprKind::ReadLocal(l) => Some(Root::Local(*l)),
        ExprKind::ReadParam(i) => Some(Root::Param(*i)),
        ExprKind::ReadReceiver => Some(Root::Receiver),
        ExprKind::ReadField { base, .. } => lvalue_root(body, *base),
        _ => None,
    }
}

fn local_store_counts(body: &MethodBody) -> FxHashMap<LocalId, usize> {
    let mut counts = FxHashMap::default();
    for stmt in &body.stmts {
        if let Stmt::Assign {
            target: Place::Local(l),
            ..
        } = stmt
        {
            *counts.entry(*l).or_insert(0) += 1;
        }
    }
    counts
}

fn local_read_counts(body: &MethodBody) -> FxHashMap<LocalId, usize> {
    let mut counts = FxHashMap::default();
    for expr in &body.exprs {
        if let ExprKind::ReadLocal(l) = &expr.kind {
            *counts.entry(*l).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
