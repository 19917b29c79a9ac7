//! Per-edge copy decisions.
//!
//! Walks one method body and assigns a [`CopyDecision`] to every IR
//! edge that carries a composite value: argument and receiver slots of
//! calls, operands of record constructions, local and field stores,
//! and return flow. The verdict combines
//! the destination's mutation fact (from the callee's
//! [`MutationSignature`]) with the value's [`AliasOrigin`]:
//!
//! - a destination proven non-mutating never copies, whatever flows in;
//! - a fresh or pure value never copies, whatever consumes it;
//! - a mutating or unresolved destination fed observable storage copies;
//! - a receiver naming storage directly never copies, because in-place
//!   mutation through it is what the source language does too.
//!
//! Stores are the boundary where a value becomes re-observable, so
//! storing observable storage always copies. Embedding observable
//! storage into a construction is the same boundary: the new aggregate
//! re-exposes the operand through its own fields, so the operand is
//! isolated there and the aggregate itself stays fresh. A call result
//! that
//! merely *aliases* an argument pushes its copy out to the store that
//! consumes it instead of the argument edge. That keeps nested chains
//! at one copy for the outermost hop: inner hops hand a value through
//! exactly once and must not each pay for isolation the final store
//! provides anyway.
//!
//! [`MutationSignature`]: crate::MutationSignature

use rustc_hash::{FxHashMap, FxHashSet};

use ovid_ir::{Callee, ExprId, ExprKind, MethodBody, Place, Stmt, StmtId};

use crate::mutation::{MutatesThrough, MutationSignature, ReturnAliasing, SignatureTable};
use crate::origin::{AliasOrigin, OriginMap};
use crate::ValueClassification;

/// An IR edge that carries a composite value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UseEdge {
    /// Argument slot `index` of the call expression `call`.
    Argument { call: ExprId, index: u32 },
    /// The receiver slot of the call expression `call`.
    CallReceiver { call: ExprId },
    /// Operand slot `index` of the record construction `construct`.
    ConstructOperand { construct: ExprId, index: u32 },
    /// The value side of a store into a local.
    StoreLocal { stmt: StmtId },
    /// The value side of a store into a field.
    StoreField { stmt: StmtId },
    /// The operand of a `return`.
    ReturnValue { stmt: StmtId },
}

/// Whether a defensive copy is materialized on an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    NoCopy,
    InsertCopy,
}

/// The fact that decided an edge, kept for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyReason {
    /// The callee writes through this slot.
    MutatingCallee,
    /// The callee is unresolved; treated as writing through every slot.
    UnresolvedCallee,
    /// The callee provably never writes through this slot.
    NonMutatingCallee,
    /// The value is fresh or a pure result; no one else holds it.
    UnsharedValue,
    /// Observable storage crossing into named or aggregate storage.
    StoreBoundary,
    /// The copy belongs to the store boundary this value flows into,
    /// not here.
    DeferredToStore,
    /// The receiver denotes the storage itself; mutating it in place
    /// is the source-language behavior.
    InPlaceReceiver,
    /// Both sides of the copy were proven to never diverge, so the
    /// optimizer elided it.
    RedundantCopy,
    /// A recognized iteration cursor; its identity must survive.
    IterationIdentity,
}

/// One decided edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyDecision {
    pub edge: UseEdge,
    pub verdict: Verdict,
    pub reason: CopyReason,
}

/// All decisions for one method body, in deterministic edge order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecisionTable {
    decisions: Vec<CopyDecision>,
    index: FxHashMap<UseEdge, usize>,
}

impl DecisionTable {
    fn push(&mut self, edge: UseEdge, verdict: Verdict, reason: CopyReason) {
        self.index.insert(edge, self.decisions.len());
        self.decisions.push(CopyDecision {
            edge,
            verdict,
            reason,
        });
    }

    /// The decision for `edge`, if the edge carries a composite value.
    pub fn get(&self, edge: UseEdge) -> Option<&CopyDecision> {
        self.index.get(&edge).map(|&i| &self.decisions[i])
    }

    /// All decisions, in the order the edges appear in the body.
    pub fn iter(&self) -> impl Iterator<Item = &CopyDecision> {
        self.decisions.iter()
    }

    /// Number of edges that materialize a copy.
    pub fn copy_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.verdict == Verdict::InsertCopy)
            .count()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Downgrade hook for the temporaries optimizer; leaves unknown
    /// edges alone.
    pub(crate) fn force_no_copy(&mut self, edge: UseEdge, reason: CopyReason) {
        if let Some(&i) = self.index.get(&edge) {
            let d = &mut self.decisions[i];
            d.verdict = Verdict::NoCopy;
            d.reason = reason;
        }
    }
}

/// Decide every qualifying edge of `body`.
///
/// Store edges are decided first so argument edges can defer to them.
pub fn analyze_method_copies<C: ValueClassification>(
    body: &MethodBody,
    classes: &C,
    sigs: &SignatureTable,
    origins: &OriginMap,
) -> DecisionTable {
    let analyzer = EdgeAnalyzer {
        origins,
        stored: stored_values(body),
    };

    let mut table = DecisionTable::default();

    for (idx, stmt) in body.stmts.iter().enumerate() {
        let stmt_id = StmtId::new(u32::try_from(idx).unwrap_or(u32::MAX));
        match stmt {
            Stmt::Assign { target, value } => {
                if !classes.needs_copy_tracking(body.expr(*value).ty) {
                    continue;
                }
                let edge = match target {
                    Place::Field { .. } => UseEdge::StoreField { stmt: stmt_id },
                    _ => UseEdge::StoreLocal { stmt: stmt_id },
                };
                let (verdict, reason) = analyzer.store_verdict(*value);
                table.push(edge, verdict, reason);
            }
            Stmt::Return(Some(value)) => {
                if !classes.needs_copy_tracking(body.expr(*value).ty) {
                    continue;
                }
                let reason = match origins.get(*value) {
                    AliasOrigin::ObservableStorage(_) => CopyReason::DeferredToStore,
                    AliasOrigin::IterationHandle => CopyReason::IterationIdentity,
                    _ => CopyReason::UnsharedValue,
                };
                table.push(
                    UseEdge::ReturnValue { stmt: stmt_id },
                    Verdict::NoCopy,
                    reason,
                );
            }
            _ => {}
        }
    }

    for (idx, expr) in body.exprs.iter().enumerate() {
        let id = ExprId::new(u32::try_from(idx).unwrap_or(u32::MAX));
        match &expr.kind {
            ExprKind::Call {
                callee,
                receiver,
                args,
            } => {
                let sig = resolved_signature(callee, sigs);

                if let Some(recv) = receiver {
                    if classes.needs_copy_tracking(body.expr(*recv).ty) {
                        let fact = sig.map_or(MutatesThrough::Unknown, |s| s.receiver);
                        let (verdict, reason) = analyzer.receiver_verdict(body, *recv, fact);
                        table.push(UseEdge::CallReceiver { call: id }, verdict, reason);
                    }
                }

                for (i, &arg) in args.iter().enumerate() {
                    if !classes.needs_copy_tracking(body.expr(arg).ty) {
                        continue;
                    }
                    let index = u32::try_from(i).unwrap_or(u32::MAX);
                    let fact = sig.map_or(MutatesThrough::Unknown, |s| s.param(index));
                    let (verdict, reason) = analyzer.argument_verdict(arg, fact, index, sig, id);
                    table.push(UseEdge::Argument { call: id, index }, verdict, reason);
                }
            }
            ExprKind::Construct { args } => {
                for (i, &arg) in args.iter().enumerate() {
                    if !classes.needs_copy_tracking(body.expr(arg).ty) {
                        continue;
                    }
                    let index = u32::try_from(i).unwrap_or(u32::MAX);
                    let (verdict, reason) = analyzer.operand_verdict(arg);
                    table.push(
                        UseEdge::ConstructOperand { construct: id, index },
                        verdict,
                        reason,
                    );
                }
            }
            _ => {}
        }
    }

    table
}

/// Whether an expression names storage directly: a local, parameter,
/// or receiver read, possibly through a field chain.
fn is_lvalue_chain(body: &MethodBody, expr: ExprId) -> bool {
    match &body.expr(expr).kind {
        ExprKind::ReadLocal(_) | ExprKind::ReadParam(_) | ExprKind::ReadReceiver => true,
        ExprKind::ReadField { base, .. } => is_lvalue_chain(body, *base),
        _ => false,
    }
}

/// Expressions consumed directly as the value side of some `Assign`.
fn stored_values(body: &MethodBody) -> FxHashSet<ExprId> {
    let mut stored = FxHashSet::default();
    for stmt in &body.stmts {
        if let Stmt::Assign { value, .. } = stmt {
            stored.insert(*value);
        }
    }
    stored
}

fn resolved_signature<'a>(
    callee: &Callee,
    sigs: &'a SignatureTable,
) -> Option<&'a MutationSignature> {
    match callee {
        Callee::Static(id) => sigs.get(*id),
        Callee::Unknown(_) => None,
    }
}

struct EdgeAnalyzer<'a> {
    origins: &'a OriginMap,
    stored: FxHashSet<ExprId>,
}

impl EdgeAnalyzer<'_> {
    /// Verdict for the value side of a store.
    fn store_verdict(&self, value: ExprId) -> (Verdict, CopyReason) {
        match self.origins.get(value) {
            AliasOrigin::FreshConstruction | AliasOrigin::PureFunctionResult => {
                (Verdict::NoCopy, CopyReason::UnsharedValue)
            }
            AliasOrigin::IterationHandle => (Verdict::NoCopy, CopyReason::IterationIdentity),
            AliasOrigin::ObservableStorage(_) => {
                (Verdict::InsertCopy, CopyReason::StoreBoundary)
            }
        }
    }

    /// Verdict for an operand embedded into a record construction.
    ///
    /// The finished aggregate is classified fresh, so this edge is the
    /// only place an observable operand can be isolated before the
    /// aggregate re-exposes it through a field.
    fn operand_verdict(&self, value: ExprId) -> (Verdict, CopyReason) {
        // Same boundary semantics as a store into named storage.
        self.store_verdict(value)
    }

    /// Verdict for an argument slot.
    fn argument_verdict(
        &self,
        value: ExprId,
        fact: MutatesThrough,
        index: u32,
        sig: Option<&MutationSignature>,
        call: ExprId,
    ) -> (Verdict, CopyReason) {
        match self.origins.get(value) {
            AliasOrigin::FreshConstruction | AliasOrigin::PureFunctionResult => {
                return (Verdict::NoCopy, CopyReason::UnsharedValue);
            }
            AliasOrigin::IterationHandle => {
                return (Verdict::NoCopy, CopyReason::IterationIdentity);
            }
            AliasOrigin::ObservableStorage(_) => {}
        }

        match fact {
            MutatesThrough::No => (Verdict::NoCopy, CopyReason::NonMutatingCallee),
            MutatesThrough::Yes | MutatesThrough::Unknown => {
                // The callee hands this argument back out; if the
                // result lands in a store, the store's copy already
                // isolates the chain, and the argument edge copying too
                // would detach the returned value from the mutation the
                // callee applies to it.
                if let Some(sig) = sig {
                    if sig.return_aliases == ReturnAliasing::Parameter(index)
                        && self.result_is_copied_at_store(call)
                    {
                        return (Verdict::NoCopy, CopyReason::DeferredToStore);
                    }
                }
                let reason = if fact == MutatesThrough::Yes {
                    CopyReason::MutatingCallee
                } else {
                    CopyReason::UnresolvedCallee
                };
                (Verdict::InsertCopy, reason)
            }
        }
    }

    /// Verdict for a receiver slot.
    ///
    /// A receiver that names storage directly (a local, parameter, or
    /// field chain over one) is mutated in place by the source language
    /// as well, so no copy ever applies there; only a receiver that is
    /// a temporary aliasing observable storage (an aliasing call
    /// result) must be detached before an in-place method runs on it.
    fn receiver_verdict(
        &self,
        body: &MethodBody,
        recv: ExprId,
        fact: MutatesThrough,
    ) -> (Verdict, CopyReason) {
        match self.origins.get(recv) {
            AliasOrigin::FreshConstruction | AliasOrigin::PureFunctionResult => {
                return (Verdict::NoCopy, CopyReason::UnsharedValue);
            }
            AliasOrigin::IterationHandle => {
                return (Verdict::NoCopy, CopyReason::IterationIdentity);
            }
            AliasOrigin::ObservableStorage(_) => {}
        }

        if fact == MutatesThrough::No {
            return (Verdict::NoCopy, CopyReason::NonMutatingCallee);
        }
        if is_lvalue_chain(body, recv) {
            return (Verdict::NoCopy, CopyReason::InPlaceReceiver);
        }
        let reason = if fact == MutatesThrough::Yes {
            CopyReason::MutatingCallee
        } else {
            CopyReason::UnresolvedCallee
        };
        (Verdict::InsertCopy, reason)
    }

    /// Whether this call's result flows directly into a store whose own
    /// verdict is `InsertCopy`. The store's verdict is origin-driven,
    /// so it is re-derived here instead of ordering the edge walk
    /// around a table lookup.
    fn result_is_copied_at_store(&self, call: ExprId) -> bool {
        self.stored.contains(&call)
            && matches!(self.origins.get(call), AliasOrigin::ObservableStorage(_))
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
