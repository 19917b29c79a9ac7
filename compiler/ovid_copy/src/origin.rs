//! Alias-origin classification.
//!
//! For every expression in a method body, decides where its value comes
//! from: storage the rest of the program can observe again, or a value
//! provably reachable only through this expression. Copy decisions need
//! this to tell "mutating a shared record" apart from "mutating a value
//! nobody else holds".
//!
//! The pass is a single bottom-up sweep over the expression arena.
//! Arena ids are emitted operands-first, so by the time an expression
//! is classified every operand already has an origin. Call results
//! inherit through the callee's return aliasing: an identity-shaped
//! callee (`return_aliases == Parameter(k)`) hands the argument's
//! origin through unchanged, and a fresh-returning callee produces
//! [`AliasOrigin::FreshConstruction`] no matter what went in. Anything
//! unresolvable gets its own opaque [`StorageId`], which no other
//! expression shares, so it is never mistaken for provably-unshared.

use ovid_ir::{Callee, ExprId, ExprKind, LocalId, MethodBody};

use crate::mutation::{ReturnAliasing, SignatureTable};

/// Identity of a storage location an expression's value may alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageId {
    /// A declared local variable.
    Local(LocalId),
    /// A formal parameter, by position.
    Param(u32),
    /// The implicit receiver.
    Receiver,
    /// Conservatively unknown storage. Each opaque id is distinct, so
    /// two opaque origins never compare as the same location.
    Opaque(u32),
}

/// Where an expression's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AliasOrigin {
    /// Constructed here; no other expression can reach it yet.
    FreshConstruction,
    /// Backed by storage the program can observe again. Field chains
    /// carry their root's storage: `p.a.b` is observable through `p`.
    ObservableStorage(StorageId),
    /// Result of a call that neither mutates its inputs nor returns an
    /// alias of them. Safe to feed onward without an inner-hop copy.
    PureFunctionResult,
    /// A cursor local recognized by the iteration pass; identity must
    /// survive uncopied.
    IterationHandle,
}

impl AliasOrigin {
    /// Whether mutating through this value can be observed elsewhere.
    #[inline]
    pub fn is_observable(self) -> bool {
        matches!(self, AliasOrigin::ObservableStorage(_))
    }
}

/// Per-expression origins for one method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginMap {
    origins: Vec<AliasOrigin>,
}

impl OriginMap {
    /// Origin of `expr`. Ids past the arena end are opaque, matching
    /// the conservative default for anything the sweep never saw.
    pub fn get(&self, expr: ExprId) -> AliasOrigin {
        self.origins
            .get(expr.index())
            .copied()
            .unwrap_or(AliasOrigin::ObservableStorage(StorageId::Opaque(u32::MAX)))
    }

    /// Number of classified expressions.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Override used by the cursor recognizer.
    pub(crate) fn set(&mut self, expr: ExprId, origin: AliasOrigin) {
        if let Some(slot) = self.origins.get_mut(expr.index()) {
            *slot = origin;
        }
    }
}

/// Classify every expression of `body` bottom-up.
pub fn classify_origins(body: &MethodBody, sigs: &SignatureTable) -> OriginMap {
    let mut origins = Vec::with_capacity(body.exprs.len());
    let mut next_opaque = 0u32;
    let opaque = |n: &mut u32| {
        let id = *n;
        *n = n.wrapping_add(1);
        AliasOrigin::ObservableStorage(StorageId::Opaque(id))
    };

    for expr in &body.exprs {
        let origin = match &expr.kind {
            ExprKind::ReadLocal(l) => AliasOrigin::ObservableStorage(StorageId::Local(*l)),
            ExprKind::ReadParam(i) => AliasOrigin::ObservableStorage(StorageId::Param(*i)),
            ExprKind::ReadReceiver => AliasOrigin::ObservableStorage(StorageId::Receiver),
            // A field chain aliases whatever its root aliases.
            ExprKind::ReadField { base, .. } => origins
                .get(base.index())
                .copied()
                .unwrap_or_else(|| opaque(&mut next_opaque)),
            // A construction is fresh as an aggregate; observable
            // operands embedded into it carry their own copy edges.
            ExprKind::Literal(_) | ExprKind::Construct { .. } | ExprKind::Prim { .. } => {
                AliasOrigin::FreshConstruction
            }
            ExprKind::Call {
                callee,
                receiver,
                args,
            } => call_origin(callee, receiver.as_ref(), args, &origins, sigs)
                .unwrap_or_else(|| opaque(&mut next_opaque)),
        };
        origins.push(origin);
    }

    OriginMap { origins }
}

/// Origin of a call result, or `None` when it must fall back to opaque.
fn call_origin(
    callee: &Callee,
    receiver: Option<&ExprId>,
    args: &[ExprId],
    origins: &[AliasOrigin],
    sigs: &SignatureTable,
) -> Option<AliasOrigin> {
    let Callee::Static(id) = callee else {
        return None;
    };
    let sig = sigs.get(*id)?;

    if sig.return_is_fresh {
        return Some(AliasOrigin::FreshConstruction);
    }

    match sig.return_aliases {
        // Identity hop: the result is the argument's value, not a copy.
        ReturnAliasing::Parameter(k) => args
            .get(k as usize)
            .and_then(|arg| origins.get(arg.index()))
            .copied(),
        ReturnAliasing::ReceiverOrUnknown => {
            // Receiver aliasing is only trusted when the callee is
            // otherwise fully resolved and non-mutating; an unresolved
            // callee reports the same variant and must stay opaque.
            if sig.is_non_mutating() {
                receiver.and_then(|r| origins.get(r.index())).copied()
            } else {
                None
            }
        }
        ReturnAliasing::None => {
            if sig.is_non_mutating() {
                Some(AliasOrigin::PureFunctionResult)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
