//! Interprocedural mutation summaries.
//!
//! For every method, computes a [`MutationSignature`]: whether the body
//! writes through the implicit receiver and each formal parameter,
//! directly or transitively via calls, plus what the return value may
//! alias. These facts drive every copy decision downstream.
//!
//! # Algorithm
//!
//! 1. **Direct stores**: a store through a field chain rooted at a
//!    parameter or the receiver sets that formal's fact to `Yes`.
//! 2. **Propagation**: passing a parameter (or a field chain of one,
//!    with no intervening copy) to a callee position whose fact is
//!    `Yes`/`Unknown` joins that fact into the caller's formal.
//! 3. **Fixpoint**: methods inside one strongly-connected component are
//!    recomputed together until no signature changes, with a sweep cap.
//!    Hitting the cap degrades every undecided fact in the component to
//!    `Unknown` — conservatively correct, never wrong.
//!
//! The fact lattice `No < Unknown < Yes` is monotone: facts only ever
//! move up, so convergence is guaranteed for any finite component; the
//! cap exists for pathological inputs only.
//!
//! Calls to methods outside the analyzable unit (no body, or virtual
//! dispatch with unknown overriders) default every fact to `Unknown`
//! and the return aliasing to `ReceiverOrUnknown`.
//!
//! # Return chains
//!
//! `return` analysis is structural, not one syntactic level deep: a
//! returned call result defers to the callee's composed facts, which
//! may point back into this call's own argument expressions
//! (`return f(x)` where `f` returns its argument aliases `x`'s
//! storage). Locals are resolved through their assignment sites with
//! aliasing over-approximated — reporting a spurious alias only costs a
//! copy, missing a real one would be wrong.
//!
//! Computing a signature never fails; the worst case is a fully
//! conservative result.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use ovid_ir::{
    Callee, ExprId, ExprKind, LocalId, Method, MethodBody, MethodId, Module, Place, Stmt,
};

use crate::graph::Condensation;

/// Tri-state mutation fact for one formal (receiver or parameter).
///
/// Ordered as a lattice: `No < Unknown < Yes`. `join` is `max`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutatesThrough {
    /// Provably never written through.
    #[default]
    No,
    /// Undecidable — treated as mutating by every consumer.
    Unknown,
    /// Written through, directly or transitively.
    Yes,
}

impl MutatesThrough {
    /// Least upper bound.
    #[inline]
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }

    /// Whether a copy is forced when an observable value meets this fact.
    #[inline]
    pub fn forces_copy(self) -> bool {
        self != MutatesThrough::No
    }
}

/// What the return value may alias among the method's inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReturnAliasing {
    /// The return value never aliases any input.
    #[default]
    None,
    /// The return value may be the (unmodified) argument passed to
    /// parameter `k`.
    Parameter(u32),
    /// The return value may alias the receiver, or something the
    /// analysis cannot name. The conservative top.
    ReceiverOrUnknown,
}

impl ReturnAliasing {
    /// Least upper bound: distinct concrete parameters widen to the top.
    pub fn join(self, other: Self) -> Self {
        use ReturnAliasing::{None, Parameter, ReceiverOrUnknown};
        match (self, other) {
            (None, x) | (x, None) => x,
            (Parameter(a), Parameter(b)) if a == b => Parameter(a),
            (Parameter(_), Parameter(_))
            | (ReceiverOrUnknown, _)
            | (_, ReceiverOrUnknown) => ReceiverOrUnknown,
        }
    }
}

/// Per-method mutation summary.
///
/// Either fully resolved or fully conservative — never partial. Built
/// once per compilation unit and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationSignature {
    /// Fact for the implicit receiver (`No` for static methods).
    pub receiver: MutatesThrough,
    /// Facts per formal parameter, in declaration order.
    pub params: Vec<MutatesThrough>,
    /// What the return value may alias.
    pub return_aliases: ReturnAliasing,
    /// `true` when every return site yields a freshly constructed
    /// value no caller-visible storage can observe.
    pub return_is_fresh: bool,
}

impl MutationSignature {
    /// The fully conservative signature used for unanalyzable methods.
    pub fn conservative(param_count: usize, has_receiver: bool) -> Self {
        Self {
            receiver: if has_receiver {
                MutatesThrough::Unknown
            } else {
                MutatesThrough::No
            },
            params: vec![MutatesThrough::Unknown; param_count],
            return_aliases: ReturnAliasing::ReceiverOrUnknown,
            return_is_fresh: false,
        }
    }

    /// Fact for parameter `index`; out-of-range indices are `Unknown`.
    pub fn param(&self, index: u32) -> MutatesThrough {
        self.params
            .get(index as usize)
            .copied()
            .unwrap_or(MutatesThrough::Unknown)
    }

    /// `true` when no formal (receiver included) is ever written through.
    pub fn is_non_mutating(&self) -> bool {
        !self.receiver.forces_copy() && self.params.iter().all(|p| !p.forces_copy())
    }

    /// Degrade every undecided fact to `Unknown` (fixpoint cap hit).
    fn degrade(&mut self) {
        if self.receiver == MutatesThrough::No {
            self.receiver = MutatesThrough::Unknown;
        }
        for p in &mut self.params {
            if *p == MutatesThrough::No {
                *p = MutatesThrough::Unknown;
            }
        }
        self.return_aliases = ReturnAliasing::ReceiverOrUnknown;
        self.return_is_fresh = false;
    }
}

/// The full signature table for one compilation unit, indexed by
/// [`MethodId`]. Write-once: the builder fills it, everyone else reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureTable {
    sigs: Vec<Option<MutationSignature>>,
}

impl SignatureTable {
    /// An empty table sized for `len` methods.
    pub fn with_len(len: usize) -> Self {
        Self {
            sigs: vec![None; len],
        }
    }

    /// The signature for `method`, if solved.
    pub fn get(&self, method: MethodId) -> Option<&MutationSignature> {
        self.sigs.get(method.index()).and_then(Option::as_ref)
    }

    /// Record a solved signature. Each key is written exactly once.
    pub(crate) fn insert(&mut self, method: MethodId, sig: MutationSignature) {
        if let Some(slot) = self.sigs.get_mut(method.index()) {
            debug_assert!(slot.is_none(), "signature for {method:?} written twice");
            *slot = Some(sig);
        }
    }

    /// Iterate the solved signatures with their method ids.
    pub fn iter(&self) -> impl Iterator<Item = (MethodId, &MutationSignature)> {
        self.sigs.iter().enumerate().filter_map(|(i, s)| {
            s.as_ref()
                .map(|sig| (MethodId::new(u32::try_from(i).unwrap_or(u32::MAX)), sig))
        })
    }

    /// Number of method slots.
    pub fn len(&self) -> usize {
        self.sigs.len()
    }

    /// Returns `true` if the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.sigs.is_empty()
    }
}

/// Build signatures for the whole module, component by component in
/// reverse topological order.
///
/// This is the sequential driver; the pipeline parallelizes across a
/// wave's components with the same [`solve_component`] worker.
pub fn build_signatures(
    module: &Module,
    cond: &Condensation,
    fixpoint_cap: usize,
) -> SignatureTable {
    let mut table = SignatureTable::with_len(module.len());

    for wave in cond.waves() {
        for &comp in wave {
            for (method, sig) in solve_component(module, cond.component(comp), &table, fixpoint_cap)
            {
                table.insert(method, sig);
            }
        }
    }

    table
}

/// Solve one condensation component against the already-solved `table`.
///
/// Singleton acyclic components converge in one sweep; cyclic ones
/// iterate to fixpoint with `fixpoint_cap` bounding the sweep count.
pub(crate) fn solve_component(
    module: &Module,
    methods: &[MethodId],
    table: &SignatureTable,
    fixpoint_cap: usize,
) -> Vec<(MethodId, MutationSignature)> {
    // Optimistic initialization: all facts `No`, refined monotonically.
    let mut local: FxHashMap<MethodId, MutationSignature> = methods
        .iter()
        .map(|&m| {
            let sig = module.method(m).map_or_else(MutationSignature::default, |me| {
                MutationSignature {
                    receiver: MutatesThrough::No,
                    params: vec![MutatesThrough::No; me.params.len()],
                    return_aliases: ReturnAliasing::None,
                    return_is_fresh: false,
                }
            });
            (m, sig)
        })
        .collect();

    let mut converged = false;
    for _ in 0..fixpoint_cap {
        let mut changed = false;
        for &m in methods {
            let Some(method) = module.method(m) else { continue };
            let next = compute_signature(method, &SigView {
                table,
                local: &local,
            });
            let entry = local.entry(m).or_default();
            if *entry != next {
                *entry = next;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::warn!(
            component_size = methods.len(),
            cap = fixpoint_cap,
            "mutation fixpoint cap hit; degrading undecided facts to Unknown"
        );
        for sig in local.values_mut() {
            sig.degrade();
        }
    }

    methods
        .iter()
        .filter_map(|&m| local.remove(&m).map(|sig| (m, sig)))
        .collect()
}

/// Signature lookup spanning the solved table and the in-flight
/// component estimates.
struct SigView<'a> {
    table: &'a SignatureTable,
    local: &'a FxHashMap<MethodId, MutationSignature>,
}

impl SigView<'_> {
    fn get(&self, method: MethodId) -> Option<&MutationSignature> {
        self.local.get(&method).or_else(|| self.table.get(method))
    }
}

/// The storage a value expression derives from with no intervening copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DerivationRoot {
    Param(u32),
    Receiver,
    Local(LocalId),
    /// Fresh values, pure call results, literals — nothing the
    /// caller-visible formals back.
    None,
    /// Storage that cannot be pinned down; any formal may back it.
    Unknown,
}

/// Chase a field-read chain down to its rooted storage. A call result
/// is still formal-backed when the callee returns an alias of one of
/// its inputs, so those hops resolve through the callee's signature;
/// an unresolvable hop is `Unknown`, never silently rootless.
fn derivation_root(body: &MethodBody, view: &SigView<'_>, expr: ExprId) -> DerivationRoot {
    match &body.expr(expr).kind {
        ExprKind::ReadParam(i) => DerivationRoot::Param(*i),
        ExprKind::ReadReceiver => DerivationRoot::Receiver,
        ExprKind::ReadLocal(l) => DerivationRoot::Local(*l),
        ExprKind::ReadField { base, .. } => derivation_root(body, view, *base),
        ExprKind::Call {
            callee,
            receiver,
            args,
        } => {
            let Callee::Static(id) = callee else {
                return DerivationRoot::Unknown;
            };
            let Some(sig) = view.get(*id) else {
                return DerivationRoot::Unknown;
            };
            if sig.return_is_fresh {
                return DerivationRoot::None;
            }
            match sig.return_aliases {
                ReturnAliasing::Parameter(k) => args
                    .get(k as usize)
                    .map_or(DerivationRoot::Unknown, |&a| derivation_root(body, view, a)),
                ReturnAliasing::ReceiverOrUnknown => match receiver {
                    Some(r) if sig.is_non_mutating() => derivation_root(body, view, *r),
                    _ => DerivationRoot::Unknown,
                },
                ReturnAliasing::None => DerivationRoot::None,
            }
        }
        _ => DerivationRoot::None,
    }
}

/// One full (non-iterating) signature computation for a method body,
/// given the current estimates for every callee.
fn compute_signature(method: &Method, view: &SigView<'_>) -> MutationSignature {
    let Some(body) = &method.body else {
        return MutationSignature::conservative(method.params.len(), method.receiver.is_some());
    };

    let mut sig = MutationSignature {
        receiver: MutatesThrough::No,
        params: vec![MutatesThrough::No; method.params.len()],
        return_aliases: ReturnAliasing::None,
        return_is_fresh: true,
    };

    fn join_root(sig: &mut MutationSignature, root: DerivationRoot, fact: MutatesThrough) {
        match root {
            DerivationRoot::Param(i) => {
                if let Some(p) = sig.params.get_mut(i as usize) {
                    *p = p.join(fact);
                }
            }
            DerivationRoot::Receiver => sig.receiver = sig.receiver.join(fact),
            // A local holds a value-semantics copy in the source
            // language; writing through it never reaches the caller.
            DerivationRoot::Local(_) | DerivationRoot::None => {}
            // A write through unknown storage may land on any formal.
            DerivationRoot::Unknown => {
                if fact != MutatesThrough::No {
                    sig.receiver = sig.receiver.join(MutatesThrough::Unknown);
                    for p in &mut sig.params {
                        *p = p.join(MutatesThrough::Unknown);
                    }
                }
            }
        }
    }

    // Direct stores through a formal-rooted field chain.
    for stmt in &body.stmts {
        if let Stmt::Assign {
            target: Place::Field { base, .. },
            ..
        } = stmt
        {
            join_root(&mut sig, derivation_root(body, view, *base), MutatesThrough::Yes);
        }
    }

    // Transitive mutation through calls.
    for expr in &body.exprs {
        let ExprKind::Call {
            callee,
            receiver,
            args,
        } = &expr.kind
        else {
            continue;
        };

        let callee_sig = match callee {
            Callee::Static(target) => view.get(*target),
            Callee::Unknown(_) => None,
        };

        if let Some(callee_sig) = callee_sig {
            if let Some(recv) = receiver {
                join_root(&mut sig, derivation_root(body, view, *recv), callee_sig.receiver);
            }
            for (j, &arg) in args.iter().enumerate() {
                let fact = callee_sig.param(u32::try_from(j).unwrap_or(u32::MAX));
                join_root(&mut sig, derivation_root(body, view, arg), fact);
            }
        } else {
            // Unknown or unanalyzable callee: every formal-rooted
            // operand may be mutated.
            if let Some(recv) = receiver {
                join_root(&mut sig, derivation_root(body, view, *recv), MutatesThrough::Unknown);
            }
            for &arg in args {
                join_root(&mut sig, derivation_root(body, view, arg), MutatesThrough::Unknown);
            }
        }
    }

    // Return-value analysis, structural through chains and locals.
    let mut resolver = ReturnResolver::new(body, view);
    let mut saw_value_return = false;
    for stmt in &body.stmts {
        if let Stmt::Return(Some(value)) = stmt {
            saw_value_return = true;
            let (aliases, fresh) = resolver.resolve_expr(*value);
            sig.return_aliases = sig.return_aliases.join(aliases);
            sig.return_is_fresh &= fresh;
        }
    }
    if !saw_value_return {
        sig.return_is_fresh = false;
    }

    sig
}

/// Structural resolver for what a returned expression aliases.
///
/// Locals memoize their joined assignment facts; a local-assignment
/// cycle resolves to the conservative top.
struct ReturnResolver<'a> {
    body: &'a MethodBody,
    view: &'a SigView<'a>,
    local_assigns: FxHashMap<LocalId, SmallVec<[ExprId; 2]>>,
    local_memo: FxHashMap<LocalId, (ReturnAliasing, bool)>,
    visiting: FxHashSet<LocalId>,
    /// Reads of each local, against reads consumed directly by returns;
    /// freshness survives a local only when they coincide (the value
    /// never escapes through another use).
    local_reads: FxHashMap<LocalId, u32>,
    return_reads: FxHashMap<LocalId, u32>,
}

impl<'a> ReturnResolver<'a> {
    fn new(body: &'a MethodBody, view: &'a SigView<'a>) -> Self {
        let mut local_assigns: FxHashMap<LocalId, SmallVec<[ExprId; 2]>> = FxHashMap::default();
        for stmt in &body.stmts {
            if let Stmt::Assign {
                target: Place::Local(l),
                value,
            } = stmt
            {
                local_assigns.entry(*l).or_default().push(*value);
            }
        }

        let mut local_reads: FxHashMap<LocalId, u32> = FxHashMap::default();
        for expr in &body.exprs {
            if let ExprKind::ReadLocal(l) = expr.kind {
                *local_reads.entry(l).or_insert(0) += 1;
            }
        }

        let mut return_reads: FxHashMap<LocalId, u32> = FxHashMap::default();
        for stmt in &body.stmts {
            if let Stmt::Return(Some(value)) = stmt {
                if let ExprKind::ReadLocal(l) = body.expr(*value).kind {
                    *return_reads.entry(l).or_insert(0) += 1;
                }
            }
        }

        Self {
            body,
            view,
            local_assigns,
            local_memo: FxHashMap::default(),
            visiting: FxHashSet::default(),
            local_reads,
            return_reads,
        }
    }

    fn resolve_expr(&mut self, expr: ExprId) -> (ReturnAliasing, bool) {
        let body = self.body;
        match &body.expr(expr).kind {
            ExprKind::Construct { .. } | ExprKind::Literal(_) | ExprKind::Prim { .. } => {
                (ReturnAliasing::None, true)
            }
            ExprKind::ReadParam(i) => (ReturnAliasing::Parameter(*i), false),
            ExprKind::ReadReceiver => (ReturnAliasing::ReceiverOrUnknown, false),
            // A field of X lives inside X's storage: same aliasing.
            ExprKind::ReadField { base, .. } => self.resolve_expr(*base),
            ExprKind::ReadLocal(l) => self.resolve_local(*l),
            ExprKind::Call {
                callee,
                receiver,
                args,
            } => {
                let callee_sig = match callee {
                    Callee::Static(target) => self.view.get(*target),
                    Callee::Unknown(_) => None,
                };

                let Some(callee_sig) = callee_sig else {
                    return (ReturnAliasing::ReceiverOrUnknown, false);
                };

                if callee_sig.return_is_fresh {
                    return (ReturnAliasing::None, true);
                }
                match callee_sig.return_aliases {
                    ReturnAliasing::None => (ReturnAliasing::None, false),
                    // The callee hands back its argument k: what *we*
                    // return is whatever fed that argument.
                    ReturnAliasing::Parameter(k) => match args.get(k as usize) {
                        Some(&arg) => self.resolve_expr(arg),
                        None => (ReturnAliasing::ReceiverOrUnknown, false),
                    },
                    ReturnAliasing::ReceiverOrUnknown => match receiver {
                        Some(recv) => self.resolve_expr(*recv),
                        None => (ReturnAliasing::ReceiverOrUnknown, false),
                    },
                }
            }
        }
    }

    fn resolve_local(&mut self, local: LocalId) -> (ReturnAliasing, bool) {
        if let Some(&memo) = self.local_memo.get(&local) {
            return memo;
        }
        if !self.visiting.insert(local) {
            return (ReturnAliasing::ReceiverOrUnknown, false);
        }

        let assigns = self.local_assigns.get(&local).cloned().unwrap_or_default();
        let mut aliases = ReturnAliasing::None;
        let mut fresh = !assigns.is_empty();
        for value in assigns {
            let (a, f) = self.resolve_expr(value);
            aliases = aliases.join(a);
            fresh &= f;
        }

        // Freshness survives the local only when nothing but returns
        // ever read it — otherwise the value may have escaped.
        if fresh {
            let reads = self.local_reads.get(&local).copied().unwrap_or(0);
            let ret_reads = self.return_reads.get(&local).copied().unwrap_or(0);
            fresh = reads == ret_reads;
        }

        self.visiting.remove(&local);
        let result = (aliases, fresh);
        self.local_memo.insert(local, result);
        result
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
