//! Copy-elision analysis for the Ovid compiler.
//!
//! Ovid's target execution environment shares every composite value by
//! identity; the source language copies value-typed records on
//! assignment, argument pass, and return. This crate decides, for every
//! IR edge that carries a value-typed quantity, whether a defensive
//! copy must be materialized there to restore by-value semantics —
//! without copying unconditionally, which would both break
//! identity-dependent idioms (external iteration) and deep-copy on hot
//! paths for nothing.
//!
//! The crate provides:
//!
//! - **Type classification** ([`ValueClass`]) — every type is classified
//!   as [`Reference`](ValueClass::Reference) (never copied),
//!   [`ValuePrimitive`](ValueClass::ValuePrimitive) (copied bitwise by
//!   the target anyway), or [`ValueComposite`](ValueClass::ValueComposite)
//!   (the records the analysis exists for).
//! - **Mutation summaries** ([`MutationSignature`]) — per method and per
//!   formal (including the implicit receiver), whether the body writes
//!   through it, directly or transitively; solved over the call graph's
//!   strongly-connected components by bounded fixpoint.
//! - **Alias origins** ([`AliasOrigin`]) — where each value-producing
//!   expression's value comes from: named storage other code can
//!   observe again, or a value provably fresh.
//! - **Copy decisions** ([`CopyDecision`]) — per argument, receiver,
//!   store, and return-flow edge, with the triggering fact retained.
//! - **Iteration-identity exception** — a recognizer for the
//!   acquire-then-repeatedly-advance cursor idiom, whose identity must
//!   survive uncopied across the whole loop.
//! - **Temporary materialization** — cancellation of provably redundant
//!   copies and slot assignment for read-only value temporaries.
//!
//! Everything undecidable resolves to the conservative side: `Unknown`
//! mutation facts force copies, unresolved callees get fully
//! conservative signatures. The analysis never fails; malformed input
//! IR is reported as [`AnalysisProblem`]s next to best-effort results.

mod classify;
mod copy_analysis;
mod graph;
mod iteration;
mod mutation;
mod origin;
mod pipeline;
mod temporaries;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

pub use classify::{ClassifyProblem, TypeClassifier};
pub use copy_analysis::{
    analyze_method_copies, CopyDecision, CopyReason, DecisionTable, UseEdge, Verdict,
};
pub use graph::Condensation;
pub use iteration::{recognize_cursors, CursorUse};
pub use mutation::{
    build_signatures, MutatesThrough, MutationSignature, ReturnAliasing, SignatureTable,
};
pub use origin::{classify_origins, AliasOrigin, OriginMap, StorageId};
pub use pipeline::{analyze_unit, AnalysisOptions, AnalysisProblem, CopyAnalysis, MethodAnalysis};
pub use temporaries::{optimize_temporaries, MaterializationPlan};

use ovid_ir::TypeId;

/// Value-semantics classification for a type.
///
/// Determines whether values of this type need copy tracking at all.
/// This classification is the foundation for every pass in the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// Shared by identity in source and target alike. Assignment and
    /// argument passing never copy.
    Reference,

    /// A value primitive (`int`, `float`, `bool`, ...). The target
    /// already copies these bitwise; no defensive copies apply.
    ValuePrimitive,

    /// A mutable value-typed record, possibly with nested value-typed
    /// fields. Every edge carrying one of these is a copy candidate.
    ValueComposite,
}

/// Classification query for the analysis passes.
///
/// Provides the core `value_class` query plus convenience predicates.
/// Implemented by [`TypeClassifier`], which wraps a `TypePool` reference
/// with caching and cycle detection.
pub trait ValueClassification {
    /// Classify a type by its pool id.
    fn value_class(&self, ty: TypeId) -> ValueClass;

    /// Returns `true` if edges carrying this type are copy candidates.
    fn needs_copy_tracking(&self, ty: TypeId) -> bool {
        self.value_class(ty) == ValueClass::ValueComposite
    }
}
