//! Per-unit analysis driver.
//!
//! [`analyze_unit`] runs the whole pass sequence over one compilation
//! unit and returns every artifact the code-emission backend consumes:
//! the signature table, per-method origins, copy decisions, and
//! materialization plans, plus any front-end contract violations found
//! along the way.
//!
//! Order matters only between signature solving and the per-method
//! passes. Signatures are solved over the call-graph condensation in
//! topological waves: every component of a wave sees only already
//! solved callees, so the components of one wave run in parallel and
//! their results are published into the table between waves, each slot
//! written exactly once. Method bodies are then independent of each
//! other and run in parallel too.
//!
//! The driver never fails. Cyclic value types and dangling call
//! targets are collected as [`AnalysisProblem`]s next to best-effort
//! results; the surrounding compiler decides whether to abort on them.

use std::error::Error;
use std::fmt;

use rayon::prelude::*;

use ovid_ir::{Callee, ExprKind, MethodId, Module, TypeId, TypePool};

use crate::classify::{ClassifyProblem, TypeClassifier};
use crate::copy_analysis::{analyze_method_copies, DecisionTable};
use crate::graph::Condensation;
use crate::iteration::{recognize_cursors, CursorUse};
use crate::mutation::{solve_component, SignatureTable};
use crate::origin::{classify_origins, OriginMap};
use crate::temporaries::{optimize_temporaries, MaterializationPlan};
use crate::{ValueClass, ValueClassification};

/// Knobs for one analysis run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Sweep cap for the per-component mutation fixpoint. On overflow
    /// the component degrades to `Unknown` facts.
    pub fixpoint_cap: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { fixpoint_cap: 64 }
    }
}

/// A front-end contract violation found during analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisProblem {
    /// A record reaches itself through value-typed fields.
    CyclicValueType { ty: TypeId },
    /// A call names a method id the module does not contain.
    DanglingCallee { caller: MethodId, callee: MethodId },
}

impl fmt::Display for AnalysisProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisProblem::CyclicValueType { ty } => write!(
                f,
                "value type {} contains itself through value-typed fields",
                ty.raw()
            ),
            AnalysisProblem::DanglingCallee { caller, callee } => write!(
                f,
                "method {} calls method {}, which the module does not contain",
                caller.raw(),
                callee.raw()
            ),
        }
    }
}

impl Error for AnalysisProblem {}

/// Everything the analysis produced for one method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodAnalysis {
    /// Per-expression alias origins, cursor overrides applied.
    pub origins: OriginMap,
    /// Per-edge copy decisions, optimizer refinements applied.
    pub decisions: DecisionTable,
    /// Elided copies and temp slots.
    pub plan: MaterializationPlan,
    /// Cursors the iteration recognizer matched.
    pub cursors: Vec<CursorUse>,
}

/// The full result for one compilation unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyAnalysis {
    signatures: SignatureTable,
    methods: Vec<Option<MethodAnalysis>>,
    problems: Vec<AnalysisProblem>,
}

impl CopyAnalysis {
    /// The solved signature table.
    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// The artifacts for `method`, if it has a body.
    pub fn method(&self, method: MethodId) -> Option<&MethodAnalysis> {
        self.methods.get(method.index()).and_then(Option::as_ref)
    }

    /// Contract violations found during the run.
    pub fn problems(&self) -> &[AnalysisProblem] {
        &self.problems
    }

    /// Returns `true` when the input upheld the front-end contract.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Run the full analysis over one compilation unit.
///
/// Deterministic: the same module and pool produce an identical
/// [`CopyAnalysis`] on every run.
pub fn analyze_unit(module: &Module, pool: &TypePool, options: &AnalysisOptions) -> CopyAnalysis {
    let mut problems = Vec::new();

    let classes = freeze_classification(pool, &mut problems);
    validate_callees(module, &mut problems);

    let graph = ovid_ir::CallGraph::build(module);
    let cond = Condensation::compute(&graph);
    tracing::debug!(
        methods = module.len(),
        components = cond.len(),
        waves = cond.waves().len(),
        "solving mutation signatures"
    );

    let mut signatures = SignatureTable::with_len(module.len());
    for wave in cond.waves() {
        let solved: Vec<_> = wave
            .par_iter()
            .map(|&comp| solve_component(module, cond.component(comp), &signatures, options.fixpoint_cap))
            .collect();
        for (method, sig) in solved.into_iter().flatten() {
            signatures.insert(method, sig);
        }
    }

    let methods: Vec<Option<MethodAnalysis>> = (0..module.len())
        .into_par_iter()
        .map(|idx| {
            let id = MethodId::new(u32::try_from(idx).unwrap_or(u32::MAX));
            let body = module.method(id).and_then(|m| m.body.as_ref())?;

            let mut origins = classify_origins(body, &signatures);
            let cursors = recognize_cursors(module, body);
            for cursor in &cursors {
                cursor.apply(&mut origins);
            }
            let mut decisions = analyze_method_copies(body, &classes, &signatures, &origins);
            let plan = optimize_temporaries(body, &classes, &signatures, &mut decisions);

            Some(MethodAnalysis {
                origins,
                decisions,
                plan,
                cursors,
            })
        })
        .collect();

    CopyAnalysis {
        signatures,
        methods,
        problems,
    }
}

/// Classification snapshot shared across the parallel method passes.
struct FrozenClasses {
    classes: Vec<ValueClass>,
}

impl ValueClassification for FrozenClasses {
    fn value_class(&self, ty: TypeId) -> ValueClass {
        self.classes
            .get(ty.index())
            .copied()
            .unwrap_or(ValueClass::Reference)
    }
}

/// Classify the whole pool up front, surfacing cyclic value types.
fn freeze_classification(pool: &TypePool, problems: &mut Vec<AnalysisProblem>) -> FrozenClasses {
    let classifier = TypeClassifier::new(pool);
    let classes = (0..pool.len())
        .map(|i| classifier.value_class(TypeId::new(u32::try_from(i).unwrap_or(u32::MAX))))
        .collect();
    for problem in classifier.take_problems() {
        let ClassifyProblem::CyclicValueType { ty } = problem;
        problems.push(AnalysisProblem::CyclicValueType { ty });
    }
    FrozenClasses { classes }
}

/// Report statically-resolved callees that point outside the module.
fn validate_callees(module: &Module, problems: &mut Vec<AnalysisProblem>) {
    for (caller, method) in module.iter() {
        let Some(body) = &method.body else { continue };
        for expr in &body.exprs {
            let ExprKind::Call {
                callee: Callee::Static(callee),
                ..
            } = &expr.kind
            else {
                continue;
            };
            if module.method(*callee).is_none() {
                problems.push(AnalysisProblem::DanglingCallee {
                    caller,
                    callee: *callee,
                });
            }
        }
    }
}
