//! Value-semantics type classifier.
//!
//! Walks the type pool to classify each type as `Reference`,
//! `ValuePrimitive`, or `ValueComposite`. Uses memoization and cycle
//! detection so nested records classify in amortized O(1).
//!
//! A record that reaches itself through value-typed fields is malformed
//! input (a value type cannot contain itself, directly or through a
//! value-typed cycle): the classifier records a [`ClassifyProblem`] and
//! classifies the type as `ValueComposite` so downstream passes stay on
//! the conservative, copy-inserting side while the driver reports the
//! contract violation.

use std::cell::RefCell;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use ovid_ir::{TypeData, TypeId, TypePool};

use crate::{ValueClass, ValueClassification};

/// A front-end contract violation found during classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifyProblem {
    /// A record participates in a value-typed field cycle.
    CyclicValueType { ty: TypeId },
}

impl fmt::Display for ClassifyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyProblem::CyclicValueType { ty } => write!(
                f,
                "value type #{} contains itself through a value-typed field cycle",
                ty.raw()
            ),
        }
    }
}

impl std::error::Error for ClassifyProblem {}

/// Type classifier for the copy analysis.
///
/// Wraps a `TypePool` reference with classification caching and cycle
/// detection.
///
/// # Interior Mutability
///
/// Uses `RefCell` for the cache, the cycle-detection set, and the
/// problem list because the [`ValueClassification`] trait takes `&self`
/// — classification is a read-only query from every caller's point of
/// view.
pub struct TypeClassifier<'pool> {
    pool: &'pool TypePool,
    cache: RefCell<FxHashMap<TypeId, ValueClass>>,
    /// Ids currently being classified. Re-entering one means the type
    /// graph has a value-typed cycle.
    classifying: RefCell<FxHashSet<TypeId>>,
    problems: RefCell<Vec<ClassifyProblem>>,
}

impl<'pool> TypeClassifier<'pool> {
    /// Create a new classifier for the given type pool.
    pub fn new(pool: &'pool TypePool) -> Self {
        Self {
            pool,
            cache: RefCell::new(FxHashMap::default()),
            classifying: RefCell::new(FxHashSet::default()),
            problems: RefCell::new(Vec::new()),
        }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &'pool TypePool {
        self.pool
    }

    /// Drain the contract violations recorded so far.
    pub fn take_problems(&self) -> Vec<ClassifyProblem> {
        std::mem::take(&mut self.problems.borrow_mut())
    }

    /// Core classification with caching and cycle detection.
    fn classify(&self, ty: TypeId) -> ValueClass {
        if let Some(&cached) = self.cache.borrow().get(&ty) {
            return cached;
        }

        if !self.classifying.borrow_mut().insert(ty) {
            // Value-typed cycle: malformed input. Stay conservative.
            self.problems
                .borrow_mut()
                .push(ClassifyProblem::CyclicValueType { ty });
            return ValueClass::ValueComposite;
        }

        let result = match self.pool.data(ty) {
            TypeData::Primitive(_) => ValueClass::ValuePrimitive,
            TypeData::Reference(_) => ValueClass::Reference,
            TypeData::Record { fields, .. } => {
                // Classify fields for their own cache entries and to
                // surface nested cycles; the record itself is composite
                // regardless of field shapes.
                for &(_, field_ty) in fields {
                    let _ = self.classify(field_ty);
                }
                ValueClass::ValueComposite
            }
        };

        self.classifying.borrow_mut().remove(&ty);
        self.cache.borrow_mut().insert(ty, result);
        result
    }
}

impl ValueClassification for TypeClassifier<'_> {
    fn value_class(&self, ty: TypeId) -> ValueClass {
        self.classify(ty)
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use ovid_ir::Name;

    use super::*;

    #[test]
    fn primitives_are_value_primitive() {
        let pool = TypePool::new();
        let cls = TypeClassifier::new(&pool);

        for ty in [
            TypeId::INT,
            TypeId::FLOAT,
            TypeId::BOOL,
            TypeId::CHAR,
            TypeId::UNIT,
        ] {
            assert_eq!(cls.value_class(ty), ValueClass::ValuePrimitive);
            assert!(!cls.needs_copy_tracking(ty));
        }
    }

    #[test]
    fn string_and_object_are_reference() {
        let pool = TypePool::new();
        let cls = TypeClassifier::new(&pool);

        assert_eq!(cls.value_class(TypeId::STRING), ValueClass::Reference);
        assert_eq!(cls.value_class(TypeId::OBJECT), ValueClass::Reference);
        assert!(!cls.needs_copy_tracking(TypeId::STRING));
    }

    #[test]
    fn records_are_value_composite() {
        let mut pool = TypePool::new();
        let rec = pool.record(Name::from_raw(1), &[(Name::from_raw(2), TypeId::INT)]);
        let cls = TypeClassifier::new(&pool);

        assert_eq!(cls.value_class(rec), ValueClass::ValueComposite);
        assert!(cls.needs_copy_tracking(rec));
        assert!(cls.take_problems().is_empty());
    }

    #[test]
    fn nested_records_classify_cleanly() {
        let mut pool = TypePool::new();
        let inner = pool.record(Name::from_raw(1), &[(Name::from_raw(2), TypeId::INT)]);
        let outer = pool.record(
            Name::from_raw(3),
            &[(Name::from_raw(4), inner), (Name::from_raw(5), TypeId::STRING)],
        );
        let cls = TypeClassifier::new(&pool);

        assert_eq!(cls.value_class(outer), ValueClass::ValueComposite);
        assert_eq!(cls.value_class(inner), ValueClass::ValueComposite);
        assert!(cls.take_problems().is_empty());
    }

    #[test]
    fn classification_is_cached() {
        let mut pool = TypePool::new();
        let rec = pool.record(Name::from_raw(1), &[(Name::from_raw(2), TypeId::INT)]);
        let cls = TypeClassifier::new(&pool);

        assert_eq!(cls.value_class(rec), ValueClass::ValueComposite);
        assert_eq!(cls.value_class(rec), ValueClass::ValueComposite);
        assert!(cls.cache.borrow().contains_key(&rec));
    }

    #[test]
    fn value_cycle_is_reported_and_conservative() {
        // Build a record whose field points at itself. The pool cannot
        // express this through the normal API (a field id must exist
        // before the record), so point the field at the id the record
        // is about to receive.
        let mut pool = TypePool::new();
        let self_id = TypeId::new(u32::try_from(pool.len()).unwrap());
        let rec = pool.record(Name::from_raw(1), &[(Name::from_raw(2), self_id)]);
        assert_eq!(rec, self_id);

        let cls = TypeClassifier::new(&pool);
        assert_eq!(cls.value_class(rec), ValueClass::ValueComposite);

        let problems = cls.take_problems();
        assert_eq!(problems, vec![ClassifyProblem::CyclicValueType { ty: rec }]);
    }
}
