//! Shared type pool.
//!
//! The front-end builds one [`TypePool`] per compilation unit before
//! analysis starts; the pool is immutable afterwards. Types are
//! identified by [`TypeId`] — a plain index into the pool — and a
//! handful of primitives are pre-interned at fixed indices so they can
//! be referenced without a pool lookup.
//!
//! The pool distinguishes exactly the facts the copy analysis consumes:
//! reference types (shared by identity in both source and target),
//! value primitives (copied bitwise, no analysis needed), and records —
//! the mutable value-typed composites whose by-value semantics the
//! analysis must restore. Record fields are ordered `(Name, TypeId)`
//! pairs and may themselves be records; value-typed cycles are a
//! front-end contract violation (records cannot contain themselves).

use crate::name::Name;

/// Index of a type in the [`TypePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Pre-interned `int`.
    pub const INT: TypeId = TypeId(0);
    /// Pre-interned `float`.
    pub const FLOAT: TypeId = TypeId(1);
    /// Pre-interned `bool`.
    pub const BOOL: TypeId = TypeId(2);
    /// Pre-interned `char`.
    pub const CHAR: TypeId = TypeId(3);
    /// Pre-interned `unit` (the no-value return type).
    pub const UNIT: TypeId = TypeId(4);
    /// Pre-interned `string` (immutable, reference-semantic in source
    /// and target alike — never a copy-analysis concern).
    pub const STRING: TypeId = TypeId(5);
    /// Pre-interned top reference type.
    pub const OBJECT: TypeId = TypeId(6);

    /// Number of pre-interned types.
    pub(crate) const PREINTERNED: usize = 7;

    /// Create from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pre-interned primitive value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimType {
    Int,
    Float,
    Bool,
    Char,
    Unit,
}

/// The shape of a type in the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeData {
    /// A value primitive: copied bitwise on assignment in source and
    /// target alike.
    Primitive(PrimType),

    /// A reference type: instances shared by identity. Mutation through
    /// one alias is visible through all — in both source and target, so
    /// no defensive copies apply.
    Reference(Name),

    /// A record: a mutable value-typed composite. Copied on assignment,
    /// argument pass, and return in the source language. Fields are
    /// ordered and may themselves be value-typed.
    Record {
        name: Name,
        fields: Vec<(Name, TypeId)>,
    },
}

/// The shared, immutable type graph for one compilation unit.
pub struct TypePool {
    types: Vec<TypeData>,
}

impl TypePool {
    /// Create a pool with the primitives, `string`, and `object`
    /// pre-interned at their fixed [`TypeId`] indices.
    pub fn new() -> Self {
        let types = vec![
            TypeData::Primitive(PrimType::Int),
            TypeData::Primitive(PrimType::Float),
            TypeData::Primitive(PrimType::Bool),
            TypeData::Primitive(PrimType::Char),
            TypeData::Primitive(PrimType::Unit),
            TypeData::Reference(Name::EMPTY),
            TypeData::Reference(Name::EMPTY),
        ];
        debug_assert_eq!(types.len(), TypeId::PREINTERNED);
        Self { types }
    }

    /// Intern a record type with the given ordered fields.
    pub fn record(&mut self, name: Name, fields: &[(Name, TypeId)]) -> TypeId {
        self.push(TypeData::Record {
            name,
            fields: fields.to_vec(),
        })
    }

    /// Intern a named reference type.
    pub fn reference(&mut self, name: Name) -> TypeId {
        self.push(TypeData::Reference(name))
    }

    fn push(&mut self, data: TypeData) -> TypeId {
        let id = TypeId::new(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(data);
        id
    }

    /// Look up a type's shape. Out-of-range ids resolve to `object`
    /// (the most conservative reference type) rather than panicking.
    pub fn data(&self, id: TypeId) -> &TypeData {
        self.types
            .get(id.index())
            .unwrap_or(&self.types[TypeId::OBJECT.index()])
    }

    /// The ordered fields of a record type, or `None` for non-records.
    pub fn record_fields(&self, id: TypeId) -> Option<&[(Name, TypeId)]> {
        match self.data(id) {
            TypeData::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// The type of field `index` of record `id`, if both exist.
    pub fn field_type(&self, id: TypeId, index: u32) -> Option<TypeId> {
        self.record_fields(id)
            .and_then(|fields| fields.get(index as usize))
            .map(|&(_, ty)| ty)
    }

    /// Number of types in the pool.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always `false`: the primitives are pre-interned.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn preinterned_primitives_have_fixed_ids() {
        let pool = TypePool::new();
        assert_eq!(pool.data(TypeId::INT), &TypeData::Primitive(PrimType::Int));
        assert_eq!(
            pool.data(TypeId::UNIT),
            &TypeData::Primitive(PrimType::Unit)
        );
        assert!(matches!(
            pool.data(TypeId::STRING),
            TypeData::Reference(_)
        ));
        assert_eq!(pool.len(), TypeId::PREINTERNED);
    }

    #[test]
    fn record_fields_round_trip() {
        let mut pool = TypePool::new();
        let a = Name::from_raw(1);
        let b = Name::from_raw(2);
        let rec = pool.record(Name::from_raw(3), &[(a, TypeId::INT), (b, TypeId::FLOAT)]);

        let fields = pool.record_fields(rec).unwrap();
        assert_eq!(fields, &[(a, TypeId::INT), (b, TypeId::FLOAT)]);
        assert_eq!(pool.field_type(rec, 0), Some(TypeId::INT));
        assert_eq!(pool.field_type(rec, 1), Some(TypeId::FLOAT));
        assert_eq!(pool.field_type(rec, 2), None);
    }

    #[test]
    fn non_record_has_no_fields() {
        let pool = TypePool::new();
        assert_eq!(pool.record_fields(TypeId::INT), None);
        assert_eq!(pool.field_type(TypeId::STRING, 0), None);
    }

    #[test]
    fn out_of_range_id_is_object() {
        let pool = TypePool::new();
        assert!(matches!(
            pool.data(TypeId::new(9999)),
            TypeData::Reference(_)
        ));
    }

    #[test]
    fn nested_records_intern_independently() {
        let mut pool = TypePool::new();
        let inner = pool.record(Name::from_raw(1), &[(Name::from_raw(2), TypeId::INT)]);
        let outer = pool.record(Name::from_raw(3), &[(Name::from_raw(4), inner)]);
        assert_ne!(inner, outer);
        assert_eq!(pool.field_type(outer, 0), Some(inner));
    }
}
