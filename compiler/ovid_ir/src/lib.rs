//! Typed intermediate representation for the Ovid retargeting compiler.
//!
//! Ovid translates a language with mutable value-typed records into a
//! target whose composite values are exclusively reference-semantic.
//! This crate is the contract between the front-end (which builds the
//! IR) and the analysis passes in `ovid_copy` (which annotate it):
//!
//! - **Interned names** ([`Name`], [`NameInterner`]) — compact 32-bit
//!   identifiers for methods, types, fields, and locals.
//! - **Type pool** ([`TypePool`], [`TypeId`], [`TypeData`]) — the shared
//!   immutable type graph. Records are the value-composite types whose
//!   copy semantics the analysis must restore.
//! - **Expression IR** ([`Method`], [`MethodBody`], [`Expr`], [`Stmt`]) —
//!   arena-allocated expression and statement trees with explicit nodes
//!   for variable reads, field access, construction, calls, field
//!   stores, loops, and returns. Every expression carries a [`TypeId`].
//! - **Call graph** ([`CallGraph`]) — per-method direct-callee edges,
//!   resolved statically where possible.
//!
//! The IR is write-once: the front-end builds it (via [`BodyBuilder`]),
//! the analysis reads it. No pass mutates a body after construction.

mod builder;
mod callgraph;
mod ir;
mod name;
mod pool;

pub use builder::BodyBuilder;
pub use callgraph::CallGraph;
pub use ir::{
    Callee, Expr, ExprId, ExprKind, Literal, LocalDecl, LocalId, Method, MethodBody, MethodId,
    MethodRole, Module, Param, Place, PrimOp, Stmt, StmtId,
};
pub use name::{Name, NameInterner};
pub use pool::{PrimType, TypeData, TypeId, TypePool};
