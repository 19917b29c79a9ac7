//! Typed expression IR.
//!
//! Method bodies are arena-allocated trees: expressions live in a
//! per-body `Vec<Expr>` addressed by [`ExprId`], statements in a
//! `Vec<Stmt>` addressed by [`StmtId`]. Ids are plain indices, so the
//! analysis passes can attach per-node facts in flat side tables.
//!
//! # Arena Order
//!
//! The expression arena is topologically ordered: every expression's
//! operands have smaller ids than the expression itself. [`BodyBuilder`]
//! (the only way to assemble a body) enforces this, and the analysis
//! passes rely on it for single forward/bottom-up sweeps.
//!
//! [`BodyBuilder`]: crate::BodyBuilder

use crate::name::Name;
use crate::pool::TypeId;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Identity of a method within a [`Module`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MethodId(u32);

impl MethodId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a local variable within one method body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LocalId(u32);

impl LocalId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an expression in a body's expression arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a statement in a body's statement arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StmtId(u32);

impl StmtId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Literals and primitive operations ───────────────────────────────

/// A literal constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// Bit pattern of an `f64` (keeps `Eq`/`Hash` derivable).
    Float(u64),
    Bool(bool),
    Str(Name),
    Unit,
}

/// A primitive scalar operation. Operator methods over records are
/// ordinary [`ExprKind::Call`]s to static methods; `PrimOp` covers only
/// the built-in scalar operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

// ── Callees ─────────────────────────────────────────────────────────

/// The target of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Statically resolved to a method in this compilation unit.
    Static(MethodId),

    /// Virtual dispatch or externally defined — the overrider set is
    /// not statically known. The name is retained for diagnostics only;
    /// the analysis treats the target fully conservatively.
    Unknown(Name),
}

// ── Places ──────────────────────────────────────────────────────────

/// An assignable storage location (the left-hand side of a store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Place {
    /// A local variable slot.
    Local(LocalId),
    /// A formal parameter slot.
    Param(u32),
    /// The implicit receiver.
    Receiver,
    /// A field of the value produced by `base`: `base.field = ...`.
    Field { base: ExprId, field: u32 },
}

// ── Expressions ─────────────────────────────────────────────────────

/// An expression node: a kind plus its static type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
}

/// The shape of an expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Read a local variable.
    ReadLocal(LocalId),
    /// Read a formal parameter.
    ReadParam(u32),
    /// Read the implicit receiver.
    ReadReceiver,
    /// Read a field out of `base`.
    ReadField { base: ExprId, field: u32 },
    /// A literal constant.
    Literal(Literal),
    /// Construct a record value from ordered field values. The node's
    /// `ty` is the record type being constructed.
    Construct { args: Vec<ExprId> },
    /// Call a method. `receiver` is `None` for static methods.
    Call {
        callee: Callee,
        receiver: Option<ExprId>,
        args: Vec<ExprId>,
    },
    /// A built-in scalar operation.
    Prim {
        op: PrimOp,
        lhs: ExprId,
        rhs: ExprId,
    },
}

// ── Statements ──────────────────────────────────────────────────────

/// A statement. Control-flow bodies reference child statements by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// Store `value` into `target`.
    Assign { target: Place, value: ExprId },
    /// Evaluate an expression for its effects, discarding the result.
    Expr(ExprId),
    /// Return from the method, with an optional value.
    Return(Option<ExprId>),
    /// `while cond { body }`.
    While { cond: ExprId, body: Vec<StmtId> },
    /// `if cond { then_body } else { else_body }`.
    If {
        cond: ExprId,
        then_body: Vec<StmtId>,
        else_body: Vec<StmtId>,
    },
}

// ── Methods ─────────────────────────────────────────────────────────

/// A local variable declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: Name,
    pub ty: TypeId,
}

/// A formal parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: Name,
    pub ty: TypeId,
}

/// Front-end classification of a method's role in the external
/// iteration protocol.
///
/// The source language's sequence protocol is structural: a sequence
/// exposes a cursor-acquiring method, and the cursor exposes an advance
/// and a current-element accessor. The front-end resolves protocol
/// membership and marks the methods here; the analysis only pattern-
/// matches on the roles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MethodRole {
    /// An ordinary method.
    #[default]
    Normal,
    /// Acquires an iteration cursor over a sequence.
    CursorAcquire,
    /// Advances a cursor to its next element.
    CursorAdvance,
    /// Reads the cursor's current element.
    CursorCurrent,
}

/// A method: signature plus (for methods defined in this unit) a body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub name: Name,
    /// `Some(type)` for instance methods, `None` for static methods.
    pub receiver: Option<TypeId>,
    pub params: Vec<Param>,
    pub return_ty: TypeId,
    pub role: MethodRole,
    /// `None` for externally defined methods — the analysis defaults
    /// their mutation facts conservatively.
    pub body: Option<MethodBody>,
}

/// A method body: local declarations plus the statement and expression
/// arenas. See the module docs for the arena-order invariant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodBody {
    pub locals: Vec<LocalDecl>,
    pub exprs: Vec<Expr>,
    pub stmts: Vec<Stmt>,
    /// Top-level statements in execution order.
    pub root: Vec<StmtId>,
}

impl MethodBody {
    /// Look up an expression node.
    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Look up a statement node.
    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    /// The declared type of a local.
    #[inline]
    pub fn local_ty(&self, id: LocalId) -> TypeId {
        self.locals[id.index()].ty
    }
}

// ── Module ──────────────────────────────────────────────────────────

/// One compilation unit's worth of methods. A method's [`MethodId`] is
/// its index in `methods`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    pub methods: Vec<Method>,
}

impl Module {
    /// Look up a method by id, or `None` if the id is out of range
    /// (a front-end contract violation the caller reports).
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.methods.get(id.index())
    }

    /// Append a method, returning its id.
    pub fn push_method(&mut self, method: Method) -> MethodId {
        let id = MethodId::new(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        self.methods.push(method);
        id
    }

    /// Iterate methods with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId::new(u32::try_from(i).unwrap_or(u32::MAX)), m))
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if the module has no methods.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
