//! Body construction API.
//!
//! [`BodyBuilder`] is how the front-end (and the analysis test suites)
//! assemble method bodies. It owns the in-progress arenas, hands out
//! ids as nodes are emitted, and thereby guarantees the arena-order
//! invariant: an expression can only reference operands that were
//! emitted before it.
//!
//! Statements append to the innermost open scope; [`while_loop`] and
//! [`branch`] open a nested scope for the duration of a closure.
//!
//! [`while_loop`]: BodyBuilder::while_loop
//! [`branch`]: BodyBuilder::branch

use crate::ir::{
    Callee, Expr, ExprId, ExprKind, Literal, LocalDecl, LocalId, MethodBody, Place, PrimOp, Stmt,
    StmtId,
};
use crate::name::Name;
use crate::pool::TypeId;

/// Builder for a single [`MethodBody`].
#[derive(Default)]
pub struct BodyBuilder {
    locals: Vec<LocalDecl>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    /// Stack of open statement scopes; index 0 is the root scope.
    scopes: Vec<Vec<StmtId>>,
}

impl BodyBuilder {
    /// Create a builder with an empty root scope.
    pub fn new() -> Self {
        Self {
            locals: Vec::new(),
            exprs: Vec::new(),
            stmts: Vec::new(),
            scopes: vec![Vec::new()],
        }
    }

    /// Declare a local variable.
    pub fn local(&mut self, name: Name, ty: TypeId) -> LocalId {
        let id = LocalId::new(u32::try_from(self.locals.len()).unwrap_or(u32::MAX));
        self.locals.push(LocalDecl { name, ty });
        id
    }

    // ── Expressions ─────────────────────────────────────────────

    fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let id = ExprId::new(u32::try_from(self.exprs.len()).unwrap_or(u32::MAX));
        self.exprs.push(Expr { kind, ty });
        id
    }

    /// Read a local variable.
    pub fn read_local(&mut self, local: LocalId) -> ExprId {
        let ty = self.locals[local.index()].ty;
        self.expr(ExprKind::ReadLocal(local), ty)
    }

    /// Read a formal parameter.
    pub fn read_param(&mut self, index: u32, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ReadParam(index), ty)
    }

    /// Read the implicit receiver.
    pub fn read_receiver(&mut self, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ReadReceiver, ty)
    }

    /// Read a field out of `base`.
    pub fn read_field(&mut self, base: ExprId, field: u32, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ReadField { base, field }, ty)
    }

    /// Emit a literal.
    pub fn literal(&mut self, lit: Literal, ty: TypeId) -> ExprId {
        self.expr(ExprKind::Literal(lit), ty)
    }

    /// Shorthand for an `int` literal.
    pub fn lit_int(&mut self, value: i64) -> ExprId {
        self.literal(Literal::Int(value), TypeId::INT)
    }

    /// Shorthand for a `bool` literal.
    pub fn lit_bool(&mut self, value: bool) -> ExprId {
        self.literal(Literal::Bool(value), TypeId::BOOL)
    }

    /// Construct a record value.
    pub fn construct(&mut self, args: Vec<ExprId>, ty: TypeId) -> ExprId {
        self.expr(ExprKind::Construct { args }, ty)
    }

    /// Emit a call.
    pub fn call(
        &mut self,
        callee: Callee,
        receiver: Option<ExprId>,
        args: Vec<ExprId>,
        ty: TypeId,
    ) -> ExprId {
        self.expr(ExprKind::Call {
            callee,
            receiver,
            args,
        }, ty)
    }

    /// Emit a built-in scalar operation.
    pub fn prim(&mut self, op: PrimOp, lhs: ExprId, rhs: ExprId, ty: TypeId) -> ExprId {
        self.expr(ExprKind::Prim { op, lhs, rhs }, ty)
    }

    // ── Statements ──────────────────────────────────────────────

    fn stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId::new(u32::try_from(self.stmts.len()).unwrap_or(u32::MAX));
        self.stmts.push(stmt);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(id);
        }
        id
    }

    /// Store `value` into `target`.
    pub fn assign(&mut self, target: Place, value: ExprId) -> StmtId {
        self.stmt(Stmt::Assign { target, value })
    }

    /// Evaluate an expression for its effects.
    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(Stmt::Expr(expr))
    }

    /// Return from the method.
    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(Stmt::Return(value))
    }

    /// Emit `while cond { ... }`; `body` emits the loop body into a
    /// nested scope.
    pub fn while_loop(&mut self, cond: ExprId, body: impl FnOnce(&mut Self)) -> StmtId {
        self.scopes.push(Vec::new());
        body(self);
        let body_ids = self.scopes.pop().unwrap_or_default();
        self.stmt(Stmt::While {
            cond,
            body: body_ids,
        })
    }

    /// Emit `if cond { ... } else { ... }`; each closure emits its arm
    /// into a nested scope.
    pub fn branch(
        &mut self,
        cond: ExprId,
        then_body: impl FnOnce(&mut Self),
        else_body: impl FnOnce(&mut Self),
    ) -> StmtId {
        self.scopes.push(Vec::new());
        then_body(self);
        let then_ids = self.scopes.pop().unwrap_or_default();

        self.scopes.push(Vec::new());
        else_body(self);
        let else_ids = self.scopes.pop().unwrap_or_default();

        self.stmt(Stmt::If {
            cond,
            then_body: then_ids,
            else_body: else_ids,
        })
    }

    /// Finish the body. Statements emitted into the root scope become
    /// the body's top-level statement list.
    pub fn finish(mut self) -> MethodBody {
        let root = self.scopes.drain(..).next().unwrap_or_default();
        MethodBody {
            locals: self.locals,
            exprs: self.exprs,
            stmts: self.stmts,
            root,
        }
    }
}
