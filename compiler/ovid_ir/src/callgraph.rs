//! Call graph with statically resolved direct-callee edges.
//!
//! The front-end normally hands the analysis a prebuilt graph alongside
//! the module; [`CallGraph::build`] derives one by scanning bodies, for
//! front-ends (and tests) that don't track edges separately. Unknown
//! callees ([`Callee::Unknown`]) contribute no edges — conservative
//! defaulting for them happens in the analysis, not here.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::ir::{Callee, ExprKind, MethodId, Module};

/// Per-method direct-callee lists, deduplicated, indexed by
/// [`MethodId`].
pub struct CallGraph {
    callees: Vec<SmallVec<[MethodId; 4]>>,
}

impl CallGraph {
    /// Build the graph by scanning every body's call expressions.
    pub fn build(module: &Module) -> Self {
        let mut callees = vec![SmallVec::new(); module.len()];

        for (id, method) in module.iter() {
            let Some(body) = &method.body else { continue };
            let mut seen = FxHashSet::default();
            for expr in &body.exprs {
                if let ExprKind::Call {
                    callee: Callee::Static(target),
                    ..
                } = &expr.kind
                {
                    if seen.insert(*target) {
                        callees[id.index()].push(*target);
                    }
                }
            }
        }

        Self { callees }
    }

    /// The direct callees of `method`. Out-of-range ids have no edges.
    pub fn callees(&self, method: MethodId) -> &[MethodId] {
        self.callees
            .get(method.index())
            .map_or(&[], SmallVec::as_slice)
    }

    /// Number of nodes (methods) in the graph.
    pub fn len(&self) -> usize {
        self.callees.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::builder::BodyBuilder;
    use crate::ir::{Method, MethodRole, Module};
    use crate::name::Name;
    use crate::pool::TypeId;

    use super::*;

    fn external(name: u32) -> Method {
        Method {
            name: Name::from_raw(name),
            receiver: None,
            params: Vec::new(),
            return_ty: TypeId::UNIT,
            role: MethodRole::Normal,
            body: None,
        }
    }

    #[test]
    fn edges_are_deduplicated() {
        let mut module = Module::default();
        let callee = module.push_method(external(1));

        let mut b = BodyBuilder::new();
        let c1 = b.call(Callee::Static(callee), None, vec![], TypeId::UNIT);
        b.expr_stmt(c1);
        let c2 = b.call(Callee::Static(callee), None, vec![], TypeId::UNIT);
        b.expr_stmt(c2);

        let caller = module.push_method(Method {
            name: Name::from_raw(2),
            receiver: None,
            params: Vec::new(),
            return_ty: TypeId::UNIT,
            role: MethodRole::Normal,
            body: Some(b.finish()),
        });

        let graph = CallGraph::build(&module);
        assert_eq!(graph.callees(caller), &[callee]);
        assert_eq!(graph.callees(callee), &[] as &[MethodId]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn unknown_callees_contribute_no_edges() {
        let mut module = Module::default();
        let mut b = BodyBuilder::new();
        let c = b.call(
            Callee::Unknown(Name::from_raw(9)),
            None,
            vec![],
            TypeId::UNIT,
        );
        b.expr_stmt(c);
        let caller = module.push_method(Method {
            name: Name::from_raw(1),
            receiver: None,
            params: Vec::new(),
            return_ty: TypeId::UNIT,
            role: MethodRole::Normal,
            body: Some(b.finish()),
        });

        let graph = CallGraph::build(&module);
        assert_eq!(graph.callees(caller), &[] as &[MethodId]);
    }
}
