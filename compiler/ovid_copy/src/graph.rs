//! Call-graph condensation shared by the interprocedural passes.
//!
//! Mutation facts propagate caller ← callee, and mutual recursion makes
//! that graph cyclic. The passes therefore work on the condensation:
//! strongly-connected components computed once (iterative Tarjan, no
//! recursion on untrusted input depth), plus the topological *waves*
//! the parallel driver schedules — a wave holds every component whose
//! callee components were all solved in earlier waves.
//!
//! This module lives apart from the passes so that none of them import
//! from each other; all depend on `graph`, none depend on a sibling.

use smallvec::SmallVec;

use ovid_ir::{CallGraph, MethodId};

const UNVISITED: u32 = u32::MAX;

/// The condensation of a call graph.
pub struct Condensation {
    /// Methods of each component. Components are emitted callees-first
    /// (reverse topological order of the condensation).
    components: Vec<SmallVec<[MethodId; 4]>>,
    /// Component index per method.
    component_of: Vec<u32>,
    /// Whether each component needs joint fixpoint solving: more than
    /// one method, or a single self-recursive method.
    cyclic: Vec<bool>,
    /// Topological waves of component indices. Every component in wave
    /// `k` only calls into components of waves `< k` (or itself).
    waves: Vec<Vec<u32>>,
}

impl Condensation {
    /// Compute SCCs and waves for `graph`.
    pub fn compute(graph: &CallGraph) -> Self {
        let n = graph.len();

        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0_u32; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0_u32;

        let mut components: Vec<SmallVec<[MethodId; 4]>> = Vec::new();
        let mut component_of = vec![0_u32; n];

        // Iterative Tarjan. Each work frame is (node, next-callee-pos);
        // a node is stamped the moment it is pushed, so it can never be
        // pushed twice.
        let mut work: Vec<(usize, usize)> = Vec::new();
        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            work.push((root, 0));

            while let Some(frame) = work.last_mut() {
                let v = frame.0;
                let callees = graph.callees(MethodId::new(u32::try_from(v).unwrap_or(u32::MAX)));

                if frame.1 < callees.len() {
                    let w = callees[frame.1].index();
                    frame.1 += 1;
                    if w >= n {
                        // Dangling edge: reported by validation, ignored here.
                        continue;
                    }
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        work.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                } else {
                    work.pop();
                    if let Some(parent) = work.last() {
                        lowlink[parent.0] = lowlink[parent.0].min(lowlink[v]);
                    }
                    if lowlink[v] == index[v] {
                        let comp_idx = u32::try_from(components.len()).unwrap_or(u32::MAX);
                        let mut comp: SmallVec<[MethodId; 4]> = SmallVec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            component_of[w] = comp_idx;
                            comp.push(MethodId::new(u32::try_from(w).unwrap_or(u32::MAX)));
                            if w == v {
                                break;
                            }
                        }
                        components.push(comp);
                    }
                }
            }
        }

        let cyclic = Self::compute_cyclic(graph, &components, &component_of);
        let waves = Self::compute_waves(graph, &components, &component_of);

        Self {
            components,
            component_of,
            cyclic,
            waves,
        }
    }

    fn compute_cyclic(
        graph: &CallGraph,
        components: &[SmallVec<[MethodId; 4]>],
        component_of: &[u32],
    ) -> Vec<bool> {
        components
            .iter()
            .enumerate()
            .map(|(idx, comp)| {
                if comp.len() > 1 {
                    return true;
                }
                // Single method: cyclic iff it calls itself, or any
                // callee resolves back into this component.
                comp.iter().any(|&m| {
                    graph.callees(m).iter().any(|&callee| {
                        component_of.get(callee.index()).copied()
                            == Some(u32::try_from(idx).unwrap_or(u32::MAX))
                    })
                })
            })
            .collect()
    }

    /// Wave of a component = 1 + max wave of its callee components.
    /// Tarjan emits components callees-first, so a single forward sweep
    /// over the emission order sees every dependency already numbered.
    fn compute_waves(
        graph: &CallGraph,
        components: &[SmallVec<[MethodId; 4]>],
        component_of: &[u32],
    ) -> Vec<Vec<u32>> {
        let mut wave_of = vec![0_usize; components.len()];

        for (idx, comp) in components.iter().enumerate() {
            let mut wave = 0;
            for &method in comp {
                for &callee in graph.callees(method) {
                    let Some(&callee_comp) = component_of.get(callee.index()) else {
                        continue;
                    };
                    let callee_comp = callee_comp as usize;
                    if callee_comp != idx {
                        wave = wave.max(wave_of[callee_comp] + 1);
                    }
                }
            }
            wave_of[idx] = wave;
        }

        let num_waves = wave_of.iter().map(|&w| w + 1).max().unwrap_or(0);
        let mut waves = vec![Vec::new(); num_waves];
        for (idx, &wave) in wave_of.iter().enumerate() {
            waves[wave].push(u32::try_from(idx).unwrap_or(u32::MAX));
        }
        waves
    }

    /// The component a method belongs to.
    pub fn component_of(&self, method: MethodId) -> u32 {
        self.component_of.get(method.index()).copied().unwrap_or(0)
    }

    /// Methods of component `idx`.
    pub fn component(&self, idx: u32) -> &[MethodId] {
        self.components
            .get(idx as usize)
            .map_or(&[], SmallVec::as_slice)
    }

    /// Whether component `idx` needs joint fixpoint solving.
    pub fn is_cyclic(&self, idx: u32) -> bool {
        self.cyclic.get(idx as usize).copied().unwrap_or(false)
    }

    /// The topological waves, earliest (leaf callees) first.
    pub fn waves(&self) -> &[Vec<u32>] {
        &self.waves
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if the graph had no methods.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::test_helpers::{call_chain_module, mutually_recursive_module};

    use ovid_ir::CallGraph;

    use super::*;

    #[test]
    fn straight_chain_is_all_singletons() {
        // a -> b -> c
        let (module, ids) = call_chain_module(3);
        let graph = CallGraph::build(&module);
        let cond = Condensation::compute(&graph);

        assert_eq!(cond.len(), 3);
        for &id in &ids {
            assert_eq!(cond.component(cond.component_of(id)), &[id]);
            assert!(!cond.is_cyclic(cond.component_of(id)));
        }
        // c (the leaf callee) must be solved before b, b before a.
        let wave_of = |m| {
            cond.waves()
                .iter()
                .position(|w| w.contains(&cond.component_of(m)))
                .unwrap()
        };
        assert!(wave_of(ids[2]) < wave_of(ids[1]));
        assert!(wave_of(ids[1]) < wave_of(ids[0]));
    }

    #[test]
    fn mutual_recursion_is_one_cyclic_component() {
        let (module, a, b) = mutually_recursive_module();
        let graph = CallGraph::build(&module);
        let cond = Condensation::compute(&graph);

        assert_eq!(cond.component_of(a), cond.component_of(b));
        assert!(cond.is_cyclic(cond.component_of(a)));
        assert_eq!(cond.component(cond.component_of(a)).len(), 2);
    }

    #[test]
    fn waves_partition_all_components() {
        let (module, _ids) = call_chain_module(4);
        let graph = CallGraph::build(&module);
        let cond = Condensation::compute(&graph);

        let total: usize = cond.waves().iter().map(Vec::len).sum();
        assert_eq!(total, cond.len());
    }
}
