use fnv::FnvHashMap;
use petgraph::{algo::tarjan_scc, graph::Graph, graph::NodeIndex};

use crate::{
    binding::Binding,
    constraint::ConstraintSet,
    ty::{Ty, TyVar},
};

/// Collapses cycles in the variable-to-variable part of a constraint set.
///
/// Builds a directed graph with an edge per `a <: b` constraint where both
/// sides are bare variables, finds its strongly-connected components, and
/// binds every member of a non-trivial component to that component's
/// lowest-numbered variable. Applying the returned binding turns each cycle
/// into trivial `t <: t` constraints the reducer discards, so the search
/// never chases `a <: b <: a` chains.
pub fn collapse_cyclic_vars(constraints: &ConstraintSet) -> Binding {
    let mut graph: Graph<TyVar, ()> = Graph::new();
    let mut nodes: FnvHashMap<TyVar, NodeIndex> = FnvHashMap::default();

    for c in constraints.iter() {
        if let (Ty::Var(a), Ty::Var(b)) = (c.left(), c.right()) {
            let na = node_of(&mut graph, &mut nodes, *a);
            let nb = node_of(&mut graph, &mut nodes, *b);
            graph.add_edge(na, nb, ());
        }
    }

    let mut binding = Binding::new();
    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let rep = component
            .iter()
            .map(|&n| graph[n])
            .min()
            .unwrap_or_else(|| graph[component[0]]);
        for &n in &component {
            let v = graph[n];
            if v != rep {
                binding.bind(v, Ty::Var(rep));
            }
        }
    }
    binding
}

fn node_of(
    graph: &mut Graph<TyVar, ()>,
    nodes: &mut FnvHashMap<TyVar, NodeIndex>,
    var: TyVar,
) -> NodeIndex {
    if let Some(&n) = nodes.get(&var) {
        n
    } else {
        let n = graph.add_node(var);
        nodes.insert(var, n);
        n
    }
}

#[cfg(test)]
mod cycles_tests {
    use super::*;
    use crate::constraint::Constraint;

    fn var_constraints(edges: &[(u32, u32)]) -> ConstraintSet {
        edges
            .iter()
            .map(|&(a, b)| Constraint::new(Ty::Var(tvar!(a)), Ty::Var(tvar!(b))))
            .collect()
    }

    #[test]
    fn test_two_cycle_collapses_to_lowest_var() {
        let constraints = var_constraints(&[(0, 1), (1, 0)]);
        let binding = collapse_cyclic_vars(&constraints);

        assert_eq!(binding.len(), 1);
        assert_eq!(binding.get(tvar!(1)), Some(&Ty::Var(tvar!(0))));

        // every constraint of the cycle becomes trivial
        let rewritten = binding.apply(constraints);
        assert!(rewritten.iter().all(|c| c.left() == c.right()));
    }

    #[test]
    fn test_chain_without_cycle_is_untouched() {
        let constraints = var_constraints(&[(0, 1), (1, 2)]);
        assert!(collapse_cyclic_vars(&constraints).is_empty());
    }

    #[test]
    fn test_two_components_collapse_independently() {
        let constraints = var_constraints(&[(0, 1), (1, 0), (5, 6), (6, 7), (7, 5), (2, 0)]);
        let binding = collapse_cyclic_vars(&constraints);

        assert_eq!(binding.get(tvar!(1)), Some(&Ty::Var(tvar!(0))));
        assert_eq!(binding.get(tvar!(6)), Some(&Ty::Var(tvar!(5))));
        assert_eq!(binding.get(tvar!(7)), Some(&Ty::Var(tvar!(5))));
        assert!(!binding.binds(tvar!(2)));
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let constraints = var_constraints(&[(0, 1), (1, 2), (2, 0)]);
        let binding = collapse_cyclic_vars(&constraints);
        assert!(binding.non_empty());

        let rewritten: ConstraintSet = binding
            .apply(constraints)
            .into_iter()
            .filter(|c| c.left() != c.right())
            .collect();
        assert!(collapse_cyclic_vars(&rewritten).is_empty());
    }

    #[test]
    fn test_structured_constraints_carry_no_edges() {
        let (_, mut tf, cls) = crate::hierarchy::fixture::hierarchy();
        let v0 = tf.next();
        let v1 = tf.next();
        let mut constraints = ConstraintSet::default();
        constraints.insert(Constraint::new(
            Ty::Var(v0),
            Ty::Class(cls.list, vec![Ty::Var(v1)]),
        ));
        constraints.insert(Constraint::new(Ty::Var(v1), Ty::Var(v1)));
        assert!(collapse_cyclic_vars(&constraints).is_empty());
    }
}
