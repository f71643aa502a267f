use std::rc::Rc;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;

use crate::{
    binding::{Binding, BindingFactory},
    constraint::{Constraint, ConstraintSet, Settings, System},
    solve::{collapse_cyclic_vars, NullObserver, SearchObserver, SolutionHolder},
    ty::{Ty, TyVar},
};

/// One pending subproblem of the search: a constraint-set snapshot plus
/// the binding accumulated on the way down. Nodes never reference their
/// parent.
struct Node {
    depth: usize,
    binding: Binding,
    constraints: ConstraintSet,
}

/// Which side of a pair of mergeable constraints holds the shared
/// variable. Carries the merge operator, the rebuilt constraint shape and
/// the projections in one place.
#[derive(Clone, Copy)]
enum MergeSide {
    /// `var <: Type` twice: two upper bounds, merged via `intersect`.
    LeftIsVar,
    /// `Type <: var` twice: two lower bounds, merged via `union`.
    RightIsVar,
}

impl MergeSide {
    fn var(self, c: &Constraint) -> Option<TyVar> {
        match self {
            MergeSide::LeftIsVar => c.left().as_var(),
            MergeSide::RightIsVar => c.right().as_var(),
        }
    }

    fn ty(self, c: &Constraint) -> &Ty {
        match self {
            MergeSide::LeftIsVar => c.right(),
            MergeSide::RightIsVar => c.left(),
        }
    }

    fn merge(self, factory: &BindingFactory, x: &Ty, y: &Ty) -> Vec<(Ty, Binding)> {
        match self {
            MergeSide::LeftIsVar => factory.intersect(x, y),
            MergeSide::RightIsVar => factory.union(x, y),
        }
    }

    fn constraint(self, var: TyVar, ty: Ty) -> Constraint {
        match self {
            MergeSide::LeftIsVar => Constraint::new(Ty::Var(var), ty),
            MergeSide::RightIsVar => Constraint::new(ty, Ty::Var(var)),
        }
    }
}

/// Backtracking depth-first search over constraint reductions.
///
/// Each step classifies the node's constraints and acts on the first
/// applicable pattern: merge two bounds of one variable, close an
/// interval, structurally align a variable-free pair, or fall back to
/// binding a side variable directly. Branching comes from merge and range
/// alternatives; a failed composition abandons the branch. Every node
/// with an empty constraint set registers its binding as a solution.
pub struct Resolver {
    factory: BindingFactory,
    settings: Settings,
    solutions: SolutionHolder,
    observer: Box<dyn SearchObserver>,
    root: Option<Node>,
}

impl Resolver {
    pub fn new(system: System) -> Resolver {
        Resolver::with_observer(system, Box::new(NullObserver))
    }

    pub fn with_observer(system: System, observer: Box<dyn SearchObserver>) -> Resolver {
        let (ctx, vars, constraints, settings) = system.into_parts();
        let factory = BindingFactory::new(Rc::new(ctx), vars);

        // collapse variable cycles in the input before the search starts
        let collapse = collapse_cyclic_vars(&constraints);
        let mut constraints = collapse.apply(constraints);
        constraints.retain(|c| c.left() != c.right());

        Resolver {
            factory,
            settings,
            solutions: SolutionHolder::default(),
            observer,
            root: Some(Node {
                depth: 0,
                binding: collapse,
                constraints,
            }),
        }
    }

    pub fn solutions(&self) -> &SolutionHolder {
        &self.solutions
    }

    pub fn best_solution(&self) -> Option<&Binding> {
        self.solutions.best_solution()
    }

    /// Runs the search to exhaustion. The stack of pending nodes is the
    /// backtracking state; children are pushed in reverse so they are
    /// visited in the order their reduction produced them.
    pub fn resolve(&mut self) {
        let mut stack: Vec<Node> = self.root.take().into_iter().collect();

        while let Some(node) = stack.pop() {
            self.observer.on_reduce(node.depth, node.constraints.len());

            if node.constraints.is_empty() {
                log::debug!("reduced binding: {}", node.binding);
                self.observer.on_solution(&node.binding);
                self.solutions.put_solution(node.binding);
                continue;
            }

            let children = self.reduce(&node);
            if children.is_empty() {
                self.observer.on_dead_end(node.depth);
            } else {
                self.observer.on_branch(node.depth, children.len());
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
    }

    /// One reduction step: acts on the first applicable pattern and
    /// returns the child nodes. An empty result with a non-empty
    /// constraint set means the branch is abandoned.
    fn reduce(&mut self, node: &Node) -> Vec<Node> {
        if node.binding.is_cyclic() {
            let collapse = collapse_cyclic_vars(&node.constraints);
            if collapse.non_empty() {
                return self
                    .make_child(node, node.constraints.clone(), &collapse)
                    .into_iter()
                    .collect();
            }
        }

        let degree = degree_map(&node.constraints);

        let mut type_var: FnvHashMap<TyVar, &Constraint> = FnvHashMap::default();
        let mut var_type: FnvHashMap<TyVar, &Constraint> = FnvHashMap::default();

        for constr in node.constraints.iter() {
            match (constr.left().as_var(), constr.right().as_var()) {
                (Some(_), Some(_)) => continue,
                (None, Some(v)) => {
                    if let Some(&other) = type_var.get(&v) {
                        return self.reduce_side_var(node, constr, other, MergeSide::RightIsVar);
                    }
                    if let Some(&upper) = var_type.get(&v) {
                        return self.reduce_interval(node, &degree, constr, upper);
                    }
                    type_var.insert(v, constr);
                }
                (Some(v), None) => {
                    if let Some(&other) = var_type.get(&v) {
                        return self.reduce_side_var(node, constr, other, MergeSide::LeftIsVar);
                    }
                    if let Some(&lower) = type_var.get(&v) {
                        return self.reduce_interval(node, &degree, lower, constr);
                    }
                    var_type.insert(v, constr);
                }
                (None, None) => {
                    if let Some(children) = self.reduce_type_type(node, &degree, constr) {
                        return children;
                    }
                    // inert: no alignment exists, leave it for the fallback
                }
            }
        }

        self.reduce_side_free(node)
    }

    /// Merges two constraints bounding the same variable from the same
    /// side: one child per alternative the merge operator offers, each
    /// replacing the pair with the reconciled constraint.
    fn reduce_side_var(
        &mut self,
        node: &Node,
        x: &Constraint,
        y: &Constraint,
        side: MergeSide,
    ) -> Vec<Node> {
        let var = match side.var(x) {
            Some(v) => v,
            None => return vec![],
        };

        let alternatives = side.merge(&self.factory, side.ty(x), side.ty(y));
        let mut children = vec![];
        for (ty, binding) in alternatives {
            let mut constraints = node.constraints.clone();
            constraints.remove(x);
            constraints.remove(y);
            constraints.insert(side.constraint(var, ty));
            children.extend(self.make_child(node, constraints, &binding));
        }
        children
    }

    /// Closes an interval `Lo <: var <: Hi`: equal endpoints bind the
    /// variable outright; otherwise every type in the range between the
    /// aligned endpoints becomes a candidate binding.
    fn reduce_interval(
        &mut self,
        node: &Node,
        degree: &FnvHashMap<TyVar, usize>,
        lower: &Constraint,
        upper: &Constraint,
    ) -> Vec<Node> {
        let var = match lower.right().as_var() {
            Some(v) => v,
            None => return vec![],
        };
        let lo_ty = lower.left();
        let hi_ty = upper.right();

        let mut constraints = node.constraints.clone();
        constraints.remove(lower);
        constraints.remove(upper);

        if lo_ty == hi_ty {
            let binding = Binding::singleton(var, lo_ty.clone());
            return self.make_child(node, constraints, &binding).into_iter().collect();
        }

        let rise = self.factory.rise(lo_ty, hi_ty);
        let mut sink = self.factory.sink(lo_ty, hi_ty);

        if rise.is_none() && sink.is_none() {
            return vec![];
        }

        if let Some(r) = &rise {
            if sink.as_ref() == Some(r) || self.can_be_pruned(degree, r) {
                if sink.take().is_some() {
                    self.observer.on_prune(node.depth);
                }
            }
        }

        let mut children = vec![];
        for aligned in rise.into_iter().chain(sink) {
            let hi = aligned.apply(hi_ty.clone());
            let lo = aligned.apply(lo_ty.clone());
            for ty in self.factory.ctx().type_range(&hi, &lo) {
                if let Some(binding) = aligned.compose(&Binding::singleton(var, ty)) {
                    children.extend(self.make_child(node, constraints.clone(), &binding));
                }
            }
        }
        children
    }

    /// Structurally aligns a constraint with no top-level variable: one
    /// child per surviving alignment (rise, sink, wildcard-cooking rise).
    /// Returns `None` when no alignment exists at all: the constraint is
    /// inert and the scan moves past it.
    fn reduce_type_type(
        &mut self,
        node: &Node,
        degree: &FnvHashMap<TyVar, usize>,
        constr: &Constraint,
    ) -> Option<Vec<Node>> {
        let left = constr.left();
        let right = constr.right();

        let mut addendum = vec![];
        let rise = self.factory.rise(left, right);
        let mut sink = self.factory.sink(left, right);
        let mut cooked = if self.settings.cook_wildcards {
            self.factory.rise_with_wildcard(left, right, &mut addendum)
        } else {
            None
        };

        if rise.is_none() && sink.is_none() && cooked.is_none() {
            return None;
        }

        if let Some(r) = &rise {
            if sink.as_ref() == Some(r) || self.can_be_pruned(degree, r) {
                if sink.take().is_some() {
                    self.observer.on_prune(node.depth);
                }
            }
            if cooked.as_ref() == Some(r) {
                cooked = None;
            }
        }

        let mut base = node.constraints.clone();
        base.remove(constr);

        let mut children = vec![];
        for binding in rise.into_iter().chain(sink) {
            children.extend(self.make_child(node, base.clone(), &binding));
        }
        if let Some(binding) = cooked {
            let mut constraints = base;
            constraints.extend(addendum);
            children.extend(self.make_child(node, constraints, &binding));
        }
        Some(children)
    }

    /// Fallback for a constraint set with no mergeable pair: bind a side
    /// variable directly, floor an occurs violation, or default the
    /// remaining free variables to Bottom.
    fn reduce_side_free(&mut self, node: &Node) -> Vec<Node> {
        if self.settings.cook_wildcards {
            let mut have_right_bound = FnvHashSet::default();
            let mut target: Option<&Constraint> = None;

            for constr in node.constraints.iter() {
                if constr.right().is_var() {
                    if let Some(l) = constr.left().as_var() {
                        have_right_bound.insert(l);
                    } else if target.is_none() && !constr.left().binds_tyvars() {
                        target = Some(constr);
                    }
                }
            }

            if let Some(target) = target {
                let var = match target.right().as_var() {
                    Some(v) => v,
                    None => return vec![],
                };
                let ty = target.left().clone();
                // a variable someone depends on from below keeps the raw type
                let image = if have_right_bound.contains(&var) || ty.is_wildcard() {
                    ty
                } else {
                    Ty::super_wildcard(ty)
                };

                let mut constraints = node.constraints.clone();
                constraints.remove(target);
                let binding = Binding::singleton(var, image);
                return self.make_child(node, constraints, &binding).into_iter().collect();
            }
        } else {
            for constr in node.constraints.iter() {
                if let (false, Some(var)) = (constr.left().is_var(), constr.right().as_var()) {
                    let mut constraints = node.constraints.clone();
                    constraints.remove(constr);

                    if constr.left().contains_var(var) {
                        // occurs violation: floor the variable
                        let binding = Binding::singleton(var, Ty::Bottom);
                        return self.make_child(node, constraints, &binding).into_iter().collect();
                    }

                    let lo = match constr.left() {
                        Ty::Wildcard(_, bound) => (**bound).clone(),
                        t => t.clone(),
                    };
                    let object = self.factory.ctx().object();
                    let mut children = vec![];
                    for ty in self.factory.ctx().type_range(&object, &lo) {
                        let binding = Binding::singleton(var, ty);
                        children.extend(self.make_child(node, constraints.clone(), &binding));
                    }
                    return children;
                }
            }
        }

        let mut have_left_bound = FnvHashSet::default();
        let mut bound_vars = FnvHashSet::default();
        let mut target: Option<&Constraint> = None;

        for constr in node.constraints.iter() {
            if let Some(l) = constr.left().as_var() {
                bound_vars.insert(l);
                if let Some(r) = constr.right().as_var() {
                    bound_vars.insert(r);
                    have_left_bound.insert(r);
                } else if target.is_none() && !constr.right().binds_tyvars() {
                    target = Some(constr);
                }
            }
        }

        match target {
            Some(target) => {
                let var = match target.left().as_var() {
                    Some(v) => v,
                    None => return vec![],
                };
                let ty = target.right().clone();
                let image = if have_left_bound.contains(&var)
                    || ty.is_wildcard()
                    || !self.settings.cook_wildcards
                {
                    ty
                } else {
                    Ty::extends_wildcard(ty)
                };

                let mut constraints = node.constraints.clone();
                constraints.remove(target);
                let binding = Binding::singleton(var, image);
                self.make_child(node, constraints, &binding).into_iter().collect()
            }
            None => {
                // default every remaining free variable to Bottom; once
                // nothing is left to default, the leftover constraints are
                // vacuously discharged
                let mut default = Binding::new();
                for v in self.factory.variables().iter().copied().sorted() {
                    if !node.binding.binds(v) && !bound_vars.contains(&v) {
                        default.bind(v, Ty::Bottom);
                    }
                }

                let constraints = if default.is_empty() {
                    ConstraintSet::default()
                } else {
                    node.constraints.clone()
                };
                self.make_child(node, constraints, &default).into_iter().collect()
            }
        }
    }

    /// A candidate binding is redundant when, outside exhaustive mode,
    /// none of the variables it fixes to a concrete type is bounded by
    /// any other constraint in this node.
    fn can_be_pruned(&self, degree: &FnvHashMap<TyVar, usize>, binding: &Binding) -> bool {
        if self.settings.exhaustive {
            return false;
        }
        for v in binding.bound_variables() {
            let concrete = binding.get(v).map_or(false, |t| !t.is_var());
            if concrete && degree.get(&v).map_or(true, |&d| d > 1) {
                return false;
            }
        }
        true
    }

    /// Composes `binding` onto the node's binding and substitutes it through the
    /// child's constraints; trivial `t <: t` leftovers are dropped. A
    /// composition failure yields no child, the normal backtracking
    /// signal.
    fn make_child(&self, node: &Node, constraints: ConstraintSet, binding: &Binding) -> Option<Node> {
        let composed = node.binding.compose(binding)?;
        let mut constraints = binding.apply(constraints);
        constraints.retain(|c| c.left() != c.right());
        Some(Node {
            depth: node.depth + 1,
            binding: composed,
            constraints,
        })
    }
}

/// How many constraints bound each variable from the right; feeds the
/// pruning heuristic.
fn degree_map(constraints: &ConstraintSet) -> FnvHashMap<TyVar, usize> {
    let mut map = FnvHashMap::default();
    for c in constraints.iter() {
        for v in c.right().collect_tyvars() {
            *map.entry(v).or_insert(0) += 1;
        }
    }
    map
}
