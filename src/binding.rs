use std::rc::Rc;

use fnv::FnvHashSet;
use itertools::Itertools;

use crate::{
    constraint::Constraint,
    hierarchy::TyCtx,
    subst::{ApplySubst, Subst},
    ty::{Ty, TyVar, WildcardKind},
};

/// A substitution of type variables, the unit the search accumulates.
/// Composition is the only way bindings grow, and it fails explicitly on a
/// disagreement; that failure is the backtracking signal, not an error.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Binding(Subst);

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Binding {
    pub fn new() -> Binding {
        Binding(Subst::new())
    }

    pub fn singleton(var: TyVar, ty: Ty) -> Binding {
        let mut subst = Subst::new();
        subst.insert(var, ty);
        Binding(subst)
    }

    pub(crate) fn bind(&mut self, var: TyVar, ty: Ty) {
        self.0.insert(var, ty);
    }

    pub fn subst(&self) -> &Subst {
        &self.0
    }

    pub fn binds(&self, var: TyVar) -> bool {
        self.0.contains_key(&var)
    }

    pub fn get(&self, var: TyVar) -> Option<&Ty> {
        self.0.get(&var)
    }

    /// Domain of the binding, in ascending variable order.
    pub fn bound_variables(&self) -> Vec<TyVar> {
        self.0.keys().copied().sorted().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TyVar, &Ty)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn non_empty(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn apply<T: ApplySubst>(&self, t: T) -> T {
        t.apply_subst(&self.0)
    }

    /// Merges two bindings. The result maps `v ∈ dom(self)` to
    /// `other.apply(self(v))` and `v ∈ dom(other) ∖ dom(self)` to
    /// `other(v)`, so `self.compose(other)?.apply(t)` equals
    /// `other.apply(self.apply(t))`. A variable bound by both must agree
    /// after mutual substitution; otherwise the merge fails.
    pub fn compose(&self, other: &Binding) -> Option<Binding> {
        let mut subst = Subst::new();
        for (&v, t) in self.0.iter() {
            let image = t.clone().apply_subst(&other.0);
            if let Some(u) = other.0.get(&v) {
                let mirror = u.clone().apply_subst(&self.0);
                if image != mirror {
                    return None;
                }
            }
            subst.insert(v, image);
        }
        for (&v, u) in other.0.iter() {
            if !self.binds(v) {
                subst.insert(v, u.clone());
            }
        }
        Some(Binding(subst))
    }

    /// Whether following the substitution chain from any bound variable
    /// revisits that variable.
    pub fn is_cyclic(&self) -> bool {
        for &start in self.0.keys() {
            let mut seen = FnvHashSet::default();
            let mut stack = vec![start];
            while let Some(v) = stack.pop() {
                if !seen.insert(v) {
                    continue;
                }
                if let Some(t) = self.0.get(&v) {
                    for u in t.collect_tyvars() {
                        if u == start {
                            return true;
                        }
                        stack.push(u);
                    }
                }
            }
        }
        false
    }
}

/// Alignment direction of the structural unifier: `Rise` widens the left
/// type up its supertype chain to meet the right, `Sink` narrows the right
/// down to meet the left, `Exact` is the invariant mode used at type-
/// argument positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Balance {
    Rise,
    Sink,
    Exact,
}

struct Unifier<'a> {
    ctx: &'a TyCtx,
    cook: bool,
    addendum: Vec<Constraint>,
}

impl<'a> Unifier<'a> {
    fn new(ctx: &'a TyCtx, cook: bool) -> Unifier<'a> {
        Unifier {
            ctx,
            cook,
            addendum: vec![],
        }
    }

    fn unify(&mut self, x: &Ty, y: &Ty, balance: Balance) -> Option<Binding> {
        if x == y {
            return Some(Binding::new());
        }

        match (x, y) {
            // Bottom is below everything
            (Ty::Bottom, _) if balance != Balance::Exact => Some(Binding::new()),

            (Ty::Var(v), Ty::Var(u)) => Some(Binding::singleton(*v, Ty::Var(*u))),
            // no occurs check here; the resolver floors occurs violations
            (Ty::Var(v), t) => Some(Binding::singleton(*v, t.clone())),
            (t, Ty::Var(u)) => {
                if self.cook
                    && balance == Balance::Exact
                    && !t.is_wildcard()
                    && *t != Ty::Bottom
                {
                    Some(Binding::singleton(*u, Ty::super_wildcard(t.clone())))
                } else {
                    Some(Binding::singleton(*u, t.clone()))
                }
            }

            // arrays are covariant
            (Ty::Array(a), Ty::Array(b)) => self.unify(a, b, balance),
            (Ty::Array(_), t) if balance == Balance::Rise && *t == self.ctx.object() => {
                Some(Binding::new())
            }
            (t, Ty::Array(_)) if balance == Balance::Sink && *t == self.ctx.object() => {
                Some(Binding::new())
            }

            // `? extends B <: y` iff `B <: y`; `x <: ? extends B` iff `x <: B`;
            // `x <: ? super B` iff `B <: x`
            (Ty::Wildcard(WildcardKind::Extends, b), _) if balance != Balance::Exact => {
                self.unify(b, y, balance)
            }
            (_, Ty::Wildcard(WildcardKind::Extends, b)) if balance != Balance::Exact => {
                self.unify(x, b, balance)
            }
            (_, Ty::Wildcard(WildcardKind::Super, b)) if balance != Balance::Exact => {
                self.unify(b, x, balance)
            }
            (Ty::Wildcard(WildcardKind::Super, _), t) if balance != Balance::Exact => {
                if *t == self.ctx.object() {
                    Some(Binding::new())
                } else {
                    None
                }
            }

            (Ty::Wildcard(k1, b1), Ty::Wildcard(k2, b2)) if k1 == k2 => {
                self.unify(b1, b2, Balance::Exact)
            }
            // capture constraints: matching a concrete argument against an
            // existing wildcard defers the bound check to the resolver
            (t, Ty::Wildcard(WildcardKind::Extends, b)) if self.cook && !t.is_wildcard() => {
                self.addendum.push(Constraint::new(t.clone(), (**b).clone()));
                Some(Binding::new())
            }
            (t, Ty::Wildcard(WildcardKind::Super, b)) if self.cook && !t.is_wildcard() => {
                self.addendum.push(Constraint::new((**b).clone(), t.clone()));
                Some(Binding::new())
            }

            (Ty::Class(c1, a1), Ty::Class(c2, a2)) => match balance {
                Balance::Exact => {
                    if c1 == c2 {
                        self.unify_args(a1, a2)
                    } else {
                        None
                    }
                }
                Balance::Rise => {
                    if let Some(Ty::Class(_, va)) = self.ctx.ancestor_view(*c1, a1, *c2) {
                        self.unify_args(&va, a2)
                    } else {
                        None
                    }
                }
                Balance::Sink => {
                    if let Some(Ty::Class(_, va)) = self.ctx.ancestor_view(*c2, a2, *c1) {
                        self.unify_args(a1, &va)
                    } else {
                        None
                    }
                }
            },

            _ => None,
        }
    }

    fn unify_args(&mut self, xs: &[Ty], ys: &[Ty]) -> Option<Binding> {
        if xs.len() != ys.len() {
            return None;
        }
        let mut binding = Binding::new();
        for (p, q) in xs.iter().zip(ys) {
            let p = binding.apply(p.clone());
            let q = binding.apply(q.clone());
            let b = self.unify(&p, &q, Balance::Exact)?;
            binding = binding.compose(&b)?;
        }
        Some(binding)
    }
}

/// Produces bindings for the resolution tree. Holds the read-only class
/// context and the set of variables known to the system; both are shared
/// by every node of the search.
pub struct BindingFactory {
    ctx: Rc<TyCtx>,
    vars: FnvHashSet<TyVar>,
}

impl BindingFactory {
    pub fn new(ctx: Rc<TyCtx>, vars: FnvHashSet<TyVar>) -> BindingFactory {
        BindingFactory { ctx, vars }
    }

    pub fn ctx(&self) -> &TyCtx {
        &self.ctx
    }

    pub fn variables(&self) -> &FnvHashSet<TyVar> {
        &self.vars
    }

    pub fn create(&self) -> Binding {
        Binding::new()
    }

    /// Minimal generalization: a binding under which `left <: right` holds
    /// by widening `left` up its supertype chain until it structurally
    /// aligns with `right`.
    pub fn rise(&self, left: &Ty, right: &Ty) -> Option<Binding> {
        Unifier::new(&self.ctx, false).unify(left, right, Balance::Rise)
    }

    /// Dual of [`rise`](Self::rise): narrows `right` down until it aligns
    /// with `left`.
    pub fn sink(&self, left: &Ty, right: &Ty) -> Option<Binding> {
        Unifier::new(&self.ctx, false).unify(left, right, Balance::Sink)
    }

    /// Like `rise`, but may bind right-hand variables to `super`-wildcards
    /// and emit capture constraints into `addendum` where a precise
    /// type-argument binding would be unsound.
    pub fn rise_with_wildcard(
        &self,
        left: &Ty,
        right: &Ty,
        addendum: &mut Vec<Constraint>,
    ) -> Option<Binding> {
        let mut unifier = Unifier::new(&self.ctx, true);
        let binding = unifier.unify(left, right, Balance::Rise)?;
        addendum.extend(unifier.addendum);
        Some(binding)
    }

    /// Alternatives reconciling two lower bounds of one variable: for each
    /// common supertype candidate, the binding under which both types rise
    /// into it. Ordered most specific first; never empty for class types
    /// (Object is always a candidate).
    pub fn union(&self, x: &Ty, y: &Ty) -> Vec<(Ty, Binding)> {
        if let Ty::Bottom = x {
            return vec![(y.clone(), Binding::new())];
        }
        if let Ty::Bottom = y {
            return vec![(x.clone(), Binding::new())];
        }

        let mut alternatives: Vec<(Ty, Binding)> = vec![];
        let candidates = self
            .ctx
            .ancestors(x)
            .into_iter()
            .chain(self.ctx.ancestors(y));
        for cand in candidates {
            if let (Some(bx), Some(by)) = (self.rise(x, &cand), self.rise(y, &cand)) {
                if let Some(b) = bx.compose(&by) {
                    let ty = b.apply(cand);
                    if !alternatives.iter().any(|(t, _)| *t == ty) {
                        alternatives.push((ty, b));
                    }
                }
            }
        }
        alternatives
    }

    /// Alternatives reconciling two upper bounds of one variable: whichever
    /// of the two types rises into the other is a common subtype. May be
    /// empty, which abandons the branch.
    pub fn intersect(&self, x: &Ty, y: &Ty) -> Vec<(Ty, Binding)> {
        let mut alternatives: Vec<(Ty, Binding)> = vec![];
        if let Some(b) = self.rise(x, y) {
            alternatives.push((b.apply(x.clone()), b));
        }
        if let Some(b) = self.rise(y, x) {
            let ty = b.apply(y.clone());
            if !alternatives.iter().any(|(t, _)| *t == ty) {
                alternatives.push((ty, b));
            }
        }
        alternatives
    }
}

#[cfg(test)]
mod binding_tests {
    use super::*;
    use crate::hierarchy::fixture::hierarchy;
    use crate::ty::TyVarFactory;

    fn factory() -> (BindingFactory, crate::hierarchy::fixture::Classes, TyVarFactory) {
        let (ctx, tf, cls) = hierarchy();
        (
            BindingFactory::new(Rc::new(ctx), FnvHashSet::default()),
            cls,
            tf,
        )
    }

    #[test]
    fn test_compose_is_sequential_application() {
        let (_, cls, mut tf) = factory();
        let v0 = tf.next();
        let v1 = tf.next();
        let list_v1 = Ty::Class(cls.list, vec![Ty::Var(v1)]);
        let string = Ty::Class(cls.string, vec![]);

        let a = Binding::singleton(v0, list_v1.clone());
        let b = Binding::singleton(v1, string.clone());
        let composed = a.compose(&b).unwrap();

        for t in &[Ty::Var(v0), Ty::Var(v1), list_v1.clone()] {
            assert_eq!(composed.apply(t.clone()), b.apply(a.apply(t.clone())));
        }
        assert_eq!(
            composed.get(v0),
            Some(&Ty::Class(cls.list, vec![string]))
        );
    }

    #[test]
    fn test_compose_disagreement_fails() {
        let (_, cls, mut tf) = factory();
        let v = tf.next();
        let a = Binding::singleton(v, Ty::Class(cls.string, vec![]));
        let b = Binding::singleton(v, Ty::Class(cls.animal, vec![]));
        assert_eq!(a.compose(&b), None);
    }

    #[test]
    fn test_compose_with_self_never_fails() {
        let (_, cls, mut tf) = factory();
        let v0 = tf.next();
        let v1 = tf.next();
        let a = Binding::singleton(v0, Ty::Class(cls.list, vec![Ty::Var(v1)]))
            .compose(&Binding::singleton(v1, Ty::Class(cls.string, vec![])))
            .unwrap();
        assert!(a.compose(&a).is_some());
    }

    #[test]
    fn test_is_cyclic() {
        let (_, cls, mut tf) = factory();
        let v0 = tf.next();
        let v1 = tf.next();
        let cyclic = Binding::singleton(v0, Ty::Class(cls.list, vec![Ty::Var(v1)]))
            .compose(&Binding::singleton(v1, Ty::Var(v0)))
            .unwrap();
        assert!(cyclic.is_cyclic());

        let acyclic = Binding::singleton(v0, Ty::Var(v1));
        assert!(!acyclic.is_cyclic());
    }

    #[test]
    fn test_rise_aligns_through_hierarchy() {
        let (f, cls, mut tf) = factory();
        let v = tf.next();
        let string = Ty::Class(cls.string, vec![]);
        let left = Ty::Class(cls.array_list, vec![Ty::Var(v)]);
        let right = Ty::Class(cls.collection, vec![string.clone()]);

        let b = f.rise(&left, &right).unwrap();
        assert_eq!(b.get(v), Some(&string));

        // Dog cannot widen into String
        let dog = Ty::Class(cls.dog, vec![]);
        assert_eq!(f.rise(&dog, &string), None);
    }

    #[test]
    fn test_sink_aligns_downward() {
        let (f, cls, mut tf) = factory();
        let v = tf.next();
        let string = Ty::Class(cls.string, vec![]);
        let left = Ty::Class(cls.collection, vec![string.clone()]);
        let right = Ty::Class(cls.array_list, vec![Ty::Var(v)]);

        let b = f.sink(&left, &right).unwrap();
        assert_eq!(b.get(v), Some(&string));
    }

    #[test]
    fn test_rise_through_arrays_is_covariant() {
        let (f, cls, mut tf) = factory();
        let v = tf.next();
        let dog_arr = Ty::array(Ty::Class(cls.dog, vec![]));
        let var_arr = Ty::array(Ty::Var(v));
        let b = f.rise(&dog_arr, &var_arr).unwrap();
        assert_eq!(b.get(v), Some(&Ty::Class(cls.dog, vec![])));

        // any array rises into Object
        assert!(f.rise(&dog_arr, &f.ctx().object()).is_some());
    }

    #[test]
    fn test_union_of_comparable_types() {
        let (f, cls, _) = factory();
        let dog = Ty::Class(cls.dog, vec![]);
        let animal = Ty::Class(cls.animal, vec![]);

        let alts = f.union(&dog, &animal);
        let tys: Vec<&Ty> = alts.iter().map(|(t, _)| t).collect();
        assert_eq!(tys, vec![&animal, &f.ctx().object()]);
    }

    #[test]
    fn test_union_of_unrelated_types_is_object() {
        let (f, cls, _) = factory();
        let dog = Ty::Class(cls.dog, vec![]);
        let string = Ty::Class(cls.string, vec![]);

        let alts = f.union(&dog, &string);
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].0, f.ctx().object());
    }

    #[test]
    fn test_union_with_bottom_is_identity() {
        let (f, cls, _) = factory();
        let dog = Ty::Class(cls.dog, vec![]);
        let alts = f.union(&Ty::Bottom, &dog);
        assert_eq!(alts, vec![(dog, Binding::new())]);
    }

    #[test]
    fn test_intersect_of_comparable_types() {
        let (f, cls, _) = factory();
        let dog = Ty::Class(cls.dog, vec![]);
        let animal = Ty::Class(cls.animal, vec![]);

        let alts = f.intersect(&dog, &animal);
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].0, dog);
    }

    #[test]
    fn test_intersect_of_unrelated_types_is_empty() {
        let (f, cls, _) = factory();
        let dog = Ty::Class(cls.dog, vec![]);
        let string = Ty::Class(cls.string, vec![]);
        assert!(f.intersect(&dog, &string).is_empty());
    }

    #[test]
    fn test_rise_with_wildcard_cooks_right_hand_var() {
        let (f, cls, mut tf) = factory();
        let v = tf.next();
        let string = Ty::Class(cls.string, vec![]);
        let left = Ty::Class(cls.list, vec![string.clone()]);
        let right = Ty::Class(cls.list, vec![Ty::Var(v)]);

        let mut addendum = vec![];
        let b = f.rise_with_wildcard(&left, &right, &mut addendum).unwrap();
        assert_eq!(b.get(v), Some(&Ty::super_wildcard(string)));
        assert!(addendum.is_empty());
    }

    #[test]
    fn test_rise_with_wildcard_emits_capture_constraint() {
        let (f, cls, _) = factory();
        let string = Ty::Class(cls.string, vec![]);
        let animal = Ty::Class(cls.animal, vec![]);
        let left = Ty::Class(cls.list, vec![string.clone()]);
        let right = Ty::Class(cls.list, vec![Ty::extends_wildcard(animal.clone())]);

        // plain rise demands structural equality at the argument
        assert_eq!(f.rise(&left, &right), None);

        let mut addendum = vec![];
        let b = f.rise_with_wildcard(&left, &right, &mut addendum).unwrap();
        assert!(b.is_empty());
        assert_eq!(addendum, vec![Constraint::new(string, animal)]);
    }
}
