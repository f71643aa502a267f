use std::fmt::Display;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::SolveError,
    subst::{ApplySubst, Subst},
    ty::{Ty, TyVar, WildcardKind},
};

/// Interned class handle. Id 0 is always `java.lang.Object`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ClassId(u32);

impl ClassId {
    pub fn object() -> ClassId {
        ClassId(0)
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One class declaration: formal type parameters and the direct supertypes
/// expressed in terms of them. Classes with no declared supertype
/// implicitly extend Object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDef {
    name: String,
    params: Vec<TyVar>,
    supers: Vec<Ty>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TyVar] {
        &self.params
    }
}

/// The class-hierarchy context: lookup and type-term construction. Built by
/// the constraint-collecting caller, read-only during the search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TyCtx {
    classes: Vec<ClassDef>,
    names: FnvHashMap<String, ClassId>,
}

impl TyCtx {
    pub fn new() -> TyCtx {
        let mut ctx = TyCtx {
            classes: vec![],
            names: FnvHashMap::default(),
        };
        ctx.intern("java.lang.Object", vec![], vec![]);
        ctx
    }

    fn intern(&mut self, name: &str, params: Vec<TyVar>, supers: Vec<Ty>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassDef {
            name: name.to_string(),
            params,
            supers,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    pub fn add_class(
        &mut self,
        name: &str,
        params: Vec<TyVar>,
        supers: Vec<Ty>,
    ) -> Result<ClassId, SolveError> {
        if self.names.contains_key(name) {
            return Err(SolveError::duplicate_class(name));
        }
        Ok(self.intern(name, params, supers))
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.names.get(name).copied()
    }

    pub fn object(&self) -> Ty {
        Ty::Class(ClassId::object(), vec![])
    }

    /// Constructs `id<args>`, checking the argument count against the
    /// class declaration.
    pub fn class_ty(&self, id: ClassId, args: Vec<Ty>) -> Result<Ty, SolveError> {
        let def = self.class(id);
        if def.params.len() != args.len() {
            return Err(SolveError::arity_mismatch(
                def.name.clone(),
                def.params.len(),
                args.len(),
            ));
        }
        Ok(Ty::Class(id, args))
    }

    /// The direct supertypes of `id<args>`, with the formal parameters
    /// substituted by `args`.
    pub fn direct_supers(&self, id: ClassId, args: &[Ty]) -> Vec<Ty> {
        let def = self.class(id);
        if def.supers.is_empty() {
            return if id == ClassId::object() {
                vec![]
            } else {
                vec![self.object()]
            };
        }
        let sub = Subst::from_types(def.params.iter().copied(), args.iter().cloned());
        def.supers.iter().map(|s| s.clone().apply_subst(&sub)).collect()
    }

    /// Whether `sub` inherits (reflexively, transitively) from `sup`.
    pub fn is_descendant(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup || sup == ClassId::object() {
            return true;
        }
        let mut queue = vec![sub];
        let mut seen = vec![sub];
        while let Some(c) = queue.pop() {
            for s in &self.class(c).supers {
                if let Ty::Class(sc, _) = s {
                    if *sc == sup {
                        return true;
                    }
                    if !seen.contains(sc) {
                        seen.push(*sc);
                        queue.push(*sc);
                    }
                }
            }
        }
        false
    }

    /// Views `id<args>` as its ancestor `ancestor`, composing the
    /// parameter substitutions along the inheritance path. Returns the
    /// ancestor type with fully substituted arguments, or `None` if
    /// `ancestor` is not reachable.
    pub fn ancestor_view(&self, id: ClassId, args: &[Ty], ancestor: ClassId) -> Option<Ty> {
        if id == ancestor {
            return Some(Ty::Class(id, args.to_vec()));
        }
        let mut queue = std::collections::VecDeque::new();
        let mut seen = vec![id];
        queue.push_back(Ty::Class(id, args.to_vec()));
        while let Some(view) = queue.pop_front() {
            if let Ty::Class(c, cargs) = &view {
                for s in self.direct_supers(*c, cargs) {
                    if let Ty::Class(sc, _) = &s {
                        if *sc == ancestor {
                            return Some(s);
                        }
                        if !seen.contains(sc) {
                            seen.push(*sc);
                            queue.push_back(s);
                        }
                    }
                }
            }
        }
        None
    }

    /// Every supertype view of `ty` including `ty` itself, most specific
    /// first. Arrays are covariant; a wildcard contributes the views of
    /// its bound.
    pub fn ancestors(&self, ty: &Ty) -> Vec<Ty> {
        match ty {
            Ty::Class(id, args) => {
                let mut views = vec![];
                let mut queue = std::collections::VecDeque::new();
                queue.push_back(Ty::Class(*id, args.clone()));
                while let Some(view) = queue.pop_front() {
                    if views.contains(&view) {
                        continue;
                    }
                    if let Ty::Class(c, cargs) = &view {
                        for s in self.direct_supers(*c, cargs) {
                            queue.push_back(s);
                        }
                    }
                    views.push(view);
                }
                views
            }
            Ty::Array(elem) => {
                let mut views: Vec<Ty> = self
                    .ancestors(elem)
                    .into_iter()
                    .map(Ty::array)
                    .collect();
                views.push(self.object());
                views
            }
            Ty::Wildcard(WildcardKind::Extends, b) => self.ancestors(b),
            Ty::Wildcard(WildcardKind::Super, _) => vec![ty.clone(), self.object()],
            Ty::Bottom | Ty::Var(_) => vec![ty.clone()],
        }
    }

    /// Checks `a <: b` under the hierarchy. Variables are related only to
    /// themselves; this is the post-substitution check used to validate
    /// solutions.
    pub fn is_subtype(&self, a: &Ty, b: &Ty) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Ty::Bottom, _) => true,
            (_, Ty::Class(c, args)) if *c == ClassId::object() && args.is_empty() => true,
            (Ty::Wildcard(WildcardKind::Extends, bound), t) => self.is_subtype(bound, t),
            (t, Ty::Wildcard(WildcardKind::Extends, bound)) => self.is_subtype(t, bound),
            (t, Ty::Wildcard(WildcardKind::Super, bound)) => self.is_subtype(bound, t),
            (Ty::Array(x), Ty::Array(y)) => self.is_subtype(x, y),
            (Ty::Class(c1, a1), Ty::Class(c2, _)) => match self.ancestor_view(*c1, a1, *c2) {
                Some(Ty::Class(_, va)) => {
                    if let Ty::Class(_, a2) = b {
                        va.len() == a2.len()
                            && va.iter().zip(a2).all(|(p, q)| self.arg_admits(q, p))
                    } else {
                        false
                    }
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn arg_admits(&self, pattern: &Ty, arg: &Ty) -> bool {
        if pattern == arg {
            return true;
        }
        match pattern {
            Ty::Wildcard(WildcardKind::Extends, bound) => self.is_subtype(arg, bound),
            Ty::Wildcard(WildcardKind::Super, bound) => self.is_subtype(bound, arg),
            _ => false,
        }
    }

    /// Every type `t` with `lo <: t <: hi`, walking the supertype chain
    /// upward from `lo`. Both endpoints are always included.
    pub fn type_range(&self, hi: &Ty, lo: &Ty) -> Vec<Ty> {
        let mut range = vec![lo.clone()];
        if hi != lo {
            range.push(hi.clone());
        }
        self.fill_type_range(hi, lo, &mut range);
        range
    }

    fn fill_type_range(&self, hi: &Ty, lo: &Ty, range: &mut Vec<Ty>) {
        match (hi, lo) {
            (Ty::Class(hc, _), Ty::Class(lc, largs)) if hc != lc => {
                for s in self.direct_supers(*lc, largs) {
                    if let Ty::Class(sc, _) = &s {
                        if self.is_descendant(*sc, *hc) {
                            if !range.contains(&s) {
                                range.push(s.clone());
                            }
                            self.fill_type_range(hi, &s, range);
                        }
                    }
                }
            }
            (Ty::Array(he), Ty::Array(le)) => {
                for t in self.type_range(he, le) {
                    let arr = Ty::array(t);
                    if !range.contains(&arr) {
                        range.push(arr);
                    }
                }
            }
            _ => {}
        }
    }
}

impl Default for TyCtx {
    fn default() -> Self {
        TyCtx::new()
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::ty::TyVarFactory;

    pub(crate) struct Classes {
        pub animal: ClassId,
        pub dog: ClassId,
        pub string: ClassId,
        pub iterable: ClassId,
        pub collection: ClassId,
        pub list: ClassId,
        pub array_list: ClassId,
    }

    /// Object; Animal; Dog <: Animal; String;
    /// ArrayList<E> <: List<E> <: Collection<E> <: Iterable<E>.
    pub(crate) fn hierarchy() -> (TyCtx, TyVarFactory, Classes) {
        let mut ctx = TyCtx::new();
        let mut tf = TyVarFactory::new();

        let animal = ctx.add_class("Animal", vec![], vec![]).unwrap();
        let dog = ctx
            .add_class("Dog", vec![], vec![Ty::Class(animal, vec![])])
            .unwrap();
        let string = ctx.add_class("String", vec![], vec![]).unwrap();

        let e0 = tf.next();
        let iterable = ctx.add_class("Iterable", vec![e0], vec![]).unwrap();
        let e1 = tf.next();
        let collection = ctx
            .add_class(
                "Collection",
                vec![e1],
                vec![Ty::Class(iterable, vec![Ty::Var(e1)])],
            )
            .unwrap();
        let e2 = tf.next();
        let list = ctx
            .add_class("List", vec![e2], vec![Ty::Class(collection, vec![Ty::Var(e2)])])
            .unwrap();
        let e3 = tf.next();
        let array_list = ctx
            .add_class("ArrayList", vec![e3], vec![Ty::Class(list, vec![Ty::Var(e3)])])
            .unwrap();

        (
            ctx,
            tf,
            Classes {
                animal,
                dog,
                string,
                iterable,
                collection,
                list,
                array_list,
            },
        )
    }
}

#[cfg(test)]
mod hierarchy_tests {
    use super::fixture::hierarchy;
    use super::*;

    #[test]
    fn test_ancestor_view_substitutes_args() {
        let (ctx, _, cls) = hierarchy();
        let string = Ty::Class(cls.string, vec![]);
        let view = ctx
            .ancestor_view(cls.array_list, &[string.clone()], cls.iterable)
            .unwrap();
        assert_eq!(view, Ty::Class(cls.iterable, vec![string]));
    }

    #[test]
    fn test_is_descendant_reflexive_and_transitive() {
        let (ctx, _, cls) = hierarchy();
        assert!(ctx.is_descendant(cls.dog, cls.dog));
        assert!(ctx.is_descendant(cls.dog, cls.animal));
        assert!(ctx.is_descendant(cls.array_list, cls.iterable));
        assert!(!ctx.is_descendant(cls.animal, cls.dog));
    }

    #[test]
    fn test_type_range_walks_supertype_chain() {
        let (ctx, _, cls) = hierarchy();
        let string = Ty::Class(cls.string, vec![]);
        let lo = Ty::Class(cls.array_list, vec![string.clone()]);
        let hi = Ty::Class(cls.collection, vec![string.clone()]);
        let range = ctx.type_range(&hi, &lo);
        assert!(range.contains(&lo));
        assert!(range.contains(&hi));
        assert!(range.contains(&Ty::Class(cls.list, vec![string])));
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn test_type_range_endpoints_only_when_unrelated() {
        let (ctx, _, cls) = hierarchy();
        let dog = Ty::Class(cls.dog, vec![]);
        let animal = Ty::Class(cls.animal, vec![]);
        // walking up from `animal` never reaches below `dog`
        assert_eq!(ctx.type_range(&dog, &animal), vec![animal, dog]);
    }

    #[test]
    fn test_is_subtype_with_wildcard_args() {
        let (ctx, _, cls) = hierarchy();
        let dog = Ty::Class(cls.dog, vec![]);
        let animal = Ty::Class(cls.animal, vec![]);
        let list_dog = Ty::Class(cls.list, vec![dog.clone()]);
        let coll_ext_animal =
            Ty::Class(cls.collection, vec![Ty::extends_wildcard(animal.clone())]);
        assert!(ctx.is_subtype(&list_dog, &coll_ext_animal));
        assert!(!ctx.is_subtype(&list_dog, &Ty::Class(cls.collection, vec![animal])));
    }

    #[test]
    fn test_class_ty_arity_check() {
        let (ctx, _, cls) = hierarchy();
        assert!(ctx.class_ty(cls.list, vec![]).is_err());
        assert!(ctx.class_ty(cls.dog, vec![]).is_ok());
    }
}
