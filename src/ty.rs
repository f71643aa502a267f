use std::fmt::Display;

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    hierarchy::ClassId,
    subst::{ApplySubst, Subst},
    utils::join,
};

/// A type variable to be solved for. Ids are dense and globally unique
/// within one constraint system; they double as graph node indices in the
/// cycle collapser.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TyVar(pub u32);

impl Display for TyVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Mints type variables. One factory per constraint system; class formal
/// parameters and solver variables share the id space.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TyVarFactory {
    value: u32,
}

impl TyVarFactory {
    pub fn new() -> TyVarFactory {
        TyVarFactory { value: 0 }
    }

    pub fn skip_to(&mut self, value: u32) {
        self.value = value;
    }

    pub fn next(&mut self) -> TyVar {
        let v = self.value;
        self.value += 1;
        TyVar(v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WildcardKind {
    Extends,
    Super,
}

/// A Java-generics-style type term.
///
/// `Bottom` is the universal subtype; it is the fallback image for
/// variables the search cannot pin down. `Wildcard` is always bounded;
/// the unbounded `?` is `? extends Object`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Class(ClassId, Vec<Ty>),
    Array(Box<Ty>),
    Wildcard(WildcardKind, Box<Ty>),
    Bottom,
    Var(TyVar),
}

impl Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Class(c, args) => {
                if args.is_empty() {
                    write!(f, "{}", c)
                } else {
                    write!(f, "{}<{}>", c, join(args, ", "))
                }
            }
            Ty::Array(elem) => write!(f, "{}[]", elem),
            Ty::Wildcard(WildcardKind::Extends, b) => write!(f, "? extends {}", b),
            Ty::Wildcard(WildcardKind::Super, b) => write!(f, "? super {}", b),
            Ty::Bottom => write!(f, "bottom"),
            Ty::Var(v) => write!(f, "{}", v),
        }
    }
}

impl Ty {
    pub fn array(elem: Ty) -> Ty {
        Ty::Array(Box::new(elem))
    }

    pub fn extends_wildcard(bound: Ty) -> Ty {
        Ty::Wildcard(WildcardKind::Extends, Box::new(bound))
    }

    pub fn super_wildcard(bound: Ty) -> Ty {
        Ty::Wildcard(WildcardKind::Super, Box::new(bound))
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Ty::Var(_))
    }

    pub fn as_var(&self) -> Option<TyVar> {
        if let Ty::Var(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Ty::Wildcard(..))
    }

    /// Collects the variables of this term in first-occurrence order.
    pub fn collect_tyvars(&self) -> Vec<TyVar> {
        let mut vars = vec![];
        self.collect_tyvars_into(&mut vars);
        vars
    }

    fn collect_tyvars_into(&self, vars: &mut Vec<TyVar>) {
        match self {
            Ty::Var(v) => {
                if !vars.contains(v) {
                    vars.push(*v);
                }
            }
            Ty::Class(_, args) => {
                for a in args {
                    a.collect_tyvars_into(vars);
                }
            }
            Ty::Array(elem) => elem.collect_tyvars_into(vars),
            Ty::Wildcard(_, b) => b.collect_tyvars_into(vars),
            Ty::Bottom => {}
        }
    }

    pub fn free_vars(&self) -> FnvHashSet<TyVar> {
        self.collect_tyvars().into_iter().collect()
    }

    pub fn contains_var(&self, var: TyVar) -> bool {
        match self {
            Ty::Var(v) => *v == var,
            Ty::Class(_, args) => args.iter().any(|a| a.contains_var(var)),
            Ty::Array(elem) => elem.contains_var(var),
            Ty::Wildcard(_, b) => b.contains_var(var),
            Ty::Bottom => false,
        }
    }

    pub fn binds_tyvars(&self) -> bool {
        match self {
            Ty::Var(_) => true,
            Ty::Class(_, args) => args.iter().any(|a| a.binds_tyvars()),
            Ty::Array(elem) => elem.binds_tyvars(),
            Ty::Wildcard(_, b) => b.binds_tyvars(),
            Ty::Bottom => false,
        }
    }
}

impl ApplySubst for Ty {
    fn apply_subst(self, subst: &Subst) -> Ty {
        match self {
            Ty::Var(v) => subst.get(&v).cloned().unwrap_or(Ty::Var(v)),
            Ty::Class(c, args) => Ty::Class(c, args.apply_subst(subst)),
            Ty::Array(elem) => Ty::Array(elem.apply_subst(subst)),
            Ty::Wildcard(k, b) => Ty::Wildcard(k, b.apply_subst(subst)),
            Ty::Bottom => Ty::Bottom,
        }
    }
}

#[cfg(test)]
mod ty_tests {
    use super::*;

    #[test]
    fn test_collect_tyvars_dedups() {
        let ty = Ty::Class(
            ClassId::object(),
            vec![Ty::Var(tvar!(0)), Ty::array(Ty::Var(tvar!(0))), Ty::Var(tvar!(2))],
        );
        assert_eq!(ty.collect_tyvars(), vec![tvar!(0), tvar!(2)]);
    }

    #[test]
    fn test_apply_subst_structural() {
        let ty = Ty::array(Ty::Wildcard(
            WildcardKind::Extends,
            Box::new(Ty::Var(tvar!(1))),
        ));
        let sub = subst! { tvar!(1) => Ty::Bottom };
        assert_eq!(
            ty.apply_subst(&sub),
            Ty::array(Ty::extends_wildcard(Ty::Bottom))
        );
    }
}
