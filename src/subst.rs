use std::{
    iter::FromIterator,
    ops::{Deref, DerefMut},
};

use fnv::FnvHashMap;

use crate::ty::{Ty, TyVar};

/// A substitution from type variables to type terms. Application is a
/// single structural pass; chains (`T0 -> T1 -> Int`) are flattened by
/// binding composition, not by `apply_subst`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Subst(FnvHashMap<TyVar, Ty>);

impl Deref for Subst {
    type Target = FnvHashMap<TyVar, Ty>;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Subst {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for Subst {
    type Item = (TyVar, Ty);
    type IntoIter = std::collections::hash_map::IntoIter<TyVar, Ty>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(TyVar, Ty)> for Subst {
    fn from_iter<T: IntoIterator<Item = (TyVar, Ty)>>(iter: T) -> Self {
        Subst(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for Subst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .finish()
    }
}

impl std::fmt::Display for Subst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Subst {
    pub fn new() -> Subst {
        Subst(FnvHashMap::default())
    }

    pub fn from_types<P, A>(params: P, args: A) -> Subst
    where
        P: IntoIterator<Item = TyVar>,
        A: IntoIterator<Item = Ty>,
    {
        params.into_iter().zip(args.into_iter()).collect()
    }
}

pub trait ApplySubst<T = Self> {
    fn apply_subst(self, subst: &Subst) -> T;
}

impl<T: ApplySubst> ApplySubst for Box<T> {
    fn apply_subst(self, subst: &Subst) -> Box<T> {
        Box::new((*self).apply_subst(subst))
    }
}

impl<T: ApplySubst> ApplySubst for Option<T> {
    fn apply_subst(self, subst: &Subst) -> Self {
        self.map(|t| t.apply_subst(subst))
    }
}

impl<T: ApplySubst> ApplySubst for Vec<T> {
    fn apply_subst(self, subst: &Subst) -> Vec<T> {
        self.into_iter().map(|x| x.apply_subst(subst)).collect()
    }
}
