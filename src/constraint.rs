use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    error::SolveError,
    hierarchy::TyCtx,
    subst::{ApplySubst, Subst},
    ty::{Ty, TyVar, TyVarFactory},
};

/// `left <: right`. Immutable value; equality and hashing are structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    left: Ty,
    right: Ty,
}

impl Constraint {
    pub fn new(left: Ty, right: Ty) -> Constraint {
        Constraint { left, right }
    }

    pub fn left(&self) -> &Ty {
        &self.left
    }

    pub fn right(&self) -> &Ty {
        &self.right
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <: {}", self.left, self.right)
    }
}

impl ApplySubst for Constraint {
    fn apply_subst(self, subst: &Subst) -> Constraint {
        Constraint {
            left: self.left.apply_subst(subst),
            right: self.right.apply_subst(subst),
        }
    }
}

/// Constraint sets have set semantics: substitution can collapse two
/// constraints into one, which is exactly what we want.
pub type ConstraintSet = FnvHashSet<Constraint>;

impl ApplySubst for ConstraintSet {
    fn apply_subst(self, subst: &Subst) -> ConstraintSet {
        self.into_iter().map(|c| c.apply_subst(subst)).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Disables the degree-based pruning heuristic; the search then
    /// enumerates every alternative binding.
    pub exhaustive: bool,
    /// Allows reduction steps to bind variables to bounded wildcards.
    pub cook_wildcards: bool,
}

/// A constraint system ready for resolution: the class context, the
/// collected constraints and the set of variables to solve for. The
/// constraint-building caller is responsible for only referencing
/// variables minted through [`System::fresh_var`]; `add_subtype` enforces
/// this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct System {
    ctx: TyCtx,
    tf: TyVarFactory,
    vars: FnvHashSet<TyVar>,
    constraints: ConstraintSet,
    settings: Settings,
}

impl System {
    pub fn new(ctx: TyCtx, tf: TyVarFactory, settings: Settings) -> System {
        System {
            ctx,
            tf,
            vars: FnvHashSet::default(),
            constraints: ConstraintSet::default(),
            settings,
        }
    }

    pub fn fresh_var(&mut self) -> TyVar {
        let v = self.tf.next();
        self.vars.insert(v);
        v
    }

    pub fn add_subtype(&mut self, left: Ty, right: Ty) -> Result<(), SolveError> {
        for v in left.collect_tyvars().into_iter().chain(right.collect_tyvars()) {
            if !self.vars.contains(&v) {
                return Err(SolveError::unknown_var(v));
            }
        }
        self.constraints.insert(Constraint::new(left, right));
        Ok(())
    }

    pub fn ctx(&self) -> &TyCtx {
        &self.ctx
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn variables(&self) -> &FnvHashSet<TyVar> {
        &self.vars
    }

    pub(crate) fn into_parts(self) -> (TyCtx, FnvHashSet<TyVar>, ConstraintSet, Settings) {
        (self.ctx, self.vars, self.constraints, self.settings)
    }
}
