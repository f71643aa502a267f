#[macro_use]
pub mod macros;

pub mod binding;
pub mod constraint;
pub mod error;
pub mod hierarchy;
pub mod solve;
pub mod subst;
pub mod ty;
pub mod utils;

pub use binding::{Binding, BindingFactory};
pub use constraint::{Constraint, ConstraintSet, Settings, System};
pub use error::{SolveError, SolveErrorKind};
pub use hierarchy::{ClassDef, ClassId, TyCtx};
pub use solve::{
    collapse_cyclic_vars, DefaultRanking, LogObserver, NullObserver, RankingPolicy, Resolver,
    SearchObserver, SolutionHolder,
};
pub use subst::{ApplySubst, Subst};
pub use ty::{Ty, TyVar, TyVarFactory, WildcardKind};
