use crate::ty::TyVar;

/// Precondition violations on the engine's input surface. These are caller
/// bugs caught before the search runs; inconsistency *during* the search is
/// never an error (a branch simply produces no child).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveErrorKind {
    UnknownTypeVar(TyVar),
    DuplicateClass(String),
    ArityMismatch {
        class: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveError {
    pub kind: SolveErrorKind,
}

impl SolveError {
    pub fn unknown_var(var: TyVar) -> Self {
        Self {
            kind: SolveErrorKind::UnknownTypeVar(var),
        }
    }

    pub fn duplicate_class<S: Into<String>>(name: S) -> Self {
        Self {
            kind: SolveErrorKind::DuplicateClass(name.into()),
        }
    }

    pub fn arity_mismatch<S: Into<String>>(class: S, expected: usize, found: usize) -> Self {
        Self {
            kind: SolveErrorKind::ArityMismatch {
                class: class.into(),
                expected,
                found,
            },
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            SolveErrorKind::UnknownTypeVar(v) => {
                format!("type variable `{}` is not part of this system", v)
            }
            SolveErrorKind::DuplicateClass(name) => {
                format!("class `{}` is already defined", name)
            }
            SolveErrorKind::ArityMismatch {
                class,
                expected,
                found,
            } => format!(
                "class `{}` takes {} type argument(s), but {} were given",
                class, expected, found
            ),
        }
    }
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SolveError {}
