use std::rc::Rc;

use miette::Diagnostic;
use thiserror::Error;

use metalf_term::{FreeVar, Term};

/// The result type specialized to unification errors.
pub type UnifyResult<T = ()> = Result<T, Box<UnifyError>>;

/// All the ways a unification problem can be rejected.
///
/// Callers must distinguish [UnifyError::Incomplete] from the other variants:
/// [UnifyError::Failed] and [UnifyError::OccursCheck] prove that no unifier
/// exists, while [UnifyError::Incomplete] only says that the problem is
/// outside the decidable fragment the solver handles. A proof checker may
/// discard a case on the former, but never on the latter.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum UnifyError {
    #[error("The following terms are not unifiable:\n  1: {lhs}\n  2: {rhs}\n")]
    #[diagnostic(code("U-001"))]
    Failed { lhs: String, rhs: String },
    #[error("Cannot automatically decide whether {lhs} and {rhs} unify")]
    #[diagnostic(
        code("U-002"),
        help("The problem is outside the pattern fragment; this is not a proof of disequality.")
    )]
    Incomplete { lhs: String, rhs: String },
    #[error("{var} occurs in {term}")]
    #[diagnostic(code("U-003"))]
    OccursCheck { var: String, term: String },
}

impl UnifyError {
    pub fn failed(lhs: &Term, rhs: &Term) -> Box<Self> {
        Self::Failed { lhs: lhs.to_string(), rhs: rhs.to_string() }.into()
    }

    pub fn incomplete(lhs: &Term, rhs: &Term) -> Box<Self> {
        Self::Incomplete { lhs: lhs.to_string(), rhs: rhs.to_string() }.into()
    }

    pub fn occurs_check(var: &FreeVar, term: &Rc<Term>) -> Box<Self> {
        Self::OccursCheck { var: var.to_string(), term: term.to_string() }.into()
    }

    /// Whether this error merely reports that the solver gave up, as opposed
    /// to a definite unification failure.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, UnifyError::Incomplete { .. })
    }
}
