//! Dependently typed lambda terms in spine form, used as the internal
//! representation of syntax, judgments and derivations.
//!
//! The [term] module defines the term language itself, [traits] the
//! structural operations over it, [subordination] the occurs-in relation
//! between type families, and [session] the per-check state that stamps
//! fresh variables.

pub mod build;
pub mod session;
pub mod subordination;
pub mod term;
pub mod traits;

pub use session::Session;
pub use subordination::Subordination;
pub use term::{
    arg_types, arg_types_n, types_compatible, wrap_with_abstractions, wrap_with_lambdas,
    wrap_with_lambdas_named, wrapping_abstractions, Abstraction, Application, Atom, BoundVar,
    Constant, FreeVar, Term,
};
pub use traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};
