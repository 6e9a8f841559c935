//! Higher-order pattern unification for the term language.
//!
//! [unify] solves equations between terms with free metavariables and
//! produces a [Substitution] in solved form; [instance_of] additionally
//! checks that the first term generalizes the second. Problems outside the
//! Miller pattern fragment are reported as [UnifyError::Incomplete] rather
//! than solved unsoundly.

pub mod result;
pub mod subst;
pub mod unify;

pub use result::{UnifyError, UnifyResult};
pub use subst::{fresh_substitution, Substitution};
pub use unify::{instance_of, unify};
