use std::rc::Rc;

use crate::term::{FreeVar, Term};

/// Trait for entities which can be used as a substitution.
/// In order to be used as a substitution an entity has to provide a method
/// to query it for a replacement for a given free variable.
///
/// The concrete solved-form substitution produced by the unifier lives
/// downstream; keeping the lookup interface here lets every term operation
/// stay generic over it.
pub trait Substitution {
    fn lookup(&self, var: &FreeVar) -> Option<Rc<Term>>;
}

/// A trait for all entities to which we can apply a substitution.
///
/// `depth` counts the binders crossed so far; a replacement fetched from the
/// substitution is closed with respect to those binders and therefore has its
/// free indices shifted up by `depth` on the way in.
pub trait Substitutable {
    fn subst<S: Substitution>(&self, by: &S, depth: usize) -> Rc<Term>;

    /// Apply a substitution at the top level.
    fn substitute<S: Substitution>(&self, by: &S) -> Rc<Term>
    where
        Self: Sized,
    {
        self.subst(by, 0)
    }
}
