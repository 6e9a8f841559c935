use std::rc::Rc;

use crate::term::Term;

/// De-Bruijn shifting
///
/// When we manipulate terms using de Bruijn notation we often have to change
/// the de Bruijn indices of the variables inside a term. Indices are 1-based:
/// an index is free at a given nesting depth iff it is strictly greater than
/// the number of binders crossed so far.
///
/// Simplified example for the untyped lambda calculus "e := n | λ_. e | e e":
/// - n.incr_free_debruijn_from(nested, by) = if n > nested { n + by } else { n }
/// - (λ_. e).incr_free_debruijn_from(nested, by) = λ_. e.incr_free_debruijn_from(nested + 1, by)
/// - (e1 e2).incr_free_debruijn_from(nested, by) = applied to both sides
///
/// Indices may transiently become non-positive while a capturing substitution
/// is being assembled, which is why they are signed.
pub trait Shift {
    /// Shift every free index in `self` by `by`, treating the first `nested`
    /// binders as already crossed.
    fn incr_free_debruijn_from(&self, nested: usize, by: isize) -> Rc<Term>;

    /// Shift all free indices in `self` by `by`.
    fn incr_free_debruijn(&self, by: isize) -> Rc<Term> {
        self.incr_free_debruijn_from(0, by)
    }
}
