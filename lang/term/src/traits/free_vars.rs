use fxhash::FxHashSet;

use crate::term::FreeVar;

/// Collecting the free variables of a term.
///
/// Bound variables that escape their binders are *not* reported here; only
/// genuine metavariables are.
pub trait FreeVars {
    fn free_vars_mut(&self, fvs: &mut FxHashSet<FreeVar>);

    fn free_vars(&self) -> FxHashSet<FreeVar>
    where
        Self: Sized,
    {
        let mut fvs = FxHashSet::default();
        self.free_vars_mut(&mut fvs);
        fvs
    }
}
