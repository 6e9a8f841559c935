use std::fmt;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

use super::{FreeVar, Term};

/// A bound variable occurrence, represented by a 1-based de Bruijn index:
/// index 1 refers to the innermost enclosing binder.
///
/// The index is signed because capturing substitutions shift indices below
/// zero while they are being assembled; a fully built term only contains
/// positive indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundVar {
    pub index: isize,
}

impl BoundVar {
    pub fn new(index: isize) -> Self {
        BoundVar { index }
    }

    pub(crate) fn apply(&self, args: &[Rc<Term>], which_applied: usize) -> Rc<Term> {
        assert!(
            which_applied >= args.len(),
            "application walked past its own arguments"
        );
        let arg_index = which_applied as isize - self.index;
        if arg_index >= 0 && (arg_index as usize) < args.len() {
            args[arg_index as usize].clone()
        } else {
            Rc::new(self.clone().into())
        }
    }
}

impl From<BoundVar> for Term {
    fn from(val: BoundVar) -> Self {
        Term::BoundVar(val)
    }
}

impl Shift for BoundVar {
    fn incr_free_debruijn_from(&self, nested: usize, by: isize) -> Rc<Term> {
        if self.index <= nested as isize && self.index > 0 {
            Rc::new(self.clone().into())
        } else {
            Rc::new(BoundVar::new(self.index + by).into())
        }
    }
}

impl Substitutable for BoundVar {
    fn subst<S: Substitution>(&self, _by: &S, _depth: usize) -> Rc<Term> {
        Rc::new(self.clone().into())
    }
}

impl FreeVars for BoundVar {
    fn free_vars_mut(&self, _fvs: &mut FxHashSet<FreeVar>) {}
}

impl Occurs for BoundVar {
    fn has_bound_var(&self, i: isize) -> bool {
        self.index == i
    }

    fn has_bound_var_above(&self, i: isize) -> bool {
        self.index > i
    }
}

impl fmt::Display for BoundVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.index)
    }
}
