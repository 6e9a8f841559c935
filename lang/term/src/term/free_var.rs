use std::fmt;
use std::rc::Rc;

use derivative::Derivative;
use fxhash::FxHashSet;

use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

use super::{Abstraction, Application, Atom, BoundVar, Term};

/// A metavariable standing for an unknown (sub)derivation or syntax node.
///
/// Identity is the pair of name and stamp: stamp 0 is reserved for variables
/// written by the user, all machine-generated variables carry a session-unique
/// positive stamp (see [crate::Session::fresh_var]).
#[derive(Debug, Clone, Derivative)]
#[derivative(Eq, PartialEq, Hash)]
pub struct FreeVar {
    pub name: String,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub ty: Rc<Term>,
    pub stamp: u64,
}

impl FreeVar {
    pub fn new(name: impl Into<String>, ty: Rc<Term>) -> Self {
        FreeVar { name: name.into(), ty, stamp: 0 }
    }

    pub(crate) fn with_stamp(name: impl Into<String>, ty: Rc<Term>, stamp: u64) -> Self {
        FreeVar { name: name.into(), ty, stamp }
    }

    pub fn ty(&self) -> Rc<Term> {
        self.ty.clone()
    }

    /// The result type of this variable, with all argument binders stripped.
    pub fn base_ty(&self) -> Rc<Term> {
        let mut ty = self.ty.clone();
        loop {
            let next = match &*ty {
                Term::Abstraction(abs) => abs.body().clone(),
                _ => break,
            };
            ty = next;
        }
        ty
    }

    /// The locally eta-long form: a function-typed variable `F` becomes
    /// `λx1…xn. F x1 … xn`. First-order variables are returned unchanged.
    pub fn to_eta_long(&self) -> Rc<Term> {
        let num_lambdas = self.ty.count_lambdas();
        if num_lambdas == 0 {
            return Rc::new(self.clone().into());
        }
        let mut args = Vec::with_capacity(num_lambdas);
        let mut arg_tys = Vec::with_capacity(num_lambdas);
        let mut ty = self.ty.clone();
        for i in (1..=num_lambdas).rev() {
            args.push(Rc::new(BoundVar::new(i as isize).into()));
            let (arg_ty, body) = match &*ty {
                Term::Abstraction(abs) => (abs.arg_ty.clone(), abs.body().clone()),
                _ => unreachable!("count_lambdas promised {num_lambdas} binders"),
            };
            arg_tys.push(arg_ty);
            ty = body;
        }
        let mut expanded: Rc<Term> = Rc::new(Application::new(self.clone().into(), args).into());
        for arg_ty in arg_tys.into_iter().rev() {
            expanded = Abstraction::make("x", arg_ty, expanded);
        }
        log::trace!("converted to eta long: {} to {}", self, expanded);
        expanded
    }
}

impl From<FreeVar> for Term {
    fn from(val: FreeVar) -> Self {
        Term::FreeVar(val)
    }
}

impl From<FreeVar> for Atom {
    fn from(val: FreeVar) -> Self {
        Atom::FreeVar(val)
    }
}

impl Shift for FreeVar {
    fn incr_free_debruijn_from(&self, _nested: usize, _by: isize) -> Rc<Term> {
        Rc::new(self.clone().into())
    }
}

impl Substitutable for FreeVar {
    fn subst<S: Substitution>(&self, by: &S, depth: usize) -> Rc<Term> {
        match by.lookup(self) {
            // The replacement is closed with respect to the binders we have
            // crossed, so its free indices move up by the current depth.
            Some(t) => t.incr_free_debruijn(depth as isize),
            None => Rc::new(self.clone().into()),
        }
    }
}

impl FreeVars for FreeVar {
    fn free_vars_mut(&self, fvs: &mut FxHashSet<FreeVar>) {
        fvs.insert(self.clone());
    }
}

impl Occurs for FreeVar {
    fn has_bound_var(&self, _i: isize) -> bool {
        false
    }

    fn has_bound_var_above(&self, _i: isize) -> bool {
        false
    }
}

impl fmt::Display for FreeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stamp == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}_{}", self.name, self.stamp)
        }
    }
}
