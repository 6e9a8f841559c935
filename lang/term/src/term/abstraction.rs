use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

use super::{Application, Atom, FreeVar, Term};

/// A typed binder `λx:T. body`. The bound variable is addressed by de Bruijn
/// index inside `body`; `arg_name` is kept for printing only and carries no
/// semantic weight.
///
/// Terms never contain an eta-redex: the only way to build an abstraction is
/// [Abstraction::make], which eta-contracts `λx. F e1 … en x` back to
/// `F e1 … en` whenever that is legal.
#[derive(Debug, Clone)]
pub struct Abstraction {
    pub arg_name: String,
    pub arg_ty: Rc<Term>,
    body: Rc<Term>,
}

impl Abstraction {
    /// Smart constructor. Returns the eta-contracted head instead of a fresh
    /// binder when the body is a not-fully-applied free-variable application
    /// whose last argument is the variable being bound and the rest of the
    /// application does not use it.
    pub fn make(arg_name: impl Into<String>, arg_ty: Rc<Term>, body: Rc<Term>) -> Rc<Term> {
        if let Term::Application(app) = &*body {
            if !app.is_fully_applied_free_var() && matches!(app.head(), Atom::FreeVar(_)) {
                let args = app.args();
                if matches!(&*args[args.len() - 1], Term::BoundVar(bv) if bv.index == 1) {
                    let contracted: Rc<Term> = if args.len() == 1 {
                        Rc::new(app.head().clone().into())
                    } else {
                        let mut rest = args.to_vec();
                        rest.pop();
                        Rc::new(Application::new(app.head().clone(), rest).into())
                    };
                    if !contracted.has_bound_var(1) {
                        return contracted.incr_free_debruijn_from(0, -1);
                    }
                }
            }
        }
        Rc::new(Abstraction { arg_name: arg_name.into(), arg_ty, body }.into())
    }

    /// Build a binder without attempting eta-contraction. Needed when the
    /// contracted form would not be the term we mean, as when recovering the
    /// reverse of an argument permutation.
    pub(crate) fn raw(arg_name: String, arg_ty: Rc<Term>, body: Rc<Term>) -> Self {
        Abstraction { arg_name, arg_ty, body }
    }

    pub fn body(&self) -> &Rc<Term> {
        &self.body
    }

    pub(crate) fn apply(&self, args: &[Rc<Term>], which_applied: usize) -> Rc<Term> {
        let which_applied = which_applied + 1;
        let shifted: Vec<Rc<Term>> = args.iter().map(|t| t.incr_free_debruijn(1)).collect();
        let new_body = self.body.apply(&shifted, which_applied);
        if which_applied <= args.len() {
            // we just consumed an argument; the binder is gone
            new_body.incr_free_debruijn(-1)
        } else {
            let new_ty = self.arg_ty.apply(args, which_applied - 1);
            Abstraction::make(self.arg_name.clone(), new_ty, new_body)
        }
    }
}

impl PartialEq for Abstraction {
    fn eq(&self, other: &Self) -> bool {
        // the argument name never matters, and argument types are compared
        // with the relaxed equality so the wildcard type unifies freely
        self.body == other.body && self.arg_ty.type_equals(&other.arg_ty)
    }
}

impl Eq for Abstraction {}

impl Hash for Abstraction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // must stay consistent with the relaxed equality on arg_ty
        self.body.hash(state);
    }
}

impl From<Abstraction> for Term {
    fn from(val: Abstraction) -> Self {
        Term::Abstraction(val)
    }
}

impl Shift for Abstraction {
    fn incr_free_debruijn_from(&self, nested: usize, by: isize) -> Rc<Term> {
        let new_body = self.body.incr_free_debruijn_from(nested + 1, by);
        let new_ty = self.arg_ty.incr_free_debruijn_from(nested, by);
        Abstraction::make(self.arg_name.clone(), new_ty, new_body)
    }
}

impl Substitutable for Abstraction {
    fn subst<S: Substitution>(&self, by: &S, depth: usize) -> Rc<Term> {
        let new_body = self.body.subst(by, depth + 1);
        let new_ty = self.arg_ty.subst(by, depth);
        Abstraction::make(self.arg_name.clone(), new_ty, new_body)
    }
}

impl FreeVars for Abstraction {
    fn free_vars_mut(&self, fvs: &mut FxHashSet<FreeVar>) {
        self.body.free_vars_mut(fvs);
        self.arg_ty.free_vars_mut(fvs);
    }
}

impl Occurs for Abstraction {
    fn has_bound_var(&self, i: isize) -> bool {
        self.body.has_bound_var(i + 1) || self.arg_ty.has_bound_var(i)
    }

    fn has_bound_var_above(&self, i: isize) -> bool {
        self.body.has_bound_var_above(i + 1) || self.arg_ty.has_bound_var_above(i)
    }
}

impl fmt::Display for Abstraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\{}:{}. {}", self.arg_name, self.arg_ty, self.body)
    }
}
