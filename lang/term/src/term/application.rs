use std::fmt;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

use super::{Atom, FreeVar, Term};

/// An atom applied to one or more arguments. The head is always an [Atom]:
/// beta-redexes are reduced away by [Term::apply] before an application is
/// built, and nested applications are flattened into one argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Application {
    head: Atom,
    args: Vec<Rc<Term>>,
}

impl Application {
    /// Build an application, converting any function-typed free-variable
    /// argument to its eta-long form and checking that argument types line up
    /// with the head's type. Both an empty argument list and an ill-typed
    /// application are bugs in the caller and panic.
    pub fn new(head: Atom, args: Vec<Rc<Term>>) -> Self {
        assert!(!args.is_empty(), "empty application args");
        let needs_eta_long = args.iter().any(|arg| {
            matches!(&**arg, Term::FreeVar(v) if v.ty.count_lambdas() > 0)
        });
        let args = if needs_eta_long {
            args.iter().map(|arg| arg.to_eta_long()).collect()
        } else {
            args
        };
        let app = Application { head, args };
        app.get_type(&mut Vec::new()); // make sure the types are OK
        app
    }

    pub fn head(&self) -> &Atom {
        &self.head
    }

    pub fn args(&self) -> &[Rc<Term>] {
        &self.args
    }

    /// Whether this is a Miller pattern: a free variable applied to distinct
    /// bound variables.
    pub fn is_pattern(&self) -> bool {
        if !matches!(self.head, Atom::FreeVar(_)) {
            return false;
        }
        let mut seen = FxHashSet::default();
        for arg in &self.args {
            match &**arg {
                Term::BoundVar(bv) => {
                    if self.args.len() >= 2 && !seen.insert(bv.index) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Whether the head is a free variable that has received as many
    /// arguments as its type has binders.
    pub fn is_fully_applied_free_var(&self) -> bool {
        match &self.head {
            Atom::FreeVar(v) => self.args.len() == v.ty.count_lambdas(),
            Atom::Constant(_) => false,
        }
    }

    pub(crate) fn apply(&self, other_args: &[Rc<Term>], which_applied: usize) -> Rc<Term> {
        let mut new_args = self.args.clone();
        if which_applied > 0 {
            let consumed = other_args.len().min(which_applied);
            for arg in &mut new_args {
                *arg = arg.apply(&other_args[..consumed], which_applied);
            }
            // the head is an atom, so applying the consumed prefix to it is a no-op
        }
        let rest = other_args.len().min(which_applied);
        new_args.extend(other_args[rest..].iter().cloned());
        Rc::new(Application::new(self.head.clone(), new_args).into())
    }

    pub(crate) fn get_type(&self, bindings: &mut Vec<(String, Rc<Term>)>) -> Rc<Term> {
        let mut fun_ty = self.head.ty();
        for arg in &self.args {
            let (expected, rest) = match &*fun_ty {
                Term::Abstraction(abs) => (abs.arg_ty.clone(), abs.body().clone()),
                _ => panic!(
                    "applied {} arguments to {} of type {}",
                    self.args.len(),
                    self.head,
                    self.head.ty()
                ),
            };
            let actual = arg.get_type(bindings);
            // a declared argument type that mentions metavariables is
            // dependent; instantiating it is unification's job, so the
            // equality check is deferred
            assert!(
                actual.type_equals(&expected) || !expected.free_vars().is_empty(),
                "types do not match when applying {actual} to arg type {expected} in function {}",
                self.head
            );
            fun_ty = rest;
        }
        fun_ty
    }
}

impl From<Application> for Term {
    fn from(val: Application) -> Self {
        Term::Application(val)
    }
}

impl Shift for Application {
    fn incr_free_debruijn_from(&self, nested: usize, by: isize) -> Rc<Term> {
        // the head is a constant or free variable and cannot be affected
        let new_args = self.args.iter().map(|a| a.incr_free_debruijn_from(nested, by)).collect();
        Rc::new(Application::new(self.head.clone(), new_args).into())
    }
}

impl Substitutable for Application {
    fn subst<S: Substitution>(&self, by: &S, depth: usize) -> Rc<Term> {
        let new_head: Rc<Term> = match &self.head {
            Atom::Constant(c) => Rc::new(c.clone().into()),
            Atom::FreeVar(v) => v.subst(by, depth),
        };
        let new_args: Vec<Rc<Term>> = self.args.iter().map(|a| a.subst(by, depth)).collect();
        // if the head was substituted by an abstraction this beta-reduces
        new_head.apply(&new_args, 0)
    }
}

impl FreeVars for Application {
    fn free_vars_mut(&self, fvs: &mut FxHashSet<FreeVar>) {
        if let Atom::FreeVar(v) = &self.head {
            fvs.insert(v.clone());
        }
        for arg in &self.args {
            arg.free_vars_mut(fvs);
        }
    }
}

impl Occurs for Application {
    fn has_bound_var(&self, i: isize) -> bool {
        self.args.iter().any(|a| a.has_bound_var(i))
    }

    fn has_bound_var_above(&self, i: isize) -> bool {
        self.args.iter().any(|a| a.has_bound_var_above(i))
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.head)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, ")")
    }
}
