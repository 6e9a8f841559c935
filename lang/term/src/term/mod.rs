//! The core term language: a simply typed lambda calculus in spine form.
//!
//! Terms are kept in beta-normal, eta-short form for partially applied
//! heads and eta-long form for fully applied free variables. The smart
//! constructors [Abstraction::make] and [Application::new] maintain this
//! invariant, so most code can assume it.

mod abstraction;
mod application;
mod bound_var;
mod constant;
mod free_var;

pub use abstraction::Abstraction;
pub use application::Application;
pub use bound_var::BoundVar;
pub use constant::Constant;
pub use free_var::FreeVar;

use std::fmt;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::subordination::Subordination;
use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

/// The heads an application can have. Bound variables and abstractions in
/// head position are beta-reduced away by [Term::apply].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Atom {
    Constant(Constant),
    FreeVar(FreeVar),
}

impl Atom {
    pub fn name(&self) -> &str {
        match self {
            Atom::Constant(c) => &c.name,
            Atom::FreeVar(v) => &v.name,
        }
    }

    pub fn ty(&self) -> Rc<Term> {
        match self {
            Atom::Constant(c) => c.ty(),
            Atom::FreeVar(v) => v.ty(),
        }
    }

    pub fn as_free_var(&self) -> Option<&FreeVar> {
        match self {
            Atom::FreeVar(v) => Some(v),
            Atom::Constant(_) => None,
        }
    }

    pub(crate) fn apply(&self, args: &[Rc<Term>], which_applied: usize) -> Rc<Term> {
        if which_applied < args.len() {
            Rc::new(Application::new(self.clone(), args[which_applied..].to_vec()).into())
        } else {
            Rc::new(self.clone().into())
        }
    }
}

impl From<Atom> for Term {
    fn from(val: Atom) -> Self {
        match val {
            Atom::Constant(c) => Term::Constant(c),
            Atom::FreeVar(v) => Term::FreeVar(v),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Constant(c) => c.fmt(f),
            Atom::FreeVar(v) => v.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Constant(Constant),
    FreeVar(FreeVar),
    BoundVar(BoundVar),
    Abstraction(Abstraction),
    Application(Application),
}

impl Term {
    /// Apply this term to arguments, beta-reducing on the fly.
    ///
    /// `which_applied` is the number of leading arguments already consumed
    /// by enclosing binders; external callers pass 0.
    pub fn apply(&self, args: &[Rc<Term>], which_applied: usize) -> Rc<Term> {
        match self {
            Term::Constant(c) => Atom::from(c.clone()).apply(args, which_applied),
            Term::FreeVar(v) => Atom::from(v.clone()).apply(args, which_applied),
            Term::BoundVar(bv) => bv.apply(args, which_applied),
            Term::Abstraction(abs) => abs.apply(args, which_applied),
            Term::Application(app) => app.apply(args, which_applied),
        }
    }

    /// The type of this term, looked up under the given binder context.
    /// Panics if the term is ill-typed.
    pub fn get_type(&self, bindings: &mut Vec<(String, Rc<Term>)>) -> Rc<Term> {
        match self {
            Term::Constant(c) => c.ty(),
            Term::FreeVar(v) => v.ty(),
            Term::BoundVar(bv) => {
                let index_to_use = bindings.len() as isize - bv.index;
                if index_to_use < 0 || index_to_use as usize >= bindings.len() {
                    // typechecking with missing binding info, use a default
                    Rc::new(Constant::unknown().into())
                } else {
                    bindings[index_to_use as usize].1.clone()
                }
            }
            Term::Abstraction(abs) => {
                bindings.push((abs.arg_name.clone(), abs.arg_ty.clone()));
                let body_ty = abs.body().get_type(bindings);
                bindings.pop();
                Abstraction::make(abs.arg_name.clone(), abs.arg_ty.clone(), body_ty)
            }
            Term::Application(app) => app.get_type(bindings),
        }
    }

    pub fn count_lambdas(&self) -> usize {
        match self {
            Term::Abstraction(abs) => abs.body().count_lambdas() + 1,
            _ => 0,
        }
    }

    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Term::Constant(c) if c.is_unknown())
    }

    /// Equality up to the unknown type, which compares equal to everything.
    pub fn type_equals(&self, other: &Term) -> bool {
        if self.is_unknown_type() || other.is_unknown_type() {
            return true;
        }
        match (self, other) {
            (Term::Abstraction(a), Term::Abstraction(b)) => {
                a.body().type_equals(b.body()) && a.arg_ty.type_equals(&b.arg_ty)
            }
            // the wildcard can sit below a dependent type's arguments
            (Term::Application(a), Term::Application(b)) => {
                a.head() == b.head()
                    && a.args().len() == b.args().len()
                    && a.args().iter().zip(b.args()).all(|(s, o)| s.type_equals(o))
            }
            _ => self == other,
        }
    }

    /// The type family this term belongs to, ignoring dependencies and
    /// arguments.
    pub fn type_family(&self) -> Constant {
        self.get_type(&mut Vec::new()).base_type_family()
    }

    /// The family of this type: strip binders, take the head.
    pub fn base_type_family(&self) -> Constant {
        let mut ty: &Term = self;
        while let Term::Abstraction(abs) = ty {
            ty = abs.body();
        }
        match ty {
            Term::Constant(c) => c.clone(),
            Term::Application(app) => match app.head() {
                Atom::Constant(c) => c.clone(),
                Atom::FreeVar(_) => Constant::unknown(),
            },
            _ => Constant::unknown(),
        }
    }

    /// If this term is eta-equivalent to a bare free variable, return it.
    /// `λx1…xn. F @n … @1` collapses to `F`; anything else gives `None`.
    pub fn eta_equiv_free_var(&self) -> Option<FreeVar> {
        let mut t: &Term = self;
        let mut arg_count = 0;
        while let Term::Abstraction(abs) = t {
            t = abs.body();
            arg_count += 1;
        }
        match t {
            Term::FreeVar(v) if arg_count == 0 => Some(v.clone()),
            Term::Application(app) if arg_count > 0 => {
                if app.args().len() != arg_count {
                    return None;
                }
                let v = app.head().as_free_var()?;
                for (i, arg) in app.args().iter().enumerate() {
                    match &**arg {
                        Term::BoundVar(bv) if bv.index == (arg_count - i) as isize => {}
                        _ => return None,
                    }
                }
                Some(v.clone())
            }
            _ => None,
        }
    }

    /// Like [Term::eta_equiv_free_var] but also accepting a permutation of
    /// the bound arguments: `λx1…xn. F @p(n) … @p(1)`. On success returns the
    /// head variable `F` together with the term `src` must be bound to so
    /// that the permutation can be reversed.
    pub fn eta_permuted_equiv_free_var(&self, src: &FreeVar) -> Option<(FreeVar, Rc<Term>)> {
        let mut t: &Term = self;
        let mut wrappers: Vec<&Abstraction> = Vec::new();
        while let Term::Abstraction(abs) = t {
            wrappers.push(abs);
            t = abs.body();
        }
        let arg_count = wrappers.len();
        let app = match t {
            Term::Application(app) if arg_count > 0 => app,
            _ => return None,
        };
        if app.args().len() != arg_count {
            return None;
        }
        let fv = app.head().as_free_var()?;
        log::trace!("checking whether {src} is a permutation of another free var");
        // indices and reverse are zero-based positions; reverse uses 0 for
        // "unset" which works out because position 0 is stored as arg_count
        let mut indices = vec![0usize; arg_count];
        let mut reverse = vec![0usize; arg_count];
        for (i, arg) in app.args().iter().enumerate() {
            let index = match &**arg {
                Term::BoundVar(bv) => bv.index,
                _ => return None,
            };
            if index < 1 || index > arg_count as isize {
                return None;
            }
            let pos = arg_count - index as usize;
            if reverse[pos] != 0 {
                // not a permutation
                return None;
            }
            indices[i] = pos;
            reverse[pos] = arg_count - i;
        }
        let rev_args: Vec<Rc<Term>> =
            reverse.iter().map(|&i| Rc::new(BoundVar::new(i as isize).into())).collect();
        let mut binding: Rc<Term> =
            Rc::new(Application::new(src.clone().into(), rev_args).into());
        for i in (0..arg_count).rev() {
            let w = wrappers[indices[i]];
            binding = Rc::new(
                Abstraction::raw(w.arg_name.clone(), w.arg_ty.clone(), binding).into(),
            );
        }
        Some((fv.clone(), binding))
    }

    /// The locally eta-long form. Only free variables change.
    pub fn to_eta_long(&self) -> Rc<Term> {
        match self {
            Term::FreeVar(v) => v.to_eta_long(),
            _ => Rc::new(self.clone()),
        }
    }

    /// Remove outer binders that are not used in the body. Unused means
    /// unused except in the types of other unused binders. Should only be
    /// applied to fully bound terms.
    pub fn strip_unused_lambdas(&self) -> Rc<Term> {
        let mut result: &Term = self;
        let mut t: &Term = self;
        loop {
            if !t.has_bound_var_above(0) {
                result = t;
            }
            match t {
                Term::Abstraction(abs) => t = abs.body(),
                _ => break,
            }
        }
        Rc::new(result.clone())
    }

    /// Whether `other` occurs in this term, possibly improperly.
    ///
    /// There is one extra case for induction checking: `λx. a[x]` contains
    /// `a[i]` when the result family cannot appear in `i` according to the
    /// subordination relation.
    pub fn contains(&self, other: &Term, subord: &Subordination) -> bool {
        log::trace!("{self} >?= {other}");
        if self == other || self.contains_proper(other, subord) {
            return true;
        }
        if let (Term::Abstraction(abs), Term::Application(app)) = (self, other) {
            if let Some(fv) = self.eta_equiv_free_var() {
                if app.head().as_free_var() == Some(&fv) {
                    let head_family = app.head().ty().base_type_family();
                    let var_family = abs.arg_ty.base_type_family();
                    if !subord.can_appear_in(&head_family, &var_family) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether `other` occurs strictly inside this term.
    pub fn contains_proper(&self, other: &Term, subord: &Subordination) -> bool {
        match self {
            Term::Constant(_) | Term::FreeVar(_) | Term::BoundVar(_) => false,
            Term::Abstraction(abs) => abs.body().contains(other, subord),
            Term::Application(app) => {
                let head: Term = app.head().clone().into();
                head.contains(other, subord)
                    || app.args().iter().any(|a| a.contains(other, subord))
            }
        }
    }
}

/// True if there is hope these types might ever be unified.
pub fn types_compatible(ty: &Term, ty2: &Term) -> bool {
    if ty.is_unknown_type() || ty2.is_unknown_type() {
        return true;
    }
    if matches!(ty, Term::Abstraction(_)) && ty.count_lambdas() == ty2.count_lambdas() {
        return true;
    }
    ty == ty2
}

/// Wrap a term in anonymous binders, one per argument type, innermost last.
pub fn wrap_with_lambdas(mut term: Rc<Term>, arg_tys: &[Rc<Term>]) -> Rc<Term> {
    for ty in arg_tys.iter().rev() {
        term = Abstraction::make("x", ty.clone(), term);
    }
    term
}

/// Like [wrap_with_lambdas] but keeping the given binder names.
pub fn wrap_with_lambdas_named(
    mut term: Rc<Term>,
    arg_tys: &[Rc<Term>],
    names: &[String],
) -> Rc<Term> {
    for (ty, name) in arg_tys.iter().zip(names).rev() {
        term = Abstraction::make(name.clone(), ty.clone(), term);
    }
    term
}

/// The binders wrapping a function type, outermost first.
pub fn wrapping_abstractions(ty: &Rc<Term>) -> Vec<Abstraction> {
    let mut abs = Vec::new();
    let mut t: &Term = ty;
    while let Term::Abstraction(a) = t {
        abs.push(a.clone());
        t = a.body();
    }
    abs
}

/// Rewrap a term in binders taken from `abs`, names and types included.
pub fn wrap_with_abstractions(abs: &[Abstraction], mut term: Rc<Term>) -> Rc<Term> {
    for a in abs.iter().rev() {
        term = Abstraction::make(a.arg_name.clone(), a.arg_ty.clone(), term);
    }
    term
}

/// The first `count` argument types of a function type. Panics if the type
/// does not have that many binders.
pub fn arg_types_n(mut ty: Rc<Term>, count: usize) -> Vec<Rc<Term>> {
    log::trace!("getting {count} args from {ty}");
    let mut arg_tys = Vec::with_capacity(count);
    for _ in 0..count {
        let (arg_ty, body) = match &*ty {
            Term::Abstraction(abs) => (abs.arg_ty.clone(), abs.body().clone()),
            _ => panic!("type {ty} has fewer than {count} arguments"),
        };
        arg_tys.push(arg_ty);
        ty = body;
    }
    arg_tys
}

/// All argument types of a function type.
pub fn arg_types(mut ty: Rc<Term>) -> Vec<Rc<Term>> {
    let mut arg_tys = Vec::new();
    loop {
        let (arg_ty, body) = match &*ty {
            Term::Abstraction(abs) => (abs.arg_ty.clone(), abs.body().clone()),
            _ => break,
        };
        arg_tys.push(arg_ty);
        ty = body;
    }
    arg_tys
}

impl Shift for Term {
    fn incr_free_debruijn_from(&self, nested: usize, by: isize) -> Rc<Term> {
        match self {
            Term::Constant(c) => c.incr_free_debruijn_from(nested, by),
            Term::FreeVar(v) => v.incr_free_debruijn_from(nested, by),
            Term::BoundVar(bv) => bv.incr_free_debruijn_from(nested, by),
            Term::Abstraction(abs) => abs.incr_free_debruijn_from(nested, by),
            Term::Application(app) => app.incr_free_debruijn_from(nested, by),
        }
    }
}

impl Substitutable for Term {
    fn subst<S: Substitution>(&self, by: &S, depth: usize) -> Rc<Term> {
        match self {
            Term::Constant(c) => c.subst(by, depth),
            Term::FreeVar(v) => v.subst(by, depth),
            Term::BoundVar(bv) => bv.subst(by, depth),
            Term::Abstraction(abs) => abs.subst(by, depth),
            Term::Application(app) => app.subst(by, depth),
        }
    }
}

impl FreeVars for Term {
    fn free_vars_mut(&self, fvs: &mut FxHashSet<FreeVar>) {
        match self {
            Term::Constant(c) => c.free_vars_mut(fvs),
            Term::FreeVar(v) => v.free_vars_mut(fvs),
            Term::BoundVar(bv) => bv.free_vars_mut(fvs),
            Term::Abstraction(abs) => abs.free_vars_mut(fvs),
            Term::Application(app) => app.free_vars_mut(fvs),
        }
    }
}

impl Occurs for Term {
    fn has_bound_var(&self, i: isize) -> bool {
        match self {
            Term::Constant(c) => c.has_bound_var(i),
            Term::FreeVar(v) => v.has_bound_var(i),
            Term::BoundVar(bv) => bv.has_bound_var(i),
            Term::Abstraction(abs) => abs.has_bound_var(i),
            Term::Application(app) => app.has_bound_var(i),
        }
    }

    fn has_bound_var_above(&self, i: isize) -> bool {
        match self {
            Term::Constant(c) => c.has_bound_var_above(i),
            Term::FreeVar(v) => v.has_bound_var_above(i),
            Term::BoundVar(bv) => bv.has_bound_var_above(i),
            Term::Abstraction(abs) => abs.has_bound_var_above(i),
            Term::Application(app) => app.has_bound_var_above(i),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(c) => c.fmt(f),
            Term::FreeVar(v) => v.fmt(f),
            Term::BoundVar(bv) => bv.fmt(f),
            Term::Abstraction(abs) => abs.fmt(f),
            Term::Application(app) => app.fmt(f),
        }
    }
}
