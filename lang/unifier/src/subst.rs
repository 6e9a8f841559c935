//! Substitutions in solved (triangular) form.
//!
//! [Substitution::add] keeps the map idempotent: the new binding is
//! normalized against the map and then substituted through every existing
//! range entry, so applying the substitution once fully resolves a term.

use std::fmt;
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};

use metalf_term::traits::Substitution as Lookup;
use metalf_term::{FreeVar, FreeVars, Session, Shift, Substitutable, Term};

use crate::result::{UnifyError, UnifyResult};
use crate::unify::unify;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    map: FxHashMap<FreeVar, Rc<Term>>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-entry substitution, bypassing normalization. The caller must
    /// have checked that `var` is not free in `t`.
    fn single(var: FreeVar, t: Rc<Term>) -> Self {
        let mut map = FxHashMap::default();
        map.insert(var, t);
        Substitution { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, var: &FreeVar) -> Option<&Rc<Term>> {
        self.map.get(var)
    }

    pub fn map(&self) -> &FxHashMap<FreeVar, Rc<Term>> {
        &self.map
    }

    /// Bind `var` to `t`, maintaining solved form:
    /// 1. substitute the current map into `t`;
    /// 2. no-op if the result is `var` itself, or eta-equivalent to it;
    /// 3. extended occurs check;
    /// 4. substitute the new binding through every existing range entry;
    /// 5. a conflicting earlier binding is not overwritten: the old and new
    ///    values are unified and the resulting substitution composed in.
    pub fn add(&mut self, sess: &mut Session, var: &FreeVar, t: Rc<Term>) -> UnifyResult {
        log::trace!("substituting {t} for {var}, adding to {self}");

        let t_substituted = if self.map.is_empty() { t } else { t.substitute(self) };

        if t_substituted.eta_equiv_free_var().as_ref() == Some(var) {
            return Ok(());
        }

        if t_substituted.free_vars().contains(var) {
            return Err(UnifyError::occurs_check(var, &t_substituted));
        }

        if let Some(existing) = self.map.get(var).cloned() {
            if existing == t_substituted {
                return Ok(());
            }
            log::trace!("merging bindings for {var}: {existing} and {t_substituted}");
            let merged = unify(sess, &existing, &t_substituted)?;
            self.compose(sess, merged)?;
            return Ok(());
        }

        if !self.map.is_empty() {
            let single = Substitution::single(var.clone(), t_substituted.clone());
            for val in self.map.values_mut() {
                *val = val.substitute(&single);
            }
        }

        self.map.insert(var.clone(), t_substituted);
        Ok(())
    }

    /// Fold the other substitution into this one, binding by binding.
    pub fn compose(&mut self, sess: &mut Session, other: Substitution) -> UnifyResult {
        for (var, t) in other.map {
            self.add(sess, &var, t)?;
        }
        Ok(())
    }

    /// Whether applying this substitution makes the two terms equal.
    pub fn is_unifier(&self, t1: &Rc<Term>, t2: &Rc<Term>) -> bool {
        t1.substitute(self) == t2.substitute(self)
    }

    pub fn incr_free_debruijn(&mut self, amount: isize) {
        for val in self.map.values_mut() {
            *val = val.incr_free_debruijn(amount);
        }
    }

    /// Rewrite the substitution so it does not bind any of `vars` if
    /// possible. A binding `v -> t` where `t` is eta-equivalent, or
    /// eta-permuted-equivalent, to a free variable outside `vars` is turned
    /// around into a binding of that variable instead. Returns the subset of
    /// `vars` that could not be freed.
    pub fn select_unavoidable(
        &mut self,
        sess: &mut Session,
        vars: &FxHashSet<FreeVar>,
    ) -> UnifyResult<FxHashSet<FreeVar>> {
        let mut result = FxHashSet::default();
        for v in vars {
            let Some(t) = self.map.get(v).cloned() else { continue };
            if let Some(fv) = t.eta_equiv_free_var() {
                if vars.contains(&fv) {
                    log::trace!("could not avoid {v}: equal to another protected var {fv}");
                    result.insert(v.clone());
                } else {
                    self.map.remove(v);
                    self.add(sess, &fv, Rc::new(v.clone().into()))?;
                }
            } else if let Some((fv, binding)) = t.eta_permuted_equiv_free_var(v) {
                if vars.contains(&fv) {
                    log::trace!("could not avoid {v}: permutation of protected var {fv}");
                    result.insert(v.clone());
                } else {
                    self.map.remove(v);
                    self.add(sess, &fv, binding)?;
                }
            } else {
                log::trace!("could not avoid {v}: bound to non-variable {t}");
                result.insert(v.clone());
            }
        }
        Ok(result)
    }

    /// True if all of `vars` could be freed from the domain.
    pub fn avoid(&mut self, sess: &mut Session, vars: &FxHashSet<FreeVar>) -> UnifyResult<bool> {
        Ok(self.select_unavoidable(sess, vars)?.is_empty())
    }
}

impl Lookup for Substitution {
    fn lookup(&self, var: &FreeVar) -> Option<Rc<Term>> {
        self.map.get(var).cloned()
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.map.iter().collect();
        entries.sort_by(|(a, _), (b, _)| (&a.name, a.stamp).cmp(&(&b.name, b.stamp)));
        write!(f, "{{")?;
        for (i, (var, t)) in entries.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var} -> {t}")?;
        }
        write!(f, "}}")
    }
}

/// Extend `sub` so every free variable of `t` not already bound is mapped to
/// a freshly stamped copy of itself.
pub fn fresh_substitution(
    sess: &mut Session,
    t: &Rc<Term>,
    sub: &mut Substitution,
) -> UnifyResult {
    let vars = t.free_vars();
    log::trace!("free vars for freshening: {} total", vars.len());
    for v in vars {
        if !sub.map.contains_key(&v) {
            let fresh = sess.freshify(&v);
            log::trace!("freshened {v} with {fresh}");
            sub.add(sess, &v, Rc::new(fresh.into()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metalf_term::build::*;
    use pretty_assertions::assert_eq;

    /// Fresh session, with tracing hooked up for `RUST_LOG=trace` runs.
    fn session() -> Session {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::new()
    }

    fn a() -> Rc<Term> {
        Rc::new(con("a", kind()).into())
    }

    fn a1() -> Rc<Term> {
        Rc::new(con("a1", a()).into())
    }

    fn a2() -> metalf_term::Constant {
        con("a2", abs(a(), a()))
    }

    #[test]
    fn empty_substitution_is_identity() {
        let sub = Substitution::new();
        let t = app1(a2(), a1());
        assert_eq!(t, t.substitute(&sub));
        assert!(sub.is_unifier(&t, &t));
    }

    #[test]
    fn binding_self_is_a_noop() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        sub.add(&mut sess, &x, Rc::new(x.clone().into())).unwrap();
        assert!(sub.is_empty());
    }

    #[test]
    fn eta_equivalent_self_binding_is_a_noop() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let f = var("F", abs(a(), abs(a(), a())));
        // \x. F x contracts to F, so this binds F to itself
        let eta = abs(a(), app1(f.clone(), bvar(1)));
        sub.add(&mut sess, &f, eta).unwrap();
        assert!(sub.is_empty());
    }

    #[test]
    fn occurs_check_fires() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        let err = sub.add(&mut sess, &x, app1(a2(), term(x.clone()))).unwrap_err();
        assert!(matches!(*err, UnifyError::OccursCheck { .. }));
    }

    #[test]
    fn later_binding_is_substituted_through_earlier_ranges() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        let y = var("Y", a());
        sub.add(&mut sess, &x, app1(a2(), term(y.clone()))).unwrap();
        sub.add(&mut sess, &y, a1()).unwrap();
        assert_eq!(Some(&app1(a2(), a1())), sub.get(&x));
    }

    #[test]
    fn conflicting_bindings_are_merged_by_unification() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        let y = var("Y", a());
        sub.add(&mut sess, &x, app1(a2(), term(y.clone()))).unwrap();
        sub.add(&mut sess, &x, app1(a2(), a1())).unwrap();
        assert_eq!(Some(&a1()), sub.get(&y));
        assert_eq!(Some(&app1(a2(), a1())), sub.get(&x));
    }

    #[test]
    fn irreconcilable_rebinding_fails() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        sub.add(&mut sess, &x, a1()).unwrap();
        let err = sub.add(&mut sess, &x, app1(a2(), a1())).unwrap_err();
        assert!(matches!(*err, UnifyError::Failed { .. }));
    }

    #[test]
    fn select_unavoidable_turns_bindings_around() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        let y = var("Y", a());
        sub.add(&mut sess, &x, term(y.clone())).unwrap();
        let mut protect = FxHashSet::default();
        protect.insert(x.clone());
        let stuck = sub.select_unavoidable(&mut sess, &protect).unwrap();
        assert!(stuck.is_empty());
        assert!(sub.get(&x).is_none());
        assert_eq!(Some(&term(x)), sub.get(&y));
    }

    #[test]
    fn select_unavoidable_reports_structure_bindings() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        sub.add(&mut sess, &x, a1()).unwrap();
        let mut protect = FxHashSet::default();
        protect.insert(x.clone());
        let stuck = sub.select_unavoidable(&mut sess, &protect).unwrap();
        assert_eq!(1, stuck.len());
        assert!(stuck.contains(&x));
    }

    #[test]
    fn select_unavoidable_handles_permuted_aliases() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let fty = abs(a(), abs(a(), a()));
        let f = var("F", fty.clone());
        let g = var("G", fty);
        // G = \x.\y. F y x
        let swapped = abs(a(), abs(a(), app(f.clone(), vec![bvar(1), bvar(2)])));
        sub.add(&mut sess, &g, swapped).unwrap();
        let mut protect = FxHashSet::default();
        protect.insert(g.clone());
        let stuck = sub.select_unavoidable(&mut sess, &protect).unwrap();
        assert!(stuck.is_empty());
        assert!(sub.get(&g).is_none());
        // F is now bound to the reverse permutation of G
        let expected = abs(a(), abs(a(), app(g, vec![bvar(1), bvar(2)])));
        assert_eq!(expected, sub.get(&f).unwrap().clone());
    }

    #[test]
    fn fresh_substitution_covers_unbound_vars() {
        let mut sess = session();
        let mut sub = Substitution::new();
        let x = var("X", a());
        let t = app1(a2(), term(x.clone()));
        fresh_substitution(&mut sess, &t, &mut sub).unwrap();
        match sub.get(&x).map(|t| &**t) {
            Some(Term::FreeVar(fresh)) => {
                assert_eq!("X", fresh.name);
                assert_ne!(0, fresh.stamp);
            }
            other => panic!("expected a fresh variable, got {other:?}"),
        }
    }
}
