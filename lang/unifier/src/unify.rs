//! Pattern unification over the term language.
//!
//! The solver runs a worklist of term pairs ordered so that pairs involving
//! non-pattern free variable applications are taken up last; by the time one
//! is popped, earlier bindings often turned it into a pattern. Pairs are
//! oriented flex side first when they are queued, so the case analysis in
//! [solve] only has to consider one direction.
//!
//! The algorithm is sound and deliberately incomplete: outside the Miller
//! pattern fragment it answers [UnifyError::Incomplete] instead of guessing.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};

use metalf_term::{
    arg_types, arg_types_n, types_compatible, wrap_with_abstractions, wrap_with_lambdas,
    wrap_with_lambdas_named, wrapping_abstractions, Application, Atom, BoundVar, Constant,
    FreeVar, FreeVars, Occurs, Session, Shift, Substitutable, Term,
};

use crate::result::{UnifyError, UnifyResult};
use crate::subst::Substitution;

/// Bound on worklist steps. Progress outside the pattern fragment is not
/// guaranteed, so on exhaustion the solver fails closed with `Incomplete`.
const MAX_STEPS: usize = 10_000;

/// FreeVar 0, free variable application 1, everything else 2. Lower order
/// goes first in a pair.
fn order(t: &Term) -> u8 {
    match t {
        Term::FreeVar(_) => 0,
        Term::Application(app) => match app.head() {
            Atom::FreeVar(_) => 1,
            Atom::Constant(_) => 2,
        },
        _ => 2,
    }
}

fn is_non_pat_free_var_app(t: &Term) -> bool {
    match t {
        Term::Application(app) => {
            matches!(app.head(), Atom::FreeVar(_))
                && app.args().iter().any(|a| !matches!(&**a, Term::BoundVar(_)))
        }
        _ => false,
    }
}

/// A free variable head applied to distinct bound variables.
fn is_pattern_args(head: &Atom, args: &[Rc<Term>]) -> bool {
    if !matches!(head, Atom::FreeVar(_)) {
        return false;
    }
    let mut seen = FxHashSet::default();
    for arg in args {
        match &**arg {
            Term::BoundVar(bv) => {
                if args.len() >= 2 && !seen.insert(bv.index) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

struct WorkItem {
    priority: usize,
    seq: u64,
    lhs: Rc<Term>,
    rhs: Rc<Term>,
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse to pop the lowest priority
        // first, FIFO among equals
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Worklist {
    heap: BinaryHeap<WorkItem>,
    next_seq: u64,
}

impl Worklist {
    /// Queue a pair, flex side first. One point of priority for each side
    /// that is a non-pattern free variable application; such pairs are
    /// deferred in the hope that earlier bindings make them patterns.
    fn push(&mut self, t1: Rc<Term>, t2: Rc<Term>) {
        log::trace!("    pair {} order {}", t1, order(&t1));
        log::trace!("    pair {} order {}", t2, order(&t2));
        let (lhs, rhs) = if order(&t1) < order(&t2) { (t1, t2) } else { (t2, t1) };
        let priority =
            usize::from(is_non_pat_free_var_app(&lhs)) + usize::from(is_non_pat_free_var_app(&rhs));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(WorkItem { priority, seq, lhs, rhs });
    }

    fn pop(&mut self) -> Option<(Rc<Term>, Rc<Term>)> {
        self.heap.pop().map(|item| (item.lhs, item.rhs))
    }
}

/// Unify two terms, returning a most general substitution within the pattern
/// fragment. Free variables of the inputs are guaranteed not to be bound to
/// terms with escaping bound variables; argument positions that would escape
/// are eliminated by retyping the variable where possible, otherwise the
/// unification fails.
pub fn unify(sess: &mut Session, t1: &Rc<Term>, t2: &Rc<Term>) -> UnifyResult<Substitution> {
    let mut current = unify_allowing_bvs(sess, t1, t2)?;

    let mut free_vars = t1.free_vars();
    free_vars.extend(t2.free_vars());
    let mut unusable: FxHashSet<(FreeVar, usize)> = FxHashSet::default();
    for v in &free_vars {
        if let Some(substituted) = current.get(v).cloned() {
            if !select_unusable_positions(&substituted, 0, &mut unusable) {
                log::trace!("could not eliminate bound variables from {substituted} for {v}");
                return Err(UnifyError::failed(t1, t2));
            }
        }
    }
    if !unusable.is_empty() {
        let mut by_var: FxHashMap<FreeVar, FxHashSet<usize>> = FxHashMap::default();
        for (v, position) in unusable {
            by_var.entry(v).or_default().insert(position);
        }
        for (v, positions) in by_var {
            log::trace!("need to drop positions {positions:?} of {v}");
            rebind_without_positions(sess, &mut current, &v, &positions)?;
        }
    }
    Ok(current)
}

/// Check that `t` is an instance of `general`: unify, then insist `t`'s own
/// free variables stay free (bindings to them are turned around where
/// possible).
pub fn instance_of(
    sess: &mut Session,
    t: &Rc<Term>,
    general: &Rc<Term>,
) -> UnifyResult<Substitution> {
    let free_vars = t.free_vars();
    let mut sub = unify(sess, t, general)?;
    if sub.avoid(sess, &free_vars)? {
        Ok(sub)
    } else {
        log::trace!("terms unify but the instance relationship does not hold");
        Err(UnifyError::failed(t, general))
    }
}

fn unify_allowing_bvs(
    sess: &mut Session,
    t1: &Rc<Term>,
    t2: &Rc<Term>,
) -> UnifyResult<Substitution> {
    let mut current = Substitution::new();
    let mut worklist = Worklist::default();
    worklist.push(t1.clone(), t2.clone());

    let mut steps = 0;
    while let Some((lhs, rhs)) = worklist.pop() {
        steps += 1;
        if steps > MAX_STEPS {
            log::trace!("worklist budget exhausted at {lhs} =?= {rhs}");
            return Err(UnifyError::incomplete(&lhs, &rhs));
        }
        let lhs_ty = lhs.get_type(&mut Vec::new());
        let rhs_ty = rhs.get_type(&mut Vec::new());
        if !types_compatible(&lhs_ty, &rhs_ty) {
            log::trace!("types {lhs_ty} and {rhs_ty} cannot match");
            return Err(UnifyError::failed(&lhs, &rhs));
        }
        log::trace!("subtask: unify {} with {}", lhs.substitute(&current), rhs.substitute(&current));
        log::trace!("    raw {lhs} with {rhs}");
        log::trace!("    substitution: {current}");
        solve(sess, &lhs, &rhs, &mut current, &mut worklist)?;
    }
    Ok(current)
}

/// One step of the case analysis. `lhs` is the flex side if there is one.
fn solve(
    sess: &mut Session,
    lhs: &Rc<Term>,
    rhs: &Rc<Term>,
    current: &mut Substitution,
    worklist: &mut Worklist,
) -> UnifyResult {
    match &**lhs {
        Term::FreeVar(v) => {
            if let Some(t) = current.get(v).cloned() {
                worklist.push(t, rhs.clone());
                return Ok(());
            }
            if matches!(&**rhs, Term::FreeVar(other) if other == v) {
                return Ok(());
            }
            match &**rhs {
                Term::Application(app) if app.is_pattern() => {
                    // v = \x1..xn. v, by binding the other head
                    let other_var = match app.head() {
                        Atom::FreeVar(ov) => ov,
                        Atom::Constant(_) => unreachable!("pattern head is a free variable"),
                    };
                    if current.get(other_var).is_some() {
                        let new_rhs = rhs.substitute(current);
                        worklist.push(lhs.clone(), new_rhs);
                    } else {
                        let arg_tys = arg_types_n(other_var.ty(), app.args().len());
                        let var_match = wrap_with_lambdas(lhs.clone(), &arg_tys);
                        current.add(sess, other_var, var_match)?;
                    }
                }
                _ => current.add(sess, v, rhs.clone())?,
            }
            Ok(())
        }

        Term::Constant(_) | Term::BoundVar(_) => {
            if lhs == rhs {
                Ok(())
            } else {
                log::trace!("atoms differ: {lhs} and {rhs}");
                Err(UnifyError::failed(lhs, rhs))
            }
        }

        Term::Abstraction(abs) => match &**rhs {
            Term::Abstraction(other) => {
                // rewrite a side that is secretly just a free variable
                let my_var = lhs.eta_equiv_free_var();
                let other_var = rhs.eta_equiv_free_var();
                if my_var.is_some() || other_var.is_some() {
                    let l = my_var.map_or_else(|| lhs.clone(), |v| Rc::new(v.into()));
                    let r = other_var.map_or_else(|| rhs.clone(), |v| Rc::new(v.into()));
                    worklist.push(l, r);
                } else {
                    worklist.push(abs.body().clone(), other.body().clone());
                    worklist.push(abs.arg_ty.clone(), other.arg_ty.clone());
                }
                Ok(())
            }
            _ => {
                log::trace!("{rhs} is not an instance of {lhs}");
                Err(UnifyError::failed(lhs, rhs))
            }
        },

        Term::Application(app) => match app.head() {
            Atom::Constant(_) => {
                let other_app = match &**rhs {
                    Term::Application(other) if other.args().len() == app.args().len() => other,
                    _ => return Err(UnifyError::failed(lhs, rhs)),
                };
                worklist.push(
                    Rc::new(app.head().clone().into()),
                    Rc::new(other_app.head().clone().into()),
                );
                for (a, b) in app.args().iter().zip(other_app.args()) {
                    worklist.push(a.clone(), b.clone());
                }
                Ok(())
            }
            Atom::FreeVar(function) => {
                if let Some(t) = current.get(function).cloned() {
                    worklist.push(t.apply(app.args(), 0), rhs.clone());
                    Ok(())
                } else {
                    unify_flex_app(sess, rhs, function, app.args(), current, worklist)
                }
            }
        },
    }
}

/// `function args =?= other` where `function` is an unbound free variable.
fn unify_flex_app(
    sess: &mut Session,
    other: &Rc<Term>,
    function: &FreeVar,
    arguments: &[Rc<Term>],
    current: &mut Substitution,
    worklist: &mut Worklist,
) -> UnifyResult {
    match &**other {
        Term::Constant(_) => {
            // F x1..xn = C: bind F = \x1..xn. C
            let flex = flex_app_term(function, arguments);
            for arg in arguments {
                if !matches!(&**arg, Term::BoundVar(_)) {
                    return Err(UnifyError::incomplete(&flex, other));
                }
            }
            let wrapped = wrap_with_lambdas(other.clone(), &arg_types(function.ty()));
            current.add(sess, function, wrapped)
        }

        Term::BoundVar(bv) => {
            // F xn..x1 = y: project the argument position where y occurs
            let flex = flex_app_term(function, arguments);
            for arg in arguments {
                if !matches!(&**arg, Term::BoundVar(_)) {
                    return Err(UnifyError::incomplete(&flex, other));
                }
            }
            let n = arguments.len();
            let mut position = None;
            for i in 1..=n {
                if matches!(&*arguments[n - i], Term::BoundVar(a) if a == bv) {
                    position = Some(i as isize);
                    break;
                }
            }
            let Some(i) = position else {
                log::trace!("cannot unify {other} with {flex} in which the var is not free");
                return Err(UnifyError::failed(&flex, other));
            };
            let projection: Rc<Term> = Rc::new(BoundVar::new(i).into());
            let wrapped = wrap_with_lambdas(projection, &arg_types(function.ty()));
            current.add(sess, function, wrapped)
        }

        Term::Abstraction(abs) => {
            // push the binder onto the flex side and equate with the body
            let mut new_args: Vec<Rc<Term>> =
                arguments.iter().map(|a| a.incr_free_debruijn(1)).collect();
            new_args.push(Rc::new(BoundVar::new(1).into()));
            let extended: Rc<Term> =
                Rc::new(Application::new(function.clone().into(), new_args).into());
            worklist.push(extended, abs.body().clone());
            Ok(())
        }

        Term::FreeVar(_) => panic!("flex application against a bare variable escaped ordering"),

        Term::Application(other_app) => match other_app.head() {
            Atom::Constant(constant) => {
                imitate(sess, function, arguments, other, other_app, constant, current, worklist)
            }
            Atom::FreeVar(other_function) => flex_flex(
                sess,
                function,
                arguments,
                other,
                other_app,
                other_function,
                current,
                worklist,
            ),
        },
    }
}

/// Huet-style imitation. `C e1..en =?= F y1..ym` binds
/// `F = \y1..ym. C (H1 ym..y1) .. (Hn ym..y1)` with fresh helper variables
/// `Hi`, and queues `ei =?= Hi y1..ym`.
#[allow(clippy::too_many_arguments)]
fn imitate(
    sess: &mut Session,
    function: &FreeVar,
    arguments: &[Rc<Term>],
    other: &Rc<Term>,
    other_app: &Application,
    constant: &Constant,
    current: &mut Substitution,
    worklist: &mut Worklist,
) -> UnifyResult {
    let flex = flex_app_term(function, arguments);
    if other.free_vars().contains(function) {
        log::trace!("recursion detected between {flex} and {other}");
        return Err(UnifyError::failed(&flex, other));
    }
    if !is_pattern_args(&Atom::FreeVar(function.clone()), arguments) {
        return Err(UnifyError::incomplete(other, &flex));
    }

    let m = arguments.len();
    let helper_args: Vec<Rc<Term>> =
        (0..m).map(|i| Rc::new(BoundVar::new((m - i) as isize).into()) as Rc<Term>).collect();
    let flex_arg_tys = arg_types_n(function.ty(), m);

    let mut partial_fun_ty = constant.ty();
    let mut new_args = Vec::with_capacity(other_app.args().len());
    for rigid_arg in other_app.args() {
        let (arg_ty, rest) = match &*partial_fun_ty {
            Term::Abstraction(abs) => (abs.arg_ty.clone(), abs.body().clone()),
            _ => panic!("constant {constant} under-declared for {other}"),
        };
        // takes the same arguments as the flex head, result type is the
        // constant's argument type
        let helper_ty = wrap_with_lambdas(arg_ty, &flex_arg_tys);
        partial_fun_ty = rest;
        let helper = sess.fresh_var("H", helper_ty);
        new_args.push(Rc::new(
            Application::new(helper.clone().into(), helper_args.clone()).into(),
        ) as Rc<Term>);
        let arg_app: Rc<Term> =
            Rc::new(Application::new(helper.into(), arguments.to_vec()).into());
        worklist.push(arg_app, rigid_arg.clone());
    }

    let imitation: Rc<Term> = Rc::new(Application::new(constant.clone().into(), new_args).into());
    let var_match = wrap_with_lambdas(imitation, &flex_arg_tys);
    current.add(sess, function, var_match)
}

/// `F x1..xn =?= G y1..ym` with both heads unbound.
#[allow(clippy::too_many_arguments)]
fn flex_flex(
    sess: &mut Session,
    function: &FreeVar,
    arguments: &[Rc<Term>],
    other: &Rc<Term>,
    other_app: &Application,
    other_function: &FreeVar,
    current: &mut Substitution,
    worklist: &mut Worklist,
) -> UnifyResult {
    if let Some(t) = current.get(other_function).cloned() {
        let resolved = t.apply(other_app.args(), 0);
        let reapplied = Rc::new(Term::from(Atom::FreeVar(function.clone()))).apply(arguments, 0);
        worklist.push(resolved, reapplied);
        return Ok(());
    }

    if function == other_function {
        // same head: all argument positions are assumed used (flexflex1)
        assert_eq!(
            arguments.len(),
            other_app.args().len(),
            "args to var must be of equal length"
        );
        for (a, b) in other_app.args().iter().zip(arguments) {
            worklist.push(a.clone(), b.clone());
        }
        return Ok(());
    }

    let flex = flex_app_term(function, arguments);
    if !is_pattern_args(&Atom::FreeVar(function.clone()), arguments) {
        log::trace!("not pattern: {flex}");
        let Term::Application(flex_app) = &*flex else { unreachable!() };
        return try_eta_long_case(sess, flex_app, other_app, current);
    }
    if !other_app.is_pattern() {
        log::trace!("not pattern: {other}");
        let Term::Application(flex_app) = &*flex else { unreachable!() };
        return try_eta_long_case(sess, other_app, flex_app, current);
    }

    // both sides are patterns with distinct heads (flexflex2): a fresh H
    // over the argument positions common to both sides
    let mut common_args: Vec<Rc<Term>> = other_app.args().to_vec();
    let mut common_arg_tys = arg_types_n(other_function.ty(), other_app.args().len());
    let mut residual_ty = other_function.ty();
    let mut i = 0;
    while i < common_args.len() {
        residual_ty = match &*residual_ty {
            Term::Abstraction(abs) => abs.body().clone(),
            _ => panic!("type of {other_function} shorter than its argument list"),
        };
        if arguments.contains(&common_args[i]) {
            i += 1;
        } else {
            common_args.remove(i);
            common_arg_tys.remove(i);
        }
    }

    let h_ty = wrap_with_lambdas(residual_ty, &common_arg_tys);
    let h = sess.fresh_var("H", h_ty);

    let var_match = compute_var_match(
        &h,
        &common_args,
        other_app.args(),
        &arg_types_n(other_function.ty(), other_app.args().len()),
        current,
    )
    .ok_or_else(|| UnifyError::failed(&flex, other))?;
    let other_var_match = compute_var_match(
        &h,
        &common_args,
        arguments,
        &arg_types_n(function.ty(), arguments.len()),
        current,
    )
    .ok_or_else(|| UnifyError::failed(&flex, other))?;

    current.add(sess, other_function, var_match)?;
    current.add(sess, function, other_var_match)?;
    Ok(())
}

/// Rebuild `H` applied to the common arguments, renumbered into the frame of
/// `args`, and wrapped in one binder per argument. `None` when a common
/// argument does not occur in `args`.
fn compute_var_match(
    h: &FreeVar,
    common_args: &[Rc<Term>],
    args: &[Rc<Term>],
    arg_tys: &[Rc<Term>],
    current: &Substitution,
) -> Option<Rc<Term>> {
    let substituted: Vec<Rc<Term>> = args.iter().map(|t| t.substitute(current)).collect();
    let mut h_args = Vec::with_capacity(common_args.len());
    for t in common_args {
        let t = t.substitute(current);
        let found = substituted.iter().position(|o| *o == t)?;
        h_args.push(Rc::new(BoundVar::new((args.len() - found) as isize).into()) as Rc<Term>);
    }
    let var_match: Rc<Term> = if h_args.is_empty() {
        Rc::new(h.clone().into())
    } else {
        Rc::new(Application::new(h.clone().into(), h_args).into())
    };
    Some(wrap_with_lambdas(var_match, arg_tys))
}

/// Last resort for a flex-flex pair where `non_pattern` is not a pattern:
/// when the other side `G y1..ym` is a pattern and the non-pattern side only
/// uses bound variables among the y's, bind `G` to the eta-long form of the
/// non-pattern side with its indices renumbered into G's frame.
fn try_eta_long_case(
    sess: &mut Session,
    non_pattern: &Application,
    pattern_side: &Application,
    current: &mut Substitution,
) -> UnifyResult {
    assert!(
        matches!(non_pattern.head(), Atom::FreeVar(_))
            && matches!(pattern_side.head(), Atom::FreeVar(_)),
        "eta-long recovery requires two flex applications"
    );
    assert!(!non_pattern.is_pattern(), "eta-long recovery applied to a pattern");

    let non_pattern_term: Rc<Term> = Rc::new(non_pattern.clone().into());
    let pattern_term: Rc<Term> = Rc::new(pattern_side.clone().into());

    if pattern_side.is_pattern() {
        let m = pattern_side.args().len();
        let mut max_index = 0usize;
        for arg in pattern_side.args() {
            if let Term::BoundVar(bv) = &**arg {
                max_index = max_index.max(bv.index as usize);
            }
        }
        // inverse[i] = m - j when @i+1 is the j-th argument, 0 when unused
        let mut inverse = vec![0usize; max_index];
        for (j, arg) in pattern_side.args().iter().enumerate() {
            let Term::BoundVar(bv) = &**arg else { unreachable!("pattern args are bound vars") };
            let i = bv.index as usize;
            assert_eq!(0, inverse[i - 1], "not really a pattern");
            inverse[i - 1] = m - j;
        }
        log::trace!("potential eta-long case: {non_pattern} = {pattern_side}, {inverse:?}");

        let applicable = !non_pattern_term.has_bound_var_above(max_index as isize)
            && (0..max_index).all(|i| {
                inverse[i] != 0 || !non_pattern_term.has_bound_var((i + 1) as isize)
            });
        if applicable {
            let pattern_head = match pattern_side.head() {
                Atom::FreeVar(v) => v.clone(),
                Atom::Constant(_) => unreachable!(),
            };
            let abs = wrapping_abstractions(&pattern_head.ty());
            let mut temp_tys = Vec::with_capacity(max_index);
            let mut temp_args: Vec<Rc<Term>> = Vec::with_capacity(max_index);
            for i in 0..max_index {
                if inverse[i] == 0 {
                    temp_tys.push(Rc::new(Constant::unknown().into()));
                    // unused position, any placeholder term will do
                    temp_args.push(non_pattern_term.clone());
                } else {
                    let j = inverse[i] - 1;
                    temp_tys.push(abs[j].arg_ty.clone());
                    temp_args.push(Rc::new(BoundVar::new((j + 1) as isize).into()));
                }
            }
            temp_tys.reverse();
            temp_args.reverse();
            let converted = wrap_with_lambdas(non_pattern_term.clone(), &temp_tys);
            let renumbered = converted.apply(&temp_args, 0);
            let binding = wrap_with_abstractions(&abs, renumbered);
            log::trace!("eta-long case: {pattern_head} ==> {binding}");
            return current.add(sess, &pattern_head, binding);
        }
    }

    Err(UnifyError::incomplete(&pattern_term, &non_pattern_term))
}

/// Collect flex argument positions (zero-based) that hold bound variables
/// above `bound`; those positions can be dropped from the flex variable's
/// type. Returns false when an escaping bound variable sits anywhere else.
fn select_unusable_positions(
    t: &Term,
    bound: isize,
    unusable: &mut FxHashSet<(FreeVar, usize)>,
) -> bool {
    match t {
        Term::Abstraction(abs) => {
            select_unusable_positions(&abs.arg_ty, bound, unusable)
                && select_unusable_positions(abs.body(), bound + 1, unusable)
        }
        Term::Application(app) => match app.head() {
            Atom::FreeVar(v) => {
                let mut result = true;
                for (i, arg) in app.args().iter().enumerate() {
                    match &**arg {
                        Term::BoundVar(bv) => {
                            if bv.index > bound {
                                unusable.insert((v.clone(), i));
                            }
                        }
                        _ => result &= select_unusable_positions(arg, bound, unusable),
                    }
                }
                result
            }
            Atom::Constant(_) => app
                .args()
                .iter()
                .all(|arg| select_unusable_positions(arg, bound, unusable)),
        },
        Term::BoundVar(bv) => bv.index <= bound,
        Term::Constant(_) | Term::FreeVar(_) => true,
    }
}

/// Give `v` a narrower type without the given argument positions, and bind
/// it to the narrowed replacement variable.
fn rebind_without_positions(
    sess: &mut Session,
    current: &mut Substitution,
    v: &FreeVar,
    positions: &FxHashSet<usize>,
) -> UnifyResult {
    let mut ty = v.ty();
    let mut old_tys = Vec::new();
    let mut old_names = Vec::new();
    let mut new_tys = Vec::new();
    let mut new_names = Vec::new();
    let mut i = 0;
    loop {
        let (arg_name, arg_ty, body) = match &*ty {
            Term::Abstraction(abs) => {
                (abs.arg_name.clone(), abs.arg_ty.clone(), abs.body().clone())
            }
            _ => break,
        };
        old_tys.push(arg_ty.clone());
        old_names.push(arg_name.clone());
        if positions.contains(&i) {
            // assumes the types of later parameters do not depend on the
            // removed position
            ty = body.incr_free_debruijn(-1);
        } else {
            new_tys.push(arg_ty);
            new_names.push(arg_name);
            ty = body;
        }
        i += 1;
    }
    let new_ty = wrap_with_lambdas_named(ty, &new_tys, &new_names);
    let new_v = sess.fresh_var(v.name.clone(), new_ty);
    let replacement: Rc<Term> = if new_tys.is_empty() {
        Rc::new(new_v.into())
    } else {
        let n = new_tys.len();
        let args = (0..n)
            .map(|j| Rc::new(BoundVar::new((n - j) as isize).into()) as Rc<Term>)
            .collect();
        Rc::new(Application::new(new_v.into(), args).into())
    };
    current.add(sess, v, wrap_with_lambdas_named(replacement, &old_tys, &old_names))
}

fn flex_app_term(function: &FreeVar, arguments: &[Rc<Term>]) -> Rc<Term> {
    Rc::new(Application::new(function.clone().into(), arguments.to_vec()).into())
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

    fn a2() -> Constant {
        con("a2", abs(a(), a()))
    }

    fn e() -> Rc<Term> {
        Rc::new(con("e", kind()).into())
    }

    fn eapp() -> Constant {
        con("app", abs(e(), abs(e(), e())))
    }

    fn t() -> Rc<Term> {
        Rc::new(con("t", kind()).into())
    }

    fn top() -> Rc<Term> {
        Rc::new(con("Top", t()).into())
    }

    fn arrow() -> Constant {
        con("->", abs(t(), abs(t(), t())))
    }

    fn subt(lhs: Rc<Term>, rhs: Rc<Term>) -> Rc<Term> {
        app(con("subt", abs(t(), abs(t(), kind()))), vec![lhs, rhs])
    }

    fn hast(subject: Rc<Term>, ty: Rc<Term>) -> Rc<Term> {
        app(con("has-type", abs(e(), abs(t(), kind()))), vec![subject, ty])
    }

    /// Transitivity of subtyping, as a derivation constructor.
    fn subt_trans() -> Constant {
        let t1 = var("T1", t());
        let t2 = var("T2", t());
        let t3 = var("T3", t());
        con(
            "SA-Trans",
            abs(
                subt(term(t1.clone()), term(t2.clone())),
                abs(
                    subt(term(t2), term(t3.clone())),
                    abs(subt(term(t1), term(t3)), Rc::new(con("SA-Trans-fam", kind()).into())),
                ),
            ),
        )
    }

    /// The application typing rule, as a derivation constructor.
    fn hast_app_rule() -> Constant {
        let e1 = var("E1", e());
        let e2 = var("E2", e());
        let tv = var("T", t());
        let tp = var("T'", t());
        con(
            "T-App",
            abs(
                hast(term(e1.clone()), app(arrow(), vec![term(tv.clone()), term(tp.clone())])),
                abs(
                    hast(term(e2.clone()), term(tv)),
                    abs(
                        hast(app(eapp(), vec![term(e1), term(e2)]), term(tp)),
                        Rc::new(con("T-App-fam", kind()).into()),
                    ),
                ),
            ),
        )
    }

    /// The variable typing rule: its premise binds a variable.
    fn tvar_rule() -> Constant {
        let tv = var("T", t());
        con(
            "T-Var",
            abs(
                abs(e(), abs(hast(bvar(1), term(tv.clone())), hast(bvar(2), term(tv)))),
                Rc::new(con("T-Var-fam", kind()).into()),
            ),
        )
    }

    #[test]
    fn var_to_constant() {
        let mut sess = session();
        let av = var("A", a());
        let sub = unify(&mut sess, &term(av.clone()), &a1()).unwrap();
        assert_eq!(Some(&a1()), sub.get(&av));
        assert!(sub.is_unifier(&term(av), &a1()));
    }

    #[test]
    fn var_to_structure() {
        let mut sess = session();
        let av = var("A", a());
        let rhs = app1(a2(), a1());
        let sub = unify(&mut sess, &term(av.clone()), &rhs).unwrap();
        assert_eq!(Some(&rhs), sub.get(&av));
        assert!(sub.is_unifier(&term(av), &rhs));
    }

    #[test]
    fn match_structure() {
        let mut sess = session();
        let av = var("A", a());
        let lhs = app1(a2(), term(av.clone()));
        let rhs = app1(a2(), a1());
        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert_eq!(Some(&a1()), sub.get(&av));
        assert!(sub.is_unifier(&lhs, &rhs));
    }

    #[test]
    fn match_function_outside_pattern_fragment() {
        let mut sess = session();
        let av = var("A", abs(a(), a()));
        let lhs = app1(av.clone(), a1());
        let rhs = app1(a2(), a1());
        let err = unify(&mut sess, &lhs, &rhs).unwrap_err();
        assert!(err.is_incomplete());
        // a solution exists, the solver just does not search for it
        let mut sub = Substitution::new();
        sub.add(&mut sess, &av, abs(a(), app1(a2(), bvar(1)))).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
    }

    #[test]
    fn rigid_mismatch_fails() {
        let mut sess = session();
        let err = unify(&mut sess, &a1(), &app1(a2(), a1())).unwrap_err();
        assert!(matches!(*err, UnifyError::Failed { .. }));
    }

    #[test]
    fn incompatible_types_fail() {
        let mut sess = session();
        let err = unify(&mut sess, &a1(), &top()).unwrap_err();
        assert!(matches!(*err, UnifyError::Failed { .. }));
    }

    #[test]
    fn occurs_check_through_unify() {
        let mut sess = session();
        let x = var("X", a());
        let rhs = app1(a2(), term(x.clone()));
        let err = unify(&mut sess, &term(x), &rhs).unwrap_err();
        assert!(matches!(*err, UnifyError::OccursCheck { .. }));
    }

    #[test]
    fn projection_and_imitation_solve_transitivity_instance() {
        let mut sess = session();
        let v434 = var("T434", abs(t(), abs(t(), t())));
        let v435 = var("T435", abs(t(), abs(t(), t())));
        let v436 = var("T436", abs(t(), abs(t(), t())));

        let lhs = app(
            subt_trans(),
            vec![
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(bvar(2), app(arrow(), vec![bvar(4), bvar(4)])),
                            ),
                        ),
                    ),
                ),
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(
                                    app(arrow(), vec![bvar(4), bvar(4)]),
                                    app(arrow(), vec![bvar(4), top()]),
                                ),
                            ),
                        ),
                    ),
                ),
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(bvar(2), app(arrow(), vec![bvar(4), top()])),
                            ),
                        ),
                    ),
                ),
            ],
        );
        let rhs = app(
            subt_trans(),
            vec![
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(
                                    app(v434.clone(), vec![bvar(4), bvar(2)]),
                                    app(v435.clone(), vec![bvar(4), bvar(2)]),
                                ),
                            ),
                        ),
                    ),
                ),
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(
                                    app(v435.clone(), vec![bvar(4), bvar(2)]),
                                    app(v436.clone(), vec![bvar(4), bvar(2)]),
                                ),
                            ),
                        ),
                    ),
                ),
                abs(
                    t(),
                    abs(
                        subt(bvar(1), top()),
                        abs(
                            t(),
                            abs(
                                subt(bvar(1), app(arrow(), vec![bvar(3), bvar(3)])),
                                subt(
                                    app(v434.clone(), vec![bvar(4), bvar(2)]),
                                    app(v436.clone(), vec![bvar(4), bvar(2)]),
                                ),
                            ),
                        ),
                    ),
                ),
            ],
        );

        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        assert_eq!(Some(&abs(t(), abs(t(), bvar(1)))), sub.get(&v434));
        assert_eq!(
            Some(&abs(t(), abs(t(), app(arrow(), vec![bvar(2), bvar(2)])))),
            sub.get(&v435)
        );
        assert_eq!(
            Some(&abs(t(), abs(t(), app(arrow(), vec![bvar(2), top()])))),
            sub.get(&v436)
        );
    }

    #[test]
    fn typing_rule_with_unknown_premises() {
        let mut sess = session();
        let tau = var("tau", t());
        let tau17 = var("tau17", t());
        let tau16 = var("tau16", t());
        let e18 = var("e18", abs(e(), e()));
        let e19 = var("e19", abs(e(), e()));

        let lhs = app(
            hast_app_rule(),
            vec![
                abs(
                    e(),
                    abs(
                        hast(bvar(1), term(tau.clone())),
                        hast(
                            app1(e18.clone(), bvar(2)),
                            app(arrow(), vec![term(tau17.clone()), term(tau16.clone())]),
                        ),
                    ),
                ),
                abs(
                    e(),
                    abs(
                        hast(bvar(1), term(tau.clone())),
                        hast(app1(e19.clone(), bvar(2)), term(tau17.clone())),
                    ),
                ),
                abs(
                    e(),
                    abs(
                        hast(bvar(1), term(tau.clone())),
                        hast(
                            app(
                                eapp(),
                                vec![app1(e18.clone(), bvar(2)), app1(e19.clone(), bvar(2))],
                            ),
                            term(tau16.clone()),
                        ),
                    ),
                ),
            ],
        );

        let unknown: Rc<Term> = Rc::new(Constant::unknown().into());
        let h20 = var("has-type-20", unknown.clone());
        let h21 = var("has-type-21", unknown);
        let ev = var("E", e());
        let taup = var("tau'", t());
        let rhs = app(
            hast_app_rule(),
            vec![
                term(h20.clone()),
                term(h21.clone()),
                abs(
                    e(),
                    abs(
                        hast(bvar(1), term(tau.clone())),
                        hast(term(ev.clone()), term(taup.clone())),
                    ),
                ),
            ],
        );

        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        assert_eq!(Some(&term(tau16.clone())), sub.get(&taup));

        // e18 and e19 were applied to a variable that cannot appear in the
        // result, so each is narrowed to a constant function on a fresh var
        let fresh = |v: &FreeVar| match sub.get(v).map(|b| &**b) {
            Some(Term::Abstraction(abs)) => match &**abs.body() {
                Term::FreeVar(inner) => inner.clone(),
                other => panic!("expected a narrowed variable, got {other}"),
            },
            other => panic!("expected a constant function binding, got {other:?}"),
        };
        let fresh18 = fresh(&e18);
        let fresh19 = fresh(&e19);
        assert_ne!(0, fresh18.stamp);
        assert_eq!(
            Some(&app(eapp(), vec![term(fresh18.clone()), term(fresh19)])),
            sub.get(&ev)
        );
        let expected_h20 = abs(
            e(),
            abs(
                hast(bvar(1), term(tau)),
                hast(
                    term(fresh18),
                    app(arrow(), vec![term(tau17), term(tau16)]),
                ),
            ),
        );
        assert_eq!(Some(&expected_h20), sub.get(&h20));
    }

    #[test]
    fn bound_variable_escape_fails() {
        let mut sess = session();
        let tau5 = var("tau5", t());
        let tau1 = var("tau1", t());
        let tau2 = var("tau2", t());
        let ev = var("E", e());
        let lhs = app1(
            tvar_rule(),
            abs(
                e(),
                abs(
                    hast(bvar(1), term(tau5.clone())),
                    hast(bvar(2), term(tau5)),
                ),
            ),
        );
        // E cannot stand for the bound variable
        let rhs = app1(
            tvar_rule(),
            abs(
                e(),
                abs(hast(bvar(1), term(tau1)), hast(term(ev), term(tau2))),
            ),
        );
        let err = unify(&mut sess, &lhs, &rhs).unwrap_err();
        assert!(matches!(*err, UnifyError::Failed { .. }));
    }

    #[test]
    fn escaping_argument_is_dropped_by_narrowing() {
        let mut sess = session();
        // c : (a -> a) -> a
        let c = con("c", abs(abs(a(), a()), a()));
        let ev = var("E", a());
        let f = var("F", abs(a(), abs(a(), a())));
        let lhs = app1(c.clone(), abs(a(), term(ev.clone())));
        let rhs = app1(c, abs(a(), app(f.clone(), vec![bvar(1), a1()])));
        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        // F's first parameter went out of scope; it is rebound to a narrowed
        // fresh variable and E no longer mentions the binder
        match sub.get(&ev).map(|b| &**b) {
            Some(Term::Application(app)) => {
                let head = app.head().as_free_var().unwrap();
                assert_eq!("F", head.name);
                assert_ne!(0, head.stamp);
                assert_eq!(vec![a1()], app.args().to_vec());
            }
            other => panic!("expected a narrowed application, got {other:?}"),
        }
    }

    #[test]
    fn non_pattern_application_is_incomplete() {
        let mut sess = session();
        let f = var("F", abs(a(), a()));
        let x = var("X", a());
        let lhs = app1(f.clone(), term(x.clone()));
        let rhs = app1(a2(), a1());
        let err = unify(&mut sess, &lhs, &rhs).unwrap_err();
        assert!(err.is_incomplete());
        // again the obvious solution exists outside the pattern fragment
        let mut sub = Substitution::new();
        sub.add(&mut sess, &f, Rc::new(a2().into())).unwrap();
        sub.add(&mut sess, &x, a1()).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
    }

    #[test]
    fn eventual_pattern_is_deferred_until_solvable() {
        let mut sess = session();
        let f = var("F", abs(a(), a()));
        let g = var("G", abs(a(), a()));
        let x = var("X", a());
        let ax = con("ax", abs(a(), abs(abs(a(), a()), abs(abs(a(), a()), abs(a(), kind())))));
        let lhs = app(
            ax.clone(),
            vec![
                app1(f.clone(), term(x.clone())),
                abs(a(), app1(f.clone(), bvar(1))),
                abs(a(), a1()),
                app1(f.clone(), term(x.clone())),
            ],
        );
        let rhs = app(
            ax,
            vec![
                app1(g.clone(), term(x.clone())),
                abs(a(), bvar(1)),
                abs(a(), app1(g.clone(), bvar(1))),
                app1(g.clone(), term(x.clone())),
            ],
        );
        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        assert_eq!(Some(&abs(a(), bvar(1))), sub.get(&f));
        assert_eq!(Some(&abs(a(), a1())), sub.get(&g));
        assert_eq!(Some(&a1()), sub.get(&x));
    }

    #[test]
    fn flex_flex_keeps_common_arguments() {
        let mut sess = session();
        let f = var("F", abs(a(), abs(a(), a())));
        let g = var("G", abs(a(), a()));
        // the argument lists are permuted so neither side eta-contracts to a
        // bare variable; the only shared argument is the outer binder
        let lhs = abs(a(), abs(a(), app(f.clone(), vec![bvar(1), bvar(2)])));
        let rhs = abs(a(), abs(a(), app1(g.clone(), bvar(2))));
        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        // both heads collapse onto one fresh variable over the shared
        // argument, and F's unshared argument is dropped
        let fb = sub.get(&f).cloned().unwrap();
        let gb = sub.get(&g).cloned().unwrap();
        assert_eq!(gb.apply(&[a1()], 0), fb.apply(&[app1(a2(), a1()), a1()], 0));
    }

    #[test]
    fn eta_long_recovery_binds_pattern_head() {
        let mut sess = session();
        let f = var("F", abs(a(), abs(a(), a())));
        let g = var("G", abs(a(), abs(a(), a())));
        // the left side is not a pattern, but the right side is and can be
        // bound to a reindexed copy of the left
        let lhs = abs(
            a(),
            abs(a(), app(f.clone(), vec![bvar(2), app1(a2(), bvar(1))])),
        );
        let rhs = abs(a(), abs(a(), app(g.clone(), vec![bvar(1), bvar(2)])));
        let sub = unify(&mut sess, &lhs, &rhs).unwrap();
        assert!(sub.is_unifier(&lhs, &rhs));
        assert!(sub.get(&g).is_some());
        assert!(sub.get(&f).is_none());
    }

    #[test]
    fn instance_relationships() {
        let mut sess = session();
        let x = var("X", a());

        // a1 is an instance of X
        let sub = instance_of(&mut sess, &a1(), &term(x.clone())).unwrap();
        assert_eq!(Some(&a1()), sub.get(&x));

        // X is not an instance of a1
        let err = instance_of(&mut sess, &term(x.clone()), &a1()).unwrap_err();
        assert!(matches!(*err, UnifyError::Failed { .. }));

        // structure under a rigid head
        let av = var("A", a());
        let sub = instance_of(&mut sess, &app1(a2(), a1()), &app1(a2(), term(av.clone()))).unwrap();
        assert_eq!(Some(&a1()), sub.get(&av));

        // a variable is an instance of another variable
        let y = var("Y", a());
        let sub = instance_of(&mut sess, &term(x.clone()), &term(y.clone())).unwrap();
        assert!(sub.get(&x).is_none());
        assert!(sub.is_unifier(&term(x), &term(y)));
    }
}
