//! Shorthand constructors for assembling terms by hand, mainly used in tests
//! and by embedders that declare signatures programmatically.

use std::rc::Rc;

use crate::term::{Abstraction, Application, Atom, BoundVar, Constant, FreeVar, Term};

/// The classifier of type families.
pub fn kind() -> Rc<Term> {
    Rc::new(Constant::kind().into())
}

pub fn con(name: &str, ty: Rc<Term>) -> Constant {
    Constant::new(name, ty)
}

pub fn var(name: &str, ty: Rc<Term>) -> FreeVar {
    FreeVar::new(name, ty)
}

pub fn bvar(index: isize) -> Rc<Term> {
    Rc::new(BoundVar::new(index).into())
}

/// An anonymous binder.
pub fn abs(arg_ty: Rc<Term>, body: Rc<Term>) -> Rc<Term> {
    Abstraction::make("x", arg_ty, body)
}

pub fn abs_named(name: &str, arg_ty: Rc<Term>, body: Rc<Term>) -> Rc<Term> {
    Abstraction::make(name, arg_ty, body)
}

pub fn app(head: impl Into<Atom>, args: Vec<Rc<Term>>) -> Rc<Term> {
    Rc::new(Application::new(head.into(), args).into())
}

pub fn app1(head: impl Into<Atom>, arg: Rc<Term>) -> Rc<Term> {
    app(head, vec![arg])
}

pub fn term(atom: impl Into<Atom>) -> Rc<Term> {
    Rc::new(Term::from(atom.into()))
}
