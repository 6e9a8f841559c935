use std::fmt;
use std::rc::Rc;

use derivative::Derivative;
use fxhash::FxHashSet;

use crate::traits::{FreeVars, Occurs, Shift, Substitutable, Substitution};

use super::{Atom, FreeVar, Term};

/// A declared constant: a term-level constructor, a judgment form, or a type
/// family. Two constants are the same iff their names are the same; the type
/// is declaration-site information and carries no identity.
#[derive(Debug, Clone, Derivative)]
#[derivative(Eq, PartialEq, Hash)]
pub struct Constant {
    pub name: String,
    /// `None` marks the classifier sentinel `TYPE`, which is its own type.
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub ty: Option<Rc<Term>>,
}

impl Constant {
    pub const TYPE_NAME: &'static str = "TYPE";
    pub const UNKNOWN_NAME: &'static str = "?";

    pub fn new(name: impl Into<String>, ty: Rc<Term>) -> Self {
        Constant { name: name.into(), ty: Some(ty) }
    }

    /// The classifier of all type families.
    pub fn kind() -> Self {
        Constant { name: Self::TYPE_NAME.to_owned(), ty: None }
    }

    /// The wildcard type, equal to every type under [Term::type_equals].
    pub fn unknown() -> Self {
        Constant::new(Self::UNKNOWN_NAME, Rc::new(Constant::kind().into()))
    }

    pub fn ty(&self) -> Rc<Term> {
        match &self.ty {
            Some(ty) => ty.clone(),
            None => Rc::new(self.clone().into()),
        }
    }

    pub fn is_kind(&self) -> bool {
        self.name == Self::TYPE_NAME
    }

    pub fn is_unknown(&self) -> bool {
        self.name == Self::UNKNOWN_NAME
    }
}

impl From<Constant> for Term {
    fn from(val: Constant) -> Self {
        Term::Constant(val)
    }
}

impl From<Constant> for Atom {
    fn from(val: Constant) -> Self {
        Atom::Constant(val)
    }
}

impl Shift for Constant {
    fn incr_free_debruijn_from(&self, _nested: usize, _by: isize) -> Rc<Term> {
        Rc::new(self.clone().into())
    }
}

impl Substitutable for Constant {
    fn subst<S: Substitution>(&self, _by: &S, _depth: usize) -> Rc<Term> {
        Rc::new(self.clone().into())
    }
}

impl FreeVars for Constant {
    fn free_vars_mut(&self, _fvs: &mut FxHashSet<FreeVar>) {}
}

impl Occurs for Constant {
    fn has_bound_var(&self, _i: isize) -> bool {
        false
    }

    fn has_bound_var_above(&self, _i: isize) -> bool {
        false
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
