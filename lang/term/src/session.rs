//! Per-check mutable state: the fresh variable counter and the subordination
//! relation. One session corresponds to checking one development; callers
//! that check several in a row call [Session::reinit] between them so stamps
//! and subordination edges do not leak from one to the next.

use std::rc::Rc;

use crate::subordination::Subordination;
use crate::term::{FreeVar, Term};

#[derive(Debug, Clone)]
pub struct Session {
    next_stamp: u64,
    subordination: Subordination,
}

impl Session {
    pub fn new() -> Self {
        Session { next_stamp: 1, subordination: Subordination::new() }
    }

    /// A new variable with a stamp never handed out before in this session.
    pub fn fresh_var(&mut self, name: impl Into<String>, ty: Rc<Term>) -> FreeVar {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        FreeVar::with_stamp(name, ty, stamp)
    }

    /// A renamed copy of `var`: same name and type, fresh stamp.
    pub fn freshify(&mut self, var: &FreeVar) -> FreeVar {
        self.fresh_var(var.name.clone(), var.ty.clone())
    }

    pub fn subordination(&self) -> &Subordination {
        &self.subordination
    }

    pub fn subordination_mut(&mut self) -> &mut Subordination {
        &mut self.subordination
    }

    /// Reset all session state, as when starting on a new development.
    pub fn reinit(&mut self) {
        *self = Session::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
