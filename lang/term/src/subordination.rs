//! The subordination relation between type families.
//!
//! `set_appears_in(a, b)` records that terms of family `a` may occur inside
//! terms of family `b`. The relation is kept transitively closed as edges are
//! inserted, so queries are a single set lookup. It is deliberately not
//! reflexive; self-subordination must be declared like any other edge.

use fxhash::{FxHashMap, FxHashSet};

use crate::term::Constant;

#[derive(Debug, Clone, Default)]
pub struct Subordination {
    forward: FxHashMap<Constant, FxHashSet<Constant>>,
    reverse: FxHashMap<Constant, FxHashSet<Constant>>,
}

impl Subordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` may appear in `to` and close transitively: every
    /// family that reaches `from` now also reaches `to` and everything `to`
    /// reaches. Returns false if the edge was already present.
    pub fn set_appears_in(&mut self, from: &Constant, to: &Constant) -> bool {
        if self.forward.get(from).is_some_and(|s| s.contains(to)) {
            return false;
        }
        let mut before: Vec<Constant> = match self.reverse.get(from) {
            Some(s) => s.iter().cloned().collect(),
            None => Vec::new(),
        };
        before.push(from.clone());
        let mut after: Vec<Constant> = match self.forward.get(to) {
            Some(s) => s.iter().cloned().collect(),
            None => Vec::new(),
        };
        after.push(to.clone());
        for pred in &before {
            for succ in &after {
                self.link(pred, succ);
            }
        }
        log::trace!("subordination: {from} < {to}");
        true
    }

    pub fn can_appear_in(&self, from: &Constant, to: &Constant) -> bool {
        log::trace!("testing if {from} can appear in {to}");
        self.forward.get(from).is_some_and(|s| s.contains(to))
    }

    /// Both maps must record every edge; queries read `forward`, closure on
    /// later insertions reads `reverse`.
    fn link(&mut self, from: &Constant, to: &Constant) {
        self.forward.entry(from.clone()).or_default().insert(to.clone());
        self.reverse.entry(to.clone()).or_default().insert(from.clone());
    }
}
