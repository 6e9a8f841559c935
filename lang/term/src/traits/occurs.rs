/// Occurrence checks for dangling bound variables.
///
/// The index arguments follow the same convention as [crate::traits::Shift]:
/// inside an abstraction the query index is bumped by one, so `i` always
/// refers to a binder outside of `self`.
pub trait Occurs {
    /// Whether the bound variable with index `i` occurs in `self`.
    fn has_bound_var(&self, i: isize) -> bool;

    /// Whether any bound variable with an index above `i` occurs in `self`.
    fn has_bound_var_above(&self, i: isize) -> bool;
}
