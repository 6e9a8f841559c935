mod free_vars;
mod occurs;
mod shift;
mod subst;

pub use free_vars::*;
pub use occurs::*;
pub use shift::*;
pub use subst::*;
