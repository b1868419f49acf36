//! Cross-cutting validation passes: annotation checking, structural AST
//! invariants between phases, and post-analysis type-use validation.

mod annotations;
mod invariants;
mod type_use;

pub use annotations::*;
pub use invariants::*;
pub use type_use::*;
