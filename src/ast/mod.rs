//! AST data model for Sable.
//!
//! Nodes are owned by an [`AstArena`] and addressed by [`ExprId`] /
//! [`StmtId`] indices. Passes mutate nodes in place; rewrites (operator
//! overloading, iteration lowering, process splicing) replace a node's kind
//! but keep its id, so binding entries keyed by node id stay valid.

mod arena;
mod expr;
mod stmt;
mod types;
mod walk;

pub use arena::*;
pub use expr::*;
pub use stmt::*;
pub use types::*;
pub use walk::*;

use crate::error::SourceLocation;

/// Prefix of synthetic tuple type names: `__Tuple2_#s_#s` etc.
pub const TUPLE_TYPE_PREFIX: &str = "__Tuple";

/// Prefix of positional tuple fields: `__0`, `__1`, ...
pub const TUPLE_FIELD_PREFIX: &str = "__";

/// Prefix of compiler temporaries introduced by multi-assignment desugaring.
pub const TUPLE_TMP_PREFIX: &str = "__tmp";

/// A `[[name(args...)]]` annotation attached to a node, parameter, or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub name: String,
    pub args: Vec<String>,
    pub location: SourceLocation,
}

/// Parsed module: the statement list of one source file.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub path: String,
    pub top_level: Vec<StmtId>,
}

/// Extract the positional index of a tuple field name (`__0` -> 0).
pub fn tuple_field_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(TUPLE_FIELD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Positional tuple field name for an index (0 -> `__0`).
pub fn tuple_field_name(index: usize) -> String {
    format!("{TUPLE_FIELD_PREFIX}{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_field_names_round_trip() {
        assert_eq!(tuple_field_index(&tuple_field_name(0)), Some(0));
        assert_eq!(tuple_field_index(&tuple_field_name(17)), Some(17));
    }

    #[test]
    fn tuple_field_index_rejects_non_fields() {
        assert_eq!(tuple_field_index("x"), None);
        assert_eq!(tuple_field_index("__"), None);
        assert_eq!(tuple_field_index("__x1"), None);
        assert_eq!(tuple_field_index("_0"), None);
    }
}
