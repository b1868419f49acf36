use std::{collections::HashMap, fmt::Display, rc::Rc};

/// Compile-time value domain. Composites and arrays are shared behind `Rc`;
/// lvalue writes fork shared nodes before touching a leaf, so values cached
/// across symbols never observe mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CtValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Composite(Rc<CtComposite>),
    Array(Rc<CtArray>),
    /// Declared-but-not-yet-assigned storage.
    Uninit,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CtComposite {
    pub type_name: String,
    pub fields: HashMap<String, CtValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CtArray {
    pub elements: Vec<CtValue>,
}

impl CtValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CtValue::Int(_) => "int",
            CtValue::Uint(_) => "uint",
            CtValue::Float(_) => "float",
            CtValue::Bool(_) => "bool",
            CtValue::Str(_) => "string",
            CtValue::Composite(_) => "composite",
            CtValue::Array(_) => "array",
            CtValue::Uninit => "uninitialized",
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CtValue::Int(_) | CtValue::Uint(_) | CtValue::Float(_) | CtValue::Bool(_)
        )
    }

    /// Scalar truthiness; `None` for strings, composites, and arrays.
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            CtValue::Int(v) => Some(*v != 0),
            CtValue::Uint(v) => Some(*v != 0),
            CtValue::Bool(v) => Some(*v),
            CtValue::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn is_int_like(&self) -> bool {
        matches!(self, CtValue::Int(_) | CtValue::Uint(_))
    }
}

impl Display for CtValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CtValue::Int(v) => write!(f, "{v}"),
            CtValue::Uint(v) => write!(f, "{v}"),
            CtValue::Float(v) => write!(f, "{v}"),
            CtValue::Bool(v) => write!(f, "{v}"),
            CtValue::Str(v) => write!(f, "{v:?}"),
            CtValue::Composite(c) => write!(f, "{}(..)", c.type_name),
            CtValue::Array(a) => write!(f, "[{} elements]", a.elements.len()),
            CtValue::Uninit => f.write_str("<uninitialized>"),
        }
    }
}
