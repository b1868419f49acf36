use std::fmt::Display;

use super::{AstArena, ExprId};

/// Built-in scalar types. `b` is the boolean and `s` the string type in
/// source syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Str,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "b",
            Primitive::Str => "s",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => Primitive::I8,
            "i16" => Primitive::I16,
            "i32" => Primitive::I32,
            "i64" => Primitive::I64,
            "u8" => Primitive::U8,
            "u16" => Primitive::U16,
            "u32" => Primitive::U32,
            "u64" => Primitive::U64,
            "f32" => Primitive::F32,
            "f64" => Primitive::F64,
            "b" => Primitive::Bool,
            "s" => Primitive::Str,
            _ => return None,
        })
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64
        )
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int() || self.is_float()
    }

    /// Bit width; strings have no fixed width.
    pub fn bits(&self) -> Option<u32> {
        Some(match self {
            Primitive::I8 | Primitive::U8 | Primitive::Bool => 8,
            Primitive::I16 | Primitive::U16 => 16,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 32,
            Primitive::I64 | Primitive::U64 | Primitive::F64 => 64,
            Primitive::Str => return None,
        })
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Widening family of a primitive. Implicit conversions stay within a
/// family; crossing families requires an explicit cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Signed,
    Unsigned,
    Float,
    Other,
}

impl Primitive {
    pub fn family(&self) -> TypeFamily {
        if self.is_signed_int() {
            TypeFamily::Signed
        } else if self.is_unsigned_int() {
            TypeFamily::Unsigned
        } else if self.is_float() {
            TypeFamily::Float
        } else {
            TypeFamily::Other
        }
    }
}

/// A Sable type. Array sizes are expressions, not numbers: a size may need
/// compile-time evaluation, and is canonicalised to an integer literal once
/// it is fully evaluable. Tuple types are `Named` with a synthetic
/// `__TupleN_...` name and a side table mapping the name to element types.
#[derive(Debug, Clone)]
pub enum Type {
    Primitive(Primitive),
    Named(String),
    Array {
        element: Box<Type>,
        size: Option<ExprId>,
    },
    /// Unification variable; bound at most once in the checker's
    /// substitution map.
    Var(String),
}

impl Type {
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Bool))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Str))
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Type::Var(_))
    }

    pub fn named(&self) -> Option<&str> {
        match self {
            Type::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Type::Primitive(p) => p.family(),
            _ => TypeFamily::Other,
        }
    }

    /// Render the type in source syntax (`#i32`, `#Point`, `#u8[4]`). Array
    /// sizes print their literal value when canonicalised, `[]` otherwise.
    pub fn render(&self, arena: &AstArena) -> String {
        match self {
            Type::Primitive(p) => format!("#{}", p.name()),
            Type::Named(name) => name.clone(),
            Type::Array { element, size } => {
                let elem = element.render(arena);
                match size.and_then(|id| arena.int_literal_value(id)) {
                    Some((value, _)) => format!("{elem}[{value}]"),
                    None => format!("{elem}[]"),
                }
            }
            Type::Var(name) => format!("'{name}"),
        }
    }
}
