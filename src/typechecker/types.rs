//! Type equality, compatibility, unification, literal fit, and type
//! validation.

use crate::{
    ast::{ExprId, ExprKind, Primitive, StmtId, StmtKind, Type, TypeFamily, TUPLE_TYPE_PREFIX},
    error::{CompileResult, SourceLocation},
    evaluator::{CtValue, CteQuery},
    resolver::SymbolKind,
};

use super::TypeChecker;

impl<'a> TypeChecker<'a> {
    pub(crate) fn make_fresh_typevar(&mut self) -> Type {
        let name = format!("T{}", self.type_var_counter);
        self.type_var_counter += 1;
        Type::Var(name)
    }

    /// Walk unification-variable bindings to normal form.
    pub fn resolve_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(name) => match self.type_var_bindings.get(name) {
                Some(bound) => self.resolve_type(&bound.clone()),
                None => ty.clone(),
            },
            Type::Array { element, size } => Type::Array {
                element: Box::new(self.resolve_type(element)),
                size: *size,
            },
            _ => ty.clone(),
        }
    }

    /// Bind a unification variable; variables are bound at most once.
    pub(crate) fn bind_typevar(&mut self, var: &Type, target: &Type) {
        if let Type::Var(name) = var {
            if !self.type_var_bindings.contains_key(name) {
                self.type_var_bindings.insert(name.clone(), target.clone());
            }
        }
    }

    pub(crate) fn types_equal(&self, a: &Type, b: &Type) -> bool {
        match (a, b) {
            (Type::Primitive(pa), Type::Primitive(pb)) => pa == pb,
            (Type::Named(na), Type::Named(nb)) => na == nb,
            (Type::Var(na), Type::Var(nb)) => na == nb,
            (
                Type::Array {
                    element: ea,
                    size: sa,
                },
                Type::Array {
                    element: eb,
                    size: sb,
                },
            ) => {
                if !self.types_equal(ea, eb) {
                    return false;
                }
                // Sizes compare by literal value when both are known;
                // unknown sizes are considered equal.
                match (
                    sa.and_then(|s| self.program.arena.int_literal_value(s)),
                    sb.and_then(|s| self.program.arena.int_literal_value(s)),
                ) {
                    (Some((va, _)), Some((vb, _))) => va == vb,
                    _ => true,
                }
            }
            _ => false,
        }
    }

    /// Is a value of type `a` usable where `b` is expected? Type variables
    /// and absent types are permissive; primitives widen within a family.
    pub(crate) fn types_compatible(&self, a: Option<&Type>, b: Option<&Type>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return true;
        };
        let a = self.resolve_type(a);
        let b = self.resolve_type(b);
        if self.types_equal(&a, &b) {
            return true;
        }
        if a.is_var() || b.is_var() {
            return true;
        }

        if let (
            Type::Array {
                element: ea,
                size: sa,
            },
            Type::Array {
                element: eb,
                size: sb,
            },
        ) = (&a, &b)
        {
            if !self.types_compatible(Some(ea), Some(eb)) {
                return false;
            }
            if let (Some((va, _)), Some((vb, _))) = (
                sa.and_then(|s| self.program.arena.int_literal_value(s)),
                sb.and_then(|s| self.program.arena.int_literal_value(s)),
            ) {
                if va != vb {
                    return false;
                }
            }
            return true;
        }

        if let (Type::Primitive(pa), Type::Primitive(pb)) = (&a, &b) {
            if self.types_in_same_family(&a, &b) {
                return bits_of(*pa) <= bits_of(*pb);
            }
            // Crossing families needs an explicit cast.
            return false;
        }

        false
    }

    /// Join two types: within a family the larger width wins; across
    /// families the left type is kept.
    pub(crate) fn unify_types(&self, a: Option<Type>, b: Option<Type>) -> Option<Type> {
        let a = a.map(|t| self.resolve_type(&t));
        let b = b.map(|t| self.resolve_type(&t));
        match (a, b) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => {
                if self.types_equal(&a, &b) {
                    return Some(a);
                }
                if let (Type::Primitive(pa), Type::Primitive(pb)) = (&a, &b) {
                    if self.types_in_same_family(&a, &b) {
                        return Some(if bits_of(*pa) <= bits_of(*pb) { b } else { a });
                    }
                }
                Some(a)
            }
        }
    }

    pub(crate) fn types_in_same_family(&self, a: &Type, b: &Type) -> bool {
        a.family() == b.family() && a.family() != TypeFamily::Other
    }

    /// Smallest primitive type that fits a literal. Bare integers are typed
    /// as integers; boolean contexts accept 0/1 through
    /// `literal_assignable_to` instead.
    pub(crate) fn infer_literal_type(&self, expr: ExprId) -> Option<Type> {
        match &self.program.arena.expr(expr).kind {
            ExprKind::Int {
                value, unsigned, ..
            } => {
                if *unsigned {
                    let primitive = if *value <= 0xFF {
                        Primitive::U8
                    } else if *value <= 0xFFFF {
                        Primitive::U16
                    } else if *value <= 0xFFFF_FFFF {
                        Primitive::U32
                    } else {
                        Primitive::U64
                    };
                    return Some(Type::Primitive(primitive));
                }
                let value = *value as i64;
                let primitive = if (-128..=127).contains(&value) {
                    Primitive::I8
                } else if (-32768..=32767).contains(&value) {
                    Primitive::I16
                } else if (-2147483648..=2147483647).contains(&value) {
                    Primitive::I32
                } else {
                    Primitive::I64
                };
                Some(Type::Primitive(primitive))
            }
            ExprKind::Float { .. } => Some(Type::Primitive(Primitive::F64)),
            ExprKind::Str { .. } => Some(Type::Primitive(Primitive::Str)),
            ExprKind::Char { .. } => Some(Type::Primitive(Primitive::U8)),
            _ => None,
        }
    }

    /// Range-fit test for literals against a primitive target; drives
    /// implicit widening at assignment, return, and argument positions.
    pub(crate) fn literal_assignable_to(&mut self, target: &Type, expr: ExprId) -> bool {
        let Type::Primitive(target_prim) = self.resolve_type(target) else {
            return false;
        };

        let kind = self.program.arena.expr(expr).kind.clone();
        match kind {
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => match self.constexpr_condition(condition) {
                Some(true) => self.literal_assignable_to(target, true_expr),
                Some(false) => self.literal_assignable_to(target, false_expr),
                None => {
                    self.literal_assignable_to(target, true_expr)
                        && self.literal_assignable_to(target, false_expr)
                }
            },
            ExprKind::Int { value, unsigned, .. } => {
                int_literal_fits(value, unsigned, target_prim)
            }
            ExprKind::Char { value } => int_literal_fits(value as u64, false, target_prim),
            ExprKind::Float { .. } => target_prim.is_float(),
            _ => false,
        }
    }

    /// Validate a type annotation: array sizes must be non-negative
    /// compile-time integers (and are canonicalised to literal sizes), and
    /// named types must not be directly recursive. Returns the canonical
    /// type.
    pub(crate) fn validate_type(
        &mut self,
        ty: &Type,
        location: &SourceLocation,
    ) -> CompileResult<Type> {
        match ty {
            Type::Array { element, size } => {
                let element = self.validate_type(element, location)?;
                let mut canonical_size = *size;
                if let Some(size) = size {
                    match self.query_constexpr(*size) {
                        CteQuery::Known(value) => {
                            let literal = match value {
                                CtValue::Int(v) => {
                                    if v < 0 {
                                        return Err(self
                                            .err("Array size must be non-negative", location));
                                    }
                                    v as u64
                                }
                                CtValue::Uint(v) => v,
                                CtValue::Bool(v) => v as u64,
                                _ => {
                                    return Err(self.err(
                                        "Array size must be an integer compile-time constant",
                                        location,
                                    ))
                                }
                            };
                            // Canonical form: sizes become integer literal
                            // expressions once fully evaluable.
                            if self.program.arena.int_literal_value(*size)
                                != Some((literal, false))
                            {
                                let loc = self.expr_location(*size);
                                canonical_size = Some(self.program.arena.make_int(literal, loc));
                            }
                        }
                        CteQuery::Error(message) => {
                            let message = if message.is_empty() {
                                "Array size evaluation failed".to_owned()
                            } else {
                                message
                            };
                            return Err(self.err(message, location));
                        }
                        CteQuery::Unknown(_) => {
                            return Err(
                                self.err("Array size must be a compile-time constant", location)
                            );
                        }
                    }
                }
                Ok(Type::Array {
                    element: Box::new(element),
                    size: canonical_size,
                })
            }
            Type::Named(name) => {
                if let Some(symbol) = self.lookup_global(name) {
                    let info = self.bindings.symbol(symbol);
                    if info.kind == SymbolKind::Type {
                        if let Some(declaration) = info.declaration {
                            self.check_recursive_type(name, declaration, location)?;
                        }
                    }
                }
                Ok(ty.clone())
            }
            _ => Ok(ty.clone()),
        }
    }

    pub(crate) fn check_recursive_type(
        &self,
        type_name: &str,
        declaration: StmtId,
        location: &SourceLocation,
    ) -> CompileResult<()> {
        let StmtKind::TypeDecl(decl) = &self.program.arena.stmt(declaration).kind else {
            return Ok(());
        };
        for field in &decl.fields {
            if let Some(Type::Named(field_type)) = &field.ty {
                if field_type == type_name {
                    return Err(self.err(
                        format!(
                            "Recursive types are not allowed (type {type_name} contains field of its own type)"
                        ),
                        location,
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn require_boolean_expr(
        &mut self,
        expr: ExprId,
        ty: Option<&Type>,
        location: &SourceLocation,
        context: &str,
    ) -> CompileResult<()> {
        if let Some(ty) = ty {
            if self.resolve_type(ty).is_bool() {
                return Ok(());
            }
        }
        // 0 and 1 literals satisfy boolean contexts.
        let bool_type = Type::Primitive(Primitive::Bool);
        if self.literal_assignable_to(&bool_type, expr) {
            self.set_expr_type(expr, Some(bool_type));
            return Ok(());
        }
        Err(self.err(format!("{context} requires a boolean expression"), location))
    }

    pub(crate) fn require_unsigned_integer(
        &self,
        ty: Option<&Type>,
        location: &SourceLocation,
        context: &str,
    ) -> CompileResult<()> {
        let unsigned = matches!(
            ty.map(|t| self.resolve_type(t)),
            Some(Type::Primitive(p)) if p.is_unsigned_int()
        );
        if !unsigned {
            return Err(self.err(
                format!("{context} requires unsigned integer operands"),
                location,
            ));
        }
        Ok(())
    }

    /// Recover a type from a mangled tuple-name component.
    pub(crate) fn parse_type_from_component(&self, component: &str) -> Type {
        let bare = component.strip_prefix('#').unwrap_or(component);
        match Primitive::from_name(bare) {
            Some(primitive) => Type::Primitive(primitive),
            None => Type::Named(component.to_owned()),
        }
    }

    /// Synthetic tuple type name for a sequence of element types. Injective
    /// on the element-type sequence.
    pub(crate) fn tuple_type_name(&self, element_types: &[Option<Type>]) -> String {
        let mut name = format!("{TUPLE_TYPE_PREFIX}{}", element_types.len());
        for ty in element_types {
            name.push('_');
            match ty {
                Some(ty) => name.push_str(&ty.render(&self.program.arena)),
                None => name.push_str("unknown"),
            }
        }
        name
    }

    pub(crate) fn register_tuple_type(&mut self, name: &str, element_types: Vec<Type>) {
        self.tuple_types
            .entry(name.to_owned())
            .or_insert(element_types);
    }
}

fn bits_of(p: Primitive) -> u32 {
    p.bits().unwrap_or(0)
}

fn int_literal_fits(value: u64, unsigned: bool, target: Primitive) -> bool {
    let fits_signed = |min: i64, max: i64| {
        if unsigned && value > i64::MAX as u64 {
            return false;
        }
        let v = value as i64;
        v >= min && v <= max
    };
    let fits_unsigned = |max: u64| {
        if !unsigned {
            let v = value as i64;
            if v < 0 {
                return false;
            }
            return (v as u64) <= max;
        }
        value <= max
    };

    match target {
        Primitive::Bool => fits_unsigned(1),
        Primitive::I8 => fits_signed(-128, 127),
        Primitive::I16 => fits_signed(-32768, 32767),
        Primitive::I32 => fits_signed(-2147483648, 2147483647),
        Primitive::I64 => !(unsigned && value > i64::MAX as u64),
        Primitive::U8 => fits_unsigned(0xFF),
        Primitive::U16 => fits_unsigned(0xFFFF),
        Primitive::U32 => fits_unsigned(0xFFFF_FFFF),
        Primitive::U64 => fits_unsigned(u64::MAX),
        // Integer literals widen to floats.
        Primitive::F32 | Primitive::F64 => true,
        Primitive::Str => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_fit_boundaries() {
        // These seed the literal-fit rules: 127 fits i8, 128 does not;
        // 255 fits u8, 256 does not; -128 fits i8, -129 does not.
        assert!(int_literal_fits(127, false, Primitive::I8));
        assert!(!int_literal_fits(128, false, Primitive::I8));
        assert!(int_literal_fits(255, false, Primitive::U8));
        assert!(!int_literal_fits(256, false, Primitive::U8));
        assert!(int_literal_fits((-128i64) as u64, false, Primitive::I8));
        assert!(!int_literal_fits((-129i64) as u64, false, Primitive::I8));
    }

    #[test]
    fn negative_literals_do_not_fit_unsigned() {
        assert!(!int_literal_fits((-1i64) as u64, false, Primitive::U64));
        assert!(int_literal_fits(0, false, Primitive::U64));
    }

    #[test]
    fn bool_accepts_zero_and_one() {
        assert!(int_literal_fits(0, false, Primitive::Bool));
        assert!(int_literal_fits(1, false, Primitive::Bool));
        assert!(!int_literal_fits(2, false, Primitive::Bool));
    }

    #[test]
    fn integer_literals_widen_to_float() {
        assert!(int_literal_fits(7, false, Primitive::F32));
        assert!(int_literal_fits(7, false, Primitive::F64));
    }
}
