//! Recursive-descent parser for Sable.
//!
//! Parse errors do not abort the module: the parser records the diagnostic,
//! enters panic mode, and synchronises to the next statement boundary so a
//! single run reports as many errors as possible. After the whole token
//! stream has been consumed, the accumulated diagnostics are re-raised as
//! one combined compile error.

use log::trace;

use crate::{
    ast::{
        Annotation, AstArena, BinaryOp, Expr, ExprId, ExprKind, Field, FuncDecl, Module, Parameter,
        Primitive, Stmt, StmtId, StmtKind, Type, TypeDecl, UnaryOp, VarDecl, tuple_field_name,
        TUPLE_TMP_PREFIX,
    },
    error::{CompileError, CompileResult, SourceLocation},
    lexer::{Token, TokenKind},
};

pub struct Parser<'a> {
    arena: &'a mut AstArena,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<CompileError>,
    allow_statement_conditionals: bool,
    statement_expr_depth: i32,
    statement_expr_allowed_depth: i32,
    tmp_counter: usize,
}

impl<'a> Parser<'a> {
    pub fn new(arena: &'a mut AstArena, tokens: Vec<Token>) -> Self {
        Self {
            arena,
            tokens,
            pos: 0,
            errors: vec![],
            allow_statement_conditionals: false,
            statement_expr_depth: 0,
            statement_expr_allowed_depth: 0,
            tmp_counter: 0,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream always ends with EOF")
        })
    }

    fn peek(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream always ends with EOF")
        })
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().is(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> CompileResult<Token> {
        if !self.check(kind) {
            return Err(CompileError::new(message, self.current().location.clone()));
        }
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        Ok(token)
    }

    fn consume_identifier(&mut self, message: &str) -> CompileResult<(String, SourceLocation)> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let location = self.current().location.clone();
                self.pos += 1;
                Ok((name, location))
            }
            _ => Err(CompileError::new(message, self.current().location.clone())),
        }
    }

    fn skip_semis(&mut self) {
        while self.matches(&TokenKind::Semicolon) {}
    }

    /// Roll back to the saved position when the closure fails. Arena nodes
    /// allocated by the failed attempt are abandoned, not reclaimed.
    fn try_parse<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> Option<T> {
        let saved = self.pos;
        match parse(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = saved;
                None
            }
        }
    }

    /// Advance to the next plausible statement start after a parse error.
    fn synchronize(&mut self) {
        while !self.check(&TokenKind::Eof) {
            if self.previous().is(&TokenKind::Semicolon) {
                match self.current().kind {
                    TokenKind::Ampersand
                    | TokenKind::AmpersandBang
                    | TokenKind::AmpersandCaret
                    | TokenKind::Hash
                    | TokenKind::DoubleColon
                    | TokenKind::Identifier(_) => return,
                    _ => self.pos += 1,
                }
            } else {
                match self.current().kind {
                    TokenKind::Ampersand
                    | TokenKind::AmpersandBang
                    | TokenKind::AmpersandCaret
                    | TokenKind::Hash
                    | TokenKind::DoubleColon => return,
                    _ => self.pos += 1,
                }
            }
        }
    }

    pub fn parse_module(mut self, name: &str, path: &str) -> CompileResult<Module> {
        let mut module = Module {
            name: name.to_owned(),
            path: path.to_owned(),
            top_level: vec![],
        };

        while !self.check(&TokenKind::Eof) {
            self.skip_semis();
            if self.check(&TokenKind::Eof) {
                break;
            }

            let attempt = (|parser: &mut Self| -> CompileResult<StmtId> {
                let annotations = parser.parse_annotations()?;
                let stmt = parser.parse_top_level()?;
                parser.arena.stmt_mut(stmt).annotations = annotations;
                Ok(stmt)
            })(&mut self);

            match attempt {
                Ok(stmt) => {
                    module.top_level.push(stmt);
                    self.skip_semis();
                }
                Err(error) => {
                    trace!("parse error, synchronizing: {error}");
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }

        if !self.errors.is_empty() {
            let mut combined = format!("Parse failed with {} error(s):\n", self.errors.len());
            for error in &self.errors {
                combined.push_str("  ");
                combined.push_str(&error.report());
                combined.push('\n');
            }
            let location = self.errors[0].location.clone();
            return Err(CompileError::new(combined, location));
        }

        Ok(module)
    }

    fn parse_top_level(&mut self) -> CompileResult<StmtId> {
        match self.current().kind {
            TokenKind::Ampersand | TokenKind::AmpersandBang | TokenKind::AmpersandCaret => {
                self.parse_func_decl()
            }
            TokenKind::Hash => self.parse_type_decl(),
            TokenKind::DoubleColon => self.parse_import(),
            _ => self.parse_global(),
        }
    }

    fn operator_function_name(&self) -> Option<String> {
        let lexeme = match self.current().kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::Eq
            | TokenKind::Ne
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::At
            | TokenKind::DoubleAt => self.current().lexeme.clone(),
            _ => return None,
        };
        Some(lexeme)
    }

    fn parse_function_name(&mut self) -> CompileResult<String> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let name = name.clone();
            self.pos += 1;
            return Ok(name);
        }
        if let Some(name) = self.operator_function_name() {
            self.pos += 1;
            return Ok(name);
        }
        Err(CompileError::new(
            "Expected function name or overloadable operator",
            self.current().location.clone(),
        ))
    }

    fn parse_func_decl(&mut self) -> CompileResult<StmtId> {
        let location = self.current().location.clone();

        let is_external = self.matches(&TokenKind::AmpersandBang);
        let is_exported = !is_external && self.matches(&TokenKind::AmpersandCaret);
        if !is_external && !is_exported {
            self.consume(&TokenKind::Ampersand, "Expected function declaration")?;
        }

        // `&(r1,r2)name` receiver list vs `&name(value params)`: look ahead
        // for bare identifiers up to the closing paren.
        let mut ref_params = vec![];
        if self.check(&TokenKind::LParen) {
            let saved = self.pos;
            self.pos += 1;
            let mut looks_like_refs = !self.check(&TokenKind::RParen);
            while looks_like_refs
                && !self.check(&TokenKind::RParen)
                && !self.check(&TokenKind::Eof)
            {
                if !matches!(self.current().kind, TokenKind::Identifier(_)) {
                    looks_like_refs = false;
                    break;
                }
                self.pos += 1;
                if self.check(&TokenKind::Colon) || self.check(&TokenKind::Dollar) {
                    looks_like_refs = false;
                    break;
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.pos = saved;
            if looks_like_refs {
                ref_params = self.parse_ref_params()?;
            }
        }

        // `Type::method` (optionally `#Type::method`) namespacing.
        let mut type_namespace = None;
        let saved = self.pos;
        if self.matches(&TokenKind::Hash) {
            if let Some((name, _)) = self.try_parse(|p| p.consume_identifier("")) {
                if self.matches(&TokenKind::DoubleColon) {
                    type_namespace = Some(name);
                } else {
                    self.pos = saved;
                }
            } else {
                self.pos = saved;
            }
        }
        if type_namespace.is_none() {
            let saved = self.pos;
            if let Some((name, _)) = self.try_parse(|p| p.consume_identifier("")) {
                if self.matches(&TokenKind::DoubleColon) {
                    type_namespace = Some(name);
                } else {
                    self.pos = saved;
                }
            }
        }
        if type_namespace.is_some() && ref_params.len() != 1 {
            return Err(CompileError::new(
                "Type::method syntax requires exactly one receiver parameter",
                self.current().location.clone(),
            ));
        }

        // A `#` sigil on the function name itself is consumed and ignored.
        self.matches(&TokenKind::Hash);

        let name = self.parse_function_name()?;
        self.consume(&TokenKind::LParen, "Expected '('")?;
        let params = self.parse_params()?;
        self.consume(&TokenKind::RParen, "Expected ')'")?;

        let mut return_type = None;
        let mut return_types = vec![];
        if self.matches(&TokenKind::Arrow)
            && !self.check(&TokenKind::LBrace)
            && !self.check(&TokenKind::Semicolon)
        {
            if self.matches(&TokenKind::LParen) {
                loop {
                    return_types.push(self.parse_type()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(&TokenKind::RParen, "Expected ')'")?;
                if return_types.len() < 2 {
                    return Err(CompileError::new(
                        "Tuple return type must have at least 2 elements",
                        location,
                    ));
                }
            } else {
                return_type = Some(self.parse_type()?);
            }
        }

        let body = if is_external {
            self.consume(&TokenKind::Semicolon, "Expected ';' after external function")?;
            None
        } else {
            Some(self.parse_block()?)
        };

        let ref_param_count = ref_params.len();
        Ok(self.arena.alloc_stmt(Stmt::new(
            StmtKind::FuncDecl(FuncDecl {
                name,
                type_namespace,
                params,
                ref_params,
                ref_param_types: vec![None; ref_param_count],
                return_type,
                return_types,
                body,
                is_external,
                is_exported,
                is_generic: false,
                is_instantiation: false,
            }),
            location,
        )))
    }

    fn parse_type_decl(&mut self) -> CompileResult<StmtId> {
        let location = self.current().location.clone();
        self.consume(&TokenKind::Hash, "Expected '#'")?;
        let (name, _) = self.consume_identifier("Expected type name")?;
        self.consume(&TokenKind::LParen, "Expected '('")?;
        let fields = self.parse_fields()?;
        self.consume(&TokenKind::RParen, "Expected ')'")?;
        self.consume(&TokenKind::Semicolon, "Expected ';'")?;
        Ok(self
            .arena
            .alloc_stmt(Stmt::new(StmtKind::TypeDecl(TypeDecl { name, fields }), location)))
    }

    fn parse_import(&mut self) -> CompileResult<StmtId> {
        let location = self.current().location.clone();
        self.consume(&TokenKind::DoubleColon, "Expected '::'")?;

        // `:: "command" -> var;` splices a process expression into a
        // string constant.
        if let TokenKind::Str(command) = &self.current().kind {
            let command = command.clone();
            self.pos += 1;
            self.consume(&TokenKind::Arrow, "Expected '->' after process command")?;
            let (var_name, _) = self.consume_identifier("Expected identifier after ->")?;
            self.consume(&TokenKind::Semicolon, "Expected ';'")?;
            let process = self
                .arena
                .alloc_expr(Expr::new(ExprKind::Process { command }, location.clone()));
            return Ok(self.arena.alloc_stmt(Stmt::new(
                StmtKind::VarDecl(VarDecl {
                    name: var_name,
                    ty: Some(Type::Primitive(Primitive::Str)),
                    init: Some(process),
                    is_mutable: false,
                    is_exported: false,
                }),
                location,
            )));
        }

        let path = self.parse_qualified_name()?;
        self.consume(&TokenKind::Semicolon, "Expected ';'")?;
        Ok(self
            .arena
            .alloc_stmt(Stmt::new(StmtKind::Import(path), location)))
    }

    fn parse_global(&mut self) -> CompileResult<StmtId> {
        let location = self.current().location.clone();
        let is_exported = self.matches(&TokenKind::BitXor);
        let (name, _) = self.consume_identifier("Expected variable name")?;

        let mut ty = None;
        if self.matches(&TokenKind::Colon) {
            ty = Some(self.parse_type()?);
        } else if self.check(&TokenKind::Hash) || self.check(&TokenKind::LBracket) {
            ty = Some(self.parse_type()?);
        }

        let mut init = None;
        if self.matches(&TokenKind::Assign) {
            init = Some(self.parse_expr()?);
        }

        if ty.is_none() && init.is_none() {
            return Err(CompileError::new(
                "Global declaration without initializer must have type annotation",
                location,
            ));
        }

        let is_mutable = init.is_none() && ty.is_some();
        Ok(self.arena.alloc_stmt(Stmt::new(
            StmtKind::VarDecl(VarDecl {
                name,
                ty,
                init,
                is_mutable,
                is_exported,
            }),
            location,
        )))
    }

    fn parse_stmt(&mut self) -> CompileResult<StmtId> {
        let annotations = self.parse_annotations()?;
        let stmt = self.parse_stmt_no_semi()?;
        self.arena.stmt_mut(stmt).annotations = annotations;
        self.skip_semis();
        Ok(stmt)
    }

    fn parse_stmt_no_semi(&mut self) -> CompileResult<StmtId> {
        let location = self.current().location.clone();

        if self.matches(&TokenKind::Arrow) {
            if self.matches(&TokenKind::BitOr) {
                self.consume(&TokenKind::Semicolon, "Expected ';'")?;
                return Ok(self.arena.alloc_stmt(Stmt::new(StmtKind::Break, location)));
            }
            if self.matches(&TokenKind::Gt) {
                self.consume(&TokenKind::Semicolon, "Expected ';'")?;
                return Ok(self
                    .arena
                    .alloc_stmt(Stmt::new(StmtKind::Continue, location)));
            }
            let value = if self.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.consume(&TokenKind::Semicolon, "Expected ';'")?;
            return Ok(self
                .arena
                .alloc_stmt(Stmt::new(StmtKind::Return(value), location)));
        }

        if self.matches(&TokenKind::BreakArrow) {
            self.consume(&TokenKind::Semicolon, "Expected ';'")?;
            return Ok(self.arena.alloc_stmt(Stmt::new(StmtKind::Break, location)));
        }

        if self.matches(&TokenKind::ContinueArrow) {
            self.consume(&TokenKind::Semicolon, "Expected ';'")?;
            return Ok(self
                .arena
                .alloc_stmt(Stmt::new(StmtKind::Continue, location)));
        }

        if self.check(&TokenKind::Hash) {
            return self.parse_type_decl();
        }
        if self.check(&TokenKind::DoubleColon) {
            return self.parse_import();
        }
        if self.check(&TokenKind::Ampersand) {
            return self.parse_func_decl();
        }

        if let Some(stmt) = self.try_parse_multi_assignment(&location)? {
            return Ok(stmt);
        }

        let expr = self.parse_expr_allowing_stmt_conditional()?;

        // `subject @ body` / `subject @@ body` iteration statement.
        let sorted = self.matches(&TokenKind::DoubleAt);
        if sorted || self.matches(&TokenKind::At) {
            let body = self.parse_expr()?;
            let iteration = self.arena.alloc_expr(Expr::new(
                ExprKind::Iteration {
                    subject: expr,
                    body,
                    sorted,
                },
                location.clone(),
            ));
            return Ok(self
                .arena
                .alloc_stmt(Stmt::new(StmtKind::Expr(iteration), location)));
        }

        // `cond ? stmt` statement conditional.
        if self.matches(&TokenKind::Question) {
            let body = self.parse_stmt()?;
            return Ok(self.arena.alloc_stmt(Stmt::new(
                StmtKind::CondStmt {
                    condition: expr,
                    body,
                },
                location,
            )));
        }

        // Lone `name: #ty` declares a mutable local.
        if let ExprKind::Identifier {
            name,
            declared_type: Some(ty),
            ..
        } = &self.arena.expr(expr).kind
        {
            let name = name.clone();
            let ty = ty.clone();
            return Ok(self.arena.alloc_stmt(Stmt::new(
                StmtKind::VarDecl(VarDecl {
                    name,
                    ty: Some(ty),
                    init: None,
                    is_mutable: true,
                    is_exported: false,
                }),
                location,
            )));
        }

        Ok(self
            .arena
            .alloc_stmt(Stmt::new(StmtKind::Expr(expr), location)))
    }

    /// `a, b, c = expr` desugars to a block assigning through a tuple
    /// temporary: `{ __tmpN = expr; a = __tmpN.__0; b = __tmpN.__1; ... }`.
    fn try_parse_multi_assignment(
        &mut self,
        location: &SourceLocation,
    ) -> CompileResult<Option<StmtId>> {
        if !matches!(self.current().kind, TokenKind::Identifier(_)) {
            return Ok(None);
        }

        let saved = self.pos;
        let mut names = vec![];
        loop {
            match &self.current().kind {
                TokenKind::Identifier(name) => {
                    names.push((name.clone(), self.current().location.clone()));
                    self.pos += 1;
                }
                _ => {
                    self.pos = saved;
                    return Ok(None);
                }
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }

        if names.len() < 2 || !self.matches(&TokenKind::Assign) {
            self.pos = saved;
            return Ok(None);
        }

        let rhs = self.parse_expr()?;
        let tmp_name = format!("{TUPLE_TMP_PREFIX}{}", self.tmp_counter);
        self.tmp_counter += 1;

        let mut statements = vec![self.arena.alloc_stmt(Stmt::new(
            StmtKind::VarDecl(VarDecl {
                name: tmp_name.clone(),
                ty: None,
                init: Some(rhs),
                is_mutable: true,
                is_exported: false,
            }),
            location.clone(),
        ))];

        for (index, (name, name_location)) in names.iter().enumerate() {
            let tmp_ref = self.arena.alloc_expr(Expr::new(
                ExprKind::identifier(tmp_name.clone()),
                location.clone(),
            ));
            let field_access = self.arena.alloc_expr(Expr::new(
                ExprKind::Member {
                    operand: tmp_ref,
                    field: tuple_field_name(index),
                },
                name_location.clone(),
            ));
            let target = self.arena.alloc_expr(Expr::new(
                ExprKind::identifier(name.clone()),
                name_location.clone(),
            ));
            let assignment = self.arena.alloc_expr(Expr::new(
                ExprKind::Assignment {
                    target,
                    value: field_access,
                    creates_new_variable: false,
                    declared_type: None,
                },
                name_location.clone(),
            ));
            statements.push(
                self.arena
                    .alloc_stmt(Stmt::new(StmtKind::Expr(assignment), name_location.clone())),
            );
        }

        let block = self.arena.alloc_expr(Expr::new(
            ExprKind::Block {
                statements,
                result: None,
            },
            location.clone(),
        ));
        Ok(Some(self.arena.alloc_stmt(Stmt::new(
            StmtKind::Expr(block),
            location.clone(),
        ))))
    }

    fn parse_expr(&mut self) -> CompileResult<ExprId> {
        self.statement_expr_depth += 1;
        let result = self.parse_assignment();
        self.statement_expr_depth -= 1;
        result
    }

    fn parse_expr_allowing_stmt_conditional(&mut self) -> CompileResult<ExprId> {
        let previous_allow = self.allow_statement_conditionals;
        let previous_depth = self.statement_expr_allowed_depth;
        self.allow_statement_conditionals = true;
        self.statement_expr_allowed_depth = self.statement_expr_depth + 1;
        let result = self.parse_expr();
        self.allow_statement_conditionals = previous_allow;
        self.statement_expr_allowed_depth = previous_depth;
        result
    }

    fn parse_assignment(&mut self) -> CompileResult<ExprId> {
        let expr = self.parse_conditional()?;

        if self.matches(&TokenKind::Assign) {
            let value = self.parse_assignment()?;
            let location = self.arena.expr(expr).location.clone();
            return Ok(self.arena.alloc_expr(Expr::new(
                ExprKind::Assignment {
                    target: expr,
                    value,
                    creates_new_variable: false,
                    declared_type: None,
                },
                location,
            )));
        }

        Ok(expr)
    }

    fn parse_conditional(&mut self) -> CompileResult<ExprId> {
        let expr = self.parse_binary_level(0)?;

        if self.check(&TokenKind::Question) {
            let saved = self.pos;
            self.pos += 1;

            let true_expr = self.try_parse(|p| p.parse_expr());

            if let Some(true_expr) = true_expr {
                if self.matches(&TokenKind::Colon) {
                    let false_expr = self.parse_conditional()?;
                    self.reject_bare_nested_conditional(true_expr)?;
                    self.reject_bare_nested_conditional(false_expr)?;
                    let location = self.arena.expr(expr).location.clone();
                    return Ok(self.arena.alloc_expr(Expr::new(
                        ExprKind::Conditional {
                            condition: expr,
                            true_expr,
                            false_expr,
                            parenthesized: false,
                        },
                        location,
                    )));
                }
            }

            // No ':' follows: this is a statement conditional, which is only
            // legal directly at statement level.
            self.pos = saved;
            let usable = self.allow_statement_conditionals
                && self.statement_expr_depth == self.statement_expr_allowed_depth;
            if !usable {
                return Err(CompileError::new(
                    "Statement conditional is not an expression",
                    self.current().location.clone(),
                ));
            }
        }

        Ok(expr)
    }

    fn reject_bare_nested_conditional(&self, branch: ExprId) -> CompileResult<()> {
        if let ExprKind::Conditional {
            parenthesized: false,
            ..
        } = self.arena.expr(branch).kind
        {
            return Err(CompileError::new(
                "ambiguous nested conditional: add parentheses",
                self.arena.expr(branch).location.clone(),
            ));
        }
        Ok(())
    }

    /// Binary precedence levels, loosest first.
    fn binary_op_at_level(&self, level: usize) -> Option<BinaryOp> {
        let op = match (level, &self.current().kind) {
            (0, TokenKind::OrOr) => BinaryOp::Or,
            (1, TokenKind::AndAnd) => BinaryOp::And,
            (2, TokenKind::BitOr) => BinaryOp::BitOr,
            (3, TokenKind::BitXor) => BinaryOp::BitXor,
            (4, TokenKind::Ampersand) => BinaryOp::BitAnd,
            (5, TokenKind::Eq) => BinaryOp::Eq,
            (5, TokenKind::Ne) => BinaryOp::Ne,
            (5, TokenKind::Lt) => BinaryOp::Lt,
            (5, TokenKind::Le) => BinaryOp::Le,
            (5, TokenKind::Gt) => BinaryOp::Gt,
            (5, TokenKind::Ge) => BinaryOp::Ge,
            (6, TokenKind::Shl) => BinaryOp::Shl,
            (6, TokenKind::Shr) => BinaryOp::Shr,
            (8, TokenKind::Plus) => BinaryOp::Add,
            (8, TokenKind::Minus) => BinaryOp::Sub,
            (9, TokenKind::Star) => BinaryOp::Mul,
            (9, TokenKind::Slash) => BinaryOp::Div,
            (9, TokenKind::Percent) => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary_level(&mut self, level: usize) -> CompileResult<ExprId> {
        // Level 7 is the range operator, which nests between shifts and
        // sums and is not left-associative.
        if level == 7 {
            return self.parse_range();
        }
        if level > 9 {
            return self.parse_unary();
        }

        let mut left = self.parse_binary_level(level + 1)?;

        if level == 5 {
            // Comparisons do not chain.
            if let Some(op) = self.binary_op_at_level(level) {
                let op_location = self.current().location.clone();
                self.pos += 1;
                let right = self.parse_binary_level(level + 1)?;
                if self.binary_op_at_level(level).is_some() {
                    return Err(CompileError::new(
                        "Ambiguous chained comparison: use explicit parentheses like (a < b) < c",
                        op_location,
                    ));
                }
                let location = self.arena.expr(left).location.clone();
                return Ok(self
                    .arena
                    .alloc_expr(Expr::new(ExprKind::Binary { op, left, right }, location)));
            }
            return Ok(left);
        }

        while let Some(op) = self.binary_op_at_level(level) {
            self.pos += 1;
            let right = self.parse_binary_level(level + 1)?;
            let location = self.arena.expr(left).location.clone();
            left = self
                .arena
                .alloc_expr(Expr::new(ExprKind::Binary { op, left, right }, location));
        }

        Ok(left)
    }

    fn parse_range(&mut self) -> CompileResult<ExprId> {
        let left = self.parse_binary_level(8)?;

        if self.matches(&TokenKind::DotDot) {
            let right = self.parse_binary_level(8)?;
            let location = self.arena.expr(left).location.clone();
            let range = self.arena.alloc_expr(Expr::new(
                ExprKind::Range {
                    start: left,
                    end: right,
                },
                location.clone(),
            ));

            // Ranges iterate directly: `0..5 @ body`.
            let sorted = self.matches(&TokenKind::DoubleAt);
            if sorted || self.matches(&TokenKind::At) {
                let body = self.parse_expr()?;
                return Ok(self.arena.alloc_expr(Expr::new(
                    ExprKind::Iteration {
                        subject: range,
                        body,
                        sorted,
                    },
                    location,
                )));
            }

            return Ok(range);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> CompileResult<ExprId> {
        let location = self.current().location.clone();

        let unary_op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::BitNot => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = unary_op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            // Fold negated signed integer literals directly.
            if op == UnaryOp::Neg {
                if let ExprKind::Int {
                    value,
                    unsigned: false,
                    raw,
                } = &self.arena.expr(operand).kind
                {
                    let negated = (*value as i64).wrapping_neg();
                    let raw = format!("-{raw}");
                    return Ok(self.arena.alloc_expr(Expr::new(
                        ExprKind::Int {
                            value: negated as u64,
                            unsigned: false,
                            raw,
                        },
                        location,
                    )));
                }
            }
            return Ok(self
                .arena
                .alloc_expr(Expr::new(ExprKind::Unary { op, operand }, location)));
        }

        // `|x|` length.
        if self.matches(&TokenKind::BitOr) {
            let operand = self.parse_unary()?;
            self.consume(&TokenKind::BitOr, "Expected '|'")?;
            return Ok(self
                .arena
                .alloc_expr(Expr::new(ExprKind::Length { operand }, location)));
        }

        if self.matches(&TokenKind::LParen) {
            let after_paren = self.pos;

            // `(r1, r2).method(...)` multi-receiver call.
            if let Some(call) = self.try_parse(|p| p.parse_multi_receiver_call(&location)) {
                return self.parse_postfix_suffix(call);
            }
            self.pos = after_paren;

            // `(#ty) operand` cast.
            if self.check(&TokenKind::Hash) || self.check(&TokenKind::LBracket) {
                if let Some(cast) = self.try_parse(|p| {
                    let target = p.parse_type()?;
                    p.consume(&TokenKind::RParen, "Expected ')'")?;
                    let operand = p.parse_unary()?;
                    Ok(p.arena.alloc_expr(Expr::new(
                        ExprKind::Cast { target, operand },
                        location.clone(),
                    )))
                }) {
                    return Ok(cast);
                }
                self.pos = after_paren;
            }

            let expr = self.parse_expr()?;

            // `(a, b, ...)` tuple literal.
            if self.check(&TokenKind::Comma) {
                let mut elements = vec![expr];
                while self.matches(&TokenKind::Comma) {
                    elements.push(self.parse_expr()?);
                }
                self.consume(&TokenKind::RParen, "Expected ')'")?;
                return Ok(self
                    .arena
                    .alloc_expr(Expr::new(ExprKind::TupleLiteral { elements }, location)));
            }

            self.consume(&TokenKind::RParen, "Expected ')'")?;

            // `(cond) @ body` repeat loop.
            if self.matches(&TokenKind::At) {
                let body = self.parse_expr()?;
                let repeat = self.arena.alloc_expr(Expr::new(
                    ExprKind::Repeat {
                        condition: expr,
                        body,
                    },
                    location,
                ));
                return self.parse_postfix_suffix(repeat);
            }

            if let ExprKind::Conditional { parenthesized, .. } = &mut self.arena.expr_mut(expr).kind
            {
                *parenthesized = true;
            }
            return self.parse_postfix_suffix(expr);
        }

        self.parse_postfix()
    }

    fn parse_multi_receiver_call(&mut self, location: &SourceLocation) -> CompileResult<ExprId> {
        let mut receivers = vec![];
        loop {
            let (name, _) = self.consume_identifier("Expected identifier")?;
            receivers.push(
                self.arena
                    .alloc_expr(Expr::new(ExprKind::identifier(name), location.clone())),
            );
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        if receivers.len() < 2 {
            return Err(CompileError::new(
                "not a multi-receiver call",
                location.clone(),
            ));
        }
        self.consume(&TokenKind::RParen, "Expected ')'")?;
        self.consume(&TokenKind::Dot, "Expected '.'")?;
        let (method, _) = self.consume_identifier("Expected method name")?;
        self.consume(&TokenKind::LParen, "Expected '('")?;
        let mut args = vec![];
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "Expected ')'")?;

        let callee = self
            .arena
            .alloc_expr(Expr::new(ExprKind::identifier(method), location.clone()));
        Ok(self.arena.alloc_expr(Expr::new(
            ExprKind::Call {
                callee,
                receivers,
                args,
            },
            location.clone(),
        )))
    }

    fn parse_postfix(&mut self) -> CompileResult<ExprId> {
        let expr = self.parse_primary()?;
        self.parse_postfix_suffix(expr)
    }

    fn parse_postfix_suffix(&mut self, mut expr: ExprId) -> CompileResult<ExprId> {
        loop {
            if self.matches(&TokenKind::LParen) {
                let mut args = vec![];
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&TokenKind::RParen, "Expected ')'")?;
                let location = self.arena.expr(expr).location.clone();
                expr = self.arena.alloc_expr(Expr::new(
                    ExprKind::Call {
                        callee: expr,
                        receivers: vec![],
                        args,
                    },
                    location,
                ));
            } else if self.matches(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.consume(&TokenKind::RBracket, "Expected ']'")?;
                let location = self.arena.expr(expr).location.clone();
                expr = self.arena.alloc_expr(Expr::new(
                    ExprKind::Index {
                        operand: expr,
                        index,
                    },
                    location,
                ));
            } else if self.matches(&TokenKind::Dot) {
                let (member, _) = self.consume_identifier("Expected member name")?;
                let location = self.arena.expr(expr).location.clone();

                if self.matches(&TokenKind::LParen) {
                    // Method-call sugar: `x.f(a)` becomes a call with `x`
                    // as receiver.
                    let mut args = vec![];
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.matches(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(&TokenKind::RParen, "Expected ')'")?;
                    let callee = self
                        .arena
                        .alloc_expr(Expr::new(ExprKind::identifier(member), location.clone()));
                    expr = self.arena.alloc_expr(Expr::new(
                        ExprKind::Call {
                            callee,
                            receivers: vec![expr],
                            args,
                        },
                        location,
                    ));
                } else {
                    expr = self.arena.alloc_expr(Expr::new(
                        ExprKind::Member {
                            operand: expr,
                            field: member,
                        },
                        location,
                    ));
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> CompileResult<ExprId> {
        let annotations = self.parse_annotations()?;
        let location = self.current().location.clone();

        let expr = if self.matches(&TokenKind::DoubleColon) {
            let path = self.parse_resource_path()?;
            self.arena
                .alloc_expr(Expr::new(ExprKind::Resource { path }, location))
        } else {
            match self.current().kind.clone() {
                TokenKind::Int { value, unsigned } => {
                    let raw = self.current().lexeme.clone();
                    self.pos += 1;
                    self.arena.alloc_expr(Expr::new(
                        ExprKind::Int {
                            value,
                            unsigned,
                            raw,
                        },
                        location,
                    ))
                }
                TokenKind::Float(value) => {
                    let raw = self.current().lexeme.clone();
                    self.pos += 1;
                    self.arena
                        .alloc_expr(Expr::new(ExprKind::Float { value, raw }, location))
                }
                TokenKind::Str(value) => {
                    self.pos += 1;
                    self.arena
                        .alloc_expr(Expr::new(ExprKind::Str { value }, location))
                }
                TokenKind::Char(value) => {
                    self.pos += 1;
                    self.arena
                        .alloc_expr(Expr::new(ExprKind::Char { value }, location))
                }
                TokenKind::LBrace => self.parse_block()?,
                TokenKind::LBracket => self.parse_array()?,
                TokenKind::Dollar => {
                    self.pos += 1;
                    let (name, _) = self.consume_identifier("Expected identifier after $")?;
                    self.arena.alloc_expr(Expr::new(
                        ExprKind::Identifier {
                            name,
                            is_expr_param_ref: true,
                            declared_type: None,
                        },
                        location,
                    ))
                }
                TokenKind::Identifier(_) => {
                    let mut path = vec![self.consume_identifier("Expected identifier")?.0];
                    while self.matches(&TokenKind::DoubleColon) {
                        path.push(self.consume_identifier("Expected identifier")?.0);
                    }
                    // Qualified paths keep only the final segment; module
                    // scoping is realised through instance expansion.
                    let name = path.pop().expect("path has at least one segment");

                    let mut declared_type = None;
                    if self.check(&TokenKind::Colon) {
                        let saved = self.pos;
                        self.pos += 1;
                        if self.check(&TokenKind::Hash) || self.check(&TokenKind::LBracket) {
                            declared_type = Some(self.parse_type()?);
                        } else {
                            self.pos = saved;
                        }
                    }

                    self.arena.alloc_expr(Expr::new(
                        ExprKind::Identifier {
                            name,
                            is_expr_param_ref: false,
                            declared_type,
                        },
                        location,
                    ))
                }
                _ => {
                    return Err(CompileError::new(
                        format!("Unexpected token in expression: {}", self.current()),
                        location,
                    ))
                }
            }
        };

        self.arena.expr_mut(expr).annotations = annotations;
        Ok(expr)
    }

    fn parse_block(&mut self) -> CompileResult<ExprId> {
        let location = self.current().location.clone();
        self.consume(&TokenKind::LBrace, "Expected '{'")?;

        let mut statements = vec![];
        let mut result = None;

        self.skip_semis();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            // Try the remaining tokens as the block's trailing result
            // expression first; roll back and parse a statement otherwise.
            let saved = self.pos;
            if let Some(expr) = self.try_parse(|p| p.parse_expr()) {
                self.skip_semis();
                if self.check(&TokenKind::RBrace) {
                    result = Some(expr);
                    break;
                }
                self.pos = saved;
            }

            statements.push(self.parse_stmt()?);
            self.skip_semis();
        }

        self.consume(&TokenKind::RBrace, "Expected '}'")?;
        Ok(self
            .arena
            .alloc_expr(Expr::new(ExprKind::Block { statements, result }, location)))
    }

    fn parse_array(&mut self) -> CompileResult<ExprId> {
        let location = self.current().location.clone();
        self.consume(&TokenKind::LBracket, "Expected '['")?;

        let mut elements = vec![];
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(&TokenKind::RBracket, "Expected ']'")?;
        Ok(self
            .arena
            .alloc_expr(Expr::new(ExprKind::ArrayLiteral { elements }, location)))
    }

    fn parse_resource_path(&mut self) -> CompileResult<Vec<String>> {
        let mut segments = vec![];
        loop {
            let (mut segment, _) = self.consume_identifier("Expected identifier")?;
            while self.matches(&TokenKind::Dot) {
                segment.push('.');
                segment.push_str(&self.consume_identifier("Expected identifier")?.0);
            }
            segments.push(segment);
            if !self.matches(&TokenKind::DoubleColon) {
                break;
            }
        }
        Ok(segments)
    }

    fn parse_type(&mut self) -> CompileResult<Type> {
        let location = self.current().location.clone();

        let mut size = None;
        if self.matches(&TokenKind::LBracket) {
            size = Some(self.parse_expr()?);
            self.consume(&TokenKind::RBracket, "Expected ']'")?;
        }

        self.consume(&TokenKind::Hash, "Expected '#'")?;
        let (name, _) = self.consume_identifier("Expected type name")?;

        let base = match Primitive::from_name(&name) {
            Some(primitive) => Type::Primitive(primitive),
            None => Type::Named(name),
        };

        if self.matches(&TokenKind::LBracket) {
            if size.is_some() {
                return Err(CompileError::new(
                    "Array size specified twice in type",
                    location,
                ));
            }
            size = Some(self.parse_expr()?);
            self.consume(&TokenKind::RBracket, "Expected ']'")?;
        }

        if size.is_some() {
            return Ok(Type::Array {
                element: Box::new(base),
                size,
            });
        }

        Ok(base)
    }

    fn parse_params(&mut self) -> CompileResult<Vec<Parameter>> {
        let mut params = vec![];
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }

        loop {
            let annotations = self.parse_annotations()?;
            let location = self.current().location.clone();
            let is_expression_param = self.matches(&TokenKind::Dollar);
            let (name, _) = self.consume_identifier("Expected parameter name")?;
            let ty = if self.matches(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(Parameter {
                name,
                ty,
                is_expression_param,
                location,
                annotations,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    fn parse_ref_params(&mut self) -> CompileResult<Vec<String>> {
        self.consume(&TokenKind::LParen, "Expected '('")?;
        let mut refs = vec![];
        loop {
            refs.push(self.consume_identifier("Expected identifier")?.0);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RParen, "Expected ')'")?;
        Ok(refs)
    }

    fn parse_fields(&mut self) -> CompileResult<Vec<Field>> {
        let mut fields = vec![];
        if self.check(&TokenKind::RParen) {
            return Ok(fields);
        }

        loop {
            let annotations = self.parse_annotations()?;
            let location = self.current().location.clone();
            let (name, _) = self.consume_identifier("Expected field name")?;
            let ty = if self.matches(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            fields.push(Field {
                name,
                ty,
                location,
                annotations,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }

        Ok(fields)
    }

    fn parse_qualified_name(&mut self) -> CompileResult<Vec<String>> {
        let mut path = vec![self.consume_identifier("Expected identifier")?.0];
        while self.matches(&TokenKind::DoubleColon) {
            path.push(self.consume_identifier("Expected identifier")?.0);
        }
        Ok(path)
    }

    fn is_annotation_start(&self) -> bool {
        self.check(&TokenKind::LBracket)
            && self.peek(1).is(&TokenKind::LBracket)
            && matches!(self.peek(2).kind, TokenKind::Identifier(_))
    }

    fn parse_annotation_arg(&mut self) -> CompileResult<String> {
        match &self.current().kind {
            TokenKind::Identifier(_)
            | TokenKind::Str(_)
            | TokenKind::Int { .. }
            | TokenKind::Float(_) => {
                let lexeme = self.current().lexeme.clone();
                self.pos += 1;
                Ok(lexeme)
            }
            _ => Err(CompileError::new(
                "Expected annotation argument",
                self.current().location.clone(),
            )),
        }
    }

    fn parse_annotations(&mut self) -> CompileResult<Vec<Annotation>> {
        let mut annotations = vec![];
        while self.is_annotation_start() {
            self.consume(&TokenKind::LBracket, "Expected '[' to start annotation")?;
            self.consume(&TokenKind::LBracket, "Expected '[' to start annotation")?;

            loop {
                let (name, location) = self.consume_identifier("Expected annotation name")?;
                let mut args = vec![];
                if self.matches(&TokenKind::LParen) {
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_annotation_arg()?);
                            if !self.matches(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(&TokenKind::RParen, "Expected ')' to close annotation arguments")?;
                }
                annotations.push(Annotation {
                    name,
                    args,
                    location,
                });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }

            self.consume(&TokenKind::RBracket, "Expected ']' to close annotation")?;
            self.consume(&TokenKind::RBracket, "Expected ']' to close annotation")?;
        }
        Ok(annotations)
    }
}

/// Lex and parse one source file into a module backed by `arena`.
pub fn parse_source(
    arena: &mut AstArena,
    source: &str,
    name: &str,
    path: &str,
) -> CompileResult<Module> {
    let tokens = crate::lexer::Lexer::new(source, path).tokenize()?;
    Parser::new(arena, tokens).parse_module(name, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (AstArena, Module) {
        let mut arena = AstArena::new();
        let module = parse_source(&mut arena, source, "test", "test.sbl").expect("parse failed");
        (arena, module)
    }

    fn parse_err(source: &str) -> CompileError {
        let mut arena = AstArena::new();
        parse_source(&mut arena, source, "test", "test.sbl").unwrap_err()
    }

    #[test]
    fn parses_function_declaration() {
        let (arena, module) = parse("&double(x: #i32) -> #i32 { -> x * 2; }");
        assert_eq!(module.top_level.len(), 1);
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function declaration");
        };
        assert_eq!(func.name, "double");
        assert_eq!(func.params.len(), 1);
        assert!(matches!(
            func.return_type,
            Some(Type::Primitive(Primitive::I32))
        ));
        assert!(!func.is_external);
    }

    #[test]
    fn parses_external_function_without_body() {
        let (arena, module) = parse("&!putc(c: #u8);");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function declaration");
        };
        assert!(func.is_external);
        assert!(func.body.is_none());
    }

    #[test]
    fn parses_method_with_namespace_and_receiver() {
        let (arena, module) = parse("&(self)#Point::norm() -> #i32 { -> 0; }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function declaration");
        };
        assert_eq!(func.type_namespace.as_deref(), Some("Point"));
        assert_eq!(func.ref_params, vec!["self".to_owned()]);
        assert_eq!(func.qualified_name(), "Point::norm");
    }

    #[test]
    fn parses_operator_function_name() {
        let (arena, module) = parse("&(self)#Vec::+(other: #Vec) -> #Vec { -> other; }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function declaration");
        };
        assert_eq!(func.qualified_name(), "Vec::+");
    }

    #[test]
    fn parses_type_declaration() {
        let (arena, module) = parse("#Point(x: #i32, y: #i32);");
        let StmtKind::TypeDecl(decl) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected type declaration");
        };
        assert_eq!(decl.name, "Point");
        assert_eq!(decl.fields.len(), 2);
    }

    #[test]
    fn parses_import_paths() {
        let (arena, module) = parse("::util::math;");
        let StmtKind::Import(path) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected import");
        };
        assert_eq!(path, &["util".to_owned(), "math".to_owned()]);
    }

    #[test]
    fn parses_iteration_statement() {
        let (arena, module) = parse("&f(xs: #i32[3]) { xs @ { y = _; }; }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function");
        };
        let ExprKind::Block { statements, .. } = &arena.expr(func.body.unwrap()).kind else {
            panic!("expected block body");
        };
        let StmtKind::Expr(expr) = &arena.stmt(statements[0]).kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            arena.expr(*expr).kind,
            ExprKind::Iteration { sorted: false, .. }
        ));
    }

    #[test]
    fn parses_repeat_loop() {
        let (arena, module) = parse("&f() { (1 < 2) @ { ->|; }; }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function");
        };
        let ExprKind::Block { statements, .. } = &arena.expr(func.body.unwrap()).kind else {
            panic!("expected block body");
        };
        let StmtKind::Expr(expr) = &arena.stmt(statements[0]).kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(arena.expr(*expr).kind, ExprKind::Repeat { .. }));
    }

    #[test]
    fn desugars_multi_assignment() {
        let (arena, module) = parse("&f() { a, b = g(); }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function");
        };
        let ExprKind::Block { statements, .. } = &arena.expr(func.body.unwrap()).kind else {
            panic!("expected block body");
        };
        let StmtKind::Expr(desugared) = &arena.stmt(statements[0]).kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Block { statements, .. } = &arena.expr(*desugared).kind else {
            panic!("expected desugared block");
        };
        // One temporary declaration plus one assignment per target.
        assert_eq!(statements.len(), 3);
        assert!(matches!(
            arena.stmt(statements[0]).kind,
            StmtKind::VarDecl(_)
        ));
    }

    #[test]
    fn rejects_chained_comparison() {
        let err = parse_err("&f() { x = 1 < 2 < 3; }");
        assert!(err.message.contains("chained comparison"), "{err}");
    }

    #[test]
    fn rejects_bare_nested_conditional() {
        let err = parse_err("&f() { x = 1 ? 2 ? 3 : 4 : 5; }");
        assert!(err.message.contains("ambiguous nested conditional"), "{err}");
    }

    #[test]
    fn accepts_parenthesized_nested_conditional() {
        parse("&f() { x = 1 ? (2 ? 3 : 4) : 5; }");
    }

    #[test]
    fn aggregates_multiple_parse_errors() {
        let err = parse_err("&f( { ; &g( { ;");
        assert!(err.message.starts_with("Parse failed with"), "{err}");
    }

    #[test]
    fn parses_annotations() {
        let (arena, module) = parse("[[nonreentrant]] &f() { -> 1; }");
        let stmt = arena.stmt(module.top_level[0]);
        assert_eq!(stmt.annotations.len(), 1);
        assert_eq!(stmt.annotations[0].name, "nonreentrant");
    }

    #[test]
    fn parses_array_type_with_size() {
        let (arena, module) = parse("xs: #u8[4];");
        let StmtKind::VarDecl(decl) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected variable declaration");
        };
        let Some(Type::Array { element, size }) = &decl.ty else {
            panic!("expected array type");
        };
        assert!(matches!(**element, Type::Primitive(Primitive::U8)));
        assert_eq!(arena.int_literal_value(size.unwrap()), Some((4, false)));
    }

    #[test]
    fn parses_process_import_as_string_constant() {
        let (arena, module) = parse(":: \"echo hi\" -> greeting;");
        let StmtKind::VarDecl(decl) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected variable declaration");
        };
        assert_eq!(decl.name, "greeting");
        assert!(matches!(
            arena.expr(decl.init.unwrap()).kind,
            ExprKind::Process { .. }
        ));
    }

    #[test]
    fn parses_length_and_cast() {
        let (arena, module) = parse("&f(s: #s) { n = |s|; b = (#u8) n; }");
        let StmtKind::FuncDecl(func) = &arena.stmt(module.top_level[0]).kind else {
            panic!("expected function");
        };
        assert!(func.body.is_some());
        drop(arena);
    }
}
