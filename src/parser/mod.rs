// Toy Parser
// Recursive descent parser that converts tokens into an AST

use std::rc::Rc;

use crate::ast::*;
use crate::error::{Span, ToyError, ToyResult};
use crate::lexer::{Token, TokenKind};

/// Recursive descent parser for Toy
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    file: String,
    source: String,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            tokens,
            current: 0,
            file: file.into(),
            source: source.into(),
        }
    }

    pub fn parse(&mut self) -> ToyResult<Program> {
        let mut program = Program::new(Vec::new());
        while !self.is_at_end() {
            program.statements.push(self.declaration()?);
        }
        Ok(program)
    }

    fn declaration(&mut self) -> ToyResult<Stmt> {
        match self.peek().kind {
            TokenKind::Var => {
                let stmt = self.var_declaration()?;
                self.consume(&TokenKind::Semicolon, "Expected ';' after variable declaration")?;
                Ok(stmt)
            }
            TokenKind::Function => self.function_declaration(FunctionKind::Function),
            TokenKind::Coroutine => self.function_declaration(FunctionKind::Coroutine),
            _ => self.statement(),
        }
    }

    /// `var a = 1, b` without the trailing ';'
    fn var_declaration(&mut self) -> ToyResult<Stmt> {
        let keyword = self.advance().span;
        let mut bindings = Vec::new();

        loop {
            let (name, name_span) = self.identifier("Expected variable name")?;
            let mut binding = VarBinding {
                name,
                initializer: None,
                span: name_span,
            };
            if self.match_token(&TokenKind::Equal) {
                let init = self.expression()?;
                binding.span = name_span.to(init.span());
                binding.initializer = Some(init);
            }
            bindings.push(binding);

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(Stmt::Var {
            bindings,
            span: keyword.to(self.previous().span),
        })
    }

    fn function_declaration(&mut self, kind: FunctionKind) -> ToyResult<Stmt> {
        let keyword = self.advance().span;
        let what = match kind {
            FunctionKind::Function => "function",
            FunctionKind::Coroutine => "coroutine",
        };

        let (name, _) = self.identifier(&format!("Expected {} name", what))?;
        self.consume(&TokenKind::LeftParen, &format!("Expected '(' after {} name", what))?;
        let mut params: Vec<String> = Vec::new();
        self.comma_list(&TokenKind::RightParen, "parameters", |p| {
            let (param, _) = p.identifier("Expected parameter name")?;
            if params.contains(&param) {
                return Err(p
                    .error_at_previous(&format!("Duplicate parameter '{}'", param))
                    .with_help("Each parameter name must be unique"));
            }
            params.push(param);
            Ok(())
        })?;

        self.consume(&TokenKind::LeftBrace, &format!("Expected '{{' before {} body", what))?;
        let body = self.block_statements()?;

        Ok(Stmt::Function {
            def: Rc::new(FunctionDef {
                name,
                params,
                body,
                kind,
                span: keyword.to(self.previous().span),
            }),
        })
    }

    fn statement(&mut self) -> ToyResult<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => {
                let span = self.advance().span;
                self.consume(&TokenKind::Semicolon, "Expected ';' after 'break'")?;
                Ok(Stmt::Break { span })
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                self.consume(&TokenKind::Semicolon, "Expected ';' after 'continue'")?;
                Ok(Stmt::Continue { span })
            }
            TokenKind::LeftBrace => {
                let open = self.advance().span;
                let statements = self.block_statements()?;
                Ok(Stmt::Block {
                    statements,
                    span: open.to(self.previous().span),
                })
            }
            TokenKind::Semicolon => Ok(Stmt::Empty {
                span: self.advance().span,
            }),
            _ => {
                let stmt = self.expression_statement()?;
                self.consume(&TokenKind::Semicolon, "Expected ';' after expression")?;
                Ok(stmt)
            }
        }
    }

    fn if_statement(&mut self) -> ToyResult<Stmt> {
        // `elif` re-enters here with the keyword still pending
        let keyword = self.advance().span;
        let condition = self.parenthesized("if condition")?;
        let then_branch = Box::new(self.statement()?);

        let else_branch = if self.check(&TokenKind::Elif) {
            Some(Box::new(self.if_statement()?))
        } else if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: keyword.to(self.previous().span),
        })
    }

    fn while_statement(&mut self) -> ToyResult<Stmt> {
        let keyword = self.advance().span;
        let condition = self.parenthesized("while condition")?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::While {
            condition,
            body,
            span: keyword.to(self.previous().span),
        })
    }

    /// `( expr )` after a control keyword
    fn parenthesized(&mut self, what: &str) -> ToyResult<Expr> {
        let keyword = self.previous().lexeme.clone();
        self.consume(&TokenKind::LeftParen, &format!("Expected '(' after '{}'", keyword))?;
        let condition = self.expression()?;
        self.consume(&TokenKind::RightParen, &format!("Expected ')' after {}", what))?;
        Ok(condition)
    }

    fn for_statement(&mut self) -> ToyResult<Stmt> {
        let keyword = self.advance().span;
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'for'")?;

        if self.is_for_in_header() {
            return self.for_in_rest(keyword);
        }

        let initializer = if self.match_token(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::Var) {
            let init = self.var_declaration()?;
            self.consume(&TokenKind::Semicolon, "Expected ';' after loop initializer")?;
            Some(Box::new(init))
        } else {
            let init = self.expression_statement()?;
            self.consume(&TokenKind::Semicolon, "Expected ';' after loop initializer")?;
            Some(Box::new(init))
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(&TokenKind::Semicolon, "Expected ';' after loop condition")?;

        let increment = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(&TokenKind::RightParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.statement()?);

        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
            span: keyword.to(self.previous().span),
        })
    }

    /// `[var] IDENT , IDENT in` after `for (`
    fn is_for_in_header(&self) -> bool {
        let skip = if self.check(&TokenKind::Var) { 1 } else { 0 };
        self.check_identifier_ahead(skip)
            && self.check_ahead(skip + 1, &TokenKind::Comma)
            && self.check_identifier_ahead(skip + 2)
            && self.check_ahead(skip + 3, &TokenKind::In)
    }

    fn for_in_rest(&mut self, keyword: Span) -> ToyResult<Stmt> {
        self.match_token(&TokenKind::Var);
        let (key, _) = self.identifier("Expected key name")?;
        self.consume(&TokenKind::Comma, "Expected ',' after key name")?;
        let (value, _) = self.identifier("Expected value name")?;
        if key == value {
            return Err(self
                .error_at_previous("Key and value must use different names")
                .with_help("Write 'for (k, v in items)'"));
        }
        self.consume(&TokenKind::In, "Expected 'in' after loop variables")?;
        let sequence = self.expression()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after iterable")?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::ForIn {
            key,
            value,
            iterable: sequence,
            body,
            span: keyword.to(self.previous().span),
        })
    }

    fn return_statement(&mut self) -> ToyResult<Stmt> {
        let keyword = self.advance().span;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(&TokenKind::Semicolon, "Expected ';' after return value")?;

        Ok(Stmt::Return {
            value,
            span: keyword.to(self.previous().span),
        })
    }

    fn expression_statement(&mut self) -> ToyResult<Stmt> {
        let expr = self.expression()?;
        Ok(Stmt::Expression {
            span: expr.span(),
            expr,
        })
    }

    /// Statements up to the closing '}' (the '{' is already consumed)
    fn block_statements(&mut self) -> ToyResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            if self.match_token(&TokenKind::RightBrace) {
                return Ok(body);
            }
            if self.is_at_end() {
                return Err(self.error("Expected '}' after block"));
            }
            body.push(self.declaration()?);
        }
    }

    fn expression(&mut self) -> ToyResult<Expr> {
        self.assignment()
    }

    /// Right associative; the target is checked after the value parses
    fn assignment(&mut self) -> ToyResult<Expr> {
        let target = self.ternary()?;
        let Some(op) = AssignOp::from_token(&self.peek().kind) else {
            return Ok(target);
        };
        self.advance();
        let value = self.assignment()?;
        if !target.is_assignable() {
            return Err(self
                .error_at(target.span(), "Invalid assignment target")
                .with_help("Can only assign to variables, elements or members"));
        }
        Ok(Expr::Assignment {
            span: target.span().to(value.span()),
            target: Box::new(target),
            op,
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> ToyResult<Expr> {
        let condition = self.logical(LogicalOp::Or)?;
        if !self.match_token(&TokenKind::Question) {
            return Ok(condition);
        }

        let if_true = self.assignment()?;
        self.consume(&TokenKind::Colon, "Expected ':' in ternary expression")?;
        let if_false = self.ternary()?;
        Ok(Expr::Ternary {
            span: condition.span().to(if_false.span()),
            condition: Box::new(condition),
            then_expr: Box::new(if_true),
            else_expr: Box::new(if_false),
        })
    }

    /// `||` binds looser than `&&`, both above equality
    fn logical(&mut self, op: LogicalOp) -> ToyResult<Expr> {
        let (token, operand): (TokenKind, fn(&mut Self) -> ToyResult<Expr>) = match op {
            LogicalOp::Or => (TokenKind::Or, |p: &mut Self| p.logical(LogicalOp::And)),
            LogicalOp::And => (TokenKind::And, Self::equality),
        };

        let mut expr = operand(self)?;
        while self.match_token(&token) {
            let right = operand(self)?;
            expr = Expr::Logical {
                span: expr.span().to(right.span()),
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ToyResult<Expr> {
        self.binary_level(
            &[TokenKind::EqualEqual, TokenKind::BangEqual],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> ToyResult<Expr> {
        self.binary_level(
            &[
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> ToyResult<Expr> {
        self.binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::factor)
    }

    fn factor(&mut self) -> ToyResult<Expr> {
        self.binary_level(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::unary,
        )
    }

    /// Left-associative binary level over `operators`
    fn binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> ToyResult<Expr>,
    ) -> ToyResult<Expr> {
        let mut expr = next(self)?;

        while operators.contains(&self.peek().kind) {
            let Some(op) = BinaryOp::from_token(&self.advance().kind) else {
                return Err(self.error_at_previous("Expected binary operator"));
            };
            let right = next(self)?;
            expr = Expr::Binary {
                span: expr.span().to(right.span()),
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ToyResult<Expr> {
        if let Some(op) = UnaryOp::from_token(&self.peek().kind) {
            let start = self.advance().span;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                span: start.to(operand.span()),
                op,
                operand: Box::new(operand),
            });
        }

        if let Some(op) = UpdateOp::from_token(&self.peek().kind) {
            let token = self.advance().clone();
            let target = self.unary()?;
            if !target.is_assignable() {
                return Err(self
                    .error_at_previous(&format!("Invalid operand for prefix '{}'", token.lexeme))
                    .with_help("Increment and decrement need a variable, element or member"));
            }
            return Ok(Expr::Update {
                span: token.span.to(target.span()),
                target: Box::new(target),
                op,
                prefix: true,
            });
        }

        self.postfix()
    }

    /// `x++` binds only to a storage location; `f()++` leaves the `++` unparsed
    fn postfix(&mut self) -> ToyResult<Expr> {
        let expr = self.call()?;
        let op = match UpdateOp::from_token(&self.peek().kind) {
            Some(op) if expr.is_assignable() => op,
            _ => return Ok(expr),
        };
        let end = self.advance().span;
        Ok(Expr::Update {
            span: expr.span().to(end),
            target: Box::new(expr),
            op,
            prefix: false,
        })
    }

    fn call(&mut self) -> ToyResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            expr = match self.peek().kind {
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.arguments()?;
                    Expr::Call {
                        span: expr.span().to(self.previous().span),
                        callee: Box::new(expr),
                        args,
                    }
                }
                TokenKind::Dot => {
                    self.advance();
                    let (property, end) = self.identifier("Expected member name after '.'")?;
                    Expr::Get {
                        span: expr.span().to(end),
                        object: Box::new(expr),
                        property,
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.expression()?;
                    let end = self
                        .consume(&TokenKind::RightBracket, "Expected ']' after index")?
                        .span;
                    Expr::Index {
                        span: expr.span().to(end),
                        object: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                _ => return Ok(expr),
            };
        }
    }

    /// Call arguments up to ')' (the '(' is already consumed)
    fn arguments(&mut self) -> ToyResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.comma_list(&TokenKind::RightParen, "arguments", |p| {
            args.push(p.expression()?);
            Ok(())
        })?;
        Ok(args)
    }

    /// Items separated by ',' up to `close`, which is consumed. A trailing
    /// comma is accepted.
    fn comma_list(
        &mut self,
        close: &TokenKind,
        what: &str,
        mut item: impl FnMut(&mut Self) -> ToyResult<()>,
    ) -> ToyResult<()> {
        while !self.check(close) {
            item(self)?;
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        let spelling = close.spelling().unwrap_or("?");
        self.consume(close, &format!("Expected '{}' after {}", spelling, what))?;
        Ok(())
    }

    fn primary(&mut self) -> ToyResult<Expr> {
        let token = self.peek().clone();
        let span = token.span;
        self.advance();

        let literal = match token.kind {
            TokenKind::Number(n) => Literal::Number(n),
            TokenKind::String(s) => Literal::String(s),
            TokenKind::True => Literal::Boolean(true),
            TokenKind::False => Literal::Boolean(false),
            TokenKind::Null => Literal::Null,
            TokenKind::Identifier(name) => return Ok(Expr::Variable { name, span }),
            TokenKind::LeftParen => {
                let inner = self.expression()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after expression")?;
                return Ok(inner);
            }
            TokenKind::LeftBracket => {
                let mut elements = Vec::new();
                self.comma_list(&TokenKind::RightBracket, "array elements", |p| {
                    elements.push(p.expression()?);
                    Ok(())
                })?;
                return Ok(Expr::Array {
                    elements,
                    span: span.to(self.previous().span),
                });
            }
            TokenKind::LeftBrace => return self.object_literal(span),
            TokenKind::Yield => {
                self.consume(&TokenKind::LeftParen, "Expected '(' after 'yield'")?;
                let args = self.arguments()?;
                return Ok(Expr::Yield {
                    args,
                    span: span.to(self.previous().span),
                });
            }
            TokenKind::Resume => return self.resume_rest(span),
            other => {
                return Err(self
                    .error_at(span, &format!("Unexpected token '{}'", other))
                    .with_help("Expected an expression"));
            }
        };

        Ok(Expr::Literal {
            value: literal,
            span,
        })
    }

    /// `resume(co, args...)` after the keyword
    fn resume_rest(&mut self, keyword: Span) -> ToyResult<Expr> {
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'resume'")?;
        let mut args = self.arguments()?;
        if args.is_empty() {
            return Err(self
                .error_at_previous("'resume' needs a coroutine")
                .with_help("Write 'resume(co, args...)'"));
        }
        let coroutine = Box::new(args.remove(0));
        Ok(Expr::Resume {
            coroutine,
            args,
            span: keyword.to(self.previous().span),
        })
    }

    /// `{ key = value, "key": value }` (the '{' is already consumed)
    fn object_literal(&mut self, open: Span) -> ToyResult<Expr> {
        let mut entries: Vec<(String, Expr)> = Vec::new();

        self.comma_list(&TokenKind::RightBrace, "object members", |p| {
            let key = match p.advance().kind.clone() {
                TokenKind::Identifier(name) | TokenKind::String(name) => name,
                _ => {
                    return Err(p
                        .error_at_previous("Expected member name")
                        .with_help("Object members look like '{a = 1, b: 2}'"));
                }
            };
            if !p.match_token(&TokenKind::Equal) && !p.match_token(&TokenKind::Colon) {
                return Err(p.error("Expected '=' or ':' after member name"));
            }
            entries.push((key, p.expression()?));
            Ok(())
        })?;

        Ok(Expr::Object {
            entries,
            span: open.to(self.previous().span),
        })
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    /// Same variant as `kind`, ignoring any payload
    fn same_kind(token: Option<&Token>, kind: &TokenKind) -> bool {
        token.map_or(false, |t| {
            std::mem::discriminant(&t.kind) == std::mem::discriminant(kind)
        })
    }

    fn check(&self, kind: &TokenKind) -> bool {
        !self.is_at_end() && Self::same_kind(Some(self.peek()), kind)
    }

    fn check_ahead(&self, n: usize, kind: &TokenKind) -> bool {
        Self::same_kind(self.tokens.get(self.current + n), kind)
    }

    fn check_identifier_ahead(&self, n: usize) -> bool {
        matches!(
            self.tokens.get(self.current + n).map(|t| &t.kind),
            Some(TokenKind::Identifier(_))
        )
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        let matched = self.check(kind);
        if matched {
            self.advance();
        }
        matched
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> ToyResult<&Token> {
        if !self.check(kind) {
            return Err(self.error(message));
        }
        Ok(self.advance())
    }

    /// Name and span of the next token, which must be an identifier
    fn identifier(&mut self, message: &str) -> ToyResult<(String, Span)> {
        if !self.check_identifier_ahead(0) {
            return Err(self.error(message));
        }
        let token = self.advance();
        Ok((token.lexeme.clone(), token.span))
    }

    fn error_at(&self, span: Span, message: &str) -> ToyError {
        ToyError::syntax_error(message, span, &self.file).with_source(&self.source)
    }

    fn error(&self, message: &str) -> ToyError {
        self.error_at(self.peek().span, message)
    }

    fn error_at_previous(&self, message: &str) -> ToyError {
        self.error_at(self.previous().span, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;

    fn parse(source: &str) -> ToyResult<Program> {
        let tokens = Scanner::new(source, "test").scan_tokens()?;
        Parser::new(tokens, "test", source).parse()
    }

    #[test]
    fn test_for_in_header_with_and_without_var() {
        for source in ["for (var i, v in arr) {}", "for (k, v in obj) ;"] {
            let program = parse(source).unwrap();
            assert!(matches!(program.statements[0], Stmt::ForIn { .. }));
        }
    }

    #[test]
    fn test_c_style_for_with_var_list() {
        let program = parse("for (var i = 0, j = 10; i < j; i++) {}").unwrap();
        match &program.statements[0] {
            Stmt::For { initializer, .. } => match initializer.as_deref() {
                Some(Stmt::Var { bindings, .. }) => assert_eq!(bindings.len(), 2),
                other => panic!("unexpected initializer {:?}", other),
            },
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_assignment() {
        let program = parse("x += 1 + 2 * 3;").unwrap();
        let Stmt::Expression { expr, .. } = &program.statements[0] else {
            panic!("expected expression statement");
        };
        let Expr::Assignment { op, value, .. } = expr else {
            panic!("expected assignment");
        };
        assert_eq!(*op, AssignOp::AddAssign);
        assert!(matches!(
            value.as_ref(),
            Expr::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_object_literal_accepts_both_separators() {
        let program = parse("var o = {a = 1, \"b\": 2, e = {x = 100}};").unwrap();
        let Stmt::Var { bindings, .. } = &program.statements[0] else {
            panic!("expected var");
        };
        let Some(Expr::Object { entries, .. }) = &bindings[0].initializer else {
            panic!("expected object literal");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "e"]);
    }

    #[test]
    fn test_elif_chains_nest() {
        let program = parse("if (a) x(); elif (b) y(); else z();").unwrap();
        let Stmt::If { else_branch, .. } = &program.statements[0] else {
            panic!("expected if");
        };
        assert!(matches!(else_branch.as_deref(), Some(Stmt::If { .. })));
    }

    #[test]
    fn test_coroutine_and_resume_shapes() {
        let program = parse("coroutine g(a) { var b = yield(a); } var r = resume(g, 1, 2);").unwrap();
        let Stmt::Function { def } = &program.statements[0] else {
            panic!("expected coroutine");
        };
        assert_eq!(def.kind, FunctionKind::Coroutine);
        let Stmt::Var { bindings, .. } = &program.statements[1] else {
            panic!("expected var");
        };
        let Some(Expr::Resume { args, .. }) = &bindings[0].initializer else {
            panic!("expected resume");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_lists_accept_a_trailing_comma() {
        let program = parse("f(1, [2, 3,], {a = 4,},);").unwrap();
        let Stmt::Expression {
            expr: Expr::Call { args, .. },
            ..
        } = &program.statements[0]
        else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
        let err = parse("function f(a, a) {}").unwrap_err();
        assert_eq!(err.message, "Duplicate parameter 'a'");
        let err = parse("[1, 2").unwrap_err();
        assert_eq!(err.message, "Expected ']' after array elements");
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 = 2;").unwrap_err();
        assert_eq!(err.message, "Invalid assignment target");
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        let err = parse("var a = 1\nvar b = 2;").unwrap_err();
        assert_eq!(err.message, "Expected ';' after variable declaration");
        assert_eq!(err.span.start.line, 2);
    }
}
