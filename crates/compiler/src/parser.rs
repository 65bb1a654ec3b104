//! Recursive-descent parser.
//!
//! Expressions are layered by precedence (logical-or at the top, calls at
//! the bottom), all binary operators left-associative. Error handling is
//! panic mode: the first error is recorded, further diagnostics are
//! suppressed until a synchronisation point (a just-consumed `}` or a
//! statement-starter keyword), and parsing then continues so callers always
//! get a (possibly partial) `Program` back.

use crate::ast::{EntityField, Expr, FnBody, Param, Program, Span, Stmt, TypeInfo};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// A syntax error with the offending token's position and text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub lexeme: String,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[line {}, col {}] Error at '{}': {}",
            self.line, self.column, self.lexeme, self.message
        )
    }
}

impl std::error::Error for ParseError {}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    error: Option<ParseError>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            start: 0,
            line: 0,
            column: 0,
        };
        let mut parser = Parser {
            lexer: Lexer::new(source),
            current: placeholder,
            previous: placeholder,
            had_error: false,
            panic_mode: false,
            error: None,
        };
        parser.advance();
        parser
    }

    /// Parse the whole input. Always returns a Program; check `had_error`
    /// before trusting it.
    pub fn parse(&mut self) -> Program {
        let mut statements = Vec::new();

        while !self.check(TokenKind::Eof) {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }

        Program { statements }
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// The first error encountered, if any.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    // ---- token plumbing ----

    fn advance(&mut self) {
        self.previous = self.current;

        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            // Error tokens carry their message as the lexeme.
            let token = self.current;
            self.error_at(token, token.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Option<()> {
        if self.check(kind) {
            self.advance();
            return Some(());
        }
        self.error_at_current(message);
        None
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        if self.error.is_none() {
            self.error = Some(ParseError {
                line: token.line,
                column: token.column,
                lexeme: token.lexeme.to_string(),
                message: message.to_string(),
            });
        }
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error_at_previous(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn previous_span(&self) -> Span {
        Span::new(self.previous.line, self.previous.column)
    }

    /// Skip to a statement boundary after an error.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        let mut advanced = false;
        while !self.check(TokenKind::Eof) {
            if advanced && self.previous.kind == TokenKind::RBrace {
                return;
            }
            match self.current.kind {
                TokenKind::Let
                | TokenKind::Fn
                | TokenKind::Entity
                | TokenKind::If
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Try
                | TokenKind::Use => return,
                _ => {}
            }
            self.advance();
            advanced = true;
        }
    }

    // ---- declarations ----

    fn declaration(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::Let) {
            return self.var_declaration();
        }
        if self.matches(TokenKind::Fn) {
            return self.fn_declaration();
        }
        if self.matches(TokenKind::Entity) {
            return self.entity_declaration();
        }
        self.statement()
    }

    fn var_declaration(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::Identifier, "Expected variable name")?;
        let name = self.previous.lexeme.to_string();

        let type_info = self.type_annotation()?;

        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };

        Some(Stmt::VarDecl {
            name,
            type_info,
            initializer,
            span,
        })
    }

    fn fn_declaration(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::Identifier, "Expected function name")?;
        let name = self.previous.lexeme.to_string();

        self.consume(TokenKind::LParen, "Expected '(' after function name")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                self.consume(TokenKind::Identifier, "Expected parameter name")?;
                let param_span = self.previous_span();
                let param_name = self.previous.lexeme.to_string();
                let param_type = self.type_annotation()?;
                params.push(Param {
                    name: param_name,
                    type_info: param_type,
                    span: param_span,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;

        let return_type = self.type_annotation()?;

        let body = if self.matches(TokenKind::Arrow) {
            FnBody::Arrow(self.expression()?)
        } else {
            self.consume(
                TokenKind::LBrace,
                "Expected '{' or '=>' after function signature",
            )?;
            let Stmt::Block { statements, .. } = self.block()? else {
                return None;
            };
            FnBody::Block(statements)
        };

        Some(Stmt::FnDecl {
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn entity_declaration(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::Identifier, "Expected entity name")?;
        let name = self.previous.lexeme.to_string();

        self.consume(TokenKind::LBrace, "Expected '{' after entity name")?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.consume(TokenKind::Identifier, "Expected field name")?;
            let field_span = self.previous_span();
            let field_name = self.previous.lexeme.to_string();

            let field_type = self.type_annotation()?;

            let default = if self.matches(TokenKind::Assign) {
                Some(self.expression()?)
            } else {
                None
            };

            fields.push(EntityField {
                name: field_name,
                type_info: field_type,
                default,
                span: field_span,
            });
        }

        self.consume(TokenKind::RBrace, "Expected '}' after entity fields")?;

        Some(Stmt::EntityDecl { name, fields, span })
    }

    /// `: name '?'?` - absent annotations are Ok(None).
    fn type_annotation(&mut self) -> Option<Option<TypeInfo>> {
        if !self.matches(TokenKind::Colon) {
            return Some(None);
        }
        self.consume(TokenKind::Identifier, "Expected type name")?;
        let name = self.previous.lexeme.to_string();
        let is_optional = self.matches(TokenKind::Question);
        Some(Some(TypeInfo::from_annotation(&name, is_optional)))
    }

    // ---- statements ----

    fn statement(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(TokenKind::Try) {
            return self.try_statement();
        }
        if self.matches(TokenKind::Use) {
            return self.use_statement();
        }
        if self.matches(TokenKind::Spawn) {
            return self.spawn_statement();
        }

        let expr = self.expression()?;
        let span = expr.span();
        Some(Stmt::Expr { expr, span })
    }

    /// Statements until `}`; the opening brace must already be consumed.
    fn block(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            match self.declaration() {
                Some(stmt) => statements.push(stmt),
                // Recover at the enclosing statement boundary.
                None => break,
            }
        }

        self.consume(TokenKind::RBrace, "Expected '}' after block")?;
        Some(Stmt::Block { statements, span })
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        let condition = self.expression()?;
        self.consume(TokenKind::LBrace, "Expected '{' after if condition")?;
        let then_branch = Box::new(self.block()?);

        let else_branch = if self.matches(TokenKind::Else) {
            self.consume(TokenKind::LBrace, "Expected '{' after else")?;
            Some(Box::new(self.block()?))
        } else {
            None
        };

        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    fn for_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::Identifier, "Expected iterator variable name")?;
        let iterator = self.previous.lexeme.to_string();

        self.consume(TokenKind::In, "Expected 'in' after iterator")?;
        let iterable = self.expression()?;

        self.consume(TokenKind::LBrace, "Expected '{' after for clause")?;
        let body = Box::new(self.block()?);

        Some(Stmt::ForIn {
            iterator,
            iterable,
            body,
            span,
        })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        // The value is omitted exactly when the next token closes the
        // surrounding block or the file ends.
        let value = if !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            Some(self.expression()?)
        } else {
            None
        };

        Some(Stmt::Return { value, span })
    }

    fn try_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::LBrace, "Expected '{' after try")?;
        let try_block = Box::new(self.block()?);

        self.consume(TokenKind::Catch, "Expected 'catch' after try block")?;

        self.consume(TokenKind::Identifier, "Expected error type")?;
        let error_type = self.previous.lexeme.to_string();

        self.consume(TokenKind::As, "Expected 'as' after error type")?;

        self.consume(TokenKind::Identifier, "Expected error variable name")?;
        let error_name = self.previous.lexeme.to_string();

        self.consume(TokenKind::LBrace, "Expected '{' after catch clause")?;
        let catch_block = Box::new(self.block()?);

        Some(Stmt::TryCatch {
            try_block,
            error_type,
            error_name,
            catch_block,
            span,
        })
    }

    fn use_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::Identifier, "Expected module name")?;
        let mut module_path = self.previous.lexeme.to_string();

        // Dotted paths like http.server collapse into one string.
        while self.matches(TokenKind::Dot) {
            self.consume(TokenKind::Identifier, "Expected module component after '.'")?;
            module_path.push('.');
            module_path.push_str(self.previous.lexeme);
        }

        Some(Stmt::Use { module_path, span })
    }

    fn spawn_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();

        self.consume(TokenKind::LBrace, "Expected '{' after spawn")?;
        let body = Box::new(self.block()?);

        Some(Stmt::Spawn { body, span })
    }

    // ---- expressions, weakest binding first ----

    fn expression(&mut self) -> Option<Expr> {
        self.logical_or()
    }

    fn logical_or(&mut self) -> Option<Expr> {
        let mut expr = self.logical_and()?;
        while self.matches(TokenKind::Or) {
            let span = self.previous_span();
            let right = self.logical_and()?;
            expr = Expr::Binary {
                op: "||".to_string(),
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn logical_and(&mut self) -> Option<Expr> {
        let mut expr = self.equality()?;
        while self.matches(TokenKind::And) {
            let span = self.previous_span();
            let right = self.equality()?;
            expr = Expr::Binary {
                op: "&&".to_string(),
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn equality(&mut self) -> Option<Expr> {
        let mut expr = self.comparison()?;
        while self.matches(TokenKind::Equal) || self.matches(TokenKind::NotEqual) {
            let op = self.previous.lexeme.to_string();
            let span = self.previous_span();
            let right = self.comparison()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn comparison(&mut self) -> Option<Expr> {
        let mut expr = self.term()?;
        while self.matches(TokenKind::Less)
            || self.matches(TokenKind::LessEqual)
            || self.matches(TokenKind::Greater)
            || self.matches(TokenKind::GreaterEqual)
        {
            let op = self.previous.lexeme.to_string();
            let span = self.previous_span();
            let right = self.term()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;
        while self.matches(TokenKind::Plus) || self.matches(TokenKind::Minus) {
            let op = self.previous.lexeme.to_string();
            let span = self.previous_span();
            let right = self.factor()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn factor(&mut self) -> Option<Expr> {
        let mut expr = self.unary()?;
        while self.matches(TokenKind::Star)
            || self.matches(TokenKind::Slash)
            || self.matches(TokenKind::Percent)
        {
            let op = self.previous.lexeme.to_string();
            let span = self.previous_span();
            let right = self.unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                span,
            };
        }
        Some(expr)
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.matches(TokenKind::Not) || self.matches(TokenKind::Minus) {
            let op = self.previous.lexeme.to_string();
            let span = self.previous_span();
            let operand = self.unary()?;
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.call()
    }

    /// A call chain greedily extends while seeing `(`, `.`, or `[`.
    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(TokenKind::LParen) {
                let mut arguments = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        arguments.push(self.expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
                let span = self.previous_span();
                expr = Expr::Call {
                    callee: Box::new(expr),
                    arguments,
                    span,
                };
            } else if self.matches(TokenKind::Dot) {
                self.consume(TokenKind::Identifier, "Expected property name after '.'")?;
                let span = self.previous_span();
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: self.previous.lexeme.to_string(),
                    span,
                };
            } else if self.matches(TokenKind::LBracket) {
                let index = self.expression()?;
                self.consume(TokenKind::RBracket, "Expected ']' after index")?;
                let span = self.previous_span();
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }

        Some(expr)
    }

    fn primary(&mut self) -> Option<Expr> {
        if self.matches(TokenKind::True) {
            return Some(Expr::BoolLit {
                value: true,
                span: self.previous_span(),
            });
        }

        if self.matches(TokenKind::False) {
            return Some(Expr::BoolLit {
                value: false,
                span: self.previous_span(),
            });
        }

        if self.matches(TokenKind::Number) {
            let value = self.previous.lexeme.parse().unwrap_or(0.0);
            return Some(Expr::NumberLit {
                value,
                span: self.previous_span(),
            });
        }

        if self.matches(TokenKind::String) {
            // The lexeme includes the surrounding quotes.
            let lexeme = self.previous.lexeme;
            let value = lexeme[1..lexeme.len() - 1].to_string();
            return Some(Expr::StringLit {
                value,
                span: self.previous_span(),
            });
        }

        if self.matches(TokenKind::Identifier) {
            return Some(Expr::Identifier {
                name: self.previous.lexeme.to_string(),
                span: self.previous_span(),
            });
        }

        if self.matches(TokenKind::LParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RParen, "Expected ')' after expression")?;
            return Some(expr);
        }

        if self.matches(TokenKind::LBracket) {
            let span = self.previous_span();
            let mut elements = Vec::new();
            if !self.check(TokenKind::RBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RBracket, "Expected ']' after array elements")?;
            return Some(Expr::ArrayLit { elements, span });
        }

        self.error_at_previous("Expected expression");
        None
    }
}
