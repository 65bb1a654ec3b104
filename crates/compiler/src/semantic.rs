//! Semantic analysis.
//!
//! Walks the AST in declaration order with a single scoped symbol table.
//! The checks are deliberately minimal: undefined and redefined names,
//! possibly-null identifiers, and arithmetic on non-numeric operands.
//! Statement kinds the executable subset does not cover are skipped without
//! complaint. Analysis runs in single-error mode: the first error aborts
//! the walk.

use crate::ast::{Expr, Program, Stmt, TypeInfo, TypeKind};
use crate::diagnostics::suggest_similar_name;

/// Upper bound on live symbols across all open scopes.
pub const MAX_SYMBOLS: usize = 256;

/// A named binding known to the analyzer.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub type_info: TypeInfo,
    pub is_initialized: bool,
    pub is_optional: bool,
    pub scope_depth: u32,
}

/// Flat symbol table. Lookup scans back-to-front so inner scopes shadow
/// outer ones; ending a scope truncates the tail.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scope_depth: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Define a name in the current scope. Fails when the name already
    /// exists at this depth or the table is full.
    pub fn define(&mut self, name: &str, type_info: TypeInfo, is_optional: bool) -> bool {
        if self.symbols.len() >= MAX_SYMBOLS {
            return false;
        }

        for symbol in self.symbols.iter().rev() {
            if symbol.scope_depth < self.scope_depth {
                break;
            }
            if symbol.name == name {
                return false;
            }
        }

        self.symbols.push(Symbol {
            name: name.to_string(),
            type_info,
            is_initialized: false,
            is_optional,
            scope_depth: self.scope_depth,
        });
        true
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().rev().find(|s| s.name == name)
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self
            .symbols
            .last()
            .is_some_and(|s| s.scope_depth > self.scope_depth)
        {
            self.symbols.pop();
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.name.as_str())
    }
}

/// A semantic error, reported against a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub line: u32,
    pub message: String,
    /// "Did you mean" candidate for misspelled names.
    pub suggestion: Option<String>,
}

impl SemanticError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        SemanticError {
            line,
            message: message.into(),
            suggestion: None,
        }
    }
}

impl std::fmt::Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[line {}] Semantic error: {}", self.line, self.message)
    }
}

impl std::error::Error for SemanticError {}

/// The semantic analysis pass.
#[derive(Debug, Default)]
pub struct Analyzer {
    symbols: SymbolTable,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer::default()
    }

    pub fn analyze(&mut self, program: &Program) -> Result<(), SemanticError> {
        for stmt in &program.statements {
            self.analyze_statement(stmt)?;
        }
        Ok(())
    }

    fn analyze_statement(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match stmt {
            Stmt::VarDecl {
                name,
                type_info,
                initializer,
                span,
            } => {
                let init_type = match initializer {
                    Some(expr) => Some(self.analyze_expression(expr)?),
                    None => None,
                };

                // The declared annotation wins over the inferred type.
                let var_type = type_info
                    .clone()
                    .or(init_type)
                    .unwrap_or_else(TypeInfo::unknown);
                let is_optional = var_type.is_optional;

                if !self.symbols.define(name, var_type, is_optional) {
                    return Err(SemanticError::new(
                        span.line,
                        format!("Variable '{}' already defined", name),
                    ));
                }
                Ok(())
            }

            Stmt::Block { statements, .. } => {
                self.symbols.begin_scope();
                let result = statements
                    .iter()
                    .try_for_each(|s| self.analyze_statement(s));
                self.symbols.end_scope();
                result
            }

            Stmt::Expr { expr, .. } => {
                self.analyze_expression(expr)?;
                Ok(())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.analyze_expression(condition)?;
                self.analyze_statement(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.analyze_statement(else_branch)?;
                }
                Ok(())
            }

            // Everything else is outside the checked subset.
            _ => Ok(()),
        }
    }

    fn analyze_expression(&mut self, expr: &Expr) -> Result<TypeInfo, SemanticError> {
        match expr {
            Expr::NumberLit { .. } => Ok(TypeInfo::new(TypeKind::Int, false, Some("int"))),
            Expr::StringLit { .. } => Ok(TypeInfo::new(TypeKind::String, false, Some("string"))),
            Expr::BoolLit { .. } => Ok(TypeInfo::new(TypeKind::Bool, false, Some("bool"))),
            Expr::NullLit { .. } => Ok(TypeInfo::new(TypeKind::Null, true, Some("null"))),

            Expr::Identifier { name, span } => {
                let Some(symbol) = self.symbols.resolve(name) else {
                    let mut error = SemanticError::new(
                        span.line,
                        format!("Undefined variable '{}'", name),
                    );
                    error.suggestion = suggest_similar_name(name, self.symbols.names());
                    return Err(error);
                };

                let kind = symbol.type_info.kind;
                let type_name = symbol.type_info.name.clone();
                let is_optional = symbol.is_optional;
                let is_initialized = symbol.is_initialized;

                if is_optional && !is_initialized {
                    return Err(SemanticError::new(
                        span.line,
                        format!("Variable '{}' may be null", name),
                    ));
                }

                Ok(TypeInfo {
                    kind,
                    is_optional,
                    name: type_name,
                })
            }

            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left_type = self.analyze_expression(left)?;
                let right_type = self.analyze_expression(right)?;

                if matches!(op.as_str(), "+" | "-" | "*" | "/") {
                    let offends = |t: &TypeInfo| t.kind != TypeKind::Unknown && !t.is_numeric();
                    if offends(&left_type) || offends(&right_type) {
                        return Err(SemanticError::new(
                            span.line,
                            "Arithmetic operation requires numeric types",
                        ));
                    }
                }

                Ok(TypeInfo::new(TypeKind::Int, false, Some("int")))
            }

            // Unary, call, member, index, and aggregate literals are not
            // typed by this pass.
            _ => Ok(TypeInfo::unknown()),
        }
    }
}
