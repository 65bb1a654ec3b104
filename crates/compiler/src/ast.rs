//! Abstract syntax tree.
//!
//! One variant per syntactic construct. Children are owned by their parent,
//! so dropping the `Program` drops the whole tree. Every node carries a
//! `Span` with its 1-based source position. Binary and unary operators are
//! kept as their short source text (`"+"`, `"=="`, `"&&"`, ...); the code
//! generator maps them to opcodes.

/// Source position of a node (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

/// Kind of a (possibly annotated) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Unknown,
    Int,
    Float,
    String,
    Bool,
    Null,
    Array,
    Object,
    Function,
    Optional,
}

/// Type information attached to declarations and inferred for expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub is_optional: bool,
    pub name: Option<String>,
}

impl TypeInfo {
    pub fn new(kind: TypeKind, is_optional: bool, name: Option<&str>) -> Self {
        TypeInfo {
            kind,
            is_optional,
            name: name.map(str::to_string),
        }
    }

    pub fn unknown() -> Self {
        TypeInfo::new(TypeKind::Unknown, false, None)
    }

    /// Parse a `: name` annotation. The `?` suffix is tokenised separately
    /// and passed in as `is_optional`. Unrecognised names stay Unknown.
    pub fn from_annotation(name: &str, is_optional: bool) -> Self {
        let kind = match name {
            "int" => TypeKind::Int,
            "float" => TypeKind::Float,
            "string" => TypeKind::String,
            "bool" => TypeKind::Bool,
            "null" => TypeKind::Null,
            _ => TypeKind::Unknown,
        };
        TypeInfo::new(kind, is_optional, Some(name))
    }

    /// True when the kind is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Float)
    }
}

/// A whole source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A function parameter: `name: type?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_info: Option<TypeInfo>,
    pub span: Span,
}

/// An entity field: `name: type? = default`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityField {
    pub name: String,
    pub type_info: Option<TypeInfo>,
    pub default: Option<Expr>,
    pub span: Span,
}

/// Body of a function declaration.
///
/// Arrow bodies (`fn f() => expr`) keep the bare expression; the designated
/// desugaring is a block containing `return expr`.
#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    Block(Vec<Stmt>),
    Arrow(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        name: String,
        type_info: Option<TypeInfo>,
        initializer: Option<Expr>,
        span: Span,
    },
    FnDecl {
        name: String,
        params: Vec<Param>,
        return_type: Option<TypeInfo>,
        body: FnBody,
        span: Span,
    },
    EntityDecl {
        name: String,
        fields: Vec<EntityField>,
        span: Span,
    },
    Block {
        statements: Vec<Stmt>,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    ForIn {
        iterator: String,
        iterable: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    TryCatch {
        try_block: Box<Stmt>,
        error_type: String,
        error_name: String,
        catch_block: Box<Stmt>,
        span: Span,
    },
    Use {
        module_path: String,
        span: Span,
    },
    Spawn {
        body: Box<Stmt>,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VarDecl { span, .. }
            | Stmt::FnDecl { span, .. }
            | Stmt::EntityDecl { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::If { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::TryCatch { span, .. }
            | Stmt::Use { span, .. }
            | Stmt::Spawn { span, .. }
            | Stmt::Expr { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    NumberLit {
        value: f64,
        span: Span,
    },
    StringLit {
        value: String,
        span: Span,
    },
    BoolLit {
        value: bool,
        span: Span,
    },
    NullLit {
        span: Span,
    },
    ArrayLit {
        elements: Vec<Expr>,
        span: Span,
    },
    ObjectLit {
        pairs: Vec<(String, Expr)>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::NumberLit { span, .. }
            | Expr::StringLit { span, .. }
            | Expr::BoolLit { span, .. }
            | Expr::NullLit { span, .. }
            | Expr::ArrayLit { span, .. }
            | Expr::ObjectLit { span, .. } => *span,
        }
    }
}
