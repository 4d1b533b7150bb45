use crate::language::span::Span;
use std::fmt;

pub const SUPPLIER_PATH: &str = "std.Supplier";
pub const LAZY_SUPPLIER_PATH: &str = "std.LazySupplier";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
}

impl PrimitiveKind {
    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        match name {
            "boolean" => Some(PrimitiveKind::Boolean),
            "byte" => Some(PrimitiveKind::Byte),
            "short" => Some(PrimitiveKind::Short),
            "int" => Some(PrimitiveKind::Int),
            "long" => Some(PrimitiveKind::Long),
            "char" => Some(PrimitiveKind::Char),
            "float" => Some(PrimitiveKind::Float),
            "double" => Some(PrimitiveKind::Double),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    pub fn boxed_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Int => "Integer",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
        }
    }

    pub fn from_boxed_name(name: &str) -> Option<PrimitiveKind> {
        match name {
            "Boolean" => Some(PrimitiveKind::Boolean),
            "Byte" => Some(PrimitiveKind::Byte),
            "Short" => Some(PrimitiveKind::Short),
            "Integer" => Some(PrimitiveKind::Int),
            "Long" => Some(PrimitiveKind::Long),
            "Char" => Some(PrimitiveKind::Char),
            "Float" => Some(PrimitiveKind::Float),
            "Double" => Some(PrimitiveKind::Double),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub segments: Vec<String>,
}

impl QualifiedName {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn from_dotted(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn simple_name(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Primitive(PrimitiveKind),
    Named {
        name: QualifiedName,
        args: Vec<TypeExpr>,
    },
    Array(Box<TypeExpr>),
    Infer,
    Void,
}

impl TypeExpr {
    pub fn named(path: &str) -> Self {
        TypeExpr::Named {
            name: QualifiedName::from_dotted(path),
            args: Vec::new(),
        }
    }

    pub fn generic(path: &str, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named {
            name: QualifiedName::from_dotted(path),
            args,
        }
    }

    pub fn is_supplier(&self) -> bool {
        matches!(self, TypeExpr::Named { name, .. } if name.simple_name() == "Supplier")
    }

    pub fn is_lazy_supplier(&self) -> bool {
        matches!(self, TypeExpr::Named { name, .. } if name.simple_name() == "LazySupplier")
    }

    pub fn is_deferred(&self) -> bool {
        self.is_supplier() || self.is_lazy_supplier()
    }

    pub fn canonical_name(&self) -> String {
        match self {
            TypeExpr::Primitive(kind) => kind.name().to_string(),
            TypeExpr::Named { name, args } => {
                if args.is_empty() {
                    name.to_string()
                } else {
                    let rendered: Vec<String> =
                        args.iter().map(|ty| ty.canonical_name()).collect();
                    format!("{}<{}>", name, rendered.join(","))
                }
            }
            TypeExpr::Array(elem) => format!("{}[]", elem.canonical_name()),
            TypeExpr::Infer => "var".into(),
            TypeExpr::Void => "void".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnnotation {
    pub ty: TypeExpr,
    pub span: Span,
}

impl TypeAnnotation {
    pub fn new(ty: TypeExpr, span: Span) -> Self {
        Self { ty, span }
    }
}
