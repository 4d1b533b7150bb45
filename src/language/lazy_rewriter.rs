use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    span::Span,
    types::{TypeAnnotation, TypeExpr, LAZY_SUPPLIER_PATH, SUPPLIER_PATH},
};

pub const LAZY_MARKER: &str = "lazy";

// Runs once per parsed unit, before type-checking. The walk must visit each
// declaration exactly once: a rewritten declaration fed back through would be
// wrapped in a second supplier layer.
pub fn rewrite_unit(unit: &CompilationUnit) -> Result<CompilationUnit, SyntaxErrors> {
    let mut items = Vec::new();
    for item in &unit.items {
        match rewrite_item(item) {
            Ok(item) => items.push(item),
            Err(err) => return Err(SyntaxErrors::new(vec![err])),
        }
    }
    Ok(CompilationUnit {
        name: unit.name.clone(),
        path: unit.path.clone(),
        items,
    })
}

fn rewrite_item(item: &Item) -> Result<Item, SyntaxError> {
    match item {
        Item::Function(def) => Ok(Item::Function(FunctionDecl {
            body: rewrite_block(&def.body)?,
            ..def.clone()
        })),
        Item::Class(_) => Ok(item.clone()),
    }
}

fn rewrite_block(block: &Block) -> Result<Block, SyntaxError> {
    let mut statements = Vec::new();
    for stmt in &block.statements {
        statements.push(rewrite_statement(stmt)?);
    }
    Ok(Block {
        statements,
        span: block.span,
    })
}

fn rewrite_statement(stmt: &Statement) -> Result<Statement, SyntaxError> {
    match stmt {
        Statement::Local(decl) => Ok(Statement::Local(rewrite_declaration(decl)?)),
        Statement::If(if_stmt) => Ok(Statement::If(Box::new(IfStmt {
            condition: if_stmt.condition.clone(),
            then_branch: rewrite_block(&if_stmt.then_branch)?,
            else_branch: match &if_stmt.else_branch {
                Some(block) => Some(rewrite_block(block)?),
                None => None,
            },
            span: if_stmt.span,
        }))),
        Statement::While(while_stmt) => Ok(Statement::While(Box::new(WhileStmt {
            condition: while_stmt.condition.clone(),
            body: rewrite_block(&while_stmt.body)?,
        }))),
        Statement::Block(block) => Ok(Statement::Block(Box::new(rewrite_block(block)?))),
        Statement::Assign(_) | Statement::Expr(_) | Statement::Return(_) => Ok(stmt.clone()),
    }
}

pub fn rewrite_declaration(decl: &LocalDecl) -> Result<LocalDecl, SyntaxError> {
    let Some(init) = decl.init.as_ref() else {
        // Marked but uninitialized declarations fall through unchanged.
        return Ok(decl.clone());
    };
    if !decl.has_annotation(LAZY_MARKER) {
        return Ok(decl.clone());
    }

    // The type slot is rewritten first: the initializer rewrite reads the
    // resulting declared type to pick its constructor's type arguments.
    let ty = resolve_declared_type(decl.ty.as_ref(), init, decl.span)?;
    let init = rewrite_initializer(ty.as_ref(), init.clone())?;
    Ok(LocalDecl {
        annotations: decl.annotations.clone(),
        ty,
        name: decl.name.clone(),
        init: Some(init),
        span: decl.span,
    })
}

fn resolve_declared_type(
    ty: Option<&TypeAnnotation>,
    init: &Expr,
    decl_span: Span,
) -> Result<Option<TypeAnnotation>, SyntaxError> {
    match ty {
        // `var` stays `var`: the rewritten initializer must remain inferable
        // by the regular inference rules.
        Some(ann) if matches!(ann.ty, TypeExpr::Infer) => Ok(Some(ann.clone())),
        Some(ann) => {
            let supplier = supplier_type_from_declared(&ann.ty, ann.span)?;
            Ok(Some(TypeAnnotation::new(supplier, ann.span)))
        }
        None => {
            let supplier = supplier_type_from_initializer(init)?;
            Ok(Some(TypeAnnotation::new(supplier, decl_span)))
        }
    }
}

fn supplier_type_from_declared(ty: &TypeExpr, span: Span) -> Result<TypeExpr, SyntaxError> {
    if ty.is_deferred() {
        // Already a deferred-value type: reuse its argument instead of
        // wrapping a second supplier layer around it.
        let args = type_arguments_of(ty, span)?;
        return Ok(TypeExpr::generic(SUPPLIER_PATH, args));
    }
    let arg = convert_if_primitive(ty.clone(), span)?;
    Ok(TypeExpr::generic(SUPPLIER_PATH, vec![arg]))
}

fn supplier_type_from_initializer(init: &Expr) -> Result<TypeExpr, SyntaxError> {
    let arg = match init {
        Expr::Literal(literal) => literal_value_type(literal)?,
        Expr::New { class, .. } => class.ty.clone(),
        other => {
            return Err(SyntaxError::new(
                format!(
                    "Cannot infer the lazy binding's type: expected a literal or constructor invocation, got {}",
                    describe_expr(other)
                ),
                other.span(),
            ));
        }
    };
    Ok(TypeExpr::generic(SUPPLIER_PATH, vec![arg]))
}

fn rewrite_initializer(ty: Option<&TypeAnnotation>, init: Expr) -> Result<Expr, SyntaxError> {
    let span = init.span();
    let type_args = match ty {
        Some(ann) if !matches!(ann.ty, TypeExpr::Infer) => type_arguments_of(&ann.ty, ann.span)?,
        _ => Vec::new(),
    };
    let factory = Expr::Lambda {
        body: Box::new(init),
        span,
    };
    Ok(Expr::New {
        class: TypeAnnotation::new(TypeExpr::generic(LAZY_SUPPLIER_PATH, type_args), span),
        args: vec![factory],
        span,
    })
}

fn type_arguments_of(ty: &TypeExpr, span: Span) -> Result<Vec<TypeExpr>, SyntaxError> {
    let TypeExpr::Named { args, .. } = ty else {
        return Ok(Vec::new());
    };
    if args.len() > 1 {
        return Err(SyntaxError::new("Expected at most 1 type argument", span));
    }
    args.iter()
        .map(|arg| convert_if_primitive(arg.clone(), span))
        .collect()
}

fn convert_if_primitive(ty: TypeExpr, span: Span) -> Result<TypeExpr, SyntaxError> {
    match ty {
        TypeExpr::Primitive(kind) => Ok(TypeExpr::named(kind.boxed_name())),
        TypeExpr::Void | TypeExpr::Infer => Err(SyntaxError::new(
            format!("Expected a value type, got `{}`", ty.canonical_name()),
            span,
        )),
        other => Ok(other),
    }
}

fn literal_value_type(literal: &Literal) -> Result<TypeExpr, SyntaxError> {
    let name = match literal {
        Literal::Int(..) => "Integer",
        Literal::Float(..) => "Double",
        Literal::Bool(..) => "Boolean",
        Literal::Char(..) => "Char",
        Literal::String(..) => "String",
        Literal::Null(span) => {
            return Err(SyntaxError::new(
                "Cannot infer the lazy binding's type from `null`",
                *span,
            ));
        }
    };
    Ok(TypeExpr::named(name))
}

fn describe_expr(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "a literal",
        Expr::Identifier(_) => "an identifier",
        Expr::New { .. } => "a constructor invocation",
        Expr::NewArray { .. } => "an array literal",
        Expr::Lambda { .. } => "a lambda",
        Expr::Call { .. } => "a call",
        Expr::MethodCall { .. } => "a method call",
        Expr::FieldAccess { .. } => "a field access",
        Expr::Index { .. } => "an index expression",
        Expr::Binary { .. } => "a binary expression",
        Expr::Unary { .. } => "a unary expression",
    }
}

#[cfg(test)]
mod tests {
    use super::{rewrite_declaration, rewrite_unit};
    use crate::language::{
        ast::{Expr, Item, Literal, LocalDecl, Statement},
        parser::parse_unit,
        types::{PrimitiveKind, TypeExpr},
    };
    use std::path::PathBuf;

    fn parse_first_decl(source: &str) -> LocalDecl {
        let unit =
            parse_unit("tests::rewriter", PathBuf::from("test.latte"), source).expect("parse");
        for item in unit.items {
            if let Item::Function(func) = item {
                for stmt in func.body.statements {
                    if let Statement::Local(decl) = stmt {
                        return decl;
                    }
                }
            }
        }
        panic!("no local declaration in source");
    }

    fn declared_type(decl: &LocalDecl) -> TypeExpr {
        decl.ty.as_ref().expect("declared type").ty.clone()
    }

    fn supplier_of(arg: TypeExpr) -> TypeExpr {
        TypeExpr::generic("std.Supplier", vec![arg])
    }

    #[test]
    fn boxes_explicit_primitive_declaration() {
        let decl = parse_first_decl("void main() { @lazy int n = 42; }");
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::named("Integer"))
        );
        let Some(Expr::New { class, args, .. }) = &rewritten.init else {
            panic!("expected a constructor initializer");
        };
        assert_eq!(
            class.ty,
            TypeExpr::generic("std.LazySupplier", vec![TypeExpr::named("Integer")])
        );
        assert_eq!(args.len(), 1);
        let Expr::Lambda { body, .. } = &args[0] else {
            panic!("expected the factory lambda");
        };
        assert!(matches!(**body, Expr::Literal(Literal::Int(42, _))));
    }

    #[test]
    fn boxes_every_primitive_kind() {
        let cases = [
            ("boolean", "true", PrimitiveKind::Boolean, "Boolean"),
            ("byte", "1", PrimitiveKind::Byte, "Byte"),
            ("short", "1", PrimitiveKind::Short, "Short"),
            ("int", "1", PrimitiveKind::Int, "Integer"),
            ("long", "1", PrimitiveKind::Long, "Long"),
            ("char", "'x'", PrimitiveKind::Char, "Char"),
            ("float", "1.5", PrimitiveKind::Float, "Float"),
            ("double", "1.5", PrimitiveKind::Double, "Double"),
        ];
        for (keyword, value, kind, boxed) in cases {
            let source = format!("void main() {{ @lazy {keyword} v = {value}; }}");
            let decl = parse_first_decl(&source);
            assert_eq!(decl.ty.as_ref().map(|t| t.ty.clone()), Some(TypeExpr::Primitive(kind)));
            let rewritten = rewrite_declaration(&decl).expect("rewrite");
            assert_eq!(
                declared_type(&rewritten),
                supplier_of(TypeExpr::named(boxed)),
                "boxing {keyword}"
            );
        }
    }

    #[test]
    fn reference_type_is_used_verbatim() {
        let decl = parse_first_decl(r#"void main() { @lazy Point p = new Point(1, "a"); }"#);
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::named("Point"))
        );
    }

    #[test]
    fn generic_reference_type_is_wrapped_whole() {
        let decl = parse_first_decl("void main() { @lazy Box<String> b = null; }");
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::generic(
                "Box",
                vec![TypeExpr::named("String")]
            ))
        );
    }

    #[test]
    fn var_declaration_keeps_inference_marker() {
        let decl = parse_first_decl(r#"void main() { @lazy var s = "hello"; }"#);
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(declared_type(&rewritten), TypeExpr::Infer);
        let Some(Expr::New { class, .. }) = &rewritten.init else {
            panic!("expected a constructor initializer");
        };
        // No explicit type argument: the checker infers it from the factory.
        assert_eq!(class.ty, TypeExpr::generic("std.LazySupplier", Vec::new()));
    }

    #[test]
    fn untyped_declaration_derives_type_from_literal() {
        let decl = parse_first_decl(r#"void main() { @lazy s = "hello"; }"#);
        assert!(decl.ty.is_none());
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::named("String"))
        );
    }

    #[test]
    fn untyped_declaration_derives_type_from_constructor() {
        let decl = parse_first_decl(r#"void main() { @lazy p = new Point(1, "a"); }"#);
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::named("Point"))
        );
    }

    #[test]
    fn untyped_declaration_rejects_other_initializer_shapes() {
        let decl = parse_first_decl("void main() { @lazy x = f(); }");
        let err = rewrite_declaration(&decl).expect_err("call initializers cannot be inferred");
        assert!(err.message.contains("literal or constructor invocation"));
    }

    #[test]
    fn untyped_declaration_rejects_null_literal() {
        let decl = parse_first_decl("void main() { @lazy x = null; }");
        let err = rewrite_declaration(&decl).expect_err("null has no value type");
        assert!(err.message.contains("null"));
    }

    #[test]
    fn pre_annotated_supplier_is_not_double_wrapped() {
        let decl = parse_first_decl(r#"void main() { @lazy Supplier<String> s = "x"; }"#);
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            supplier_of(TypeExpr::named("String"))
        );
    }

    #[test]
    fn rejects_more_than_one_type_argument() {
        let decl =
            parse_first_decl(r#"void main() { @lazy Supplier<String, Integer> s = "x"; }"#);
        let err = rewrite_declaration(&decl).expect_err("two type arguments");
        assert!(err.message.contains("at most 1 type argument"));
    }

    #[test]
    fn rejects_void_type_slot() {
        let decl = parse_first_decl("void main() { @lazy void v = 1; }");
        let err = rewrite_declaration(&decl).expect_err("void is not a value type");
        assert!(err.message.contains("void"));
    }

    #[test]
    fn unmarked_declaration_is_untouched() {
        let decl = parse_first_decl("void main() { int n = 42; }");
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            TypeExpr::Primitive(PrimitiveKind::Int)
        );
        assert!(matches!(
            rewritten.init,
            Some(Expr::Literal(Literal::Int(42, _)))
        ));
    }

    #[test]
    fn other_annotations_do_not_trigger_the_rewrite() {
        let decl = parse_first_decl("void main() { @memo int n = 42; }");
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            TypeExpr::Primitive(PrimitiveKind::Int)
        );
    }

    #[test]
    fn marked_declaration_without_initializer_is_untouched() {
        let decl = parse_first_decl("void main() { @lazy int n; }");
        let rewritten = rewrite_declaration(&decl).expect("rewrite");
        assert_eq!(
            declared_type(&rewritten),
            TypeExpr::Primitive(PrimitiveKind::Int)
        );
        assert!(rewritten.init.is_none());
    }

    #[test]
    fn rewrites_declarations_in_nested_blocks() {
        let unit = parse_unit(
            "tests::rewriter",
            PathBuf::from("test.latte"),
            r#"
void main() {
  if (true) {
    @lazy int n = 1;
  }
}
"#,
        )
        .expect("parse");
        let rewritten = rewrite_unit(&unit).expect("rewrite");
        let Item::Function(func) = &rewritten.items[0] else {
            panic!("expected a function");
        };
        let Statement::If(if_stmt) = &func.body.statements[0] else {
            panic!("expected an if statement");
        };
        let Statement::Local(decl) = &if_stmt.then_branch.statements[0] else {
            panic!("expected a local declaration");
        };
        assert!(decl.ty.as_ref().map(|t| t.ty.is_supplier()).unwrap_or(false));
    }
}
