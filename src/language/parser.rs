use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
    types::{PrimitiveKind, QualifiedName, TypeAnnotation, TypeExpr},
};
use std::path::PathBuf;

pub fn parse_unit(name: &str, path: PathBuf, source: &str) -> Result<CompilationUnit, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(name, path, tokens).parse()
}

struct Parser {
    unit_name: String,
    path: PathBuf,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(name: &str, path: PathBuf, tokens: Vec<Token>) -> Self {
        Self {
            unit_name: name.to_string(),
            path,
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<CompilationUnit, SyntaxErrors> {
        let mut items = Vec::new();

        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }

            let result = if self.check(TokenKind::Class) {
                self.parse_class().map(Item::Class)
            } else {
                self.parse_function().map(Item::Function)
            };
            match result {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.report(err);
                    self.synchronize_item();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(CompilationUnit {
                name: self.unit_name,
                path: self.path,
                items,
            })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_class(&mut self) -> Result<ClassDecl, SyntaxError> {
        let start = self.expect(TokenKind::Class)?.span.start;
        let name = self.expect_identifier("Expected class name")?;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            let ty = self.parse_type_annotation()?;
            let field = self.expect_identifier("Expected field name")?;
            let end = self.expect(TokenKind::Semi)?.span.end;
            fields.push(FieldDecl {
                span: Span::new(ty.span.start, end),
                ty,
                name: field.name,
            });
        }
        let end = self.expect(TokenKind::RBrace)?.span.end;
        Ok(ClassDecl {
            name: name.name,
            fields,
            span: Span::new(start, end),
        })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, SyntaxError> {
        let return_type = self.parse_type_annotation()?;
        let name = self.expect_identifier("Expected function name")?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let ty = self.parse_type_annotation()?;
                let param = self.expect_identifier("Expected parameter name")?;
                params.push(Param {
                    span: Span::new(ty.span.start, param.span.end),
                    ty,
                    name: param.name,
                });
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            span: Span::new(return_type.span.start, body.span.end),
            return_type,
            name: name.name,
            params,
            body,
        })
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let start = self.expect(TokenKind::LBrace)?.span.start;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        let end = self.expect(TokenKind::RBrace)?.span.end;
        Ok(Block {
            statements,
            span: Span::new(start, end),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::At) => {
                let annotations = self.parse_annotations()?;
                self.parse_local_decl(annotations).map(Statement::Local)
            }
            Some(TokenKind::Var) | Some(TokenKind::Void) => {
                self.parse_local_decl(Vec::new()).map(Statement::Local)
            }
            Some(TokenKind::Return) => {
                let start = self.advance().span.start;
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                let end = self.expect(TokenKind::Semi)?.span.end;
                Ok(Statement::Return(ReturnStmt {
                    value,
                    span: Span::new(start, end),
                }))
            }
            Some(TokenKind::If) => {
                let start = self.advance().span.start;
                self.expect(TokenKind::LParen)?;
                let condition = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = self.parse_block()?;
                let else_branch = if self.matches(TokenKind::Else) {
                    Some(self.parse_block()?)
                } else {
                    None
                };
                let end = else_branch
                    .as_ref()
                    .map(|b| b.span.end)
                    .unwrap_or(then_branch.span.end);
                Ok(Statement::If(Box::new(IfStmt {
                    condition,
                    then_branch,
                    else_branch,
                    span: Span::new(start, end),
                })))
            }
            Some(TokenKind::While) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let condition = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_block()?;
                Ok(Statement::While(Box::new(WhileStmt { condition, body })))
            }
            Some(TokenKind::LBrace) => Ok(Statement::Block(Box::new(self.parse_block()?))),
            _ if self.looks_like_declaration() => {
                self.parse_local_decl(Vec::new()).map(Statement::Local)
            }
            _ => {
                let expr = self.parse_expression()?;
                if self.matches(TokenKind::Eq) {
                    let value = self.parse_expression()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Statement::Assign(AssignStmt {
                        target: expr,
                        value,
                    }))
                } else {
                    self.expect(TokenKind::Semi)?;
                    Ok(Statement::Expr(ExprStmt { expr }))
                }
            }
        }
    }

    fn parse_annotations(&mut self) -> Result<Vec<Annotation>, SyntaxError> {
        let mut annotations = Vec::new();
        while self.check(TokenKind::At) {
            let start = self.advance().span.start;
            let name = self.expect_identifier("Expected annotation name")?;
            annotations.push(Annotation {
                span: Span::new(start, name.span.end),
                name: name.name,
            });
        }
        Ok(annotations)
    }

    fn parse_local_decl(&mut self, annotations: Vec<Annotation>) -> Result<LocalDecl, SyntaxError> {
        let start = annotations
            .first()
            .map(|ann| ann.span.start)
            .unwrap_or_else(|| self.current_span_start());

        // Annotation-led declarations may omit the type slot entirely:
        // `@lazy x = 42;` declares `x` with no declared type.
        let untyped = !annotations.is_empty()
            && matches!(self.peek_kind(), Some(TokenKind::Identifier(_)))
            && self.peek_kind_n(1) == Some(TokenKind::Eq);

        let ty = if untyped {
            None
        } else if self.check(TokenKind::Var) {
            let span = self.advance().span;
            Some(TypeAnnotation::new(TypeExpr::Infer, span))
        } else {
            Some(self.parse_type_annotation()?)
        };

        let name = self.expect_identifier("Expected variable name")?;
        let init = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(LocalDecl {
            annotations,
            ty,
            name: name.name,
            init,
            span: Span::new(start, end),
        })
    }

    // Distinguishes `SomeType name = ...` / `int[] a = ...` / `Supplier<T> s = ...`
    // from expressions that also start with an identifier.
    fn looks_like_declaration(&self) -> bool {
        let Some(TokenKind::Identifier(_)) = self.peek_kind() else {
            return false;
        };
        let mut offset = 1;
        while self.peek_kind_n(offset) == Some(TokenKind::Dot)
            && matches!(self.peek_kind_n(offset + 1), Some(TokenKind::Identifier(_)))
        {
            offset += 2;
        }
        match self.peek_kind_n(offset) {
            Some(TokenKind::Identifier(_)) => true,
            Some(TokenKind::LBracket) => self.peek_kind_n(offset + 1) == Some(TokenKind::RBracket),
            Some(TokenKind::Lt) => {
                let mut depth = 0usize;
                loop {
                    match self.peek_kind_n(offset) {
                        Some(TokenKind::Lt) => depth += 1,
                        Some(TokenKind::Gt) => {
                            depth -= 1;
                            if depth == 0 {
                                offset += 1;
                                break;
                            }
                        }
                        Some(
                            TokenKind::Identifier(_)
                            | TokenKind::Dot
                            | TokenKind::Comma
                            | TokenKind::LBracket
                            | TokenKind::RBracket,
                        ) => {}
                        _ => return false,
                    }
                    offset += 1;
                }
                matches!(self.peek_kind_n(offset), Some(TokenKind::Identifier(_)))
            }
            _ => false,
        }
    }

    fn parse_type_annotation(&mut self) -> Result<TypeAnnotation, SyntaxError> {
        let start = self.current_span_start();
        let ty = self.parse_type_expr()?;
        let end = self.previous_span().map(|s| s.end).unwrap_or(start);
        Ok(TypeAnnotation::new(ty, Span::new(start, end)))
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, SyntaxError> {
        let mut ty = self.parse_type_base()?;
        while self.check(TokenKind::LBracket) && self.peek_kind_n(1) == Some(TokenKind::RBracket) {
            self.advance();
            self.advance();
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_type_base(&mut self) -> Result<TypeExpr, SyntaxError> {
        if self.matches(TokenKind::Void) {
            return Ok(TypeExpr::Void);
        }
        let ident = self.expect_identifier("Expected type name")?;
        if let Some(kind) = PrimitiveKind::from_name(&ident.name) {
            return Ok(TypeExpr::Primitive(kind));
        }
        let mut segments = vec![ident.name];
        while self.check(TokenKind::Dot)
            && matches!(self.peek_kind_n(1), Some(TokenKind::Identifier(_)))
        {
            self.advance();
            let segment = self.expect_identifier("Expected type name segment")?;
            segments.push(segment.name);
        }
        let mut args = Vec::new();
        if self.matches(TokenKind::Lt) {
            loop {
                args.push(self.parse_type_expr()?);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
            self.expect(TokenKind::Gt)?;
        }
        Ok(TypeExpr::Named {
            name: QualifiedName { segments },
            args,
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        while let Some((op, prec)) = self.current_binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span.start;
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::Dot) {
                let name = self.expect_identifier("Expected member name after '.'")?;
                if self.matches(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    let end = self.expect(TokenKind::RParen)?.span.end;
                    let span = Span::new(expr.span().start, end);
                    expr = Expr::MethodCall {
                        receiver: Box::new(expr),
                        name: name.name,
                        args,
                        span,
                    };
                } else {
                    let span = Span::new(expr.span().start, name.span.end);
                    expr = Expr::FieldAccess {
                        base: Box::new(expr),
                        field: name.name,
                        span,
                    };
                }
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end = self.expect(TokenKind::RBracket)?.span.end;
                let span = Span::new(expr.span().start, end);
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Integer(value)) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Int(value, span)))
            }
            Some(TokenKind::Float(value)) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Float(value, span)))
            }
            Some(TokenKind::String(value)) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::String(value, span)))
            }
            Some(TokenKind::Char(value)) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Char(value, span)))
            }
            Some(TokenKind::True) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Bool(true, span)))
            }
            Some(TokenKind::False) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Bool(false, span)))
            }
            Some(TokenKind::Null) => {
                let span = self.advance().span;
                Ok(Expr::Literal(Literal::Null(span)))
            }
            Some(TokenKind::New) => self.parse_new_expression(),
            Some(TokenKind::LParen) => {
                if self.peek_kind_n(1) == Some(TokenKind::RParen)
                    && self.peek_kind_n(2) == Some(TokenKind::Arrow)
                {
                    let start = self.advance().span.start;
                    self.advance(); // ')'
                    self.advance(); // '->'
                    let body = self.parse_expression()?;
                    let span = Span::new(start, body.span().end);
                    return Ok(Expr::Lambda {
                        body: Box::new(body),
                        span,
                    });
                }
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(TokenKind::Identifier(_)) => {
                let ident = self.expect_identifier("Expected identifier")?;
                if self.matches(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    let end = self.expect(TokenKind::RParen)?.span.end;
                    let span = Span::new(ident.span.start, end);
                    return Ok(Expr::Call {
                        name: ident,
                        args,
                        span,
                    });
                }
                Ok(Expr::Identifier(ident))
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn parse_new_expression(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.expect(TokenKind::New)?.span.start;
        let base_start = self.current_span_start();
        let base = self.parse_type_base()?;
        let base_end = self.previous_span().map(|s| s.end).unwrap_or(base_start);

        if self.check(TokenKind::LBracket) && self.peek_kind_n(1) == Some(TokenKind::RBracket) {
            let mut elem = base;
            let mut suffixes = 0;
            while self.check(TokenKind::LBracket)
                && self.peek_kind_n(1) == Some(TokenKind::RBracket)
            {
                self.advance();
                self.advance();
                suffixes += 1;
            }
            for _ in 1..suffixes {
                elem = TypeExpr::Array(Box::new(elem));
            }
            let elem_end = self.previous_span().map(|s| s.end).unwrap_or(base_end);
            self.expect(TokenKind::LBrace)?;
            let mut elements = Vec::new();
            if !self.check(TokenKind::RBrace) {
                loop {
                    elements.push(self.parse_expression()?);
                    if self.matches(TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
            }
            let end = self.expect(TokenKind::RBrace)?.span.end;
            return Ok(Expr::NewArray {
                elem: TypeAnnotation::new(elem, Span::new(base_start, elem_end)),
                elements,
                span: Span::new(start, end),
            });
        }

        self.expect(TokenKind::LParen)?;
        let args = self.parse_arguments()?;
        let end = self.expect(TokenKind::RParen)?.span.end;
        Ok(Expr::New {
            class: TypeAnnotation::new(base, Span::new(base_start, base_end)),
            args,
            span: Span::new(start, end),
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        Ok(args)
    }

    fn current_binary_op(&self) -> Option<(BinaryOp, u8)> {
        match self.peek_kind() {
            Some(TokenKind::Plus) => Some((BinaryOp::Add, 10)),
            Some(TokenKind::Minus) => Some((BinaryOp::Sub, 10)),
            Some(TokenKind::Star) => Some((BinaryOp::Mul, 20)),
            Some(TokenKind::Slash) => Some((BinaryOp::Div, 20)),
            Some(TokenKind::Percent) => Some((BinaryOp::Rem, 20)),
            Some(TokenKind::AmpersandAmpersand) => Some((BinaryOp::And, 4)),
            Some(TokenKind::PipePipe) => Some((BinaryOp::Or, 3)),
            Some(TokenKind::EqEq) => Some((BinaryOp::Eq, 5)),
            Some(TokenKind::BangEq) => Some((BinaryOp::NotEq, 5)),
            Some(TokenKind::Lt) => Some((BinaryOp::Lt, 9)),
            Some(TokenKind::LtEq) => Some((BinaryOp::LtEq, 9)),
            Some(TokenKind::Gt) => Some((BinaryOp::Gt, 9)),
            Some(TokenKind::GtEq) => Some((BinaryOp::GtEq, 9)),
            _ => None,
        }
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<Identifier, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                let span = self.advance().span;
                Ok(Identifier { name, span })
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("Expected {:?}", kind)))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind.clone()) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if tk == kind)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        let token = self
            .tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().unwrap());
        self.pos = (self.pos + 1).min(self.tokens.len());
        token
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn current_span_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.span.end).unwrap_or(0))
    }

    fn previous_span(&self) -> Option<Span> {
        if self.pos == 0 {
            None
        } else {
            Some(self.tokens[self.pos - 1].span)
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let span = self
            .tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| t.span)
                    .unwrap_or_else(|| Span::new(0, 0))
            });
        SyntaxError::new(message.to_string(), span)
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_item(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(TokenKind::Class | TokenKind::Void) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_unit;
    use crate::language::{
        ast::{Expr, Item, Literal, Statement},
        types::{PrimitiveKind, TypeExpr},
    };
    use std::path::PathBuf;

    fn parse_source(source: &str) -> crate::language::ast::CompilationUnit {
        parse_unit("tests::unit", PathBuf::from("test.latte"), source).expect("parse")
    }

    fn first_function_statements(source: &str) -> Vec<Statement> {
        let unit = parse_source(source);
        let Some(Item::Function(func)) = unit.items.into_iter().next() else {
            panic!("expected a function item");
        };
        func.body.statements
    }

    #[test]
    fn parses_annotated_declaration() {
        let statements = first_function_statements(
            r#"
void main() {
  @lazy int n = 42;
}
"#,
        );
        let Statement::Local(decl) = &statements[0] else {
            panic!("expected a local declaration");
        };
        assert!(decl.has_annotation("lazy"));
        assert_eq!(
            decl.ty.as_ref().map(|t| t.ty.clone()),
            Some(TypeExpr::Primitive(PrimitiveKind::Int))
        );
        assert!(matches!(
            decl.init,
            Some(Expr::Literal(Literal::Int(42, _)))
        ));
    }

    #[test]
    fn parses_untyped_annotated_declaration() {
        let statements = first_function_statements(
            r#"
void main() {
  @lazy s = "hello";
}
"#,
        );
        let Statement::Local(decl) = &statements[0] else {
            panic!("expected a local declaration");
        };
        assert!(decl.ty.is_none());
        assert!(decl.init.is_some());
    }

    #[test]
    fn distinguishes_generic_declaration_from_comparison() {
        let statements = first_function_statements(
            r#"
void main() {
  Supplier<String> s = null;
  int a = 1;
  int b = 2;
  boolean c = a < b;
}
"#,
        );
        assert!(matches!(statements[0], Statement::Local(_)));
        let Statement::Local(decl) = &statements[3] else {
            panic!("expected a local declaration");
        };
        assert!(matches!(decl.init, Some(Expr::Binary { .. })));
    }

    #[test]
    fn parses_array_literal_and_lambda() {
        let statements = first_function_statements(
            r#"
void main() {
  int[] a = new int[]{1, 2, 3};
  var f = () -> 1 + 2;
}
"#,
        );
        let Statement::Local(decl) = &statements[0] else {
            panic!("expected a local declaration");
        };
        assert!(matches!(decl.init, Some(Expr::NewArray { .. })));
        let Statement::Local(decl) = &statements[1] else {
            panic!("expected a local declaration");
        };
        assert!(matches!(decl.ty.as_ref().map(|t| &t.ty), Some(TypeExpr::Infer)));
        assert!(matches!(decl.init, Some(Expr::Lambda { .. })));
    }

    #[test]
    fn parses_class_declaration() {
        let unit = parse_source(
            r#"
class Point {
  int x;
  String label;
}
"#,
        );
        let Some(Item::Class(class)) = unit.items.into_iter().next() else {
            panic!("expected a class item");
        };
        assert_eq!(class.name, "Point");
        assert_eq!(class.fields.len(), 2);
    }
}
