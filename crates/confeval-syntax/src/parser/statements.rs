//! Statement parsing methods for the recursive-descent parser.

use super::{ParseResult, Parser};
use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Token;

impl Parser {
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        self.skip_newlines();

        match self.peek() {
            Some(Token::Val) => self.parse_val(),
            Some(_) => self.parse_expression_statement(),
            None => Err(ParseError::UnexpectedEof {
                expected: "statement".to_string(),
                context: None,
            }),
        }
    }

    fn parse_val(&mut self) -> ParseResult<Statement> {
        let start_span = self.expect(Token::Val, "val declaration")?;
        let (name, _) = self.expect_identifier("val declaration")?;

        let ty = if matches!(self.peek(), Some(Token::Colon)) {
            self.advance();
            Some(self.parse_type_name("val type")?)
        } else {
            None
        };

        let delegated = match self.peek() {
            Some(Token::Assign) => false,
            Some(Token::By) => true,
            Some(other) => {
                let found = other.display_name();
                let span = self.peek_span().unwrap_or(start_span);
                return Err(ParseError::UnexpectedToken {
                    expected: "'=' or 'by'".to_string(),
                    found,
                    span,
                });
            }
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "'=' or 'by'".to_string(),
                    context: Some(format!("val '{}'", name)),
                });
            }
        };
        self.advance();

        let value = self.parse_expression()?;
        let span = start_span.merge(&value.span());

        Ok(Statement::Val {
            name,
            ty,
            value,
            delegated,
            span,
        })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.parse_expression()?;

        if !matches!(self.peek(), Some(Token::Assign)) {
            return Ok(Statement::Expr(expr));
        }

        if !matches!(expr, Expr::Ident(..) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(ParseError::InvalidSyntax {
                message: "invalid assignment target".to_string(),
                span: expr.span(),
            });
        }

        self.advance();
        let value = self.parse_expression()?;
        let span = expr.span().merge(&value.span());

        Ok(Statement::Assign {
            target: expr,
            value,
            span,
        })
    }

    /// Parses a possibly dotted type name such as `com.example.MyPlugin`.
    pub(super) fn parse_type_name(&mut self, context: &str) -> ParseResult<String> {
        let (mut name, _) = self.expect_identifier(context)?;
        while matches!(self.peek(), Some(Token::Dot)) {
            self.advance();
            let (part, _) = self.expect_identifier(context)?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }
}
