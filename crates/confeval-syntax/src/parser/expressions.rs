//! Expression parsing methods for the recursive-descent parser.

use super::{ParseResult, Parser};
use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{SpannedToken, Token};

impl Parser {
    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_infix()
    }

    /// `left name right`, only while the name sits on the same line.
    fn parse_infix(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        while let Some(Token::Identifier(name)) = self.peek() {
            let name = name.clone();
            self.advance();
            let right = self.parse_additive()?;
            let span = left.span().merge(&right.span());

            left = Expr::Infix {
                left: Box::new(left),
                name,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_postfix()?;

        while matches!(self.peek(), Some(Token::Plus)) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_postfix()?;
            let span = left.span().merge(&right.span());
            left = Expr::Concat(Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let (name, name_span) = self.expect_identifier("member access")?;
                    let span = expr.span().merge(&name_span);
                    expr = Expr::Member {
                        receiver: Box::new(expr),
                        name,
                        span,
                    };
                }
                // a chain may continue on the next line: `id("x")\n    .version("1")`
                Some(Token::Newline) | Some(Token::Comment(_))
                    if matches!(self.peek_past_newlines(), Some(Token::Dot)) =>
                {
                    self.skip_newlines();
                }
                Some(Token::LeftParen) if is_callable(&expr) => {
                    expr = self.parse_call(expr, Vec::new())?;
                }
                Some(Token::Lt) if is_callable(&expr) => {
                    self.advance();
                    let mut type_args = vec![self.parse_type_name("type arguments")?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        type_args.push(self.parse_type_name("type arguments")?);
                    }
                    self.expect(Token::Gt, "type arguments")?;
                    if !matches!(self.peek(), Some(Token::LeftParen)) {
                        return Err(ParseError::InvalidSyntax {
                            message: "type arguments must be followed by a call".to_string(),
                            span: self.previous_span(),
                        });
                    }
                    expr = self.parse_call(expr, type_args)?;
                }
                Some(Token::LeftBrace) if is_callable(&expr) => {
                    let (lambda, end) = self.parse_lambda()?;
                    let span = expr.span().merge(&end);
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        type_args: Vec::new(),
                        args: Args::new(),
                        lambda: Some(lambda),
                        span,
                    };
                }
                Some(Token::LeftBracket) => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expression()?;
                    self.skip_newlines();
                    let end = self.expect(Token::RightBracket, "index")?;
                    let span = expr.span().merge(&end);
                    expr = Expr::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_call(&mut self, callee: Expr, type_args: Vec<String>) -> ParseResult<Expr> {
        self.expect(Token::LeftParen, "call arguments")?;
        let mut args = Args::new();

        self.skip_newlines();
        while !matches!(self.peek(), Some(Token::RightParen) | None) {
            let name = match (self.peek(), self.tokens.get(self.pos + 1).map(|st| &st.token)) {
                (Some(Token::Identifier(name)), Some(Token::Assign)) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_expression()?;
            args.push(Arg { name, value });

            self.skip_newlines();
            if matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }

        let mut end = self.expect(Token::RightParen, "call arguments")?;

        let lambda = if matches!(self.peek(), Some(Token::LeftBrace)) {
            let (body, lambda_end) = self.parse_lambda()?;
            end = lambda_end;
            Some(body)
        } else {
            None
        };

        let span = callee.span().merge(&end);
        Ok(Expr::Call {
            callee: Box::new(callee),
            type_args,
            args,
            lambda,
            span,
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<(Vec<Statement>, crate::error::Span)> {
        self.expect(Token::LeftBrace, "block")?;
        let body = self.parse_body()?;
        let end = self.expect(Token::RightBrace, "block")?;
        Ok((body, end))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Some(SpannedToken { token: Token::String(s), span }) => Ok(Expr::Str(s, span)),
            Some(SpannedToken { token: Token::Number(n), span }) => Ok(Expr::Number(n, span)),
            Some(SpannedToken { token: Token::True, span }) => Ok(Expr::Bool(true, span)),
            Some(SpannedToken { token: Token::False, span }) => Ok(Expr::Bool(false, span)),
            Some(SpannedToken { token: Token::Identifier(name), span }) => Ok(Expr::Ident(name, span)),
            Some(SpannedToken { token: Token::LeftParen, .. }) => {
                self.skip_newlines();
                let inner = self.parse_expression()?;
                self.skip_newlines();
                self.expect(Token::RightParen, "parenthesized expression")?;
                Ok(inner)
            }
            Some(st) => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: st.token.display_name(),
                span: st.span,
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: "expression".to_string(),
                context: None,
            }),
        }
    }
}

fn is_callable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(..) | Expr::Member { .. })
}
