mod expressions;
mod statements;

use crate::ast::*;
use crate::error::{ParseError, Span};
use crate::lexer::{SpannedToken, Token};

pub type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser for configuration scripts.
///
/// Consumes a sequence of [`SpannedToken`]s and produces a `Vec<`[`Statement`]`>`.
/// Use the free function [`parse()`] for a convenient entry point.
pub struct Parser {
    pub(super) tokens: Vec<SpannedToken>,
    pub(super) pos: usize,
}

impl Parser {
    /// Creates a new parser from a token stream.
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    #[inline]
    pub(super) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|st| &st.token)
    }

    #[inline]
    pub(super) fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.pos).map(|st| st.span)
    }

    #[inline]
    pub(super) fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|st| st.span)
            .unwrap_or_else(|| Span::single(1, 1, 0))
    }

    /// Next token that is not a newline or comment, without consuming anything.
    pub(super) fn peek_past_newlines(&self) -> Option<&Token> {
        self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .map(|st| &st.token)
            .find(|t| !matches!(t, Token::Newline | Token::Comment(_)))
    }

    #[inline]
    pub(super) fn advance(&mut self) -> Option<SpannedToken> {
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    pub(super) fn expect(&mut self, expected: Token, context: &str) -> ParseResult<Span> {
        match self.advance() {
            Some(st) if st.token == expected => Ok(st.span),
            Some(st) => Err(ParseError::UnexpectedToken {
                expected: expected.display_name(),
                found: st.token.display_name(),
                span: st.span,
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: expected.display_name(),
                context: Some(context.to_string()),
            }),
        }
    }

    pub(super) fn expect_identifier(&mut self, context: &str) -> ParseResult<(String, Span)> {
        match self.advance() {
            Some(SpannedToken { token: Token::Identifier(name), span }) => Ok((name, span)),
            Some(st) => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: st.token.display_name(),
                span: st.span,
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: "identifier".to_string(),
                context: Some(context.to_string()),
            }),
        }
    }

    #[inline]
    pub(super) fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(t) if t.is_separator()) {
            self.advance();
        }
    }

    /// Parses statements up to (not including) the closing `}`.
    pub(super) fn parse_body(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::with_capacity(8);

        self.skip_newlines();

        while !matches!(self.peek(), Some(Token::RightBrace) | None) {
            statements.push(self.parse_statement()?);
            self.expect_statement_end()?;
            self.skip_newlines();
        }

        Ok(statements)
    }

    /// A statement must be followed by a separator, a closing brace or EOF.
    pub(super) fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(st) if st.token.is_separator() || st.token == Token::RightBrace => Ok(()),
            Some(st) => Err(ParseError::UnexpectedToken {
                expected: "end of statement".to_string(),
                found: st.token.display_name(),
                span: st.span,
            }),
        }
    }
}

/// Parses a token stream into a list of [`Statement`] nodes.
pub fn parse(tokens: Vec<SpannedToken>) -> ParseResult<Vec<Statement>> {
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::with_capacity(16);

    parser.skip_newlines();

    while parser.peek().is_some() {
        if matches!(parser.peek(), Some(Token::RightBrace)) {
            let span = parser.peek_span().unwrap_or_else(|| parser.previous_span());
            return Err(ParseError::InvalidSyntax {
                message: "unmatched '}'".to_string(),
                span,
            });
        }
        statements.push(parser.parse_statement()?);
        parser.expect_statement_end()?;
        parser.skip_newlines();
    }

    Ok(statements)
}

/// Tokenizes and parses `source` in one step.
pub fn parse_source(source: &str) -> ParseResult<Vec<Statement>> {
    let tokens = crate::lexer::tokenize(source)?;
    parse(tokens)
}
