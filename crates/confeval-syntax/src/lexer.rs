use crate::error::{LexError, Span};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

static KEYWORDS: Lazy<HashMap<&'static str, Token>> = Lazy::new(|| {
    let mut m = HashMap::with_capacity(4);
    m.insert("val", Token::Val);
    m.insert("by", Token::By);
    m.insert("true", Token::True);
    m.insert("false", Token::False);
    m
});

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Val,
    By,
    True,
    False,
    Plus,
    Assign,
    Lt,
    Gt,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Dot,
    Comma,
    Colon,
    Semicolon,
    Identifier(String),
    String(String),
    Number(f64),
    Newline,
    Comment(String),
}

impl Token {
    pub fn display_name(&self) -> String {
        match self {
            Token::Val => "keyword 'val'".to_string(),
            Token::By => "keyword 'by'".to_string(),
            Token::True => "keyword 'true'".to_string(),
            Token::False => "keyword 'false'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Assign => "'='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::LeftBrace => "'{'".to_string(),
            Token::RightBrace => "'}'".to_string(),
            Token::LeftBracket => "'['".to_string(),
            Token::RightBracket => "']'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Semicolon => "';'".to_string(),
            Token::Identifier(s) => format!("'{}'", s),
            Token::String(s) => format!("string \"{}\"", s),
            Token::Number(n) => format!("number {}", n),
            Token::Newline => "newline".to_string(),
            Token::Comment(_) => "comment".to_string(),
        }
    }

    /// Newlines, semicolons and comments separate statements.
    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Newline | Token::Semicolon | Token::Comment(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut tokens = Vec::with_capacity(input.len() / 4);
    let mut chars = input.chars().peekable();

    let mut line = 1;
    let mut col = 1;
    let mut offset = 0;

    let bump = |ch: char, line: &mut usize, col: &mut usize, offset: &mut usize| {
        if ch == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
        *offset += ch.len_utf8();
    };

    while let Some(&ch) = chars.peek() {
        let start_line = line;
        let start_col = col;
        let start_offset = offset;

        let single = match ch {
            '+' => Some(Token::Plus),
            '=' => Some(Token::Assign),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '{' => Some(Token::LeftBrace),
            '}' => Some(Token::RightBrace),
            '[' => Some(Token::LeftBracket),
            ']' => Some(Token::RightBracket),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            ';' => Some(Token::Semicolon),
            _ => None,
        };

        if let Some(token) = single {
            chars.next();
            bump(ch, &mut line, &mut col, &mut offset);
            tokens.push(SpannedToken {
                token,
                span: Span::new(start_line, start_col, start_offset, offset),
            });
            continue;
        }

        match ch {
            ' ' | '\t' | '\r' => {
                chars.next();
                bump(ch, &mut line, &mut col, &mut offset);
            }

            '\n' => {
                chars.next();
                bump(ch, &mut line, &mut col, &mut offset);
                tokens.push(SpannedToken {
                    token: Token::Newline,
                    span: Span::new(start_line, start_col, start_offset, offset),
                });
            }

            '/' => {
                chars.next();
                bump(ch, &mut line, &mut col, &mut offset);

                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        bump('/', &mut line, &mut col, &mut offset);

                        let mut comment = String::new();
                        while let Some(&ch) = chars.peek() {
                            if ch == '\n' {
                                break;
                            }
                            chars.next();
                            bump(ch, &mut line, &mut col, &mut offset);
                            comment.push(ch);
                        }

                        tokens.push(SpannedToken {
                            token: Token::Comment(comment.trim().to_string()),
                            span: Span::new(start_line, start_col, start_offset, offset),
                        });
                    }
                    Some('*') => {
                        chars.next();
                        bump('*', &mut line, &mut col, &mut offset);

                        let mut comment = String::new();
                        let mut closed = false;
                        while let Some(ch) = chars.next() {
                            bump(ch, &mut line, &mut col, &mut offset);
                            if ch == '*' && chars.peek() == Some(&'/') {
                                chars.next();
                                bump('/', &mut line, &mut col, &mut offset);
                                closed = true;
                                break;
                            }
                            comment.push(ch);
                        }

                        if !closed {
                            return Err(LexError::UnterminatedComment {
                                span: Span::new(start_line, start_col, start_offset, offset),
                            });
                        }

                        tokens.push(SpannedToken {
                            token: Token::Comment(comment.trim().to_string()),
                            span: Span::new(start_line, start_col, start_offset, offset),
                        });
                    }
                    _ => {
                        return Err(LexError::UnexpectedChar {
                            ch: '/',
                            span: Span::new(start_line, start_col, start_offset, offset),
                            suggestion: Some("comments start with '//' or '/*'".to_string()),
                        });
                    }
                }
            }

            '"' => {
                chars.next();
                bump(ch, &mut line, &mut col, &mut offset);

                let mut string = String::new();
                let mut escaped = false;
                let mut closed = false;

                while let Some(&ch) = chars.peek() {
                    if escaped {
                        string.push(match ch {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '\\' => '\\',
                            '"' => '"',
                            '$' => '$',
                            _ => ch,
                        });
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        chars.next();
                        bump(ch, &mut line, &mut col, &mut offset);
                        closed = true;
                        break;
                    } else if ch == '\n' {
                        break;
                    } else {
                        string.push(ch);
                    }
                    chars.next();
                    bump(ch, &mut line, &mut col, &mut offset);
                }

                if !closed {
                    return Err(LexError::UnterminatedString {
                        span: Span::new(start_line, start_col, start_offset, offset),
                    });
                }

                tokens.push(SpannedToken {
                    token: Token::String(string),
                    span: Span::new(start_line, start_col, start_offset, offset),
                });
            }

            '0'..='9' => {
                let mut num_str = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num_str.push(ch);
                        chars.next();
                        bump(ch, &mut line, &mut col, &mut offset);
                    } else if ch == '.' && !num_str.contains('.') {
                        // `1.toString()` is a member call, `1.5` is a number
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if !matches!(lookahead.peek(), Some(c) if c.is_ascii_digit()) {
                            break;
                        }
                        num_str.push(ch);
                        chars.next();
                        bump(ch, &mut line, &mut col, &mut offset);
                    } else {
                        break;
                    }
                }

                let num = num_str
                    .parse::<f64>()
                    .map_err(|_| LexError::InvalidNumber {
                        text: num_str,
                        span: Span::new(start_line, start_col, start_offset, offset),
                    })?;

                tokens.push(SpannedToken {
                    token: Token::Number(num),
                    span: Span::new(start_line, start_col, start_offset, offset),
                });
            }

            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                        bump(ch, &mut line, &mut col, &mut offset);
                    } else {
                        break;
                    }
                }

                let token = KEYWORDS
                    .get(ident.as_str())
                    .cloned()
                    .unwrap_or(Token::Identifier(ident));

                tokens.push(SpannedToken {
                    token,
                    span: Span::new(start_line, start_col, start_offset, offset),
                });
            }

            '\'' => {
                return Err(LexError::UnexpectedChar {
                    ch,
                    span: Span::single(start_line, start_col, start_offset),
                    suggestion: Some("string literals use double quotes".to_string()),
                });
            }

            _ => {
                return Err(LexError::UnexpectedChar {
                    ch,
                    span: Span::single(start_line, start_col, start_offset),
                    suggestion: None,
                });
            }
        }
    }

    Ok(tokens)
}
