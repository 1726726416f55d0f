//! Formula tokenizer

use crate::parser::ParseError;

/// Byte range in the formula source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    /// `==`
    Eq,
    /// `===`
    StrictEq,
    /// `!=`
    Ne,
    /// `!==`
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Split formula source into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let byte_at = |idx: usize| chars.get(idx).map(|(b, _)| *b).unwrap_or(source.len());
    let char_at = |idx: usize| chars.get(idx).map(|(_, c)| *c);

    while i < chars.len() {
        let (start, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Number literal, including a leading-dot form like `.5`
        if c.is_ascii_digit() || (c == '.' && char_at(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let mut j = i;
            let mut seen_dot = false;
            let mut seen_exp = false;
            while let Some(n) = char_at(j) {
                if n.is_ascii_digit() {
                    j += 1;
                } else if n == '.' && !seen_dot && !seen_exp {
                    seen_dot = true;
                    j += 1;
                } else if (n == 'e' || n == 'E') && !seen_exp {
                    let sign = char_at(j + 1);
                    let digit_at = if matches!(sign, Some('+') | Some('-')) {
                        j + 2
                    } else {
                        j + 1
                    };
                    if !char_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                        break;
                    }
                    seen_exp = true;
                    j = digit_at;
                } else {
                    break;
                }
            }
            let end = byte_at(j);
            let text = &source[start..end];
            let value = text.parse::<f64>().map_err(|_| ParseError {
                message: format!("Invalid number: {}", text),
                span: Span::new(start, end),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                span: Span::new(start, end),
            });
            i = j;
            continue;
        }

        if is_ident_start(c) {
            let mut j = i + 1;
            while char_at(j).is_some_and(is_ident_continue) {
                j += 1;
            }
            let end = byte_at(j);
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..end].to_string()),
                span: Span::new(start, end),
            });
            i = j;
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut j = i + 1;
            let mut text = String::new();
            let mut closed = false;
            while let Some(n) = char_at(j) {
                if n == '\\' {
                    match char_at(j + 1) {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => break,
                    }
                    j += 2;
                    continue;
                }
                if n == quote {
                    closed = true;
                    j += 1;
                    break;
                }
                text.push(n);
                j += 1;
            }
            let end = byte_at(j);
            if !closed {
                return Err(ParseError {
                    message: "Unterminated string literal".to_string(),
                    span: Span::new(start, end),
                });
            }
            tokens.push(Token {
                kind: TokenKind::Str(text),
                span: Span::new(start, end),
            });
            i = j;
            continue;
        }

        let next = char_at(i + 1);
        let next2 = char_at(i + 2);
        let (kind, len) = match (c, next, next2) {
            ('=', Some('='), Some('=')) => (TokenKind::StrictEq, 3),
            ('=', Some('='), _) => (TokenKind::Eq, 2),
            ('!', Some('='), Some('=')) => (TokenKind::StrictNe, 3),
            ('!', Some('='), _) => (TokenKind::Ne, 2),
            ('<', Some('='), _) => (TokenKind::Le, 2),
            ('>', Some('='), _) => (TokenKind::Ge, 2),
            ('&', Some('&'), _) => (TokenKind::AndAnd, 2),
            ('|', Some('|'), _) => (TokenKind::OrOr, 2),
            ('!', _, _) => (TokenKind::Bang, 1),
            ('<', _, _) => (TokenKind::Lt, 1),
            ('>', _, _) => (TokenKind::Gt, 1),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('?', _, _) => (TokenKind::Question, 1),
            (':', _, _) => (TokenKind::Colon, 1),
            ('(', _, _) => (TokenKind::LParen, 1),
            (')', _, _) => (TokenKind::RParen, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            ('.', _, _) => (TokenKind::Dot, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            _ => {
                return Err(ParseError {
                    message: format!("Unexpected character '{}'", c),
                    span: Span::new(start, byte_at(i + 1)),
                })
            }
        };
        tokens.push(Token {
            kind,
            span: Span::new(start, byte_at(i + len)),
        });
        i += len;
    }

    Ok(tokens)
}
