//! Tokenizer for expression templates.
use crate::error::EnvkitError;

/// Tokens produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal.
    Number(f64),
    /// An identifier, keyword or function name.
    Ident(String),
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `/`
    Slash,
    /// `//`
    SlashSlash,
    /// `%`
    Percent,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
}

/// A token with its byte offset in the template.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token.
    pub token: Token,
    /// Byte offset of the first character.
    pub pos: usize,
}

fn parse_error(pos: usize, message: impl Into<String>) -> EnvkitError {
    EnvkitError::Parse {
        pos,
        message: message.into(),
    }
}

/// Splits a template into tokens.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, EnvkitError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    // Two-character operators are matched before their one-character prefixes.
    let peek_is = |i: usize, c: char| chars.get(i + 1).map_or(false, |&(_, d)| d == c);

    while i < chars.len() {
        let (pos, c) = chars[i];
        let (token, width) = match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' if peek_is(i, '*') => (Token::StarStar, 2),
            '*' => (Token::Star, 1),
            '/' if peek_is(i, '/') => (Token::SlashSlash, 2),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '<' if peek_is(i, '=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek_is(i, '=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '=' if peek_is(i, '=') => (Token::EqEq, 2),
            '!' if peek_is(i, '=') => (Token::Ne, 2),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                // Exponent, e.g. `1e-3`.
                if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j].1 == '+' || chars[j].1 == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].1.is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].1.is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let end = chars.get(i).map_or(input.len(), |&(p, _)| p);
                let text = &input[pos..end];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(pos, format!("invalid number '{}'", text)))?;
                tokens.push(SpannedToken {
                    token: Token::Number(n),
                    pos,
                });
                debug_assert!(i > start);
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let end = chars.get(i).map_or(input.len(), |&(p, _)| p);
                tokens.push(SpannedToken {
                    token: Token::Ident(input[pos..end].to_string()),
                    pos,
                });
                continue;
            }
            c => return Err(parse_error(pos, format!("unexpected character '{}'", c))),
        };
        tokens.push(SpannedToken { token, pos });
        i += width;
    }

    Ok(tokens)
}
