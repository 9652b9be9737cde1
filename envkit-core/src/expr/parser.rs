//! Recursive descent parser for expression templates.
//!
//! Precedence, from lowest to highest:
//!
//! | level | operators |
//! |---|---|
//! | or | `or` |
//! | and | `and` |
//! | not | `not` |
//! | comparison | `<`, `<=`, `>`, `>=`, `==`, `!=` |
//! | additive | `+`, `-` |
//! | multiplicative | `*`, `/`, `//`, `%` |
//! | unary | `-x`, `+x` |
//! | power | `**` (right associative) |
use super::{
    ast::{BinaryOp, Func, Node, UnaryOp},
    lexer::{tokenize, SpannedToken, Token},
};
use crate::error::EnvkitError;
use std::{iter::Peekable, vec::IntoIter};

/// Deepest nesting of parentheses, unary operators and powers accepted.
const MAX_DEPTH: usize = 128;

/// Parses a template into a syntax tree.
pub fn parse(template: &str) -> Result<Node, EnvkitError> {
    let mut parser = Parser {
        tokens: tokenize(template)?.into_iter().peekable(),
        end: template.len(),
        depth: 0,
    };
    let node = parser.parse_or()?;
    match parser.tokens.next() {
        None => Ok(node),
        Some(t) => Err(parser.error_at(t.pos, format!("unexpected token {:?}", t.token))),
    }
}

struct Parser {
    tokens: Peekable<IntoIter<SpannedToken>>,
    end: usize,
    depth: usize,
}

impl Parser {
    fn error_at(&self, pos: usize, message: impl Into<String>) -> EnvkitError {
        EnvkitError::Parse {
            pos,
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|t| &t.token)
    }

    /// Runs `f` one nesting level deeper.
    fn nested<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, EnvkitError>,
    ) -> Result<R, EnvkitError> {
        if self.depth >= MAX_DEPTH {
            let pos = self.tokens.peek().map_or(self.end, |t| t.pos);
            return Err(self.error_at(pos, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek_keyword(&mut self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<(), EnvkitError> {
        match self.tokens.next() {
            Some(t) if t.token == expected => Ok(()),
            Some(t) => Err(self.error_at(
                t.pos,
                format!("expected {:?}, found {:?}", expected, t.token),
            )),
            None => Err(self.error_at(self.end, format!("expected {:?}", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Node, EnvkitError> {
        let mut node = self.parse_and()?;
        while self.peek_keyword("or") {
            self.tokens.next();
            let right = self.parse_and()?;
            node = Node::Binary(BinaryOp::Or, Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, EnvkitError> {
        let mut node = self.parse_not()?;
        while self.peek_keyword("and") {
            self.tokens.next();
            let right = self.parse_not()?;
            node = Node::Binary(BinaryOp::And, Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<Node, EnvkitError> {
        if self.peek_keyword("not") {
            self.tokens.next();
            let x = self.nested(Self::parse_not)?;
            Ok(Node::Unary(UnaryOp::Not, Box::new(x)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Node, EnvkitError> {
        let mut node = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => break,
            };
            self.tokens.next();
            let right = self.parse_additive()?;
            node = Node::Binary(op, Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_additive(&mut self) -> Result<Node, EnvkitError> {
        let mut node = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.tokens.next();
            let right = self.parse_multiplicative()?;
            node = Node::Binary(op, Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, EnvkitError> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.tokens.next();
            let right = self.parse_unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node, EnvkitError> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Node, EnvkitError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.tokens.next();
                let x = self.parse_unary()?;
                Ok(Node::Unary(UnaryOp::Neg, Box::new(x)))
            }
            Some(Token::Plus) => {
                self.tokens.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Node, EnvkitError> {
        let base = self.parse_primary()?;
        if let Some(Token::StarStar) = self.peek() {
            self.tokens.next();
            // `-2 ** 2 == -4` and `2 ** -1 == 0.5`
            let exponent = self.parse_unary()?;
            Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)))
        } else {
            Ok(base)
        }
    }

    fn parse_primary(&mut self) -> Result<Node, EnvkitError> {
        let t = match self.tokens.next() {
            Some(t) => t,
            None => return Err(self.error_at(self.end, "unexpected end of expression")),
        };
        match t.token {
            Token::Number(n) => Ok(Node::Num(n)),
            Token::LParen => {
                let node = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(node)
            }
            Token::Ident(word) => {
                match word.as_str() {
                    "True" => return Ok(Node::Num(1.0)),
                    "False" => return Ok(Node::Num(0.0)),
                    "and" | "or" | "not" => {
                        return Err(
                            self.error_at(t.pos, format!("unexpected keyword '{}'", word))
                        )
                    }
                    _ => {}
                }
                if let Some(Token::LParen) = self.peek() {
                    let func = match Func::from_name(&word) {
                        Some(func) => func,
                        None => return Err(EnvkitError::UnknownFunction(word)),
                    };
                    self.tokens.next();
                    let args = self.parse_args()?;
                    func.check_arity(args.len())?;
                    Ok(Node::Call(func, args))
                } else {
                    Ok(Node::Var(word))
                }
            }
            other => Err(self.error_at(t.pos, format!("unexpected token {:?}", other))),
        }
    }

    /// Arguments after the opening parenthesis, consuming the closing one.
    fn parse_args(&mut self) -> Result<Vec<Node>, EnvkitError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.tokens.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.tokens.next() {
                Some(SpannedToken {
                    token: Token::Comma,
                    ..
                }) => continue,
                Some(SpannedToken {
                    token: Token::RParen,
                    ..
                }) => return Ok(args),
                Some(t) => {
                    return Err(self.error_at(
                        t.pos,
                        format!("expected ',' or ')', found {:?}", t.token),
                    ))
                }
                None => return Err(self.error_at(self.end, "unclosed function call")),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eval(template: &str) -> f64 {
        parse(template)
            .unwrap()
            .eval(&|name: &str| match name {
                "a" => Ok(2.0),
                "b" => Ok(-3.0),
                _ => Err(EnvkitError::UnknownVariable(name.to_string())),
            })
            .unwrap()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("11 + a * 3 - b"), 20.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("7 // 2"), 3.0);
        assert_eq!(eval("-7 // 2"), -4.0);
        assert_eq!(eval("-7 % 3"), 2.0);
    }

    #[test]
    fn test_boolean_logic() {
        assert_eq!(eval("a > 1 and b < 0"), 1.0);
        assert_eq!(eval("a > 1 and not b < 0"), 0.0);
        assert_eq!(eval("a == 3 or True"), 1.0);
        assert_eq!(eval("not False"), 1.0);
        assert_eq!(eval("1 + 1 == a"), 1.0);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("max(a, b, 1)"), 2.0);
        assert_eq!(eval("min(a, b)"), -3.0);
        assert_eq!(eval("abs(b)"), 3.0);
        assert_eq!(eval("round(2.5)"), 2.0);
        assert_eq!(eval("floor(2.7) + ceil(0.2)"), 3.0);
    }

    #[test]
    fn test_rejects_unknown_function() {
        assert_eq!(
            parse("__import__(a)"),
            Err(EnvkitError::UnknownFunction("__import__".into()))
        );
    }

    #[test]
    fn test_rejects_bad_arity() {
        assert!(matches!(parse("abs(1, 2)"), Err(EnvkitError::Arity { got: 2, .. })));
        assert!(matches!(parse("max()"), Err(EnvkitError::Arity { got: 0, .. })));
    }

    #[test]
    fn test_rejects_trailing_tokens() {
        assert!(matches!(parse("1 2"), Err(EnvkitError::Parse { pos: 2, .. })));
        assert!(matches!(parse("(1 + 2"), Err(EnvkitError::Parse { pos: 6, .. })));
        assert!(matches!(parse(""), Err(EnvkitError::Parse { pos: 0, .. })));
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow), 1.0);

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        match parse(&deep) {
            Err(EnvkitError::Parse { message, .. }) => {
                assert_eq!(message, "expression nested too deeply")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(parse(&"-".repeat(10_000)), Err(EnvkitError::Parse { .. })));
        assert!(matches!(parse(&"not ".repeat(10_000)), Err(EnvkitError::Parse { .. })));
        assert!(matches!(parse(&"2 ** ".repeat(10_000)), Err(EnvkitError::Parse { .. })));
    }

    #[test]
    fn test_variables() {
        let node = parse("a + b * a + min(c, 1)").unwrap();
        assert_eq!(node.variables(), vec!["a", "b", "c"]);
    }
}
