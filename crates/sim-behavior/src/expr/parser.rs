//! Recursive-descent parser.
//!
//! Precedence, lowest to highest:
//! `||` → `&&` → comparison → `+ -` → `* /` → unary `+ - !` → primary.

use super::ast::{BinaryOp, Node, UnaryOp};
use super::lexer::Token;
use crate::error::ExprError;

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

/// Parses a complete token stream into a single expression.
pub fn parse(tokens: &[Token]) -> Result<Node, ExprError> {
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.or()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(ExprError::UnexpectedToken {
            token: token.to_string(),
            position: parser.pos,
        }),
    }
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Le) => BinaryOp::Le,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Node::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        let position = self.pos;
        let Some(token) = self.next() else {
            return Err(ExprError::UnexpectedEnd);
        };

        match token {
            Token::Number(n) => Ok(Node::Number(*n)),
            Token::Str(s) => Ok(Node::Text(s.clone())),
            Token::Var(v) => Ok(Node::Var(v.clone())),
            Token::LParen => {
                let inner = self.or()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else if self.peek().is_none() {
                    Err(ExprError::UnmatchedParen { position })
                } else {
                    Err(self.unexpected())
                }
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments(position + 1)?;
                    return Ok(Node::Call {
                        name: name.to_ascii_lowercase(),
                        args,
                    });
                }
                if name.eq_ignore_ascii_case("true") {
                    Ok(Node::Number(1.0))
                } else if name.eq_ignore_ascii_case("false") {
                    Ok(Node::Number(0.0))
                } else {
                    Err(ExprError::UnexpectedToken {
                        token: name.clone(),
                        position,
                    })
                }
            }
            other => Err(ExprError::UnexpectedToken {
                token: other.to_string(),
                position,
            }),
        }
    }

    fn arguments(&mut self, open_position: usize) -> Result<Vec<Node>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            return Err(match self.peek() {
                None => ExprError::UnmatchedParen {
                    position: open_position,
                },
                Some(_) => self.unexpected(),
            });
        }
    }

    fn unexpected(&self) -> ExprError {
        match self.peek() {
            Some(token) => ExprError::UnexpectedToken {
                token: token.to_string(),
                position: self.pos,
            },
            None => ExprError::UnexpectedEnd,
        }
    }
}

fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
    Node::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;

    fn parse_str(s: &str) -> Result<Node, ExprError> {
        parse(&tokenize(s))
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let node = parse_str("1 + 2 * 3").unwrap();
        let Node::Binary { op, rhs, .. } = node else {
            panic!("expected binary node");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*rhs, Node::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let node = parse_str("a() || b() && c()").unwrap();
        let Node::Binary { op, rhs, .. } = node else {
            panic!("expected binary node");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*rhs, Node::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_function_names_lowercased() {
        let node = parse_str("TIME_Hours()").unwrap();
        assert_eq!(
            node,
            Node::Call {
                name: "time_hours".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_boolean_literals_case_insensitive() {
        assert_eq!(parse_str("TRUE").unwrap(), Node::Number(1.0));
        assert_eq!(parse_str("False").unwrap(), Node::Number(0.0));
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(parse_str(""), Err(ExprError::UnexpectedEnd));
        assert_eq!(parse_str("1 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(
            parse_str("(1 + 2"),
            Err(ExprError::UnmatchedParen { position: 0 })
        );
        assert!(matches!(
            parse_str("1 2"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("max(1, 2"),
            Err(ExprError::UnmatchedParen { .. })
        ));
        assert!(matches!(
            parse_str("hunger > 1"),
            Err(ExprError::UnexpectedToken { .. })
        ));
    }
}
