//! Tokenizer for the expression language.
//!
//! Unknown characters end tokenization: everything before them is kept and
//! the remainder is dropped, so a malformed expression degrades to a partial
//! one instead of failing to compile.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    /// `$name`, stored without the sigil.
    Var(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Var(v) => write!(f, "${}", v),
            Token::Ident(i) => write!(f, "{}", i),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Bang => write!(f, "!"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Gt => write!(f, ">"),
            Token::Lt => write!(f, "<"),
            Token::Ge => write!(f, ">="),
            Token::Le => write!(f, "<="),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Splits source text into tokens, truncating at the first unknown character.
pub fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = chars.get(i + 1).copied();
        let token = match (c, two) {
            ('&', Some('&')) => Some((Token::AndAnd, 2)),
            ('|', Some('|')) => Some((Token::OrOr, 2)),
            ('=', Some('=')) => Some((Token::EqEq, 2)),
            ('!', Some('=')) => Some((Token::NotEq, 2)),
            ('>', Some('=')) => Some((Token::Ge, 2)),
            ('<', Some('=')) => Some((Token::Le, 2)),
            ('>', _) => Some((Token::Gt, 1)),
            ('<', _) => Some((Token::Lt, 1)),
            ('!', _) => Some((Token::Bang, 1)),
            ('(', _) => Some((Token::LParen, 1)),
            (')', _) => Some((Token::RParen, 1)),
            (',', _) => Some((Token::Comma, 1)),
            ('+', _) => Some((Token::Plus, 1)),
            ('-', _) => Some((Token::Minus, 1)),
            ('*', _) => Some((Token::Star, 1)),
            ('/', _) => Some((Token::Slash, 1)),
            _ => None,
        };
        if let Some((token, width)) = token {
            tokens.push(token);
            i += width;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && two.is_some_and(|d| d.is_ascii_digit())) {
            let (number, end) = scan_number(&chars, i);
            match number {
                Some(n) => tokens.push(Token::Number(n)),
                None => break,
            }
            i = end;
            continue;
        }

        if c == '"' || c == '\'' {
            let Some(end) = chars[i + 1..].iter().position(|&ch| ch == c) else {
                tracing::debug!(source, "unterminated string literal; truncating expression");
                break;
            };
            let text: String = chars[i + 1..i + 1 + end].iter().collect();
            tokens.push(Token::Str(text));
            i += end + 2;
            continue;
        }

        if c == '$' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_ident_char(chars[end]) {
                end += 1;
            }
            if end == start {
                tracing::debug!(source, "bare '$'; truncating expression");
                break;
            }
            tokens.push(Token::Var(chars[start..end].iter().collect()));
            i = end;
            continue;
        }

        if is_ident_start(c) {
            let mut end = i + 1;
            while end < chars.len() && is_ident_char(chars[end]) {
                end += 1;
            }
            tokens.push(Token::Ident(chars[i..end].iter().collect()));
            i = end;
            continue;
        }

        tracing::debug!(source, position = i, character = %c, "unknown character; truncating expression");
        break;
    }

    tokens
}

fn scan_number(chars: &[char], start: usize) -> (Option<f64>, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }

    // Optional exponent, only consumed when followed by digits
    if end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
        let mut exp_end = end + 1;
        if exp_end < chars.len() && (chars[exp_end] == '+' || chars[exp_end] == '-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < chars.len() && chars[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    let text: String = chars[start..end].iter().collect();
    (text.parse::<f64>().ok(), end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_arithmetic() {
        let tokens = tokenize("1 + 2.5*3");
        assert_eq!(
            tokens,
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.5),
                Token::Star,
                Token::Number(3.0)
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("a >= b && !c || d != e <= f == g");
        assert!(tokens.contains(&Token::Ge));
        assert!(tokens.contains(&Token::AndAnd));
        assert!(tokens.contains(&Token::Bang));
        assert!(tokens.contains(&Token::OrOr));
        assert!(tokens.contains(&Token::NotEq));
        assert!(tokens.contains(&Token::Le));
        assert!(tokens.contains(&Token::EqEq));
    }

    #[test]
    fn test_tokenize_variables_and_strings() {
        let tokens = tokenize(r#"attr($self, "hunger") > 0.5 && has('wood')"#);
        assert_eq!(tokens[0], Token::Ident("attr".into()));
        assert_eq!(tokens[2], Token::Var("self".into()));
        assert_eq!(tokens[4], Token::Str("hunger".into()));
        assert_eq!(tokens[11], Token::Str("wood".into()));
    }

    #[test]
    fn test_tokenize_exponent() {
        assert_eq!(tokenize("1e3"), vec![Token::Number(1000.0)]);
        assert_eq!(tokenize("2.5E-1"), vec![Token::Number(0.25)]);
    }

    #[test]
    fn test_unknown_character_truncates() {
        let tokens = tokenize("1 + 2 # comment 3");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::Plus, Token::Number(2.0)]);

        let tokens = tokenize("x & y");
        assert_eq!(tokens, vec![Token::Ident("x".into())]);
    }

    #[test]
    fn test_unterminated_string_truncates() {
        let tokens = tokenize(r#"has("wood"#);
        assert_eq!(tokens, vec![Token::Ident("has".into()), Token::LParen]);
    }
}
