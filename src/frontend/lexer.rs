//! Tokenizer for associative script text.

use crate::errors::{Result, RunnerError, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Double(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Def,
    Import,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    DotDot,
    Question,
    Colon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(i) => format!("integer {}", i),
            TokenKind::Double(d) => format!("number {}", d),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Def => "def",
            TokenKind::Import => "import",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('/') => {
                            while let Some(c) = self.bump() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            let start = self.location();
                            self.bump();
                            self.bump();
                            let mut closed = false;
                            while let Some(c) = self.bump() {
                                if c == '*' && self.eat('/') {
                                    closed = true;
                                    break;
                                }
                            }
                            if !closed {
                                return Err(RunnerError::syntax("unterminated block comment", start));
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        let location = self.location();

        let Some(c) = self.bump() else {
            return Ok(Token { kind: TokenKind::Eof, location });
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '.' => {
                if self.eat('.') {
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            '"' => self.string(location)?,
            c if c.is_ascii_digit() => self.number(c, location)?,
            c if c.is_alphabetic() || c == '_' => self.word(c),
            other => {
                return Err(RunnerError::syntax(
                    format!("unexpected character '{}'", other),
                    location,
                ))
            }
        };

        Ok(Token { kind, location })
    }

    fn string(&mut self, start: SourceLocation) -> Result<TokenKind> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(RunnerError::syntax(
                                format!("unknown escape '\\{}'", other),
                                self.location(),
                            ))
                        }
                        None => break,
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
                None => break,
            }
        }
        Err(RunnerError::syntax("unterminated string literal", start))
    }

    fn number(&mut self, first: char, location: SourceLocation) -> Result<TokenKind> {
        let mut text = String::from(first);
        let mut is_double = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_double {
                // `1..3` is a range, not a fraction
                let mut ahead = self.chars.clone();
                ahead.next();
                match ahead.peek() {
                    Some(d) if d.is_ascii_digit() => {
                        is_double = true;
                        text.push('.');
                        self.bump();
                    }
                    _ => break,
                }
            } else if c == 'e' || c == 'E' {
                let mut ahead = self.chars.clone();
                ahead.next();
                let exponent_follows = match ahead.peek() {
                    Some('+') | Some('-') => {
                        ahead.next();
                        matches!(ahead.peek(), Some(d) if d.is_ascii_digit())
                    }
                    Some(d) => d.is_ascii_digit(),
                    None => false,
                };
                if !exponent_follows {
                    break;
                }
                is_double = true;
                text.push('e');
                self.bump();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.bump();
                    }
                }
            } else {
                break;
            }
        }

        if is_double {
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(TokenKind::Double(value)),
                Ok(_) => Err(RunnerError::syntax(format!("number '{}' out of range", text), location)),
                Err(_) => Err(RunnerError::syntax(format!("invalid number '{}'", text), location)),
            }
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| RunnerError::syntax(format!("integer '{}' out of range", text), location))
        }
    }

    fn word(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "def" => TokenKind::Def,
            "import" => TokenKind::Import,
            _ => TokenKind::Ident(text),
        }
    }
}

/// Whether `name` lexes as a single identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "true" | "false" | "null" | "def" | "import")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_range_versus_fraction() {
        assert_eq!(
            kinds("1..3"),
            vec![TokenKind::Int(1), TokenKind::DotDot, TokenKind::Int(3), TokenKind::Eof]
        );
        assert_eq!(kinds("1.5"), vec![TokenKind::Double(1.5), TokenKind::Eof]);
        assert_eq!(kinds("2e3"), vec![TokenKind::Double(2000.0), TokenKind::Eof]);
    }

    #[test]
    fn test_overflowing_double_rejected() {
        let err = Lexer::new("[1e400, 2]").tokenize().unwrap_err();
        assert!(err.to_string().contains("out of range"), "{}", err);
        assert_eq!(kinds("1e300"), vec![TokenKind::Double(1e300), TokenKind::Eof]);
    }

    #[test]
    fn test_comments_and_locations() {
        let tokens = Lexer::new("// note\na /* x */ = 1;").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".into()));
        assert_eq!(tokens[0].location, SourceLocation::new(2, 1));
        assert_eq!(tokens[1].kind, TokenKind::Assign);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("var12"));
        assert!(!is_identifier("12var"));
        assert!(!is_identifier("null"));
        assert!(!is_identifier("a.b"));
    }
}
