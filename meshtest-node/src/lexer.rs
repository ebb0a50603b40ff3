//! Tokenizer shared by the schema and request parsers.
//!
//! Commas are insignificant, as in GraphQL.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Name(String),
    Literal(Value),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    At,
    Bang,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() || c == ',' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '@' | '!' => {
                tokens.push(match c {
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ':' => Token::Colon,
                    '@' => Token::At,
                    _ => Token::Bang,
                });
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string".into()),
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(&next) = chars.get(i + 1) {
                                s.push(next);
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push(Token::Literal(Value::String(s)));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value: Value = serde_json::from_str(&text)
                    .map_err(|_| format!("invalid number: {text}"))?;
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Name(word),
                });
            }
            other => {
                return Err(format!("unexpected character {other:?}"));
            }
        }
    }
    Ok(tokens)
}

/// A cursor over a token stream.
pub(crate) struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consumes `expected` if it is next.
    pub(crate) fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, found {t:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    pub(crate) fn name(&mut self) -> Result<String, String> {
        match self.advance() {
            Some(Token::Name(n)) => Ok(n),
            Some(t) => Err(format!("expected a name, found {t:?}")),
            None => Err("expected a name, found end of input".into()),
        }
    }

    /// Parses a literal or a list of literals.
    pub(crate) fn value(&mut self) -> Result<Value, String> {
        match self.advance() {
            Some(Token::Literal(v)) => Ok(v),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    if self.at_end() {
                        return Err("unterminated list".into());
                    }
                    items.push(self.value()?);
                }
                Ok(Value::Array(items))
            }
            Some(t) => Err(format!("expected a value, found {t:?}")),
            None => Err("expected a value, found end of input".into()),
        }
    }
}
