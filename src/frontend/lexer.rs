//! Hand-written lexer for Mx* source text.
//!
//! Tracks line numbers, skips `//` and `/* */` comments, and decodes the
//! string escapes `\n`, `\"` and `\\`.

use crate::error::{MxcError, Result};

use super::token::{Tok, Token};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Tokenize the whole input, appending a trailing `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let line = self.line;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    line,
                });
                return Ok(tokens);
            };
            let tok = match c {
                b'0'..=b'9' => self.lex_int()?,
                b'"' => self.lex_string()?,
                c if c == b'_' || c.is_ascii_alphabetic() => self.lex_word(),
                _ => self.lex_operator()?,
            };
            tokens.push(Token { tok, line });
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek2()) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(MxcError::Lex {
                                    line,
                                    msg: "unterminated block comment".into(),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_int(&mut self) -> Result<Tok> {
        let line = self.line;
        let mut value: i64 = 0;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            value = value * 10 + i64::from(c - b'0');
            if value > u32::MAX as i64 {
                return Err(MxcError::Lex {
                    line,
                    msg: "integer literal out of range".into(),
                });
            }
            self.bump();
        }
        // 2147483648 survives here so that `-2147483648` works after the
        // parser applies unary minus; the wrap is two's-complement.
        Ok(Tok::Int(value as u32 as i32))
    }

    fn lex_string(&mut self) -> Result<Tok> {
        let line = self.line;
        self.bump(); // opening quote
        let mut body = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(Tok::Str(body)),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => body.push('\n'),
                    Some(b'"') => body.push('"'),
                    Some(b'\\') => body.push('\\'),
                    other => {
                        return Err(MxcError::Lex {
                            line,
                            msg: format!(
                                "unknown escape sequence '\\{}'",
                                other.map(|c| c as char).unwrap_or(' ')
                            ),
                        });
                    }
                },
                Some(b'\n') | None => {
                    return Err(MxcError::Lex {
                        line,
                        msg: "unterminated string literal".into(),
                    });
                }
                Some(c) => body.push(c as char),
            }
        }
    }

    fn lex_word(&mut self) -> Tok {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        match word {
            "int" => Tok::KwInt,
            "bool" => Tok::KwBool,
            "string" => Tok::KwString,
            "void" => Tok::KwVoid,
            "if" => Tok::KwIf,
            "else" => Tok::KwElse,
            "for" => Tok::KwFor,
            "while" => Tok::KwWhile,
            "break" => Tok::KwBreak,
            "continue" => Tok::KwContinue,
            "return" => Tok::KwReturn,
            "new" => Tok::KwNew,
            "class" => Tok::KwClass,
            "this" => Tok::KwThis,
            "true" => Tok::KwTrue,
            "false" => Tok::KwFalse,
            "null" => Tok::KwNull,
            _ => Tok::Ident(word.to_string()),
        }
    }

    fn lex_operator(&mut self) -> Result<Tok> {
        let line = self.line;
        let c = self.bump().unwrap_or(0);
        let two = |l: &mut Self, next: u8, yes: Tok, no: Tok| {
            if l.peek() == Some(next) {
                l.bump();
                yes
            } else {
                no
            }
        };
        let tok = match c {
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b'{' => Tok::LBrace,
            b'}' => Tok::RBrace,
            b'[' => Tok::LBracket,
            b']' => Tok::RBracket,
            b';' => Tok::Semi,
            b',' => Tok::Comma,
            b'.' => Tok::Dot,
            b'+' => two(self, b'+', Tok::PlusPlus, Tok::Plus),
            b'-' => two(self, b'-', Tok::MinusMinus, Tok::Minus),
            b'*' => Tok::Star,
            b'/' => Tok::Slash,
            b'%' => Tok::Percent,
            b'^' => Tok::Caret,
            b'~' => Tok::Tilde,
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.bump();
                    Tok::Shl
                } else {
                    two(self, b'=', Tok::Le, Tok::Lt)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    Tok::Shr
                } else {
                    two(self, b'=', Tok::Ge, Tok::Gt)
                }
            }
            b'=' => two(self, b'=', Tok::EqEq, Tok::Assign),
            b'!' => two(self, b'=', Tok::NotEq, Tok::Not),
            b'&' => two(self, b'&', Tok::AndAnd, Tok::Amp),
            b'|' => two(self, b'|', Tok::OrOr, Tok::Pipe),
            other => {
                return Err(MxcError::Lex {
                    line,
                    msg: format!("unexpected character '{}'", other as char),
                });
            }
        };
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            toks("int x = 42;"),
            vec![
                Tok::KwInt,
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Int(42),
                Tok::Semi,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            toks("a <= b << 2 && !c != d++"),
            vec![
                Tok::Ident("a".into()),
                Tok::Le,
                Tok::Ident("b".into()),
                Tok::Shl,
                Tok::Int(2),
                Tok::AndAnd,
                Tok::Not,
                Tok::Ident("c".into()),
                Tok::NotEq,
                Tok::Ident("d".into()),
                Tok::PlusPlus,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            toks(r#""a\nb\"c\\d""#),
            vec![Tok::Str("a\nb\"c\\d".into()), Tok::Eof]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = Lexer::new("// line one\nx /* span\nlines */ y").tokenize().unwrap();
        assert_eq!(tokens[0].tok, Tok::Ident("x".into()));
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[1].tok, Tok::Ident("y".into()));
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }

    #[test]
    fn test_int_boundary() {
        // 2147483648 lexes and wraps; the parser's unary minus recovers i32::MIN.
        assert_eq!(toks("2147483648")[0], Tok::Int(i32::MIN));
        assert!(Lexer::new("4294967296").tokenize().is_err());
    }
}
