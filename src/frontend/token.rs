//! Token definitions for the Mx* lexer.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    // Literals and identifiers
    Int(i32),
    Str(String),
    Ident(String),

    // Keywords
    KwInt,
    KwBool,
    KwString,
    KwVoid,
    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    KwBreak,
    KwContinue,
    KwReturn,
    KwNew,
    KwClass,
    KwThis,
    KwTrue,
    KwFalse,
    KwNull,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    Assign,
    AndAnd,
    OrOr,
    Not,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,

    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Int(v) => write!(f, "{}", v),
            Tok::Str(s) => write!(f, "{:?}", s),
            Tok::Ident(name) => write!(f, "{}", name),
            Tok::Eof => write!(f, "<eof>"),
            other => {
                let s = match other {
                    Tok::KwInt => "int",
                    Tok::KwBool => "bool",
                    Tok::KwString => "string",
                    Tok::KwVoid => "void",
                    Tok::KwIf => "if",
                    Tok::KwElse => "else",
                    Tok::KwFor => "for",
                    Tok::KwWhile => "while",
                    Tok::KwBreak => "break",
                    Tok::KwContinue => "continue",
                    Tok::KwReturn => "return",
                    Tok::KwNew => "new",
                    Tok::KwClass => "class",
                    Tok::KwThis => "this",
                    Tok::KwTrue => "true",
                    Tok::KwFalse => "false",
                    Tok::KwNull => "null",
                    Tok::LParen => "(",
                    Tok::RParen => ")",
                    Tok::LBrace => "{",
                    Tok::RBrace => "}",
                    Tok::LBracket => "[",
                    Tok::RBracket => "]",
                    Tok::Semi => ";",
                    Tok::Comma => ",",
                    Tok::Dot => ".",
                    Tok::Plus => "+",
                    Tok::Minus => "-",
                    Tok::Star => "*",
                    Tok::Slash => "/",
                    Tok::Percent => "%",
                    Tok::Lt => "<",
                    Tok::Le => "<=",
                    Tok::Gt => ">",
                    Tok::Ge => ">=",
                    Tok::EqEq => "==",
                    Tok::NotEq => "!=",
                    Tok::Assign => "=",
                    Tok::AndAnd => "&&",
                    Tok::OrOr => "||",
                    Tok::Not => "!",
                    Tok::Amp => "&",
                    Tok::Pipe => "|",
                    Tok::Caret => "^",
                    Tok::Tilde => "~",
                    Tok::Shl => "<<",
                    Tok::Shr => ">>",
                    _ => unreachable!(),
                };
                write!(f, "{}", s)
            }
        }
    }
}

/// A token with the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}
