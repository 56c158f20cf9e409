// lexer.rs — Token stream shared by the shader-side and host-side grammars
//
// HLSL and C++ declarations are close enough lexically that one token set
// serves both. Comments, whitespace and preprocessor lines (including `#line`
// markers left in expanded text) are skipped. Uses the `logos` crate.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::source::Span;

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"\\\r?\n")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("struct")]
    Struct,
    #[token("class")]
    Class,
    #[token("cbuffer")]
    Cbuffer,
    #[token("tbuffer")]
    Tbuffer,
    #[token("register")]
    Register,
    #[token("packoffset")]
    Packoffset,
    #[token("static")]
    Static,
    #[token("alignas")]
    Alignas,

    // ── Symbols ──
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("::")]
    PathSep,
    #[token(",")]
    Comma,
    #[token("*")]
    Star,
    #[token("&")]
    Amp,
    #[token("=")]
    Equals,
    #[token(".")]
    Dot,
    #[token("~")]
    Tilde,
    /// Any other operator character; only ever appears inside initializers
    /// and function bodies, which the grammars skip.
    #[regex(r"[-+/%!^|?@$]")]
    Op,

    // ── Literals ──
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fFhHlL]?", |lex| parse_float(lex.slice()))]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fFhHlL]?", |lex| parse_float(lex.slice()))]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFhHlL]?", |lex| parse_float(lex.slice()))]
    Float(f64),

    /// Integer literal, decimal or hex, with `u`/`l` suffixes stripped.
    #[regex(r"[0-9]+[uUlL]*", |lex| parse_int(lex.slice()))]
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*", |lex| parse_int(lex.slice()))]
    Int(u64),

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLit,
    #[regex(r"'([^'\\\n]|\\.)*'")]
    CharLit,

    // ── Identifier ──
    //
    // Keywords above win over this regex for equal-length matches.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Identifier text, if this token is an identifier.
    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Ident(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Struct => write!(f, "struct"),
            Token::Class => write!(f, "class"),
            Token::Cbuffer => write!(f, "cbuffer"),
            Token::Tbuffer => write!(f, "tbuffer"),
            Token::Register => write!(f, "register"),
            Token::Packoffset => write!(f, "packoffset"),
            Token::Static => write!(f, "static"),
            Token::Alignas => write!(f, "alignas"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::PathSep => write!(f, "::"),
            Token::Comma => write!(f, ","),
            Token::Star => write!(f, "*"),
            Token::Amp => write!(f, "&"),
            Token::Equals => write!(f, "="),
            Token::Dot => write!(f, "."),
            Token::Tilde => write!(f, "~"),
            Token::Op => write!(f, "<op>"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit => write!(f, "<string>"),
            Token::CharLit => write!(f, "<char>"),
            Token::Ident(s) => write!(f, "{s}"),
        }
    }
}

// ── Callbacks ──

fn parse_int(slice: &str) -> Option<u64> {
    let digits = slice.trim_end_matches(['u', 'U', 'l', 'L']);
    match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

fn parse_float(slice: &str) -> Option<f64> {
    slice
        .trim_end_matches(['f', 'F', 'h', 'H', 'l', 'L'])
        .parse()
        .ok()
}

// ── Public API ──

/// Lex expanded source text into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span::new(range.start, range.end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
