//! Lexer
//!
//! Hand-written byte-level scanner for the C subset. Whitespace and
//! `//` / `/* */` comments are skipped by a loop over a small character
//! classifier; backslash-newline pairs are spliced out wherever they occur.
//!
//! The lexer also hosts the preprocessor shim: `#include "…"` directives are
//! consumed and ignored, `#define NAME [token]` records a macro in an
//! insertion-ordered table, and identifier tokens naming a macro are
//! substituted with the recorded token before the parser sees them.

use crate::compiler::error::{CompileError, Diagnostic};
use crate::compiler::token::{keyword_kind, Token, TokenKind};

/// Insertion-ordered macro table keyed by name.
///
/// A `None` replacement records a `#define NAME` with no body; using such a
/// macro is a diagnostic.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    entries: Vec<(String, Option<Token>)>,
}

impl MacroTable {
    /// Define or redefine a macro.
    pub fn define(&mut self, name: String, replacement: Option<Token>) {
        for entry in self.entries.iter_mut() {
            if entry.0 == name {
                entry.1 = replacement;
                return;
            }
        }
        self.entries.push((name, replacement));
    }

    /// Look up a macro by name.
    pub fn get(&self, name: &str) -> Option<&Option<Token>> {
        self.entries.iter().rev().find(|e| e.0 == name).map(|e| &e.1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Streaming tokenizer with one token of lookahead.
pub struct Lexer<'a> {
    file: String,
    source: &'a str,
    src: &'a [u8],
    pos: usize,
    line: u32,
    macros: MacroTable,
    cache: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(file: &str, source: &'a str) -> Self {
        Lexer {
            file: file.to_string(),
            source,
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            macros: MacroTable::default(),
            cache: None,
        }
    }

    /// Name of the chunk being lexed.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The full source text, for diagnostic rendering.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Surrender the macro table once lexing is done; it is passed through
    /// to the `Program`.
    pub fn into_macros(self) -> MacroTable {
        self.macros
    }

    /// Build a lexical diagnostic anchored at a byte offset.
    pub fn error_at(&self, offset: usize, message: &str) -> CompileError {
        CompileError::Lexical(Diagnostic::at_offset(
            &self.file,
            self.source,
            offset,
            message.to_string(),
        ))
    }

    // --- character access -------------------------------------------------

    /// Length of a backslash-newline splice starting at `p`, 0 if none.
    fn splice_len(&self, p: usize) -> usize {
        if self.src.get(p) != Some(&b'\\') {
            return 0;
        }
        match (self.src.get(p + 1), self.src.get(p + 2)) {
            (Some(b'\n'), _) => 2,
            (Some(b'\r'), Some(b'\n')) => 3,
            _ => 0,
        }
    }

    /// First non-splice position at or after `p`.
    fn effective(&self, mut p: usize) -> usize {
        loop {
            let len = self.splice_len(p);
            if len == 0 {
                return p;
            }
            p += len;
        }
    }

    /// Peek the `n`-th effective character ahead without consuming.
    fn peek_at(&self, n: usize) -> Option<u8> {
        let mut p = self.pos;
        for _ in 0..n {
            p = self.effective(p);
            if p >= self.src.len() {
                return None;
            }
            p += 1;
        }
        p = self.effective(p);
        self.src.get(p).copied()
    }

    fn peek_char(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// Consume one effective character, tracking line numbers.
    fn advance(&mut self) -> Option<u8> {
        loop {
            let len = self.splice_len(self.pos);
            if len == 0 {
                break;
            }
            self.pos += len;
            self.line += 1;
        }
        let b = self.src.get(self.pos).copied();
        if let Some(b) = b {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
            }
        }
        b
    }

    // --- trivia -----------------------------------------------------------

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek_char() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c) => {
                    self.advance();
                }
                Some(b'/') => match self.peek_at(1) {
                    Some(b'/') => {
                        self.advance();
                        self.advance();
                        while let Some(b) = self.advance() {
                            if b == b'\n' {
                                break;
                            }
                        }
                    }
                    Some(b'*') => {
                        let start = self.effective(self.pos);
                        self.advance();
                        self.advance();
                        loop {
                            match self.advance() {
                                None => {
                                    return Err(self.error_at(start, "unfinished long comment."))
                                }
                                Some(b'*') if self.peek_char() == Some(b'/') => {
                                    self.advance();
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    // --- literals ---------------------------------------------------------

    /// Value of a single-character escape (`\n`, `\t`, …). Unknown escapes
    /// stand for the character itself.
    fn escape_value(b: u8) -> u8 {
        match b {
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            other => other,
        }
    }

    fn number_literal(&mut self, start: usize) -> Result<Token, CompileError> {
        let line = self.line;
        let first = self.advance().unwrap_or(b'0');
        let mut text = String::new();
        text.push(first as char);

        // Hexadecimal.
        if first == b'0' && matches!(self.peek_char(), Some(b'x' | b'X')) {
            text.push(self.advance().unwrap_or(b'x') as char);
            let mut digits = String::new();
            while let Some(b) = self.peek_char() {
                if b.is_ascii_hexdigit() {
                    digits.push(self.advance().unwrap_or(b) as char);
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error_at(start, "invalid numeric literal."))?;
            text.push_str(&digits);
            return Ok(Token {
                kind: TokenKind::Num(value),
                text,
                line,
                offset: start,
            });
        }

        while let Some(b) = self.peek_char() {
            if b.is_ascii_digit() {
                text.push(self.advance().unwrap_or(b) as char);
            } else {
                break;
            }
        }
        let value: i64 = text
            .parse()
            .map_err(|_| self.error_at(start, "invalid numeric literal."))?;
        Ok(Token {
            kind: TokenKind::Num(value),
            text,
            line,
            offset: start,
        })
    }

    fn char_literal(&mut self, start: usize) -> Result<Token, CompileError> {
        let line = self.line;
        self.advance(); // opening quote
        let value = match self.advance() {
            None => return Err(self.error_at(start, "unexpected end of file.")),
            Some(b'\'') => return Err(self.error_at(start, "invalid character constant.")),
            Some(b'\\') => {
                let esc = self
                    .advance()
                    .ok_or_else(|| self.error_at(start, "unexpected end of file."))?;
                Self::escape_value(esc)
            }
            Some(c) => c,
        };
        if self.advance() != Some(b'\'') {
            return Err(self.error_at(start, "invalid character constant."));
        }
        Ok(Token {
            kind: TokenKind::CharLit(value),
            text: (value as char).to_string(),
            line,
            offset: start,
        })
    }

    fn string_literal(&mut self, start: usize) -> Result<Token, CompileError> {
        let line = self.line;
        self.advance(); // opening quote
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match self.advance() {
                None => {
                    return Err(self.error_at(start, "unexpected end of file. unfinished string."))
                }
                Some(b'\n') => {
                    return Err(self.error_at(start, "unexpected end of line. unfinished string."))
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    let esc = self.advance().ok_or_else(|| {
                        self.error_at(start, "unexpected end of file. unfinished string.")
                    })?;
                    bytes.push(Self::escape_value(esc));
                }
                Some(b'\r') => {}
                Some(c) => bytes.push(c),
            }
        }
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Token {
            kind: TokenKind::Str(bytes),
            text,
            line,
            offset: start,
        })
    }

    fn identifier(&mut self, start: usize) -> Token {
        let line = self.line;
        let mut name = String::new();
        while let Some(b) = self.peek_char() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
                name.push(b as char);
            } else {
                break;
            }
        }
        Token {
            kind: keyword_kind(&name),
            text: name,
            line,
            offset: start,
        }
    }

    // --- tokenization -----------------------------------------------------

    /// Scan one raw token, without preprocessing.
    fn scan_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia()?;
        let start = self.effective(self.pos);
        let line = self.line;

        let b = match self.peek_char() {
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: "<EOF>".to_string(),
                    line,
                    offset: self.src.len(),
                })
            }
            Some(b) => b,
        };

        let (kind, len) = match b {
            b';' => (TokenKind::Semi, 1),
            b',' => (TokenKind::Comma, 1),
            b':' => (TokenKind::Colon, 1),
            b'(' => (TokenKind::LParen, 1),
            b')' => (TokenKind::RParen, 1),
            b'[' => (TokenKind::LBracket, 1),
            b']' => (TokenKind::RBracket, 1),
            b'{' => (TokenKind::LBrace, 1),
            b'}' => (TokenKind::RBrace, 1),
            b'#' => (TokenKind::Hash, 1),
            b'~' => (TokenKind::Tilde, 1),
            b'?' => (TokenKind::Question, 1),
            b'+' => match self.peek_at(1) {
                Some(b'+') => (TokenKind::PlusPlus, 2),
                Some(b'=') => (TokenKind::PlusEq, 2),
                _ => (TokenKind::Plus, 1),
            },
            b'-' => match self.peek_at(1) {
                Some(b'-') => (TokenKind::MinusMinus, 2),
                Some(b'=') => (TokenKind::MinusEq, 2),
                Some(b'>') => (TokenKind::Arrow, 2),
                _ => (TokenKind::Minus, 1),
            },
            b'*' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::StarEq, 2),
                _ => (TokenKind::Star, 1),
            },
            b'/' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::SlashEq, 2),
                _ => (TokenKind::Slash, 1),
            },
            b'%' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::PercentEq, 2),
                _ => (TokenKind::Percent, 1),
            },
            b'&' => match self.peek_at(1) {
                Some(b'&') => (TokenKind::AndAnd, 2),
                Some(b'=') => (TokenKind::AmpEq, 2),
                _ => (TokenKind::Amp, 1),
            },
            b'|' => match self.peek_at(1) {
                Some(b'|') => (TokenKind::OrOr, 2),
                Some(b'=') => (TokenKind::PipeEq, 2),
                _ => (TokenKind::Pipe, 1),
            },
            b'^' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::CaretEq, 2),
                _ => (TokenKind::Caret, 1),
            },
            b'!' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::Ne, 2),
                _ => (TokenKind::Not, 1),
            },
            b'=' => match self.peek_at(1) {
                Some(b'=') => (TokenKind::EqEq, 2),
                _ => (TokenKind::Assign, 1),
            },
            b'<' => match self.peek_at(1) {
                Some(b'<') => match self.peek_at(2) {
                    Some(b'=') => (TokenKind::ShlEq, 3),
                    _ => (TokenKind::Shl, 2),
                },
                Some(b'=') => (TokenKind::Le, 2),
                _ => (TokenKind::Lt, 1),
            },
            b'>' => match self.peek_at(1) {
                Some(b'>') => match self.peek_at(2) {
                    Some(b'=') => (TokenKind::ShrEq, 3),
                    _ => (TokenKind::Shr, 2),
                },
                Some(b'=') => (TokenKind::Ge, 2),
                _ => (TokenKind::Gt, 1),
            },
            b'.' => match self.peek_at(1) {
                Some(b'.') if self.peek_at(2) == Some(b'.') => (TokenKind::Ellipsis, 3),
                _ => (TokenKind::Dot, 1),
            },
            b'\'' => return self.char_literal(start),
            b'"' => return self.string_literal(start),
            b'0'..=b'9' => return self.number_literal(start),
            b'_' => return Ok(self.identifier(start)),
            c if c.is_ascii_alphabetic() => return Ok(self.identifier(start)),
            _ => return Err(self.error_at(start, "invalid character.")),
        };

        for _ in 0..len {
            self.advance();
        }
        Ok(Token {
            kind: kind.clone(),
            text: kind.describe().to_string(),
            line,
            offset: start,
        })
    }

    /// Scan the next token, handling preprocessor directives and macro
    /// substitution.
    fn lex_token(&mut self) -> Result<Token, CompileError> {
        let mut token = self.scan_token()?;

        while token.kind == TokenKind::Hash {
            let directive = self.scan_token()?;
            if directive.kind != TokenKind::Ident {
                return Err(self.error_at(directive.offset, "unknown macro."));
            }
            match directive.text.as_str() {
                "include" => {
                    let file = self.scan_token()?;
                    if !matches!(file.kind, TokenKind::Str(_)) {
                        return Err(self.error_at(file.offset, "unknown include file."));
                    }
                    // Headers are not resolved; external declarations must
                    // be spelled out in the translation unit.
                    token = self.scan_token()?;
                }
                "define" => {
                    let name = self.scan_token()?;
                    if name.kind != TokenKind::Ident {
                        return Err(self.error_at(name.offset, "unknown macro."));
                    }
                    let body = self.scan_token()?;
                    match body.kind {
                        TokenKind::Ident
                        | TokenKind::Num(_)
                        | TokenKind::CharLit(_)
                        | TokenKind::Str(_) => {
                            self.macros.define(name.text, Some(body));
                            token = self.scan_token()?;
                        }
                        _ => {
                            self.macros.define(name.text, None);
                            token = body;
                        }
                    }
                }
                _ => return Err(self.error_at(directive.offset, "unknown macro.")),
            }
        }

        if token.kind == TokenKind::Ident {
            if let Some(replacement) = self.macros.get(&token.text) {
                match replacement {
                    None => return Err(self.error_at(token.offset, "uninitialized macro.")),
                    Some(t) => {
                        token.kind = t.kind.clone();
                        token.text = t.text.clone();
                    }
                }
            }
        }
        Ok(token)
    }

    // --- public token stream ---------------------------------------------

    /// Peek the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token, CompileError> {
        if self.cache.is_none() {
            self.cache = Some(self.lex_token()?);
        }
        Ok(self.cache.as_ref().expect("token cache just filled"))
    }

    /// Consume and return the next token.
    pub fn next(&mut self) -> Result<Token, CompileError> {
        match self.cache.take() {
            Some(t) => Ok(t),
            None => self.lex_token(),
        }
    }

    /// Consume the next token if it has the given kind.
    pub fn consume(&mut self, kind: &TokenKind) -> Result<Option<Token>, CompileError> {
        if std::mem::discriminant(&self.peek()?.kind) == std::mem::discriminant(kind) {
            Ok(Some(self.next()?))
        } else {
            Ok(None)
        }
    }
}
