//! Unit tests for the lexer and the preprocessor shim.

use nanocc_core::compiler::error::CompileError;
use nanocc_core::compiler::lexer::Lexer;
use nanocc_core::compiler::token::TokenKind;

fn lex_kinds(source: &str) -> Vec<TokenKind> {
    let mut lexer = Lexer::new("test.c", source);
    let mut kinds = Vec::new();
    loop {
        let token = lexer.next().expect("lexing should succeed");
        if token.kind == TokenKind::Eof {
            return kinds;
        }
        kinds.push(token.kind);
    }
}

fn lex_error(source: &str) -> CompileError {
    let mut lexer = Lexer::new("test.c", source);
    loop {
        match lexer.next() {
            Err(e) => return e,
            Ok(t) if t.kind == TokenKind::Eof => panic!("expected a lexical error"),
            Ok(_) => {}
        }
    }
}

#[test]
fn test_operators_and_separators() {
    assert_eq!(
        lex_kinds("a += b << 3;"),
        vec![
            TokenKind::Ident,
            TokenKind::PlusEq,
            TokenKind::Ident,
            TokenKind::Shl,
            TokenKind::Num(3),
            TokenKind::Semi,
        ]
    );
    assert_eq!(
        lex_kinds("<<= >>= -> ... ++ --"),
        vec![
            TokenKind::ShlEq,
            TokenKind::ShrEq,
            TokenKind::Arrow,
            TokenKind::Ellipsis,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
        ]
    );
}

#[test]
fn test_keywords_and_identifiers() {
    assert_eq!(
        lex_kinds("int charity while_ do"),
        vec![
            TokenKind::KwInt,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::KwDo,
        ]
    );
}

#[test]
fn test_numeric_literals() {
    assert_eq!(
        lex_kinds("0 42 0x10 0XFF"),
        vec![
            TokenKind::Num(0),
            TokenKind::Num(42),
            TokenKind::Num(16),
            TokenKind::Num(255),
        ]
    );
}

#[test]
fn test_char_literals() {
    assert_eq!(
        lex_kinds(r"'a' '\n' '\0' '\\'"),
        vec![
            TokenKind::CharLit(b'a'),
            TokenKind::CharLit(b'\n'),
            TokenKind::CharLit(0),
            TokenKind::CharLit(b'\\'),
        ]
    );
}

#[test]
fn test_string_literals() {
    assert_eq!(
        lex_kinds(r#""a\tb""#),
        vec![TokenKind::Str(vec![b'a', b'\t', b'b'])]
    );
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        lex_kinds("1 // line\n /* block\n comment */ 2"),
        vec![TokenKind::Num(1), TokenKind::Num(2)]
    );
}

#[test]
fn test_line_continuation() {
    // A backslash-newline splice glues the keyword back together.
    assert_eq!(
        lex_kinds("in\\\nt x;"),
        vec![TokenKind::KwInt, TokenKind::Ident, TokenKind::Semi]
    );
}

#[test]
fn test_define_substitutes_token() {
    assert_eq!(
        lex_kinds("#define N 42\nint x; N"),
        vec![
            TokenKind::KwInt,
            TokenKind::Ident,
            TokenKind::Semi,
            TokenKind::Num(42),
        ]
    );
}

#[test]
fn test_include_is_ignored() {
    assert_eq!(
        lex_kinds("#include \"stdio.h\"\nint x;"),
        vec![TokenKind::KwInt, TokenKind::Ident, TokenKind::Semi]
    );
}

#[test]
fn test_bodyless_macro_use_is_an_error() {
    let err = lex_error("#define FLAG\nint x; FLAG");
    match err {
        CompileError::Lexical(d) => assert_eq!(d.message, "uninitialized macro."),
        other => panic!("expected a lexical error, got {other:?}"),
    }
}

#[test]
fn test_unterminated_comment() {
    let err = lex_error("int x; /* oops");
    match err {
        CompileError::Lexical(d) => assert_eq!(d.message, "unfinished long comment."),
        other => panic!("expected a lexical error, got {other:?}"),
    }
}

#[test]
fn test_unterminated_string() {
    let err = lex_error("\"oops\nint x;");
    match err {
        CompileError::Lexical(d) => {
            assert_eq!(d.message, "unexpected end of line. unfinished string.")
        }
        other => panic!("expected a lexical error, got {other:?}"),
    }
}

#[test]
fn test_invalid_character() {
    let err = lex_error("int x = 1 @ 2;");
    match err {
        CompileError::Lexical(d) => {
            assert_eq!(d.message, "invalid character.");
            assert_eq!(d.line, 1);
        }
        other => panic!("expected a lexical error, got {other:?}"),
    }
}

#[test]
fn test_diagnostic_carries_the_source_line() {
    let err = lex_error("int a;\nint b = $;\n");
    match err {
        CompileError::Lexical(d) => {
            assert_eq!(d.line, 2);
            assert_eq!(d.source_line, "int b = $;");
            assert_eq!(d.column, 8);
        }
        other => panic!("expected a lexical error, got {other:?}"),
    }
}
