//! Token Model
//!
//! Token kinds and the token record produced by the lexer. Literal payloads
//! (numbers, characters, strings) are decoded at lex time so the parser
//! never re-interprets lexeme text.

/// Kind of a lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    /// `#`, introduces a preprocessor directive.
    Hash,
    /// `...`
    Ellipsis,

    // Separators.
    Semi,
    Comma,
    Dot,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Operators.
    Assign,
    Plus,
    PlusEq,
    PlusPlus,
    Minus,
    MinusEq,
    MinusMinus,
    Arrow,
    Star,
    StarEq,
    Slash,
    SlashEq,
    Percent,
    PercentEq,
    Amp,
    AmpEq,
    AndAnd,
    Pipe,
    PipeEq,
    OrOr,
    Caret,
    CaretEq,
    Tilde,
    Shl,
    ShlEq,
    Shr,
    ShrEq,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Not,
    Question,

    // Keywords.
    KwBreak,
    KwCase,
    KwChar,
    KwConst,
    KwContinue,
    KwDefault,
    KwDo,
    KwDouble,
    KwElse,
    KwEnum,
    KwExtern,
    KwFloat,
    KwFor,
    KwGoto,
    KwIf,
    KwInt,
    KwLong,
    KwReturn,
    KwSigned,
    KwSizeof,
    KwStatic,
    KwStruct,
    KwSwitch,
    KwTypedef,
    KwTypeof,
    KwUnsigned,
    KwVoid,
    KwWhile,

    /// Identifier; the name is the token's `text`.
    Ident,
    /// Integer literal (decimal or hexadecimal), decoded.
    Num(i64),
    /// Character literal, decoded including escapes.
    CharLit(u8),
    /// String literal, decoded including escapes, without the quotes.
    Str(Vec<u8>),
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original lexeme (the decoded name for identifiers and keywords).
    pub text: String,
    /// 1-based source line the token starts on.
    pub line: u32,
    /// Byte offset of the token start in the source text, for diagnostics.
    pub offset: usize,
}

/// Map an identifier to its keyword kind, or `Ident` if it is none.
pub fn keyword_kind(name: &str) -> TokenKind {
    match name {
        "break" => TokenKind::KwBreak,
        "case" => TokenKind::KwCase,
        "char" => TokenKind::KwChar,
        "const" => TokenKind::KwConst,
        "continue" => TokenKind::KwContinue,
        "default" => TokenKind::KwDefault,
        "do" => TokenKind::KwDo,
        "double" => TokenKind::KwDouble,
        "else" => TokenKind::KwElse,
        "enum" => TokenKind::KwEnum,
        "extern" => TokenKind::KwExtern,
        "float" => TokenKind::KwFloat,
        "for" => TokenKind::KwFor,
        "goto" => TokenKind::KwGoto,
        "if" => TokenKind::KwIf,
        "int" => TokenKind::KwInt,
        "long" => TokenKind::KwLong,
        "return" => TokenKind::KwReturn,
        "signed" => TokenKind::KwSigned,
        "sizeof" => TokenKind::KwSizeof,
        "static" => TokenKind::KwStatic,
        "struct" => TokenKind::KwStruct,
        "switch" => TokenKind::KwSwitch,
        "typedef" => TokenKind::KwTypedef,
        "typeof" => TokenKind::KwTypeof,
        "unsigned" => TokenKind::KwUnsigned,
        "void" => TokenKind::KwVoid,
        "while" => TokenKind::KwWhile,
        _ => TokenKind::Ident,
    }
}

impl TokenKind {
    /// Printable description used in "symbol '…' expected" diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Eof => "<EOF>",
            TokenKind::Hash => "#",
            TokenKind::Ellipsis => "...",
            TokenKind::Semi => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::PlusEq => "+=",
            TokenKind::PlusPlus => "++",
            TokenKind::Minus => "-",
            TokenKind::MinusEq => "-=",
            TokenKind::MinusMinus => "--",
            TokenKind::Arrow => "->",
            TokenKind::Star => "*",
            TokenKind::StarEq => "*=",
            TokenKind::Slash => "/",
            TokenKind::SlashEq => "/=",
            TokenKind::Percent => "%",
            TokenKind::PercentEq => "%=",
            TokenKind::Amp => "&",
            TokenKind::AmpEq => "&=",
            TokenKind::AndAnd => "&&",
            TokenKind::Pipe => "|",
            TokenKind::PipeEq => "|=",
            TokenKind::OrOr => "||",
            TokenKind::Caret => "^",
            TokenKind::CaretEq => "^=",
            TokenKind::Tilde => "~",
            TokenKind::Shl => "<<",
            TokenKind::ShlEq => "<<=",
            TokenKind::Shr => ">>",
            TokenKind::ShrEq => ">>=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Not => "!",
            TokenKind::Question => "?",
            TokenKind::KwBreak => "break",
            TokenKind::KwCase => "case",
            TokenKind::KwChar => "char",
            TokenKind::KwConst => "const",
            TokenKind::KwContinue => "continue",
            TokenKind::KwDefault => "default",
            TokenKind::KwDo => "do",
            TokenKind::KwDouble => "double",
            TokenKind::KwElse => "else",
            TokenKind::KwEnum => "enum",
            TokenKind::KwExtern => "extern",
            TokenKind::KwFloat => "float",
            TokenKind::KwFor => "for",
            TokenKind::KwGoto => "goto",
            TokenKind::KwIf => "if",
            TokenKind::KwInt => "int",
            TokenKind::KwLong => "long",
            TokenKind::KwReturn => "return",
            TokenKind::KwSigned => "signed",
            TokenKind::KwSizeof => "sizeof",
            TokenKind::KwStatic => "static",
            TokenKind::KwStruct => "struct",
            TokenKind::KwSwitch => "switch",
            TokenKind::KwTypedef => "typedef",
            TokenKind::KwTypeof => "typeof",
            TokenKind::KwUnsigned => "unsigned",
            TokenKind::KwVoid => "void",
            TokenKind::KwWhile => "while",
            TokenKind::Ident => "<identifier>",
            TokenKind::Num(_) => "<number>",
            TokenKind::CharLit(_) => "<char>",
            TokenKind::Str(_) => "<string>",
        }
    }

    /// Whether this kind is a compound assignment operator (`+=`, `<<=`, …).
    pub fn is_compound_assign(&self) -> bool {
        matches!(
            self,
            TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
                | TokenKind::AmpEq
                | TokenKind::PipeEq
                | TokenKind::CaretEq
                | TokenKind::ShlEq
                | TokenKind::ShrEq
        )
    }

    /// Strip the assignment half of a compound operator: `+=` → `+`.
    /// `++` and `--` reduce to `+` and `-` for the desugaring passes.
    pub fn base_op(&self) -> TokenKind {
        match self {
            TokenKind::PlusEq | TokenKind::PlusPlus => TokenKind::Plus,
            TokenKind::MinusEq | TokenKind::MinusMinus => TokenKind::Minus,
            TokenKind::StarEq => TokenKind::Star,
            TokenKind::SlashEq => TokenKind::Slash,
            TokenKind::PercentEq => TokenKind::Percent,
            TokenKind::AmpEq => TokenKind::Amp,
            TokenKind::PipeEq => TokenKind::Pipe,
            TokenKind::CaretEq => TokenKind::Caret,
            TokenKind::ShlEq => TokenKind::Shl,
            TokenKind::ShrEq => TokenKind::Shr,
            other => other.clone(),
        }
    }

    /// Whether this kind begins a type name in a declaration.
    pub fn is_typename(&self) -> bool {
        matches!(
            self,
            TokenKind::KwVoid | TokenKind::KwChar | TokenKind::KwInt
        )
    }
}
