//! Tokens produced by the lexer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// `CREATE` keyword
    Create,
    /// `UPDATE` keyword (reserved)
    Update,
    /// `DELETE` keyword (reserved)
    Delete,
    /// `{`
    OpenCurlyBrace,
    /// `}`
    CloseCurlyBrace,
    /// `[`
    OpenSquareBracket,
    /// `]`
    CloseSquareBracket,
    /// `,`
    ParameterSeparator,
    /// `=`
    OperatorAssign,
    /// `;` or end of line, depending on the separator mode
    EndOfStatement,
    /// End of input
    EndOfText,
    /// Identifier
    Name,
    /// Double-quoted string, escapes resolved
    String,
    /// Signed integer literal
    Number,
}

impl TokenKind {
    /// Look up a keyword, ignoring ASCII case
    pub fn keyword(word: &str) -> Option<TokenKind> {
        const KEYWORDS: [(&str, TokenKind); 3] = [
            ("CREATE", TokenKind::Create),
            ("UPDATE", TokenKind::Update),
            ("DELETE", TokenKind::Delete),
        ];
        KEYWORDS
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(word))
            .map(|(_, kind)| *kind)
    }

    /// How the token reads in error messages
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Create => "CREATE",
            TokenKind::Update => "UPDATE",
            TokenKind::Delete => "DELETE",
            TokenKind::OpenCurlyBrace => "'{'",
            TokenKind::CloseCurlyBrace => "'}'",
            TokenKind::OpenSquareBracket => "'['",
            TokenKind::CloseSquareBracket => "']'",
            TokenKind::ParameterSeparator => "','",
            TokenKind::OperatorAssign => "'='",
            TokenKind::EndOfStatement => "end of statement",
            TokenKind::EndOfText => "end of input",
            TokenKind::Name => "name",
            TokenKind::String => "string",
            TokenKind::Number => "number",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text for names, keywords and numbers; unescaped value for strings
    pub text: Option<String>,
    /// Position of the token's first character
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self {
            kind,
            text: None,
            position,
        }
    }

    pub fn with_text(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: Some(text.into()),
            position,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
