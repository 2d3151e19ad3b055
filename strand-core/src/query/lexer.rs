//! Tokenizer for the query language
//!
//! Reads characters with a single character of pushback and hands out one
//! token per call to [`Lexer::next_token`]. After the input is exhausted every
//! call yields [`TokenKind::EndOfText`].

use super::token::{Position, Token, TokenKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::{Chars, FromStr};

/// What terminates a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementSeparator {
    /// `;`
    #[default]
    Semicolon,
    /// End of line
    NewLine,
    /// Either
    Both,
}

impl StatementSeparator {
    fn semicolon(self) -> bool {
        matches!(self, Self::Semicolon | Self::Both)
    }

    /// Whether a line break ends a statement
    pub fn newline(self) -> bool {
        matches!(self, Self::NewLine | Self::Both)
    }
}

impl FromStr for StatementSeparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "semicolon" => Ok(Self::Semicolon),
            "newline" => Ok(Self::NewLine),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown statement separator '{}' (expected semicolon, newline or both)",
                other
            )),
        }
    }
}

/// Longest `\x` escape
const MAX_HEX_DIGITS: usize = 4;

/// Query tokenizer
pub struct Lexer<'a> {
    chars: Chars<'a>,
    pushed: Option<char>,
    line: usize,
    column: usize,
    before_last: Position,
    separator: StatementSeparator,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, separator: StatementSeparator) -> Self {
        Self {
            chars: input.chars(),
            pushed: None,
            line: 1,
            column: 1,
            before_last: Position::default(),
            separator,
        }
    }

    /// Position of the next unread character
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn read(&mut self) -> Option<char> {
        let c = self.pushed.take().or_else(|| self.chars.next())?;
        self.before_last = self.position();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Push back the character just read
    fn unread(&mut self, c: char) {
        debug_assert!(self.pushed.is_none(), "only one character of pushback");
        self.pushed = Some(c);
        self.line = self.before_last.line;
        self.column = self.before_last.column;
    }

    fn peek(&mut self) -> Option<char> {
        let c = self.read()?;
        self.unread(c);
        Some(c)
    }

    /// Lex the next token
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            let start = self.position();
            let Some(c) = self.read() else {
                return Ok(Token::new(TokenKind::EndOfText, start));
            };

            let kind = match c {
                '\n' if self.separator.newline() => TokenKind::EndOfStatement,
                c if c.is_whitespace() => continue,
                '/' => {
                    self.comment(start)?;
                    continue;
                }
                ';' if self.separator.semicolon() => TokenKind::EndOfStatement,
                '{' => TokenKind::OpenCurlyBrace,
                '}' => TokenKind::CloseCurlyBrace,
                '[' => TokenKind::OpenSquareBracket,
                ']' => TokenKind::CloseSquareBracket,
                ',' => TokenKind::ParameterSeparator,
                '=' => TokenKind::OperatorAssign,
                '"' => return self.string(start),
                c if c.is_ascii_alphabetic() => return Ok(self.word(c, start)),
                c if c.is_ascii_digit() => return self.number(c, start),
                '-' | '+' if self.peek().is_some_and(|n| n.is_ascii_digit()) => {
                    return self.number(c, start);
                }
                other => {
                    return Err(Error::syntax(
                        start.line,
                        start.column,
                        format!("Unexpected character {:?}", other),
                    ));
                }
            };
            return Ok(Token::new(kind, start));
        }
    }

    /// Skip a `//` or `/* */` comment; the leading '/' is already consumed
    fn comment(&mut self, start: Position) -> Result<()> {
        match self.read() {
            Some('/') => {
                while let Some(c) = self.read() {
                    if c == '\n' {
                        self.unread(c);
                        break;
                    }
                }
                Ok(())
            }
            Some('*') => {
                let mut depth = 1usize;
                let mut prev = '\0';
                while depth > 0 {
                    let Some(c) = self.read() else {
                        return Err(Error::syntax(
                            start.line,
                            start.column,
                            "Unterminated comment",
                        ));
                    };
                    match (prev, c) {
                        ('/', '*') => {
                            depth += 1;
                            prev = '\0';
                        }
                        ('*', '/') => {
                            depth -= 1;
                            prev = '\0';
                        }
                        _ => prev = c,
                    }
                }
                Ok(())
            }
            _ => Err(Error::syntax(
                start.line,
                start.column,
                "Unexpected character '/'",
            )),
        }
    }

    fn word(&mut self, first: char, start: Position) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.read() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
            } else {
                self.unread(c);
                break;
            }
        }
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Name);
        Token::with_text(kind, text, start)
    }

    fn number(&mut self, first: char, start: Position) -> Result<Token> {
        let mut text = String::from(first);
        while let Some(c) = self.read() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c.is_ascii_alphabetic() || c == '_' {
                let at = self.before_last;
                return Err(Error::syntax(
                    at.line,
                    at.column,
                    format!("Unexpected {:?} immediately after number {}", c, text),
                ));
            } else {
                self.unread(c);
                break;
            }
        }
        Ok(Token::with_text(TokenKind::Number, text, start))
    }

    /// Lex a string body; the opening quote is already consumed
    fn string(&mut self, start: Position) -> Result<Token> {
        let mut value = String::new();
        loop {
            let at = self.position();
            let Some(c) = self.read() else {
                return Err(Error::syntax(
                    start.line,
                    start.column,
                    "Unterminated string",
                ));
            };
            match c {
                '"' => return Ok(Token::with_text(TokenKind::String, value, start)),
                '\\' => value.push(self.escape(at)?),
                c if c.is_control() => {
                    return Err(Error::syntax(
                        at.line,
                        at.column,
                        format!("Control character {:?} in string", c),
                    ));
                }
                c => value.push(c),
            }
        }
    }

    /// Resolve an escape; the backslash at `at` is already consumed
    fn escape(&mut self, at: Position) -> Result<char> {
        let invalid = |what: String| Error::syntax(at.line, at.column, what);
        match self.read() {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('x') => {
                let mut code = 0u32;
                let mut digits = 0;
                while digits < MAX_HEX_DIGITS {
                    match self.read() {
                        Some(c) if c.is_ascii_hexdigit() => {
                            code = code * 16 + c.to_digit(16).unwrap_or(0);
                            digits += 1;
                        }
                        Some(c) => {
                            self.unread(c);
                            break;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err(invalid("Expected hex digits after \\x".to_string()));
                }
                char::from_u32(code)
                    .ok_or_else(|| invalid(format!("\\x{:X} is not a valid character", code)))
            }
            Some(other) => Err(invalid(format!("Invalid escape sequence \\{}", other))),
            None => Err(Error::syntax(at.line, at.column, "Unterminated string")),
        }
    }
}

/// Lex `input` completely, ending with the end-of-text token
pub fn tokenize(input: &str, separator: StatementSeparator) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(input, separator);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::EndOfText;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input, StatementSeparator::Semicolon)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn error_at(input: &str) -> (usize, usize, std::string::String) {
        match tokenize(input, StatementSeparator::Semicolon) {
            Err(Error::Syntax {
                line,
                column,
                message,
            }) => (line, column, message),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_statement_sequence() {
        let tokens = tokenize(
            r#"CREATE { "N" = ["A","B"], x = "v", y = 7 };"#,
            StatementSeparator::Semicolon,
        )
        .unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Create,
                OpenCurlyBrace,
                String,
                OperatorAssign,
                OpenSquareBracket,
                String,
                ParameterSeparator,
                String,
                CloseSquareBracket,
                ParameterSeparator,
                Name,
                OperatorAssign,
                String,
                ParameterSeparator,
                Name,
                OperatorAssign,
                Number,
                CloseCurlyBrace,
                EndOfStatement,
                EndOfText,
            ]
        );
        assert_eq!(tokens[2].text(), "N");
        assert_eq!(tokens[10].text(), "x");
        assert_eq!(tokens[16].text(), "7");
        assert_eq!(tokens[2].position, Position::new(1, 10));
    }

    #[test]
    fn test_positions_across_lines() {
        let tokens = tokenize("CREATE\n  {\n}", StatementSeparator::Semicolon).unwrap();
        assert_eq!(tokens[1].position, Position::new(2, 3));
        assert_eq!(tokens[2].position, Position::new(3, 1));
    }

    #[test]
    fn test_signed_numbers() {
        let tokens = tokenize("-12 +3 0", StatementSeparator::Semicolon).unwrap();
        let texts: Vec<_> = tokens[..3].iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["-12", "+3", "0"]);
    }

    #[test]
    fn test_escapes() {
        let tokens = tokenize(r#""a\"b\\c\n\x41\x263A\x7""#, StatementSeparator::Semicolon).unwrap();
        assert_eq!(tokens[0].text(), "a\"b\\c\nA\u{263A}\u{7}");
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// line\nCREATE /* outer /* inner */ still */ {"),
            vec![Create, OpenCurlyBrace, EndOfText]
        );
    }

    #[test]
    fn test_separator_modes() {
        let input = "CREATE;\nCREATE";
        let newline = tokenize(input, StatementSeparator::NewLine);
        assert!(newline.is_err());

        let both: Vec<_> = tokenize(input, StatementSeparator::Both)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            both,
            vec![Create, EndOfStatement, EndOfStatement, Create, EndOfText]
        );
        assert_eq!(
            kinds(input),
            vec![Create, EndOfStatement, Create, EndOfText]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let (line, column, message) = error_at("CREATE \"abc");
        assert_eq!((line, column), (1, 8));
        assert_eq!(message, "Unterminated string");
    }

    #[test]
    fn test_control_character_in_string() {
        let (line, column, _) = error_at("\"ab\ncd\"");
        assert_eq!((line, column), (1, 4));
    }

    #[test]
    fn test_letter_after_number() {
        let (line, column, message) = error_at("x = 12ab");
        assert_eq!((line, column), (1, 7));
        assert!(message.contains("12"));
    }

    #[test]
    fn test_unknown_character() {
        let (line, column, message) = error_at("CREATE {\n  @");
        assert_eq!((line, column), (2, 3));
        assert_eq!(message, "Unexpected character '@'");
    }

    #[test]
    fn test_bad_escapes() {
        assert!(tokenize(r#""\q""#, StatementSeparator::Semicolon).is_err());
        assert!(tokenize(r#""\xZ""#, StatementSeparator::Semicolon).is_err());
        assert!(tokenize(r#""\xD800""#, StatementSeparator::Semicolon).is_err());
    }

    #[test]
    fn test_unterminated_comment() {
        let (line, column, message) = error_at("CREATE /* /* */");
        assert_eq!((line, column), (1, 8));
        assert_eq!(message, "Unterminated comment");
    }

    #[test]
    fn test_end_of_text_repeats() {
        let mut lexer = Lexer::new("", StatementSeparator::Semicolon);
        assert_eq!(lexer.next_token().unwrap().kind, EndOfText);
        assert_eq!(lexer.next_token().unwrap().kind, EndOfText);
    }
}
