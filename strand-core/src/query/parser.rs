//! Recursive-descent parser
//!
//! ```text
//! statement        ::= create-statement | empty-statement
//! create-statement ::= 'CREATE' '{' node-content '}' ';'
//! node-content     ::= STRING '=' label-array [ ',' property-list ]
//! label-array      ::= '[' [ STRING { ',' STRING } ] ']'
//! property-list    ::= property { ',' property }
//! property         ::= NAME '=' value
//! value            ::= STRING | NUMBER
//! empty-statement  ::= ';'
//! ```
//!
//! There is no error recovery: the first error aborts the whole script.

use super::lexer::{Lexer, StatementSeparator};
use super::token::{Token, TokenKind};
use super::tree::{Rule, TokenTree, TreeIndex};
use crate::{Error, Result};

/// Query parser
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    tree: TokenTree,
}

impl<'a> Parser<'a> {
    /// Create a parser positioned at the first token
    pub fn new(input: &'a str, separator: StatementSeparator) -> Result<Self> {
        let mut lexer = Lexer::new(input, separator);
        let current = lexer.next_token()?;
        let tree = TokenTree::new(current.position);
        Ok(Self {
            lexer,
            current,
            tree,
        })
    }

    /// Parse every statement up to the end of input
    pub fn parse(mut self) -> Result<TokenTree> {
        let root = self.tree.root();
        while self.current.kind != TokenKind::EndOfText {
            self.parse_statement(root)?;
        }
        Ok(self.tree)
    }

    fn parse_statement(&mut self, parent: TreeIndex) -> Result<()> {
        match self.current.kind {
            TokenKind::Create => self.parse_create(parent),
            TokenKind::EndOfStatement => {
                self.tree
                    .add_rule(parent, Rule::EmptyStatement, self.current.position);
                self.advance()?;
                Ok(())
            }
            TokenKind::Update | TokenKind::Delete => Err(self.error(format!(
                "{} statements are not supported",
                self.current.kind
            ))),
            _ => Err(self.error(format!(
                "Expected CREATE or end of statement, found {}",
                self.found()
            ))),
        }
    }

    fn parse_create(&mut self, parent: TreeIndex) -> Result<()> {
        let statement = self
            .tree
            .add_rule(parent, Rule::CreateStatement, self.current.position);
        self.advance()?;

        self.expect(TokenKind::OpenCurlyBrace, "Expected '{' after CREATE")?;
        self.parse_node_definition(statement)?;
        self.expect(
            TokenKind::CloseCurlyBrace,
            "Expected '}' after node definition",
        )?;
        self.expect(TokenKind::EndOfStatement, "Expected end of statement after '}'")?;
        Ok(())
    }

    fn parse_node_definition(&mut self, parent: TreeIndex) -> Result<()> {
        let node = self
            .tree
            .add_rule(parent, Rule::NodeDefinition, self.current.position);

        let name = self.expect(TokenKind::String, "Expected node name string after '{'")?;
        self.tree.add_terminal(node, name);
        self.expect(TokenKind::OperatorAssign, "Expected '=' after node name")?;
        self.parse_label_array(node)?;

        if self.current.kind == TokenKind::ParameterSeparator {
            self.advance()?;
            self.parse_property_list(node)?;
        }
        Ok(())
    }

    fn parse_label_array(&mut self, parent: TreeIndex) -> Result<()> {
        if self.current.kind != TokenKind::OpenSquareBracket {
            return Err(self.error(format!(
                "Expected '[' to start label array, found {}",
                self.found()
            )));
        }
        let labels = self
            .tree
            .add_rule(parent, Rule::LabelArray, self.current.position);
        self.advance()?;

        match self.current.kind {
            TokenKind::CloseSquareBracket => return self.advance(),
            TokenKind::String => {}
            _ => {
                return Err(self.error(format!(
                    "Expected label string or ']', found {}",
                    self.found()
                )));
            }
        }

        loop {
            let label = self.expect(TokenKind::String, "Expected label string after ','")?;
            self.tree.add_terminal(labels, label);
            match self.current.kind {
                TokenKind::ParameterSeparator => self.advance()?,
                TokenKind::CloseSquareBracket => return self.advance(),
                _ => {
                    return Err(self.error(format!(
                        "Expected ',' or ']' in label array, found {}",
                        self.found()
                    )));
                }
            }
        }
    }

    fn parse_property_list(&mut self, parent: TreeIndex) -> Result<()> {
        let list = self
            .tree
            .add_rule(parent, Rule::PropertyList, self.current.position);
        loop {
            self.parse_property(list)?;
            if self.current.kind != TokenKind::ParameterSeparator {
                return Ok(());
            }
            self.advance()?;
        }
    }

    fn parse_property(&mut self, parent: TreeIndex) -> Result<()> {
        if self.current.kind != TokenKind::Name {
            return Err(self.error(format!(
                "Expected property name, found {}",
                self.found()
            )));
        }
        let property = self
            .tree
            .add_rule(parent, Rule::Property, self.current.position);
        let name = self.take()?;
        let key = name.text().to_string();
        self.tree.add_terminal(property, name);

        self.expect(
            TokenKind::OperatorAssign,
            &format!("Expected '=' after property name '{}'", key),
        )?;

        match self.current.kind {
            TokenKind::String | TokenKind::Number => {
                let value = self.take()?;
                self.tree.add_terminal(property, value);
                Ok(())
            }
            _ => Err(self.error(format!(
                "Expected string or number value for property '{}', found {}",
                key,
                self.found()
            ))),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    /// Consume the current token and return it
    fn take(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Consume a token of `kind` or fail with `message` at the current token
    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.current.kind == kind {
            self.take()
        } else {
            Err(self.error(format!("{}, found {}", message, self.found())))
        }
    }

    fn found(&self) -> String {
        match (&self.current.kind, &self.current.text) {
            (TokenKind::String, Some(text)) => format!("string {:?}", text),
            (_, Some(text)) => format!("'{}'", text),
            (kind, None) => kind.describe().to_string(),
        }
    }

    fn error(&self, message: String) -> Error {
        Error::syntax(
            self.current.position.line,
            self.current.position.column,
            message,
        )
    }
}

/// Parse a query into a token tree
pub fn parse(input: &str, separator: StatementSeparator) -> Result<TokenTree> {
    Parser::new(input, separator)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::token::Position;
    use crate::query::tree::TreeKind;

    fn parse_default(input: &str) -> Result<TokenTree> {
        parse(input, StatementSeparator::Semicolon)
    }

    #[test]
    fn test_create_statement_tree() {
        let tree = parse_default(r#"CREATE { "N" = ["A","B"], x = "v", y = 7 };"#).unwrap();
        assert_eq!(
            tree.render(),
            r#"(Script (CreateStatement (NodeDefinition "N" (LabelArray "A" "B") (PropertyList (Property x "v") (Property y 7)))))"#
        );

        let statement = tree.statements().next().unwrap();
        assert!(tree.node(statement).is_rule(Rule::CreateStatement));
        assert_eq!(tree.node(statement).position, Position::new(1, 1));

        let definition = tree.children(statement).next().unwrap();
        assert_eq!(tree.node(definition).position, Position::new(1, 10));

        let parts: Vec<_> = tree.children(definition).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(tree.node(parts[0]).kind, TreeKind::Terminal(TokenKind::String));
        assert_eq!(tree.node(parts[1]).position, Position::new(1, 16));
        assert_eq!(tree.children(parts[1]).count(), 2);
        assert_eq!(tree.node(parts[2]).position, Position::new(1, 27));

        let properties: Vec<_> = tree.children(parts[2]).collect();
        assert_eq!(properties.len(), 2);
        assert_eq!(tree.node(properties[1]).position, Position::new(1, 36));
    }

    #[test]
    fn test_missing_label_reports_position() {
        let err = parse_default(r#"CREATE { "N" = [ ; };"#).unwrap_err();
        let Error::Syntax {
            line,
            column,
            message,
        } = err
        else {
            panic!("expected syntax error");
        };
        assert_eq!((line, column), (1, 18));
        assert!(message.contains("string"));
        assert!(message.contains("']'"));
    }

    #[test]
    fn test_missing_brace() {
        let err = parse_default(r#"CREATE "N" = [];"#).unwrap_err();
        assert_eq!(err.position(), Some((1, 8)));
        assert!(err.to_string().contains("Expected '{' after CREATE"));
    }

    #[test]
    fn test_empty_statements_and_scripts() {
        let tree = parse_default(r#";; CREATE { "a" = [] }; CREATE { "b" = ["L"], n = -4 };"#).unwrap();
        let rules: Vec<_> = tree
            .statements()
            .map(|s| tree.node(s).kind)
            .collect();
        assert_eq!(
            rules,
            vec![
                TreeKind::Rule(Rule::EmptyStatement),
                TreeKind::Rule(Rule::EmptyStatement),
                TreeKind::Rule(Rule::CreateStatement),
                TreeKind::Rule(Rule::CreateStatement),
            ]
        );
        assert_eq!(parse_default("").unwrap().statements().count(), 0);
    }

    #[test]
    fn test_statement_terminator_required() {
        let err = parse_default(r#"CREATE { "a" = [] }"#).unwrap_err();
        assert!(err.to_string().contains("end of statement"));
    }

    #[test]
    fn test_newline_separated_script() {
        let tree = parse(
            "CREATE { \"a\" = [] }\nCREATE { \"b\" = [] }",
            StatementSeparator::NewLine,
        );
        // the last statement has no terminating newline
        assert!(tree.is_err());

        let tree = parse(
            "CREATE { \"a\" = [] }\nCREATE { \"b\" = [] }\n",
            StatementSeparator::NewLine,
        )
        .unwrap();
        assert_eq!(tree.statements().count(), 2);
    }

    #[test]
    fn test_reserved_keywords_rejected() {
        let err = parse_default("UPDATE { };").unwrap_err();
        assert!(err.to_string().contains("UPDATE statements are not supported"));
        assert!(parse_default("delete;").is_err());
    }

    #[test]
    fn test_bad_property_value() {
        let err = parse_default(r#"CREATE { "a" = [], k = [ ] };"#).unwrap_err();
        assert_eq!(err.position(), Some((1, 24)));
        assert!(err.to_string().contains("property 'k'"));
    }

    #[test]
    fn test_trailing_comma_in_labels() {
        let err = parse_default(r#"CREATE { "a" = ["x",] };"#).unwrap_err();
        assert_eq!(err.position(), Some((1, 21)));
    }

    #[test]
    fn test_lexical_errors_surface() {
        let err = parse_default("CREATE { \"a\" = [\"x], };").unwrap_err();
        assert_eq!(err.code(), "SYNTAX_ERROR");
    }
}
