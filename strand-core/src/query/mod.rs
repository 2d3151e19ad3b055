//! Query language front end
//!
//! ```text
//! CREATE { "Spec-001" = ["Document", "Draft"], title = "Design", revision = 3 };
//! ```
//!
//! [`lexer`] turns text into [`Token`]s, [`parser`] builds a [`TokenTree`].

pub mod lexer;
pub mod parser;
pub mod token;
pub mod tree;

pub use lexer::{Lexer, StatementSeparator, tokenize};
pub use parser::{Parser, parse};
pub use token::{Position, Token, TokenKind};
pub use tree::{Rule, TokenTree, TreeIndex, TreeKind, TreeNode};
