//! Token tree - first-child/next-sibling encoding of the parse tree
//!
//! Nodes live in one arena and link to each other by index, so the tree has
//! no owning pointers and serializes as a flat list.

use super::token::{Position, Token, TokenKind};
use serde::{Deserialize, Serialize};

/// Handle of a node in a [`TokenTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeIndex(u32);

impl TreeIndex {
    fn get(self) -> usize {
        self.0 as usize
    }
}

/// Grammar rule materialized as a non-terminal node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rule {
    /// Synthetic root
    Script,
    /// `CREATE { node-content } ;`
    CreateStatement,
    /// Lone `;`
    EmptyStatement,
    /// `STRING = label-array [, property-list]`
    NodeDefinition,
    /// `[ STRING, ... ]`
    LabelArray,
    /// `property, ...`
    PropertyList,
    /// `NAME = value`
    Property,
}

/// What a tree node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Rule(Rule),
    Terminal(TokenKind),
}

/// One node of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub kind: TreeKind,
    /// Token text for terminals
    pub text: Option<String>,
    /// Position of the node's first token
    pub position: Position,
    pub first_child: Option<TreeIndex>,
    pub next_sibling: Option<TreeIndex>,
}

impl TreeNode {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_rule(&self, rule: Rule) -> bool {
        self.kind == TreeKind::Rule(rule)
    }
}

/// Parse tree rooted at a [`Rule::Script`] node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenTree {
    nodes: Vec<TreeNode>,
    #[serde(skip)]
    last_child: Vec<Option<TreeIndex>>,
}

impl TokenTree {
    /// Tree holding only the script root
    pub fn new(position: Position) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            last_child: Vec::new(),
        };
        tree.push(TreeKind::Rule(Rule::Script), None, position);
        tree
    }

    pub fn root(&self) -> TreeIndex {
        TreeIndex(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, kind: TreeKind, text: Option<String>, position: Position) -> TreeIndex {
        let index = TreeIndex(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            kind,
            text,
            position,
            first_child: None,
            next_sibling: None,
        });
        self.last_child.push(None);
        index
    }

    /// Append a new rule node under `parent`
    pub fn add_rule(&mut self, parent: TreeIndex, rule: Rule, position: Position) -> TreeIndex {
        let child = self.push(TreeKind::Rule(rule), None, position);
        self.link(parent, child);
        child
    }

    /// Append a token as a leaf under `parent`
    pub fn add_terminal(&mut self, parent: TreeIndex, token: Token) -> TreeIndex {
        let child = self.push(TreeKind::Terminal(token.kind), token.text, token.position);
        self.link(parent, child);
        child
    }

    fn link(&mut self, parent: TreeIndex, child: TreeIndex) {
        match self.last_child[parent.get()] {
            Some(last) => self.nodes[last.get()].next_sibling = Some(child),
            None => self.nodes[parent.get()].first_child = Some(child),
        }
        self.last_child[parent.get()] = Some(child);
    }

    pub fn node(&self, index: TreeIndex) -> &TreeNode {
        &self.nodes[index.get()]
    }

    /// Children of `index` in order, following the sibling chain
    pub fn children(&self, index: TreeIndex) -> Children<'_> {
        Children {
            tree: self,
            next: self.node(index).first_child,
        }
    }

    /// Top-level statements
    pub fn statements(&self) -> Children<'_> {
        self.children(self.root())
    }

    /// S-expression rendering, for logs and tests
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(self.root(), &mut out);
        out
    }

    fn render_into(&self, index: TreeIndex, out: &mut String) {
        let node = self.node(index);
        match node.kind {
            TreeKind::Rule(rule) => {
                out.push('(');
                out.push_str(&format!("{:?}", rule));
                for child in self.children(index) {
                    out.push(' ');
                    self.render_into(child, out);
                }
                out.push(')');
            }
            TreeKind::Terminal(TokenKind::String) => out.push_str(&format!("{:?}", node.text())),
            TreeKind::Terminal(_) => out.push_str(node.text()),
        }
    }
}

/// Iterator over a sibling chain
pub struct Children<'a> {
    tree: &'a TokenTree,
    next: Option<TreeIndex>,
}

impl Iterator for Children<'_> {
    type Item = TreeIndex;

    fn next(&mut self) -> Option<TreeIndex> {
        let current = self.next?;
        self.next = self.tree.node(current).next_sibling;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_follow_sibling_chain() {
        let mut tree = TokenTree::new(Position::default());
        let labels = tree.add_rule(tree.root(), Rule::LabelArray, Position::new(1, 5));
        for (i, label) in ["A", "B", "C"].iter().enumerate() {
            tree.add_terminal(
                labels,
                Token::with_text(TokenKind::String, *label, Position::new(1, 6 + i * 4)),
            );
        }

        let texts: Vec<_> = tree
            .children(labels)
            .map(|c| tree.node(c).text().to_string())
            .collect();
        assert_eq!(texts, vec!["A", "B", "C"]);

        let first = tree.node(labels).first_child.unwrap();
        assert!(tree.node(first).next_sibling.is_some());
        assert_eq!(tree.statements().count(), 1);
        assert_eq!(tree.render(), r#"(Script (LabelArray "A" "B" "C"))"#);
    }

    #[test]
    fn test_leaf_has_no_children() {
        let mut tree = TokenTree::new(Position::default());
        let leaf = tree.add_terminal(
            tree.root(),
            Token::with_text(TokenKind::Number, "7", Position::default()),
        );
        assert_eq!(tree.children(leaf).count(), 0);
        assert_eq!(tree.len(), 2);
    }
}
