//! Query execution - walks the token tree and drives the storage engine

mod response;

pub use response::{ErrorLocation, QueryPayload, QueryResponse};

use crate::engine::StorageEngine;
use crate::graph::{Graph, Node, Property, PropertyValue};
use crate::query::{self, Rule, StatementSeparator, TokenKind, TokenTree, TreeIndex, TreeKind};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs queries against one collection
///
/// Cheap to create; the server builds one per connection over a shared
/// engine.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    engine: Arc<StorageEngine>,
    collection: String,
    separator: StatementSeparator,
}

impl QueryExecutor {
    pub fn new(engine: Arc<StorageEngine>, collection: impl Into<String>) -> Self {
        Self {
            engine,
            collection: collection.into(),
            separator: StatementSeparator::default(),
        }
    }

    pub fn with_separator(mut self, separator: StatementSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn separator(&self) -> StatementSeparator {
        self.separator
    }

    /// Execute a query; every failure is reported in the response
    pub async fn execute(&self, query: &str) -> QueryResponse {
        if query.trim().is_empty() {
            return QueryResponse::failure("EMPTY_QUERY", "Query was empty");
        }

        let tree = match query::parse(query, self.separator) {
            Ok(tree) => tree,
            Err(e) => {
                debug!(error = %e, "Query rejected by parser");
                return QueryResponse::from_error(&e);
            }
        };

        let nodes = match statements(&tree) {
            Ok(nodes) => nodes,
            Err(e) => return QueryResponse::from_error(&e),
        };

        let mut created = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match self.engine.create_node(&self.collection, node).await {
                Ok((stored, _record)) => created.push(stored),
                Err(e) => {
                    warn!(
                        collection = %self.collection,
                        created = created.len(),
                        error = %e,
                        "Statement failed"
                    );
                    let mut response = QueryResponse::from_error(&e);
                    if !created.is_empty() {
                        response.message = format!(
                            "{} (after creating {} node(s))",
                            response.message,
                            created.len()
                        );
                    }
                    return response;
                }
            }
        }

        debug!(collection = %self.collection, created = created.len(), "Query executed");
        match created.len() {
            0 => QueryResponse::success("No statements to execute", None),
            1 => {
                let node = created.remove(0);
                QueryResponse::success("Created 1 node", Some(QueryPayload::Node(node)))
            }
            n => {
                let graph = created
                    .into_iter()
                    .fold(Graph::new(), |graph, node| graph.with_node(node));
                QueryResponse::success(format!("Created {} nodes", n), Some(QueryPayload::Graph(graph)))
            }
        }
    }
}

/// Nodes described by the script's create statements, in order
fn statements(tree: &TokenTree) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for statement in tree.statements() {
        match tree.node(statement).kind {
            TreeKind::Rule(Rule::CreateStatement) => {
                let definition = first_child(tree, statement, Rule::NodeDefinition)?;
                nodes.push(node_from(tree, definition)?);
            }
            TreeKind::Rule(Rule::EmptyStatement) => {}
            other => {
                return Err(Error::internal(format!(
                    "unexpected statement node {:?}",
                    other
                )));
            }
        }
    }
    Ok(nodes)
}

fn first_child(tree: &TokenTree, parent: TreeIndex, rule: Rule) -> Result<TreeIndex> {
    tree.children(parent)
        .find(|c| tree.node(*c).is_rule(rule))
        .ok_or_else(|| Error::internal(format!("{:?} node has no {:?}", parent, rule)))
}

fn node_from(tree: &TokenTree, definition: TreeIndex) -> Result<Node> {
    let mut node = Node::default();
    for child in tree.children(definition) {
        let part = tree.node(child);
        match part.kind {
            TreeKind::Terminal(TokenKind::String) => node.name = Some(part.text().to_string()),
            TreeKind::Rule(Rule::LabelArray) => {
                node.labels = tree
                    .children(child)
                    .map(|l| tree.node(l).text().to_string())
                    .collect();
            }
            TreeKind::Rule(Rule::PropertyList) => {
                for property in tree.children(child) {
                    node.properties.push(property_from(tree, property)?);
                }
            }
            other => {
                return Err(Error::internal(format!(
                    "unexpected node definition part {:?}",
                    other
                )));
            }
        }
    }
    Ok(node)
}

fn property_from(tree: &TokenTree, property: TreeIndex) -> Result<Property> {
    let mut parts = tree.children(property).map(|c| tree.node(c));
    let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
        return Err(Error::internal("property node without key and value"));
    };

    let value = match value.kind {
        TreeKind::Terminal(TokenKind::String) => PropertyValue::String(value.text().to_string()),
        TreeKind::Terminal(TokenKind::Number) => {
            let n = value.text().parse::<i64>().map_err(|_| {
                Error::syntax(
                    value.position.line,
                    value.position.column,
                    format!("Number {} is out of range", value.text()),
                )
            })?;
            PropertyValue::Int(n)
        }
        other => {
            return Err(Error::internal(format!(
                "unexpected property value {:?}",
                other
            )));
        }
    };
    Ok(Property::new(key.text(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn test_empty_query() {
        let ctx = TestContext::with_collection("docs").await;
        let response = ctx.executor().execute("").await;
        assert!(!response.success);
        assert_eq!(response.message, "Query was empty");
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_create_returns_node() {
        let ctx = TestContext::with_collection("docs").await;
        let response = ctx
            .executor()
            .execute(r#"CREATE { "Spec-001" = ["Document"], title = "Design", revision = 3 };"#)
            .await;
        assert!(response.success, "{}", response.message);

        let Some(QueryPayload::Node(node)) = response.result else {
            panic!("expected node payload");
        };
        assert_eq!(node.name.as_deref(), Some("Spec-001"));
        assert_eq!(node.labels, vec!["Document"]);
        assert_eq!(node.property("revision"), Some(&PropertyValue::Int(3)));
        assert_eq!(
            ctx.engine().get_node("docs", node.id.unwrap()).await.unwrap(),
            node
        );
    }

    #[tokio::test]
    async fn test_script_returns_graph() {
        let ctx = TestContext::with_collection("docs").await;
        let response = ctx
            .executor()
            .execute(r#"CREATE { "a" = [] }; ; CREATE { "b" = ["L"], n = -4 };"#)
            .await;
        let Some(QueryPayload::Graph(graph)) = response.result else {
            panic!("expected graph payload");
        };
        assert_eq!(graph.node_count(), 2);
        assert_eq!(response.message, "Created 2 nodes");
    }

    #[tokio::test]
    async fn test_syntax_error_response() {
        let ctx = TestContext::with_collection("docs").await;
        let response = ctx.executor().execute(r#"CREATE { "N" = [ ; };"#).await;
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorLocation { line: 1, column: 18 }));
        assert_eq!(response.code.as_deref(), Some("SYNTAX_ERROR"));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let ctx = TestContext::new().await;
        let executor = QueryExecutor::new(ctx.engine(), "missing");
        let response = executor.execute(r#"CREATE { "a" = [] };"#).await;
        assert_eq!(response.code.as_deref(), Some("COLLECTION_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_oversized_number() {
        let ctx = TestContext::with_collection("docs").await;
        let response = ctx
            .executor()
            .execute(r#"CREATE { "a" = [], n = 99999999999999999999 };"#)
            .await;
        assert_eq!(response.code.as_deref(), Some("SYNTAX_ERROR"));

        let response = ctx
            .executor()
            .execute(r#"CREATE { "a" = [], n = 99999999999 };"#)
            .await;
        assert_eq!(response.code.as_deref(), Some("VALUE_OUT_OF_RANGE"));
    }

    #[tokio::test]
    async fn test_failure_stops_script() {
        let ctx = TestContext::with_collection("docs").await;
        let long = "x".repeat(61);
        let query = format!(r#"CREATE {{ "a" = [] }}; CREATE {{ "b" = ["{}"] }};"#, long);
        let response = ctx.executor().execute(&query).await;
        assert_eq!(response.code.as_deref(), Some("PAYLOAD_TOO_LARGE"));
        assert!(response.message.contains("after creating 1 node(s)"));
    }
}
