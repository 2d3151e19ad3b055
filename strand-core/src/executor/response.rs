//! Structured query results

use crate::Error;
use crate::graph::{Graph, Node, Relationship};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object produced by a successful query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum QueryPayload {
    Node(Node),
    Relationship(Relationship),
    Graph(Graph),
}

/// Source position of a failed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: usize,
    pub column: usize,
}

/// Outcome of executing one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorLocation>,
    /// Machine-readable error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QueryResponse {
    pub fn success(message: impl Into<String>, result: Option<QueryPayload>) -> Self {
        Self {
            success: true,
            message: message.into(),
            result,
            error: None,
            code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            result: None,
            error: None,
            code: Some(code.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Failure carrying an error's code, message and, for syntax errors, position
    pub fn from_error(err: &Error) -> Self {
        let mut response = Self::failure(err.code(), err.to_string());
        response.error = err
            .position()
            .map(|(line, column)| ErrorLocation { line, column });
        response
    }

    /// One-line JSON rendering
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"message":"response encoding failed: {}","code":"INTERNAL","timestamp":"{}"}}"#,
                e.to_string().replace('"', "'"),
                self.timestamp.to_rfc3339()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn test_syntax_error_carries_location() {
        let response = QueryResponse::from_error(&Error::syntax(2, 5, "Expected '='"));
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorLocation { line: 2, column: 5 }));
        assert_eq!(response.code.as_deref(), Some("SYNTAX_ERROR"));
    }

    #[test]
    fn test_json_shape() {
        let node = Node::named("n").with_id(NodeId(3));
        let response = QueryResponse::success("Created 1 node", Some(QueryPayload::Node(node)));
        let json: serde_json::Value = serde_json::from_str(&response.to_json()).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["type"], "node");
        assert_eq!(json["result"]["value"]["id"], 3);
        assert!(json.get("error").is_none());
        assert!(!response.to_json().contains('\n'));

        let back: QueryResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }
}
