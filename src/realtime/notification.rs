//! Change notifications and the server-side scope filter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};
use crate::realtime::Identity;

// == Change Op ==
/// Kind of row mutation. `Any` only appears in subscription requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOp {
    #[serde(rename = "INSERT", alias = "insert", alias = "create")]
    Insert,
    #[serde(rename = "UPDATE", alias = "update")]
    Update,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
    #[serde(rename = "*", alias = "any")]
    Any,
}

impl ChangeOp {
    /// True if a subscription for `self` should receive an `op` event.
    pub fn accepts(self, op: ChangeOp) -> bool {
        self == ChangeOp::Any || self == op
    }
}

// == Change Notification ==
/// One mutation reported by the remote change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: String,
    pub op: ChangeOp,
    /// Identifying fields of the affected row, when the service sends them
    #[serde(default)]
    pub record: Option<Map<String, Value>>,
    #[serde(default = "Utc::now")]
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn new(table: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            table: table.into(),
            op,
            record: None,
            commit_timestamp: Utc::now(),
        }
    }

    /// Attaches row fields. Non-object values are ignored.
    pub fn with_record(mut self, record: Value) -> Self {
        if let Value::Object(fields) = record {
            self.record = Some(fields);
        }
        self
    }

    /// String form of a row column, if present and scalar.
    pub fn field(&self, column: &str) -> Option<String> {
        match self.record.as_ref()?.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

// == Scope Filter ==
/// Server-side equality predicate restricting a subscription to one owner.
///
/// Rendered as `column=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeFilter {
    pub column: String,
    pub value: String,
}

impl ScopeFilter {
    /// Builds the `column = identity.id` filter, failing fast when the
    /// identity cannot be expressed as a filter value.
    pub fn for_identity(column: &str, identity: &Identity) -> Result<Self> {
        if column.trim().is_empty() {
            return Err(CacheError::InvalidScope("owner column is empty".into()));
        }
        let value = identity.id.as_str();
        if value.trim().is_empty() {
            return Err(CacheError::InvalidScope("identity has an empty id".into()));
        }
        if value.trim() != value {
            return Err(CacheError::InvalidScope(format!(
                "identity id {:?} has surrounding whitespace",
                value
            )));
        }
        if value.contains([',', '(', ')']) {
            return Err(CacheError::InvalidScope(format!(
                "identity id {:?} contains filter metacharacters",
                value
            )));
        }
        Ok(Self {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// Evaluates the predicate against a notification's row.
    ///
    /// Notifications without the column never match.
    pub fn matches(&self, notification: &ChangeNotification) -> bool {
        notification.field(&self.column).as_deref() == Some(self.value.as_str())
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_accepts() {
        assert!(ChangeOp::Any.accepts(ChangeOp::Delete));
        assert!(ChangeOp::Insert.accepts(ChangeOp::Insert));
        assert!(!ChangeOp::Insert.accepts(ChangeOp::Update));
    }

    #[test]
    fn test_notification_deserialize() {
        let raw = r#"{"table":"activities","op":"insert","record":{"id":3,"owner_id":"u1"}}"#;
        let n: ChangeNotification = serde_json::from_str(raw).unwrap();

        assert_eq!(n.table, "activities");
        assert_eq!(n.op, ChangeOp::Insert);
        assert_eq!(n.field("owner_id").as_deref(), Some("u1"));
        assert_eq!(n.field("id").as_deref(), Some("3"));
        assert_eq!(n.field("missing"), None);
    }

    #[test]
    fn test_op_wire_names() {
        assert_eq!(serde_json::to_string(&ChangeOp::Any).unwrap(), r#""*""#);
        assert_eq!(serde_json::to_string(&ChangeOp::Delete).unwrap(), r#""DELETE""#);
    }

    #[test]
    fn test_scope_filter_render_and_match() {
        let filter = ScopeFilter::for_identity("owner_id", &Identity::new("u1")).unwrap();
        assert_eq!(filter.to_string(), "owner_id=eq.u1");

        let own = ChangeNotification::new("clients", ChangeOp::Update)
            .with_record(json!({"owner_id": "u1"}));
        let other = ChangeNotification::new("clients", ChangeOp::Update)
            .with_record(json!({"owner_id": "u2"}));
        let bare = ChangeNotification::new("clients", ChangeOp::Update);

        assert!(filter.matches(&own));
        assert!(!filter.matches(&other));
        assert!(!filter.matches(&bare));
    }

    #[test]
    fn test_scope_filter_rejects_unusable_identity() {
        for id in ["", "   ", "u1 ", " u1", "u1,u2", "u(1)"] {
            let result = ScopeFilter::for_identity("owner_id", &Identity::new(id));
            assert!(matches!(result, Err(CacheError::InvalidScope(_))), "id {:?}", id);
        }
        let result = ScopeFilter::for_identity("", &Identity::new("u1"));
        assert!(matches!(result, Err(CacheError::InvalidScope(_))));
    }

    #[test]
    fn test_scope_filter_value_is_identity_id() {
        let filter = ScopeFilter::for_identity("owner_id", &Identity::new("u-42")).unwrap();
        assert_eq!(filter.value, "u-42");
        assert_eq!(filter.to_string(), "owner_id=eq.u-42");
    }
}
