use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bookmark::Bookmark;

/// Relation the dashboard subscribes to.
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// An untyped row-level change as delivered by a change feed.
///
/// `kind` is `INSERT`, `UPDATE` or `DELETE`; records are left as raw JSON so that
/// malformed payloads can be detected and dropped by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "record", alias = "new_record")]
    pub new_record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

impl RawChange {
    pub fn insert(record: Value) -> Self {
        Self {
            kind: "INSERT".to_string(),
            new_record: Some(record),
            old_record: None,
        }
    }

    pub fn delete(old_record: Value) -> Self {
        Self {
            kind: "DELETE".to_string(),
            new_record: None,
            old_record: Some(old_record),
        }
    }
}

/// A decoded change the bookmark store knows how to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    /// Carries the prior-state id of the removed row.
    Delete(String),
}

/// Which events to deliver on a change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// Server-side filter for a change feed: one relation, one owner, a set of event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub channel: String,
    pub table: String,
    pub owner_id: String,
    pub events: Vec<ChangeKind>,
}

impl FeedFilter {
    /// Filter for insert and delete events on the bookmarks owned by `owner_id`.
    pub fn bookmarks_for(channel: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            table: BOOKMARKS_TABLE.to_string(),
            owner_id: owner_id.into(),
            events: vec![ChangeKind::Insert, ChangeKind::Delete],
        }
    }

    /// Row filter in PostgREST syntax.
    pub fn row_filter(&self) -> String {
        format!("user_id=eq.{}", self.owner_id)
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        self.events.contains(&kind)
    }
}
