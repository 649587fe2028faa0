use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub link: String,
    /// Rich text from the server; untrusted, never interpreted by the core.
    pub summary: String,
    pub source: String,
}

/// Identifies one cached feed (the default feed, the liked feed, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedKey(String);

impl FeedKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FeedKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for FeedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A view of one cache entry handed out to consumers.
///
/// `generation` changes only when a fetch completes; local mutations keep it,
/// so consumers can tell a new list apart from an edited one.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Arc<Vec<NewsItem>>,
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
}

impl FeedSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Accept,
    Skip,
    Retract,
}

impl ReactionKind {
    /// Buttons offered on the review deck, in display order.
    pub const DECK: [ReactionKind; 2] = [ReactionKind::Accept, ReactionKind::Skip];

    /// Sentinel sent to the server as `{ "value": ... }`.
    pub fn value(self) -> i32 {
        match self {
            ReactionKind::Accept => 1,
            ReactionKind::Skip => -1,
            ReactionKind::Retract => 0,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ReactionKind::Accept => "like",
            ReactionKind::Skip => "nop",
            ReactionKind::Retract => "retract",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReactionKind::Accept => "Like",
            ReactionKind::Skip => "nop",
            ReactionKind::Retract => "Remove",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [ReactionKind::Accept, ReactionKind::Skip, ReactionKind::Retract]
            .into_iter()
            .find(|kind| kind.key() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastReaction {
    pub item_id: i64,
    pub title: String,
    pub kind: ReactionKind,
}
