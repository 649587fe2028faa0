use std::sync::Arc;

use crate::item::{FeedSnapshot, LastReaction, NewsItem, ReactionKind};

/// Cursor over a capped feed list. The cursor only moves forward and only
/// through [`ReviewSession::advance`].
#[derive(Debug, Clone)]
pub struct ReviewSession {
    items: Arc<Vec<NewsItem>>,
    generation: Option<u64>,
    max_items: usize,
    cursor: usize,
    last_reaction: Option<LastReaction>,
}

impl ReviewSession {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Arc::new(Vec::new()),
            generation: None,
            max_items,
            cursor: 0,
            last_reaction: None,
        }
    }

    /// Swaps in a snapshot of the backing feed. A new generation restarts the
    /// review from the top; a local edit of the same generation keeps the
    /// cursor, clamped to the new length.
    pub fn replace(&mut self, snapshot: &FeedSnapshot) {
        let capped = if snapshot.items.len() > self.max_items {
            Arc::new(snapshot.items[..self.max_items].to_vec())
        } else {
            Arc::clone(&snapshot.items)
        };

        if self.generation != Some(snapshot.generation) {
            self.generation = Some(snapshot.generation);
            self.cursor = 0;
            self.last_reaction = None;
        } else {
            self.cursor = self.cursor.min(capped.len());
        }
        self.items = capped;
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.items.len());
    }

    pub fn record_reaction(&mut self, item: &NewsItem, kind: ReactionKind) {
        self.last_reaction = Some(LastReaction {
            item_id: item.id,
            title: item.title.clone(),
            kind,
        });
    }

    pub fn current(&self) -> Option<&NewsItem> {
        self.items.get(self.cursor)
    }

    /// Up to `k` items starting at the cursor. The iterator is `Clone`, so a
    /// caller can walk it again without touching the session.
    pub fn peek_window(&self, k: usize) -> std::iter::Take<std::slice::Iter<'_, NewsItem>> {
        self.items[self.cursor..].iter().take(k)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == self.items.len()
    }

    pub fn items(&self) -> &Arc<Vec<NewsItem>> {
        &self.items
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn last_reaction(&self) -> Option<&LastReaction> {
        self.last_reaction.as_ref()
    }
}
