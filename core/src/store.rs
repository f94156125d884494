use std::sync::{PoisonError, RwLock};

use crate::models::{ChatTurn, DailySummary, FoodEntry, FoodLogSnapshot};

/// Append-only log of food entries in insertion order.
///
/// The in-memory implementation lives for the process; a durable backing can
/// implement the same trait.
pub trait FoodLogStore: Send + Sync {
    fn append(&self, entry: FoodEntry);

    fn all(&self) -> Vec<FoodEntry>;

    /// Append several entries so that no reader sees only part of the batch.
    ///
    /// Implementations must make the whole batch visible at once, e.g. in a
    /// single write lock or transaction.
    fn extend(&self, entries: Vec<FoodEntry>);

    fn summary(&self) -> DailySummary {
        DailySummary::from_entries(&self.all())
    }

    /// Entries and the totals computed from the same read.
    fn snapshot(&self) -> FoodLogSnapshot {
        FoodLogSnapshot::from_entries(self.all())
    }
}

/// Append-only log of chat turns in insertion order.
pub trait ChatHistoryStore: Send + Sync {
    fn append(&self, turn: ChatTurn);

    fn all(&self) -> Vec<ChatTurn>;
}

#[derive(Debug, Default)]
pub struct InMemoryFoodLog {
    entries: RwLock<Vec<FoodEntry>>,
}

impl InMemoryFoodLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FoodLogStore for InMemoryFoodLog {
    fn append(&self, entry: FoodEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn all(&self) -> Vec<FoodEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn extend(&self, entries: Vec<FoodEntry>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryChatHistory {
    turns: RwLock<Vec<ChatTurn>>,
}

impl InMemoryChatHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatHistoryStore for InMemoryChatHistory {
    fn append(&self, turn: ChatTurn) {
        self.turns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turn);
    }

    fn all(&self) -> Vec<ChatTurn> {
        self.turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
