use super::InteractionStore;
use crate::error::{RecError, Result};
use crate::models::*;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Tables {
    events: Vec<InteractionEvent>,
    items: Vec<Item>,
    deleted: HashSet<ItemId>,
    tags: HashMap<UserId, String>,
    feedback: Vec<FeedbackRecord>,
}

/// Store held entirely in memory. Rows are appended in chronological order.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: UserId, item_id: ItemId, kind: InteractionKind) {
        self.tables.write().events.push(InteractionEvent {
            user_id,
            item_id,
            kind,
            timestamp: None,
        });
    }

    pub fn insert_item(&self, item: Item) {
        let mut tables = self.tables.write();
        tables.items.retain(|existing| existing.id != item.id);
        tables.items.push(item);
    }

    /// Soft-deletes an item; it stays joinable but is never a candidate.
    pub fn delete_item(&self, item_id: ItemId) {
        self.tables.write().deleted.insert(item_id);
    }

    pub fn set_tags(&self, user_id: UserId, raw: &str) {
        self.tables.write().tags.insert(user_id, raw.to_string());
    }

    pub fn add_feedback(&self, record: FeedbackRecord) {
        self.tables.write().feedback.push(record);
    }

    /// Makes every read fail, as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RecError::Internal("in-memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn item_type(tables: &Tables, item_id: ItemId) -> Option<TypeKey> {
        tables
            .items
            .iter()
            .find(|item| item.id == item_id)
            .and_then(|item| item.type_child_ids.clone())
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryStore {
    async fn rating_events(&self) -> Result<Vec<InteractionEvent>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .events
            .iter()
            .filter(|event| event.kind.rating_weight().is_some())
            .cloned()
            .collect())
    }

    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<TypedInteraction>> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .events
            .iter()
            .filter(|event| event.user_id == user_id)
            .map(|event| TypedInteraction {
                item_id: event.item_id,
                kind: event.kind,
                item_type: Self::item_type(&tables, event.item_id),
            })
            .collect())
    }

    async fn user_tags(&self, user_id: UserId) -> Result<BTreeSet<String>> {
        self.check_available()?;
        Ok(parse_tags(self.tables.read().tags.get(&user_id).map(String::as_str)))
    }

    async fn candidate_items(&self, limit: usize) -> Result<Vec<Item>> {
        let mut items = self.active_items().await?;
        items.sort_by(|a, b| b.engagement().cmp(&a.engagement()).then(a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn active_items(&self) -> Result<Vec<Item>> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut items: Vec<Item> = tables
            .items
            .iter()
            .filter(|item| !tables.deleted.contains(&item.id))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn recent_feedback(&self, user_id: UserId, limit: usize) -> Result<Vec<FeedbackRecord>> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut records: Vec<FeedbackRecord> = tables
            .feedback
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .map(|record| FeedbackRecord {
                item_type: Self::item_type(&tables, record.item_id).or_else(|| record.item_type.clone()),
                ..record.clone()
            })
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn item_types(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Option<TypeKey>>> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .map(|item| (item.id, item.type_child_ids.clone()))
            .collect())
    }
}
