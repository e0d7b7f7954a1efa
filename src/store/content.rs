use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::WaypointResult;
use crate::model::{ContentItem, KpId};

// ---------------------------------------------------------------------------
// ContentCatalog trait: learning material lookup by knowledge point
// ---------------------------------------------------------------------------

/// Read-only lookup of learning content. An empty result is a normal answer.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// All content items attached to a knowledge point, in catalog order.
    async fn by_kp(&self, kp_id: KpId) -> WaypointResult<Vec<ContentItem>>;
}

// ---------------------------------------------------------------------------
// InMemoryContentCatalog
// ---------------------------------------------------------------------------

/// Content catalog held in memory, indexed by knowledge point.
#[derive(Default)]
pub struct InMemoryContentCatalog {
    items: RwLock<HashMap<KpId, Vec<ContentItem>>>,
}

impl InMemoryContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Items with an id already present for the same knowledge
    /// point replace the earlier one.
    pub async fn add_item(&self, item: ContentItem) {
        let mut items = self.items.write().await;
        let entry = items.entry(item.kp_id).or_default();
        match entry.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => entry.push(item),
        }
    }

    pub async fn item_count(&self) -> usize {
        self.items.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ContentCatalog for InMemoryContentCatalog {
    async fn by_kp(&self, kp_id: KpId) -> WaypointResult<Vec<ContentItem>> {
        let items = self.items.read().await;
        Ok(items.get(&kp_id).cloned().unwrap_or_default())
    }
}
