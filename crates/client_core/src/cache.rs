use std::collections::HashMap;

use shared::{
    domain::{ChannelScope, MessageId},
    protocol::{Message, MessagePage},
};
use tokio::sync::Mutex;

/// Cache key for one channel's history: the conversation scope plus the page
/// size the history was fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub scope: ChannelScope,
    pub page_size: u32,
}

impl HistoryKey {
    pub fn new(scope: ChannelScope, page_size: u32) -> Self {
        Self { scope, page_size }
    }
}

/// The fetched pages of one channel, ordered by page number.
#[derive(Debug, Default)]
pub struct ChannelHistory {
    pages: Vec<MessagePage>,
}

impl ChannelHistory {
    /// Stores a fetched page, replacing any previous fetch of the same page
    /// number. Last writer wins at the page level.
    pub fn record_page(&mut self, page: MessagePage) {
        match self.pages.iter_mut().find(|held| held.page == page.page) {
            Some(held) => *held = page,
            None => {
                self.pages.push(page);
                self.pages.sort_by_key(|held| held.page);
            }
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.pages
            .iter()
            .any(|page| page.items.iter().any(|item| item.id == *id))
    }

    /// Inserts a newly confirmed message without duplication. Confirmation
    /// can arrive twice, once via acknowledgement and once via broadcast, so
    /// the merge must be idempotent under either ordering: if the id is
    /// already cached the call is a no-op and returns false. Otherwise the
    /// message joins the first page and that page's total grows by one. With
    /// no page fetched yet, a first page is seeded so the message is kept.
    pub fn merge_confirmed(&mut self, message: Message, page_size: u32) -> bool {
        if self.contains(&message.id) {
            return false;
        }

        match self.pages.first_mut() {
            Some(first) => {
                first.items.push(message);
                first.total += 1;
            }
            None => self.pages.push(MessagePage {
                items: vec![message],
                page: 1,
                page_size,
                total: 1,
            }),
        }
        true
    }

    pub fn items(&self) -> impl Iterator<Item = &Message> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Next page to request, judged from the deepest fetched page's
    /// pagination metadata.
    pub fn next_page(&self) -> Option<u32> {
        self.pages.last().and_then(MessagePage::next_page)
    }
}

/// Shared store of fetched history, keyed by (server, channel, page size).
/// Any holder of the `Arc` may record pages or merge confirmed messages;
/// merges are idempotent, so concurrent writers race harmlessly to the same
/// end state.
#[derive(Debug, Default)]
pub struct HistoryStore {
    inner: Mutex<HashMap<HistoryKey, ChannelHistory>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_page(&self, key: &HistoryKey, page: MessagePage) {
        let mut guard = self.inner.lock().await;
        guard.entry(key.clone()).or_default().record_page(page);
    }

    pub async fn merge_confirmed(&self, key: &HistoryKey, message: Message) -> bool {
        let mut guard = self.inner.lock().await;
        guard
            .entry(key.clone())
            .or_default()
            .merge_confirmed(message, key.page_size)
    }

    pub async fn contains(&self, key: &HistoryKey, id: &MessageId) -> bool {
        let guard = self.inner.lock().await;
        guard
            .get(key)
            .map(|history| history.contains(id))
            .unwrap_or(false)
    }

    pub async fn snapshot(&self, key: &HistoryKey) -> Vec<Message> {
        let guard = self.inner.lock().await;
        guard
            .get(key)
            .map(|history| history.items().cloned().collect())
            .unwrap_or_default()
    }

    /// Page number for the next history fetch; `1` when nothing is cached.
    pub async fn next_page(&self, key: &HistoryKey) -> Option<u32> {
        let guard = self.inner.lock().await;
        match guard.get(key) {
            Some(history) if !history.is_empty() => history.next_page(),
            _ => Some(1),
        }
    }

    pub async fn clear(&self, key: &HistoryKey) {
        let mut guard = self.inner.lock().await;
        guard.remove(key);
    }
}
