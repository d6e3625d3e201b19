use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{ChannelScope, TempId, UserId},
    protocol::{
        AckEnvelope, AckOutcome, ChannelSummary, CreateMessage, MessageBroadcast,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod cache;
pub mod rest;
pub mod socket;
pub mod timeline;

pub use cache::{HistoryKey, HistoryStore};
pub use rest::HistoryApi;
pub use socket::WsChannelTransport;
pub use timeline::{
    merge_timeline, MessageStatus, PendingLedger, TimelineId, TimelineMessage,
};

/// Author label used when neither the session nor the caller supplies one.
pub const UNKNOWN_AUTHOR: &str = "Unknown user";

const EVENT_BUFFER: usize = 1024;

/// The active user's identity as supplied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
    pub display_name: String,
}

pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<SessionUser>;
}

/// No session: sent messages fall back to the [`UNKNOWN_AUTHOR`] label.
pub struct MissingSessionProvider;

impl SessionProvider for MissingSessionProvider {
    fn current_user(&self) -> Option<SessionUser> {
        None
    }
}

pub struct StaticSession(pub SessionUser);

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<SessionUser> {
        Some(self.0.clone())
    }
}

/// Socket-side collaborator of a channel session: join/leave the scope,
/// emit `message:create` and await its acknowledgement, and fan out
/// `message:created` broadcasts.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn join(&self, scope: &ChannelScope) -> Result<()>;
    async fn leave(&self, scope: &ChannelScope) -> Result<()>;
    async fn create_message(&self, request: CreateMessage) -> Result<AckEnvelope>;
    fn subscribe_broadcasts(&self) -> broadcast::Receiver<MessageBroadcast>;
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Cache or ledger changed; re-read [`ChannelSession::timeline`].
    TimelineUpdated,
    Error(String),
}

struct SessionState {
    joined: bool,
    ledger: PendingLedger,
    broadcast_task: Option<JoinHandle<()>>,
}

/// Reconciliation engine for one channel page: merges cached history, the
/// pending ledger, and inbound broadcasts into the single displayed
/// timeline, and routes the three event kinds (local send, acknowledgement,
/// broadcast) so that every interleaving converges without duplicates.
///
/// The history store is shared; the ledger lives and dies with this session.
pub struct ChannelSession {
    scope: ChannelScope,
    key: HistoryKey,
    api: HistoryApi,
    history: Arc<HistoryStore>,
    transport: Arc<dyn ChannelTransport>,
    session: Arc<dyn SessionProvider>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChannelSession {
    pub fn new(
        scope: ChannelScope,
        page_size: u32,
        api: HistoryApi,
        history: Arc<HistoryStore>,
        transport: Arc<dyn ChannelTransport>,
        session: Arc<dyn SessionProvider>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            key: HistoryKey::new(scope.clone(), page_size),
            scope,
            api,
            history,
            transport,
            session,
            inner: Mutex::new(SessionState {
                joined: false,
                ledger: PendingLedger::new(),
                broadcast_task: None,
            }),
            events,
        })
    }

    pub fn scope(&self) -> &ChannelScope {
        &self.scope
    }

    /// Joins the channel, starts consuming broadcasts, and fetches the first
    /// history page.
    pub async fn open(self: &Arc<Self>) -> Result<()> {
        self.transport
            .join(&self.scope)
            .await
            .context("failed to join channel")?;

        let mut broadcasts = self.transport.subscribe_broadcasts();
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Ok(broadcast) = broadcasts.recv().await {
                client.apply_broadcast(broadcast).await;
            }
        });

        {
            let mut guard = self.inner.lock().await;
            guard.joined = true;
            if let Some(previous) = guard.broadcast_task.replace(task) {
                previous.abort();
            }
        }

        info!(
            server_id = %self.scope.server_id,
            channel_id = %self.scope.channel_id,
            "channel session opened"
        );

        self.refresh().await
    }

    /// Leaves the channel and stops listening. In-flight pending entries are
    /// abandoned with the ledger when the session is dropped.
    pub async fn close(&self) -> Result<()> {
        let task = {
            let mut guard = self.inner.lock().await;
            guard.joined = false;
            guard.broadcast_task.take()
        };
        if let Some(task) = task {
            task.abort();
        }

        self.transport
            .leave(&self.scope)
            .await
            .context("failed to leave channel")?;

        info!(
            server_id = %self.scope.server_id,
            channel_id = %self.scope.channel_id,
            "channel session closed"
        );
        Ok(())
    }

    pub async fn send(self: &Arc<Self>, draft: &str) -> Result<Option<TempId>> {
        self.send_as(draft, None).await
    }

    /// Submits the trimmed draft as an optimistic pending entry and emits
    /// `message:create` carrying its temporary id as the nonce. Returns
    /// `None` for an empty draft. Sending without an established membership
    /// is an error rather than a silent no-op.
    pub async fn send_as(
        self: &Arc<Self>,
        draft: &str,
        fallback_author: Option<&str>,
    ) -> Result<Option<TempId>> {
        let content = draft.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let (author_id, author_name) = resolve_author(self.session.as_ref(), fallback_author);

        let temp_id = {
            let mut guard = self.inner.lock().await;
            if !guard.joined {
                return Err(anyhow!(
                    "channel membership is not established; open the session before sending"
                ));
            }
            guard
                .ledger
                .create(content, author_id, author_name.clone(), Utc::now())
        };
        self.notify();

        let request = CreateMessage {
            content: content.to_string(),
            author_name,
            server_id: self.scope.server_id.clone(),
            channel_id: self.scope.channel_id.clone(),
            nonce: temp_id.clone(),
        };
        self.spawn_ack_task(temp_id.clone(), request);

        Ok(Some(temp_id))
    }

    /// Resubmits a failed entry under its original temporary id. Returns
    /// false when the id is unknown or the entry is not in the failed state.
    pub async fn retry(self: &Arc<Self>, temp_id: &TempId) -> Result<bool> {
        let request = {
            let mut guard = self.inner.lock().await;
            if !guard.joined {
                return Err(anyhow!(
                    "channel membership is not established; open the session before sending"
                ));
            }
            let Some(entry) = guard.ledger.reset_failed(temp_id) else {
                return Ok(false);
            };
            CreateMessage {
                content: entry.content.clone(),
                author_name: entry.author_name.clone(),
                server_id: self.scope.server_id.clone(),
                channel_id: self.scope.channel_id.clone(),
                nonce: entry.temp_id.clone(),
            }
        };
        self.notify();
        self.spawn_ack_task(temp_id.clone(), request);
        Ok(true)
    }

    /// Drops a failed entry the user chose not to resend.
    pub async fn dismiss(&self, temp_id: &TempId) -> bool {
        let removed = { self.inner.lock().await.ledger.remove(temp_id) };
        if removed {
            self.notify();
        }
        removed
    }

    /// Re-fetches the first history page.
    pub async fn refresh(&self) -> Result<()> {
        self.fetch_page(1).await
    }

    /// Fetches the next deeper page while `page * pageSize < total`. Returns
    /// false once all history has been fetched.
    pub async fn load_older(&self) -> Result<bool> {
        match self.history.next_page(&self.key).await {
            Some(page) => {
                self.fetch_page(page).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn channel_summary(&self) -> Result<ChannelSummary> {
        self.api.fetch_channel(&self.scope).await
    }

    /// The displayed sequence, recomputed from cache + ledger.
    pub async fn timeline(&self) -> Vec<TimelineMessage> {
        let history = self.history.snapshot(&self.key).await;
        let guard = self.inner.lock().await;
        merge_timeline(history.iter(), &guard.ledger)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn fetch_page(&self, page: u32) -> Result<()> {
        let fetched = self
            .api
            .list_messages(&self.scope, page, self.key.page_size)
            .await?;
        self.history.record_page(&self.key, fetched).await;
        self.notify();
        Ok(())
    }

    fn spawn_ack_task(self: &Arc<Self>, temp_id: TempId, request: CreateMessage) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            match client.transport.create_message(request).await {
                Ok(envelope) => client.apply_ack(&temp_id, envelope).await,
                Err(err) => client.apply_send_failure(&temp_id, err.to_string()).await,
            }
        });
    }

    /// Direct acknowledgement for a local send. On success the pending entry
    /// goes away and the confirmed message is merged idempotently, so a
    /// broadcast that already did either step is harmless.
    async fn apply_ack(&self, temp_id: &TempId, envelope: AckEnvelope) {
        match envelope.into_outcome() {
            AckOutcome::Delivered(message) => {
                {
                    let mut guard = self.inner.lock().await;
                    guard.ledger.remove(temp_id);
                }
                self.history.merge_confirmed(&self.key, message).await;
                self.notify();
            }
            AckOutcome::Rejected(error) => {
                warn!(nonce = %temp_id, "message send rejected: {}", error.message);
                let failed = { self.inner.lock().await.ledger.fail(temp_id, &error.message) };
                if failed {
                    let _ = self
                        .events
                        .send(SessionEvent::Error(error.message));
                    self.notify();
                }
            }
        }
    }

    async fn apply_send_failure(&self, temp_id: &TempId, reason: String) {
        warn!(nonce = %temp_id, "message send failed: {reason}");
        let failed = { self.inner.lock().await.ledger.fail(temp_id, &reason) };
        if failed {
            let _ = self.events.send(SessionEvent::Error(reason));
            self.notify();
        }
    }

    /// Inbound `message:created`. The id is matched against the confirmed
    /// cache and the nonce against the ledger; the pending entry is dropped
    /// whenever a match is found, so the sender's own broadcast arriving
    /// before the acknowledgement never renders twice.
    async fn apply_broadcast(&self, broadcast: MessageBroadcast) {
        let matched_pending = match &broadcast.nonce {
            Some(nonce) => self.inner.lock().await.ledger.remove(nonce),
            None => false,
        };

        let merged = self
            .history
            .merge_confirmed(&self.key, broadcast.message)
            .await;

        if matched_pending || merged {
            self.notify();
        }
    }

    fn notify(&self) {
        let _ = self.events.send(SessionEvent::TimelineUpdated);
    }
}

/// Author resolution for a local send: the session's display name, else the
/// caller-provided fallback, else the literal [`UNKNOWN_AUTHOR`].
fn resolve_author(
    session: &dyn SessionProvider,
    fallback: Option<&str>,
) -> (Option<UserId>, String) {
    match session.current_user() {
        Some(user) => {
            let trimmed = user.display_name.trim();
            let name = if trimmed.is_empty() {
                fallback_name(fallback)
            } else {
                trimmed.to_string()
            };
            (Some(user.user_id), name)
        }
        None => (None, fallback_name(fallback)),
    }
}

fn fallback_name(fallback: Option<&str>) -> String {
    fallback
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
