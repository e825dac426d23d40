//! Chat session controller.
//!
//! A [`ChatSession`] owns everything one chat surface needs: the resolved
//! API profile, the acting user, the current conversation id and where
//! history lives. Sessions are independent; several can coexist.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::conversation::{ConversationBuilder, PageContext, PriorMessage};
use crate::config::{ApiProfile, Config, ResolvedApi};
use crate::history::{
    GuestHistory, HistoryStore, JsonlHistoryStore, LocalStore, StoredMessage, new_conversation_id,
};
use crate::providers::{ChatCompletionsClient, ChatCompletionsConfig, StreamEvent};

/// Messages loaded when reopening a conversation.
pub const CONVERSATION_LOAD_LIMIT: usize = 50;

/// Progress of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A delta arrived; `running` is the full text so far.
    Chunk { delta: String, running: String },
    /// The stream finished. Terminal.
    Complete { text: String },
    /// The request failed before any delta. Terminal.
    Error { message: String },
    /// A message could not be saved; the turn carries on.
    PersistenceFailed { role: String, message: String },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Complete { .. } | TurnEvent::Error { .. })
    }
}

pub type TurnEventTx = mpsc::UnboundedSender<TurnEvent>;
pub type TurnEventRx = mpsc::UnboundedReceiver<TurnEvent>;

pub fn create_event_channel() -> (TurnEventTx, TurnEventRx) {
    mpsc::unbounded_channel()
}

/// Where a session keeps its history.
#[derive(Clone)]
pub enum Storage {
    /// Signed-in history, one store shared by many conversations.
    Remote(Arc<dyn HistoryStore>),
    /// The single local conversation of a guest.
    Guest(GuestHistory),
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Storage::Remote(_) => f.write_str("Storage::Remote"),
            Storage::Guest(_) => f.write_str("Storage::Guest"),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct ChatSession {
    api_name: String,
    profile: ApiProfile,
    user: Option<String>,
    conversation_id: String,
    storage: Storage,
    local: LocalStore,
    history_limit: usize,
    in_flight: AtomicBool,
}

impl ChatSession {
    /// Opens a session with the default storage for the configured user.
    pub fn open(config: &Config, requested: Option<&str>) -> Result<Self> {
        let local = LocalStore::open_default();
        let storage = if config.is_guest() {
            Storage::Guest(GuestHistory::new(local.clone()))
        } else {
            Storage::Remote(Arc::new(JsonlHistoryStore::open_default(config.user.clone())))
        };
        Self::new(config, storage, local, requested)
    }

    /// Creates a session, resolving the API from `requested`, the saved
    /// selection, then the config defaults.
    ///
    /// A saved selection that no longer resolves is forgotten.
    pub fn new(
        config: &Config,
        storage: Storage,
        local: LocalStore,
        requested: Option<&str>,
    ) -> Result<Self> {
        let user = config.user.clone().filter(|u| !u.trim().is_empty());
        let selection_key = LocalStore::selected_api_key(user.as_deref());
        let saved = local.get_string(&selection_key);

        let ResolvedApi { name, profile } = config.resolve_api(requested.or(saved.as_deref()))?;
        if let Some(requested) = requested
            && requested != name
        {
            bail!("API '{requested}' is not available");
        }
        if let Some(saved) = &saved
            && requested.is_none()
            && saved != &name
        {
            tracing::debug!(saved = %saved, resolved = %name, "clearing stale API selection");
            local.remove(&selection_key);
        }

        Ok(Self {
            api_name: name,
            profile,
            user,
            conversation_id: new_conversation_id(),
            storage,
            local,
            history_limit: config.history_limit,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.storage, Storage::Guest(_))
    }

    pub fn greeting(&self) -> &str {
        self.profile.greeting()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one chat turn, reporting progress on `events`.
    ///
    /// Provider failures are reported as [`TurnEvent::Error`], not as an
    /// `Err`. A dropped receiver ends the turn quietly.
    ///
    /// # Errors
    /// Returns an error only when the turn is rejected: empty text, or
    /// another turn of this session still in flight.
    pub async fn send_message(
        &self,
        text: &str,
        context: Option<&PageContext>,
        events: &TurnEventTx,
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Message cannot be empty");
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            bail!("A response is already in progress");
        }
        let _guard = InFlightGuard(&self.in_flight);

        tracing::info!(api = %self.api_name, conversation = %self.conversation_id, "turn started");

        // Prior history is read before the new message is stored so it is
        // not sent twice.
        let prior = self.prior_messages().await;
        self.persist("user", text, context, events).await;

        let messages = ConversationBuilder::from_profile(&self.profile, self.user.as_deref())
            .build(&prior, text, context);

        let client = match self
            .profile
            .validate(&self.api_name)
            .and_then(|()| ChatCompletionsConfig::from_profile(&self.profile))
        {
            Ok(config) => ChatCompletionsClient::new(config),
            Err(e) => {
                emit(events, TurnEvent::Error { message: format!("{e:#}") });
                return Ok(());
            }
        };

        let mut stream = match client.send_messages_stream(&messages).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "chat completion failed");
                emit(events, TurnEvent::Error { message: e.to_string() });
                return Ok(());
            }
        };

        let mut running = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::Delta(delta)) => {
                    running.push_str(&delta);
                    if events.is_closed() {
                        tracing::debug!("turn abandoned by receiver");
                        return Ok(());
                    }
                    emit(events, TurnEvent::Chunk { delta, running: running.clone() });
                }
                Ok(StreamEvent::Completed(end)) => {
                    tracing::debug!(?end, "stream completed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stream failed");
                    emit(events, TurnEvent::Error { message: e.to_string() });
                    return Ok(());
                }
            }
        }

        tracing::info!(chars = running.len(), "turn finished");
        emit(events, TurnEvent::Complete { text: running.clone() });
        if !running.trim().is_empty() {
            self.persist("assistant", &running, context, events).await;
        }
        Ok(())
    }

    /// Starts a fresh conversation and returns the greeting.
    pub fn start_new_chat(&mut self) -> String {
        self.conversation_id = new_conversation_id();
        if let Storage::Guest(guest) = &self.storage {
            guest.clear();
        }
        self.greeting().to_string()
    }

    /// Reopens the latest conversation for the active API.
    ///
    /// Starts a new conversation when there is none. The returned messages
    /// are empty in that case and the caller shows the greeting.
    pub fn load_last_conversation(&mut self) -> Result<Vec<StoredMessage>> {
        let store = match &self.storage {
            Storage::Guest(guest) => {
                return Ok(guest.recent(CONVERSATION_LOAD_LIMIT).iter().map(guest_to_stored).collect());
            }
            Storage::Remote(store) => Arc::clone(store),
        };

        let latest = store
            .list_conversations(1, Some(&self.api_name))
            .context("Failed to list conversations")?;
        match latest.into_iter().next() {
            Some(summary) => self.load_conversation(&summary.conversation_id),
            None => {
                self.start_new_chat();
                Ok(Vec::new())
            }
        }
    }

    /// Switches to `conversation_id` and returns up to 50 of its messages.
    pub fn load_conversation(&mut self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let Storage::Remote(store) = &self.storage else {
            bail!("Guest sessions keep a single local conversation");
        };
        let messages = store
            .conversation_history(conversation_id, CONVERSATION_LOAD_LIMIT)
            .with_context(|| format!("Failed to load conversation {conversation_id}"))?;
        self.conversation_id = conversation_id.to_string();
        Ok(messages)
    }

    /// Continues a conversation picked from history.
    ///
    /// When its latest message was answered by another API, that API
    /// becomes the active one. An API that is no longer available is
    /// skipped with a warning and the current one stays.
    pub fn resume_conversation(
        &mut self,
        config: &Config,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>> {
        let messages = self.load_conversation(conversation_id)?;
        let used = messages.iter().rev().find_map(|m| m.api_used.clone());
        if let Some(api) = used
            && api != self.api_name
            && let Err(e) = self.select_api(config, &api)
        {
            tracing::warn!(api = %api, error = %e, "keeping current API for resumed conversation");
        }
        Ok(messages)
    }

    /// Switches API, remembers the choice, and reopens that API's latest
    /// conversation.
    pub fn switch_api(&mut self, config: &Config, name: &str) -> Result<Vec<StoredMessage>> {
        self.select_api(config, name)?;
        self.load_last_conversation()
    }

    fn select_api(&mut self, config: &Config, name: &str) -> Result<()> {
        let profile = config
            .available_apis()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p.clone())
            .with_context(|| format!("API '{name}' is not available"))?;

        self.api_name = name.to_string();
        self.profile = profile;
        self.local
            .set(&LocalStore::selected_api_key(self.user.as_deref()), &name);
        Ok(())
    }

    // History I/O is blocking file access; it runs off the async workers.
    async fn prior_messages(&self) -> Vec<PriorMessage> {
        let storage = self.storage.clone();
        let conversation_id = self.conversation_id.clone();
        let limit = self.history_limit;

        let loaded = tokio::task::spawn_blocking(move || match &storage {
            Storage::Remote(store) => store
                .conversation_history(&conversation_id, limit)
                .map(|messages| messages.iter().map(PriorMessage::from).collect()),
            Storage::Guest(guest) => Ok(guest.recent(limit).iter().map(PriorMessage::from).collect()),
        })
        .await
        .context("history task failed")
        .and_then(|result| result);

        loaded.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load history; continuing without it");
            Vec::new()
        })
    }

    async fn persist(
        &self,
        role: &str,
        content: &str,
        context: Option<&PageContext>,
        events: &TurnEventTx,
    ) {
        let storage = self.storage.clone();
        let conversation_id = self.conversation_id.clone();
        let api_name = self.api_name.clone();
        let owned_role = role.to_string();
        let content = content.to_string();
        let context = context.cloned();

        let saved = tokio::task::spawn_blocking(move || match &storage {
            Storage::Remote(store) => store.save_message(
                &conversation_id,
                &owned_role,
                &content,
                context.as_ref(),
                Some(&api_name),
            ),
            Storage::Guest(guest) => {
                guest.append(&owned_role, &content);
                Ok(())
            }
        })
        .await
        .context("history task failed")
        .and_then(|result| result);

        if let Err(e) = saved {
            tracing::warn!(role, error = %e, "failed to save message");
            emit(
                events,
                TurnEvent::PersistenceFailed {
                    role: role.to_string(),
                    message: format!("{e:#}"),
                },
            );
        }
    }
}

fn guest_to_stored(entry: &crate::history::GuestEntry) -> StoredMessage {
    StoredMessage {
        role: entry.role.clone(),
        content: entry.content.clone(),
        context: None,
        api_used: None,
        created_at: entry.timestamp,
    }
}

fn emit(events: &TurnEventTx, event: TurnEvent) {
    // A closed channel means the caller stopped listening.
    let _ = events.send(event);
}
