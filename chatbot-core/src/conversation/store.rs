//! In-memory conversation store

use tracing::{debug, info, warn};

use super::message::{
    Conversation, ConversationId, Message, Role, DEFAULT_TITLE, WELCOME_TITLE,
};
use crate::stream::{
    ActiveStream, FlushPolicy, ReconcileEvent, ReconcileEventKind, StreamId, StreamOutcome,
    StreamState, StreamTarget, StreamTicket, FALLBACK_ERROR_TEXT,
};

/// Result of applying a [`ReconcileEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event changed the conversation
    Applied,
    /// The event belongs to a stream that is no longer active
    Stale,
    /// The target conversation or its trailing assistant message is missing
    Missing,
}

/// Ordered conversations plus the active selection
///
/// The store is owned by a single task; reconciler tasks never touch it
/// directly and only send events. Fragments are held per stream and released
/// into the transcript according to the store's [`FlushPolicy`].
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    selected: Option<ConversationId>,
    next_stream_id: u64,
    policy: FlushPolicy,
}

impl ConversationStore {
    /// Store holding the welcome conversation, selected
    pub fn new() -> Self {
        let mut store = Self::empty();
        store.reset();
        store
    }

    /// Store with no conversations and no selection
    pub fn empty() -> Self {
        Self {
            conversations: Vec::new(),
            selected: None,
            next_stream_id: 1,
            policy: FlushPolicy::default(),
        }
    }

    /// Policy applied to streams started from now on
    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.policy
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    pub fn selected_id(&self) -> Option<&ConversationId> {
        self.selected.as_ref()
    }

    /// Position of the selected conversation in [`Self::conversations`]
    pub fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_ref()?;
        self.conversations.iter().position(|c| &c.id == selected)
    }

    /// The selected conversation, if it exists
    pub fn active(&self) -> Option<&Conversation> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    /// Select a conversation; unknown ids leave the selection unchanged
    pub fn select(&mut self, id: &ConversationId) -> bool {
        if self.get(id).is_none() {
            debug!(conversation = %id, "Ignoring selection of unknown conversation");
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Select by sidebar position
    pub fn select_index(&mut self, index: usize) -> bool {
        match self.conversations.get(index) {
            Some(conversation) => {
                self.selected = Some(conversation.id.clone());
                true
            }
            None => false,
        }
    }

    /// Move the selection one conversation forward or back, wrapping around
    pub fn cycle_selection(&mut self, forward: bool) {
        let len = self.conversations.len();
        if len == 0 {
            return;
        }
        let next = match self.selected_index() {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        self.select_index(next);
    }

    /// Append an empty "New Chat" conversation and select it
    pub fn create_conversation(&mut self) -> ConversationId {
        self.push_and_select(Conversation::new())
    }

    /// Add an existing conversation (e.g. one restored by the caller) and
    /// select it
    pub fn insert(&mut self, mut conversation: Conversation) -> ConversationId {
        if let StreamState::Streaming(active) = &conversation.stream {
            active.cancel.cancel();
        }
        conversation.stream = StreamState::Idle;
        self.push_and_select(conversation)
    }

    fn push_and_select(&mut self, conversation: Conversation) -> ConversationId {
        let id = conversation.id.clone();
        info!(conversation = %id, "Created conversation");
        self.conversations.push(conversation);
        self.selected = Some(id.clone());
        id
    }

    /// Whether `id` has a reply streaming in
    pub fn is_streaming(&self, id: &ConversationId) -> bool {
        self.get(id).is_some_and(Conversation::is_streaming)
    }

    /// Whether any conversation has a reply streaming in
    pub fn any_streaming(&self) -> bool {
        self.conversations.iter().any(Conversation::is_streaming)
    }

    /// Submit `content` as a user message to the active conversation
    ///
    /// Creates and selects a greeted conversation when none is active,
    /// cancels any stream still writing into the target, appends the user
    /// message and an empty assistant placeholder, and returns the ticket the
    /// reconciler needs. Blank input is rejected.
    pub fn begin_send(&mut self, content: impl Into<String>) -> crate::Result<StreamTicket> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(crate::Error::Validation("message is empty".to_string()));
        }

        let existing = self.active().map(|c| c.id.clone());
        let conversation_id = match existing {
            Some(id) => id,
            None => self.push_and_select(Conversation::greeted(DEFAULT_TITLE)),
        };

        self.cancel_stream(&conversation_id);

        let stream_id = StreamId(self.next_stream_id);
        self.next_stream_id += 1;
        let policy = self.policy;

        let conversation = self
            .get_mut(&conversation_id)
            .ok_or_else(|| crate::Error::NotFound(format!("conversation {}", conversation_id)))?;

        conversation.push_user_message(content);
        let history = conversation.messages.clone();
        conversation.messages.push(Message::assistant(String::new()));

        let active = ActiveStream::new(stream_id, policy);
        let cancel = active.cancel.clone();
        conversation.stream = StreamState::Streaming(active);

        debug!(conversation = %conversation_id, stream = %stream_id, "Inserted assistant placeholder");

        Ok(StreamTicket {
            target: StreamTarget::new(conversation_id, stream_id),
            history,
            cancel,
        })
    }

    /// Close the stream writing into `id`, if any
    ///
    /// Held text is flushed into the reply first. A placeholder that never
    /// received text is removed; partial text stays.
    pub fn cancel_stream(&mut self, id: &ConversationId) -> bool {
        let Some(conversation) = self.get_mut(id) else {
            return false;
        };
        let StreamState::Streaming(mut active) = std::mem::take(&mut conversation.stream) else {
            return false;
        };

        active.cancel.cancel();
        if let Some(rest) = active.pending.finish() {
            match conversation.messages.last_mut() {
                Some(message) if message.role == Role::Assistant => {
                    message.content.push_str(&rest)
                }
                _ => warn!(conversation = %id, "Dropping held text without a trailing reply"),
            }
        }
        if !active.received {
            let placeholder = conversation
                .messages
                .last()
                .is_some_and(|m| m.role == Role::Assistant && m.content.is_empty());
            if placeholder {
                conversation.messages.pop();
            }
        }
        conversation.last_outcome = Some(StreamOutcome::Cancelled);
        info!(conversation = %id, stream = %active.id, "Cancelled in-flight stream");
        true
    }

    /// Cancel every in-flight stream
    pub fn cancel_all(&mut self) {
        let streaming: Vec<ConversationId> = self
            .conversations
            .iter()
            .filter(|c| c.is_streaming())
            .map(|c| c.id.clone())
            .collect();
        for id in streaming {
            self.cancel_stream(&id);
        }
    }

    /// Cancel all streams and return to the single welcome conversation
    pub fn reset(&mut self) {
        self.cancel_all();
        self.conversations.clear();
        self.selected = None;
        self.push_and_select(Conversation::greeted(WELCOME_TITLE));
    }

    /// Fold one reconciler event into the target conversation
    pub fn apply(&mut self, event: ReconcileEvent) -> ApplyOutcome {
        let ReconcileEvent { target, kind } = event;

        let Some(conversation) = self.get_mut(&target.conversation_id) else {
            warn!(conversation = %target.conversation_id, "Stream event for unknown conversation");
            return ApplyOutcome::Missing;
        };

        let active = match &mut conversation.stream {
            StreamState::Streaming(active) if active.id == target.stream_id => active,
            _ => {
                debug!(stream = %target.stream_id, "Discarding event from inactive stream");
                return ApplyOutcome::Stale;
            }
        };

        let trailing = match conversation.messages.last_mut() {
            Some(message) if message.role == Role::Assistant => message,
            _ => {
                warn!(
                    conversation = %target.conversation_id,
                    "Streaming conversation has no trailing assistant message"
                );
                return ApplyOutcome::Missing;
            }
        };

        match kind {
            ReconcileEventKind::Fragment(text) => {
                if text.is_empty() {
                    return ApplyOutcome::Applied;
                }
                active.received = true;
                if let Some(ready) = active.pending.push(&text) {
                    trailing.content.push_str(&ready);
                }
            }
            ReconcileEventKind::Completed => {
                if let Some(rest) = active.pending.finish() {
                    trailing.content.push_str(&rest);
                }
                conversation.stream = StreamState::Idle;
                conversation.last_outcome = Some(StreamOutcome::Completed);
                debug!(stream = %target.stream_id, "Stream completed");
            }
            ReconcileEventKind::Failed(reason) => {
                if let Some(rest) = active.pending.finish() {
                    trailing.content.push_str(&rest);
                }
                let received = active.received;
                if !received {
                    trailing.content = FALLBACK_ERROR_TEXT.to_string();
                }
                conversation.stream = StreamState::Idle;
                conversation.last_outcome = Some(StreamOutcome::Errored);
                warn!(stream = %target.stream_id, partial = received, "Stream errored: {}", reason);
            }
        }
        ApplyOutcome::Applied
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
