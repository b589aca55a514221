//! Single owner of the conversation store
//!
//! The controller is what a UI loop holds: it starts reconciler tasks on
//! send and applies their events in arrival order, either by draining the
//! channel between frames ([`ChatController::pump`]) or by awaiting it
//! ([`ChatController::next_event`]).

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::conversation::{ApplyOutcome, ConversationId, ConversationStore};
use crate::stream::{
    ChatTransport, FlushPolicy, ReconcileEvent, ReconcileReceiver, Reconciler, StreamTarget,
};

pub struct ChatController {
    store: ConversationStore,
    reconciler: Reconciler,
    events: ReconcileReceiver,
    credential: Option<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatController {
    /// Controller over a fresh store holding the welcome conversation
    pub fn new(transport: Arc<dyn ChatTransport>, policy: FlushPolicy) -> Self {
        Self::with_store(ConversationStore::new(), transport, policy)
    }

    pub fn with_store(
        store: ConversationStore,
        transport: Arc<dyn ChatTransport>,
        policy: FlushPolicy,
    ) -> Self {
        let (reconciler, events) = Reconciler::new(transport);
        Self {
            store: store.with_flush_policy(policy),
            reconciler,
            events,
            credential: None,
            tasks: Vec::new(),
        }
    }

    /// Bearer credential attached to subsequent sends
    pub fn set_credential(&mut self, credential: Option<String>) {
        self.credential = credential;
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn transport_name(&self) -> &'static str {
        self.reconciler.transport_name()
    }

    /// Send `content` to the active conversation and start streaming the reply
    pub fn send(&mut self, content: impl Into<String>) -> crate::Result<StreamTarget> {
        let ticket = self.store.begin_send(content)?;
        let target = ticket.target.clone();

        self.tasks.retain(|task| !task.is_finished());
        self.tasks
            .push(self.reconciler.spawn(ticket, self.credential.clone()));

        Ok(target)
    }

    /// Apply every event that has already arrived; returns how many changed
    /// the store
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            if self.store.apply(event) == ApplyOutcome::Applied {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next event and apply it
    pub async fn next_event(&mut self) -> Option<(ReconcileEvent, ApplyOutcome)> {
        let event = self.events.recv().await?;
        let outcome = self.store.apply(event.clone());
        Some((event, outcome))
    }

    /// Apply events until `id` has no stream in flight
    pub async fn wait_until_idle(&mut self, id: &ConversationId) {
        while self.store.is_streaming(id) {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    /// Drop the credential and return the store to its initial state
    pub fn logout(&mut self) {
        self.credential = None;
        self.store.reset();
        debug!("Controller reset after logout");
    }

    /// Cancel all in-flight streams
    pub fn shutdown(&mut self) {
        self.store.cancel_all();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, Message, Role, GREETING};
    use crate::stream::testing::{Script, ScriptedTransport};
    use crate::stream::{StreamOutcome, TransportEvent, FALLBACK_ERROR_TEXT};

    fn controller(transport: &ScriptedTransport, policy: FlushPolicy) -> ChatController {
        ChatController::new(Arc::new(transport.clone()), policy)
    }

    fn reply(controller: &ChatController, target: &StreamTarget) -> String {
        controller
            .store()
            .get(&target.conversation_id)
            .and_then(|c| c.last_message())
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn transcript(controller: &ChatController, id: &ConversationId) -> Vec<(Role, String)> {
        controller
            .store()
            .get(id)
            .map(|c| {
                c.messages
                    .iter()
                    .map(|m| (m.role, m.content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn turns(expected: &[(Role, &str)]) -> Vec<(Role, String)> {
        expected
            .iter()
            .map(|(role, content)| (*role, content.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_fragments_become_reply() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::fragments(&[
            "4",
            " is",
            " the answer.",
        ])]);

        let mut conversation = Conversation::new();
        conversation.messages.push(Message::assistant("Hi"));
        let mut store = ConversationStore::empty();
        store.insert(conversation);

        let mut controller = ChatController::with_store(
            store,
            Arc::new(transport.clone()),
            FlushPolicy::WordBoundary,
        );
        controller.set_credential(Some("tok".to_string()));

        let target = controller.send("2+2?").unwrap();
        controller.wait_until_idle(&target.conversation_id).await;

        assert_eq!(reply(&controller, &target), "4 is the answer.");
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages,
            vec![Message::assistant("Hi"), Message::user("2+2?")]
        );
        assert_eq!(requests[0].credential.as_deref(), Some("tok"));
        assert_eq!(
            controller
                .store()
                .get(&target.conversation_id)
                .unwrap()
                .last_outcome(),
            Some(StreamOutcome::Completed)
        );
    }

    #[tokio::test]
    async fn test_concatenation_holds_for_both_policies() {
        let parts = ["Stre", "aming", " wor", "ks\n", "fine", ".", "", "!"];
        for policy in [FlushPolicy::EveryFragment, FlushPolicy::WordBoundary] {
            let transport = ScriptedTransport::new(vec![ScriptedTransport::fragments(&parts)]);
            let mut controller = controller(&transport, policy);

            let target = controller.send("go").unwrap();
            controller.wait_until_idle(&target.conversation_id).await;
            assert_eq!(reply(&controller, &target), parts.concat());
        }
    }

    #[tokio::test]
    async fn test_refused_connection_shows_fallback() {
        let transport =
            ScriptedTransport::new(vec![Script::Refuse("connection refused".to_string())]);
        let mut controller = controller(&transport, FlushPolicy::EveryFragment);

        let target = controller.send("hello").unwrap();
        controller.wait_until_idle(&target.conversation_id).await;

        assert_eq!(reply(&controller, &target), FALLBACK_ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_error_after_partial_keeps_partial() {
        let transport = ScriptedTransport::new(vec![Script::Events(vec![
            TransportEvent::Fragment("Half an".to_string()),
            TransportEvent::Fragment("swer".to_string()),
            TransportEvent::Errored("reset by peer".to_string()),
        ])]);
        let mut controller = controller(&transport, FlushPolicy::WordBoundary);

        let target = controller.send("hello").unwrap();
        controller.wait_until_idle(&target.conversation_id).await;

        assert_eq!(reply(&controller, &target), "Half answer");
        assert_eq!(
            controller
                .store()
                .get(&target.conversation_id)
                .unwrap()
                .last_outcome(),
            Some(StreamOutcome::Errored)
        );
    }

    #[tokio::test]
    async fn test_second_send_supersedes_hanging_stream() {
        let transport = ScriptedTransport::new(vec![
            Script::Hang(vec![TransportEvent::Fragment("partial".to_string())]),
            ScriptedTransport::fragments(&["second ", "reply"]),
        ]);
        let mut controller = controller(&transport, FlushPolicy::EveryFragment);

        let first = controller.send("first").unwrap();
        let (event, outcome) = controller.next_event().await.unwrap();
        assert_eq!(event.target, first);
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(transport.closed_streams(), 0);

        let second = controller.send("second").unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);
        controller.wait_until_idle(&second.conversation_id).await;

        assert_eq!(
            transcript(&controller, &second.conversation_id),
            turns(&[
                (Role::Assistant, GREETING),
                (Role::User, "first"),
                (Role::Assistant, "partial"),
                (Role::User, "second"),
                (Role::Assistant, "second reply"),
            ])
        );
        assert_eq!(transport.closed_streams(), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_superseded_stream_keeps_held_text() {
        let transport = ScriptedTransport::new(vec![
            Script::Hang(vec![TransportEvent::Fragment("p".to_string())]),
            ScriptedTransport::fragments(&["ok"]),
        ]);
        let mut controller = controller(&transport, FlushPolicy::WordBoundary);

        let first = controller.send("a").unwrap();
        let (event, outcome) = controller.next_event().await.unwrap();
        assert_eq!(event, ReconcileEvent::fragment(first.clone(), "p"));
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(reply(&controller, &first), "");

        let second = controller.send("b").unwrap();
        controller.wait_until_idle(&second.conversation_id).await;

        assert_eq!(
            transcript(&controller, &second.conversation_id),
            turns(&[
                (Role::Assistant, GREETING),
                (Role::User, "a"),
                (Role::Assistant, "p"),
                (Role::User, "b"),
                (Role::Assistant, "ok"),
            ])
        );
        assert_eq!(transport.closed_streams(), 1);
    }

    #[tokio::test]
    async fn test_pump_applies_buffered_events() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::fragments(&["a", "b"])]);
        let mut controller = controller(&transport, FlushPolicy::EveryFragment);

        let target = controller.send("x").unwrap();
        let mut applied = 0;
        while controller.store().is_streaming(&target.conversation_id) {
            applied += controller.pump();
            tokio::task::yield_now().await;
        }
        assert_eq!(applied, 3);
        assert_eq!(reply(&controller, &target), "ab");
    }

    #[tokio::test]
    async fn test_logout_resets_store_and_credential() {
        let transport = ScriptedTransport::new(vec![Script::Hang(vec![])]);
        let mut controller = controller(&transport, FlushPolicy::EveryFragment);
        controller.set_credential(Some("tok".to_string()));

        let target = controller.send("x").unwrap();
        controller.store_mut().create_conversation();
        controller.logout();

        assert!(!controller.is_authenticated());
        assert_eq!(controller.store().len(), 1);
        assert!(controller.store().get(&target.conversation_id).is_none());
        assert!(!controller.store().any_streaming());
    }
}
