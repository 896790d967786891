//! The message synchronization engine.
//!
//! Maintains one ordered, duplicate-free view of a channel's messages by
//! merging three sources: the historical fetch, locally originated
//! optimistic sends, and live relay deliveries. Collaborators (chat API,
//! push relay, identity) are injected, so the engine carries no hidden
//! process-wide state and every instance has an explicit lifecycle.
//!
//! All shared state sits behind one mutex that is never held across an
//! `.await`: each update is a single non-preemptible step relative to
//! interleaved relay deliveries and send completions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use agora_net::api::ChatApi;
use agora_net::error::RelayError;
use agora_net::relay::{PushRelay, Subscription};

use agora_shared::identity::Author;
use agora_shared::protocol::{Message, OutgoingMessage, RelayEvent};
use agora_shared::types::{ChannelId, MessageId, MessageState};

use crate::events::ChatEvent;
use crate::identity::IdentitySource;

/// Capacity of the display-facing event channel.
const EVENT_BUFFER: usize = 64;

struct SubscriptionGuard {
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

struct EngineState {
    channel: ChannelId,
    /// Bumped on every channel switch and teardown. Completions tagged
    /// with an older epoch are discarded instead of applied.
    epoch: u64,
    /// Arrival-ordered message sequence for the active channel.
    messages: Vec<Message>,
    /// Temporary ids of locally sent, unacknowledged messages. The relay
    /// dedup rule relies on this set to suppress echoes of our own sends.
    pending: HashSet<MessageId>,
    drain: Option<SubscriptionGuard>,
}

impl EngineState {
    /// Apply a send acknowledgment: rewrite the optimistic entry to the
    /// permanent id, or drop it when a relay echo already delivered that
    /// id. Returns false when the entry is gone (a history reload
    /// replaced the sequence mid-flight).
    fn confirm_send(&mut self, temp_id: &MessageId, id: &MessageId) -> bool {
        self.pending.remove(temp_id);
        if self.messages.iter().any(|m| &m.id == id) {
            self.messages.retain(|m| &m.id != temp_id);
            true
        } else if let Some(entry) = self.messages.iter_mut().find(|m| &m.id == temp_id) {
            entry.id = id.clone();
            entry.state = MessageState::Confirmed;
            true
        } else {
            false
        }
    }

    /// Roll a failed send back out of the sequence and the pending set.
    fn roll_back_send(&mut self, temp_id: &MessageId) {
        self.pending.remove(temp_id);
        self.messages.retain(|m| &m.id != temp_id);
    }
}

/// Synchronization engine for one active channel.
///
/// Cheap to clone; all clones share the same state and collaborators.
pub struct ChatEngine<A, R, I> {
    api: Arc<A>,
    relay: Arc<R>,
    identity: Arc<I>,
    inner: Arc<Mutex<EngineState>>,
    events: mpsc::Sender<ChatEvent>,
}

impl<A, R, I> Clone for ChatEngine<A, R, I> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            relay: self.relay.clone(),
            identity: self.identity.clone(),
            inner: self.inner.clone(),
            events: self.events.clone(),
        }
    }
}

impl<A, R, I> ChatEngine<A, R, I>
where
    A: ChatApi,
    R: PushRelay,
    I: IdentitySource,
{
    /// Create an engine for `channel` and hand back the event stream the
    /// display layer should drain.
    pub fn new(
        api: Arc<A>,
        relay: Arc<R>,
        identity: Arc<I>,
        channel: ChannelId,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let engine = Self {
            api,
            relay,
            identity,
            inner: Arc::new(Mutex::new(EngineState {
                channel,
                epoch: 0,
                messages: Vec::new(),
                pending: HashSet::new(),
                drain: None,
            })),
            events: events_tx,
        };

        (engine, events_rx)
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Active channel.
    pub fn channel(&self) -> ChannelId {
        self.state().channel.clone()
    }

    /// Cloned view of the sequence for the display layer.
    pub fn snapshot(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    /// Number of locally sent, unacknowledged messages.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Load history and open the live subscription for the active channel.
    pub async fn start(&self) -> Result<(), RelayError> {
        self.load_history().await;
        self.subscribe().await
    }

    /// Fetch the channel history and replace the sequence with it.
    ///
    /// On failure the sequence is left as-is and
    /// [`ChatEvent::HistoryLoadFailed`] is emitted; there is no automatic
    /// retry. A completion that lands after a channel switch is discarded.
    pub async fn load_history(&self) {
        let (channel, epoch) = {
            let state = self.state();
            (state.channel.clone(), state.epoch)
        };

        match self.api.fetch_history(&channel).await {
            Ok(records) => {
                let local_author = self.identity.current_user().map(|p| Author::from(&p));
                let now = Utc::now();

                let count = {
                    let mut state = self.state();
                    if state.epoch != epoch {
                        return;
                    }
                    state.messages = records
                        .into_iter()
                        .map(|r| r.normalize(&channel, local_author.as_ref(), now))
                        .collect();
                    state.messages.len()
                };

                debug!(channel = %channel, count, "History loaded");
                let _ = self
                    .events
                    .send(ChatEvent::HistoryLoaded { channel, count })
                    .await;
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "History load failed");
                let _ = self
                    .events
                    .send(ChatEvent::HistoryLoadFailed {
                        channel,
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Open the single live subscription for the active channel and spawn
    /// the task that applies deliveries in arrival order.
    pub async fn subscribe(&self) -> Result<(), RelayError> {
        let (channel, epoch) = {
            let state = self.state();
            if state.drain.is_some() {
                return Err(RelayError::AlreadySubscribed(state.channel.to_topic()));
            }
            (state.channel.clone(), state.epoch)
        };

        let subscription = self.relay.subscribe(&channel.to_topic()).await?;

        let mut state = self.state();
        if state.epoch != epoch || state.drain.is_some() {
            // The channel moved on while the subscription was opening;
            // close it again rather than leak it.
            drop(state);
            subscription.close();
            return Ok(());
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::drain_subscription(
            self.inner.clone(),
            self.identity.clone(),
            self.events.clone(),
            channel.clone(),
            epoch,
            subscription,
            stop_rx,
        ));
        state.drain = Some(SubscriptionGuard {
            stop: Some(stop_tx),
            task,
        });

        debug!(channel = %channel, "Subscribed to channel topic");
        Ok(())
    }

    /// Optimistically send a message on the active channel.
    ///
    /// A no-op when `text` trims to nothing or nobody is signed in.
    /// Returns the temporary id assigned to the optimistic entry.
    pub async fn send(&self, text: &str, reply_to: Option<MessageId>) -> Option<MessageId> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let profile = self.identity.current_user()?;
        let author = Author::from(&profile);

        let temp_id = MessageId::temporary();
        let created_at = Utc::now();

        let (channel, epoch) = {
            let mut state = self.state();
            let channel = state.channel.clone();
            state.messages.push(Message {
                id: temp_id.clone(),
                channel: channel.clone(),
                author: author.clone(),
                text: text.to_string(),
                created_at,
                reply_to: reply_to.clone(),
                state: MessageState::Pending,
            });
            state.pending.insert(temp_id.clone());
            (channel, state.epoch)
        };

        let outgoing = OutgoingMessage {
            text: text.to_string(),
            channel: channel.clone(),
            author,
            reply_to_id: reply_to,
            timestamp: created_at,
            temporary_id: temp_id.clone(),
        };

        // A completion tagged with an older epoch belongs to an abandoned
        // channel and is discarded without touching the cleared state.
        match self.api.create_message(&outgoing).await {
            Ok(ack) => {
                let confirmed = {
                    let mut state = self.state();
                    state.epoch == epoch && state.confirm_send(&temp_id, &ack.id)
                };

                if confirmed {
                    debug!(channel = %channel, id = %ack.id, "Send confirmed");
                    let _ = self
                        .events
                        .send(ChatEvent::MessageConfirmed {
                            temporary_id: temp_id.clone(),
                            id: ack.id,
                        })
                        .await;
                }
                Some(temp_id)
            }
            Err(e) => {
                let rolled_back = {
                    let mut state = self.state();
                    if state.epoch == epoch {
                        state.roll_back_send(&temp_id);
                        true
                    } else {
                        false
                    }
                };

                if rolled_back {
                    warn!(channel = %channel, error = %e, "Send failed, rolled back optimistic entry");
                    let _ = self
                        .events
                        .send(ChatEvent::SendFailed {
                            channel,
                            text: text.to_string(),
                            reason: e.to_string(),
                        })
                        .await;
                }
                Some(temp_id)
            }
        }
    }

    /// Leave the current channel and move to `channel`: release the
    /// subscription, drop all local state, then load history and
    /// re-subscribe. In-flight work for the old channel is discarded via
    /// the epoch tag.
    pub async fn switch_channel(&self, channel: ChannelId) -> Result<(), RelayError> {
        self.release_subscription().await;

        {
            let mut state = self.state();
            state.epoch += 1;
            state.channel = channel.clone();
            state.messages.clear();
            state.pending.clear();
        }

        info!(channel = %channel, "Switched channel");
        self.start().await
    }

    /// Release the subscription and drop all local state.
    pub async fn teardown(&self) {
        self.release_subscription().await;

        let mut state = self.state();
        state.epoch += 1;
        state.messages.clear();
        state.pending.clear();
    }

    async fn release_subscription(&self) {
        let guard = self.state().drain.take();
        if let Some(mut guard) = guard {
            if let Some(stop) = guard.stop.take() {
                let _ = stop.send(());
            }
            let _ = guard.task.await;
        }
    }

    async fn drain_subscription(
        inner: Arc<Mutex<EngineState>>,
        identity: Arc<I>,
        events: mpsc::Sender<ChatEvent>,
        channel: ChannelId,
        epoch: u64,
        mut subscription: Subscription,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut stop => {
                    subscription.close();
                    return;
                }
                delivery = subscription.recv() => {
                    let Some(payload) = delivery else {
                        debug!(channel = %channel, "Relay stream ended");
                        let _ = events
                            .send(ChatEvent::SubscriptionLost {
                                channel: channel.clone(),
                            })
                            .await;
                        return;
                    };

                    if let Some(message) =
                        Self::apply_delivery(&inner, identity.as_ref(), &channel, epoch, &payload)
                    {
                        let _ = events.send(ChatEvent::MessageReceived(message)).await;
                    }
                }
            }
        }
    }

    /// Apply one relay delivery: discard echoes of unacknowledged local
    /// sends and anything already in the sequence, otherwise normalize and
    /// append as confirmed.
    fn apply_delivery(
        inner: &Mutex<EngineState>,
        identity: &I,
        channel: &ChannelId,
        epoch: u64,
        payload: &[u8],
    ) -> Option<Message> {
        let event: RelayEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!(channel = %channel, error = %e, "Ignoring undecodable relay payload");
                return None;
            }
        };
        let RelayEvent::NewMessage(record) = event;

        let local_author = identity.current_user().map(|p| Author::from(&p));
        let now = Utc::now();

        let mut state = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.epoch != epoch {
            // Delivery for an abandoned channel.
            return None;
        }
        if state.pending.contains(&record.id) {
            return None;
        }
        if let Some(ref temp) = record.temporary_id {
            if state.pending.contains(temp) {
                return None;
            }
        }
        if state.messages.iter().any(|m| m.id == record.id) {
            return None;
        }

        let message = record.normalize(channel, local_author.as_ref(), now);
        state.messages.push(message.clone());
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio::time::timeout;

    use agora_net::api::ChatApi;
    use agora_net::error::ApiError;
    use agora_net::relay::{PushRelay, Subscription};
    use agora_shared::identity::UserProfile;
    use agora_shared::protocol::{AuthorRecord, MessageAck, MessageRecord};

    use super::*;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    // --- Fake collaborators -------------------------------------------

    type SendCall = (
        OutgoingMessage,
        oneshot::Sender<Result<MessageAck, ApiError>>,
    );

    struct FakeApi {
        history: StdMutex<HashMap<String, Result<Vec<MessageRecord>, String>>>,
        send_calls: mpsc::UnboundedSender<SendCall>,
    }

    impl FakeApi {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SendCall>) {
            let (send_calls, calls_rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    history: StdMutex::new(HashMap::new()),
                    send_calls,
                }),
                calls_rx,
            )
        }

        fn set_history(&self, channel: &str, records: Vec<MessageRecord>) {
            self.history
                .lock()
                .unwrap()
                .insert(channel.to_string(), Ok(records));
        }

        fn fail_history(&self, channel: &str) {
            self.history
                .lock()
                .unwrap()
                .insert(channel.to_string(), Err("history unavailable".into()));
        }
    }

    impl ChatApi for FakeApi {
        async fn fetch_history(
            &self,
            channel: &ChannelId,
        ) -> Result<Vec<MessageRecord>, ApiError> {
            match self.history.lock().unwrap().get(channel.as_str()) {
                Some(Ok(records)) => Ok(records.clone()),
                Some(Err(reason)) => Err(ApiError::Transport(reason.clone())),
                None => Ok(Vec::new()),
            }
        }

        async fn create_message(
            &self,
            message: &OutgoingMessage,
        ) -> Result<MessageAck, ApiError> {
            let (respond, response) = oneshot::channel();
            self.send_calls
                .send((message.clone(), respond))
                .expect("test dropped the send-call receiver");
            response
                .await
                .unwrap_or_else(|_| Err(ApiError::Transport("response dropped".into())))
        }
    }

    struct FakeRelay {
        released_tx: mpsc::Sender<String>,
        topics: StdMutex<HashMap<String, mpsc::Sender<Vec<u8>>>>,
    }

    impl FakeRelay {
        fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
            let (released_tx, released_rx) = mpsc::channel(16);
            (
                Arc::new(Self {
                    released_tx,
                    topics: StdMutex::new(HashMap::new()),
                }),
                released_rx,
            )
        }

        /// Push a relay event at a topic. Returns false once the topic's
        /// subscription has been released.
        async fn deliver(&self, topic: &str, event: &RelayEvent) -> bool {
            let tx = self.topics.lock().unwrap().get(topic).cloned();
            match tx {
                Some(tx) => tx
                    .send(serde_json::to_vec(event).unwrap())
                    .await
                    .is_ok(),
                None => false,
            }
        }
    }

    impl PushRelay for FakeRelay {
        async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
            let (tx, rx) = mpsc::channel(16);
            self.topics.lock().unwrap().insert(topic.to_string(), tx);

            // Report the topic back once the handle is released.
            let (stop_tx, stop_rx) = oneshot::channel();
            let released_tx = self.released_tx.clone();
            let released_topic = topic.to_string();
            tokio::spawn(async move {
                let _ = stop_rx.await;
                let _ = released_tx.send(released_topic).await;
            });

            Ok(Subscription::new(topic.to_string(), rx, stop_tx))
        }
    }

    struct FakeIdentity(Option<UserProfile>);

    impl IdentitySource for FakeIdentity {
        fn current_user(&self) -> Option<UserProfile> {
            self.0.clone()
        }
    }

    // --- Helpers ------------------------------------------------------

    fn profile() -> UserProfile {
        UserProfile {
            id: "u1".into(),
            display_name: "Asha".into(),
            email: Some("asha@example.org".into()),
            avatar_url: "https://example.org/a.png".into(),
        }
    }

    fn fixed_time(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn record(id: &str, text: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::from(id),
            text: text.to_string(),
            timestamp: Some(fixed_time(0)),
            author: Some(AuthorRecord {
                id: Some("u2".into()),
                display_name: Some("Ravi".into()),
                avatar_url: Some("https://example.org/r.png".into()),
            }),
            reply_to: None,
            temporary_id: None,
        }
    }

    struct Harness {
        engine: ChatEngine<FakeApi, FakeRelay, FakeIdentity>,
        events: mpsc::Receiver<ChatEvent>,
        api: Arc<FakeApi>,
        relay: Arc<FakeRelay>,
        send_calls: mpsc::UnboundedReceiver<SendCall>,
        released_rx: mpsc::Receiver<String>,
    }

    impl Harness {
        fn new(signed_in: bool) -> Self {
            let (api, send_calls) = FakeApi::new();
            let (relay, released_rx) = FakeRelay::new();
            let identity = Arc::new(FakeIdentity(signed_in.then(profile)));

            let (engine, events) = ChatEngine::new(
                api.clone(),
                relay.clone(),
                identity,
                ChannelId::from("general"),
            );

            Self {
                engine,
                events,
                api,
                relay,
                send_calls,
                released_rx,
            }
        }

        async fn next_event(&mut self) -> ChatEvent {
            timeout(RECV_TIMEOUT, self.events.recv())
                .await
                .expect("timed out waiting for engine event")
                .expect("event stream closed")
        }

        async fn next_send_call(&mut self) -> SendCall {
            timeout(RECV_TIMEOUT, self.send_calls.recv())
                .await
                .expect("timed out waiting for send call")
                .expect("send-call stream closed")
        }

        async fn next_released_topic(&mut self) -> String {
            timeout(RECV_TIMEOUT, self.released_rx.recv())
                .await
                .expect("timed out waiting for a released topic")
                .expect("released-topic stream closed")
        }
    }

    // --- Tests --------------------------------------------------------

    #[tokio::test]
    async fn test_send_with_blank_text_is_noop() {
        let h = Harness::new(true);
        assert!(h.engine.send("   \n", None).await.is_none());
        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_identity_is_noop() {
        let h = Harness::new(false);
        assert!(h.engine.send("hello", None).await.is_none());
        assert!(h.engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_optimistic_send_confirms_on_ack() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        assert!(matches!(
            h.next_event().await,
            ChatEvent::HistoryLoaded { count: 1, .. }
        ));

        let sender = h.engine.clone();
        let send_task = tokio::spawn(async move { sender.send("hello", None).await });

        let (outgoing, respond) = h.next_send_call().await;

        // Optimistic entry is visible while the request is in flight.
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].text, "hello");
        assert_eq!(snapshot[1].state, MessageState::Pending);
        assert_eq!(snapshot[1].id, outgoing.temporary_id);
        assert_eq!(h.engine.pending_count(), 1);

        respond
            .send(Ok(MessageAck {
                id: MessageId::from("m2"),
            }))
            .unwrap();
        let temp_id = send_task.await.unwrap().unwrap();

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, MessageId::from("m2"));
        assert_eq!(snapshot[1].state, MessageState::Confirmed);
        assert_eq!(h.engine.pending_count(), 0);
        assert!(matches!(
            h.next_event().await,
            ChatEvent::MessageConfirmed { temporary_id, id }
                if temporary_id == temp_id && id == MessageId::from("m2")
        ));
    }

    #[tokio::test]
    async fn test_relay_echo_with_temporary_id_is_discarded() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let sender = h.engine.clone();
        let send_task = tokio::spawn(async move { sender.send("hello", None).await });
        let (outgoing, respond) = h.next_send_call().await;

        // Echo of our own message lands before the ack.
        let mut echo = record("m2", "hello");
        echo.temporary_id = Some(outgoing.temporary_id.clone());
        assert!(
            h.relay
                .deliver("chat-general", &RelayEvent::NewMessage(echo))
                .await
        );

        // A later peer message proves the echo has been processed (and
        // discarded) before the ack resolves.
        assert!(
            h.relay
                .deliver("chat-general", &RelayEvent::NewMessage(record("m3", "yo")))
                .await
        );
        assert!(matches!(
            h.next_event().await,
            ChatEvent::MessageReceived(m) if m.id == MessageId::from("m3")
        ));

        respond
            .send(Ok(MessageAck {
                id: MessageId::from("m2"),
            }))
            .unwrap();
        send_task.await.unwrap();

        let snapshot = h.engine.snapshot();
        let m2_count = snapshot
            .iter()
            .filter(|m| m.id == MessageId::from("m2"))
            .count();
        assert_eq!(m2_count, 1);
        assert_eq!(h.engine.pending_count(), 0);
        assert!(snapshot.iter().all(|m| m.state == MessageState::Confirmed));
    }

    #[tokio::test]
    async fn test_relay_echo_without_temporary_id_wins_the_race() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let sender = h.engine.clone();
        let send_task = tokio::spawn(async move { sender.send("hello", None).await });
        let (_outgoing, respond) = h.next_send_call().await;

        // Echo arrives carrying only the permanent id; it cannot be
        // matched to the pending send and is appended as confirmed.
        assert!(
            h.relay
                .deliver(
                    "chat-general",
                    &RelayEvent::NewMessage(record("m2", "hello"))
                )
                .await
        );
        assert!(matches!(
            h.next_event().await,
            ChatEvent::MessageReceived(m) if m.id == MessageId::from("m2")
        ));

        // The ack then resolves with the same id; the optimistic entry is
        // dropped instead of renamed.
        respond
            .send(Ok(MessageAck {
                id: MessageId::from("m2"),
            }))
            .unwrap();
        send_task.await.unwrap();

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        let m2_count = snapshot
            .iter()
            .filter(|m| m.id == MessageId::from("m2"))
            .count();
        assert_eq!(m2_count, 1);
        assert_eq!(h.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back_optimistic_entry() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let sender = h.engine.clone();
        let send_task = tokio::spawn(async move { sender.send("hello", None).await });
        let (outgoing, respond) = h.next_send_call().await;

        respond.send(Err(ApiError::Status(500))).unwrap();
        send_task.await.unwrap();

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.iter().all(|m| m.id != outgoing.temporary_id));
        assert_eq!(h.engine.pending_count(), 0);
        assert!(matches!(
            h.next_event().await,
            ChatEvent::SendFailed { text, .. } if text == "hello"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_relay_delivery_is_discarded() {
        let mut h = Harness::new(true);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let event = RelayEvent::NewMessage(record("m5", "once"));
        assert!(h.relay.deliver("chat-general", &event).await);
        assert!(h.relay.deliver("chat-general", &event).await);
        assert!(
            h.relay
                .deliver("chat-general", &RelayEvent::NewMessage(record("m6", "next")))
                .await
        );

        assert!(matches!(
            h.next_event().await,
            ChatEvent::MessageReceived(m) if m.id == MessageId::from("m5")
        ));
        // The duplicate produced no event; the next one is already m6.
        assert!(matches!(
            h.next_event().await,
            ChatEvent::MessageReceived(m) if m.id == MessageId::from("m6")
        ));
        assert_eq!(h.engine.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_channel_isolation_across_switch() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.api.set_history("random", vec![record("r1", "other")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let sender = h.engine.clone();
        let send_task = tokio::spawn(async move { sender.send("hello", None).await });
        let (_outgoing, respond) = h.next_send_call().await;

        h.engine
            .switch_channel(ChannelId::from("random"))
            .await
            .unwrap();

        // The ack for the abandoned channel resolves late and must be
        // discarded rather than applied to the new channel.
        respond
            .send(Ok(MessageAck {
                id: MessageId::from("m2"),
            }))
            .unwrap();
        send_task.await.unwrap();

        // Deliveries on the old topic no longer reach anyone.
        assert!(
            !h.relay
                .deliver(
                    "chat-general",
                    &RelayEvent::NewMessage(record("m9", "stale"))
                )
                .await
        );

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, MessageId::from("r1"));
        assert_eq!(h.engine.pending_count(), 0);
        assert_eq!(h.engine.channel(), ChannelId::from("random"));
    }

    #[tokio::test]
    async fn test_history_reload_is_idempotent() {
        let mut h = Harness::new(true);
        h.api
            .set_history("general", vec![record("m1", "hi"), record("m2", "yo")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        let first = h.engine.snapshot();
        h.engine.load_history().await;
        let _ = h.next_event().await; // HistoryLoaded
        let second = h.engine.snapshot();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_history_failure_leaves_sequence_unchanged() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        let _ = h.next_event().await; // HistoryLoaded

        h.api.fail_history("general");
        h.engine.load_history().await;

        assert!(matches!(
            h.next_event().await,
            ChatEvent::HistoryLoadFailed { .. }
        ));
        assert_eq!(h.engine.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_releases_old_subscription() {
        let mut h = Harness::new(true);
        h.engine.start().await.unwrap();
        h.engine
            .switch_channel(ChannelId::from("random"))
            .await
            .unwrap();

        assert_eq!(h.next_released_topic().await, "chat-general");
    }

    #[tokio::test]
    async fn test_teardown_releases_subscription_and_clears_state() {
        let mut h = Harness::new(true);
        h.api.set_history("general", vec![record("m1", "hi")]);
        h.engine.start().await.unwrap();
        h.engine.teardown().await;

        assert_eq!(h.next_released_topic().await, "chat-general");
        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_double_subscribe_is_rejected() {
        let h = Harness::new(true);
        h.engine.start().await.unwrap();
        assert!(matches!(
            h.engine.subscribe().await,
            Err(RelayError::AlreadySubscribed(_))
        ));
    }
}
