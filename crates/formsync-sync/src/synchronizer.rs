//! Collaboration synchronizer
//!
//! One synchronizer per collaborator. It publishes that user's edits,
//! fans inbound edits out to the sessions subscribed to their form, and
//! keeps the presence map current.
//!
//! Inbound frames are handled in arrival order. There is no reordering and
//! no deduplication: the last edit applied to a field wins.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;

use formsync_core::{
    FieldId, FormId, FormResult, PeerId, RemoteEdit, UserId, WireEnvelope, WireMessage,
};

use crate::{CollabChannel, EditingPresence, FrameReceiver, PresenceMap};

/// Callback invoked for every inbound edit of a subscribed form
pub type EditHandler = Arc<dyn Fn(&RemoteEdit) + Send + Sync>;

/// Synchronizer configuration
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Identity stamped on outgoing edits and presence signals
    pub user_id: UserId,
    /// Hand frames this synchronizer sent back to its own subscribers
    pub deliver_own: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            user_id: UserId::new("anonymous"),
            deliver_own: false,
        }
    }
}

impl SyncConfig {
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        SyncConfig {
            user_id: user_id.into(),
            ..SyncConfig::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub published: u64,
    pub received: u64,
    pub delivered: u64,
    pub dropped_malformed: u64,
    pub ignored_own: u64,
    pub unrouted: u64,
    pub presence_updates: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

struct Subscription {
    form_id: FormId,
    handler: EditHandler,
    /// Cleared on unsubscribe. Held while the handler runs, so clearing it
    /// waits for an in-flight delivery on another thread to finish.
    active: ReentrantMutex<Cell<bool>>,
}

struct SyncInner {
    peer: PeerId,
    config: SyncConfig,
    channel: Arc<dyn CollabChannel>,
    inbox: Mutex<Option<FrameReceiver>>,
    subscriptions: Mutex<BTreeMap<SubscriptionId, Arc<Subscription>>>,
    presence: Mutex<PresenceMap>,
    next_id: AtomicU64,
    stats: Mutex<SyncStats>,
}

/// Handle to a collaborator's synchronizer (cheap to clone)
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<SyncInner>,
}

impl Synchronizer {
    /// Attach a new synchronizer to a channel
    pub fn new(channel: Arc<dyn CollabChannel>, config: SyncConfig) -> Self {
        let inbox = channel.subscribe();
        Synchronizer {
            inner: Arc::new(SyncInner {
                peer: PeerId::new(rand::random()),
                config,
                channel,
                inbox: Mutex::new(Some(inbox)),
                subscriptions: Mutex::new(BTreeMap::new()),
                presence: Mutex::new(PresenceMap::new()),
                next_id: AtomicU64::new(1),
                stats: Mutex::new(SyncStats::default()),
            }),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.config.user_id
    }

    /// Identity of this synchronizer on the channel
    pub fn peer_id(&self) -> PeerId {
        self.inner.peer
    }

    pub fn stats(&self) -> SyncStats {
        self.inner.stats.lock().clone()
    }

    /// Send an edit to every other collaborator
    pub fn publish(&self, edit: RemoteEdit) -> FormResult<()> {
        tracing::debug!(
            form = %edit.form_id,
            field = %edit.field_id,
            "publishing edit"
        );
        self.send(WireMessage::Edit(edit))?;
        self.inner.stats.lock().published += 1;
        Ok(())
    }

    /// Register a handler for inbound edits of one form
    pub fn subscribe(&self, form_id: FormId, handler: EditHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            form_id,
            handler,
            active: ReentrantMutex::new(Cell::new(true)),
        });
        self.inner.subscriptions.lock().insert(id, subscription);
        id
    }

    /// Remove a subscription
    ///
    /// Once this returns the handler is never invoked again, and any
    /// delivery that was running on another thread has completed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscriptions.lock().remove(&id);
        match removed {
            Some(subscription) => {
                subscription.active.lock().set(false);
                true
            }
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// Signal that this user focused a field
    pub fn focus(&self, form_id: &FormId, field_id: &FieldId) -> FormResult<()> {
        let user = self.user_id().clone();
        self.inner.presence.lock().focus(form_id, field_id, &user);
        self.send(WireMessage::Focus {
            form_id: form_id.clone(),
            field_id: field_id.clone(),
            user_id: user,
        })
    }

    /// Signal that this user left a field
    pub fn blur(&self, form_id: &FormId, field_id: &FieldId) -> FormResult<()> {
        let user = self.user_id().clone();
        self.inner.presence.lock().blur(form_id, field_id, &user);
        self.send(WireMessage::Blur {
            form_id: form_id.clone(),
            field_id: field_id.clone(),
            user_id: user,
        })
    }

    /// Drop this user's presence on a form (session teardown)
    pub fn leave(&self, form_id: &FormId) -> FormResult<()> {
        let user = self.user_id().clone();
        self.inner.presence.lock().leave(form_id, &user);
        self.send(WireMessage::Leave {
            form_id: form_id.clone(),
            user_id: user,
        })
    }

    /// Presence snapshot for one form
    pub fn presence(&self, form_id: &FormId) -> EditingPresence {
        self.inner.presence.lock().snapshot(form_id)
    }

    /// Users focused on one field
    pub fn editors(&self, form_id: &FormId, field_id: &FieldId) -> Vec<UserId> {
        self.inner.presence.lock().editors(form_id, field_id)
    }

    fn send(&self, message: WireMessage) -> FormResult<()> {
        let frame = WireEnvelope::new(self.inner.peer, message).encode()?;
        self.inner.channel.send(frame)
    }

    /// Handle every frame already waiting in the inbox, without blocking
    ///
    /// Returns the number of frames handled. Does nothing once the receive
    /// loop has been spawned. The inbox is not held while a frame is
    /// dispatched, so a handler may pump again; the nested call handles
    /// the frames queued behind the current one.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        loop {
            let frame = {
                let mut inbox = self.inner.inbox.lock();
                match inbox.as_mut().map(|rx| rx.try_recv()) {
                    Some(Ok(frame)) => frame,
                    _ => break,
                }
            };
            self.dispatch(&frame);
            handled += 1;
        }
        handled
    }

    /// Start the background receive loop on the current tokio runtime
    ///
    /// Returns `None` if the loop is already running.
    pub fn spawn(&self) -> Option<JoinHandle<()>> {
        let rx = self.inner.inbox.lock().take()?;
        let sync = self.clone();
        Some(tokio::spawn(async move {
            sync.run(rx).await;
        }))
    }

    /// Receive loop: waits for frames and dispatches them until the channel closes
    pub async fn run(&self, mut rx: FrameReceiver) {
        while let Some(frame) = rx.recv().await {
            self.dispatch(&frame);
        }
        tracing::debug!(user = %self.user_id(), "collaboration channel closed");
    }

    /// Handle one inbound frame
    pub fn dispatch(&self, frame: &[u8]) {
        self.inner.stats.lock().received += 1;

        let envelope = match WireEnvelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(user = %self.user_id(), "dropping collaboration frame: {}", e);
                self.inner.stats.lock().dropped_malformed += 1;
                return;
            }
        };

        if envelope.sender == self.inner.peer && !self.inner.config.deliver_own {
            self.inner.stats.lock().ignored_own += 1;
            return;
        }

        match envelope.message {
            WireMessage::Edit(edit) => self.deliver(&edit),
            WireMessage::Focus {
                form_id,
                field_id,
                user_id,
            } => {
                self.inner.presence.lock().focus(&form_id, &field_id, &user_id);
                self.inner.stats.lock().presence_updates += 1;
            }
            WireMessage::Blur {
                form_id,
                field_id,
                user_id,
            } => {
                self.inner.presence.lock().blur(&form_id, &field_id, &user_id);
                self.inner.stats.lock().presence_updates += 1;
            }
            WireMessage::Leave { form_id, user_id } => {
                self.inner.presence.lock().leave(&form_id, &user_id);
                self.inner.stats.lock().presence_updates += 1;
            }
        }
    }

    fn deliver(&self, edit: &RemoteEdit) {
        let targets: Vec<Arc<Subscription>> = self
            .inner
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.form_id == edit.form_id)
            .cloned()
            .collect();

        if targets.is_empty() {
            tracing::debug!(form = %edit.form_id, "no subscriber for inbound edit");
            self.inner.stats.lock().unrouted += 1;
            return;
        }

        for subscription in targets {
            let active = subscription.active.lock();
            if active.get() {
                (subscription.handler)(edit);
                self.inner.stats.lock().delivered += 1;
            }
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("user_id", self.user_id())
            .field("peer", &self.inner.peer)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryChannel;
    use formsync_core::FieldValue;

    fn pair() -> (Synchronizer, Synchronizer) {
        let channel: Arc<dyn CollabChannel> = Arc::new(InMemoryChannel::new());
        (
            Synchronizer::new(channel.clone(), SyncConfig::for_user("alice")),
            Synchronizer::new(channel, SyncConfig::for_user("bob")),
        )
    }

    fn edit(form: &str, field: &str, value: &str, user: &str) -> RemoteEdit {
        RemoteEdit::new(
            FormId::new(form),
            FieldId::new(field),
            FieldValue::from(value),
            UserId::new(user),
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<RemoteEdit>>>, EditHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EditHandler = Arc::new(move |edit: &RemoteEdit| sink.lock().push(edit.clone()));
        (seen, handler)
    }

    #[test]
    fn test_publish_reaches_other_collaborator() {
        let (alice, bob) = pair();
        let (seen, handler) = recorder();
        bob.subscribe(FormId::new("deal"), handler);

        alice.publish(edit("deal", "name", "Alpha", "alice")).unwrap();
        assert_eq!(bob.pump(), 1);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].value, FieldValue::from("Alpha"));
        assert_eq!(bob.stats().delivered, 1);
    }

    #[test]
    fn test_own_edits_are_not_echoed() {
        let (alice, _bob) = pair();
        let (seen, handler) = recorder();
        alice.subscribe(FormId::new("deal"), handler);

        alice.publish(edit("deal", "name", "Alpha", "alice")).unwrap();
        alice.pump();

        assert!(seen.lock().is_empty());
        assert_eq!(alice.stats().ignored_own, 1);
    }

    #[test]
    fn test_same_user_on_two_synchronizers() {
        let channel: Arc<dyn CollabChannel> = Arc::new(InMemoryChannel::new());
        let laptop = Synchronizer::new(channel.clone(), SyncConfig::default());
        let tablet = Synchronizer::new(channel, SyncConfig::default());
        assert_ne!(laptop.peer_id(), tablet.peer_id());

        let (seen, handler) = recorder();
        tablet.subscribe(FormId::new("deal"), handler);
        laptop
            .publish(edit("deal", "name", "Alpha", "anonymous"))
            .unwrap();

        assert_eq!(tablet.pump(), 1);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].origin_user_id, UserId::new("anonymous"));
        let stats = tablet.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.ignored_own, 0);

        laptop.pump();
        assert_eq!(laptop.stats().ignored_own, 1);
    }

    #[test]
    fn test_deliver_own_hands_frames_back() {
        let channel: Arc<dyn CollabChannel> = Arc::new(InMemoryChannel::new());
        let config = SyncConfig {
            deliver_own: true,
            ..SyncConfig::for_user("alice")
        };
        let alice = Synchronizer::new(channel, config);
        let (seen, handler) = recorder();
        alice.subscribe(FormId::new("deal"), handler);

        alice.publish(edit("deal", "name", "Alpha", "alice")).unwrap();
        alice.pump();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(alice.stats().ignored_own, 0);
    }

    #[test]
    fn test_handler_may_pump_again() {
        let (alice, bob) = pair();
        let (seen, handler) = recorder();
        let nested = bob.clone();
        let pumped = Arc::new(AtomicU64::new(0));
        let pumped_ref = pumped.clone();
        bob.subscribe(
            FormId::new("deal"),
            Arc::new(move |edit: &RemoteEdit| {
                handler(edit);
                pumped_ref.fetch_add(nested.pump() as u64, Ordering::SeqCst);
            }),
        );

        alice.publish(edit("deal", "name", "A", "alice")).unwrap();
        alice.publish(edit("deal", "name", "B", "alice")).unwrap();
        alice.publish(edit("deal", "name", "C", "alice")).unwrap();
        let handled = bob.pump();

        let values: Vec<_> = seen.lock().iter().map(|e| e.value.clone()).collect();
        assert_eq!(
            values,
            vec![FieldValue::from("A"), FieldValue::from("B"), FieldValue::from("C")]
        );
        assert_eq!(handled as u64 + pumped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_edits_routed_by_form_in_arrival_order() {
        let (alice, bob) = pair();
        let (deal_seen, deal_handler) = recorder();
        let (other_seen, other_handler) = recorder();
        bob.subscribe(FormId::new("deal"), deal_handler);
        bob.subscribe(FormId::new("other"), other_handler);

        alice.publish(edit("deal", "name", "A", "alice")).unwrap();
        alice.publish(edit("other", "name", "X", "alice")).unwrap();
        alice.publish(edit("deal", "name", "B", "alice")).unwrap();
        bob.pump();

        let values: Vec<_> = deal_seen.lock().iter().map(|e| e.value.clone()).collect();
        assert_eq!(values, vec![FieldValue::from("A"), FieldValue::from("B")]);
        assert_eq!(other_seen.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let (alice, bob) = pair();
        let (seen, handler) = recorder();
        let id = bob.subscribe(FormId::new("deal"), handler);

        alice.publish(edit("deal", "name", "A", "alice")).unwrap();
        assert!(bob.unsubscribe(id));
        bob.pump();

        assert!(seen.lock().is_empty());
        assert!(!bob.unsubscribe(id));
        assert_eq!(bob.stats().unrouted, 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let (alice, bob) = pair();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicU64::new(0));

        let (sync, slot_ref, count_ref) = (bob.clone(), slot.clone(), count.clone());
        let id = bob.subscribe(
            FormId::new("deal"),
            Arc::new(move |_: &RemoteEdit| {
                count_ref.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = slot_ref.lock().take() {
                    sync.unsubscribe(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        alice.publish(edit("deal", "name", "A", "alice")).unwrap();
        alice.publish(edit("deal", "name", "B", "alice")).unwrap();
        bob.pump();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let (_alice, bob) = pair();
        bob.dispatch(b"garbage");
        bob.dispatch(br#"{"sender":1,"message":{"kind":"edit","formId":"deal"}}"#);
        assert_eq!(bob.stats().dropped_malformed, 2);
    }

    #[test]
    fn test_presence_propagates() {
        let (alice, bob) = pair();
        let form = FormId::new("deal");
        let field = FieldId::new("amount");

        alice.focus(&form, &field).unwrap();
        bob.pump();
        assert_eq!(bob.editors(&form, &field), vec![UserId::new("alice")]);
        assert_eq!(alice.editors(&form, &field), vec![UserId::new("alice")]);

        alice.blur(&form, &field).unwrap();
        bob.pump();
        assert!(bob.presence(&form).is_empty());

        alice.focus(&form, &field).unwrap();
        alice.leave(&form).unwrap();
        bob.pump();
        assert!(bob.presence(&form).is_empty());
        assert!(alice.presence(&form).is_empty());
    }

    #[tokio::test]
    async fn test_spawned_receive_loop() {
        let (alice, bob) = pair();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bob.subscribe(
            FormId::new("deal"),
            Arc::new(move |edit: &RemoteEdit| {
                let _ = tx.send(edit.value.clone());
            }),
        );

        let handle = bob.spawn().unwrap();
        assert!(bob.spawn().is_none());
        assert_eq!(bob.pump(), 0);

        alice.publish(edit("deal", "name", "Live", "alice")).unwrap();
        let value = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(value, Some(FieldValue::from("Live")));

        handle.abort();
    }
}
