use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use common::room::{Room, RoomRow};
use common::store::{RoomChange, RoomStore};
use common::{RoomId, log};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::config::BackoffConfig;
use super::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Updated(Room),
    Deleted,
    Status(ConnectionStatus),
    /// The feed gave up; nothing more arrives until `reconnect`.
    Failed(SyncError),
}

type EventSender = mpsc::UnboundedSender<RoomEvent>;

struct Subscribers {
    senders: HashMap<u64, EventSender>,
    status: ConnectionStatus,
    latest: Option<Room>,
}

impl Subscribers {
    fn publish(&mut self, event: RoomEvent) {
        match &event {
            RoomEvent::Updated(room) => self.latest = Some(room.clone()),
            RoomEvent::Deleted => self.latest = None,
            RoomEvent::Status(status) => self.status = *status,
            RoomEvent::Failed(_) => self.status = ConnectionStatus::Disconnected,
        }
        self.senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }
}

/// One store feed per room, shared by every local subscriber of it.
struct SharedFeed {
    subscribers: Arc<Mutex<Subscribers>>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub(crate) struct SubscriptionHub<S: RoomStore> {
    store: S,
    backoff: BackoffConfig,
    feeds: Arc<Mutex<HashMap<RoomId, SharedFeed>>>,
    next_subscriber_id: Arc<AtomicU64>,
}

impl<S: RoomStore> SubscriptionHub<S> {
    pub(crate) fn new(store: S, backoff: BackoffConfig) -> Self {
        Self {
            store,
            backoff,
            feeds: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn spawn_feed(&self, room_id: &RoomId, subscribers: Arc<Mutex<Subscribers>>) -> JoinHandle<()> {
        tokio::spawn(run_feed(
            self.store.clone(),
            room_id.clone(),
            self.backoff.clone(),
            subscribers,
        ))
    }

    pub(crate) async fn subscribe(&self, room_id: &RoomId) -> RoomSubscription<S> {
        let (sender, events) = mpsc::unbounded_channel();
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut feeds = self.feeds.lock().await;

        if let Some(feed) = feeds.get_mut(room_id) {
            {
                let mut subscribers = feed.subscribers.lock().await;
                // Late joiners start from what the others already know.
                let mut catch_up = vec![RoomEvent::Status(subscribers.status)];
                catch_up.extend(subscribers.latest.clone().map(RoomEvent::Updated));
                for event in catch_up {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
                subscribers.senders.insert(subscriber_id, sender);
            }
            if feed.task.is_finished() {
                log!("[room:{}] Feed was down, restarting for new subscriber", room_id);
                feed.task = self.spawn_feed(room_id, feed.subscribers.clone());
            }
            log!("[room:{}] Subscriber {} attached to shared feed", room_id, subscriber_id);
        } else {
            let subscribers = Arc::new(Mutex::new(Subscribers {
                senders: HashMap::from([(subscriber_id, sender)]),
                status: ConnectionStatus::Connecting,
                latest: None,
            }));
            let task = self.spawn_feed(room_id, subscribers.clone());
            feeds.insert(room_id.clone(), SharedFeed { subscribers, task });
            log!("[room:{}] Opened feed for subscriber {}", room_id, subscriber_id);
        }

        RoomSubscription {
            room_id: room_id.clone(),
            subscriber_id,
            events,
            hub: self.clone(),
            active: true,
        }
    }

    pub(crate) async fn unsubscribe(&self, room_id: &RoomId, subscriber_id: u64) {
        let mut feeds = self.feeds.lock().await;
        let Some(feed) = feeds.get(room_id) else {
            return;
        };

        let remaining = {
            let mut subscribers = feed.subscribers.lock().await;
            subscribers.senders.remove(&subscriber_id);
            subscribers.senders.len()
        };
        if remaining == 0
            && let Some(feed) = feeds.remove(room_id)
        {
            feed.task.abort();
            log!("[room:{}] Last subscriber left, feed closed", room_id);
        }
    }

    pub(crate) async fn reconnect(&self, room_id: &RoomId) -> bool {
        let mut feeds = self.feeds.lock().await;
        let Some(feed) = feeds.get_mut(room_id) else {
            return false;
        };
        if !feed.task.is_finished() {
            return false;
        }

        log!("[room:{}] Manual reconnect", room_id);
        feed.task = self.spawn_feed(room_id, feed.subscribers.clone());
        true
    }
}

async fn publish(subscribers: &Mutex<Subscribers>, event: RoomEvent) {
    subscribers.lock().await.publish(event);
}

async fn deliver(room_id: &RoomId, row: RoomRow, subscribers: &Mutex<Subscribers>) {
    match Room::try_from(row) {
        Ok(room) => publish(subscribers, RoomEvent::Updated(room)).await,
        Err(e) => log!("[room:{}] Skipping malformed update: {}", room_id, e),
    }
}

/// Updates pushed while disconnected are lost, so every (re)connect starts
/// with a fresh read of the row.
async fn resync<S: RoomStore>(store: &S, room_id: &RoomId, subscribers: &Mutex<Subscribers>) {
    match store.select_room(room_id).await {
        Ok(Some(row)) => deliver(room_id, row, subscribers).await,
        Ok(None) => publish(subscribers, RoomEvent::Deleted).await,
        Err(e) => log!("[room:{}] Resync failed: {}", room_id, e),
    }
}

async fn run_feed<S: RoomStore>(
    store: S,
    room_id: RoomId,
    backoff: BackoffConfig,
    subscribers: Arc<Mutex<Subscribers>>,
) {
    let mut attempt: u32 = 0;

    loop {
        let status = if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting
        };
        publish(&subscribers, RoomEvent::Status(status)).await;

        match store.subscribe(&room_id).await {
            Ok(mut feed) => {
                attempt = 0;
                log!("[room:{}] Feed connected", room_id);
                publish(&subscribers, RoomEvent::Status(ConnectionStatus::Connected)).await;
                resync(&store, &room_id, &subscribers).await;

                while let Some(change) = feed.recv().await {
                    match change {
                        RoomChange::Snapshot(row) => deliver(&room_id, row, &subscribers).await,
                        RoomChange::Deleted => publish(&subscribers, RoomEvent::Deleted).await,
                    }
                }
                log!("[room:{}] Feed lost", room_id);
            }
            Err(e) => log!("[room:{}] Subscribe failed: {}", room_id, e),
        }
        publish(&subscribers, RoomEvent::Status(ConnectionStatus::Disconnected)).await;

        attempt += 1;
        if attempt > backoff.max_attempts {
            let attempts = backoff.max_attempts;
            log!("[room:{}] Giving up after {} reconnect attempts", room_id, attempts);
            let error = SyncError::ConnectionFailure {
                room_id: room_id.clone(),
                attempts,
            };
            publish(&subscribers, RoomEvent::Failed(error)).await;
            return;
        }

        let delay = backoff.delay_for(attempt);
        log!(
            "[room:{}] Reconnecting in {} ms (attempt {}/{})",
            room_id,
            delay.as_millis(),
            attempt,
            backoff.max_attempts
        );
        tokio::time::sleep(delay).await;
    }
}

/// Handle of one local subscriber. Dropping it unsubscribes in the
/// background; `unsubscribe` does the same and waits for it.
pub struct RoomSubscription<S: RoomStore> {
    room_id: RoomId,
    subscriber_id: u64,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    hub: SubscriptionHub<S>,
    active: bool,
}

impl<S: RoomStore> std::fmt::Debug for RoomSubscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("room_id", &self.room_id)
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}

impl<S: RoomStore> RoomSubscription<S> {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.events.recv().await
    }

    pub async fn unsubscribe(mut self) {
        self.active = false;
        self.hub.unsubscribe(&self.room_id, self.subscriber_id).await;
    }
}

impl<S: RoomStore> Drop for RoomSubscription<S> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let hub = self.hub.clone();
            let room_id = self.room_id.clone();
            let subscriber_id = self.subscriber_id;
            runtime.spawn(async move { hub.unsubscribe(&room_id, subscriber_id).await });
        }
    }
}

impl<S: RoomStore + Unpin> Stream for RoomSubscription<S> {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RoomEvent>> {
        self.get_mut().events.poll_recv(cx)
    }
}
