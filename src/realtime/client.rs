//! Change Stream Client
//!
//! Opens identity-scoped subscriptions on a [`ChangeChannel`] and pumps their
//! notifications into a [`NotificationSink`] until the handle is closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::realtime::{
    ChangeChannel, ChangeNotification, ChannelId, Identity, ScopeFilter, SubscribeRequest,
};

/// Process-unique id of a subscription handle.
pub type HandleId = u64;

// == Delivery Gate ==
/// Serializes sink calls against `close`.
///
/// Once `close` has returned, no sink call can begin, and any call that was
/// running has finished.
#[derive(Debug, Default)]
struct DeliveryGate {
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl DeliveryGate {
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        f();
        true
    }

    /// Returns true if this call closed the gate.
    fn close(&self) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

/// Liveness view of one subscription, handed to the sink with every delivery.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    id: HandleId,
    gate: Arc<DeliveryGate>,
}

impl SubscriptionToken {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.gate.closed.load(Ordering::SeqCst)
    }
}

/// Receiver of change notifications.
///
/// Called on the subscription's pump task, outside any render cycle. Must not
/// close its own subscription from inside the callback.
///
/// Sinks must be short and non-blocking: the delivery lock is held while
/// they run, and `close` waits on it from a runtime worker thread.
pub trait NotificationSink: Send + Sync + 'static {
    fn on_notification(&self, token: &SubscriptionToken, notification: ChangeNotification);
}

impl<F> NotificationSink for F
where
    F: Fn(ChangeNotification) + Send + Sync + 'static,
{
    fn on_notification(&self, _token: &SubscriptionToken, notification: ChangeNotification) {
        self(notification)
    }
}

// == Subscription Handle ==
/// One open, identity-scoped subscription.
///
/// Closing is terminal. Dropping an open handle closes it too, and schedules
/// the channel release on the current runtime.
pub struct SubscriptionHandle {
    id: HandleId,
    identity: Identity,
    filter: ScopeFilter,
    channel_id: ChannelId,
    channel: Arc<dyn ChangeChannel>,
    token: SubscriptionToken,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn filter(&self) -> &ScopeFilter {
        &self.filter
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_closed()
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token.clone()
    }

    /// Closes the gate and stops the pump. Returns true if it was open.
    fn shut(&mut self) -> bool {
        let was_open = self.token.gate.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        was_open
    }

    // == Close ==
    /// Stops delivery and releases the channel subscription.
    ///
    /// Notifications still queued are dropped.
    pub async fn close(mut self) {
        if self.shut() {
            self.channel.unsubscribe(self.channel_id).await;
            info!(
                "Closed subscription {} for identity {}",
                self.id, self.identity.id
            );
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if !self.shut() {
            return;
        }
        let channel = Arc::clone(&self.channel);
        let channel_id = self.channel_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { channel.unsubscribe(channel_id).await });
                debug!("Subscription {} dropped while open; release scheduled", self.id);
            }
            Err(_) => warn!(
                "Subscription {} dropped outside a runtime; channel {} not released",
                self.id, channel_id
            ),
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("identity", &self.identity.id)
            .field("filter", &self.filter.to_string())
            .field("channel_id", &self.channel_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// == Change Stream Client ==
/// Opens subscriptions scoped by `owner_column = identity.id`.
pub struct ChangeStreamClient {
    channel: Arc<dyn ChangeChannel>,
    owner_column: String,
    next_handle: AtomicU64,
}

impl ChangeStreamClient {
    pub fn new(channel: Arc<dyn ChangeChannel>, owner_column: impl Into<String>) -> Self {
        Self {
            channel,
            owner_column: owner_column.into(),
            next_handle: AtomicU64::new(0),
        }
    }

    pub fn owner_column(&self) -> &str {
        &self.owner_column
    }

    // == Open ==
    /// Subscribes to every change on rows owned by `identity`.
    ///
    /// Fails fast with `InvalidScope` before touching the channel if the
    /// identity cannot be turned into a filter; channel failures surface as
    /// `Subscribe`.
    pub async fn open(
        &self,
        identity: &Identity,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<SubscriptionHandle> {
        let filter = ScopeFilter::for_identity(&self.owner_column, identity)?;
        let subscription = self
            .channel
            .subscribe(SubscribeRequest::scoped(filter.clone()))
            .await?;

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let token = SubscriptionToken {
            id,
            gate: Arc::new(DeliveryGate::default()),
        };
        let task = tokio::spawn(pump(subscription.receiver, token.clone(), sink));

        info!(
            "Opened subscription {} for identity {} ({})",
            id, identity.id, filter
        );

        Ok(SubscriptionHandle {
            id,
            identity: identity.clone(),
            filter,
            channel_id: subscription.id,
            channel: Arc::clone(&self.channel),
            token,
            task: Some(task),
        })
    }

    /// Terminal close; see [`SubscriptionHandle::close`].
    pub async fn close(&self, handle: SubscriptionHandle) {
        handle.close().await;
    }
}

impl fmt::Debug for ChangeStreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeStreamClient")
            .field("owner_column", &self.owner_column)
            .finish_non_exhaustive()
    }
}

/// Forwards notifications in arrival order until the gate closes.
async fn pump(
    mut receiver: mpsc::UnboundedReceiver<ChangeNotification>,
    token: SubscriptionToken,
    sink: Arc<dyn NotificationSink>,
) {
    while let Some(notification) = receiver.recv().await {
        let delivered = token
            .gate
            .deliver(|| sink.on_notification(&token, notification));
        if !delivered {
            break;
        }
    }
    debug!("Delivery stopped for subscription {}", token.id);
}
