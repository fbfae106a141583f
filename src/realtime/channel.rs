//! Remote change-data channel
//!
//! The transport the change stream client consumes, plus an in-process feed
//! that evaluates scope filters the way the remote service does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::realtime::{ChangeNotification, ChangeOp, ScopeFilter};

/// Identifier the channel assigns to one subscription.
pub type ChannelId = u64;

/// What to listen for: rows matching `filter` in `table` (all tables if
/// `None`) for mutations accepted by `op`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub filter: ScopeFilter,
    pub table: Option<String>,
    pub op: ChangeOp,
}

impl SubscribeRequest {
    /// Every table, every operation, restricted by `filter`.
    pub fn scoped(filter: ScopeFilter) -> Self {
        Self {
            filter,
            table: None,
            op: ChangeOp::Any,
        }
    }

    pub fn accepts(&self, notification: &ChangeNotification) -> bool {
        self.table
            .as_deref()
            .map_or(true, |table| table == notification.table)
            && self.op.accepts(notification.op)
            && self.filter.matches(notification)
    }
}

/// An open subscription: notifications arrive on `receiver` in emission order.
#[derive(Debug)]
pub struct ChannelSubscription {
    pub id: ChannelId,
    pub receiver: mpsc::UnboundedReceiver<ChangeNotification>,
}

/// Remote change-data channel.
#[async_trait]
pub trait ChangeChannel: Send + Sync {
    /// Opens a subscription. Fails on network or permission errors.
    async fn subscribe(&self, request: SubscribeRequest) -> Result<ChannelSubscription>;

    /// Releases a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: ChannelId);
}

// == Memory Change Feed ==
#[derive(Debug)]
struct Subscriber {
    request: SubscribeRequest,
    sender: mpsc::UnboundedSender<ChangeNotification>,
}

/// In-process change channel.
///
/// `publish` plays the role of the remote service: each notification is
/// checked against every subscription's request and fanned out in order.
#[derive(Debug, Default)]
pub struct MemoryChangeFeed {
    subscribers: Mutex<HashMap<ChannelId, Subscriber>>,
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
    rejecting: AtomicBool,
}

impl MemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Publish ==
    /// Delivers `notification` to every matching subscription.
    ///
    /// Returns the number of subscriptions it was delivered to.
    pub fn publish(&self, notification: ChangeNotification) -> usize {
        let mut subscribers = self.subscribers();
        let mut delivered = 0;
        subscribers.retain(|_, subscriber| {
            if !subscriber.request.accepts(&notification) {
                return !subscriber.sender.is_closed();
            }
            match subscriber.sender.send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        debug!(
            "Published {:?} on {} to {} subscription(s)",
            notification.op, notification.table, delivered
        );
        delivered
    }

    /// Makes subsequent `subscribe` calls fail, as an unreachable service would.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.rejecting.store(reject, Ordering::SeqCst);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers().len()
    }

    /// Number of `subscribe` calls, successful or not.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Rendered filters of the live subscriptions, sorted.
    pub fn active_filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self
            .subscribers()
            .values()
            .map(|s| s.request.filter.to_string())
            .collect();
        filters.sort();
        filters
    }
}

#[async_trait]
impl ChangeChannel for MemoryChangeFeed {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<ChannelSubscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CacheError::Subscribe(format!(
                "change feed refused subscription for {}",
                request.filter
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        debug!("Channel {} subscribed with filter {}", id, request.filter);
        self.subscribers().insert(id, Subscriber { request, sender });

        Ok(ChannelSubscription { id, receiver })
    }

    async fn unsubscribe(&self, id: ChannelId) {
        if self.subscribers().remove(&id).is_some() {
            debug!("Channel {} unsubscribed", id);
        }
    }
}
