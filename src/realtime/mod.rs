//! Realtime Module
//!
//! Keeps the query cache coherent with the remote change stream: identity
//! scoped subscriptions, ordered delivery, and table-based invalidation.

mod channel;
mod client;
mod identity;
mod lifecycle;
mod notification;
mod router;

pub use channel::{
    ChangeChannel, ChannelId, ChannelSubscription, MemoryChangeFeed, SubscribeRequest,
};
pub use client::{
    ChangeStreamClient, HandleId, NotificationSink, SubscriptionHandle, SubscriptionToken,
};
pub use identity::{Identity, IdentityProvider, StaticIdentityProvider};
pub use lifecycle::SubscriptionManager;
pub use notification::{ChangeNotification, ChangeOp, ScopeFilter};
pub use router::{InvalidationRouter, InvalidationRules};
