//! Subscription Lifecycle Manager
//!
//! Owns the single change-stream subscription of one consuming unit and
//! keeps it in step with the unit's current identity.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::realtime::{
    ChangeStreamClient, HandleId, Identity, IdentityProvider, NotificationSink,
    SubscriptionHandle,
};

/// Subscription owner for one consuming unit (a view, a session, a worker).
///
/// Holds at most one open [`SubscriptionHandle`]. Dropping the manager closes
/// it, whichever way the unit exits.
pub struct SubscriptionManager {
    unit: String,
    client: Arc<ChangeStreamClient>,
    sink: Arc<dyn NotificationSink>,
    active: Option<SubscriptionHandle>,
}

impl SubscriptionManager {
    pub fn new(
        unit: impl Into<String>,
        client: Arc<ChangeStreamClient>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            unit: unit.into(),
            client,
            sink,
            active: None,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn active(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    // == Attach ==
    /// Ensures the unit is subscribed for `identity`.
    ///
    /// - `None` closes any open subscription and returns `None`.
    /// - The identity already subscribed for returns the existing handle id.
    /// - A different identity closes the old subscription before opening a new one.
    ///
    /// Open failures are logged and yield `None`; the unit keeps working on
    /// a non-realtime cache.
    pub async fn attach(&mut self, identity: Option<&Identity>) -> Option<HandleId> {
        let Some(identity) = identity else {
            if self.active.is_some() {
                debug!("Unit {} lost its identity", self.unit);
            }
            self.detach().await;
            return None;
        };

        if let Some(handle) = &self.active {
            if handle.identity().id == identity.id {
                return Some(handle.id());
            }
            info!(
                "Unit {} switching identity {} -> {}",
                self.unit,
                handle.identity().id,
                identity.id
            );
            self.detach().await;
        }

        match self.client.open(identity, Arc::clone(&self.sink)).await {
            Ok(handle) => {
                let id = handle.id();
                self.active = Some(handle);
                Some(id)
            }
            Err(e) => {
                warn!(
                    "Unit {} could not subscribe for identity {}: {}",
                    self.unit, identity.id, e
                );
                None
            }
        }
    }

    /// Resolves the current identity, then attaches for it.
    ///
    /// A provider error counts as an anonymous session.
    pub async fn attach_current(&mut self, provider: &dyn IdentityProvider) -> Option<HandleId> {
        let identity = match provider.current_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Identity resolution failed for unit {}: {}", self.unit, e);
                None
            }
        };
        self.attach(identity.as_ref()).await
    }

    // == Detach ==
    /// Closes the open subscription, if any. Safe to call repeatedly.
    pub async fn detach(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.close().await;
        }
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("unit", &self.unit)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
