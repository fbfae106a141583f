//! Invalidation Router
//!
//! Maps change notifications to the cache key prefixes they make stale.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheKey, QueryClient};
use crate::realtime::{ChangeNotification, NotificationSink, SubscriptionToken};

// == Invalidation Rules ==
/// Static table -> key prefixes mapping.
///
/// Serialized as a JSON object, e.g. `{"activities": [["activities"]]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationRules(BTreeMap<String, Vec<CacheKey>>);

impl InvalidationRules {
    /// Rules with no tables mapped.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds (or replaces) the prefixes for `table`.
    pub fn with_rule<I>(mut self, table: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = CacheKey>,
    {
        self.0.insert(table.into(), prefixes.into_iter().collect());
        self
    }

    pub fn prefixes_for(&self, table: &str) -> &[CacheKey] {
        self.0.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.0.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    // == Route ==
    /// Prefixes to invalidate for `notification`. The operation kind is
    /// ignored and unmapped tables yield an empty set.
    pub fn route(&self, notification: &ChangeNotification) -> BTreeSet<CacheKey> {
        self.prefixes_for(&notification.table).iter().cloned().collect()
    }
}

impl Default for InvalidationRules {
    /// Dashboard resources. Project and invoice lists embed client names.
    fn default() -> Self {
        Self::empty()
            .with_rule("activities", [CacheKey::from("activities")])
            .with_rule(
                "clients",
                [
                    CacheKey::from("clients"),
                    CacheKey::from("projects"),
                    CacheKey::from("invoices"),
                ],
            )
            .with_rule("projects", [CacheKey::from("projects")])
            .with_rule("invoices", [CacheKey::from("invoices")])
            .with_rule("user_settings", [CacheKey::from("user-settings")])
    }
}

// == Invalidation Router ==
/// Applies routed invalidations to a shared query cache.
#[derive(Debug)]
pub struct InvalidationRouter<V> {
    rules: InvalidationRules,
    client: QueryClient<V>,
}

impl<V: Clone> InvalidationRouter<V> {
    pub fn new(rules: InvalidationRules, client: QueryClient<V>) -> Self {
        Self { rules, client }
    }

    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    pub fn route(&self, notification: &ChangeNotification) -> BTreeSet<CacheKey> {
        self.rules.route(notification)
    }

    /// Invalidates every routed prefix. Returns the number of entries marked stale.
    pub fn apply(&self, notification: &ChangeNotification) -> usize {
        let prefixes = self.route(notification);
        if prefixes.is_empty() {
            debug!("No invalidation rule for table {}", notification.table);
            return 0;
        }

        let marked: usize = prefixes
            .iter()
            .map(|prefix| self.client.invalidate(prefix))
            .sum();
        debug!(
            "{:?} on {} invalidated {} prefix(es), {} entr(ies)",
            notification.op,
            notification.table,
            prefixes.len(),
            marked
        );
        marked
    }
}

impl<V> NotificationSink for InvalidationRouter<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn on_notification(&self, token: &SubscriptionToken, notification: ChangeNotification) {
        if token.is_closed() {
            debug!(
                "Discarding {} notification for closed subscription {}",
                notification.table,
                token.id()
            );
            return;
        }
        self.apply(&notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::realtime::ChangeOp;

    fn client() -> QueryClient<u32> {
        let client = QueryClient::new(CachePolicy::default());
        client.set(CacheKey::from("activities"), 1).unwrap();
        client.set(CacheKey::new(["activities", "recent"]), 2).unwrap();
        client.set(CacheKey::from("projects"), 3).unwrap();
        client.set(CacheKey::new(["user-settings", "u1"]), 4).unwrap();
        client
    }

    #[test]
    fn test_route_ignores_operation_kind() {
        let rules = InvalidationRules::default();
        let routes: Vec<BTreeSet<CacheKey>> = [
            ChangeOp::Insert,
            ChangeOp::Update,
            ChangeOp::Delete,
            ChangeOp::Any,
        ]
        .into_iter()
        .map(|op| rules.route(&ChangeNotification::new("projects", op)))
        .collect();

        assert!(routes.iter().all(|r| r == &routes[0]));
        assert_eq!(routes[0], BTreeSet::from([CacheKey::from("projects")]));
    }

    #[test]
    fn test_route_unmapped_table_is_empty() {
        let rules = InvalidationRules::default();
        let n = ChangeNotification::new("audit_log", ChangeOp::Insert);
        assert!(rules.route(&n).is_empty());
    }

    #[test]
    fn test_clients_fan_out() {
        let rules = InvalidationRules::default();
        let routed = rules.route(&ChangeNotification::new("clients", ChangeOp::Update));
        assert_eq!(routed.len(), 3);
        assert!(routed.contains(&CacheKey::from("invoices")));
    }

    #[test]
    fn test_rules_from_json() {
        let rules: InvalidationRules =
            serde_json::from_str(r#"{"tasks": [["tasks"], ["dashboard", "counts"]]}"#).unwrap();
        assert_eq!(
            rules.prefixes_for("tasks"),
            &[CacheKey::from("tasks"), CacheKey::new(["dashboard", "counts"])]
        );
        assert!(!rules.contains_table("activities"));
        assert_eq!(rules.tables().collect::<Vec<_>>(), vec!["tasks"]);
    }

    #[test]
    fn test_apply_marks_only_routed_prefixes() {
        let client = client();
        let router = InvalidationRouter::new(InvalidationRules::default(), client.clone());

        let marked = router.apply(&ChangeNotification::new("activities", ChangeOp::Insert));

        assert_eq!(marked, 2);
        assert!(client.is_stale(&CacheKey::from("activities")));
        assert!(client.is_stale(&CacheKey::new(["activities", "recent"])));
        assert!(!client.is_stale(&CacheKey::from("projects")));
        assert!(!client.is_stale(&CacheKey::new(["user-settings", "u1"])));
    }

    #[test]
    fn test_apply_unmapped_table_touches_nothing() {
        let client = client();
        let router = InvalidationRouter::new(InvalidationRules::default(), client.clone());

        assert_eq!(router.apply(&ChangeNotification::new("audit_log", ChangeOp::Delete)), 0);
        assert_eq!(client.stats().invalidations, 0);
    }
}
