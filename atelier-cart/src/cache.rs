use atelier_core::payment::{CartSnapshot, SnapshotItem};
use atelier_core::reservation::Reservation;
use atelier_core::session::SessionId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::CartItem;

/// Result of one reconciliation pass over the local mirror.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Items dropped because the store no longer knows them *and* the local
    /// hold had already lapsed.
    pub removed: Vec<Uuid>,
    /// Items whose expiry was overwritten with the store's value.
    pub corrected: usize,
    /// Authoritative reservations with no local line (logged, not acted on).
    pub unknown: usize,
}

/// Per-session mirror of active reservations.
///
/// Drives the visible countdown and optimistic eviction. Everything here is
/// advisory: the store remains authoritative, and the reconciliation loop
/// corrects this cache whenever the two disagree.
pub struct CartCache {
    session_id: SessionId,
    items: HashMap<Uuid, CartItem>,
    debounce: Duration,
    /// When each item was first observed lapsed; eviction waits out the
    /// debounce window from this point.
    lapse_first_seen: HashMap<Uuid, DateTime<Utc>>,
    /// Apparent-immediate-expiry occurrences, kept to surface clock skew
    /// instead of silently absorbing it.
    early_expiries: u32,
}

impl CartCache {
    pub fn new(session_id: SessionId, debounce: Duration) -> Self {
        Self {
            session_id,
            items: HashMap::new(),
            debounce,
            lapse_first_seen: HashMap::new(),
            early_expiries: 0,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn insert(&mut self, item: CartItem) {
        self.lapse_first_seen.remove(&item.product_id);
        self.items.insert(item.product_id, item);
    }

    pub fn remove(&mut self, product_id: &Uuid) -> Option<CartItem> {
        self.lapse_first_seen.remove(product_id);
        self.items.remove(product_id)
    }

    pub fn items(&self) -> Vec<CartItem> {
        let mut items: Vec<CartItem> = self.items.values().cloned().collect();
        items.sort_by_key(|i| i.added_at);
        items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Remaining time until the soonest hold lapses, or None for an empty
    /// cart.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.items
            .values()
            .map(|i| i.reserved_until - now)
            .min()
    }

    /// Items whose lapse has survived the debounce window and may now be
    /// evicted.
    ///
    /// A remaining time of roughly zero can mean benign clock skew between
    /// client and store rather than true expiry, so the first observation
    /// only starts the window; the item is returned once a recheck after
    /// `debounce` still reads lapsed. An extension arriving meanwhile
    /// cancels the candidate.
    pub fn lapsed_after_debounce(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut ready = Vec::new();

        for item in self.items.values() {
            if item.reserved_until > now {
                self.lapse_first_seen.remove(&item.product_id);
                continue;
            }
            match self.lapse_first_seen.get(&item.product_id).copied() {
                None => {
                    if now - item.added_at <= self.debounce {
                        self.early_expiries += 1;
                        let skew = now - item.reserved_until;
                        if self.early_expiries > 1 {
                            tracing::warn!(
                                product_id = %item.product_id,
                                occurrences = self.early_expiries,
                                skew_ms = skew.num_milliseconds(),
                                "Repeated apparent-immediate expiry; client and store clocks may disagree"
                            );
                        } else {
                            tracing::debug!(
                                product_id = %item.product_id,
                                skew_ms = skew.num_milliseconds(),
                                "Hold read as lapsed right after creation; debouncing"
                            );
                        }
                    }
                    self.lapse_first_seen.insert(item.product_id, now);
                }
                Some(first_seen) if now - first_seen >= self.debounce => {
                    ready.push(item.product_id);
                }
                Some(_) => {}
            }
        }

        ready
    }

    /// Reconcile the mirror against the authoritative reservation set.
    ///
    /// The store wins on any expiry disagreement. An item missing from the
    /// authoritative set becomes a removal candidate, but is only dropped if
    /// its local `reserved_until` has also passed: a reservation that has
    /// not propagated to a read yet (right after `reserve`) must not be
    /// discarded.
    pub fn apply_authoritative(
        &mut self,
        authoritative: &[Reservation],
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let by_product: HashMap<Uuid, &Reservation> = authoritative
            .iter()
            .map(|r| (r.product_id, r))
            .collect();

        let local_ids: Vec<Uuid> = self.items.keys().copied().collect();
        for product_id in local_ids {
            match by_product.get(&product_id) {
                Some(reservation) => {
                    if let Some(item) = self.items.get_mut(&product_id) {
                        if item.reserved_until != reservation.expires_at {
                            item.reserved_until = reservation.expires_at;
                            self.lapse_first_seen.remove(&product_id);
                            outcome.corrected += 1;
                        }
                    }
                }
                None => {
                    let lapsed_locally = self
                        .items
                        .get(&product_id)
                        .map(|i| i.reserved_until <= now)
                        .unwrap_or(false);
                    if lapsed_locally {
                        self.remove(&product_id);
                        outcome.removed.push(product_id);
                    } else {
                        tracing::debug!(
                            product_id = %product_id,
                            "Hold not visible upstream yet; keeping as removal candidate"
                        );
                    }
                }
            }
        }

        outcome.unknown = authoritative
            .iter()
            .filter(|r| !self.items.contains_key(&r.product_id))
            .count();
        if outcome.unknown > 0 {
            tracing::warn!(
                count = outcome.unknown,
                "Store holds reservations this cart has no line for"
            );
        }

        outcome
    }

    /// Cart snapshot to embed in payment metadata.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self
                .items()
                .iter()
                .map(|i| SnapshotItem {
                    product_id: i.product_id,
                    name: i.name.clone(),
                    price_cents: i.price_cents,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::reservation::ReservationStatus;

    fn item(session: &SessionId, reserved_until: DateTime<Utc>) -> CartItem {
        CartItem {
            product_id: Uuid::new_v4(),
            session_id: session.clone(),
            name: "Ceramic Planter".to_string(),
            price_cents: 6_200,
            reserved_until,
            added_at: Utc::now() - Duration::minutes(10),
        }
    }

    fn reservation_for(item: &CartItem, expires_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            product_id: item.product_id,
            session_id: item.session_id.clone(),
            created_at: Utc::now() - Duration::minutes(10),
            expires_at,
            status: ReservationStatus::Active,
        }
    }

    #[test]
    fn remaining_is_the_minimum_across_items() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        cache.insert(item(&session, now + Duration::minutes(12)));
        cache.insert(item(&session, now + Duration::minutes(3)));

        let remaining = cache.remaining(now).unwrap();
        assert_eq!(remaining.num_minutes(), 3);
    }

    #[test]
    fn lapse_needs_a_debounce_recheck_before_eviction() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        let lapsed = item(&session, now - Duration::seconds(1));
        let id = lapsed.product_id;
        cache.insert(lapsed);

        // First observation only starts the window.
        assert!(cache.lapsed_after_debounce(now).is_empty());
        // Still inside the window: nothing to evict.
        assert!(cache
            .lapsed_after_debounce(now + Duration::seconds(3))
            .is_empty());
        // Past the window and still lapsed: ready.
        assert_eq!(
            cache.lapsed_after_debounce(now + Duration::seconds(6)),
            vec![id]
        );
    }

    #[test]
    fn extension_during_the_debounce_window_cancels_eviction() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        let lapsed = item(&session, now - Duration::seconds(1));
        let id = lapsed.product_id;
        cache.insert(lapsed.clone());

        assert!(cache.lapsed_after_debounce(now).is_empty());

        // The store extended the hold (same-session re-reserve).
        let mut extended = lapsed;
        extended.reserved_until = now + Duration::minutes(15);
        cache.insert(extended);

        assert!(cache
            .lapsed_after_debounce(now + Duration::seconds(6))
            .is_empty());
        assert_eq!(cache.len(), 1);
        let _ = id;
    }

    #[test]
    fn missing_upstream_but_locally_valid_is_kept() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        // Freshly reserved, not visible in the authoritative read yet.
        cache.insert(item(&session, now + Duration::minutes(14)));

        let outcome = cache.apply_authoritative(&[], now);
        assert!(outcome.removed.is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_upstream_and_locally_lapsed_is_removed() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        let gone = item(&session, now - Duration::seconds(30));
        let id = gone.product_id;
        cache.insert(gone);

        let outcome = cache.apply_authoritative(&[], now);
        assert_eq!(outcome.removed, vec![id]);
        assert!(cache.is_empty());
    }

    #[test]
    fn store_wins_on_expiry_disagreement() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        let local = item(&session, now + Duration::minutes(2));
        let authoritative_expiry = now + Duration::minutes(9);
        let authoritative = vec![reservation_for(&local, authoritative_expiry)];
        cache.insert(local.clone());

        let outcome = cache.apply_authoritative(&authoritative, now);
        assert_eq!(outcome.corrected, 1);
        assert_eq!(
            cache.items()[0].reserved_until,
            authoritative_expiry
        );
    }

    #[test]
    fn snapshot_carries_every_line() {
        let session = SessionId::generate();
        let now = Utc::now();
        let mut cache = CartCache::new(session.clone(), Duration::seconds(5));
        cache.insert(item(&session, now + Duration::minutes(10)));
        cache.insert(item(&session, now + Duration::minutes(11)));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.total_cents(), 12_400);
    }
}
