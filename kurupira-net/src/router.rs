//! C13 (routing half): the overall receive-side decision function composing
//! duplicate suppression, history recording, and next-hop selection into one
//! classification, directly modeled on `lnp_routing_policy.c`'s
//! `lnp_routing_handle`.

use crate::collision::{CollisionTable, NO_COLLISION};
use crate::history::NO_ROUTE;
use crate::id::PeerId;
use crate::routing::RoutingTable;

#[derive(Debug, Eq, PartialEq)]
pub enum Route {
    /// Destination is self; deliver locally.
    Receive,
    /// No route known and the packet didn't originate locally; bounce it
    /// back the way it came. Kept as a distinct classification per
    /// spec.md §4.13's return-code list even though `route_for` currently
    /// always chooses `BackWithError` over this for the destination-unknown
    /// case.
    Back,
    /// Same as `Back`, but the caller should also set a routing-error flag
    /// on the bounced packet. `route_for` returns this (not `Back`) when a
    /// wire-arrived packet's destination has no routing entry at all.
    BackWithError,
    /// No next-hop history; flood to every active LP session except the
    /// arrival one (or every active session, if the packet originated
    /// locally rather than arriving over the wire).
    Broadcast,
    /// Seen this exact content hash before; drop silently.
    Drop,
    /// Forward unicast over this LP session.
    Unicast(u8),
}

/// `arrival_session`: `None` if the packet was generated locally rather than
/// received over LP (the local-origin case changes the broadcast fallback
/// per Section 4.13 step 6: "unless the arrival was local, in which case
/// broadcast to all").
pub fn route_for(
    routing: &RoutingTable,
    collisions: &CollisionTable,
    self_id: &PeerId,
    content_hash: [u8; 20],
    source: &PeerId,
    destination: &PeerId,
    arrival_session: Option<u8>,
    is_active: impl Fn(u8) -> bool,
    random_u32: impl Fn() -> u32,
) -> Route {
    if let Some(arrival) = arrival_session {
        if collisions.check_and_insert(content_hash, arrival) != NO_COLLISION {
            return Route::Drop;
        }
        let idx = routing.find_or_insert(source);
        routing.with_entry(idx, |e| e.history.insert(arrival));
    }

    if destination == self_id {
        return Route::Receive;
    }

    let idx = match routing.lookup(destination) {
        Some(idx) => idx,
        None => {
            return if arrival_session.is_some() { Route::BackWithError } else { Route::Broadcast };
        }
    };

    let exclude = arrival_session.unwrap_or(u8::MAX);
    let picked = routing.with_entry(idx, |e| e.history.pick_route(exclude, &random_u32, &is_active)).unwrap_or(NO_ROUTE);

    if picked == NO_ROUTE {
        Route::Broadcast
    } else {
        Route::Unicast(picked as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionTable;

    fn id(b: u8) -> PeerId {
        let mut id = [0u8; 20];
        id[0] = b;
        id
    }

    #[test]
    fn destination_self_is_received() {
        let routing = RoutingTable::default();
        let collisions = CollisionTable::default();
        let self_id = id(1);
        let route = route_for(&routing, &collisions, &self_id, [9; 20], &id(2), &self_id, Some(5), |_| true, || 0);
        assert_eq!(route, Route::Receive);
    }

    #[test]
    fn duplicate_content_hash_is_dropped() {
        let routing = RoutingTable::default();
        let collisions = CollisionTable::default();
        let self_id = id(1);
        let hash = [3u8; 20];
        let first = route_for(&routing, &collisions, &self_id, hash, &id(2), &self_id, Some(5), |_| true, || 0);
        assert_eq!(first, Route::Receive);
        let second = route_for(&routing, &collisions, &self_id, hash, &id(2), &self_id, Some(5), |_| true, || 0);
        assert_eq!(second, Route::Drop);
    }

    #[test]
    fn unknown_destination_with_no_history_broadcasts_or_bounces() {
        let routing = RoutingTable::default();
        let collisions = CollisionTable::default();
        let self_id = id(1);
        let dest = id(9);
        let from_wire = route_for(&routing, &collisions, &self_id, [1; 20], &id(2), &dest, Some(5), |_| true, || 0);
        assert_eq!(from_wire, Route::BackWithError);
        let from_local = route_for(&routing, &collisions, &self_id, [2; 20], &id(2), &dest, None, |_| true, || 0);
        assert_eq!(from_local, Route::Broadcast);
    }

    #[test]
    fn known_history_picks_unicast_excluding_arrival() {
        let routing = RoutingTable::default();
        let collisions = CollisionTable::default();
        let self_id = id(1);
        let dest = id(9);
        let idx = routing.find_or_insert(&dest);
        routing.with_entry(idx, |e| e.history.insert(7));
        let route = route_for(&routing, &collisions, &self_id, [5; 20], &id(2), &dest, Some(5), |_| true, || 0);
        assert_eq!(route, Route::Unicast(7));
    }

    #[test]
    fn known_destination_with_no_usable_route_floods_instead_of_bouncing() {
        let routing = RoutingTable::default();
        let collisions = CollisionTable::default();
        let self_id = id(1);
        let dest = id(9);
        let idx = routing.find_or_insert(&dest);
        // History names a session, but it's reported dead by `is_active`, so
        // `pick_route` has nothing usable to offer.
        routing.with_entry(idx, |e| e.history.insert(7));
        let route = route_for(&routing, &collisions, &self_id, [6; 20], &id(2), &dest, Some(5), |_| false, || 0);
        assert_eq!(route, Route::Broadcast);
    }
}
