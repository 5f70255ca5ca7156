// DNCP: Distributed Node Consensus Protocol core
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The reachability pruner: bidirectional flood-fill from `self`,
//! bounding the registry to nodes transitively reachable from it, with a
//! grace window for transient outages.

use crate::node::NodeId;
use crate::registry::NodeRegistry;
use crate::subscriber::Subscribers;

/// Is `peer` a bidirectional neighbor of `from`: do both directions of
/// the relation appear in the respective nodes' published TLVs?
///
/// `from`'s TLVs already gave us a `NeighborTlv` pointing at `peer`
/// (that's how we got here); this checks that `peer`, in turn, publishes
/// a `NeighborTlv` pointing back at `from`.
fn is_bidirectional(registry: &NodeRegistry, from: NodeId, peer: NodeId) -> bool {
    match registry.lookup(&peer) {
        Some(peer_node) => peer_node.tlvs.neighbor_tlvs().any(|nb| nb.neighbor_node_id == from),
        None => false,
    }
}

/// Scheduling state for the reachability pruner, owned by
/// [`crate::engine::Dncp`].
#[derive(Debug, Clone, Copy)]
pub struct PruneState {
    /// Monotonic time of the most recent prune pass. Meaningless (and not
    /// to be compared against) until `has_pruned` is set — see
    /// [`is_reachable`].
    pub last_prune: u64,
    /// Earliest time at which the next pass should run, or `0` if none is
    /// scheduled.
    pub next_prune: u64,
    /// Set whenever something that could affect reachability changed
    /// since the last pass.
    pub graph_dirty: bool,
    /// Whether a prune pass has ever completed. Before the first pass, no
    /// node's reachability has been determined yet — not even `self`'s —
    /// so [`is_reachable`] must not fall back to comparing `0 ==
    /// last_prune`'s shared zero-initialized value, which would spuriously
    /// call every freshly-learned, not-yet-vetted node "reachable".
    pub has_pruned: bool,
}

impl Default for PruneState {
    fn default() -> Self {
        Self { last_prune: 0, next_prune: 0, graph_dirty: true, has_pruned: false }
    }
}

/// Run one prune pass.
///
/// `now` must be strictly greater than `state.last_prune` unless this is
/// the very first pass (`last_prune == 0` and no pass has run yet) —
/// equal timestamps mean the clock isn't monotonic, a fatal programmer
/// error. Panics accordingly; callers that cannot guarantee a strictly
/// monotonic clock must not call this function at all.
pub fn run(
    registry: &mut NodeRegistry,
    subs: &mut Subscribers,
    state: &mut PruneState,
    self_id: NodeId,
    now: u64,
    grace_period: u64,
) {
    assert!(
        state.last_prune == 0 || now != state.last_prune,
        "prune pass invoked twice at the same instant (last_prune={}, now={now})",
        state.last_prune
    );

    // Captured before this pass overwrites `state.last_prune`: this is the
    // timestamp the *previous* pass stamped reachable nodes with, mirroring
    // the C implementation's `o->last_prune` (still intact for the
    // duration of the pass it is read in).
    let prev_last_prune = state.last_prune;

    registry.begin_refresh();
    prune_rec(registry, subs, self_id, true, now, prev_last_prune);

    let grace_after = now.saturating_sub(grace_period);
    let mut next_time: u64 = 0;
    let stale: Vec<NodeId> = registry
        .iter()
        .filter(|(id, _)| !registry.is_current(id))
        .map(|(id, _)| *id)
        .collect();
    for id in stale {
        let last_reachable_prune = registry.lookup(&id).map(|n| n.last_reachable_prune).unwrap_or(0);
        if last_reachable_prune < grace_after {
            // past the grace window: let end_refresh drop it.
            continue;
        }
        let candidate = last_reachable_prune + grace_period + 1;
        next_time = if next_time == 0 { candidate } else { next_time.min(candidate) };
        registry.keep(&id);
        set_reachable(registry, subs, id, false, now, prev_last_prune);
    }

    registry.end_refresh(|id, _node| {
        subs.notify_node_changed(id, false);
    });

    state.last_prune = now;
    state.next_prune = next_time;
    state.graph_dirty = false;
    state.has_pruned = true;
}

fn prune_rec(
    registry: &mut NodeRegistry,
    subs: &mut Subscribers,
    id: NodeId,
    is_self: bool,
    now: u64,
    prev_last_prune: u64,
) {
    if registry.is_current(&id) {
        return;
    }
    let (has_tlvs, neighbors): (bool, Vec<NodeId>) = match registry.lookup(&id) {
        Some(node) if !node.tlvs.is_empty() || is_self => {
            (true, node.tlvs.neighbor_tlvs().map(|nb| nb.neighbor_node_id).collect())
        }
        _ => (false, Vec::new()),
    };
    if !has_tlvs {
        return;
    }

    registry.keep(&id);
    set_reachable(registry, subs, id, true, now, prev_last_prune);

    for neighbor_id in neighbors {
        if is_bidirectional(registry, id, neighbor_id) {
            prune_rec(registry, subs, neighbor_id, false, now, prev_last_prune);
        }
    }
}

fn set_reachable(
    registry: &mut NodeRegistry,
    subs: &mut Subscribers,
    id: NodeId,
    reachable: bool,
    now: u64,
    prev_last_prune: u64,
) {
    // A node was reachable "as of the previous pass" iff its stamp still
    // carries that pass's timestamp — mirrors the C `o->last_prune ==
    // n->last_reachable_prune` comparison, read before this pass's timestamp
    // overwrites `state.last_prune`.
    let was_reachable_last_pass = registry
        .lookup(&id)
        .map(|n| n.last_reachable_prune == prev_last_prune)
        .unwrap_or(false);
    if was_reachable_last_pass != reachable {
        if !reachable {
            let tlvs = registry.lookup(&id).map(|n| n.tlvs.clone());
            subs.notify_tlvs_changed(&id, tlvs.as_ref(), None);
        }
        subs.notify_node_changed(&id, reachable);
        if reachable {
            let tlvs = registry.lookup(&id).map(|n| n.tlvs.clone());
            subs.notify_tlvs_changed(&id, None, tlvs.as_ref());
        }
    }
    if reachable {
        if let Some(node) = registry.lookup_mut(&id) {
            node.last_reachable_prune = now;
        }
    }
}

/// Is `id` reachable, as determined by the most recent prune pass?
///
/// `self_id` is always reachable, even before the first prune pass has
/// ever run (spec §3: "Local node (`self`) is always treated as
/// reachable"). Every other node is reachable only once a pass has
/// actually vetted it: before `state.has_pruned`, no node's
/// `last_reachable_prune == state.last_prune == 0` comparison means
/// anything, and must not be read as "reachable".
pub fn is_reachable(registry: &NodeRegistry, state: &PruneState, self_id: NodeId, id: &NodeId) -> bool {
    if *id == self_id {
        return true;
    }
    state.has_pruned && registry.lookup(id).map(|n| n.last_reachable_prune == state.last_prune).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::tlv::{NeighborTlv, TlvContainer};
    use crate::link::EndpointId;

    fn id(n: u8) -> NodeId {
        NodeId::new([n; 8])
    }

    fn neighbor_tlv(peer: NodeId) -> TlvContainer {
        let mut c = TlvContainer::new();
        c.push(NeighborTlv { neighbor_node_id: peer, neighbor_endpoint_id: EndpointId(1), local_endpoint_id: EndpointId(1) }.encode());
        c
    }

    #[test]
    fn self_always_reachable_even_without_neighbors() {
        let mut registry = NodeRegistry::new();
        let s = id(1);
        registry.begin_refresh();
        registry.keep_or_insert_with(s, || Node::new(s, 1, TlvContainer::new(), 0));
        registry.end_refresh(|_, _| {});

        let mut subs = Subscribers::new();
        let mut state = PruneState::default();
        run(&mut registry, &mut subs, &mut state, s, 1_000, 60_000);
        assert!(is_reachable(&registry, &state, s, &s));
    }

    #[test]
    fn bidirectional_neighbor_is_reachable_unidirectional_is_not() {
        let mut registry = NodeRegistry::new();
        let s = id(1);
        let a = id(2);
        let b = id(3);
        registry.begin_refresh();
        registry.keep_or_insert_with(s, || Node::new(s, 1, neighbor_tlv(a), 0));
        registry.keep_or_insert_with(a, || Node::new(a, 1, neighbor_tlv(s), 0)); // bidirectional with s
        registry.keep_or_insert_with(b, || Node::new(b, 1, TlvContainer::new(), 0)); // never points at s
        registry.end_refresh(|_, _| {});

        let mut subs = Subscribers::new();
        let mut state = PruneState::default();
        run(&mut registry, &mut subs, &mut state, s, 1_000, 60_000);
        assert!(is_reachable(&registry, &state, s, &s));
        assert!(is_reachable(&registry, &state, s, &a));
        // `b` was never linked to by anyone and had no neighbor TLV of its
        // own pointing anywhere: after grace elapses it must be dropped.
        run(&mut registry, &mut subs, &mut state, s, 1_000 + 60_000 + 2, 60_000);
        assert!(registry.lookup(&b).is_none());
    }

    #[test]
    fn transient_unreachable_node_survives_within_grace() {
        let mut registry = NodeRegistry::new();
        let s = id(1);
        let a = id(2);
        registry.begin_refresh();
        registry.keep_or_insert_with(s, || Node::new(s, 1, neighbor_tlv(a), 0));
        registry.keep_or_insert_with(a, || Node::new(a, 1, neighbor_tlv(s), 0));
        registry.end_refresh(|_, _| {});

        let mut subs = Subscribers::new();
        let mut state = PruneState::default();
        run(&mut registry, &mut subs, &mut state, s, 1_000, 60_000);
        assert!(is_reachable(&registry, &state, s, &a));

        // `s` drops its neighbor TLV: `a` becomes unreachable but, within
        // the grace window, must still be present (just hidden).
        if let Some(node) = registry.lookup_mut(&s) {
            node.tlvs = TlvContainer::new();
        }
        run(&mut registry, &mut subs, &mut state, s, 2_000, 60_000);
        assert!(registry.lookup(&a).is_some());
        assert!(!is_reachable(&registry, &state, s, &a));

        // past the grace window, it is finally dropped.
        run(&mut registry, &mut subs, &mut state, s, 2_000 + 60_000 + 2, 60_000);
        assert!(registry.lookup(&a).is_none());
    }
}
