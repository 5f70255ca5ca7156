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

//! The `Dncp` handle and its run loop.
//!
//! This is the one synchronous entry point that mutates the registry,
//! links and neighbor table; inbound-intake methods (`handle_*`) either
//! mutate directly and request an immediate wakeup, or queue an effect
//! for the run loop to apply, preserving the single-mutator discipline.

use crate::clock::{Clock, Scheduler};
use crate::config::DncpConfig;
use crate::error::DncpError;
use crate::hash::Hash32;
use crate::link::{EndpointId, Link, LinkConfig, LinkId};
use crate::neighbor::{NeighborKey, NeighborTable};
use crate::node::{Node, NodeId};
use crate::prune::{self, PruneState};
use crate::registry::NodeRegistry;
use crate::subscriber::Subscribers;
use crate::tlv::{TlvContainer, TlvEntry, TlvHandle, NeighborTlv, TLV_TYPE_NEIGHBOR};
use crate::transport::{NodeChangeSubscriber, TlvChangeSubscriber, Transport};
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Staged local TLV edits, applied atomically to `self`'s published
/// container by `self_flush`.
#[derive(Debug, Default)]
struct LocalTlvs {
    entries: Vec<(TlvHandle, TlvEntry)>,
    next_handle: u64,
}

impl LocalTlvs {
    fn add(&mut self, entry: TlvEntry) -> TlvHandle {
        let handle = TlvHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, entry));
        handle
    }

    fn remove(&mut self, handle: TlvHandle) -> Option<TlvEntry> {
        let pos = self.entries.iter().position(|(h, _)| *h == handle)?;
        Some(self.entries.remove(pos).1)
    }

    fn find(&self, tlv_type: u16, value: &[u8]) -> Option<TlvHandle> {
        self.entries
            .iter()
            .find(|(_, e)| e.tlv_type == tlv_type && e.value == value)
            .map(|(h, _)| *h)
    }

    fn to_container(&self) -> TlvContainer {
        TlvContainer::from_entries(self.entries.iter().map(|(_, e)| e.clone()).collect())
    }
}

/// The DNCP protocol engine: one node's view of the cluster.
///
/// Owns every piece of mutable, process-local, single-threaded state:
/// the registry, links, neighbor table, network hash, and the dirty
/// flags that tie them together. All mutating entry points take
/// `&mut self`, so the borrow checker enforces "only one mutator at a
/// time" for free.
pub struct Dncp {
    self_id: NodeId,
    conf: DncpConfig,
    registry: NodeRegistry,
    links: Vec<Option<Link>>,
    neighbors: NeighborTable,
    prune_state: PruneState,
    network_hash: Hash32,
    network_hash_dirty: bool,
    tlvs_dirty: bool,
    local: LocalTlvs,
    immediate_scheduled: bool,
    disable_prune: bool,
    pending_trickle_reset: bool,
    pending_consistent: Vec<LinkId>,
    subscribers: Subscribers,
    rng: StdRng,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for Dncp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dncp")
            .field("self_id", &self.self_id)
            .field("links", &self.links.len())
            .field("nodes", &self.registry.len())
            .field("network_hash", &self.network_hash)
            .finish()
    }
}

impl Dncp {
    /// Construct a fresh engine. `self`'s node record is created
    /// immediately, on boot, rather than waiting for a first publication.
    pub fn new(
        self_id: NodeId,
        conf: DncpConfig,
        clock: Box<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, DncpError> {
        conf.validate()?;
        let now = clock.now_ms();
        let mut registry = NodeRegistry::new();
        registry.begin_refresh();
        registry.keep_or_insert_with(self_id, || Node::new(self_id, 0, TlvContainer::new(), now));
        registry.end_refresh(|_, _| {});

        Ok(Self {
            self_id,
            conf,
            registry,
            links: Vec::new(),
            neighbors: NeighborTable::new(),
            prune_state: PruneState::default(),
            network_hash: Hash32::ZERO,
            network_hash_dirty: true,
            tlvs_dirty: false,
            local: LocalTlvs::default(),
            immediate_scheduled: false,
            disable_prune: false,
            pending_trickle_reset: false,
            pending_consistent: Vec::new(),
            subscribers: Subscribers::new(),
            rng: StdRng::from_entropy(),
            clock,
            scheduler,
            transport,
        })
    }

    /// This engine's own node-id.
    pub fn node_id(&self) -> NodeId {
        self.self_id
    }

    /// The most recently computed aggregate network hash.
    pub fn network_hash(&self) -> Hash32 {
        self.network_hash
    }

    /// Number of node records currently held (reachable or within grace).
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Disable the reachability pruner, e.g. for tests exercising the
    /// registry/trickle machinery in isolation.
    pub fn set_disable_prune(&mut self, disabled: bool) {
        self.disable_prune = disabled;
    }

    // ---- §6 "Core EXPOSES" -------------------------------------------------

    /// Stage a local TLV edit; the next run-loop pass republishes.
    pub fn add_tlv(&mut self, tlv_type: u16, value: Vec<u8>) -> TlvHandle {
        let is_neighbor = tlv_type == TLV_TYPE_NEIGHBOR;
        let handle = self.local.add(TlvEntry { tlv_type, value });
        self.tlvs_dirty = true;
        if is_neighbor {
            self.prune_state.graph_dirty = true;
        }
        self.request_immediate_wake();
        handle
    }

    /// Unstage (or, if already published, stop republishing) a local TLV.
    pub fn remove_tlv(&mut self, handle: TlvHandle) -> Result<(), DncpError> {
        let entry = self.local.remove(handle).ok_or(DncpError::UnknownTlvHandle)?;
        self.tlvs_dirty = true;
        if entry.tlv_type == TLV_TYPE_NEIGHBOR {
            self.prune_state.graph_dirty = true;
        }
        self.request_immediate_wake();
        Ok(())
    }

    /// Find a staged local TLV matching `tlv_type`/`value`.
    pub fn find_tlv(&self, tlv_type: u16, value: &[u8]) -> Option<TlvHandle> {
        self.local.find(tlv_type, value)
    }

    /// Run `f` over every held node record.
    pub fn for_each_node(&self, f: impl FnMut(&Node)) {
        self.registry.for_each_node(f);
    }

    /// Run `f` over every currently-staged local TLV.
    pub fn for_each_local_tlv(&self, mut f: impl FnMut(&TlvEntry)) {
        for (_, entry) in &self.local.entries {
            f(entry);
        }
    }

    /// Add a link in join-pending state; the run loop attempts the first
    /// multicast join on its next pass.
    pub fn add_link(&mut self, ifname: impl Into<String>, endpoint_id: EndpointId, conf: Option<LinkConfig>) -> LinkId {
        let conf = conf.unwrap_or_else(|| LinkConfig::from_defaults(&self.conf));
        let link = Link::new(ifname, endpoint_id, conf);
        self.links.push(Some(link));
        self.links.len() - 1
    }

    /// Tear down a link (interface removal). Also drops any neighbors
    /// observed on it.
    pub fn remove_link(&mut self, link: LinkId) -> Result<(), DncpError> {
        let slot = self.links.get_mut(link).ok_or(DncpError::UnknownLink(link))?;
        if slot.take().is_none() {
            return Err(DncpError::UnknownLink(link));
        }
        let stale: Vec<NeighborKey> = self.neighbors.for_link(link).map(|(k, _)| *k).collect();
        for key in stale {
            self.neighbors.remove(&key);
        }
        Ok(())
    }

    /// Find a link by the endpoint-id it is named by in neighbor TLVs.
    pub fn find_ep_by_id(&self, endpoint_id: EndpointId) -> Option<LinkId> {
        self.links
            .iter()
            .enumerate()
            .find_map(|(i, l)| l.as_ref().filter(|l| l.endpoint_id() == endpoint_id).map(|_| i))
    }

    /// Find a link by its backing interface name.
    pub fn find_ep_by_name(&self, ifname: &str) -> Option<LinkId> {
        self.links
            .iter()
            .enumerate()
            .find_map(|(i, l)| l.as_ref().filter(|l| l.ifname() == ifname).map(|_| i))
    }

    /// Read-only view of a link's current state (Trickle counters, join
    /// status), for telemetry and testing.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id).and_then(|l| l.as_ref())
    }

    /// Register a node-reachability subscriber.
    pub fn subscribe_node_changes(&mut self, sub: Box<dyn NodeChangeSubscriber>) {
        self.subscribers.add_node_change(sub);
    }

    /// Register a TLV-visibility subscriber.
    pub fn subscribe_tlv_changes(&mut self, sub: Box<dyn TlvChangeSubscriber>) {
        self.subscribers.add_tlv_change(sub);
    }

    // ---- Inbound intake -----------------------------------------------------

    /// A higher-sequence publication was received for `node_id` (or this
    /// is the node's first publication). Returns `true` if it was
    /// accepted; a stale (`sequence <= held`) publication is discarded
    /// silently and this returns `false`.
    pub fn handle_node_publication(&mut self, node_id: NodeId, sequence: u32, tlvs: TlvContainer, now: u64) -> bool {
        if node_id == self.self_id {
            // `self`'s own publications only ever come from `self_flush`.
            return false;
        }
        let accepted = if let Some(node) = self.registry.lookup_mut(&node_id) {
            node.accept_publication(sequence, tlvs, now)
        } else {
            self.registry.keep_or_insert_with(node_id, || Node::new(node_id, sequence, tlvs, now));
            true
        };
        if accepted {
            self.prune_state.graph_dirty = true;
            self.network_hash_dirty = true;
            self.request_immediate_wake();
        }
        accepted
    }

    /// Record contact with a peer on `link` (e.g. any message received
    /// from it), refreshing its liveness deadline.
    pub fn handle_neighbor_contact(&mut self, link: LinkId, peer_node_id: NodeId, peer_endpoint_id: EndpointId, now: u64, keepalive_interval: u64) {
        let key = NeighborKey { link, node_id: peer_node_id, endpoint_id: peer_endpoint_id };
        self.neighbors.observe(key, now, keepalive_interval);
    }

    /// A network-state summary was received on `link`. `consistent`
    /// reports whether it matched the locally-held network hash. The
    /// actual Trickle mutation is deferred to the next `run()` pass to
    /// preserve the single-mutator discipline and the "reset is atomic
    /// with the hash change" guarantee.
    pub fn handle_network_state_summary(&mut self, link: LinkId, consistent: bool) {
        if consistent {
            self.pending_consistent.push(link);
        } else {
            self.pending_trickle_reset = true;
        }
        self.request_immediate_wake();
    }

    fn request_immediate_wake(&mut self) {
        if !self.immediate_scheduled {
            self.scheduler.schedule(0);
        }
    }

    // ---- Run Loop -------------------------------------------------------------

    /// Execute one synchronous run-loop pass. Safe to call spuriously or
    /// late; idempotent when no external input occurred since the last
    /// call.
    pub fn run(&mut self) {
        let now = self.clock.now_ms();
        self.immediate_scheduled = true;
        let mut next: u64 = 0;

        // Step 2: proactive republish before sequence wrap.
        if !self.tlvs_dirty {
            let deadline = self.self_origination_time() + self.conf.sequence_relife;
            if deadline <= now {
                self.tlvs_dirty = true;
            } else {
                accumulate(&mut next, deadline);
            }
        }

        // Step 3: flush pending local TLV edits onto `self`.
        self.self_flush(now);

        // Step 4: reachability pruner.
        if !self.disable_prune {
            if self.prune_state.graph_dirty {
                self.prune_state.next_prune =
                    self.prune_state.next_prune.max(self.prune_state.last_prune + self.conf.min_prune_interval);
            }
            if self.prune_state.next_prune != 0 && self.prune_state.next_prune <= now {
                self.prune_state.graph_dirty = false;
                prune::run(&mut self.registry, &mut self.subscribers, &mut self.prune_state, self.self_id, now, self.conf.grace_period);
            }
            accumulate(&mut next, self.prune_state.next_prune);
        }

        // Step 5: allow further change-triggered immediate wakeups again.
        self.immediate_scheduled = false;

        // Apply queued inbound Trickle effects before stepping Trickle,
        // so a send this pass always reflects the latest inputs.
        for link in self.pending_consistent.drain(..) {
            if let Some(Some(l)) = self.links.get_mut(link) {
                l.trickle_c += 1;
            }
        }
        let inconsistent_received = std::mem::replace(&mut self.pending_trickle_reset, false);

        // Step 6: recompute the network hash if dirty.
        if self.network_hash_dirty {
            let reachable: Vec<(NodeId, Hash32)> = self
                .registry
                .iter()
                .filter(|(id, _)| prune::is_reachable(&self.registry, &self.prune_state, self.self_id, id))
                .map(|(id, n)| (*id, n.content_hash))
                .collect();
            let new_hash = crate::hash::network_hash(reachable.iter().map(|(id, h)| (id, h)));
            let changed = new_hash != self.network_hash;
            self.network_hash = new_hash;
            self.network_hash_dirty = false;
            if changed {
                debug!("network hash changed to {:?}, resetting trickle on all active links", self.network_hash);
                self.reset_all_trickle(now);
            }
        }
        if inconsistent_received {
            debug!("inconsistent network-state summary received, resetting trickle on all active links");
            self.reset_all_trickle(now);
        }

        // Step 7: advance each link's join-pending retry or Trickle step.
        for i in 0..self.links.len() {
            if let Some(deadline) = self.step_link(i, now) {
                accumulate(&mut next, deadline);
            }
        }

        // Step 8: expire locally-held neighbor TLVs whose peer went quiet.
        accumulate(&mut next, self.expire_neighbors(now));

        // Step 9: schedule the next wakeup.
        if next > now && !self.immediate_scheduled {
            self.scheduler.schedule(next - now);
        }
    }

    fn self_origination_time(&self) -> u64 {
        self.registry.lookup(&self.self_id).map(|n| n.origination_time).unwrap_or(0)
    }

    /// Atomically install a new TLV container on `self`, bumping
    /// `sequence` and `origination_time`, if an edit is pending.
    fn self_flush(&mut self, now: u64) {
        if !self.tlvs_dirty {
            return;
        }
        let tlvs = self.local.to_container();
        if let Some(node) = self.registry.lookup_mut(&self.self_id) {
            node.sequence = node.sequence.wrapping_add(1);
            node.tlvs = tlvs;
            node.origination_time = now;
            node.refresh_content_hash();
            node.last_reachable_prune = now; // `self` is always reachable.
        }
        self.tlvs_dirty = false;
        self.network_hash_dirty = true;
        trace!("self_flush: republished at sequence {:?}", self.registry.lookup(&self.self_id).map(|n| n.sequence));
    }

    fn reset_all_trickle(&mut self, now: u64) {
        for slot in &mut self.links {
            if let Some(link) = slot {
                if link.is_active() {
                    crate::trickle::trickle_set(link, link.conf.trickle_imin, now, &mut self.rng);
                }
            }
        }
    }

    /// Advance link `i` by one run-loop step, returning its next deadline
    /// if any.
    fn step_link(&mut self, i: usize, now: u64) -> Option<u64> {
        let rejoin_interval = self.conf.rejoin_interval;
        let ifname = self.links[i].as_ref()?.ifname().to_string();

        if self.links[i].as_ref()?.join_failed_time != 0 {
            let join_failed_time = self.links[i].as_ref()?.join_failed_time;
            // `NEVER_JOINED` (the just-created sentinel) is always due
            // immediately; a real backdated failure time uses the normal
            // `+ rejoin_interval` deadline.
            let retry_at = if join_failed_time == Link::NEVER_JOINED {
                now
            } else {
                join_failed_time.saturating_add(rejoin_interval)
            };
            if retry_at <= now {
                if self.transport.set_ifname_enabled(&ifname, true) {
                    let link = self.links[i].as_mut()?;
                    link.join_failed_time = 0;
                    if link.conf.keepalive_interval > 0 {
                        link.next_keepalive_time = now + link.conf.keepalive_interval;
                    }
                    let imin = link.conf.trickle_imin;
                    crate::trickle::trickle_set(link, imin, now, &mut self.rng);
                } else {
                    warn!("link {} failed to join multicast, retrying in {}ms", ifname, rejoin_interval);
                    self.links[i].as_mut()?.join_failed_time = now;
                }
            }
            // Re-read: join may have just succeeded above.
            let link = self.links[i].as_ref()?;
            if link.join_failed_time != 0 {
                return Some(link.join_failed_time.saturating_add(rejoin_interval));
            }
        }

        let link = self.links[i].as_mut()?;
        let action = crate::trickle::step(link, now, &mut self.rng);
        match action {
            crate::trickle::TrickleAction::Send | crate::trickle::TrickleAction::KeepAlive => {
                self.transport.send_network_state(i);
                let link = self.links[i].as_mut()?;
                crate::trickle::record_send(link, now);
                if action == crate::trickle::TrickleAction::KeepAlive {
                    let i_now = link.trickle_i;
                    crate::trickle::trickle_set(link, i_now, now, &mut self.rng);
                }
            }
            _ => {}
        }
        crate::trickle::next_deadline(self.links[i].as_ref()?)
    }

    /// Drop locally-published neighbor TLVs whose peer has not been
    /// heard from within `keepalive_interval * KEEPALIVE_MULT`.
    fn expire_neighbors(&mut self, now: u64) -> Option<u64> {
        let mut next: u64 = 0;
        let mut to_drop = Vec::new();
        for (handle, entry) in &self.local.entries {
            if entry.tlv_type != TLV_TYPE_NEIGHBOR {
                continue;
            }
            let nb = match NeighborTlv::decode(&entry.value) {
                Some(nb) => nb,
                None => continue,
            };
            let link = match self.find_ep_by_id(nb.local_endpoint_id) {
                Some(l) => l,
                None => continue,
            };
            let key = NeighborKey { link, node_id: nb.neighbor_node_id, endpoint_id: nb.neighbor_endpoint_id };
            let neighbor = match self.neighbors.get(&key) {
                Some(n) => *n,
                None => continue,
            };
            let deadline = neighbor.last_sync + (neighbor.keepalive_interval as f64 * self.conf.keepalive_multiplier) as u64;
            if deadline <= now {
                to_drop.push((*handle, key));
            } else {
                accumulate(&mut next, deadline);
            }
        }
        for (handle, key) in to_drop {
            debug!("neighbor {:?} on link {} gone, dropping its neighbor tlv", key.node_id, key.link);
            self.local.remove(handle);
            self.neighbors.remove(&key);
            self.tlvs_dirty = true;
            self.prune_state.graph_dirty = true;
        }
        if next == 0 {
            None
        } else {
            Some(next)
        }
    }
}

fn accumulate(next: &mut u64, candidate: u64) {
    if candidate != 0 && (*next == 0 || candidate < *next) {
        *next = candidate;
    }
}
