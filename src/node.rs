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

//! Module defining the opaque node identifier and the per-node record kept
//! in the [`NodeRegistry`](crate::registry::NodeRegistry).

use crate::hash::Hash32;
use crate::tlv::TlvContainer;
use std::fmt;

/// Width, in bytes, of an opaque node identifier.
///
/// Wire formats pick their own width (commonly a truncated SHA-256 of the
/// router's public key); the core only needs a fixed-size, `Copy`, `Ord`
/// value that can be carried through the registry and folded into the
/// network hash in a stable order.
pub const NODE_ID_LEN: usize = 8;

/// Opaque node identifier, unique within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    /// Build a node-id from a raw byte array.
    pub fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A single participant's record, as held by the local node registry.
///
/// `self` (the local node) is represented by the same struct; callers
/// distinguish it only by comparing its id against
/// [`crate::engine::Dncp::node_id`].
#[derive(Debug, Clone)]
pub struct Node {
    node_id: NodeId,
    /// Monotonic timestamp, in milliseconds, when this node last republished.
    pub origination_time: u64,
    /// 32-bit counter, wraps; monotonic per node-id under normal operation.
    pub sequence: u32,
    /// The valid TLV sequence as last accepted.
    pub tlvs: TlvContainer,
    /// Hash over node-id ‖ sequence ‖ tlv_container.
    pub content_hash: Hash32,
    /// Monotonic time of the most recent prune pass that reached this node.
    ///
    /// Compared against the registry's `last_prune` to decide reachability:
    /// a node is reachable iff `last_reachable_prune == last_prune`.
    pub last_reachable_prune: u64,
}

impl Node {
    /// Create a new node record from its first accepted publication.
    ///
    /// Nodes are created on first receipt of a publication under a new
    /// node-id (or on boot, for `self`); there is no empty placeholder
    /// state prior to this.
    pub fn new(node_id: NodeId, sequence: u32, tlvs: TlvContainer, now: u64) -> Self {
        let content_hash = crate::hash::content_hash(node_id, sequence, &tlvs);
        Self { node_id, origination_time: now, sequence, tlvs, content_hash, last_reachable_prune: 0 }
    }

    /// The node's identifier.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Recompute `content_hash` from the current `sequence` and `tlvs`.
    /// Callers must invoke this after any mutation of either field.
    pub fn refresh_content_hash(&mut self) {
        self.content_hash = crate::hash::content_hash(self.node_id, self.sequence, &self.tlvs);
    }

    /// Accept a higher-sequence publication for this node, replacing its
    /// TLV container and bumping bookkeeping fields. Returns `false` (and
    /// leaves the node untouched) if `sequence` is not newer than the one
    /// already held — a stale publication is silently discarded by the
    /// caller checking this return value.
    pub fn accept_publication(&mut self, sequence: u32, tlvs: TlvContainer, now: u64) -> bool {
        if !sequence_is_newer(self.sequence, sequence) {
            return false;
        }
        self.sequence = sequence;
        self.tlvs = tlvs;
        self.origination_time = now;
        self.refresh_content_hash();
        true
    }
}

/// Serial-number comparison per RFC 1982: is `b` strictly newer than `a`?
///
/// The sequence counter wraps at 2^32; a plain `b > a` comparison would
/// reject a legitimately-newer publication right after wraparound, so
/// ordering must account for the wrap rather than comparing raw values.
pub fn sequence_is_newer(a: u32, b: u32) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff < (1u32 << 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_sequence_detection() {
        assert!(sequence_is_newer(0, 1));
        assert!(!sequence_is_newer(1, 0));
        assert!(!sequence_is_newer(5, 5));
        // wraparound: a = u32::MAX, b = 0 is newer.
        assert!(sequence_is_newer(u32::MAX, 0));
        assert!(!sequence_is_newer(0, u32::MAX));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn never_newer_than_self(a: u32) {
            prop_assert!(!sequence_is_newer(a, a));
        }

        #[test]
        fn not_both_ways_at_once(a: u32, b: u32) {
            prop_assert!(!(sequence_is_newer(a, b) && sequence_is_newer(b, a)));
        }
    }
}
