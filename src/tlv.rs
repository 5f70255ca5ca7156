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

//! Per-node TLV payload.
//!
//! Wire encoding and parsing are out of scope for this crate; the core
//! only needs an ordered collection of typed byte blobs it can hash, diff,
//! and walk looking for neighbor-relation entries.

use crate::link::EndpointId;
use crate::node::NodeId;

/// Reserved TLV type used for the neighbor-relation attribute: the one TLV
/// type the core interprets natively, since the pruner and the
/// bidirectional-relation check both need to walk it.
pub const TLV_TYPE_NEIGHBOR: u16 = 2;

/// A single type-length-value entry. The core treats `value` as an opaque
/// byte blob except when `tlv_type == TLV_TYPE_NEIGHBOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvEntry {
    /// TLV type code.
    pub tlv_type: u16,
    /// Opaque payload.
    pub value: Vec<u8>,
}

/// An opaque handle to a staged local TLV edit, returned by
/// [`crate::engine::Dncp::add_tlv`] and consumed by
/// [`crate::engine::Dncp::remove_tlv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlvHandle(pub(crate) u64);

/// The ordered TLV sequence published by a single node.
///
/// Order matters for the content hash but not for lookups; `Vec` is the
/// simplest structure satisfying both, matching typical TLV payload
/// sizes of a few dozen entries per node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvContainer {
    entries: Vec<TlvEntry>,
}

impl TlvContainer {
    /// An empty container.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Build a container from entries already in wire order.
    pub fn from_entries(entries: Vec<TlvEntry>) -> Self {
        Self { entries }
    }

    /// Iterate entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &TlvEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the first entry matching `tlv_type` and `value`.
    pub fn find(&self, tlv_type: u16, value: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.tlv_type == tlv_type && e.value == value)
    }

    /// Push a new entry, returning its index.
    pub fn push(&mut self, entry: TlvEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Remove the entry at `index`.
    pub fn remove(&mut self, index: usize) -> Option<TlvEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Decode the neighbor-relation TLVs held in this container.
    pub fn neighbor_tlvs(&self) -> impl Iterator<Item = NeighborTlv> + '_ {
        self.entries.iter().filter_map(|e| {
            if e.tlv_type == TLV_TYPE_NEIGHBOR {
                NeighborTlv::decode(&e.value)
            } else {
                None
            }
        })
    }
}

/// Decoded neighbor-relation TLV: "I see peer `neighbor_node_id` on my
/// `local_endpoint_id`, reachable via its `neighbor_endpoint_id`".
///
/// This is the only TLV shape the core must understand, used by the
/// reachability pruner to walk the neighbor graph and by the
/// bidirectional-relation predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborTlv {
    /// The node-id of the peer this TLV refers to.
    pub neighbor_node_id: NodeId,
    /// The endpoint on the peer's side of the relation.
    pub neighbor_endpoint_id: EndpointId,
    /// The endpoint on the publishing node's side of the relation.
    pub local_endpoint_id: EndpointId,
}

impl NeighborTlv {
    const WIRE_LEN: usize = crate::node::NODE_ID_LEN + 4 + 4;

    /// Encode into a [`TlvEntry`] suitable for [`TlvContainer::push`].
    pub fn encode(&self) -> TlvEntry {
        let mut value = Vec::with_capacity(Self::WIRE_LEN);
        value.extend_from_slice(&self.neighbor_node_id.0);
        value.extend_from_slice(&self.neighbor_endpoint_id.0.to_be_bytes());
        value.extend_from_slice(&self.local_endpoint_id.0.to_be_bytes());
        TlvEntry { tlv_type: TLV_TYPE_NEIGHBOR, value }
    }

    /// Decode a [`TlvEntry`] payload previously produced by [`encode`](Self::encode).
    pub(crate) fn decode(value: &[u8]) -> Option<Self> {
        if value.len() != Self::WIRE_LEN {
            return None;
        }
        let mut node_id = [0u8; crate::node::NODE_ID_LEN];
        node_id.copy_from_slice(&value[0..crate::node::NODE_ID_LEN]);
        let mut off = crate::node::NODE_ID_LEN;
        let neighbor_endpoint_id =
            EndpointId(u32::from_be_bytes(value[off..off + 4].try_into().ok()?));
        off += 4;
        let local_endpoint_id =
            EndpointId(u32::from_be_bytes(value[off..off + 4].try_into().ok()?));
        Some(Self {
            neighbor_node_id: NodeId::new(node_id),
            neighbor_endpoint_id,
            local_endpoint_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_tlv_roundtrips() {
        let t = NeighborTlv {
            neighbor_node_id: NodeId::new([7; 8]),
            neighbor_endpoint_id: EndpointId(3),
            local_endpoint_id: EndpointId(1),
        };
        let entry = t.encode();
        let mut c = TlvContainer::new();
        c.push(entry);
        let decoded: Vec<_> = c.neighbor_tlvs().collect();
        assert_eq!(decoded, vec![t]);
    }

    #[test]
    fn find_and_remove() {
        let mut c = TlvContainer::new();
        let idx = c.push(TlvEntry { tlv_type: 99, value: vec![1, 2, 3] });
        assert_eq!(c.find(99, &[1, 2, 3]), Some(idx));
        assert!(c.remove(idx).is_some());
        assert_eq!(c.find(99, &[1, 2, 3]), None);
    }
}
