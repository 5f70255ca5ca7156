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

//! Per-node content hashing and the aggregate network hash.

use crate::node::NodeId;
use crate::tlv::TlvContainer;
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte digest, used both as a per-node content hash and as the
/// aggregate network hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// The all-zero hash, used as the initial/unset network hash so that
    /// the very first [`crate::engine::Dncp::run`] pass always sees a
    /// change once at least one node exists.
    pub const ZERO: Hash32 = Hash32([0u8; 32]);
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Compute the content hash of a node: `SHA-256(node-id ‖ sequence ‖
/// tlv_container)`. The TLV container is folded in its own on-the-wire
/// order (`TlvContainer` preserves insertion order) since the content hash
/// must detect reordering of a node's own attributes too.
pub fn content_hash(node_id: NodeId, sequence: u32, tlvs: &TlvContainer) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(node_id.0);
    hasher.update(sequence.to_be_bytes());
    for entry in tlvs.iter() {
        hasher.update(entry.tlv_type.to_be_bytes());
        hasher.update((entry.value.len() as u32).to_be_bytes());
        hasher.update(&entry.value);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash32(out)
}

/// Fold the content hashes of the given nodes, visited in ascending
/// node-id order, into the aggregate network hash.
///
/// The fold concatenates every digest (in order) before hashing once,
/// rather than hashing incrementally, so the result depends only on the
/// multiset of `(node-id, content_hash)` pairs and is reproducible by any
/// independent implementation that sorts by node-id the same way and
/// hashes the same concatenation.
pub fn network_hash<'a, I>(reachable: I) -> Hash32
where
    I: IntoIterator<Item = (&'a NodeId, &'a Hash32)>,
{
    let mut entries: Vec<(&NodeId, &Hash32)> = reachable.into_iter().collect();
    entries.sort_by_key(|(id, _)| **id);
    let mut hasher = Sha256::new();
    for (id, hash) in entries {
        hasher.update(id.0);
        hasher.update(hash.0);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash32(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TlvContainer;

    #[test]
    fn content_hash_changes_with_sequence() {
        let id = NodeId::new([1; 8]);
        let tlvs = TlvContainer::new();
        let h1 = content_hash(id, 1, &tlvs);
        let h2 = content_hash(id, 2, &tlvs);
        assert_ne!(h1, h2);
    }

    #[test]
    fn network_hash_is_order_independent_in_input() {
        let a = NodeId::new([1; 8]);
        let b = NodeId::new([2; 8]);
        let ha = Hash32([9; 32]);
        let hb = Hash32([8; 32]);
        let h1 = network_hash(vec![(&a, &ha), (&b, &hb)]);
        let h2 = network_hash(vec![(&b, &hb), (&a, &ha)]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn network_hash_detects_membership_change() {
        let a = NodeId::new([1; 8]);
        let b = NodeId::new([2; 8]);
        let ha = Hash32([9; 32]);
        let hb = Hash32([8; 32]);
        let h_both = network_hash(vec![(&a, &ha), (&b, &hb)]);
        let h_one = network_hash(vec![(&a, &ha)]);
        assert_ne!(h_both, h_one);
    }
}
