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

//! Collaborator interfaces the core consumes.
//!
//! TLV wire encoding, socket I/O and multicast-group management are out of
//! scope; this module only defines the seam the core calls through.

use crate::link::LinkId;

/// Serializes and sends the current network-state summary on a link, and
/// controls multicast membership for that link's interface.
///
/// The summary itself (a compact digest of locally-held node records) is a
/// transport-layer wire concern; the core only needs to know *that* a send
/// happened, for its Trickle/keep-alive bookkeeping.
pub trait Transport {
    /// Serialize and send the current network-state summary on `link`.
    fn send_network_state(&mut self, link: LinkId);

    /// Join or leave the multicast group for interface `ifname`. Returns
    /// `false` on failure, driving the link into join-pending state.
    fn set_ifname_enabled(&mut self, ifname: &str, enabled: bool) -> bool;
}

/// Notified synchronously from the run loop whenever a node's
/// reachability flips.
pub trait NodeChangeSubscriber {
    /// `node` transitioned to `reachable` (or was just removed, with
    /// `reachable == false`, immediately before being dropped).
    fn node_changed(&mut self, node: &crate::node::NodeId, reachable: bool);
}

/// Notified synchronously from the run loop whenever the TLV set visible
/// for a node changes because of a reachability flip.
pub trait TlvChangeSubscriber {
    /// `node`'s visible TLVs changed from `old` to `new`. A reachability
    /// flip to unreachable reports `new = None`; a flip back to reachable
    /// reports `old = None`.
    fn tlvs_changed(
        &mut self,
        node: &crate::node::NodeId,
        old: Option<&crate::tlv::TlvContainer>,
        new: Option<&crate::tlv::TlvContainer>,
    );
}
