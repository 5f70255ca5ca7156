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

//! Subscriber registration, owned by the [`crate::engine::Dncp`] handle
//! rather than any process-wide static.

use crate::node::NodeId;
use crate::tlv::TlvContainer;
use crate::transport::{NodeChangeSubscriber, TlvChangeSubscriber};

/// Subscriber registry owned by a single [`crate::engine::Dncp`] handle.
#[derive(Default)]
pub struct Subscribers {
    node_change: Vec<Box<dyn NodeChangeSubscriber>>,
    tlv_change: Vec<Box<dyn TlvChangeSubscriber>>,
}

impl Subscribers {
    /// An empty subscriber list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node-reachability subscriber.
    pub fn add_node_change(&mut self, sub: Box<dyn NodeChangeSubscriber>) {
        self.node_change.push(sub);
    }

    /// Register a TLV-visibility subscriber.
    pub fn add_tlv_change(&mut self, sub: Box<dyn TlvChangeSubscriber>) {
        self.tlv_change.push(sub);
    }

    /// Fire `node_changed` on every registered subscriber, in registration
    /// order. Called synchronously from the pruner, before the network
    /// hash is recomputed.
    pub fn notify_node_changed(&mut self, node: &NodeId, reachable: bool) {
        for sub in &mut self.node_change {
            sub.node_changed(node, reachable);
        }
    }

    /// Fire `tlvs_changed` on every registered subscriber, in registration
    /// order.
    pub fn notify_tlvs_changed(
        &mut self,
        node: &NodeId,
        old: Option<&TlvContainer>,
        new: Option<&TlvContainer>,
    ) {
        for sub in &mut self.tlv_change {
            sub.tlvs_changed(node, old, new);
        }
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("node_change", &self.node_change.len())
            .field("tlv_change", &self.tlv_change.len())
            .finish()
    }
}
