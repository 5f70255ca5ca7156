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

//! "tube-60": sixty nodes wired in a single line, each carrying a
//! handful of opaque TLVs (standing in for a full-size summary — our
//! container has no wire encoding or MTU to exceed, so the only
//! observable claim at this layer is that flooding a registry this size
//! works at all).
//!
//! Some deployments of this scale have nodes sharing a node-id after a
//! factory-reset collision; duplicate-id detection and eviction is not a
//! resolved behavior here, so this test exercises the topology's scale
//! and line-propagation depth without that wrinkle.

use crate::config::DncpConfig;
use crate::link::EndpointId;
use crate::node::NodeId;
use crate::sim::SimNetwork;

const TUBE_LEN: usize = 60;

fn id(n: usize) -> NodeId {
    NodeId::new([(n / 256) as u8, (n % 256) as u8, 0, 0, 0, 0, 0, 0])
}

fn conf() -> DncpConfig {
    DncpConfig { trickle_imin: 50, trickle_imax: 2_000, keepalive_interval: 5_000, ..DncpConfig::default() }
}

#[test]
fn line_converges_and_carries_a_full_tlv_load() {
    let mut net = SimNetwork::new(2);
    let indices: Vec<usize> = (0..TUBE_LEN).map(|n| net.add_node(id(n), conf()).unwrap()).collect();

    for &i in &indices {
        for t in 0..28u16 {
            net.dncp_mut(i).add_tlv(100 + t, vec![t as u8; 4]);
        }
    }

    for w in 0..TUBE_LEN - 1 {
        let a = indices[w];
        let b = indices[w + 1];
        net.connect(a, &format!("eth{}", w), EndpointId(1), b, &format!("eth{}", w), EndpointId(2), None);
    }

    net.run_until(300_000);

    for &i in &indices {
        assert_eq!(net.dncp(i).node_count(), TUBE_LEN, "node {} did not learn the full line", i);
        let mut tlv_count = 0;
        net.dncp(i).for_each_node(|n| tlv_count += n.tlvs.len());
        assert_eq!(tlv_count, TUBE_LEN * 28, "node {} is missing some published TLVs", i);
    }

    let reference = net.dncp(indices[0]).network_hash();
    for &i in &indices[1..] {
        assert_eq!(net.dncp(i).network_hash(), reference, "node {} disagrees on the network hash", i);
    }
}
