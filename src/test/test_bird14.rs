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

//! The 11-node "bird-14" topology (named for the physical test rig it
//! was originally measured on), a single CPE router with two uplinks
//! feeding a meshy interior. Must converge well inside 10 simulated
//! seconds.
//!
//! ```text
//! cpe -- b1 -- b5 -- b6 -- b7 -- b10
//!   \     |\          |     /    |
//!    \    | \-- b9 ---+----+     |
//!     \   |        \        \    |
//!      b2-+         b4 -- b8 ----+
//!       \           /
//!        +-- b3 ---+
//! ```

use crate::config::DncpConfig;
use crate::link::EndpointId;
use crate::node::NodeId;
use crate::sim::SimNetwork;

const NODE_NAMES: [&str; 11] = ["cpe", "b1", "b2", "b3", "b4", "b5", "b6", "b7", "b8", "b9", "b10"];

const EDGES: &[(&str, &str)] = &[
    ("cpe", "b1"),
    ("cpe", "b2"),
    ("b1", "b5"),
    ("b1", "b2"),
    ("b1", "b9"),
    ("b2", "b3"),
    ("b3", "b4"),
    ("b4", "b8"),
    ("b4", "b9"),
    ("b5", "b6"),
    ("b6", "b9"),
    ("b6", "b7"),
    ("b7", "b10"),
    ("b8", "b10"),
    ("b9", "b10"),
];

fn id(n: u8) -> NodeId {
    NodeId::new([n; 8])
}

fn conf() -> DncpConfig {
    DncpConfig { trickle_imin: 50, trickle_imax: 1_000, keepalive_interval: 2_000, ..DncpConfig::default() }
}

#[test]
fn converges_within_ten_seconds() {
    let mut net = SimNetwork::new(2);
    let indices: Vec<usize> = (0..NODE_NAMES.len())
        .map(|i| net.add_node(id(i as u8 + 1), conf()).unwrap())
        .collect();

    let mut ep_counter = 0u32;
    for (from_name, to_name) in EDGES {
        let a = indices[NODE_NAMES.iter().position(|n| n == from_name).unwrap()];
        let b = indices[NODE_NAMES.iter().position(|n| n == to_name).unwrap()];
        ep_counter += 1;
        let ep_a = EndpointId(ep_counter);
        let ifname_a = format!("eth{}", ep_counter);
        ep_counter += 1;
        let ep_b = EndpointId(ep_counter);
        let ifname_b = format!("eth{}", ep_counter);
        net.connect(a, &ifname_a, ep_a, b, &ifname_b, ep_b, None);
    }

    net.run_until(10_000);

    for &i in &indices {
        assert_eq!(net.dncp(i).node_count(), NODE_NAMES.len(), "node {} did not learn the full topology", i);
    }
    let reference = net.dncp(indices[0]).network_hash();
    for &i in &indices[1..] {
        assert_eq!(net.dncp(i).network_hash(), reference, "node {} disagrees on the network hash", i);
    }
}
