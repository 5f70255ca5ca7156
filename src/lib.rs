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

#![deny(missing_docs)]

//! # DNCP: Distributed Node Consensus Protocol
//!
//! A flood-synchronized, eventually-consistent database of small
//! typed-attribute records shared by every node in a cluster, built for
//! home-router-style networks where nodes join and leave constantly and
//! no node can be assumed always reachable.
//!
//! Every node publishes its own record — an ordered set of TLVs plus a
//! monotonically increasing sequence number — and learns everyone else's
//! by receiving full or partial network-state summaries from its
//! neighbors. [Trickle](https://www.rfc-editor.org/rfc/rfc6206) bounds
//! how often a node re-advertises, so a stable network asymptotically
//! settles into near-silence, while any actual change (a new node, a
//! TLV edit, a lost link) propagates within a few suppressed intervals.
//!
//! ## Structure
//!
//! - **[`engine`]**: the [`Dncp`](engine::Dncp) handle — construction,
//!   local TLV publication, and the run loop (the only synchronous
//!   mutator of all other state).
//! - **[`registry`]**: the node registry, a keyed store with
//!   versioned-list ("vlist") invalidation.
//! - **[`node`]**: the opaque node identifier and per-node record.
//! - **[`tlv`]**: the per-node TLV container and the one TLV shape the
//!   core interprets natively, the neighbor-relation attribute.
//! - **[`hash`]**: per-node content hashing and the aggregate network
//!   hash used to detect global inconsistency.
//! - **[`neighbor`]**: the per-link table of directly observed peers.
//! - **[`link`]**: local network interfaces and their per-link Trickle
//!   bookkeeping.
//! - **[`trickle`]**: the Trickle interval/suppression state machine.
//! - **[`prune`]**: the bidirectional-reachability flood-fill pruner.
//! - **[`clock`]**: the `Clock`/`Scheduler` seams, with deterministic
//!   test implementations.
//! - **[`transport`]**: the `Transport` seam and the change-subscriber
//!   traits; wire encoding and socket I/O are out of scope.
//! - **[`config`]**: process- and link-level tunables.
//! - **[`error`]**: [`DncpError`](error::DncpError), the small set of
//!   error conditions a caller can act on.
//! - **[`sim`]**: an in-process, clock-driven simulator for exercising
//!   multi-node scenarios without real sockets.
//!
//! ## Usage
//!
//! ```no_run
//! use dncp::clock::SystemClock;
//! use dncp::config::DncpConfig;
//! use dncp::engine::Dncp;
//! use dncp::link::EndpointId;
//! use dncp::node::NodeId;
//!
//! # struct MyTransport;
//! # impl dncp::transport::Transport for MyTransport {
//! #     fn send_network_state(&mut self, _link: dncp::link::LinkId) {}
//! #     fn set_ifname_enabled(&mut self, _ifname: &str, _enabled: bool) -> bool { true }
//! # }
//! # struct MyScheduler;
//! # impl dncp::clock::Scheduler for MyScheduler {
//! #     fn schedule(&mut self, _delta_ms: u64) {}
//! # }
//! # fn main() -> Result<(), dncp::error::DncpError> {
//! let self_id = NodeId::new([1; 8]);
//! let mut dncp = Dncp::new(
//!     self_id,
//!     DncpConfig::default(),
//!     Box::new(SystemClock::new()),
//!     Box::new(MyScheduler),
//!     Box::new(MyTransport),
//! )?;
//! dncp.add_link("eth0", EndpointId(1), None);
//! dncp.run();
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod link;
pub mod neighbor;
pub mod node;
pub mod prune;
pub mod registry;
pub mod sim;
pub mod subscriber;
pub mod tlv;
pub mod transport;
pub mod trickle;

#[cfg(test)]
mod test;

pub use engine::Dncp;
pub use error::DncpError;
pub use node::NodeId;
