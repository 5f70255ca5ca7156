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

//! Local network interfaces running DNCP, and their per-link Trickle
//! state.

use crate::config::DncpConfig;

/// Index into the [`crate::engine::Dncp`] link table. Stable for the
/// lifetime of the link (links are created from configuration and
/// destroyed on interface removal).
pub type LinkId = usize;

/// Identifier for one endpoint of a neighbor relation (a link, from the
/// perspective of the TLV that names it). Distinct from `LinkId` because
/// a neighbor TLV names the *remote* node's endpoint, which this process
/// does not allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(pub u32);

/// Per-link configuration, overriding the [`DncpConfig`] defaults.
///
/// The recognized per-link options are exactly the Trickle parameters
/// and the keep-alive interval; everything else is process-wide.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Trickle `Imin`, in milliseconds.
    pub trickle_imin: u64,
    /// Trickle `Imax`, in milliseconds.
    pub trickle_imax: u64,
    /// Trickle redundancy constant `k`.
    pub trickle_k: u32,
    /// Keep-alive interval, in milliseconds; `0` disables keep-alives.
    pub keepalive_interval: u64,
}

impl LinkConfig {
    /// Build a per-link config from the process-wide defaults.
    pub fn from_defaults(conf: &DncpConfig) -> Self {
        Self {
            trickle_imin: conf.trickle_imin,
            trickle_imax: conf.trickle_imax,
            trickle_k: conf.trickle_k,
            keepalive_interval: conf.keepalive_interval,
        }
    }
}

/// A local network interface over which DNCP runs.
#[derive(Debug, Clone)]
pub struct Link {
    ifname: String,
    endpoint_id: EndpointId,
    /// Per-link tunables.
    pub conf: LinkConfig,
    /// Current Trickle interval length, clamped to `[Imin, Imax]`.
    pub trickle_i: u64,
    /// Scheduled moment in the current interval at which a send may fire,
    /// or `0` if none.
    pub trickle_send_time: u64,
    /// End of the current Trickle interval.
    pub trickle_interval_end_time: u64,
    /// Consistent-heard counter within the current interval.
    pub trickle_c: u32,
    /// Next scheduled unconditional keep-alive send, or `0` if disabled.
    pub next_keepalive_time: u64,
    /// Timestamp of the most recent send on this link.
    pub last_trickle_sent: u64,
    /// Telemetry: total sends performed.
    pub num_trickle_sent: u64,
    /// Telemetry: total sends suppressed by `c >= k`.
    pub num_trickle_skipped: u64,
    /// Non-zero while the link is in rejoin-pending state.
    pub join_failed_time: u64,
}

impl Link {
    /// Sentinel `join_failed_time` meaning "never yet attempted a join";
    /// distinct from `0` (active) and from any real backdated timestamp,
    /// so the first run-loop pass after link creation always attempts the
    /// join regardless of how small `now` is (see [`Self::new`]).
    pub const NEVER_JOINED: u64 = u64::MAX;

    /// Create a link in join-pending state (it has not yet attempted to
    /// join multicast). The run loop's join-pending branch performs the
    /// first join attempt and transitions it to active.
    pub fn new(ifname: impl Into<String>, endpoint_id: EndpointId, conf: LinkConfig) -> Self {
        Self {
            ifname: ifname.into(),
            endpoint_id,
            conf,
            trickle_i: conf.trickle_imin,
            trickle_send_time: 0,
            trickle_interval_end_time: 0,
            trickle_c: 0,
            next_keepalive_time: 0,
            last_trickle_sent: 0,
            num_trickle_sent: 0,
            num_trickle_skipped: 0,
            join_failed_time: Self::NEVER_JOINED,
        }
    }

    /// The interface name backing this link.
    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// This link's local endpoint id, as named by neighbor TLVs pointing
    /// at it.
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Whether the link is actively running Trickle (not join-pending).
    pub fn is_active(&self) -> bool {
        self.join_failed_time == 0
    }
}
