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

//! Per-link Trickle state machine.
//!
//! This module only holds the interval primitive and the outcome of a
//! single run-loop step; the run loop itself drives it, since stepping
//! Trickle needs access to the transport (to actually send) and to the
//! registry-derived network hash.

use crate::link::Link;
use rand::Rng;

/// Clamp `i` into `[imin, imax]`.
fn clamp(i: u64, imin: u64, imax: u64) -> u64 {
    i.clamp(imin, imax)
}

/// `trickle_set(i)`: clamp `i`, pick a new random send time within the
/// first half-to-end of the interval, and reset the consistency counter.
///
/// This is also used, unmodified (no doubling), by the keep-alive branch
/// of the run-loop step to re-randomize within the *current* interval
/// length.
pub fn trickle_set(link: &mut Link, i: u64, now: u64, rng: &mut impl Rng) {
    let i = clamp(i, link.conf.trickle_imin, link.conf.trickle_imax);
    link.trickle_i = i;
    let half = i / 2;
    // t uniform in [i/2, i). When i/2 == i (i.e. i == 0, unreachable once
    // clamped to a positive Imin) gen_range would panic; guard defensively.
    let t = if half < i { half + rng.gen_range(0, i - half) } else { half };
    link.trickle_send_time = now + t;
    link.trickle_interval_end_time = now + i;
    link.trickle_c = 0;
}

/// `trickle_upgrade`: double the interval (still clamped to `Imax`).
pub fn trickle_upgrade(link: &mut Link, now: u64, rng: &mut impl Rng) {
    trickle_set(link, link.trickle_i * 2, now, rng);
}

/// Outcome of stepping one link's Trickle state machine for one run-loop
/// pass, reported back to the caller so it can drive the transport and
/// telemetry without this module needing a `Transport` reference itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickleAction {
    /// Nothing to do this pass.
    None,
    /// Send the network-state summary, honoring the `c < k` suppression
    /// check.
    Send,
    /// The scheduled send was suppressed because `c >= k`.
    Suppressed,
    /// Send unconditionally as a keep-alive, bypassing suppression.
    KeepAlive,
}

/// Step one link's Trickle state machine by one run-loop pass, for a
/// link already known to be active (`join_failed_time == 0`).
pub fn step(link: &mut Link, now: u64, rng: &mut impl Rng) -> TrickleAction {
    if link.trickle_interval_end_time <= now {
        trickle_upgrade(link, now, rng);
        return TrickleAction::None;
    }
    if link.trickle_send_time != 0 && link.trickle_send_time <= now {
        let action = if link.trickle_c < link.conf.trickle_k {
            TrickleAction::Send
        } else {
            link.num_trickle_skipped += 1;
            TrickleAction::Suppressed
        };
        link.trickle_send_time = 0;
        return action;
    }
    if link.next_keepalive_time != 0 && link.next_keepalive_time <= now {
        return TrickleAction::KeepAlive;
    }
    TrickleAction::None
}

/// Record that a send (ordinary or keep-alive) actually happened, and
/// reschedule the next keep-alive.
pub fn record_send(link: &mut Link, now: u64) {
    link.num_trickle_sent += 1;
    link.last_trickle_sent = now;
    if link.conf.keepalive_interval > 0 {
        link.next_keepalive_time = now + link.conf.keepalive_interval;
    }
}

/// The earliest of this link's three Trickle deadlines, for the run
/// loop's "accumulate `min(next)`" step. Zero deadlines (unset) are
/// ignored.
pub fn next_deadline(link: &Link) -> Option<u64> {
    [link.trickle_interval_end_time, link.trickle_send_time, link.next_keepalive_time]
        .into_iter()
        .filter(|&t| t != 0)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{EndpointId, LinkConfig};
    use rand::SeedableRng;

    fn test_link() -> Link {
        let conf = LinkConfig { trickle_imin: 200, trickle_imax: 40_000, trickle_k: 1, keepalive_interval: 0 };
        Link::new("eth0", EndpointId(1), conf)
    }

    #[test]
    fn trickle_set_clamps_and_bounds_send_time() {
        let mut link = test_link();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        trickle_set(&mut link, 10, 1_000, &mut rng);
        assert_eq!(link.trickle_i, 200); // clamped up to imin
        assert_eq!(link.trickle_interval_end_time, 1_000 + 200);
        assert!(link.trickle_send_time >= 1_000 + 100);
        assert!(link.trickle_send_time < 1_000 + 200);
        assert_eq!(link.trickle_c, 0);

        trickle_set(&mut link, 1_000_000, 1_000, &mut rng);
        assert_eq!(link.trickle_i, 40_000); // clamped down to imax
    }

    #[test]
    fn upgrade_doubles_interval() {
        let mut link = test_link();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        trickle_set(&mut link, 200, 0, &mut rng);
        trickle_upgrade(&mut link, 0, &mut rng);
        assert_eq!(link.trickle_i, 400);
    }

    #[test]
    fn step_upgrades_past_interval_end() {
        let mut link = test_link();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        trickle_set(&mut link, 200, 0, &mut rng);
        let action = step(&mut link, 300, &mut rng);
        assert_eq!(action, TrickleAction::None);
        assert_eq!(link.trickle_i, 400);
    }

    #[test]
    fn step_suppresses_when_c_reaches_k() {
        let mut link = test_link();
        link.conf.trickle_k = 1;
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        trickle_set(&mut link, 200, 0, &mut rng);
        link.trickle_c = 1;
        let send_time = link.trickle_send_time;
        let action = step(&mut link, send_time, &mut rng);
        assert_eq!(action, TrickleAction::Suppressed);
        assert_eq!(link.num_trickle_skipped, 1);
    }

    #[test]
    fn step_sends_when_under_k() {
        let mut link = test_link();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        trickle_set(&mut link, 200, 0, &mut rng);
        let send_time = link.trickle_send_time;
        let action = step(&mut link, send_time, &mut rng);
        assert_eq!(action, TrickleAction::Send);
        assert_eq!(link.trickle_send_time, 0);
    }
}
