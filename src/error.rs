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

//! Module containing all error types.

use crate::config::ConfigError;
use crate::link::LinkId;
use thiserror::Error;

/// Main error type.
///
/// Most error-like conditions in the run loop are absorbed locally and
/// reflected only as dirty flags and rescheduling; this enum exists for
/// the small remainder that a caller can actually act on: invalid
/// configuration at construction time, and operating on an unknown TLV
/// handle or link.
#[derive(Debug, Error)]
pub enum DncpError {
    /// The given tunables failed validation.
    #[error("invalid dncp configuration: {0}")]
    Config(#[from] ConfigError),
    /// No such [`crate::tlv::TlvHandle`] is currently staged.
    #[error("no such local TLV handle")]
    UnknownTlvHandle,
    /// No link with the given id exists.
    #[error("no such link: {0}")]
    UnknownLink(LinkId),
}
