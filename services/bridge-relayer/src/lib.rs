// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Bridge Relayer Crate 🕸️
//!
//! Relays bridge messages from a source chain to a destination chain.
//!
//! ## Overview
//!
//! The relayer is made of two services sharing one store:
//!
//!   1. The indexer walks the source chain, persists every `MessageSent`
//!      and `MessageStatusChanged` event of the source bridge and queues the
//!      messages a relayer may process.
//!   2. The processor consumes that queue. For each message it proves the
//!      source signal against a header the destination already trusts and
//!      submits `processMessage` on the destination bridge.
//!
//! Both are started by [`service::ignite`] and stop on the shutdown signal
//! of the [`RelayerContext`](bridge_relayer_context::RelayerContext).

/// Wiring of the indexer and the processor.
pub mod service;

/// A type alias for the result for the relayer binary.
pub type Result<T> = std::result::Result<T, bridge_relayer_utils::Error>;
