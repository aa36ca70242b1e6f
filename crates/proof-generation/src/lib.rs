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

//! # Signal proofs 🔏
//!
//! A message is proven to the destination by showing that the source
//! signal service stores `1` under the message slot. [`Prover`] fetches
//! the Merkle proofs over `eth_getProof`, checks that value and encodes the
//! [`SignalProof`] the destination bridge verifies.

mod prover;
mod types;

pub use prover::{storage_key, Hop, Prover};
pub use types::{BlockHeader, HopProof, SignalProof};
