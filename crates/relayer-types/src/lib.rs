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

//! Types shared between the indexer, the processor and the stores.

/// Persisted block checkpoints.
pub mod block;
/// Bridge contract ABI types and the queue payload.
pub mod bridge;
/// Persisted events and their status.
pub mod event;
/// Indexer sync and watch modes.
pub mod mode;
/// Private key wrapper that can be loaded from the environment.
pub mod private_key;
/// RPC url wrapper that can be loaded from the environment.
pub mod rpc_url;

pub use block::{Block, SaveBlockOpts};
pub use bridge::{
    BridgeMessage, MessageSentEvent, MessageSentFilter,
    MessageStatusChangedEvent, MessageStatusChangedFilter, QueueMessageBody,
    RawLog,
};
pub use event::{Event, EventName, EventStatus, SaveEventOpts};
pub use mode::{SyncMode, WatchMode};
