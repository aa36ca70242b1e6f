// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps the indexed bridge events, the last processed
//! block per event stream and the work queue between the indexer and the
//! processor.
//!
use std::fmt::Display;
use std::sync::Arc;

use bridge_relayer_types::{
    Block, Event, EventName, EventStatus, SaveBlockOpts, SaveEventOpts,
};
pub use bridge_relayer_utils::{Error, Result};
use ethers::types::H256;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// Queue items and delivered messages.
pub mod queue;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;
pub use queue::{QueueItem, QueueItemState, QueueMessage};

/// BlockKey identifies one checkpointed event stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockKey {
    pub chain_id: u64,
    pub dest_chain_id: u64,
    pub event_name: EventName,
}

impl BlockKey {
    pub fn new(chain_id: u64, dest_chain_id: u64, event_name: EventName) -> Self {
        Self {
            chain_id,
            dest_chain_id,
            event_name,
        }
    }

    /// Stable byte representation used as a database key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 24);
        bytes.extend_from_slice(&self.chain_id.to_be_bytes());
        bytes.extend_from_slice(&self.dest_chain_id.to_be_bytes());
        bytes.extend_from_slice(self.event_name.to_string().as_bytes());
        bytes
    }
}

impl Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.chain_id, self.dest_chain_id, self.event_name
        )
    }
}

impl From<&Block> for BlockKey {
    fn from(block: &Block) -> Self {
        Self::new(block.chain_id, block.dest_chain_id, block.event_name)
    }
}

/// Name of the queue carrying one event stream from the indexer to the
/// processor.
pub fn queue_name(
    src_chain_id: u64,
    dest_chain_id: u64,
    event_name: EventName,
) -> String {
    format!("{src_chain_id}-{dest_chain_id}-{event_name}-queue")
}

/// Persisted bridge events.
///
/// Implementations must keep `(name, msg_hash)` unique: saving an event
/// whose key is already stored returns the stored row untouched.
pub trait EventRepository: Send + Sync {
    /// Persists a new event, or returns the existing one with the same key.
    fn save(&self, opts: SaveEventOpts) -> Result<Event>;
    /// Overwrites the status of the event with `id`.
    fn update_status(&self, id: u64, status: EventStatus) -> Result<()>;
    /// The oldest event, of any name, carrying `msg_hash`.
    fn first_by_msg_hash(&self, msg_hash: H256) -> Result<Option<Event>>;
    /// The event with the given name carrying `msg_hash`.
    fn first_by_event_and_msg_hash(
        &self,
        name: EventName,
        msg_hash: H256,
    ) -> Result<Option<Event>>;
    /// Highest block an event of this stream was seen in, 0 if none.
    fn find_latest_block_id(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> Result<u64>;
    /// Removes the event with `id`, a no-op when it does not exist.
    fn delete(&self, id: u64) -> Result<()>;
}

/// Last processed block per event stream.
pub trait BlockRepository: Send + Sync {
    /// Stores the checkpoint, replacing the previous one.
    fn save(&self, opts: SaveBlockOpts) -> Result<()>;
    /// The stored checkpoint of one event stream.
    fn get_latest_block_processed_for_event(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> Result<Option<Block>>;
}

/// A named, persistent FIFO with explicit acknowledgement.
///
/// [`Queue::next`] hands out the oldest pending item and marks it in flight.
/// It stays stored until it is acked, so a crash leads to a redelivery
/// once [`Queue::recover`] runs on restart.
pub trait Queue: Send + Sync {
    fn publish(&self, queue: &str, body: Vec<u8>) -> Result<()>;
    fn next(&self, queue: &str) -> Result<Option<QueueMessage>>;
    /// Removes a processed message.
    fn ack(&self, msg: &QueueMessage) -> Result<()>;
    /// Gives a message back. With `requeue` it goes to the back of the
    /// queue with its attempt count bumped, otherwise it is dropped.
    fn nack(&self, msg: &QueueMessage, requeue: bool) -> Result<()>;
    /// Moves every in-flight message of `queue` back to pending.
    fn recover(&self, queue: &str) -> Result<usize>;
    /// Number of stored messages, pending or in flight.
    fn len(&self, queue: &str) -> Result<usize>;
}

impl<S: EventRepository + ?Sized> EventRepository for Arc<S> {
    fn save(&self, opts: SaveEventOpts) -> Result<Event> {
        S::save(self, opts)
    }

    fn update_status(&self, id: u64, status: EventStatus) -> Result<()> {
        S::update_status(self, id, status)
    }

    fn first_by_msg_hash(&self, msg_hash: H256) -> Result<Option<Event>> {
        S::first_by_msg_hash(self, msg_hash)
    }

    fn first_by_event_and_msg_hash(
        &self,
        name: EventName,
        msg_hash: H256,
    ) -> Result<Option<Event>> {
        S::first_by_event_and_msg_hash(self, name, msg_hash)
    }

    fn find_latest_block_id(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> Result<u64> {
        S::find_latest_block_id(self, name, chain_id, dest_chain_id)
    }

    fn delete(&self, id: u64) -> Result<()> {
        S::delete(self, id)
    }
}

impl<S: BlockRepository + ?Sized> BlockRepository for Arc<S> {
    fn save(&self, opts: SaveBlockOpts) -> Result<()> {
        S::save(self, opts)
    }

    fn get_latest_block_processed_for_event(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> Result<Option<Block>> {
        S::get_latest_block_processed_for_event(
            self,
            name,
            chain_id,
            dest_chain_id,
        )
    }
}

impl<S: Queue + ?Sized> Queue for Arc<S> {
    fn publish(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        S::publish(self, queue, body)
    }

    fn next(&self, queue: &str) -> Result<Option<QueueMessage>> {
        S::next(self, queue)
    }

    fn ack(&self, msg: &QueueMessage) -> Result<()> {
        S::ack(self, msg)
    }

    fn nack(&self, msg: &QueueMessage, requeue: bool) -> Result<()> {
        S::nack(self, msg, requeue)
    }

    fn recover(&self, queue: &str) -> Result<usize> {
        S::recover(self, queue)
    }

    fn len(&self, queue: &str) -> Result<usize> {
        S::len(self, queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_follow_the_stream() {
        assert_eq!(
            queue_name(167, 1, EventName::MessageSent),
            "167-1-MessageSent-queue"
        );
    }

    #[test]
    fn block_keys_differ_per_event() {
        let a = BlockKey::new(1, 2, EventName::MessageSent);
        let b = BlockKey::new(1, 2, EventName::MessageStatusChanged);
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_eq!(a.to_string(), "1-2-MessageSent");
    }
}
