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

use std::path::Path;

use bridge_relayer_types::{
    Block, Event, EventName, EventStatus, SaveBlockOpts, SaveEventOpts,
};
use ethers::types::H256;
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::queue::{QueueItem, QueueItemState, QueueMessage};
use crate::{BlockKey, BlockRepository, EventRepository, Queue};

const EVENTS: &str = "events";
const EVENT_KEYS: &str = "event_keys";
const LAST_BLOCKS: &str = "last_block_numbers";
const ITEM_PREFIX: &[u8; 4] = b"item";

/// SledStore is a store that keeps events, checkpoints and queues in a
/// [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }

    /// Writes every dirty buffer to disk, returning the bytes flushed.
    pub fn flush(&self) -> crate::Result<usize> {
        Ok(self.db.flush()?)
    }

    fn event_by_id(&self, id: &[u8]) -> crate::Result<Option<Event>> {
        let tree = self.db.open_tree(EVENTS)?;
        match tree.get(id)? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    fn queue_tree(&self, queue: &str) -> crate::Result<sled::Tree> {
        Ok(self.db.open_tree(format!("queue_{queue}"))?)
    }

    /// Appends `item` to the queue tree, returning its index.
    fn push_item(
        tree: &sled::Tree,
        item: &QueueItem<Vec<u8>>,
    ) -> crate::Result<u64> {
        let item_bytes = serde_json::to_vec(item)?;
        let idx = tree.transaction::<_, _, std::io::Error>(|db| {
            let last_item_idx = match db.get("last_item_idx")? {
                Some(v) => read_u64(&v),
                None => 0u64,
            };
            let next_idx = last_item_idx + 1u64;
            db.insert("last_item_idx", &next_idx.to_be_bytes())?;
            db.insert(item_key(next_idx).as_slice(), item_bytes.as_slice())?;
            Ok(next_idx)
        })?;
        Ok(idx)
    }
}

/// Unique key of an event: one byte for the name followed by the msgHash.
fn event_key(name: EventName, msg_hash: H256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = match name {
        EventName::MessageSent => 0,
        EventName::MessageStatusChanged => 1,
    };
    key[1..].copy_from_slice(msg_hash.as_bytes());
    key
}

/// item key = 4 bytes prefix ("item") + 8 bytes of the index.
fn item_key(idx: u64) -> [u8; 12] {
    let mut key = [0u8; 4 + std::mem::size_of::<u64>()];
    key[0..4].copy_from_slice(ITEM_PREFIX);
    key[4..].copy_from_slice(&idx.to_be_bytes());
    key
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut output = [0u8; 8];
    let n = bytes.len().min(8);
    output[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u64::from_be_bytes(output)
}

impl EventRepository for SledStore {
    #[tracing::instrument(skip_all, fields(name = %opts.name, msg_hash = ?opts.msg_hash))]
    fn save(&self, opts: SaveEventOpts) -> crate::Result<Event> {
        let events = self.db.open_tree(EVENTS)?;
        let keys = self.db.open_tree(EVENT_KEYS)?;
        let key = event_key(opts.name, opts.msg_hash);
        let id = self.db.generate_id()? + 1;
        let event = opts.into_event(id);
        let bytes = serde_json::to_vec(&event)?;
        // the uniqueness check and both inserts happen in one transaction.
        let existing = (&events, &keys).transaction(|(events, keys)| {
            if let Some(existing) = keys.get(key)? {
                return Ok(Some(existing));
            }
            events.insert(&id.to_be_bytes(), bytes.as_slice())?;
            keys.insert(&key[..], &id.to_be_bytes())?;
            Ok::<_, ConflictableTransactionError<std::io::Error>>(None)
        })?;
        match existing {
            Some(existing_id) => {
                tracing::trace!(id = read_u64(&existing_id), "event already stored");
                self.event_by_id(&existing_id)?
                    .ok_or(crate::Error::EventNotFound(read_u64(&existing_id)))
            }
            None => {
                self.db.flush()?;
                Ok(event)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    fn update_status(&self, id: u64, status: EventStatus) -> crate::Result<()> {
        let tree = self.db.open_tree(EVENTS)?;
        let mut event = self
            .event_by_id(&id.to_be_bytes())?
            .ok_or(crate::Error::EventNotFound(id))?;
        event.status = status;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(&event)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn first_by_msg_hash(
        &self,
        msg_hash: H256,
    ) -> crate::Result<Option<Event>> {
        let keys = self.db.open_tree(EVENT_KEYS)?;
        let mut ids = Vec::new();
        for name in [EventName::MessageSent, EventName::MessageStatusChanged] {
            if let Some(id) = keys.get(event_key(name, msg_hash))? {
                ids.push(read_u64(&id));
            }
        }
        match ids.into_iter().min() {
            Some(id) => self.event_by_id(&id.to_be_bytes()),
            None => Ok(None),
        }
    }

    fn first_by_event_and_msg_hash(
        &self,
        name: EventName,
        msg_hash: H256,
    ) -> crate::Result<Option<Event>> {
        let keys = self.db.open_tree(EVENT_KEYS)?;
        match keys.get(event_key(name, msg_hash))? {
            Some(id) => self.event_by_id(&id),
            None => Ok(None),
        }
    }

    fn find_latest_block_id(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree(EVENTS)?;
        let mut latest = 0;
        for value in tree.iter().values() {
            let event: Event = serde_json::from_slice(&value?)?;
            if event.name == name
                && event.chain_id == chain_id
                && event.dest_chain_id == dest_chain_id
            {
                latest = latest.max(event.block_id);
            }
        }
        Ok(latest)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: u64) -> crate::Result<()> {
        let Some(event) = self.event_by_id(&id.to_be_bytes())? else {
            return Ok(());
        };
        let events = self.db.open_tree(EVENTS)?;
        let keys = self.db.open_tree(EVENT_KEYS)?;
        let key = event_key(event.name, event.msg_hash);
        (&events, &keys).transaction(|(events, keys)| {
            events.remove(&id.to_be_bytes())?;
            keys.remove(&key[..])?;
            Ok::<_, ConflictableTransactionError<std::io::Error>>(())
        })?;
        self.db.flush()?;
        Ok(())
    }
}

impl BlockRepository for SledStore {
    #[tracing::instrument(skip_all, fields(height = opts.height))]
    fn save(&self, opts: SaveBlockOpts) -> crate::Result<()> {
        let tree = self.db.open_tree(LAST_BLOCKS)?;
        let key = BlockKey::from(&opts);
        tree.insert(key.to_bytes(), serde_json::to_vec(&opts)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn get_latest_block_processed_for_event(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> crate::Result<Option<Block>> {
        let tree = self.db.open_tree(LAST_BLOCKS)?;
        let key = BlockKey::new(chain_id, dest_chain_id, name);
        match tree.get(key.to_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }
}

impl Queue for SledStore {
    #[tracing::instrument(skip(self, body))]
    fn publish(&self, queue: &str, body: Vec<u8>) -> crate::Result<()> {
        let tree = self.queue_tree(queue)?;
        let idx = Self::push_item(&tree, &QueueItem::new(body))?;
        tracing::trace!(idx, "enqueued item");
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn next(&self, queue: &str) -> crate::Result<Option<QueueMessage>> {
        let tree = self.queue_tree(queue)?;
        for entry in tree.scan_prefix(ITEM_PREFIX) {
            let (key, value) = entry?;
            let mut item: QueueItem<Vec<u8>> = serde_json::from_slice(&value)?;
            if item.state() != QueueItemState::Pending {
                continue;
            }
            item.set_state(QueueItemState::Processing);
            tree.insert(&key, serde_json::to_vec(&item)?)?;
            return Ok(Some(QueueMessage {
                queue: queue.to_owned(),
                index: read_u64(&key[4..]),
                body: item.inner().clone(),
                attempts: item.attempts(),
            }));
        }
        Ok(None)
    }

    #[tracing::instrument(skip_all, fields(queue = %msg.queue, index = msg.index))]
    fn ack(&self, msg: &QueueMessage) -> crate::Result<()> {
        let tree = self.queue_tree(&msg.queue)?;
        tree.remove(item_key(msg.index))?;
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(queue = %msg.queue, index = msg.index))]
    fn nack(&self, msg: &QueueMessage, requeue: bool) -> crate::Result<()> {
        let tree = self.queue_tree(&msg.queue)?;
        let Some(value) = tree.remove(item_key(msg.index))? else {
            return Ok(());
        };
        if requeue {
            let item: QueueItem<Vec<u8>> = serde_json::from_slice(&value)?;
            Self::push_item(&tree, &item.requeued())?;
        }
        self.db.flush()?;
        Ok(())
    }

    fn recover(&self, queue: &str) -> crate::Result<usize> {
        let tree = self.queue_tree(queue)?;
        let mut recovered = 0;
        for entry in tree.scan_prefix(ITEM_PREFIX) {
            let (key, value) = entry?;
            let mut item: QueueItem<Vec<u8>> = serde_json::from_slice(&value)?;
            if item.state() == QueueItemState::Processing {
                item.set_state(QueueItemState::Pending);
                tree.insert(&key, serde_json::to_vec(&item)?)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::debug!(recovered, "returned in-flight items to the queue");
            self.db.flush()?;
        }
        Ok(recovered)
    }

    fn len(&self, queue: &str) -> crate::Result<usize> {
        let tree = self.queue_tree(queue)?;
        Ok(tree.scan_prefix(ITEM_PREFIX).count())
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::Address;

    use super::*;

    fn opts(msg_hash: H256, block_id: u64) -> SaveEventOpts {
        SaveEventOpts {
            name: EventName::MessageSent,
            chain_id: 167,
            dest_chain_id: 1,
            data: r#"{"Raw":{}}"#.into(),
            msg_hash,
            message_owner: Address::repeat_byte(7),
            status: EventStatus::New,
            block_id,
        }
    }

    #[test]
    fn events_are_unique_per_name_and_hash() {
        let store = SledStore::temporary().unwrap();
        let h = H256::repeat_byte(1);
        let a = EventRepository::save(&store, opts(h, 5)).unwrap();
        let b = EventRepository::save(&store, opts(h, 5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            store
                .find_latest_block_id(EventName::MessageSent, 167, 1)
                .unwrap(),
            5
        );

        let mut status_changed = opts(h, 6);
        status_changed.name = EventName::MessageStatusChanged;
        let c = EventRepository::save(&store, status_changed).unwrap();
        assert_ne!(a.id, c.id);
        assert_eq!(store.first_by_msg_hash(h).unwrap().unwrap().id, a.id);
    }

    #[test]
    fn reorged_event_is_replaced() {
        let store = SledStore::temporary().unwrap();
        let h = H256::repeat_byte(2);
        let old = EventRepository::save(&store, opts(h, 5)).unwrap();
        store.delete(old.id).unwrap();
        assert_eq!(store.first_by_msg_hash(h).unwrap(), None);
        let new = EventRepository::save(&store, opts(h, 8)).unwrap();
        let found = store
            .first_by_event_and_msg_hash(EventName::MessageSent, h)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, new.id);
        assert_eq!(found.block_id, 8);
        // deleting twice is fine.
        store.delete(old.id).unwrap();
    }

    #[test]
    fn status_updates_are_persisted() {
        let store = SledStore::temporary().unwrap();
        let e = EventRepository::save(&store, opts(H256::repeat_byte(3), 1))
            .unwrap();
        store.update_status(e.id, EventStatus::Retriable).unwrap();
        let found = store
            .first_by_msg_hash(H256::repeat_byte(3))
            .unwrap()
            .unwrap();
        assert_eq!(found.status, EventStatus::Retriable);
    }

    #[test]
    fn get_last_block_should_work() {
        let store = SledStore::temporary().unwrap();
        let mut block = Block {
            height: 20,
            hash: H256::repeat_byte(4),
            chain_id: 167,
            dest_chain_id: 1,
            event_name: EventName::MessageSent,
        };
        BlockRepository::save(&store, block.clone()).unwrap();
        block.height = 30;
        BlockRepository::save(&store, block.clone()).unwrap();
        let stored = store
            .get_latest_block_processed_for_event(EventName::MessageSent, 167, 1)
            .unwrap();
        assert_eq!(stored, Some(block));
    }

    #[test]
    fn queue_should_work() {
        let store = SledStore::temporary().unwrap();
        assert_eq!(store.next("q").unwrap(), None);
        for body in [b"1", b"2", b"3"] {
            store.publish("q", body.to_vec()).unwrap();
        }
        assert_eq!(store.len("q").unwrap(), 3);

        let one = store.next("q").unwrap().unwrap();
        assert_eq!(one.body, b"1");
        store.nack(&one, true).unwrap();
        let two = store.next("q").unwrap().unwrap();
        assert_eq!(two.body, b"2");
        store.ack(&two).unwrap();
        let three = store.next("q").unwrap().unwrap();
        assert_eq!(three.body, b"3");

        // the requeued item comes last, with its attempt recorded.
        let one_again = store.next("q").unwrap().unwrap();
        assert_eq!(one_again.body, b"1");
        assert_eq!(one_again.attempts, 1);

        assert_eq!(store.recover("q").unwrap(), 2);
        assert_eq!(store.len("q").unwrap(), 2);
        assert_eq!(store.next("q").unwrap().unwrap().body, b"3");
    }
}
