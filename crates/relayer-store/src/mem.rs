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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bridge_relayer_types::{
    Block, Event, EventName, EventStatus, SaveBlockOpts, SaveEventOpts,
};
use ethers::types::H256;
use parking_lot::RwLock;

use crate::queue::{QueueItem, QueueItemState, QueueMessage};
use crate::{BlockKey, BlockRepository, EventRepository, Queue};

#[derive(Default)]
struct Events {
    last_id: u64,
    rows: BTreeMap<u64, Event>,
}

#[derive(Default)]
struct MemQueue {
    last_item_idx: u64,
    items: BTreeMap<u64, QueueItem<Vec<u8>>>,
}

impl MemQueue {
    fn push(&mut self, item: QueueItem<Vec<u8>>) {
        self.last_item_idx += 1;
        self.items.insert(self.last_item_idx, item);
    }
}

/// InMemoryStore is a store that keeps everything in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    events: Arc<RwLock<Events>>,
    last_blocks: Arc<RwLock<HashMap<BlockKey, Block>>>,
    queues: Arc<RwLock<HashMap<String, MemQueue>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl InMemoryStore {
    /// All stored events, ordered by id.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().rows.values().cloned().collect()
    }
}

impl EventRepository for InMemoryStore {
    #[tracing::instrument(skip_all, fields(name = %opts.name, msg_hash = ?opts.msg_hash))]
    fn save(&self, opts: SaveEventOpts) -> crate::Result<Event> {
        let mut guard = self.events.write();
        let existing = guard
            .rows
            .values()
            .find(|e| e.name == opts.name && e.msg_hash == opts.msg_hash);
        if let Some(event) = existing {
            tracing::trace!(id = event.id, "event already stored");
            return Ok(event.clone());
        }
        guard.last_id += 1;
        let event = opts.into_event(guard.last_id);
        guard.rows.insert(event.id, event.clone());
        Ok(event)
    }

    #[tracing::instrument(skip(self))]
    fn update_status(&self, id: u64, status: EventStatus) -> crate::Result<()> {
        let mut guard = self.events.write();
        let event = guard
            .rows
            .get_mut(&id)
            .ok_or(crate::Error::EventNotFound(id))?;
        event.status = status;
        Ok(())
    }

    fn first_by_msg_hash(
        &self,
        msg_hash: H256,
    ) -> crate::Result<Option<Event>> {
        let guard = self.events.read();
        Ok(guard.rows.values().find(|e| e.msg_hash == msg_hash).cloned())
    }

    fn first_by_event_and_msg_hash(
        &self,
        name: EventName,
        msg_hash: H256,
    ) -> crate::Result<Option<Event>> {
        let guard = self.events.read();
        Ok(guard
            .rows
            .values()
            .find(|e| e.name == name && e.msg_hash == msg_hash)
            .cloned())
    }

    fn find_latest_block_id(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> crate::Result<u64> {
        let guard = self.events.read();
        Ok(guard
            .rows
            .values()
            .filter(|e| {
                e.name == name
                    && e.chain_id == chain_id
                    && e.dest_chain_id == dest_chain_id
            })
            .map(|e| e.block_id)
            .max()
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: u64) -> crate::Result<()> {
        self.events.write().rows.remove(&id);
        Ok(())
    }
}

impl BlockRepository for InMemoryStore {
    #[tracing::instrument(skip_all, fields(height = opts.height))]
    fn save(&self, opts: SaveBlockOpts) -> crate::Result<()> {
        self.last_blocks.write().insert(BlockKey::from(&opts), opts);
        Ok(())
    }

    fn get_latest_block_processed_for_event(
        &self,
        name: EventName,
        chain_id: u64,
        dest_chain_id: u64,
    ) -> crate::Result<Option<Block>> {
        let key = BlockKey::new(chain_id, dest_chain_id, name);
        Ok(self.last_blocks.read().get(&key).cloned())
    }
}

impl Queue for InMemoryStore {
    #[tracing::instrument(skip(self, body))]
    fn publish(&self, queue: &str, body: Vec<u8>) -> crate::Result<()> {
        let mut guard = self.queues.write();
        guard
            .entry(queue.to_owned())
            .or_default()
            .push(QueueItem::new(body));
        Ok(())
    }

    fn next(&self, queue: &str) -> crate::Result<Option<QueueMessage>> {
        let mut guard = self.queues.write();
        let Some(q) = guard.get_mut(queue) else {
            return Ok(None);
        };
        let next = q
            .items
            .iter_mut()
            .find(|(_, item)| item.state() == QueueItemState::Pending);
        Ok(next.map(|(index, item)| {
            item.set_state(QueueItemState::Processing);
            QueueMessage {
                queue: queue.to_owned(),
                index: *index,
                body: item.inner().clone(),
                attempts: item.attempts(),
            }
        }))
    }

    fn ack(&self, msg: &QueueMessage) -> crate::Result<()> {
        if let Some(q) = self.queues.write().get_mut(&msg.queue) {
            q.items.remove(&msg.index);
        }
        Ok(())
    }

    fn nack(&self, msg: &QueueMessage, requeue: bool) -> crate::Result<()> {
        let mut guard = self.queues.write();
        let Some(q) = guard.get_mut(&msg.queue) else {
            return Ok(());
        };
        if let Some(item) = q.items.remove(&msg.index) {
            if requeue {
                q.push(item.requeued());
            }
        }
        Ok(())
    }

    fn recover(&self, queue: &str) -> crate::Result<usize> {
        let mut guard = self.queues.write();
        let Some(q) = guard.get_mut(queue) else {
            return Ok(0);
        };
        let mut recovered = 0;
        for item in q.items.values_mut() {
            if item.state() == QueueItemState::Processing {
                item.set_state(QueueItemState::Pending);
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn len(&self, queue: &str) -> crate::Result<usize> {
        Ok(self
            .queues
            .read()
            .get(queue)
            .map(|q| q.items.len())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::Address;

    use super::*;

    fn opts(name: EventName, msg_hash: H256, block_id: u64) -> SaveEventOpts {
        SaveEventOpts {
            name,
            chain_id: 167,
            dest_chain_id: 1,
            data: "{}".into(),
            msg_hash,
            message_owner: Address::repeat_byte(9),
            status: EventStatus::New,
            block_id,
        }
    }

    #[test]
    fn saving_the_same_event_twice_keeps_one_row() {
        let store = InMemoryStore::default();
        let h = H256::repeat_byte(1);
        let first =
            EventRepository::save(&store, opts(EventName::MessageSent, h, 10))
                .unwrap();
        let second =
            EventRepository::save(&store, opts(EventName::MessageSent, h, 10))
                .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.events().len(), 1);
        // a different event name is a different key.
        EventRepository::save(
            &store,
            opts(EventName::MessageStatusChanged, h, 11),
        )
        .unwrap();
        assert_eq!(store.events().len(), 2);
        assert_eq!(store.first_by_msg_hash(h).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn delete_then_save_replaces_the_row() {
        let store = InMemoryStore::default();
        let h = H256::repeat_byte(2);
        let old =
            EventRepository::save(&store, opts(EventName::MessageSent, h, 10))
                .unwrap();
        store.delete(old.id).unwrap();
        let new =
            EventRepository::save(&store, opts(EventName::MessageSent, h, 12))
                .unwrap();
        assert_ne!(old.id, new.id);
        let found = store
            .first_by_event_and_msg_hash(EventName::MessageSent, h)
            .unwrap()
            .unwrap();
        assert_eq!(found.block_id, 12);
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn latest_block_id_and_status() {
        let store = InMemoryStore::default();
        assert_eq!(
            store
                .find_latest_block_id(EventName::MessageSent, 167, 1)
                .unwrap(),
            0
        );
        let a = EventRepository::save(
            &store,
            opts(EventName::MessageSent, H256::repeat_byte(3), 40),
        )
        .unwrap();
        EventRepository::save(
            &store,
            opts(EventName::MessageSent, H256::repeat_byte(4), 30),
        )
        .unwrap();
        assert_eq!(
            store
                .find_latest_block_id(EventName::MessageSent, 167, 1)
                .unwrap(),
            40
        );
        store.update_status(a.id, EventStatus::Done).unwrap();
        assert_eq!(store.events()[0].status, EventStatus::Done);
        assert!(matches!(
            store.update_status(99, EventStatus::Done),
            Err(crate::Error::EventNotFound(99))
        ));
    }

    #[test]
    fn checkpoints_are_kept_per_stream() {
        let store = InMemoryStore::default();
        let block = Block {
            height: 100,
            hash: H256::repeat_byte(5),
            chain_id: 167,
            dest_chain_id: 1,
            event_name: EventName::MessageSent,
        };
        BlockRepository::save(&store, block.clone()).unwrap();
        assert_eq!(
            store
                .get_latest_block_processed_for_event(
                    EventName::MessageSent,
                    167,
                    1
                )
                .unwrap(),
            Some(block)
        );
        assert_eq!(
            store
                .get_latest_block_processed_for_event(
                    EventName::MessageStatusChanged,
                    167,
                    1
                )
                .unwrap(),
            None
        );
    }

    #[test]
    fn queue_delivers_in_order_until_acked() {
        let store = InMemoryStore::default();
        store.publish("q", b"a".to_vec()).unwrap();
        store.publish("q", b"b".to_vec()).unwrap();
        let a = store.next("q").unwrap().unwrap();
        assert_eq!(a.body, b"a");
        let b = store.next("q").unwrap().unwrap();
        assert_eq!(b.body, b"b");
        assert_eq!(store.next("q").unwrap(), None);

        store.nack(&a, true).unwrap();
        store.ack(&b).unwrap();
        let again = store.next("q").unwrap().unwrap();
        assert_eq!(again.body, b"a");
        assert_eq!(again.attempts, 1);
        store.nack(&again, false).unwrap();
        assert_eq!(store.len("q").unwrap(), 0);
    }

    #[test]
    fn recover_returns_in_flight_messages() {
        let store = InMemoryStore::default();
        store.publish("q", b"a".to_vec()).unwrap();
        let _in_flight = store.next("q").unwrap().unwrap();
        assert_eq!(store.next("q").unwrap(), None);
        assert_eq!(store.recover("q").unwrap(), 1);
        assert_eq!(store.next("q").unwrap().unwrap().body, b"a");
    }
}
