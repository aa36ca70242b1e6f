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

use serde::{Deserialize, Serialize};

/// A Queue item that wraps the inner item and maintains its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem<T> {
    /// The inner value wrapped by the Queue Item.
    inner: T,
    /// The current state of the item in the queue.
    state: QueueItemState,
    /// The time when the item was enqueued.
    enqueued_at: u128,
    /// How many times the item was handed back with a requeue.
    attempts: u32,
}

impl<T> QueueItem<T> {
    /// Creates a new QueueItem with the provided inner value.
    pub fn new(inner: T) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            inner,
            state: Default::default(),
            enqueued_at: now.as_millis(),
            attempts: 0,
        }
    }

    /// Returns the state of the QueueItem.
    pub fn state(&self) -> QueueItemState {
        self.state
    }

    /// set item state.
    pub fn set_state(&mut self, state: QueueItemState) {
        self.state = state;
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn enqueued_at(&self) -> u128 {
        self.enqueued_at
    }

    /// The same item, pending again, with one more attempt recorded.
    pub fn requeued(mut self) -> Self {
        self.state = QueueItemState::Pending;
        self.attempts = self.attempts.saturating_add(1);
        self
    }
}

/// The status of the item in the queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum QueueItemState {
    /// The current item is pending and waiting in the queue to be dequeued and processed.
    #[default]
    Pending,
    /// The item was handed to a consumer and is not acknowledged yet.
    Processing,
}

/// A message handed out by [`crate::Queue::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// The queue it came from.
    pub queue: String,
    /// Position of the item inside its queue.
    pub index: u64,
    pub body: Vec<u8>,
    /// Previous deliveries that ended in a requeue.
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_resets_state_and_counts() {
        let mut item = QueueItem::new(vec![1u8]);
        item.set_state(QueueItemState::Processing);
        let item = item.requeued();
        assert_eq!(item.state(), QueueItemState::Pending);
        assert_eq!(item.attempts(), 1);
        assert_eq!(item.inner(), &vec![1u8]);
    }
}
