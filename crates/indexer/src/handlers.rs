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

use bridge_relayer_store::queue_name;
use bridge_relayer_types::{
    EventName, EventStatus, MessageSentEvent, MessageSentFilter,
    MessageStatusChangedEvent, MessageStatusChangedFilter, QueueMessageBody,
    SaveEventOpts,
};
use bridge_relayer_utils::metric::counter;
use bridge_relayer_utils::{probe, Error, Result};
use ethers::contract::LogMeta;
use ethers::types::{Address, H256, U256};

use crate::Indexer;

impl Indexer {
    /// Persists a `MessageSent` and queues it when a relayer may process
    /// it.
    ///
    /// A row already stored for the same message hash in another block is
    /// left over from a reorged chain and gets replaced.
    #[tracing::instrument(
        skip_all,
        fields(msg_hash = tracing::field::Empty, block = %meta.block_number),
    )]
    pub async fn handle_message_sent(
        &self,
        event: MessageSentFilter,
        meta: LogMeta,
    ) -> Result<()> {
        let event = MessageSentEvent::new(event, &meta);
        let msg_hash = event.msg_hash;
        tracing::Span::current()
            .record("msg_hash", tracing::field::debug(msg_hash));

        let min_fee = U256::from(self.config.min_fee_to_index);
        if !min_fee.is_zero() && event.message.processing_fee < min_fee {
            tracing::debug!(
                fee = %event.message.processing_fee,
                %min_fee,
                "processing fee too low, skipping",
            );
            return Ok(());
        }

        if let Some(existing) = self
            .events
            .first_by_event_and_msg_hash(EventName::MessageSent, msg_hash)?
        {
            if same_log(&existing.data, &event) {
                tracing::trace!(id = existing.id, "already indexed");
                return Ok(());
            }
            tracing::warn!(
                id = existing.id,
                old_block = existing.block_id,
                new_block = event.raw.block_number,
                "message seen again, replacing the reorged event",
            );
            self.events.delete(existing.id)?;
            self.metrics
                .inc_counter(counter::MESSAGE_SENT_EVENTS_AFTER_REORG);
        }

        let destination = self.dest_bridge.get_message_status(msg_hash).await?;
        let status = EventStatus::for_message(
            destination,
            Some(event.message.gas_limit),
        );
        let saved = self.events.save(SaveEventOpts {
            name: EventName::MessageSent,
            chain_id: self.src_chain_id,
            dest_chain_id: self.dest_chain_id,
            data: serde_json::to_string(&event)?,
            msg_hash,
            message_owner: event.message.owner,
            status,
            block_id: event.raw.block_number,
        })?;
        self.metrics.inc_counter(counter::MESSAGE_SENT_EVENTS_INDEXED);

        if status != EventStatus::New {
            tracing::debug!(%status, id = saved.id, "not actionable, not queued");
            return Ok(());
        }
        let body = QueueMessageBody {
            id: saved.id,
            event,
        };
        let queue = queue_name(
            self.src_chain_id,
            self.dest_chain_id,
            EventName::MessageSent,
        );
        self.queue.publish(&queue, serde_json::to_vec(&body)?)?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Indexer,
            queued = saved.id,
            msg_hash = ?msg_hash,
            %queue,
        );
        Ok(())
    }

    /// Persists a `MessageStatusChanged`, keeping one row per message with
    /// its latest status.
    #[tracing::instrument(skip_all, fields(block = %meta.block_number))]
    pub async fn handle_message_status_changed(
        &self,
        event: MessageStatusChangedFilter,
        meta: LogMeta,
    ) -> Result<()> {
        let status = EventStatus::from_contract(event.status)
            .ok_or(Error::Generic("unknown message status"))?;
        let event = MessageStatusChangedEvent::new(event, &meta);
        self.save_status_changed(event, status)?;
        self.metrics
            .inc_counter(counter::MESSAGE_STATUS_CHANGED_EVENTS_INDEXED);
        Ok(())
    }

    pub(crate) fn save_status_changed(
        &self,
        event: MessageStatusChangedEvent,
        status: EventStatus,
    ) -> Result<()> {
        let msg_hash = event.msg_hash;
        let existing = self.events.first_by_event_and_msg_hash(
            EventName::MessageStatusChanged,
            msg_hash,
        )?;
        if let Some(existing) = existing {
            if existing.status != status {
                self.events.update_status(existing.id, status)?;
            }
            return Ok(());
        }
        let owner = self.message_owner(msg_hash)?;
        self.events.save(SaveEventOpts {
            name: EventName::MessageStatusChanged,
            chain_id: self.src_chain_id,
            dest_chain_id: self.dest_chain_id,
            data: serde_json::to_string(&event)?,
            msg_hash,
            message_owner: owner,
            status,
            block_id: event.raw.block_number,
        })?;
        Ok(())
    }

    fn message_owner(&self, msg_hash: H256) -> Result<Address> {
        let sent = self
            .events
            .first_by_event_and_msg_hash(EventName::MessageSent, msg_hash)?;
        Ok(sent.map(|e| e.message_owner).unwrap_or_default())
    }
}

/// Whether a stored row describes the very same log.
fn same_log(stored: &str, event: &MessageSentEvent) -> bool {
    serde_json::from_str::<MessageSentEvent>(stored)
        .map(|stored| stored.raw == event.raw)
        .unwrap_or(false)
}
