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

use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_store::QueueMessage;
use bridge_relayer_types::{EventStatus, QueueMessageBody};
use bridge_relayer_utils::metric::counter;
use bridge_relayer_utils::{probe, Error, Result};
use rand::Rng;
use tokio::sync::Semaphore;

use crate::Processor;

/// What became of one delivered queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed, the destination reports this status.
    Processed(EventStatus),
    /// Only the message owner may process it.
    LeftToOwner,
    /// The destination does not accept the proof.
    Rejected,
    /// Moved to the unprofitable queue.
    Unprofitable,
    /// Put back for a later attempt.
    Requeued,
    /// Out of attempts, or not a message at all.
    Dropped,
}

impl Processor {
    /// Consumes the queue forever, each message in its own task.
    ///
    /// Messages left in flight by a previous run are delivered again first.
    #[tracing::instrument(
        skip_all,
        fields(src = self.src_chain_id, dest = self.dest_chain_id),
    )]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let queue = self.queue_name();
        let recovered = self.queue.recover(&queue)?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            processor_started = true,
            %queue,
            recovered,
        );
        let workers = Arc::new(Semaphore::new(self.config.num_workers));
        loop {
            let permit = workers
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Generic("processor workers closed"))?;
            let Some(msg) = self.queue.next(&queue)? else {
                drop(permit);
                let wait = self.idle_wait();
                tracing::trace!(?wait, "queue empty");
                tokio::time::sleep(wait).await;
                continue;
            };
            let this = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let index = msg.index;
                match this.handle_delivery(msg).await {
                    Ok(delivery) => {
                        tracing::debug!(index, ?delivery, "message settled")
                    }
                    Err(e) => {
                        tracing::error!(%e, index, "failed to settle message")
                    }
                }
            });
        }
    }

    /// Poll interval plus up to half of it again, so relayers sharing a
    /// queue do not poll in lockstep.
    fn idle_wait(&self) -> Duration {
        let base = self.timings.queue_poll_interval;
        let max_jitter = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }

    /// Processes one delivered message and acks, nacks or requeues it.
    pub async fn handle_delivery(&self, msg: QueueMessage) -> Result<Delivery> {
        let body: QueueMessageBody = match serde_json::from_slice(&msg.body) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(%e, index = msg.index, "unreadable message");
                self.queue.nack(&msg, false)?;
                return Ok(Delivery::Dropped);
            }
        };
        let outcome = self.process_message(body).await;
        self.settle(&msg, outcome)
    }

    fn settle(
        &self,
        msg: &QueueMessage,
        outcome: Result<EventStatus>,
    ) -> Result<Delivery> {
        match outcome {
            Ok(status) => {
                self.queue.ack(msg)?;
                Ok(Delivery::Processed(status))
            }
            Err(Error::OnlyOwnerCanProcess) => {
                tracing::debug!(index = msg.index, "left to the owner");
                self.queue.ack(msg)?;
                Ok(Delivery::LeftToOwner)
            }
            Err(e @ Error::MessageNotReceived(_)) => {
                tracing::error!(%e, index = msg.index, "proof not accepted");
                self.queue.nack(msg, false)?;
                Ok(Delivery::Rejected)
            }
            Err(e @ Error::Unprofitable { .. }) => {
                let parked = format!("{}-unprofitable", msg.queue);
                tracing::info!(%e, queue = %parked, "parking message");
                self.queue.publish(&parked, msg.body.clone())?;
                self.queue.ack(msg)?;
                Ok(Delivery::Unprofitable)
            }
            Err(e) => {
                self.metrics.inc_counter(counter::PROCESSOR_ERRORS);
                if e.is_retriable()
                    && msg.attempts < self.config.max_message_retries
                {
                    tracing::warn!(
                        %e,
                        index = msg.index,
                        attempts = msg.attempts,
                        "processing failed, requeueing",
                    );
                    self.queue.nack(msg, true)?;
                    Ok(Delivery::Requeued)
                } else {
                    tracing::error!(
                        %e,
                        index = msg.index,
                        attempts = msg.attempts,
                        "processing failed, dropping",
                    );
                    self.metrics
                        .inc_counter(counter::PROCESSOR_MESSAGES_FAILED);
                    self.queue.nack(msg, false)?;
                    Ok(Delivery::Dropped)
                }
            }
        }
    }
}
