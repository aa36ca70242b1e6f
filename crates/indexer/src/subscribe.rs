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

use backoff::backoff::Backoff;
use bridge_relayer_chain::{Decoded, Subscription};
use bridge_relayer_types::{
    EventName, MessageSentFilter, MessageStatusChangedFilter,
};
use bridge_relayer_utils::metric::counter;
use bridge_relayer_utils::retry::ConstantWithMaxRetryCount;
use bridge_relayer_utils::{probe, Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::Indexer;

/// An event the indexer follows live.
#[async_trait::async_trait]
trait LiveEvent: Sized + Send + 'static {
    const NAME: EventName;

    async fn watch(indexer: &Indexer) -> Result<Subscription<Decoded<Self>>>;

    async fn handle(indexer: &Indexer, event: Decoded<Self>) -> Result<()>;
}

#[async_trait::async_trait]
impl LiveEvent for MessageSentFilter {
    const NAME: EventName = EventName::MessageSent;

    async fn watch(indexer: &Indexer) -> Result<Subscription<Decoded<Self>>> {
        indexer.src_bridge.watch_message_sent().await
    }

    async fn handle(indexer: &Indexer, event: Decoded<Self>) -> Result<()> {
        let (event, meta) = event;
        indexer.handle_message_sent(event, meta).await
    }
}

#[async_trait::async_trait]
impl LiveEvent for MessageStatusChangedFilter {
    const NAME: EventName = EventName::MessageStatusChanged;

    async fn watch(indexer: &Indexer) -> Result<Subscription<Decoded<Self>>> {
        indexer.src_bridge.watch_message_status_changed().await
    }

    async fn handle(indexer: &Indexer, event: Decoded<Self>) -> Result<()> {
        let (event, meta) = event;
        indexer.handle_message_status_changed(event, meta).await
    }
}

impl Indexer {
    /// Follows both bridge events live until one of the subscriptions runs
    /// out of resubscribe attempts, whose error is returned.
    pub async fn subscribe(self: &Arc<Self>) -> Result<()> {
        let (errors, mut first_error) = mpsc::channel(2);
        let mut tasks = JoinSet::new();
        tasks.spawn(
            self.clone()
                .watch_forever::<MessageSentFilter>(errors.clone()),
        );
        tasks.spawn(
            self.clone()
                .watch_forever::<MessageStatusChangedFilter>(errors),
        );
        let err = first_error.recv().await.unwrap_or(Error::SubscriptionClosed);
        tracing::error!(%err, "live indexing stopped");
        // Dropping the set aborts the other subscription.
        drop(tasks);
        Err(err)
    }

    async fn watch_forever<E: LiveEvent>(
        self: Arc<Self>,
        errors: mpsc::Sender<Error>,
    ) {
        let mut backoff = ConstantWithMaxRetryCount::new(
            self.config.subscription_backoff(),
            self.config.max_resubscribe_attempts,
        );
        loop {
            let err = match E::watch(&self).await {
                Ok(mut sub) => {
                    tracing::debug!(event = %E::NAME, "subscribed");
                    loop {
                        match sub.next().await {
                            Some(Ok(event)) => {
                                backoff.reset();
                                let meta = event.1.clone();
                                if let Err(e) = E::handle(&self, event).await {
                                    tracing::error!(
                                        %e,
                                        event = %E::NAME,
                                        "error while handling live event",
                                    );
                                    self.metrics.inc_counter(
                                        counter::INDEXER_HANDLER_ERRORS,
                                    );
                                }
                                if let Err(e) = self.save_live_checkpoint(&meta)
                                {
                                    tracing::error!(
                                        %e,
                                        block = %meta.block_number,
                                        "failed to save live checkpoint",
                                    );
                                }
                            }
                            Some(Err(e)) => break e,
                            None => break Error::SubscriptionClosed,
                        }
                    }
                }
                Err(e) => e,
            };
            let Some(wait) = backoff.next_backoff() else {
                tracing::error!(
                    %err,
                    event = %E::NAME,
                    attempts = backoff.attempts(),
                    "giving up on subscription",
                );
                let _ = errors.send(err).await;
                return;
            };
            tracing::warn!(
                %err,
                event = %E::NAME,
                retry_in = ?wait,
                "subscription dropped, resubscribing",
            );
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Indexer,
                resubscribe = %E::NAME,
                attempt = backoff.attempts(),
            );
            self.metrics.inc_counter(counter::INDEXER_RESUBSCRIPTIONS);
            tokio::time::sleep(wait).await;
        }
    }
}
