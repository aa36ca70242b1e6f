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

use bridge_relayer_chain::Decoded;
use bridge_relayer_types::{MessageSentFilter, MessageStatusChangedFilter};
use bridge_relayer_utils::metric::counter;
use futures::prelude::*;

use crate::Indexer;

/// What happened to the events of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

enum WindowEvent {
    Sent(Decoded<MessageSentFilter>),
    StatusChanged(Decoded<MessageStatusChangedFilter>),
}

impl Indexer {
    /// Runs the handlers of a window on at most `num_workers` events at a
    /// time. A failing handler is logged and counted, the rest of the
    /// window goes on.
    pub(crate) async fn handle_batch(
        &self,
        sent: Vec<Decoded<MessageSentFilter>>,
        changed: Vec<Decoded<MessageStatusChangedFilter>>,
    ) -> BatchResult {
        let events = sent
            .into_iter()
            .map(WindowEvent::Sent)
            .chain(changed.into_iter().map(WindowEvent::StatusChanged));
        stream::iter(events)
            .map(|event| async move {
                let (res, block) = match event {
                    WindowEvent::Sent((event, meta)) => {
                        let block = meta.block_number.as_u64();
                        (self.handle_message_sent(event, meta).await, block)
                    }
                    WindowEvent::StatusChanged((event, meta)) => {
                        let block = meta.block_number.as_u64();
                        (
                            self.handle_message_status_changed(event, meta)
                                .await,
                            block,
                        )
                    }
                };
                if let Err(e) = &res {
                    tracing::error!(%e, block, "error while handling event");
                    self.metrics.inc_counter(counter::INDEXER_HANDLER_ERRORS);
                }
                res.is_ok()
            })
            .buffer_unordered(self.config.num_workers)
            .fold(BatchResult::default(), |mut acc, ok| async move {
                if ok {
                    acc.succeeded += 1;
                } else {
                    acc.failed += 1;
                }
                acc
            })
            .await
    }
}
