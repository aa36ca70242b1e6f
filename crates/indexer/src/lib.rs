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

//! # Bridge Indexer 🕸️
//!
//! Keeps a reorg resistant record of the bridge events of one source chain
//! and queues every `MessageSent` a relayer can act on.
//!
//! ## Overview
//!
//! The indexer first backfills from its checkpoint (or from the bridge
//! genesis when resyncing) to the chain head in fixed size windows. Events
//! of a window are handled concurrently, the window end is saved as the new
//! checkpoint once they are all done. When the head moved during the
//! backfill another pass closes the gap. Once caught up it follows the
//! chain through two live subscriptions.

use std::sync::Arc;

use bridge_relayer_chain::{BridgeContract, EthClient};
use bridge_relayer_config::indexer::IndexerConfig;
use bridge_relayer_store::{BlockRepository, EventRepository, Queue};
use bridge_relayer_types::{Block, EventName, SyncMode};
use bridge_relayer_utils::metric::{MetricsSink, NoopMetrics};
use bridge_relayer_utils::retry::{with_retry, ConstantWithMaxRetryCount};
use bridge_relayer_utils::{probe, Error, Result};
use ethers::contract::LogMeta;

mod batch;
/// Where the bridge history starts.
pub mod genesis;
mod handlers;
mod subscribe;
/// Block lookup by timestamp.
pub mod timestamp;

pub use batch::BatchResult;
pub use genesis::{resolve_genesis, GenesisProbe};
pub use timestamp::block_by_timestamp;

/// Everything the [`Indexer`] talks to.
///
/// Required fields left unset make [`Indexer::new`] fail.
#[derive(Default)]
pub struct IndexerDeps {
    pub src: Option<Arc<dyn EthClient>>,
    pub src_bridge: Option<Arc<dyn BridgeContract>>,
    /// Source of the authoritative message status.
    pub dest_bridge: Option<Arc<dyn BridgeContract>>,
    pub events: Option<Arc<dyn EventRepository>>,
    pub blocks: Option<Arc<dyn BlockRepository>>,
    pub queue: Option<Arc<dyn Queue>>,
    /// Increments are dropped when unset.
    pub metrics: Option<Arc<dyn MetricsSink>>,
    pub genesis_probes: Vec<Box<dyn GenesisProbe>>,
    pub src_chain_id: u64,
    pub dest_chain_id: u64,
}

/// Indexes the bridge events of one source chain towards one destination.
pub struct Indexer {
    src: Arc<dyn EthClient>,
    src_bridge: Arc<dyn BridgeContract>,
    dest_bridge: Arc<dyn BridgeContract>,
    events: Arc<dyn EventRepository>,
    blocks: Arc<dyn BlockRepository>,
    queue: Arc<dyn Queue>,
    metrics: Arc<dyn MetricsSink>,
    genesis_probes: Vec<Box<dyn GenesisProbe>>,
    config: IndexerConfig,
    src_chain_id: u64,
    dest_chain_id: u64,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("src_chain_id", &self.src_chain_id)
            .field("dest_chain_id", &self.dest_chain_id)
            .field("src_bridge", &self.src_bridge.address())
            .field("config", &self.config)
            .finish()
    }
}

impl Indexer {
    pub fn new(deps: IndexerDeps, config: IndexerConfig) -> Result<Self> {
        if config.block_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "block batch size must be greater than 0".into(),
            ));
        }
        if config.num_workers == 0 {
            return Err(Error::InvalidConfig(
                "number of workers must be greater than 0".into(),
            ));
        }
        if deps.src_chain_id == deps.dest_chain_id {
            return Err(Error::InvalidConfig(format!(
                "source and destination are the same chain ({})",
                deps.src_chain_id
            )));
        }
        let src_bridge = deps
            .src_bridge
            .ok_or(Error::MissingDependency("source bridge"))?;
        if src_bridge.address().is_zero() {
            return Err(Error::MissingDependency("source bridge address"));
        }
        let dest_bridge = deps
            .dest_bridge
            .ok_or(Error::MissingDependency("destination bridge"))?;
        if dest_bridge.address().is_zero() {
            return Err(Error::MissingDependency("destination bridge address"));
        }
        Ok(Self {
            src: deps.src.ok_or(Error::MissingDependency("source client"))?,
            src_bridge,
            dest_bridge,
            events: deps
                .events
                .ok_or(Error::MissingDependency("event repository"))?,
            blocks: deps
                .blocks
                .ok_or(Error::MissingDependency("block repository"))?,
            queue: deps.queue.ok_or(Error::MissingDependency("queue"))?,
            metrics: deps.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            genesis_probes: deps.genesis_probes,
            config,
            src_chain_id: deps.src_chain_id,
            dest_chain_id: deps.dest_chain_id,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    fn rpc_policy(&self) -> ConstantWithMaxRetryCount {
        ConstantWithMaxRetryCount::new(
            self.config.rpc_retry_interval(),
            self.config.rpc_max_retries,
        )
    }

    /// Backfills according to the watch mode, then follows the chain live.
    ///
    /// Returns once a filter only run is caught up. A live run only returns
    /// with the error that made a subscription give up.
    #[tracing::instrument(
        skip_all,
        fields(src = self.src_chain_id, dest = self.dest_chain_id),
    )]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            indexer_started = true,
            src = self.src_chain_id,
            dest = self.dest_chain_id,
            sync_mode = ?self.config.sync_mode,
            watch_mode = ?self.config.watch_mode,
        );
        if self.config.watch_mode.backfills() {
            self.backfill().await?;
        }
        if self.config.watch_mode.subscribes() {
            return self.subscribe().await;
        }
        Ok(())
    }

    /// Walks from the processing height to the chain head, again and again
    /// while the head keeps moving.
    pub async fn backfill(&self) -> Result<()> {
        let genesis = resolve_genesis(&self.genesis_probes).await?;
        let mut sync_mode = self.config.sync_mode;
        loop {
            let head = self.chain_head().await?;
            let Some(start) = self.processing_height(sync_mode, genesis, head)?
            else {
                tracing::debug!(head, "already caught up, skipping backfill");
                break;
            };
            self.filter_range(start, head).await?;
            let new_head = self.chain_head().await?;
            if new_head <= head {
                break;
            }
            tracing::debug!(head, new_head, "chain moved while backfilling");
            sync_mode = SyncMode::Sync;
        }
        Ok(())
    }

    /// First block to scan, `None` when there is nothing to do.
    ///
    /// Syncing restarts one block before the checkpoint so a window that
    /// was cut short is scanned again.
    pub fn processing_height(
        &self,
        sync_mode: SyncMode,
        genesis: u64,
        head: u64,
    ) -> Result<Option<u64>> {
        let start = match sync_mode {
            SyncMode::Resync => genesis,
            SyncMode::Sync => {
                let checkpoint = self.checkpoint()?;
                if checkpoint >= head {
                    return Ok(None);
                }
                checkpoint.max(genesis).saturating_sub(1)
            }
        };
        Ok((start < head).then_some(start))
    }

    /// Height of the last saved checkpoint, 0 without one.
    pub fn checkpoint(&self) -> Result<u64> {
        let block = self.blocks.get_latest_block_processed_for_event(
            EventName::MessageSent,
            self.src_chain_id,
            self.dest_chain_id,
        )?;
        Ok(block.map(|b| b.height).unwrap_or_default())
    }

    async fn chain_head(&self) -> Result<u64> {
        with_retry(self.rpc_policy(), "chain head", || self.src.block_number())
            .await
    }

    /// Processes `[start, head)` window by window.
    async fn filter_range(&self, start: u64, head: u64) -> Result<()> {
        let step = self.config.block_batch_size;
        let mut window_start = start;
        loop {
            let end = head.min(window_start.saturating_add(step));
            if window_start >= end {
                break;
            }
            let result = self.process_window(window_start, end).await?;
            let progress = end as f64 / head as f64 * 100.0;
            tracing::info!(
                start = window_start,
                end,
                head,
                succeeded = result.succeeded,
                failed = result.failed,
                progress,
                "window indexed",
            );
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Sync,
                chain_id = self.src_chain_id,
                block = end,
                head,
                progress,
            );
            window_start = end;
        }
        Ok(())
    }

    /// Handles the events of `[start, end)` and advances the checkpoint to
    /// `end`.
    pub async fn process_window(&self, start: u64, end: u64) -> Result<BatchResult> {
        let last = end - 1;
        let sent = with_retry(self.rpc_policy(), "filter MessageSent", || {
            self.src_bridge.filter_message_sent(start, last)
        })
        .await?;
        let changed =
            with_retry(self.rpc_policy(), "filter MessageStatusChanged", || {
                self.src_bridge.filter_message_status_changed(start, last)
            })
            .await?;

        if sent.is_empty() && changed.is_empty() {
            self.handle_no_events_in_batch(end).await?;
            return Ok(BatchResult::default());
        }

        let result = self.handle_batch(sent, changed).await;
        self.save_checkpoint(end).await?;
        Ok(result)
    }

    /// An empty window still moves the checkpoint.
    async fn handle_no_events_in_batch(&self, end: u64) -> Result<()> {
        self.save_checkpoint(end).await
    }

    /// Moves the checkpoint to the block of a live event.
    ///
    /// Events of both subscriptions arrive in any order, an older block
    /// leaves the checkpoint where it is.
    pub(crate) fn save_live_checkpoint(&self, meta: &LogMeta) -> Result<()> {
        let height = meta.block_number.as_u64();
        if height <= self.checkpoint()? {
            return Ok(());
        }
        self.blocks.save(Block {
            height,
            hash: meta.block_hash,
            chain_id: self.src_chain_id,
            dest_chain_id: self.dest_chain_id,
            event_name: EventName::MessageSent,
        })
    }

    async fn save_checkpoint(&self, height: u64) -> Result<()> {
        let header = with_retry(self.rpc_policy(), "checkpoint header", || {
            self.src.header_by_number(Some(height))
        })
        .await?;
        let hash = header
            .hash
            .ok_or_else(|| Error::BlockNotFound(height.to_string()))?;
        self.blocks.save(Block {
            height,
            hash,
            chain_id: self.src_chain_id,
            dest_chain_id: self.dest_chain_id,
            event_name: EventName::MessageSent,
        })
    }
}
