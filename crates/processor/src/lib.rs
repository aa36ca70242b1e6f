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

//! # Bridge Processor 📨
//!
//! Takes the `MessageSent` events queued by the indexer and delivers them on
//! the destination chain.
//!
//! For every message the processor waits for the source transaction to be
//! confirmed and for the destination to trust a source header at least as
//! recent as the event, then proves the signal, checks the proof against
//! the destination bridge, submits `processMessage` and stores the status
//! the destination reports afterwards.

use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_chain::wait::{
    wait_confirmations, wait_receipt, CONFIRMATIONS_POLL_INTERVAL,
    RECEIPT_POLL_INTERVAL,
};
use bridge_relayer_chain::{
    BridgeContract, EthClient, HeaderSyncer, ProofClient, TransactOpts,
};
use bridge_relayer_config::ProcessorConfig;
use bridge_relayer_proof::{storage_key, Hop, Prover};
use bridge_relayer_store::{queue_name, EventRepository, Queue};
use bridge_relayer_types::{
    BridgeMessage, EventName, EventStatus, MessageStatusChangedFilter,
    QueueMessageBody, SaveEventOpts,
};
use bridge_relayer_utils::metric::{counter, MetricsSink, NoopMetrics};
use bridge_relayer_utils::{probe, Error, Result};
use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

mod consumer;
mod nonce;

pub use consumer::Delivery;
pub use nonce::NonceManager;

/// Gas used for a plain value transfer when estimation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 500_000;
/// Gas used for a message carrying calldata when estimation fails.
pub const FALLBACK_GAS_LIMIT_WITH_DATA: u64 = 600_000;

/// Gas limit to submit with when the estimate is not available.
pub fn fallback_gas_limit(message: &BridgeMessage) -> U256 {
    if message.data.is_empty() {
        U256::from(FALLBACK_GAS_LIMIT)
    } else {
        U256::from(FALLBACK_GAS_LIMIT_WITH_DATA)
    }
}

/// Polling periods and bounds of the processor waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub confirmation_interval: Duration,
    pub confirmation_timeout: Duration,
    pub header_sync_interval: Duration,
    /// Unbounded when unset.
    pub header_sync_timeout: Option<Duration>,
    pub receipt_interval: Duration,
    pub receipt_timeout: Duration,
    pub queue_poll_interval: Duration,
}

impl From<&ProcessorConfig> for Timings {
    fn from(config: &ProcessorConfig) -> Self {
        Self {
            confirmation_interval: CONFIRMATIONS_POLL_INTERVAL,
            confirmation_timeout: config.confirmation_timeout(),
            header_sync_interval: config.header_sync_interval(),
            header_sync_timeout: config.header_sync_timeout(),
            receipt_interval: RECEIPT_POLL_INTERVAL,
            receipt_timeout: config.receipt_timeout(),
            queue_poll_interval: config.queue_poll_interval(),
        }
    }
}

/// Everything the [`Processor`] talks to.
///
/// Required fields left unset make [`Processor::new`] fail.
#[derive(Default)]
pub struct ProcessorDeps {
    /// Source chain, for confirmations, headers and proofs.
    pub src: Option<Arc<dyn ProofClient>>,
    /// Destination chain, for nonces, gas prices and receipts.
    pub dest: Option<Arc<dyn EthClient>>,
    pub dest_bridge: Option<Arc<dyn BridgeContract>>,
    pub header_syncer: Option<Arc<dyn HeaderSyncer>>,
    pub events: Option<Arc<dyn EventRepository>>,
    pub queue: Option<Arc<dyn Queue>>,
    /// Increments are dropped when unset.
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// The source bridge, sender of every signal.
    pub src_bridge_address: Address,
    /// Where the source signals are stored.
    pub signal_service: Address,
    /// Address that signs the destination transactions.
    pub signer: Address,
    pub hops: Vec<Hop>,
    pub src_chain_id: u64,
    pub dest_chain_id: u64,
}

/// Delivers the messages of one source chain on one destination chain.
pub struct Processor {
    src: Arc<dyn ProofClient>,
    dest: Arc<dyn EthClient>,
    dest_bridge: Arc<dyn BridgeContract>,
    header_syncer: Arc<dyn HeaderSyncer>,
    events: Arc<dyn EventRepository>,
    queue: Arc<dyn Queue>,
    metrics: Arc<dyn MetricsSink>,
    prover: Prover,
    nonces: NonceManager,
    src_bridge_address: Address,
    signal_service: Address,
    hops: Vec<Hop>,
    config: ProcessorConfig,
    timings: Timings,
    src_chain_id: u64,
    dest_chain_id: u64,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("src_chain_id", &self.src_chain_id)
            .field("dest_chain_id", &self.dest_chain_id)
            .field("signer", &self.nonces.account())
            .field("hops", &self.hops)
            .field("timings", &self.timings)
            .finish()
    }
}

impl Processor {
    pub fn new(deps: ProcessorDeps, config: ProcessorConfig) -> Result<Self> {
        if config.confirmations == 0 {
            return Err(Error::InvalidConfig(
                "confirmations must be greater than 0".into(),
            ));
        }
        if config.num_workers == 0 {
            return Err(Error::InvalidConfig(
                "number of workers must be greater than 0".into(),
            ));
        }
        if config.header_sync_interval == 0 {
            return Err(Error::InvalidConfig(
                "header sync interval must be greater than 0".into(),
            ));
        }
        let dest_bridge = deps
            .dest_bridge
            .ok_or(Error::MissingDependency("destination bridge"))?;
        if dest_bridge.address().is_zero() {
            return Err(Error::MissingDependency("destination bridge address"));
        }
        if deps.src_bridge_address.is_zero() {
            return Err(Error::MissingDependency("source bridge address"));
        }
        let src = deps.src.ok_or(Error::MissingDependency("source client"))?;
        let dest = deps
            .dest
            .ok_or(Error::MissingDependency("destination client"))?;
        Ok(Self {
            prover: Prover::new(src.clone()),
            nonces: NonceManager::new(dest.clone(), deps.signer),
            src,
            dest,
            dest_bridge,
            header_syncer: deps
                .header_syncer
                .ok_or(Error::MissingDependency("header syncer"))?,
            events: deps
                .events
                .ok_or(Error::MissingDependency("event repository"))?,
            queue: deps.queue.ok_or(Error::MissingDependency("queue"))?,
            metrics: deps.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            src_bridge_address: deps.src_bridge_address,
            signal_service: deps.signal_service,
            hops: deps.hops,
            timings: Timings::from(&config),
            config,
            src_chain_id: deps.src_chain_id,
            dest_chain_id: deps.dest_chain_id,
        })
    }

    /// Replaces the polling periods and bounds taken from the config.
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The queue this processor consumes.
    pub fn queue_name(&self) -> String {
        queue_name(self.src_chain_id, self.dest_chain_id, EventName::MessageSent)
    }

    /// Runs the whole pipeline for one queued message and returns the
    /// status the destination reports once it is processed.
    #[tracing::instrument(
        skip_all,
        fields(id = body.id, msg_hash = ?body.event.msg_hash),
    )]
    pub async fn process_message(
        &self,
        body: QueueMessageBody,
    ) -> Result<EventStatus> {
        let QueueMessageBody { id, event } = body;
        let msg_hash = event.msg_hash;
        if event.message.gas_limit.is_zero() {
            return Err(Error::OnlyOwnerCanProcess);
        }

        wait_confirmations(
            &*self.src,
            event.raw.transaction_hash,
            self.config.confirmations,
            self.timings.confirmation_interval,
            self.timings.confirmation_timeout,
        )
        .await?;
        tracing::debug!("source transaction confirmed");

        let synced = self.wait_for_header_sync(event.raw.block_number).await?;
        let key = storage_key(self.src_bridge_address, msg_hash);
        let proof = self
            .prover
            .encoded_signal_proof(self.signal_service, key, synced, &self.hops)
            .await?;

        let received = self
            .dest_bridge
            .is_message_received(
                msg_hash,
                event.message.src_chain_id,
                proof.clone(),
            )
            .await?;
        if !received {
            self.metrics
                .inc_counter(counter::PROCESSOR_MESSAGE_RECEIVED_FALSE);
            return Err(Error::MessageNotReceived(msg_hash));
        }

        let opts = self.transact_opts(&event.message, &proof).await?;
        let message = event.message.clone();
        let submitted = self
            .nonces
            .submit(|nonce| {
                self.dest_bridge.process_message(
                    TransactOpts { nonce, ..opts },
                    message,
                    proof,
                )
            })
            .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Processor,
            submitted = ?submitted.hash,
            nonce = %submitted.nonce,
            msg_hash = ?msg_hash,
        );

        let receipt = wait_receipt(
            &*self.dest,
            submitted.hash,
            self.timings.receipt_interval,
            self.timings.receipt_timeout,
        )
        .await?;
        self.save_status_changed(
            &receipt,
            &event.message,
            msg_hash,
            event.raw.block_number,
        )?;

        let status = self.dest_bridge.get_message_status(msg_hash).await?;
        self.events.update_status(id, status)?;
        match status {
            EventStatus::Done => {
                self.metrics.inc_counter(counter::PROCESSOR_MESSAGES_DONE)
            }
            EventStatus::Retriable => self
                .metrics
                .inc_counter(counter::PROCESSOR_MESSAGES_RETRIABLE),
            _ => {}
        }
        tracing::info!(
            %status,
            tx = ?receipt.transaction_hash,
            "message processed",
        );
        Ok(status)
    }

    /// Waits until the destination trusts a source header at or above
    /// `event_block` and returns its hash.
    async fn wait_for_header_sync(&self, event_block: u64) -> Result<H256> {
        let poll = async {
            let mut ticker =
                tokio::time::interval(self.timings.header_sync_interval);
            loop {
                ticker.tick().await;
                let hash = self.header_syncer.latest_synced_header().await?;
                if hash.is_zero() {
                    continue;
                }
                let header = self.src.block_by_hash(hash).await?;
                let synced = header.number.map(|n| n.as_u64()).unwrap_or(0);
                if synced >= event_block {
                    tracing::debug!(synced, event_block, "header synced");
                    return Ok::<_, Error>(hash);
                }
                tracing::trace!(synced, event_block, "waiting for header sync");
            }
        };
        match self.timings.header_sync_timeout {
            Some(timeout) => tokio::time::timeout(timeout, poll)
                .await
                .map_err(|_| Error::Timeout("header sync"))?,
            None => poll.await,
        }
    }

    /// Gas limit and price of the `processMessage` transaction.
    ///
    /// With `profitable_only` set, a message whose fee does not cover the
    /// estimated cost is rejected.
    async fn transact_opts(
        &self,
        message: &BridgeMessage,
        proof: &Bytes,
    ) -> Result<TransactOpts> {
        let gas_limit = match self
            .dest_bridge
            .estimate_process_message(message, proof)
            .await
        {
            Ok(gas) => gas,
            Err(e) => {
                let fallback = fallback_gas_limit(message);
                tracing::warn!(%e, %fallback, "gas estimation failed");
                fallback
            }
        };
        let gas_price = if self.config.profitable_only {
            let price = self.dest.gas_price().await?;
            let cost = gas_limit.saturating_mul(price);
            if message.processing_fee < cost {
                self.metrics.inc_counter(counter::PROCESSOR_UNPROFITABLE);
                return Err(Error::Unprofitable {
                    fee: message.processing_fee,
                    cost,
                });
            }
            Some(price)
        } else {
            None
        };
        Ok(TransactOpts {
            nonce: U256::zero(),
            gas_limit,
            gas_price,
        })
    }

    /// Stores the `MessageStatusChanged` the destination emitted while
    /// processing the message.
    fn save_status_changed(
        &self,
        receipt: &TransactionReceipt,
        message: &BridgeMessage,
        msg_hash: H256,
        block: u64,
    ) -> Result<()> {
        let topic = MessageStatusChangedFilter::signature();
        let Some(log) = receipt
            .logs
            .iter()
            .find(|log| log.topics.first() == Some(&topic))
        else {
            tracing::debug!("no status change in the receipt");
            return Ok(());
        };
        let changed: MessageStatusChangedFilter =
            ethers::contract::parse_log(log.clone())?;
        let status = EventStatus::from_contract(changed.status)
            .ok_or(Error::Generic("unknown message status"))?;
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
        let data = serde_json::json!({
            "Raw": { "transactionHash": receipt.transaction_hash },
        });
        self.events.save(SaveEventOpts {
            name: EventName::MessageStatusChanged,
            chain_id: self.src_chain_id,
            dest_chain_id: self.dest_chain_id,
            data: data.to_string(),
            msg_hash,
            message_owner: message.owner,
            status,
            block_id: block,
        })?;
        Ok(())
    }
}
