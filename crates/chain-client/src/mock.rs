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

//! In-memory doubles of the chain capabilities.
//!
//! Every double is a cheap handle over shared state, tests keep a clone to
//! steer the chain while the code under test owns another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_relayer_types::{
    BridgeMessage, EventStatus, MessageSentFilter, MessageStatusChangedFilter,
};
use bridge_relayer_utils::Error;
use ethers::abi::Token;
use ethers::contract::{EthEvent, LogMeta};
use ethers::types::{
    Address, Bytes, Log, TransactionReceipt, H256, U256, U64,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::subscription::SUBSCRIPTION_BUFFER;
use crate::{
    BridgeContract, Caller, Decoded, EthClient, Header, HeaderSyncer,
    StorageProofResponse, SubmittedTx, Subscription, TransactOpts,
};

/// Seconds between two mock blocks.
pub const MOCK_BLOCK_TIME: u64 = 12;
/// Timestamp of block 1 unless changed.
pub const MOCK_GENESIS_TIMESTAMP: u64 = 1_700_000_000;

type Sender<T> = mpsc::Sender<crate::Result<T>>;

#[derive(Debug)]
struct ChainState {
    chain_id: u64,
    latest: u64,
    genesis_timestamp: u64,
    hash_overrides: HashMap<u64, H256>,
    receipts: HashMap<H256, TransactionReceipt>,
    pending_nonce: U256,
    gas_price: U256,
    proofs: HashMap<Address, StorageProofResponse>,
    proof_requests: Vec<(Address, Vec<H256>, u64)>,
    call_responses: HashMap<(Address, [u8; 4]), Bytes>,
    failing_block_numbers: usize,
    head_watchers: Vec<Sender<Header>>,
}

/// A chain whose blocks `0..=latest` all exist.
///
/// Block `n` has timestamp `genesis + (n - 1) * 12` and a hash derived
/// from the chain id and `n`, unless overridden.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(chain_id: u64, latest: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                chain_id,
                latest,
                genesis_timestamp: MOCK_GENESIS_TIMESTAMP,
                hash_overrides: HashMap::new(),
                receipts: HashMap::new(),
                pending_nonce: U256::zero(),
                gas_price: U256::from(1_000_000_000u64),
                proofs: HashMap::new(),
                proof_requests: Vec::new(),
                call_responses: HashMap::new(),
                failing_block_numbers: 0,
                head_watchers: Vec::new(),
            })),
        }
    }

    pub fn latest(&self) -> u64 {
        self.state.lock().latest
    }

    pub fn set_latest(&self, latest: u64) {
        self.state.lock().latest = latest;
    }

    pub fn set_genesis_timestamp(&self, timestamp: u64) {
        self.state.lock().genesis_timestamp = timestamp;
    }

    pub fn timestamp_of(&self, number: u64) -> u64 {
        let genesis = self.state.lock().genesis_timestamp;
        genesis + number.saturating_sub(1) * MOCK_BLOCK_TIME
    }

    pub fn hash_of(&self, number: u64) -> H256 {
        let state = self.state.lock();
        Self::hash_in(&state, number)
    }

    fn hash_in(state: &ChainState, number: u64) -> H256 {
        state.hash_overrides.get(&number).copied().unwrap_or_else(|| {
            H256(ethers::utils::keccak256(format!(
                "{}-{}",
                state.chain_id, number
            )))
        })
    }

    /// Replaces the hash of block `number`, as a reorg would.
    pub fn set_block_hash(&self, number: u64, hash: H256) {
        self.state.lock().hash_overrides.insert(number, hash);
    }

    pub fn header(&self, number: u64) -> Header {
        let state = self.state.lock();
        Self::header_in(&state, number)
    }

    fn header_in(state: &ChainState, number: u64) -> Header {
        Header {
            number: Some(U64::from(number)),
            hash: Some(Self::hash_in(state, number)),
            parent_hash: Self::hash_in(state, number.saturating_sub(1)),
            timestamp: U256::from(
                state.genesis_timestamp
                    + number.saturating_sub(1) * MOCK_BLOCK_TIME,
            ),
            gas_limit: U256::from(30_000_000u64),
            base_fee_per_gas: Some(U256::from(7u64)),
            ..Default::default()
        }
    }

    /// Stores a receipt mined at `block` and returns its hash.
    pub fn insert_receipt(&self, hash: H256, block: u64, success: bool) -> H256 {
        let mut state = self.state.lock();
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(block)),
            block_hash: Some(Self::hash_in(&state, block)),
            status: Some(U64::from(u64::from(success))),
            ..Default::default()
        };
        state.receipts.insert(hash, receipt);
        hash
    }

    pub fn put_receipt(&self, receipt: TransactionReceipt) {
        self.state
            .lock()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn set_pending_nonce(&self, nonce: impl Into<U256>) {
        self.state.lock().pending_nonce = nonce.into();
    }

    pub fn set_gas_price(&self, price: impl Into<U256>) {
        self.state.lock().gas_price = price.into();
    }

    /// The proof served for `address`, whatever keys are asked.
    pub fn set_proof(&self, address: Address, proof: StorageProofResponse) {
        self.state.lock().proofs.insert(address, proof);
    }

    pub fn proof_requests(&self) -> Vec<(Address, Vec<H256>, u64)> {
        self.state.lock().proof_requests.clone()
    }

    /// Answers calls to `to` starting with `selector` with `output`.
    pub fn set_call_response(
        &self,
        to: Address,
        selector: [u8; 4],
        output: impl Into<Bytes>,
    ) {
        self.state
            .lock()
            .call_responses
            .insert((to, selector), output.into());
    }

    /// The next `times` calls to `block_number` fail.
    pub fn fail_block_number(&self, times: usize) {
        self.state.lock().failing_block_numbers = times;
    }

    /// Moves the head to `number` and announces it to subscribers.
    pub fn push_head(&self, number: u64) {
        let mut state = self.state.lock();
        state.latest = number;
        let header = Self::header_in(&state, number);
        state
            .head_watchers
            .retain(|tx| tx.try_send(Ok(header.clone())).is_ok());
    }
}

#[async_trait::async_trait]
impl EthClient for MockChain {
    async fn chain_id(&self) -> crate::Result<u64> {
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> crate::Result<u64> {
        let mut state = self.state.lock();
        if state.failing_block_numbers > 0 {
            state.failing_block_numbers -= 1;
            return Err(Error::Generic("mock block number failure"));
        }
        Ok(state.latest)
    }

    async fn header_by_number(
        &self,
        number: Option<u64>,
    ) -> crate::Result<Header> {
        let state = self.state.lock();
        match number {
            None => Ok(Self::header_in(&state, state.latest)),
            Some(n) if n <= state.latest => Ok(Self::header_in(&state, n)),
            Some(n) => Err(Error::BlockNotFound(n.to_string())),
        }
    }

    async fn block_by_hash(&self, hash: H256) -> crate::Result<Header> {
        let state = self.state.lock();
        (0..=state.latest)
            .rev()
            .find(|n| Self::hash_in(&state, *n) == hash)
            .map(|n| Self::header_in(&state, n))
            .ok_or_else(|| Error::BlockNotFound(format!("{hash:?}")))
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> crate::Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn pending_nonce_at(&self, _account: Address) -> crate::Result<U256> {
        Ok(self.state.lock().pending_nonce)
    }

    async fn gas_price(&self) -> crate::Result<U256> {
        Ok(self.state.lock().gas_price)
    }

    async fn call(&self, to: Address, data: Bytes) -> crate::Result<Bytes> {
        let mut selector = [0u8; 4];
        let prefix = data.get(..4).ok_or(Error::Generic("call without selector"))?;
        selector.copy_from_slice(prefix);
        self.state
            .lock()
            .call_responses
            .get(&(to, selector))
            .cloned()
            .ok_or(Error::Generic("unexpected mock call"))
    }

    async fn subscribe_new_heads(&self) -> crate::Result<Subscription<Header>> {
        let (tx, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        self.state.lock().head_watchers.push(tx);
        Ok(sub)
    }
}

#[async_trait::async_trait]
impl Caller for MockChain {
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<H256>,
        block: u64,
    ) -> crate::Result<StorageProofResponse> {
        let mut state = self.state.lock();
        state.proof_requests.push((address, keys, block));
        state
            .proofs
            .get(&address)
            .cloned()
            .ok_or(Error::Generic("no mock proof for address"))
    }
}

#[derive(Debug)]
struct BridgeState {
    sent: Vec<Decoded<MessageSentFilter>>,
    status_changed: Vec<Decoded<MessageStatusChangedFilter>>,
    statuses: HashMap<H256, EventStatus>,
    received: bool,
    gas_estimate: U256,
    submitted: Vec<(TransactOpts, BridgeMessage)>,
    submit_delay: Option<Duration>,
    status_after_process: EventStatus,
    revert: bool,
    next_log_index: u64,
    failing_filters: usize,
    failing_watches: usize,
    watch_calls: usize,
    filter_ranges: Vec<(u64, u64)>,
    sent_watchers: Vec<Sender<Decoded<MessageSentFilter>>>,
    changed_watchers: Vec<Sender<Decoded<MessageStatusChangedFilter>>>,
}

/// A bridge contract, optionally deployed on a [`MockChain`].
///
/// When linked to a chain, `process_message` leaves a receipt carrying a
/// `MessageStatusChanged` log on it.
#[derive(Debug, Clone)]
pub struct MockBridge {
    address: Address,
    chain: Option<MockChain>,
    state: Arc<Mutex<BridgeState>>,
}

impl MockBridge {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            chain: None,
            state: Arc::new(Mutex::new(BridgeState {
                sent: Vec::new(),
                status_changed: Vec::new(),
                statuses: HashMap::new(),
                received: true,
                gas_estimate: U256::from(200_000u64),
                submitted: Vec::new(),
                submit_delay: None,
                status_after_process: EventStatus::Done,
                revert: false,
                next_log_index: 0,
                failing_filters: 0,
                failing_watches: 0,
                watch_calls: 0,
                filter_ranges: Vec::new(),
                sent_watchers: Vec::new(),
                changed_watchers: Vec::new(),
            })),
        }
    }

    pub fn on_chain(mut self, chain: MockChain) -> Self {
        self.chain = Some(chain);
        self
    }

    fn meta(&self, block: u64, log_index: u64) -> LogMeta {
        let block_hash = match &self.chain {
            Some(chain) => chain.hash_of(block),
            None => H256::from_low_u64_be(block),
        };
        LogMeta {
            address: self.address,
            block_number: U64::from(block),
            block_hash,
            transaction_hash: H256(ethers::utils::keccak256(format!(
                "tx-{block}-{log_index}"
            ))),
            transaction_index: U64::zero(),
            log_index: U256::from(log_index),
        }
    }

    fn take_log_index(&self) -> u64 {
        let mut state = self.state.lock();
        let index = state.next_log_index;
        state.next_log_index += 1;
        index
    }

    /// Records `message` as sent in `block`, visible to filters.
    pub fn push_message_sent(
        &self,
        message: BridgeMessage,
        block: u64,
    ) -> Decoded<MessageSentFilter> {
        let meta = self.meta(block, self.take_log_index());
        let event = MessageSentFilter {
            msg_hash: message.hash().0,
            message,
        };
        let decoded = (event, meta);
        self.state.lock().sent.push(decoded.clone());
        decoded
    }

    /// Records a status change in `block`, visible to filters.
    pub fn push_status_changed(
        &self,
        msg_hash: H256,
        status: EventStatus,
        block: u64,
    ) -> Decoded<MessageStatusChangedFilter> {
        self.push_status_code(msg_hash, status.code(), block)
    }

    /// Like [`MockBridge::push_status_changed`] with a raw status code.
    pub fn push_status_code(
        &self,
        msg_hash: H256,
        status: u8,
        block: u64,
    ) -> Decoded<MessageStatusChangedFilter> {
        let meta = self.meta(block, self.take_log_index());
        let event = MessageStatusChangedFilter {
            msg_hash: msg_hash.0,
            status,
        };
        let decoded = (event, meta);
        self.state.lock().status_changed.push(decoded.clone());
        decoded
    }

    /// Delivers `event` to live `MessageSent` watchers.
    pub fn emit_message_sent(&self, event: Decoded<MessageSentFilter>) {
        self.state
            .lock()
            .sent_watchers
            .retain(|tx| tx.try_send(Ok(event.clone())).is_ok());
    }

    /// Delivers `event` to live `MessageStatusChanged` watchers.
    pub fn emit_status_changed(
        &self,
        event: Decoded<MessageStatusChangedFilter>,
    ) {
        self.state
            .lock()
            .changed_watchers
            .retain(|tx| tx.try_send(Ok(event.clone())).is_ok());
    }

    /// Ends every live watch with [`Error::SubscriptionClosed`].
    pub fn close_watches(&self) {
        let mut state = self.state.lock();
        for tx in state.sent_watchers.drain(..) {
            let _ = tx.try_send(Err(Error::SubscriptionClosed));
        }
        for tx in state.changed_watchers.drain(..) {
            let _ = tx.try_send(Err(Error::SubscriptionClosed));
        }
    }

    pub fn live_watches(&self) -> usize {
        let state = self.state.lock();
        state.sent_watchers.len() + state.changed_watchers.len()
    }

    /// The next `times` watch attempts fail.
    pub fn fail_watches(&self, times: usize) {
        self.state.lock().failing_watches = times;
    }

    pub fn watch_calls(&self) -> usize {
        self.state.lock().watch_calls
    }

    /// The next `times` filter calls fail.
    pub fn fail_filters(&self, times: usize) {
        self.state.lock().failing_filters = times;
    }

    /// Ranges of the `MessageSent` filters, in call order.
    pub fn filter_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().filter_ranges.clone()
    }

    pub fn set_status(&self, msg_hash: H256, status: EventStatus) {
        self.state.lock().statuses.insert(msg_hash, status);
    }

    pub fn set_received(&self, received: bool) {
        self.state.lock().received = received;
    }

    pub fn set_gas_estimate(&self, gas: impl Into<U256>) {
        self.state.lock().gas_estimate = gas.into();
    }

    /// Each submission takes `delay` before it is accepted.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().submit_delay = Some(delay);
    }

    /// Status the contract moves a message to once processed.
    pub fn set_status_after_process(&self, status: EventStatus) {
        self.state.lock().status_after_process = status;
    }

    /// Receipts of later submissions report a failure.
    pub fn set_revert(&self, revert: bool) {
        self.state.lock().revert = revert;
    }

    pub fn submitted(&self) -> Vec<(TransactOpts, BridgeMessage)> {
        self.state.lock().submitted.clone()
    }

    fn check_filter(&self) -> crate::Result<()> {
        let mut state = self.state.lock();
        if state.failing_filters > 0 {
            state.failing_filters -= 1;
            return Err(Error::Generic("mock filter failure"));
        }
        Ok(())
    }

    fn check_watch(&self) -> crate::Result<()> {
        let mut state = self.state.lock();
        state.watch_calls += 1;
        if state.failing_watches > 0 {
            state.failing_watches -= 1;
            return Err(Error::Generic("mock watch failure"));
        }
        Ok(())
    }
}

fn in_range(meta: &LogMeta, from: u64, to: u64) -> bool {
    (from..=to).contains(&meta.block_number.as_u64())
}

#[async_trait::async_trait]
impl BridgeContract for MockBridge {
    fn address(&self) -> Address {
        self.address
    }

    async fn filter_message_sent(
        &self,
        from: u64,
        to: u64,
    ) -> crate::Result<Vec<Decoded<MessageSentFilter>>> {
        self.check_filter()?;
        let mut state = self.state.lock();
        state.filter_ranges.push((from, to));
        Ok(state
            .sent
            .iter()
            .filter(|(_, meta)| in_range(meta, from, to))
            .cloned()
            .collect())
    }

    async fn filter_message_status_changed(
        &self,
        from: u64,
        to: u64,
    ) -> crate::Result<Vec<Decoded<MessageStatusChangedFilter>>> {
        self.check_filter()?;
        Ok(self
            .state
            .lock()
            .status_changed
            .iter()
            .filter(|(_, meta)| in_range(meta, from, to))
            .cloned()
            .collect())
    }

    async fn watch_message_sent(
        &self,
    ) -> crate::Result<Subscription<Decoded<MessageSentFilter>>> {
        self.check_watch()?;
        let (tx, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        self.state.lock().sent_watchers.push(tx);
        Ok(sub)
    }

    async fn watch_message_status_changed(
        &self,
    ) -> crate::Result<Subscription<Decoded<MessageStatusChangedFilter>>> {
        self.check_watch()?;
        let (tx, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        self.state.lock().changed_watchers.push(tx);
        Ok(sub)
    }

    async fn get_message_status(
        &self,
        msg_hash: H256,
    ) -> crate::Result<EventStatus> {
        Ok(self
            .state
            .lock()
            .statuses
            .get(&msg_hash)
            .copied()
            .unwrap_or(EventStatus::New))
    }

    async fn is_message_received(
        &self,
        _msg_hash: H256,
        _src_chain_id: U256,
        _proof: Bytes,
    ) -> crate::Result<bool> {
        Ok(self.state.lock().received)
    }

    async fn estimate_process_message(
        &self,
        _message: &BridgeMessage,
        _proof: &Bytes,
    ) -> crate::Result<U256> {
        Ok(self.state.lock().gas_estimate)
    }

    async fn process_message(
        &self,
        opts: TransactOpts,
        message: BridgeMessage,
        _proof: Bytes,
    ) -> crate::Result<SubmittedTx> {
        let delay = self.state.lock().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let msg_hash = message.hash();
        let (status, revert, count) = {
            let mut state = self.state.lock();
            state.submitted.push((opts, message));
            let status = state.status_after_process;
            state.statuses.insert(msg_hash, status);
            (status, state.revert, state.submitted.len())
        };
        let hash = H256(ethers::utils::keccak256(format!(
            "process-{}-{count}",
            opts.nonce
        )));
        if let Some(chain) = &self.chain {
            let block = chain.latest();
            let block_hash = chain.hash_of(block);
            let log = Log {
                address: self.address,
                topics: vec![MessageStatusChangedFilter::signature(), msg_hash],
                data: ethers::abi::encode(&[Token::Uint(status.code().into())])
                    .into(),
                block_hash: Some(block_hash),
                block_number: Some(U64::from(block)),
                transaction_hash: Some(hash),
                log_index: Some(U256::zero()),
                ..Default::default()
            };
            chain.put_receipt(TransactionReceipt {
                transaction_hash: hash,
                block_number: Some(U64::from(block)),
                block_hash: Some(block_hash),
                status: Some(U64::from(u64::from(!revert))),
                logs: vec![log],
                ..Default::default()
            });
        }
        Ok(SubmittedTx {
            hash,
            nonce: opts.nonce,
        })
    }
}

/// A header syncer reporting whatever hash it was last given.
#[derive(Debug, Clone, Default)]
pub struct MockHeaderSyncer {
    latest: Arc<Mutex<H256>>,
}

impl MockHeaderSyncer {
    pub fn new(latest: H256) -> Self {
        Self {
            latest: Arc::new(Mutex::new(latest)),
        }
    }

    pub fn set_latest(&self, hash: H256) {
        *self.latest.lock() = hash;
    }
}

#[async_trait::async_trait]
impl HeaderSyncer for MockHeaderSyncer {
    async fn latest_synced_header(&self) -> crate::Result<H256> {
        Ok(*self.latest.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn headers_follow_the_block_time() {
        let chain = MockChain::new(1, 10);
        let h = chain.header_by_number(Some(3)).await.unwrap();
        assert_eq!(h.timestamp.as_u64(), MOCK_GENESIS_TIMESTAMP + 24);
        assert_eq!(h.hash, Some(chain.hash_of(3)));
        let by_hash = chain.block_by_hash(chain.hash_of(3)).await.unwrap();
        assert_eq!(by_hash.number, Some(U64::from(3)));
        assert!(chain.header_by_number(Some(11)).await.is_err());
    }

    #[tokio::test]
    async fn filters_are_inclusive() {
        let bridge = MockBridge::new(Address::repeat_byte(1));
        bridge.push_message_sent(BridgeMessage::default(), 10);
        bridge.push_message_sent(BridgeMessage::default(), 20);
        assert_eq!(bridge.filter_message_sent(10, 19).await.unwrap().len(), 1);
        assert_eq!(bridge.filter_message_sent(10, 20).await.unwrap().len(), 2);
        assert_eq!(bridge.filter_ranges(), vec![(10, 19), (10, 20)]);
    }

    #[tokio::test]
    async fn processing_leaves_a_receipt_with_the_status_log() {
        let chain = MockChain::new(2, 50);
        let bridge =
            MockBridge::new(Address::repeat_byte(2)).on_chain(chain.clone());
        let message = BridgeMessage::default();
        let opts = TransactOpts {
            nonce: 4.into(),
            gas_limit: 100_000.into(),
            gas_price: None,
        };
        let tx = bridge
            .process_message(opts, message.clone(), Bytes::new())
            .await
            .unwrap();
        let receipt = chain.transaction_receipt(tx.hash).await.unwrap().unwrap();
        assert_eq!(receipt.status, Some(U64::one()));
        assert_eq!(receipt.logs[0].topics[1], message.hash());
        assert_eq!(
            bridge.get_message_status(message.hash()).await.unwrap(),
            EventStatus::Done
        );
    }

    #[tokio::test]
    async fn closed_watches_report_it() {
        let bridge = MockBridge::new(Address::repeat_byte(3));
        let mut sub = bridge.watch_message_sent().await.unwrap();
        bridge.close_watches();
        assert!(matches!(
            sub.next().await,
            Some(Err(Error::SubscriptionClosed))
        ));
        assert_eq!(bridge.live_watches(), 0);
    }
}
