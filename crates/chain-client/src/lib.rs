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


//! # Chain capabilities 🔗
//!
//! The indexer, the processor and the proof engine talk to chains only
//! through the narrow traits of this crate:
//!
//! * [`EthClient`]: blocks, receipts, nonces and raw calls.
//! * [`Caller`]: `eth_getProof`.
//! * [`BridgeContract`]: the bridge events and functions.
//! * [`HeaderSyncer`]: the destination record of synced source headers.
//!
//! [`evm`] and [`bridge`] implement them with `ethers`, the `mock` feature
//! provides in-memory doubles.

use bridge_relayer_types::{
    BridgeMessage, EventStatus, MessageSentFilter, MessageStatusChangedFilter,
};
pub use bridge_relayer_utils::{Error, Result};
use ethers::contract::LogMeta;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

/// Bridge and header syncer contract implementations.
pub mod bridge;
/// ABI encoding of the contract calls the relayer makes.
pub mod calls;
/// The ethers backed [`EthClient`] and [`Caller`].
pub mod evm;
/// Raw log decoding.
pub mod logs;
/// In-memory chain doubles.
#[cfg(any(test, feature = "mock"))]
pub mod mock;
/// Retry policy of the HTTP transport.
pub mod retry_policy;
/// Live subscription handle.
pub mod subscription;
/// Receipt and confirmation waits.
pub mod wait;

pub use subscription::Subscription;

/// Block header as returned by `eth_getBlockBy*`.
pub type Header = ethers::types::Block<H256>;

/// A decoded event and where it was found.
pub type Decoded<T> = (T, LogMeta);

/// Basic chain access.
#[async_trait::async_trait]
pub trait EthClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    /// The header at `number`, or the latest one when `None`.
    async fn header_by_number(&self, number: Option<u64>) -> Result<Header>;
    async fn block_by_hash(&self, hash: H256) -> Result<Header>;
    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>>;
    /// Next nonce of `account`, counting pending transactions.
    async fn pending_nonce_at(&self, account: Address) -> Result<U256>;
    async fn gas_price(&self) -> Result<U256>;
    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
    async fn subscribe_new_heads(&self) -> Result<Subscription<Header>>;
}

/// Merkle proof of an account and some of its storage slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageProofResponse {
    pub account_proof: Vec<Bytes>,
    /// Storage root of the account.
    pub storage_hash: H256,
    /// One entry per requested key, in request order.
    pub storage_proof: Vec<StorageSlotProof>,
}

/// Proof of one storage slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSlotProof {
    pub key: H256,
    pub value: U256,
    pub proof: Vec<Bytes>,
}

/// Access to `eth_getProof`.
#[async_trait::async_trait]
pub trait Caller: Send + Sync {
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<H256>,
        block: u64,
    ) -> Result<StorageProofResponse>;
}

/// What the proof engine needs from a chain.
pub trait ProofClient: EthClient + Caller {}

impl<T: EthClient + Caller + ?Sized> ProofClient for T {}

/// Parameters of a `processMessage` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactOpts {
    pub nonce: U256,
    pub gas_limit: U256,
    /// Left to the node when unset.
    pub gas_price: Option<U256>,
}

/// A broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTx {
    pub hash: H256,
    pub nonce: U256,
}

/// The bridge contract.
#[async_trait::async_trait]
pub trait BridgeContract: Send + Sync {
    fn address(&self) -> Address;
    /// `MessageSent` events emitted in blocks `from..=to`.
    async fn filter_message_sent(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Decoded<MessageSentFilter>>>;
    /// `MessageStatusChanged` events emitted in blocks `from..=to`.
    async fn filter_message_status_changed(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Decoded<MessageStatusChangedFilter>>>;
    async fn watch_message_sent(
        &self,
    ) -> Result<Subscription<Decoded<MessageSentFilter>>>;
    async fn watch_message_status_changed(
        &self,
    ) -> Result<Subscription<Decoded<MessageStatusChangedFilter>>>;
    async fn get_message_status(&self, msg_hash: H256) -> Result<EventStatus>;
    async fn is_message_received(
        &self,
        msg_hash: H256,
        src_chain_id: U256,
        proof: Bytes,
    ) -> Result<bool>;
    /// Gas a `processMessage` call would use, nothing is broadcast.
    async fn estimate_process_message(
        &self,
        message: &BridgeMessage,
        proof: &Bytes,
    ) -> Result<U256>;
    async fn process_message(
        &self,
        opts: TransactOpts,
        message: BridgeMessage,
        proof: Bytes,
    ) -> Result<SubmittedTx>;
}

/// The destination contract tracking which source headers it trusts.
#[async_trait::async_trait]
pub trait HeaderSyncer: Send + Sync {
    /// Hash of the most recent source header synced to the destination.
    async fn latest_synced_header(&self) -> Result<H256>;
}
