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

use ethers::contract::{EthAbiCodec, EthAbiType, EthEvent, LogMeta};
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::{Deserialize, Serialize};

/// `IBridge.Message`, the payload carried across chains.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EthAbiType,
    EthAbiCodec,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub id: U256,
    pub sender: Address,
    pub src_chain_id: U256,
    pub dest_chain_id: U256,
    pub owner: Address,
    pub to: Address,
    pub refund_address: Address,
    pub deposit_value: U256,
    pub call_value: U256,
    pub processing_fee: U256,
    pub gas_limit: U256,
    pub data: Bytes,
    pub memo: String,
}

impl BridgeMessage {
    /// `keccak256(abi.encode(message))`, the key of the message on both
    /// chains.
    pub fn hash(&self) -> H256 {
        use ethers::abi::AbiEncode;
        H256(ethers::utils::keccak256(self.clone().encode()))
    }
}

/// `MessageSent(bytes32 indexed msgHash, Message message)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, EthEvent)]
#[ethevent(
    name = "MessageSent",
    abi = "MessageSent(bytes32,(uint256,address,uint256,uint256,address,address,address,uint256,uint256,uint256,uint256,bytes,string))"
)]
pub struct MessageSentFilter {
    #[ethevent(indexed)]
    pub msg_hash: [u8; 32],
    pub message: BridgeMessage,
}

/// `MessageStatusChanged(bytes32 indexed msgHash, uint8 status)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, EthEvent)]
#[ethevent(
    name = "MessageStatusChanged",
    abi = "MessageStatusChanged(bytes32,uint8)"
)]
pub struct MessageStatusChangedFilter {
    #[ethevent(indexed)]
    pub msg_hash: [u8; 32],
    pub status: u8,
}

/// Where a log came from, the part of [`LogMeta`] worth persisting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub block_number: u64,
    pub block_hash: H256,
    pub transaction_hash: H256,
    pub log_index: U256,
}

impl From<&LogMeta> for RawLog {
    fn from(meta: &LogMeta) -> Self {
        Self {
            address: meta.address,
            block_number: meta.block_number.as_u64(),
            block_hash: meta.block_hash,
            transaction_hash: meta.transaction_hash,
            log_index: meta.log_index,
        }
    }
}

impl RawLog {
    /// Rebuilds a [`LogMeta`], the transaction index is not kept.
    pub fn to_log_meta(&self) -> LogMeta {
        LogMeta {
            address: self.address,
            block_number: U64::from(self.block_number),
            block_hash: self.block_hash,
            transaction_hash: self.transaction_hash,
            transaction_index: U64::zero(),
            log_index: self.log_index,
        }
    }
}

/// A decoded `MessageSent` event together with its log position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageSentEvent {
    pub msg_hash: H256,
    pub message: BridgeMessage,
    pub raw: RawLog,
}

impl MessageSentEvent {
    pub fn new(event: MessageSentFilter, meta: &LogMeta) -> Self {
        Self {
            msg_hash: H256(event.msg_hash),
            message: event.message,
            raw: RawLog::from(meta),
        }
    }
}

/// A decoded `MessageStatusChanged` event together with its log position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageStatusChangedEvent {
    pub msg_hash: H256,
    pub status: u8,
    pub raw: RawLog,
}

impl MessageStatusChangedEvent {
    pub fn new(event: MessageStatusChangedFilter, meta: &LogMeta) -> Self {
        Self {
            msg_hash: H256(event.msg_hash),
            status: event.status,
            raw: RawLog::from(meta),
        }
    }
}

/// Body of a queue message, published once per actionable `MessageSent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessageBody {
    /// Id of the persisted [`crate::Event`].
    pub id: u64,
    pub event: MessageSentEvent,
}
