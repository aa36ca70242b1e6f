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

use derive_more::Display;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// The bridge events the relayer indexes.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum EventName {
    #[display(fmt = "MessageSent")]
    MessageSent,
    #[display(fmt = "MessageStatusChanged")]
    MessageStatusChanged,
}

/// Processing status of a bridge message.
///
/// Every variant except [`EventStatus::NewOnlyOwner`] mirrors the status the
/// destination bridge stores on chain.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum EventStatus {
    /// Anyone may process the message.
    #[display(fmt = "New")]
    New,
    /// Processing was attempted and can be retried.
    #[display(fmt = "Retriable")]
    Retriable,
    #[display(fmt = "Done")]
    Done,
    #[display(fmt = "Failed")]
    Failed,
    #[display(fmt = "Recalled")]
    Recalled,
    /// Only the message owner can process it, the relayer must leave it.
    #[display(fmt = "NewOnlyOwner")]
    NewOnlyOwner,
}

impl EventStatus {
    /// Maps the `uint8` status returned by the bridge contract.
    pub fn from_contract(status: u8) -> Option<Self> {
        match status {
            0 => Some(Self::New),
            1 => Some(Self::Retriable),
            2 => Some(Self::Done),
            3 => Some(Self::Failed),
            4 => Some(Self::Recalled),
            _ => None,
        }
    }

    /// The numeric code used in storage, `NewOnlyOwner` has no on-chain
    /// counterpart and is stored as 5.
    pub fn code(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Retriable => 1,
            Self::Done => 2,
            Self::Failed => 3,
            Self::Recalled => 4,
            Self::NewOnlyOwner => 5,
        }
    }

    /// Status of a freshly observed message given what the destination
    /// reports. A message nobody paid gas for is left to its owner.
    pub fn for_message(destination: Self, gas_limit: Option<U256>) -> Self {
        let unpaid = gas_limit.map_or(true, |g| g.is_zero());
        match destination {
            Self::New if unpaid => Self::NewOnlyOwner,
            other => other,
        }
    }
}

/// A persisted chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub name: EventName,
    pub chain_id: u64,
    pub dest_chain_id: u64,
    /// JSON of the raw chain event.
    pub data: String,
    pub msg_hash: H256,
    pub message_owner: Address,
    pub status: EventStatus,
    /// Block the event was emitted in.
    pub block_id: u64,
}

/// Everything needed to persist an [`Event`], the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEventOpts {
    pub name: EventName,
    pub chain_id: u64,
    pub dest_chain_id: u64,
    pub data: String,
    pub msg_hash: H256,
    pub message_owner: Address,
    pub status: EventStatus,
    pub block_id: u64,
}

impl SaveEventOpts {
    pub fn into_event(self, id: u64) -> Event {
        Event {
            id,
            name: self.name,
            chain_id: self.chain_id,
            dest_chain_id: self.dest_chain_id,
            data: self.data,
            msg_hash: self.msg_hash,
            message_owner: self.message_owner,
            status: self.status,
            block_id: self.block_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_missing_gas_limit_is_owner_only() {
        assert_eq!(
            EventStatus::for_message(EventStatus::New, Some(U256::zero())),
            EventStatus::NewOnlyOwner
        );
        assert_eq!(
            EventStatus::for_message(EventStatus::New, None),
            EventStatus::NewOnlyOwner
        );
        assert_eq!(
            EventStatus::for_message(EventStatus::New, Some(U256::one())),
            EventStatus::New
        );
    }

    #[test]
    fn gas_limit_does_not_touch_other_statuses() {
        for status in [
            EventStatus::Retriable,
            EventStatus::Done,
            EventStatus::Failed,
            EventStatus::Recalled,
        ] {
            assert_eq!(
                EventStatus::for_message(status, Some(U256::zero())),
                status
            );
        }
    }

    #[test]
    fn contract_codes_round_trip() {
        for code in 0..5u8 {
            let status = EventStatus::from_contract(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(EventStatus::from_contract(9), None);
        assert_eq!(EventStatus::NewOnlyOwner.code(), 5);
    }
}
