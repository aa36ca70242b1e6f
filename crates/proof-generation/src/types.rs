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

use bridge_relayer_chain::Header;
use bridge_relayer_utils::Error;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};

/// `LibBlockHeader.BlockHeader` as the destination verifier expects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub ommers_hash: H256,
    pub beneficiary: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    /// The 256 byte bloom split into 8 words.
    pub logs_bloom: [[u8; 32]; 8],
    pub difficulty: U256,
    pub height: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: H256,
    pub nonce: u64,
    /// Zero before London.
    pub base_fee_per_gas: U256,
    /// Zero before Shanghai.
    pub withdrawals_root: H256,
}

impl TryFrom<&Header> for BlockHeader {
    type Error = Error;

    fn try_from(block: &Header) -> Result<Self, Self::Error> {
        let height = block
            .number
            .ok_or(Error::Generic("pending block has no number"))?;
        let mut logs_bloom = [[0u8; 32]; 8];
        if let Some(bloom) = block.logs_bloom {
            for (word, chunk) in
                logs_bloom.iter_mut().zip(bloom.as_bytes().chunks(32))
            {
                word.copy_from_slice(chunk);
            }
        }
        Ok(Self {
            parent_hash: block.parent_hash,
            ommers_hash: block.uncles_hash,
            beneficiary: block.author.unwrap_or_default(),
            state_root: block.state_root,
            transactions_root: block.transactions_root,
            receipts_root: block.receipts_root,
            logs_bloom,
            difficulty: block.difficulty,
            height: U256::from(height.as_u64()),
            gas_limit: block.gas_limit.low_u64(),
            gas_used: block.gas_used.low_u64(),
            timestamp: block.timestamp.low_u64(),
            extra_data: block.extra_data.clone(),
            mix_hash: block.mix_hash.unwrap_or_default(),
            nonce: block
                .nonce
                .map(|n| u64::from_be_bytes(n.to_fixed_bytes()))
                .unwrap_or_default(),
            base_fee_per_gas: block.base_fee_per_gas.unwrap_or_default(),
            withdrawals_root: block.withdrawals_root.unwrap_or_default(),
        })
    }
}

/// The part of a signal proof contributed by one intermediate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopProof {
    pub chain_id: u64,
    /// Storage root of the signal service on that chain.
    pub signal_root: H256,
    pub storage_proof: Bytes,
}

/// The `proof` argument of `processMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalProof {
    pub height: u64,
    pub storage_proof: Bytes,
    pub hops: Vec<HopProof>,
}

impl SignalProof {
    /// `abi.encode((uint64, bytes, (uint64, bytes32, bytes)[]))`.
    pub fn encode(self) -> Bytes {
        let hops = self
            .hops
            .into_iter()
            .map(|hop| {
                Token::Tuple(vec![
                    Token::Uint(hop.chain_id.into()),
                    Token::FixedBytes(hop.signal_root.as_bytes().to_vec()),
                    Token::Bytes(hop.storage_proof.to_vec()),
                ])
            })
            .collect();
        ethers::abi::encode(&[Token::Tuple(vec![
            Token::Uint(self.height.into()),
            Token::Bytes(self.storage_proof.to_vec()),
            Token::Array(hops),
        ])])
        .into()
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Bloom, H64, U64};

    use super::*;

    fn h(s: &str) -> H256 {
        s.parse().unwrap()
    }

    fn legacy_block() -> Header {
        let root =
            h("0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
        let mut nonce = [0u8; 8];
        nonce[0] = 0x13;
        Header {
            parent_hash: h(
                "0x3a537c89809712367218bb171b3b1c46aa95df3dee7200ae9dc78f4052024068",
            ),
            uncles_hash: root,
            author: Some(Address::zero()),
            state_root: root,
            transactions_root: root,
            receipts_root: root,
            logs_bloom: Some(Bloom::zero()),
            difficulty: 2.into(),
            number: Some(U64::one()),
            gas_limit: 100_000.into(),
            gas_used: 2000.into(),
            timestamp: 1234.into(),
            extra_data: vec![0x7f].into(),
            mix_hash: Some(root),
            nonce: Some(H64(nonce)),
            ..Default::default()
        }
    }

    #[test]
    fn legacy_header_defaults_base_fee_to_zero() {
        let header = BlockHeader::try_from(&legacy_block()).unwrap();
        assert_eq!(header.nonce, 1369094286720630784);
        assert_eq!(header.height, U256::one());
        assert_eq!(header.timestamp, 1234);
        assert_eq!(header.base_fee_per_gas, U256::zero());
        assert_eq!(header.withdrawals_root, H256::zero());
        assert_eq!(header.logs_bloom, [[0u8; 32]; 8]);
    }

    #[test]
    fn shanghai_header_keeps_withdrawals_root() {
        let root = H256::repeat_byte(9);
        let block = Header {
            base_fee_per_gas: Some(10.into()),
            withdrawals_root: Some(root),
            ..legacy_block()
        };
        let header = BlockHeader::try_from(&block).unwrap();
        assert_eq!(header.base_fee_per_gas, U256::from(10));
        assert_eq!(header.withdrawals_root, root);
    }

    #[test]
    fn bloom_is_split_in_order() {
        let mut bloom = [0u8; 256];
        bloom[0] = 1;
        bloom[255] = 2;
        let block = Header {
            logs_bloom: Some(Bloom(bloom)),
            ..legacy_block()
        };
        let header = BlockHeader::try_from(&block).unwrap();
        assert_eq!(header.logs_bloom[0][0], 1);
        assert_eq!(header.logs_bloom[7][31], 2);
    }

    #[test]
    fn pending_blocks_are_rejected() {
        let block = Header {
            number: None,
            ..legacy_block()
        };
        assert!(BlockHeader::try_from(&block).is_err());
    }
}
