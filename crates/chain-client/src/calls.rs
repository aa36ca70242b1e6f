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

use bridge_relayer_types::{BridgeMessage, EventStatus};
use ethers::abi::{ParamType, Token, Tokenizable};
use ethers::types::{Bytes, H256, U256};

use crate::Error;

const MESSAGE_TUPLE: &str = "(uint256,address,uint256,uint256,address,address,address,uint256,uint256,uint256,uint256,bytes,string)";

pub const GET_MESSAGE_STATUS: &str = "getMessageStatus(bytes32)";
pub const IS_MESSAGE_RECEIVED: &str = "isMessageReceived(bytes32,uint256,bytes)";
pub const GET_CROSS_CHAIN_BLOCK_HASH: &str = "getCrossChainBlockHash(uint256)";

/// `processMessage(Message,bytes)`.
pub fn process_message_signature() -> String {
    format!("processMessage({MESSAGE_TUPLE},bytes)")
}

/// Selector followed by the ABI encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = ethers::utils::id(signature).to_vec();
    data.extend(ethers::abi::encode(args));
    data.into()
}

/// The 4 byte selector of `signature`.
pub fn selector(signature: &str) -> [u8; 4] {
    ethers::utils::id(signature)
}

pub fn get_message_status(msg_hash: H256) -> Bytes {
    encode_call(GET_MESSAGE_STATUS, &[Token::FixedBytes(msg_hash.0.to_vec())])
}

pub fn is_message_received(
    msg_hash: H256,
    src_chain_id: U256,
    proof: Bytes,
) -> Bytes {
    encode_call(
        IS_MESSAGE_RECEIVED,
        &[
            Token::FixedBytes(msg_hash.0.to_vec()),
            Token::Uint(src_chain_id),
            Token::Bytes(proof.to_vec()),
        ],
    )
}

pub fn process_message(message: BridgeMessage, proof: Bytes) -> Bytes {
    encode_call(
        &process_message_signature(),
        &[message.into_token(), Token::Bytes(proof.to_vec())],
    )
}

pub fn get_cross_chain_block_hash(number: U256) -> Bytes {
    encode_call(GET_CROSS_CHAIN_BLOCK_HASH, &[Token::Uint(number)])
}

fn decode_single(kind: ParamType, output: &[u8]) -> crate::Result<Token> {
    ethers::abi::decode(&[kind], output)?
        .into_iter()
        .next()
        .ok_or(Error::Generic("empty call output"))
}

pub fn decode_message_status(output: &[u8]) -> crate::Result<EventStatus> {
    let status = decode_single(ParamType::Uint(8), output)?
        .into_uint()
        .ok_or(Error::Generic("message status is not a uint"))?;
    EventStatus::from_contract(status.low_u32() as u8)
        .ok_or(Error::Generic("unknown message status"))
}

pub fn decode_bool(output: &[u8]) -> crate::Result<bool> {
    decode_single(ParamType::Bool, output)?
        .into_bool()
        .ok_or(Error::Generic("call output is not a bool"))
}

pub fn decode_bytes32(output: &[u8]) -> crate::Result<H256> {
    let word = decode_single(ParamType::FixedBytes(32), output)?
        .into_fixed_bytes()
        .ok_or(Error::Generic("call output is not bytes32"))?;
    Ok(H256::from_slice(&word))
}

/// Word `index` of a call output, as a number.
pub fn decode_word(output: &[u8], index: usize) -> crate::Result<U256> {
    let start = index * 32;
    output
        .get(start..start + 32)
        .map(U256::from_big_endian)
        .ok_or(Error::Generic("call output too short"))
}

#[cfg(test)]
mod tests {
    use ethers::abi::{AbiEncode, AbiType};

    use super::*;

    #[test]
    fn status_and_bool_outputs_decode() {
        let out = U256::from(2u64).encode();
        assert_eq!(decode_message_status(&out).unwrap(), EventStatus::Done);
        let out = U256::from(9u64).encode();
        assert!(decode_message_status(&out).is_err());
        let out = ethers::abi::encode(&[Token::Bool(true)]);
        assert!(decode_bool(&out).unwrap());
    }

    #[test]
    fn words_are_indexed_from_zero() {
        let out = ethers::abi::encode(&[
            Token::Uint(7u64.into()),
            Token::Uint(1234u64.into()),
        ]);
        assert_eq!(decode_word(&out, 1).unwrap(), U256::from(1234u64));
        assert!(decode_word(&out, 2).is_err());
    }

    #[test]
    fn process_message_uses_the_message_tuple() {
        let data = process_message(BridgeMessage::default(), Bytes::new());
        assert_eq!(data[..4], selector(&process_message_signature()));
        let decoded = ethers::abi::decode(
            &[BridgeMessage::param_type(), ParamType::Bytes],
            &data[4..],
        )
        .unwrap();
        assert_eq!(
            BridgeMessage::from_token(decoded[0].clone()).unwrap(),
            BridgeMessage::default()
        );
    }
}
