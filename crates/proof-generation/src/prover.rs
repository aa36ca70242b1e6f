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

use bridge_relayer_chain::{ProofClient, StorageProofResponse};
use bridge_relayer_utils::{probe, Error, Result};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::rlp;

use crate::types::{BlockHeader, HopProof, SignalProof};

/// Slot of the signal `msg_hash` sent by `sender`.
pub fn storage_key(sender: Address, msg_hash: H256) -> H256 {
    let mut preimage = Vec::with_capacity(20 + 32);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(msg_hash.as_bytes());
    H256(ethers::utils::keccak256(preimage))
}

/// An intermediate chain the proof goes through.
#[derive(Clone)]
pub struct Hop {
    pub chain_id: u64,
    pub signal_service: Address,
    pub client: Arc<dyn ProofClient>,
}

impl std::fmt::Debug for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hop")
            .field("chain_id", &self.chain_id)
            .field("signal_service", &self.signal_service)
            .finish()
    }
}

/// Builds signal proofs against one source chain.
#[derive(Clone)]
pub struct Prover {
    client: Arc<dyn ProofClient>,
}

impl Prover {
    pub fn new(client: Arc<dyn ProofClient>) -> Self {
        Self { client }
    }

    /// The header of block `hash` in its ABI form.
    pub async fn block_header(&self, hash: H256) -> Result<BlockHeader> {
        let block = self.client.block_by_hash(hash).await?;
        BlockHeader::try_from(&block)
    }

    /// Encoded proof that `key` is set in `signal_service` as of block
    /// `block_hash`, extended through `hops` in order.
    ///
    /// Each hop proves the storage root of the previous step on its own
    /// latest block.
    #[tracing::instrument(skip_all, fields(key = ?key, hops = hops.len()))]
    pub async fn encoded_signal_proof(
        &self,
        signal_service: Address,
        key: H256,
        block_hash: H256,
        hops: &[Hop],
    ) -> Result<Bytes> {
        let header = self.block_header(block_hash).await?;
        let height = header.height.as_u64();
        let (storage_proof, mut root) = prove_slot(
            self.client.as_ref(),
            signal_service,
            key,
            height,
        )
        .await?;

        let mut hop_proofs = Vec::with_capacity(hops.len());
        for hop in hops {
            let latest = hop.client.header_by_number(None).await?;
            let hop_height = BlockHeader::try_from(&latest)?.height.as_u64();
            let (proof, signal_root) = prove_slot(
                hop.client.as_ref(),
                hop.signal_service,
                root,
                hop_height,
            )
            .await?;
            hop_proofs.push(HopProof {
                chain_id: hop.chain_id,
                signal_root,
                storage_proof: proof,
            });
            root = signal_root;
        }

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Processor,
            proof_height = height,
            hops = hop_proofs.len(),
        );
        Ok(SignalProof {
            height,
            storage_proof,
            hops: hop_proofs,
        }
        .encode())
    }
}

/// Fetches and checks the proof of one slot, returning the encoded proof
/// and the storage root it hangs from.
async fn prove_slot(
    client: &dyn ProofClient,
    address: Address,
    key: H256,
    height: u64,
) -> Result<(Bytes, H256)> {
    let response = client.get_proof(address, vec![key], height).await?;
    check_signal(&response, key)?;
    Ok((encode_storage_proof(&response, key)?, response.storage_hash))
}

fn check_signal(response: &StorageProofResponse, key: H256) -> Result<()> {
    let slot = response
        .storage_proof
        .first()
        .ok_or(Error::EmptyStorageProof(key))?;
    if slot.value != U256::one() {
        return Err(Error::InvalidStorageValue { found: slot.value });
    }
    Ok(())
}

/// `abi.encode(rlp(accountProof), rlp(storageProof))`.
fn encode_storage_proof(
    response: &StorageProofResponse,
    key: H256,
) -> Result<Bytes> {
    let slot = response
        .storage_proof
        .first()
        .ok_or(Error::EmptyStorageProof(key))?;
    let account = rlp_list(&response.account_proof);
    let storage = rlp_list(&slot.proof);
    Ok(ethers::abi::encode(&[Token::Bytes(account), Token::Bytes(storage)])
        .into())
}

fn rlp_list(nodes: &[Bytes]) -> Vec<u8> {
    let nodes: Vec<Vec<u8>> = nodes.iter().map(|n| n.to_vec()).collect();
    rlp::encode_list::<Vec<u8>, _>(&nodes).to_vec()
}

#[cfg(test)]
mod tests {
    use bridge_relayer_chain::mock::MockChain;
    use bridge_relayer_chain::StorageSlotProof;
    use ethers::abi::ParamType;

    use super::*;

    const SIGNAL_SERVICE: Address = Address::repeat_byte(0x55);

    fn response(value: u64, root: H256) -> StorageProofResponse {
        StorageProofResponse {
            account_proof: vec![vec![0xa1, 0xa2].into(), vec![0xa3].into()],
            storage_hash: root,
            storage_proof: vec![StorageSlotProof {
                key: H256::zero(),
                value: value.into(),
                proof: vec![vec![0xb1].into()],
            }],
        }
    }

    fn signal_proof_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Uint(64),
            ParamType::Bytes,
            ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Uint(64),
                ParamType::FixedBytes(32),
                ParamType::Bytes,
            ]))),
        ])
    }

    #[test]
    fn storage_key_hashes_sender_then_message() {
        let sender = Address::repeat_byte(1);
        let msg = H256::repeat_byte(2);
        let mut preimage = [1u8; 52];
        preimage[20..].copy_from_slice(&[2u8; 32]);
        assert_eq!(
            storage_key(sender, msg),
            H256(ethers::utils::keccak256(preimage))
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn proof_is_encoded_at_the_block_height() {
        let chain = MockChain::new(1, 100);
        chain.set_proof(SIGNAL_SERVICE, response(1, H256::repeat_byte(7)));
        let prover = Prover::new(Arc::new(chain.clone()));
        let key = storage_key(Address::repeat_byte(1), H256::repeat_byte(2));

        let encoded = prover
            .encoded_signal_proof(SIGNAL_SERVICE, key, chain.hash_of(42), &[])
            .await
            .unwrap();

        assert_eq!(chain.proof_requests(), vec![(SIGNAL_SERVICE, vec![key], 42)]);
        let decoded = ethers::abi::decode(&[signal_proof_type()], &encoded)
            .unwrap()
            .remove(0)
            .into_tuple()
            .unwrap();
        assert_eq!(decoded[0].clone().into_uint().unwrap(), U256::from(42));
        let inner = decoded[1].clone().into_bytes().unwrap();
        let parts = ethers::abi::decode(&[ParamType::Bytes, ParamType::Bytes], &inner)
            .unwrap();
        let account: Vec<Vec<u8>> =
            rlp::decode_list(&parts[0].clone().into_bytes().unwrap());
        assert_eq!(account, vec![vec![0xa1, 0xa2], vec![0xa3]]);
        assert!(decoded[2].clone().into_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn value_other_than_one_fails() {
        let chain = MockChain::new(1, 100);
        chain.set_proof(SIGNAL_SERVICE, response(0, H256::zero()));
        let prover = Prover::new(Arc::new(chain.clone()));
        let res = prover
            .encoded_signal_proof(
                SIGNAL_SERVICE,
                H256::repeat_byte(3),
                chain.hash_of(10),
                &[],
            )
            .await;
        assert!(matches!(
            res,
            Err(Error::InvalidStorageValue { found }) if found.is_zero()
        ));
    }

    #[tokio::test]
    async fn empty_storage_proof_fails() {
        let chain = MockChain::new(1, 100);
        chain.set_proof(SIGNAL_SERVICE, StorageProofResponse::default());
        let prover = Prover::new(Arc::new(chain.clone()));
        let res = prover
            .encoded_signal_proof(
                SIGNAL_SERVICE,
                H256::repeat_byte(3),
                chain.hash_of(10),
                &[],
            )
            .await;
        assert!(matches!(res, Err(Error::EmptyStorageProof(_))));
    }

    #[tokio::test]
    async fn hops_thread_the_previous_root() {
        let src = MockChain::new(1, 100);
        let src_root = H256::repeat_byte(0x11);
        src.set_proof(SIGNAL_SERVICE, response(1, src_root));
        let hop_chain = MockChain::new(5, 300);
        let hop_service = Address::repeat_byte(0x66);
        let hop_root = H256::repeat_byte(0x22);
        hop_chain.set_proof(hop_service, response(1, hop_root));

        let hops = [Hop {
            chain_id: 5,
            signal_service: hop_service,
            client: Arc::new(hop_chain.clone()),
        }];
        let prover = Prover::new(Arc::new(src.clone()));
        let encoded = prover
            .encoded_signal_proof(
                SIGNAL_SERVICE,
                H256::repeat_byte(3),
                src.hash_of(10),
                &hops,
            )
            .await
            .unwrap();

        assert_eq!(
            hop_chain.proof_requests(),
            vec![(hop_service, vec![src_root], 300)]
        );
        let decoded = ethers::abi::decode(&[signal_proof_type()], &encoded)
            .unwrap()
            .remove(0)
            .into_tuple()
            .unwrap();
        let hops = decoded[2].clone().into_array().unwrap();
        let hop = hops[0].clone().into_tuple().unwrap();
        assert_eq!(hop[0].clone().into_uint().unwrap(), U256::from(5));
        assert_eq!(hop[1].clone().into_fixed_bytes().unwrap(), hop_root.0.to_vec());
    }

    #[tokio::test]
    async fn a_failing_hop_aborts_the_proof() {
        let src = MockChain::new(1, 100);
        src.set_proof(SIGNAL_SERVICE, response(1, H256::repeat_byte(1)));
        let hop_chain = MockChain::new(5, 300);
        hop_chain.set_proof(Address::repeat_byte(0x66), response(2, H256::zero()));
        let hops = [Hop {
            chain_id: 5,
            signal_service: Address::repeat_byte(0x66),
            client: Arc::new(hop_chain),
        }];
        let prover = Prover::new(Arc::new(src.clone()));
        let res = prover
            .encoded_signal_proof(
                SIGNAL_SERVICE,
                H256::repeat_byte(3),
                src.hash_of(10),
                &hops,
            )
            .await;
        assert!(matches!(res, Err(Error::InvalidStorageValue { .. })));
    }
}
