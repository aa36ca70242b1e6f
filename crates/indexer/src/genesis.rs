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

//! The bridge contracts changed over time and so did the way their
//! genesis height is exposed. Each [`GenesisProbe`] knows one of those
//! ways, they are tried in order and the first answer wins.

use std::sync::Arc;

use bridge_relayer_chain::{calls, EthClient};
use bridge_relayer_config::indexer::GenesisProbeConfig;
use bridge_relayer_utils::{Error, Result};
use ethers::types::{Address, U256};

use crate::timestamp::block_by_timestamp;

/// One strategy to find the height the bridge history starts at.
#[async_trait::async_trait]
pub trait GenesisProbe: Send + Sync {
    fn name(&self) -> String;

    async fn probe(&self) -> Result<u64>;
}

/// Reads the height from a word of a view function output, like the
/// `genesisHeight` of `getStateVariables()`.
#[derive(Clone)]
pub struct StateVariablesProbe {
    pub client: Arc<dyn EthClient>,
    pub contract: Address,
    pub signature: String,
    pub word_index: usize,
}

#[async_trait::async_trait]
impl GenesisProbe for StateVariablesProbe {
    fn name(&self) -> String {
        format!("{} on {:?}", self.signature, self.contract)
    }

    async fn probe(&self) -> Result<u64> {
        let data = calls::encode_call(&self.signature, &[]);
        let output = self.client.call(self.contract, data).await?;
        let word = calls::decode_word(&output, self.word_index)?;
        if word > U256::from(u64::MAX) {
            return Err(Error::Generic("genesis height does not fit in u64"));
        }
        Ok(word.as_u64())
    }
}

/// The last block at or before the activation time of the contracts.
#[derive(Clone)]
pub struct ActivationTimestampProbe {
    pub client: Arc<dyn EthClient>,
    pub timestamp: u64,
}

#[async_trait::async_trait]
impl GenesisProbe for ActivationTimestampProbe {
    fn name(&self) -> String {
        format!("activation at {}", self.timestamp)
    }

    async fn probe(&self) -> Result<u64> {
        block_by_timestamp(self.client.as_ref(), self.timestamp).await
    }
}

/// A height known up front.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

#[async_trait::async_trait]
impl GenesisProbe for FixedProbe {
    fn name(&self) -> String {
        format!("fixed height {}", self.0)
    }

    async fn probe(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// Builds the configured probes against `client`, keeping their order.
pub fn probes_from_config(
    client: Arc<dyn EthClient>,
    configs: &[GenesisProbeConfig],
) -> Vec<Box<dyn GenesisProbe>> {
    configs
        .iter()
        .map(|config| -> Box<dyn GenesisProbe> {
            match config {
                GenesisProbeConfig::StateVariables {
                    contract,
                    signature,
                    word_index,
                } => Box::new(StateVariablesProbe {
                    client: client.clone(),
                    contract: *contract,
                    signature: signature.clone(),
                    word_index: *word_index,
                }),
                GenesisProbeConfig::ActivationTimestamp { timestamp } => {
                    Box::new(ActivationTimestampProbe {
                        client: client.clone(),
                        timestamp: *timestamp,
                    })
                }
                GenesisProbeConfig::Fixed { height } => {
                    Box::new(FixedProbe(*height))
                }
            }
        })
        .collect()
}

/// Height given by the first probe that succeeds.
///
/// No probes at all means the history starts at block 0.
pub async fn resolve_genesis(probes: &[Box<dyn GenesisProbe>]) -> Result<u64> {
    if probes.is_empty() {
        return Ok(0);
    }
    for probe in probes {
        match probe.probe().await {
            Ok(height) => {
                tracing::debug!(probe = %probe.name(), height, "genesis found");
                return Ok(height);
            }
            Err(e) => {
                tracing::debug!(probe = %probe.name(), %e, "genesis probe failed");
            }
        }
    }
    Err(Error::GenesisNotFound)
}

#[cfg(test)]
mod tests {
    use bridge_relayer_chain::mock::{MockChain, MOCK_GENESIS_TIMESTAMP};
    use ethers::abi::Token;

    use super::*;

    struct Failing;

    #[async_trait::async_trait]
    impl GenesisProbe for Failing {
        fn name(&self) -> String {
            "failing".into()
        }

        async fn probe(&self) -> Result<u64> {
            Err(Error::Generic("no such function"))
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let probes: Vec<Box<dyn GenesisProbe>> =
            vec![Box::new(Failing), Box::new(FixedProbe(7)), Box::new(FixedProbe(9))];
        assert_eq!(resolve_genesis(&probes).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let probes: Vec<Box<dyn GenesisProbe>> =
            vec![Box::new(Failing), Box::new(Failing)];
        assert!(matches!(
            resolve_genesis(&probes).await,
            Err(Error::GenesisNotFound)
        ));
        assert_eq!(resolve_genesis(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn configured_probes_keep_their_order() {
        let chain = MockChain::new(1, 1_000);
        let contract = Address::repeat_byte(0x42);
        let signature = "getStateVariables()";
        chain.set_call_response(
            contract,
            calls::selector(signature),
            ethers::abi::encode(&[Token::Uint(1.into()), Token::Uint(321.into())]),
        );
        let configs = [
            GenesisProbeConfig::StateVariables {
                contract: Address::repeat_byte(0x43),
                signature: "getConfig()".into(),
                word_index: 0,
            },
            GenesisProbeConfig::StateVariables {
                contract,
                signature: signature.into(),
                word_index: 1,
            },
            GenesisProbeConfig::Fixed { height: 5 },
        ];
        let probes = probes_from_config(Arc::new(chain.clone()), &configs);
        assert_eq!(resolve_genesis(&probes).await.unwrap(), 321);
        assert!(logs_contain("genesis probe failed"));

        let configs = [GenesisProbeConfig::ActivationTimestamp {
            timestamp: MOCK_GENESIS_TIMESTAMP + 12 * 99,
        }];
        let probes = probes_from_config(Arc::new(chain), &configs);
        assert_eq!(resolve_genesis(&probes).await.unwrap(), 100);
    }
}
