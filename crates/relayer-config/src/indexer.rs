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

use std::time::Duration;

use bridge_relayer_types::{SyncMode, WatchMode};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexerConfig {
    /// Whether the indexer runs at all.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Number of blocks fetched per filter request.
    #[serde(default = "defaults::block_batch_size")]
    pub block_batch_size: u64,
    /// Number of events handled concurrently within one batch.
    #[serde(default = "defaults::num_workers")]
    pub num_workers: usize,
    /// Seconds to wait before a dropped subscription is re-established.
    #[serde(default = "defaults::subscription_backoff")]
    pub subscription_backoff: u64,
    /// Resubscriptions in a row before the indexer fails.
    #[serde(default = "defaults::max_resubscribe_attempts")]
    pub max_resubscribe_attempts: usize,
    /// Seconds between retries of chain head and header lookups.
    #[serde(default = "defaults::rpc_retry_interval")]
    pub rpc_retry_interval: u64,
    /// Retries of chain head and header lookups.
    #[serde(default = "defaults::rpc_max_retries")]
    pub rpc_max_retries: usize,
    /// `MessageSent` events paying less than this are not indexed, 0
    /// indexes everything.
    #[serde(default)]
    pub min_fee_to_index: u64,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub watch_mode: WatchMode,
    /// Tried in order to find where the bridge history starts.
    #[serde(default)]
    pub genesis_probes: Vec<GenesisProbeConfig>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            block_batch_size: defaults::block_batch_size(),
            num_workers: defaults::num_workers(),
            subscription_backoff: defaults::subscription_backoff(),
            max_resubscribe_attempts: defaults::max_resubscribe_attempts(),
            rpc_retry_interval: defaults::rpc_retry_interval(),
            rpc_max_retries: defaults::rpc_max_retries(),
            min_fee_to_index: 0,
            sync_mode: SyncMode::default(),
            watch_mode: WatchMode::default(),
            genesis_probes: Vec::new(),
        }
    }
}

impl IndexerConfig {
    pub fn subscription_backoff(&self) -> Duration {
        Duration::from_secs(self.subscription_backoff)
    }

    pub fn rpc_retry_interval(&self) -> Duration {
        Duration::from_secs(self.rpc_retry_interval)
    }
}

/// One way of finding the genesis height of the bridge contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GenesisProbeConfig {
    /// Calls a view function and reads one 32 byte word of its output.
    #[serde(rename_all = "kebab-case")]
    StateVariables {
        /// The contract to call.
        contract: Address,
        /// Solidity signature, like `getStateVariables()`.
        signature: String,
        /// Index of the returned word holding the genesis height.
        #[serde(default)]
        word_index: usize,
    },
    /// Finds the last block at or before a unix timestamp.
    #[serde(rename_all = "kebab-case")]
    ActivationTimestamp { timestamp: u64 },
    /// A known height.
    Fixed { height: u64 },
}
