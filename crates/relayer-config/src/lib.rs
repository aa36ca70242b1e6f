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


//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! The configuration describes the two chains being bridged and tunes the
//! indexer and the processor:
//! * `src`: the chain the messages are sent from.
//! * `dest`: the chain the messages are processed on.
//! * `indexer`: batch size, workers, sync and watch modes, genesis probes.
//! * `processor`: signing key, confirmations, timeouts, hops.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the optional settings
pub mod defaults;
/// Indexer configuration
pub mod indexer;
/// Processor configuration
pub mod processor;
/// Utils for processing configuration
pub mod utils;

use bridge_relayer_types::rpc_url::RpcUrl;
use bridge_relayer_utils::Error;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

pub use indexer::{GenesisProbeConfig, IndexerConfig};
pub use processor::{HopConfig, ProcessorConfig};

/// RelayerConfig is the configuration of the bridge relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// The chain messages are sent from.
    pub src: ChainConfig,
    /// The chain messages are delivered to.
    pub dest: ChainConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

/// One side of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// Human readable name, used in logs.
    pub name: String,
    pub chain_id: u64,
    /// Http(s) endpoint for calls and transactions.
    pub http_endpoint: RpcUrl,
    /// Websocket endpoint for live subscriptions.
    #[serde(default)]
    pub ws_endpoint: Option<RpcUrl>,
    pub bridge_address: Address,
    /// Contract whose storage holds the sent signals, the bridge itself
    /// when unset.
    #[serde(default)]
    pub signal_service_address: Option<Address>,
    /// Contract recording the other chain's synced headers.
    #[serde(default)]
    pub header_syncer_address: Option<Address>,
}

impl ChainConfig {
    pub fn signal_service_address(&self) -> Address {
        self.signal_service_address.unwrap_or(self.bridge_address)
    }
}

impl RelayerConfig {
    /// Makes sure the config is usable before anything is started.
    pub fn verify(&self) -> bridge_relayer_utils::Result<()> {
        if self.src.chain_id == self.dest.chain_id {
            return Err(Error::InvalidConfig(format!(
                "src and dest share chain id {}",
                self.src.chain_id
            )));
        }
        for chain in [&self.src, &self.dest] {
            if chain.bridge_address.is_zero() {
                return Err(Error::InvalidConfig(format!(
                    "bridge-address of {} is not set",
                    chain.name
                )));
            }
        }
        if self.indexer.enabled {
            if self.indexer.block_batch_size == 0 {
                return Err(Error::InvalidConfig(
                    "indexer.block-batch-size must be greater than zero"
                        .into(),
                ));
            }
            if self.indexer.num_workers == 0 {
                return Err(Error::InvalidConfig(
                    "indexer.num-workers must be greater than zero".into(),
                ));
            }
            if self.indexer.watch_mode.subscribes()
                && self.src.ws_endpoint.is_none()
            {
                return Err(Error::InvalidConfig(format!(
                    "watch-mode {} needs src.ws-endpoint",
                    self.indexer.watch_mode
                )));
            }
        }
        if self.processor.enabled {
            if self.processor.private_key.is_none() {
                return Err(Error::MissingSecrets);
            }
            if self.processor.confirmations == 0 {
                return Err(Error::InvalidConfig(
                    "processor.confirmations must be greater than zero"
                        .into(),
                ));
            }
            if self.processor.num_workers == 0 {
                return Err(Error::InvalidConfig(
                    "processor.num-workers must be greater than zero".into(),
                ));
            }
            if self.dest.header_syncer_address.is_none() {
                return Err(Error::InvalidConfig(
                    "processor needs dest.header-syncer-address".into(),
                ));
            }
        }
        Ok(())
    }
}
