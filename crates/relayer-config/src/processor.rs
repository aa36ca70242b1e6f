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

use bridge_relayer_types::private_key::PrivateKey;
use bridge_relayer_types::rpc_url::RpcUrl;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessorConfig {
    /// Whether the processor runs at all.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Signs the `processMessage` transactions on the destination chain.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Source blocks required on top of the event block.
    #[serde(default = "defaults::confirmations")]
    pub confirmations: u64,
    /// Seconds to wait for those confirmations.
    #[serde(default = "defaults::confirmation_timeout")]
    pub confirmation_timeout: u64,
    /// Seconds between two checks of the destination header syncer.
    #[serde(default = "defaults::header_sync_interval")]
    pub header_sync_interval: u64,
    /// Seconds to wait for the header sync, unbounded when unset.
    #[serde(default)]
    pub header_sync_timeout: Option<u64>,
    /// Seconds to wait for the destination receipt.
    #[serde(default = "defaults::receipt_timeout")]
    pub receipt_timeout: u64,
    /// Skip messages whose fee does not cover the estimated gas cost.
    #[serde(default)]
    pub profitable_only: bool,
    /// Requeues of a failing message before it is dropped.
    #[serde(default = "defaults::max_message_retries")]
    pub max_message_retries: u32,
    /// Milliseconds between two polls of an empty queue.
    #[serde(default = "defaults::queue_poll_interval")]
    pub queue_poll_interval: u64,
    /// Messages processed at the same time.
    #[serde(default = "defaults::num_workers")]
    pub num_workers: usize,
    /// Intermediate chains the proof must traverse, in order.
    #[serde(default)]
    pub hops: Vec<HopConfig>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            private_key: None,
            confirmations: defaults::confirmations(),
            confirmation_timeout: defaults::confirmation_timeout(),
            header_sync_interval: defaults::header_sync_interval(),
            header_sync_timeout: None,
            receipt_timeout: defaults::receipt_timeout(),
            profitable_only: false,
            max_message_retries: defaults::max_message_retries(),
            queue_poll_interval: defaults::queue_poll_interval(),
            num_workers: defaults::num_workers(),
            hops: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout)
    }

    pub fn header_sync_interval(&self) -> Duration {
        Duration::from_secs(self.header_sync_interval)
    }

    pub fn header_sync_timeout(&self) -> Option<Duration> {
        self.header_sync_timeout.map(Duration::from_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval)
    }
}

/// An intermediate chain of a multi-hop proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HopConfig {
    pub chain_id: u64,
    pub http_endpoint: RpcUrl,
    /// The signal service whose storage is proven on this hop.
    pub signal_service_address: Address,
}
