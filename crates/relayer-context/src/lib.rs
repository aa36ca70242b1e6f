// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.
use std::sync::Arc;

use tokio::sync::broadcast;

use bridge_relayer_chain::bridge::{EvmBridge, EvmHeaderSyncer};
use bridge_relayer_chain::evm::{EvmClient, TransportOpts};
use bridge_relayer_config::{ChainConfig, RelayerConfig};
use bridge_relayer_proof::Hop;
use bridge_relayer_store::SledStore;
use bridge_relayer_utils::metric::Metrics;
use bridge_relayer_utils::Error;
use ethers::signers::{LocalWallet, Signer};

/// RelayerContext contains Relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: RelayerConfig,
    /// Broadcasts a shutdown signal to all running services.
    ///
    /// When a service is spawned, it is passed a broadcast receiver handle.
    /// When a graceful shutdown is initiated, a `()` value is sent via the
    /// broadcast::Sender. Each service receives it, reaches a safe terminal
    /// state, and completes the task.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relayer
    pub metrics: Arc<Metrics>,
    store: SledStore,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: RelayerConfig,
        store: SledStore,
    ) -> bridge_relayer_utils::Result<Self> {
        Self::with_metrics(config, store, Metrics::new()?)
    }

    /// Same as [`RelayerContext::new`] with the given metrics.
    pub fn with_metrics(
        config: RelayerConfig,
        store: SledStore,
        metrics: Metrics,
    ) -> bridge_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        Ok(Self {
            config,
            notify_shutdown,
            metrics: Arc::new(metrics),
            store,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// A client of the chain messages are sent from.
    pub fn src_client(&self) -> EvmClient {
        Self::evm_client(&self.config.src)
    }

    /// A client of the chain messages are delivered to.
    pub fn dest_client(&self) -> EvmClient {
        Self::evm_client(&self.config.dest)
    }

    fn evm_client(chain: &ChainConfig) -> EvmClient {
        EvmClient::new(
            chain.http_endpoint.as_url().clone(),
            chain.ws_endpoint.as_ref().map(|ws| ws.as_url().clone()),
            TransportOpts::default(),
        )
    }

    /// The read only source bridge, counting undecodable logs on the
    /// relayer metrics.
    pub fn src_bridge(&self) -> EvmBridge {
        EvmBridge::new(self.src_client(), self.config.src.bridge_address)
            .with_metrics(self.metrics.clone())
    }

    /// The destination bridge, signing with the processor wallet when one
    /// is configured.
    pub fn dest_bridge(&self) -> bridge_relayer_utils::Result<EvmBridge> {
        let bridge =
            EvmBridge::new(self.dest_client(), self.config.dest.bridge_address);
        if self.config.processor.private_key.is_none() {
            return Ok(bridge);
        }
        Ok(bridge.with_wallet(self.evm_wallet()?))
    }

    /// The destination contract recording synced source headers.
    pub fn header_syncer(
        &self,
    ) -> bridge_relayer_utils::Result<EvmHeaderSyncer> {
        let address = self.config.dest.header_syncer_address.ok_or(
            Error::MissingDependency("dest.header-syncer-address"),
        )?;
        Ok(EvmHeaderSyncer::new(self.dest_client(), address))
    }

    /// The intermediate chains of multi-hop proofs, in order.
    pub fn hops(&self) -> Vec<Hop> {
        self.config
            .processor
            .hops
            .iter()
            .map(|hop| Hop {
                chain_id: hop.chain_id,
                signal_service: hop.signal_service_address,
                client: Arc::new(EvmClient::new(
                    hop.http_endpoint.as_url().clone(),
                    None,
                    TransportOpts::default(),
                )),
            })
            .collect()
    }

    /// Sets up and returns the processor wallet, bound to the destination
    /// chain id.
    pub fn evm_wallet(&self) -> bridge_relayer_utils::Result<LocalWallet> {
        let private_key = self
            .config
            .processor
            .private_key
            .as_ref()
            .ok_or(Error::MissingSecrets)?;
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())?;
        Ok(wallet.with_chain_id(self.config.dest.chain_id))
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Whether the shutdown signal was already received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
