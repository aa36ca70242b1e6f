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

use bridge_relayer_chain::{BridgeContract, EthClient};
use bridge_relayer_context::RelayerContext;
use bridge_relayer_indexer::genesis::probes_from_config;
use bridge_relayer_indexer::{Indexer, IndexerDeps};
use bridge_relayer_processor::{Processor, ProcessorDeps};
use bridge_relayer_store::SledStore;
use ethers::signers::Signer;
use tokio::signal::unix;

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = SledStore;

/// Starts all background services: the indexer and the processor, each
/// when enabled.
///
/// This does not block, the services run on background tasks until the
/// shutdown signal.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `store` -[Sled](https://sled.rs)-based database store
pub async fn ignite(
    ctx: &RelayerContext,
    store: Arc<Store>,
) -> crate::Result<()> {
    tracing::debug!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&ctx.config)?
    );
    if ctx.config.indexer.enabled {
        start_indexer(ctx, store.clone())?;
    } else {
        tracing::warn!("Indexer disabled");
    }
    if ctx.config.processor.enabled {
        start_processor(ctx, store)?;
    } else {
        tracing::warn!("Processor disabled");
    }
    Ok(())
}

/// Starts the indexer of the configured source chain.
///
/// An indexer that fails shuts the whole relayer down.
pub fn start_indexer(
    ctx: &RelayerContext,
    store: Arc<Store>,
) -> crate::Result<()> {
    let src: Arc<dyn EthClient> = Arc::new(ctx.src_client());
    let dest_bridge: Arc<dyn BridgeContract> = Arc::new(ctx.dest_bridge()?);
    let deps = IndexerDeps {
        genesis_probes: probes_from_config(
            src.clone(),
            &ctx.config.indexer.genesis_probes,
        ),
        src: Some(src),
        src_bridge: Some(Arc::new(ctx.src_bridge())),
        dest_bridge: Some(dest_bridge),
        events: Some(store.clone()),
        blocks: Some(store.clone()),
        queue: Some(store),
        metrics: Some(ctx.metrics.clone()),
        src_chain_id: ctx.config.src.chain_id,
        dest_chain_id: ctx.config.dest.chain_id,
    };
    let indexer = Arc::new(Indexer::new(deps, ctx.config.indexer.clone())?);
    let src_name = ctx.config.src.name.clone();
    let mut shutdown_signal = ctx.shutdown_signal();
    let ctx = ctx.clone();
    tracing::debug!("Indexer for ({}) started.", src_name);
    let task = async move {
        tokio::select! {
            result = indexer.run() => match result {
                Ok(()) => tracing::info!("Indexer for ({}) is caught up.", src_name),
                Err(e) => {
                    tracing::error!("Indexer for ({}) stopped: {}", src_name, e);
                    ctx.shutdown();
                }
            },
            _ = shutdown_signal.recv() => {
                tracing::trace!("Stopping Indexer for ({})", src_name);
            },
        }
    };
    // kick off the indexer.
    tokio::task::spawn(task);
    Ok(())
}

/// Starts the processor delivering on the configured destination chain.
pub fn start_processor(
    ctx: &RelayerContext,
    store: Arc<Store>,
) -> crate::Result<()> {
    let wallet = ctx.evm_wallet()?;
    let deps = ProcessorDeps {
        src: Some(Arc::new(ctx.src_client())),
        dest: Some(Arc::new(ctx.dest_client())),
        dest_bridge: Some(Arc::new(ctx.dest_bridge()?)),
        header_syncer: Some(Arc::new(ctx.header_syncer()?)),
        events: Some(store.clone()),
        queue: Some(store),
        metrics: Some(ctx.metrics.clone()),
        src_bridge_address: ctx.config.src.bridge_address,
        signal_service: ctx.config.src.signal_service_address(),
        signer: wallet.address(),
        hops: ctx.hops(),
        src_chain_id: ctx.config.src.chain_id,
        dest_chain_id: ctx.config.dest.chain_id,
    };
    let processor =
        Arc::new(Processor::new(deps, ctx.config.processor.clone())?);
    let dest_name = ctx.config.dest.name.clone();
    let mut shutdown_signal = ctx.shutdown_signal();
    let ctx = ctx.clone();
    tracing::debug!(
        "Processor for ({}) started, signing as {:?}.",
        dest_name,
        wallet.address()
    );
    let task = async move {
        tokio::select! {
            result = processor.run() => {
                if let Err(e) = result {
                    tracing::error!("Processor for ({}) stopped: {}", dest_name, e);
                }
                ctx.shutdown();
            },
            _ = shutdown_signal.recv() => {
                tracing::trace!("Stopping Processor for ({})", dest_name);
            },
        }
    };
    // kick off the processor.
    tokio::task::spawn(task);
    Ok(())
}

/// What ended the relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// An operator signal, named.
    Signal(&'static str),
    /// A service failed and shut the relayer down.
    Fatal,
}

impl Exit {
    /// The result `main` returns, an error after a failed service so the
    /// process exits non-zero.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self {
            Exit::Signal(_) => Ok(()),
            Exit::Fatal => {
                anyhow::bail!("relayer service stopped unexpectedly")
            }
        }
    }
}

/// Waits for SIGINT, SIGTERM or SIGQUIT, or for a service to trigger the
/// shutdown signal of `ctx`.
pub async fn wait_for_exit(ctx: &RelayerContext) -> std::io::Result<Exit> {
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let mut fatal = ctx.shutdown_signal();
    let exit = tokio::select! {
        _ = ctrlc_signal.recv() => Exit::Signal("interrupt"),
        _ = termination_signal.recv() => Exit::Signal("terminate"),
        _ = quit_signal.recv() => Exit::Signal("quit"),
        _ = fatal.recv() => Exit::Fatal,
    };
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_relayer_config::{ChainConfig, RelayerConfig};
    use bridge_relayer_utils::metric::Metrics;
    use ethers::types::Address;
    use prometheus::Registry;

    use super::*;

    fn chain(name: &str, chain_id: u64, byte: u8) -> ChainConfig {
        ChainConfig {
            name: name.into(),
            chain_id,
            http_endpoint: url::Url::parse("http://localhost:8545")
                .unwrap()
                .into(),
            ws_endpoint: None,
            bridge_address: Address::repeat_byte(byte),
            signal_service_address: None,
            header_syncer_address: None,
        }
    }

    fn context() -> RelayerContext {
        let config = RelayerConfig {
            src: chain("l1", 5, 0x10),
            dest: chain("l2", 167, 0x20),
            indexer: Default::default(),
            processor: Default::default(),
        };
        RelayerContext::with_metrics(
            config,
            Store::temporary().unwrap(),
            Metrics::with_registry(Registry::new()).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn a_failed_service_ends_with_an_error() {
        let ctx = context();
        let waiting = {
            let ctx = ctx.clone();
            tokio::spawn(async move { wait_for_exit(&ctx).await })
        };
        // Let the waiter subscribe before a service gives up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.shutdown();
        let exit = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, Exit::Fatal);
        assert!(exit.into_result().is_err());
    }

    #[test]
    fn signals_end_cleanly() {
        assert!(Exit::Signal("terminate").into_result().is_ok());
    }
}
