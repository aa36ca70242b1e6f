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

//! Bridge Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use bridge_relayer::service::Exit;
use bridge_relayer_config::cli::{create_store, load_config, setup_logger, Opts};
use bridge_relayer_context::RelayerContext;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;

    // persistent storage for the relayer
    let store = create_store(&args)?;

    // The RelayerContext takes a configuration, and populates objects that are needed
    // throughout the lifetime of the relayer, like the clients of both chains
    // and the processor wallet.
    let ctx = RelayerContext::new(config, store.clone())?;

    // start all background services.
    // this does not block, will fire the services on background tasks.
    bridge_relayer::service::ignite(&ctx, Arc::new(store)).await?;
    tracing::event!(
        target: bridge_relayer_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %bridge_relayer_utils::probe::Kind::Lifecycle,
        started = true
    );
    // watch for signals, or for a service that failed
    let exit = bridge_relayer::service::wait_for_exit(&ctx).await?;
    match exit {
        Exit::Signal(name) => tracing::warn!("Got {} signal ...", name),
        Exit::Fatal => tracing::error!("A service stopped, exiting ..."),
    }
    tracing::event!(
        target: bridge_relayer_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %bridge_relayer_utils::probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    // send shutdown signal to all of the application.
    ctx.shutdown();
    match ctx.store().flush() {
        Ok(_) => tracing::debug!(
            "Store flushed, {} bytes on disk",
            ctx.store().get_data_stored_size()
        ),
        Err(e) => tracing::error!("Failed to flush the store: {}", e),
    }
    exit.into_result()
}
