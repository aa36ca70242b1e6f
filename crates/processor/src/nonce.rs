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

use std::future::Future;
use std::sync::Arc;

use bridge_relayer_chain::{EthClient, SubmittedTx};
use bridge_relayer_utils::Result;
use ethers::types::{Address, U256};
use tokio::sync::Mutex;

/// Hands out the nonces of one signer.
///
/// The lock is held from reading the pending nonce until the transaction is
/// accepted, so concurrent submissions never share a nonce.
pub struct NonceManager {
    client: Arc<dyn EthClient>,
    account: Address,
    next: Mutex<Option<U256>>,
}

impl std::fmt::Debug for NonceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceManager")
            .field("account", &self.account)
            .finish()
    }
}

impl NonceManager {
    pub fn new(client: Arc<dyn EthClient>, account: Address) -> Self {
        Self {
            client,
            account,
            next: Mutex::new(None),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Runs `send` with the next free nonce.
    ///
    /// The node's pending nonce wins when it is ahead of the local one. The
    /// nonce is only consumed when `send` succeeds.
    pub async fn submit<F, Fut>(&self, send: F) -> Result<SubmittedTx>
    where
        F: FnOnce(U256) -> Fut,
        Fut: Future<Output = Result<SubmittedTx>>,
    {
        let mut next = self.next.lock().await;
        let pending = self.client.pending_nonce_at(self.account).await?;
        let nonce = match *next {
            Some(local) if local > pending => local,
            _ => pending,
        };
        let tx = send(nonce).await?;
        tracing::debug!(%nonce, tx = ?tx.hash, "transaction accepted");
        *next = Some(nonce + 1);
        Ok(tx)
    }
}
