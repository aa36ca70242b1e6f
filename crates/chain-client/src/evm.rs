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
use std::time::Duration;

use bridge_relayer_utils::metric::MetricsSink;
use bridge_relayer_utils::{probe, Error, HttpProvider};
use ethers::contract::EthLogDecode;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider, RetryClientBuilder, Ws};
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockId, BlockNumber, Bytes, Filter, TransactionReceipt,
    TransactionRequest, H256, U256,
};
use futures::StreamExt;
use url::Url;

use crate::logs::decode_log;
use crate::retry_policy::HttpRetryPolicy;
use crate::subscription::SUBSCRIPTION_BUFFER;
use crate::{
    Caller, Decoded, EthClient, Header, StorageProofResponse,
    StorageSlotProof, Subscription,
};

/// Tuning of the HTTP transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOpts {
    /// Retries of rate limited requests.
    pub max_retries: u32,
    /// First backoff, doubled on every retry.
    pub initial_backoff: Duration,
}

impl Default for TransportOpts {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// An EVM chain reached over HTTP, and over websocket for subscriptions.
#[derive(Debug, Clone)]
pub struct EvmClient {
    provider: Arc<HttpProvider>,
    http_endpoint: Url,
    ws_endpoint: Option<Url>,
    opts: TransportOpts,
}

impl EvmClient {
    pub fn new(http: Url, ws: Option<Url>, opts: TransportOpts) -> Self {
        Self {
            provider: Arc::new(build_provider(http.clone(), opts)),
            http_endpoint: http,
            ws_endpoint: ws,
            opts,
        }
    }

    /// A signing middleware over a fresh provider to the same endpoint.
    pub fn signer(
        &self,
        wallet: LocalWallet,
    ) -> SignerMiddleware<HttpProvider, LocalWallet> {
        let provider = build_provider(self.http_endpoint.clone(), self.opts);
        SignerMiddleware::new(provider, wallet)
    }

    /// The underlying provider, shared with signers.
    pub fn provider(&self) -> Arc<HttpProvider> {
        self.provider.clone()
    }

    pub fn ws_endpoint(&self) -> crate::Result<&Url> {
        self.ws_endpoint
            .as_ref()
            .ok_or(Error::MissingDependency("websocket endpoint"))
    }

    /// Streams the logs matching `filter` decoded as `T`.
    ///
    /// Logs that do not decode are skipped and counted on `metrics`.
    pub fn subscribe_logs<T>(
        &self,
        filter: Filter,
        metrics: Arc<dyn MetricsSink>,
    ) -> crate::Result<Subscription<Decoded<T>>>
    where
        T: EthLogDecode + Send + 'static,
    {
        let ws = self.ws_endpoint()?.clone();
        let (tx, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(async move {
            let result: crate::Result<()> = async {
                let provider = Provider::<Ws>::connect(ws.as_str()).await?;
                let mut stream = provider.subscribe_logs(&filter).await?;
                while let Some(log) = stream.next().await {
                    let Some(decoded) = decode_log::<T>(log, &*metrics) else {
                        continue;
                    };
                    if tx.send(Ok(decoded)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(Error::SubscriptionClosed)
            }
            .await;
            if let Err(e) = result {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Indexer,
                    subscription_ended = %e,
                );
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(sub.with_task(task))
    }
}

fn build_provider(http: Url, opts: TransportOpts) -> HttpProvider {
    let client = RetryClientBuilder::default()
        .rate_limit_retries(opts.max_retries)
        .timeout_retries(3)
        .initial_backoff(opts.initial_backoff)
        .build(Http::new(http), HttpRetryPolicy::boxed());
    Provider::new(client).interval(Duration::from_millis(500))
}

fn block_not_found(what: impl std::fmt::Display) -> Error {
    Error::BlockNotFound(what.to_string())
}

#[async_trait::async_trait]
impl EthClient for EvmClient {
    async fn chain_id(&self) -> crate::Result<u64> {
        let id = self.provider.get_chainid().await?;
        Ok(id.as_u64())
    }

    async fn block_number(&self) -> crate::Result<u64> {
        let number = self.provider.get_block_number().await?;
        Ok(number.as_u64())
    }

    async fn header_by_number(
        &self,
        number: Option<u64>,
    ) -> crate::Result<Header> {
        let id = match number {
            Some(n) => BlockNumber::Number(n.into()),
            None => BlockNumber::Latest,
        };
        self.provider
            .get_block(id)
            .await?
            .ok_or_else(|| block_not_found(format!("{id:?}")))
    }

    async fn block_by_hash(&self, hash: H256) -> crate::Result<Header> {
        self.provider
            .get_block(hash)
            .await?
            .ok_or_else(|| block_not_found(format!("{hash:?}")))
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> crate::Result<Option<TransactionReceipt>> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn pending_nonce_at(&self, account: Address) -> crate::Result<U256> {
        let nonce = self
            .provider
            .get_transaction_count(
                account,
                Some(BlockId::Number(BlockNumber::Pending)),
            )
            .await?;
        Ok(nonce)
    }

    async fn gas_price(&self) -> crate::Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> crate::Result<Bytes> {
        let tx: TypedTransaction =
            TransactionRequest::new().to(to).data(data).into();
        Ok(self.provider.call(&tx, None).await?)
    }

    async fn subscribe_new_heads(&self) -> crate::Result<Subscription<Header>> {
        let ws = self.ws_endpoint()?.clone();
        let (tx, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(async move {
            let result: crate::Result<()> = async {
                let provider = Provider::<Ws>::connect(ws.as_str()).await?;
                let mut stream = provider.subscribe_blocks().await?;
                while let Some(header) = stream.next().await {
                    if tx.send(Ok(header)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(Error::SubscriptionClosed)
            }
            .await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(sub.with_task(task))
    }
}

#[async_trait::async_trait]
impl Caller for EvmClient {
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<H256>,
        block: u64,
    ) -> crate::Result<StorageProofResponse> {
        let block = BlockId::Number(BlockNumber::Number(block.into()));
        let response = self
            .provider
            .get_proof(address, keys.clone(), Some(block))
            .await?;
        let storage_proof = keys
            .into_iter()
            .zip(response.storage_proof)
            .map(|(key, slot)| StorageSlotProof {
                key,
                value: slot.value,
                proof: slot.proof,
            })
            .collect();
        Ok(StorageProofResponse {
            account_proof: response.account_proof,
            storage_hash: response.storage_hash,
            storage_proof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriptions_need_a_websocket_endpoint() {
        let client = EvmClient::new(
            "http://localhost:8545".parse().unwrap(),
            None,
            TransportOpts::default(),
        );
        assert!(matches!(
            client.subscribe_new_heads().await,
            Err(Error::MissingDependency(_))
        ));
    }
}
