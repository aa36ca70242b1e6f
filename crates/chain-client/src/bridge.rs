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

use bridge_relayer_types::{
    BridgeMessage, EventStatus, MessageSentFilter, MessageStatusChangedFilter,
};
use bridge_relayer_utils::metric::{MetricsSink, NoopMetrics};
use bridge_relayer_utils::{Error, HttpProvider};
use ethers::contract::{EthEvent, EthLogDecode};
use ethers::middleware::SignerMiddleware;
use ethers::providers::Middleware;
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, TransactionRequest, H256, U256};

use crate::evm::EvmClient;
use crate::logs::decode_logs;
use crate::{
    calls, BridgeContract, Decoded, EthClient, HeaderSyncer, SubmittedTx,
    Subscription, TransactOpts,
};

type Signing = SignerMiddleware<HttpProvider, LocalWallet>;

/// The bridge contract deployed at `address`.
///
/// Without a wallet only the read side works, `process_message` fails
/// with [`Error::MissingSecrets`].
#[derive(Clone)]
pub struct EvmBridge {
    client: EvmClient,
    address: Address,
    signer: Option<Arc<Signing>>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for EvmBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmBridge")
            .field("client", &self.client)
            .field("address", &self.address)
            .field("signer", &self.signer)
            .finish()
    }
}

impl EvmBridge {
    pub fn new(client: EvmClient, address: Address) -> Self {
        Self {
            client,
            address,
            signer: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Counts the logs that fail to decode on `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Signs transactions with `wallet`, whose chain id must already be set.
    pub fn with_wallet(mut self, wallet: LocalWallet) -> Self {
        self.signer = Some(Arc::new(self.client.signer(wallet)));
        self
    }

    pub fn client(&self) -> &EvmClient {
        &self.client
    }

    fn event_filter<T: EthEvent>(&self) -> Filter {
        Filter::new().address(self.address).topic0(T::signature())
    }

    async fn filter_logs<T>(
        &self,
        from: u64,
        to: u64,
    ) -> crate::Result<Vec<Decoded<T>>>
    where
        T: EthEvent + EthLogDecode,
    {
        let filter = self.event_filter::<T>().from_block(from).to_block(to);
        let logs = self.client.provider().get_logs(&filter).await?;
        Ok(decode_logs(logs, &*self.metrics))
    }

    fn process_message_tx(
        &self,
        message: &BridgeMessage,
        proof: &Bytes,
    ) -> TransactionRequest {
        let data = calls::process_message(message.clone(), proof.clone());
        let tx = TransactionRequest::new().to(self.address).data(data);
        match &self.signer {
            Some(signer) => tx.from(signer.address()),
            None => tx,
        }
    }
}

#[async_trait::async_trait]
impl BridgeContract for EvmBridge {
    fn address(&self) -> Address {
        self.address
    }

    async fn filter_message_sent(
        &self,
        from: u64,
        to: u64,
    ) -> crate::Result<Vec<Decoded<MessageSentFilter>>> {
        self.filter_logs(from, to).await
    }

    async fn filter_message_status_changed(
        &self,
        from: u64,
        to: u64,
    ) -> crate::Result<Vec<Decoded<MessageStatusChangedFilter>>> {
        self.filter_logs(from, to).await
    }

    async fn watch_message_sent(
        &self,
    ) -> crate::Result<Subscription<Decoded<MessageSentFilter>>> {
        self.client.subscribe_logs(
            self.event_filter::<MessageSentFilter>(),
            self.metrics.clone(),
        )
    }

    async fn watch_message_status_changed(
        &self,
    ) -> crate::Result<Subscription<Decoded<MessageStatusChangedFilter>>> {
        self.client.subscribe_logs(
            self.event_filter::<MessageStatusChangedFilter>(),
            self.metrics.clone(),
        )
    }

    async fn get_message_status(
        &self,
        msg_hash: H256,
    ) -> crate::Result<EventStatus> {
        let output = self
            .client
            .call(self.address, calls::get_message_status(msg_hash))
            .await?;
        calls::decode_message_status(&output)
    }

    async fn is_message_received(
        &self,
        msg_hash: H256,
        src_chain_id: U256,
        proof: Bytes,
    ) -> crate::Result<bool> {
        let data = calls::is_message_received(msg_hash, src_chain_id, proof);
        let output = self.client.call(self.address, data).await?;
        calls::decode_bool(&output)
    }

    async fn estimate_process_message(
        &self,
        message: &BridgeMessage,
        proof: &Bytes,
    ) -> crate::Result<U256> {
        let tx: TypedTransaction =
            self.process_message_tx(message, proof).into();
        Ok(self.client.provider().estimate_gas(&tx, None).await?)
    }

    async fn process_message(
        &self,
        opts: TransactOpts,
        message: BridgeMessage,
        proof: Bytes,
    ) -> crate::Result<SubmittedTx> {
        let signer = self.signer.as_ref().ok_or(Error::MissingSecrets)?;
        let mut tx = self
            .process_message_tx(&message, &proof)
            .nonce(opts.nonce)
            .gas(opts.gas_limit);
        if let Some(price) = opts.gas_price {
            tx = tx.gas_price(price);
        }
        let pending = signer.send_transaction(tx, None).await?;
        Ok(SubmittedTx {
            hash: pending.tx_hash(),
            nonce: opts.nonce,
        })
    }
}

/// The destination `ICrossChainSync` contract.
#[derive(Debug, Clone)]
pub struct EvmHeaderSyncer {
    client: EvmClient,
    address: Address,
}

impl EvmHeaderSyncer {
    pub fn new(client: EvmClient, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait::async_trait]
impl HeaderSyncer for EvmHeaderSyncer {
    async fn latest_synced_header(&self) -> crate::Result<H256> {
        // Block number zero reads the most recent synced header.
        let data = calls::get_cross_chain_block_hash(U256::zero());
        let output = self.client.call(self.address, data).await?;
        calls::decode_bytes32(&output)
    }
}
