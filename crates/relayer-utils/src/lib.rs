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

use ethers::providers::{Http, Provider, RetryClient};
use ethers::signers::LocalWallet;
use ethers::types::H256;

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// The HTTP provider every chain client is built on.
pub type HttpProvider = Provider<RetryClient<Http>>;

/// An enum of all possible errors that could be encountered during the execution of the Bridge
/// Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Ethers provider error.
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ethers websocket transport error.
    #[error(transparent)]
    EthersWs(#[from] ethers::providers::WsClientError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    EthersAbi(#[from] ethers::abi::Error),
    /// Wallet error.
    #[error(transparent)]
    EthersWallet(#[from] ethers::signers::WalletError),
    /// Error while signing and sending a transaction.
    #[error(transparent)]
    EthersSigner(
        #[from]
        ethers::middleware::signer::SignerMiddlewareError<
            HttpProvider,
            LocalWallet,
        >,
    ),
    /// Rlp decoding error.
    #[error(transparent)]
    Rlp(#[from] ethers::utils::rlp::DecoderError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Sled transaction error.
    #[error(transparent)]
    SledTransaction(
        #[from] sled::transaction::TransactionError<std::io::Error>,
    ),
    /// Prometheus error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Invalid configuration value.
    #[error("Invalid config: {}", _0)]
    InvalidConfig(String),
    /// A component was built without one of its required collaborators.
    #[error("Missing dependency: {}", _0)]
    MissingDependency(&'static str),
    /// Missing Secrets in the config, the processor needs a signing key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// The message has a zero gas limit and only its owner may process it.
    #[error("only user can process this, gasLimit set to 0")]
    OnlyOwnerCanProcess,
    /// The destination bridge reports the message is not provably received.
    #[error("message not received: 0x{}", hex::encode(_0))]
    MessageNotReceived(H256),
    /// The processing fee does not cover the estimated gas cost.
    #[error("unprofitable message: fee {fee} < cost {cost}")]
    Unprofitable {
        /// The fee attached to the message.
        fee: ethers::types::U256,
        /// The estimated destination cost.
        cost: ethers::types::U256,
    },
    /// The proven storage slot does not hold the signal marker.
    #[error("invalid storage value {found}, expected 1")]
    InvalidStorageValue {
        /// The value returned by `eth_getProof`.
        found: ethers::types::U256,
    },
    /// `eth_getProof` returned no storage proof for the requested key.
    #[error("empty storage proof for key {:?}", _0)]
    EmptyStorageProof(H256),
    /// Block not found on chain.
    #[error("block not found: {}", _0)]
    BlockNotFound(String),
    /// Transaction receipt not found.
    #[error("receipt not found for tx {:?}", _0)]
    ReceiptNotFound(H256),
    /// The transaction was mined but reverted.
    #[error("transaction reverted, hash: {:?}", _0)]
    TransactionReverted(H256),
    /// A bounded wait ran out of time.
    #[error("deadline exceeded while waiting for {}", _0)]
    Timeout(&'static str),
    /// A live subscription ended.
    #[error("subscription closed")]
    SubscriptionClosed,
    /// Every genesis probe failed.
    #[error("unable to resolve genesis height")]
    GenesisNotFound,
    /// Event row not found in the store.
    #[error("event not found: {}", _0)]
    EventNotFound(u64),
    /// Task was force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
}

impl Error {
    /// Whether a failed processing attempt may be retried later.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Error::OnlyOwnerCanProcess
                | Error::MessageNotReceived(_)
                | Error::Unprofitable { .. }
                | Error::InvalidConfig(_)
                | Error::MissingDependency(_)
                | Error::MissingSecrets
        )
    }
}

/// A type alias for the result for bridge relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
