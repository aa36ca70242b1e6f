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

use bridge_relayer_utils::{probe, Error};
use ethers::types::{TransactionReceipt, H256, U64};

use crate::EthClient;

/// Polling period of [`wait_receipt`].
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default bound of [`wait_receipt`].
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(240);
/// Polling period of [`wait_confirmations`].
pub const CONFIRMATIONS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Waits until the receipt of `hash` is available.
///
/// A receipt with a status other than `1` is an error.
pub async fn wait_receipt<C>(
    client: &C,
    hash: H256,
    interval: Duration,
    timeout: Duration,
) -> crate::Result<TransactionReceipt>
where
    C: EthClient + ?Sized,
{
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Some(receipt) = client.transaction_receipt(hash).await? {
                return Ok::<_, Error>(receipt);
            }
        }
    };
    let receipt = tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| Error::Timeout("transaction receipt"))??;
    if receipt.status != Some(U64::one()) {
        return Err(Error::TransactionReverted(hash));
    }
    Ok(receipt)
}

/// Waits until the block holding `hash` is followed by `confirmations`
/// blocks.
///
/// The first check happens right away. A missing receipt keeps the wait
/// going, the transaction may still be propagating.
pub async fn wait_confirmations<C>(
    client: &C,
    hash: H256,
    confirmations: u64,
    interval: Duration,
    timeout: Duration,
) -> crate::Result<()>
where
    C: EthClient + ?Sized,
{
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let receipt = match client.transaction_receipt(hash).await? {
                Some(receipt) => receipt,
                None => continue,
            };
            let Some(mined_at) = receipt.block_number else {
                continue;
            };
            let head = client.block_number().await?;
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::TRACE,
                kind = %probe::Kind::Processor,
                tx = ?hash,
                mined_at = mined_at.as_u64(),
                head,
                confirmations,
            );
            if mined_at.as_u64() + confirmations <= head {
                return Ok::<_, Error>(());
            }
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| Error::Timeout("confirmations"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn confirmed_once_the_head_is_far_enough() {
        let chain = MockChain::new(1, 100);
        let hash = chain.insert_receipt(H256::repeat_byte(1), 98, true);
        let waiting = wait_confirmations(
            &chain,
            hash,
            3,
            TICK,
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(waiting, Err(Error::Timeout(_))));

        chain.set_latest(101);
        wait_confirmations(&chain, hash, 3, TICK, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_receipt_keeps_waiting() {
        let chain = MockChain::new(1, 100);
        let hash = H256::repeat_byte(2);
        let background = chain.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.insert_receipt(hash, 90, true);
        });
        wait_confirmations(&chain, hash, 3, TICK, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reverted_receipt_is_an_error() {
        let chain = MockChain::new(1, 100);
        let hash = chain.insert_receipt(H256::repeat_byte(3), 100, false);
        let res =
            wait_receipt(&chain, hash, TICK, Duration::from_secs(1)).await;
        assert!(matches!(res, Err(Error::TransactionReverted(h)) if h == hash));
    }

    #[tokio::test]
    async fn receipt_wait_is_bounded() {
        let chain = MockChain::new(1, 100);
        let res = wait_receipt(
            &chain,
            H256::repeat_byte(4),
            TICK,
            Duration::from_millis(30),
        )
        .await;
        assert!(matches!(res, Err(Error::Timeout(_))));
    }
}
