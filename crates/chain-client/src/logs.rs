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


//! Decoding of raw bridge logs.
//!
//! A log that does not decode is logged, counted and skipped, so a single
//! malformed log never holds back the logs around it.

use bridge_relayer_utils::metric::{counter, MetricsSink};
use ethers::contract::{EthLogDecode, LogMeta};
use ethers::types::Log;

use crate::Decoded;

/// Decodes `log` as `T`, `None` when it does not decode.
pub fn decode_log<T: EthLogDecode>(
    log: Log,
    metrics: &dyn MetricsSink,
) -> Option<Decoded<T>> {
    let meta = LogMeta::from(&log);
    match ethers::contract::parse_log::<T>(log) {
        Ok(event) => Some((event, meta)),
        Err(e) => {
            tracing::error!(
                %e,
                block = %meta.block_number,
                tx = ?meta.transaction_hash,
                log_index = %meta.log_index,
                "skipping undecodable log",
            );
            metrics.inc_counter(counter::INDEXER_HANDLER_ERRORS);
            None
        }
    }
}

/// Decodes every log of `logs` that decodes as `T`, in order.
pub fn decode_logs<T: EthLogDecode>(
    logs: impl IntoIterator<Item = Log>,
    metrics: &dyn MetricsSink,
) -> Vec<Decoded<T>> {
    logs.into_iter()
        .filter_map(|log| decode_log(log, metrics))
        .collect()
}

#[cfg(test)]
mod tests {
    use bridge_relayer_types::MessageStatusChangedFilter;
    use bridge_relayer_utils::metric::CountingMetrics;
    use ethers::abi::Token;
    use ethers::contract::EthEvent;
    use ethers::types::{Address, H256, U256, U64};

    use super::*;

    fn status_log(block: u64, data: Vec<u8>) -> Log {
        Log {
            address: Address::repeat_byte(0xb1),
            topics: vec![
                MessageStatusChangedFilter::signature(),
                H256::repeat_byte(block as u8),
            ],
            data: data.into(),
            block_hash: Some(H256::from_low_u64_be(block)),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from_low_u64_be(block + 1000)),
            transaction_index: Some(U64::zero()),
            log_index: Some(U256::zero()),
            ..Default::default()
        }
    }

    fn status_data(status: u8) -> Vec<u8> {
        ethers::abi::encode(&[Token::Uint(status.into())])
    }

    #[test]
    #[tracing_test::traced_test]
    fn malformed_logs_are_skipped_and_counted() {
        let metrics = CountingMetrics::default();
        let logs = vec![
            status_log(10, status_data(2)),
            status_log(11, Vec::new()),
            status_log(12, status_data(1)),
        ];
        let decoded: Vec<Decoded<MessageStatusChangedFilter>> =
            decode_logs(logs, &metrics);
        let blocks: Vec<u64> =
            decoded.iter().map(|(_, m)| m.block_number.as_u64()).collect();
        assert_eq!(blocks, vec![10, 12]);
        assert_eq!(decoded[0].0.status, 2);
        assert_eq!(decoded[1].0.msg_hash, [12u8; 32]);
        assert_eq!(metrics.get(counter::INDEXER_HANDLER_ERRORS), 1);
        assert!(logs_contain("skipping undecodable log"));
    }

    #[test]
    fn a_log_of_another_event_does_not_decode() {
        let metrics = CountingMetrics::default();
        let mut log = status_log(10, status_data(2));
        log.topics[0] = H256::repeat_byte(0xee);
        assert!(decode_log::<MessageStatusChangedFilter>(log, &metrics)
            .is_none());
        assert_eq!(metrics.get(counter::INDEXER_HANDLER_ERRORS), 1);
    }
}
