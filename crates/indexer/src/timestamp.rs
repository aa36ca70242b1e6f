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

use bridge_relayer_chain::EthClient;
use bridge_relayer_utils::{Error, Result};

/// Seconds per block assumed by the first estimate.
pub const AVERAGE_BLOCK_TIME: u64 = 12;
/// Blocks around the estimate checked before falling back to the whole
/// chain.
pub const SEARCH_MARGIN: u64 = 128;

/// The highest block whose timestamp is at or before `target`.
///
/// Targets before block 1 resolve to 1, targets after the head resolve to
/// the head.
pub async fn block_by_timestamp<C>(client: &C, target: u64) -> Result<u64>
where
    C: EthClient + ?Sized,
{
    let latest = client.header_by_number(None).await?;
    let latest_number = latest
        .number
        .ok_or(Error::Generic("latest block has no number"))?
        .as_u64();
    if latest_number <= 1 || target >= latest.timestamp.as_u64() {
        return Ok(latest_number.max(1));
    }
    if target <= timestamp_of(client, 1).await? {
        return Ok(1);
    }

    let behind = (latest.timestamp.as_u64() - target) / AVERAGE_BLOCK_TIME;
    let estimate = latest_number.saturating_sub(behind).clamp(1, latest_number);
    let mut lo = estimate.saturating_sub(SEARCH_MARGIN).max(1);
    let mut hi = estimate.saturating_add(SEARCH_MARGIN).min(latest_number);
    if timestamp_of(client, lo).await? > target {
        lo = 1;
    }
    if timestamp_of(client, hi).await? <= target {
        hi = latest_number;
    }
    // ts(lo) <= target < ts(hi)
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if timestamp_of(client, mid).await? <= target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

async fn timestamp_of<C>(client: &C, number: u64) -> Result<u64>
where
    C: EthClient + ?Sized,
{
    let header = client.header_by_number(Some(number)).await?;
    Ok(header.timestamp.as_u64())
}
