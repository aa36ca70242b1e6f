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

/// Services are enabled unless switched off.
pub const fn enabled() -> bool {
    true
}
/// Blocks scanned per filter request.
pub const fn block_batch_size() -> u64 {
    100
}
/// Events handled concurrently within a batch.
pub const fn num_workers() -> usize {
    10
}
/// Seconds to wait before re-establishing a dropped subscription.
pub const fn subscription_backoff() -> u64 {
    3
}
/// Resubscriptions attempted in a row before the indexer gives up.
pub const fn max_resubscribe_attempts() -> usize {
    10
}
/// Seconds between retries of a failed control-plane RPC call.
pub const fn rpc_retry_interval() -> u64 {
    2
}
/// Retries of a failed control-plane RPC call.
pub const fn rpc_max_retries() -> usize {
    5
}
/// Source blocks required on top of the event block.
pub const fn confirmations() -> u64 {
    3
}
/// Seconds the processor waits for confirmations.
pub const fn confirmation_timeout() -> u64 {
    360
}
/// Seconds between two polls of the destination header syncer.
pub const fn header_sync_interval() -> u64 {
    10
}
/// Seconds the processor waits for the destination receipt.
pub const fn receipt_timeout() -> u64 {
    240
}
/// Requeues of a message before it is dropped.
pub const fn max_message_retries() -> u32 {
    5
}
/// Milliseconds between two polls of an empty queue.
pub const fn queue_poll_interval() -> u64 {
    500
}
