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

use ethers::providers::{HttpClientError, JsonRpcError, RetryPolicy};

use bridge_relayer_utils::probe;

/// Implements [RetryPolicy] for the HTTP transport, retrying requests that
/// were rate limited, either with status code 429 or with a JSON-RPC error
/// saying so.
///
/// Infura often fails with a `"header not found"` rpc error which is apparently linked to load
/// balancing, which are retried as well.
#[derive(Debug)]
pub struct HttpRetryPolicy {
    err_regex: regex::Regex,
}

impl HttpRetryPolicy {
    pub fn new() -> Self {
        Self {
            err_regex: regex::Regex::new(
                r"(?mixU)\b(?:rate|limit|429|Too \s Many \s Requests)\b",
            )
            .expect("Valid Regex"),
        }
    }

    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    /// Some providers answer with a body that is not JSON-RPC at all, the
    /// text is the only hint left.
    fn should_retry_text(&self, text: &str) -> bool {
        #[derive(serde::Deserialize)]
        struct Resp {
            error: JsonRpcError,
        }

        if let Ok(resp) = serde_json::from_str::<Resp>(text) {
            return should_retry_json_rpc_error(&resp.error);
        }

        let err_text = text.to_lowercase();
        let should_retry = self.err_regex.is_match(&err_text)
            || matches!(err_text.as_str(), "expected value at line 1 column 1");

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            should_retry = should_retry,
            error = %err_text,
        );
        should_retry
    }
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn should_retry_json_rpc_error(err: &JsonRpcError) -> bool {
    let JsonRpcError { code, message, .. } = err;
    // alchemy throws it this way
    if *code == 429 {
        return true;
    }

    // This is an infura error code for `exceeded project rate limit`
    if *code == -32005 {
        return true;
    }

    // alternative alchemy error for specific IPs
    if *code == -32016 && message.contains("rate limit") {
        return true;
    }

    matches!(
        message.as_str(),
        "header not found"
            | "daily request count exceeded, request rate limited"
    )
}

impl RetryPolicy<HttpClientError> for HttpRetryPolicy {
    fn should_retry(&self, error: &HttpClientError) -> bool {
        tracing::debug!("should_retry: {:?}", error);
        match error {
            HttpClientError::ReqwestError(err) => {
                err.status().map(|s| s.as_u16()) == Some(429)
            }
            HttpClientError::JsonRpcError(err) => {
                should_retry_json_rpc_error(err)
            }
            HttpClientError::SerdeJson { text, .. } => {
                self.should_retry_text(text)
            }
        }
    }

    fn backoff_hint(&self, error: &HttpClientError) -> Option<Duration> {
        const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

        if let HttpClientError::JsonRpcError(err) = error {
            // infura puts the requested backoff in the error data.
            let backoff_seconds = err
                .data
                .as_ref()
                .and_then(|data| data.get("rate"))
                .and_then(|v| v.get("backoff_seconds"));
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_u64()) {
                return Some(Duration::from_secs(seconds));
            }
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_f64()) {
                return Some(Duration::from_secs(seconds as u64 + 1));
            }
        }

        Some(DEFAULT_BACKOFF)
    }
}
