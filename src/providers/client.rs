//! Shared HTTP client for provider calls

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{CreditError, CreditResult};

const BASE_BACKOFF_MS: u64 = 200;

/// Thin reqwest wrapper that maps transport and status failures onto
/// `CreditError`. A timeout is an unknown outcome (`ProviderUnavailable`);
/// a refused connection never reached the provider (`ProviderUnreachable`).
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    api_key: Option<String>,
    max_retries: u32,
}

impl ProviderClient {
    pub fn new(timeout: Duration, api_key: Option<String>, max_retries: u32) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            max_retries: max_retries.max(1),
        }
    }

    pub fn from_config(config: &ProviderConfig, api_key: Option<String>) -> Self {
        Self::new(config.timeout, api_key, config.max_retries)
    }

    /// Single-shot POST. Never retried: the provider may have acted on it.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> CreditResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(url).json(body));
        Self::send(request).await
    }

    /// GET with bounded exponential backoff on retriable failures
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> CreditResult<T> {
        let mut attempt = 0;
        loop {
            let request = self.authorize(self.client.get(url));
            match Self::send(request).await {
                Err(e) if e.is_retriable() && attempt + 1 < self.max_retries => {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> CreditResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        Ok(response.json::<T>().await?)
    }
}

fn status_error(status: StatusCode, body: String) -> CreditError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        CreditError::ProviderUnavailable(format!("{}: {}", status, body))
    } else {
        CreditError::ProviderRejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

/// 200ms, 400ms, 800ms, ... capped at 5s
pub fn backoff(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(5));
    Duration::from_millis(ms.min(5_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff(0), Duration::from_millis(200));
        assert_eq!(backoff(1), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(1_600));
        assert_eq!(backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            CreditError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            CreditError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad bvn".into()),
            CreditError::ProviderRejected { status: 422, .. }
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Nothing listens on port 9 (discard) on loopback in test sandboxes
        let client = ProviderClient::new(Duration::from_millis(300), None, 1);
        let result: CreditResult<serde_json::Value> =
            client.get_json("http://127.0.0.1:9/unreachable").await;

        let err = result.unwrap_err();
        assert!(matches!(err, CreditError::ProviderUnreachable(_)));
        assert!(!err.is_outcome_unknown());
    }
}
