use std::{future::Future, pin::pin, time::Duration};

use futures::future::{select, Either};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("response from {url} is not valid utf-8")]
    Encoding { url: String },
    #[error("request to {url} timed out after {millis} ms")]
    Timeout { url: String, millis: u64 },
}

/// Source of remote assets. One attempt per call, no retries.
pub trait AssetFetcher {
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>>;

    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> {
        async move {
            let bytes = self.fetch_bytes(url).await?;
            String::from_utf8(bytes).map_err(|_| FetchError::Encoding {
                url: url.to_string(),
            })
        }
    }

    /// Resolves once `duration` has elapsed. Fetchers without a timer never
    /// resolve, so their requests are never timed out.
    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> {
        futures::future::pending()
    }
}

/// Races `request` against the fetcher's timer. With no timeout the request is
/// awaited as is.
pub async fn with_timeout<F, T>(
    fetcher: &F,
    url: &str,
    timeout: Option<Duration>,
    request: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError>
where
    F: AssetFetcher,
{
    let Some(timeout) = timeout else {
        return request.await;
    };

    let request = pin!(request);
    let delay = pin!(fetcher.sleep(timeout));
    match select(request, delay).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(FetchError::Timeout {
            url: url.to_string(),
            millis: timeout.as_millis() as u64,
        }),
    }
}

impl AssetFetcher for reqwest::Client {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let resp = self.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}
