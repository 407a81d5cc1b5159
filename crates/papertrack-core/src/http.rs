//! Shared HTTP client and runtime.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a blocking interface for rayon workers.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;

use crate::error::{parse_retry_after, StageError};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Download stall window (no body bytes for this long = stall)
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are clipped to this many chars in messages
const ERROR_BODY_LIMIT: usize = 200;

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .user_agent(concat!("papertrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Drive a future to completion on the shared runtime.
///
/// Must not be called from inside the runtime itself.
pub fn block_on<F: Future>(future: F) -> F::Output {
    SHARED_RUNTIME.handle().block_on(future)
}

/// Pass successful responses through; classify everything else by status.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
    Err(StageError::from_status(
        status.as_u16(),
        retry_after,
        format!("HTTP {}: {snippet}", status.as_u16()),
    ))
}

/// Send a request and read the body as text.
pub fn fetch_text(request: reqwest::RequestBuilder) -> Result<String, StageError> {
    block_on(async {
        let response = request.send().await.map_err(StageError::from_reqwest)?;
        let response = check_status(response).await?;
        response.text().await.map_err(StageError::from_reqwest)
    })
}

/// GET `url` into memory, failing with `timeout` if the body stalls for `stall`.
pub fn download(url: &str, stall: Duration) -> Result<Vec<u8>, StageError> {
    block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .send()
            .await
            .map_err(StageError::from_reqwest)?;
        let response = check_status(response).await?;

        let hint = response.content_length().unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let mut body = Vec::with_capacity(hint);
        let mut stream = response.bytes_stream();
        loop {
            match tokio::time::timeout(stall, stream.next()).await {
                Ok(Some(Ok(chunk))) => body.extend_from_slice(&chunk),
                Ok(Some(Err(e))) => return Err(StageError::from_reqwest(e)),
                Ok(None) => break,
                Err(_) => {
                    return Err(StageError::timeout(format!(
                        "download stalled ({}s with no data)",
                        stall.as_secs()
                    )))
                }
            }
        }
        Ok(body)
    })
}
