//! Rate-limited asynchronous API client.
//!
//! The client is the worker pool of a collection run: every fetch is handed
//! over with [`ApiClient::get_async`], which returns immediately and runs
//! the request plus its completion handler on a spawned task, gated by a
//! semaphore (bounded parallelism) and the request pacer. A run then blocks
//! on [`ApiClient::wait_async`] until every dispatched fetch — including
//! fetches the handlers themselves enqueued — has completed.
//!
//! Response bodies are buffered in full before the handler runs, so a
//! handler can both probe the body (e.g. read a total-page count) and parse
//! it without coordinating over a one-shot reader.
//!
//! # Example
//!
//! ```no_run
//! use collector_core::client::{ApiClient, ApiClientConfig, ApiRequest, ResponseHandler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ApiClientConfig::default());
//! let handler: ResponseHandler = Box::new(|response| {
//!     Box::pin(async move {
//!         println!("{} bytes from {}", response.body().len(), response.url());
//!         Ok(())
//!     })
//! });
//! client.get_async(ApiRequest::new("https://api.example.com/v1/things"), handler);
//! client.wait_async().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod rate_limiter;

pub use error::ClientError;
pub use rate_limiter::RateLimiter;

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

/// Default bound on concurrently executing fetches.
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Default request pacing, in requests per second.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 20;

/// Default connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout in seconds.
const READ_TIMEOUT_SECS: u64 = 60;

/// Client construction parameters.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Maximum number of fetches executing at once; values below 1 are
    /// treated as 1.
    pub max_parallel: usize,
    /// Request pacing cap; 0 disables pacing.
    pub requests_per_second: u32,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// One GET request handed to the client.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// The rendered endpoint URL.
    pub url: String,
    /// Extra query pairs appended to the URL.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: HeaderMap,
}

impl ApiRequest {
    /// Creates a request with no extra query pairs or headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }
}

/// A fully buffered HTTP response, as delivered to completion handlers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    /// Assembles a response. Public so custom parsers can be unit-tested
    /// without a live server.
    #[must_use]
    pub fn new(url: impl Into<String>, status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            headers,
            body,
        }
    }

    /// The URL the response was fetched from, including the query string.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered response body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the body does not match.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Completion handler for one fetch. Runs on the fetch's worker task; may
/// itself call [`ApiClient::get_async`] to enqueue follow-up fetches.
pub type ResponseHandler =
    Box<dyn FnOnce(ApiResponse) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct ClientInner {
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    limiter: RateLimiter,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    errors: StdMutex<Vec<ClientError>>,
}

/// Rate-limited async API client.
///
/// Cheap to clone; all clones share the same worker bound, pacer, task set,
/// and error channel.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeout
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    #[instrument(skip(config), fields(max_parallel = config.max_parallel, rps = config.requests_per_second))]
    pub fn new(config: ApiClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");

        let max_parallel = config.max_parallel.max(1);
        debug!(max_parallel, "creating api client");

        Self {
            inner: Arc::new(ClientInner {
                http,
                semaphore: Arc::new(Semaphore::new(max_parallel)),
                limiter: RateLimiter::per_second(config.requests_per_second),
                tasks: StdMutex::new(Vec::new()),
                errors: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Dispatches a fetch and returns immediately.
    ///
    /// The request runs on a spawned task once a worker slot and a pacing
    /// slot are available. A 2xx response is buffered and passed to
    /// `handler`; a transport failure, non-2xx status, or handler error is
    /// recorded and surfaced by the next [`wait_async`](Self::wait_async).
    pub fn get_async(&self, request: ApiRequest, handler: ResponseHandler) {
        let inner = Arc::clone(&self.inner);
        let url = request.url.clone();

        let handle = tokio::spawn(async move {
            if let Err(error) = run_fetch(&inner, request, handler).await {
                warn!(url = %url, error = %error, "fetch failed");
                lock(&inner.errors).push(error);
            }
        });

        lock(&self.inner.tasks).push(handle);
    }

    /// Quiescence barrier: waits until no dispatched fetch remains in
    /// flight, then reports the first error recorded during the run.
    ///
    /// Handlers may enqueue further fetches while the barrier is draining;
    /// those are awaited too. The recorded error list is cleared once the
    /// barrier returns.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClientError`] recorded by any fetch or handler.
    #[instrument(skip(self))]
    pub async fn wait_async(&self) -> Result<(), ClientError> {
        loop {
            let batch: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(error) = handle.await {
                    warn!(error = %error, "fetch task panicked");
                }
            }
        }

        let first = {
            let mut errors = lock(&self.inner.errors);
            let first = if errors.is_empty() {
                None
            } else {
                Some(errors.remove(0))
            };
            errors.clear();
            first
        };

        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_fetch(
    inner: &ClientInner,
    request: ApiRequest,
    handler: ResponseHandler,
) -> Result<(), ClientError> {
    let ApiRequest {
        url,
        query,
        headers,
    } = request;

    // Held for the request and its handler, bounding total work in flight.
    let _permit = inner
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ClientError::shutdown(&url))?;

    Url::parse(&url).map_err(|_| ClientError::invalid_url(&url))?;

    inner.limiter.acquire().await;

    let mut builder = inner.http.get(&url);
    if !query.is_empty() {
        builder = builder.query(&query);
    }
    if !headers.is_empty() {
        builder = builder.headers(headers);
    }

    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            ClientError::timeout(&url)
        } else {
            ClientError::network(&url, e)
        }
    })?;

    // The final URL (after query assembly and redirects) is what provenance
    // records; it must match what the server actually served.
    let final_url = response.url().to_string();
    let status = response.status();

    if !status.is_success() {
        return Err(ClientError::http_status(final_url, status.as_u16()));
    }

    let response_headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::network(final_url.clone(), e))?
        .to_vec();

    debug!(url = %final_url, bytes = body.len(), "fetched");

    let api_response = ApiResponse::new(final_url.clone(), status, response_headers, body);
    handler(api_response)
        .await
        .map_err(|source| ClientError::handler(final_url, source))
}
