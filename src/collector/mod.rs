//! Paginated API collection façade.
//!
//! [`ApiCollector`] fetches every page of a remote resource through the
//! rate-limited [`ApiClient`] and stages each page's raw records in a
//! [`RawStore`] table, tagged with the run's parameter fingerprint. Page
//! fetching is concurrent; the strategy depends on what the API offers:
//!
//! - **single-shot** — no page size configured: one fetch, one persist;
//! - **known total** — a total-pages extractor is configured: page 1 is
//!   fetched first, the total read from its buffered body, and pages
//!   `2..=N` enqueued as independent fetches;
//! - **striped recursion** — the default for unknown totals: `concurrency`
//!   workers each walk pages spaced `concurrency` apart and stop when their
//!   stripe sees a short page.
//!
//! A driving [`InputSource`] turns one collector run into one pagination
//! pass per upstream record, throttled by the input rate limit.
//!
//! # Example
//!
//! ```no_run
//! use collector_core::client::{ApiClient, ApiClientConfig};
//! use collector_core::collector::{ApiCollector, ApiCollectorArgs, ResponseParser};
//! use collector_core::RawStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RawStore::open(std::path::Path::new("staging.db")).await?;
//! let client = ApiClient::new(ApiClientConfig::default());
//!
//! let mut args = ApiCollectorArgs::new(
//!     "issues",
//!     serde_json::json!({"source": 1, "board": 42}),
//!     "https://api.example.com/boards/{{ params.board }}/issues?page={{ pager.page }}&per_page={{ pager.size }}",
//!     store,
//!     client,
//!     ResponseParser::Array,
//! );
//! args.page_size = 50;
//! args.concurrency = 3;
//!
//! ApiCollector::new(args)?.execute().await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod input;
mod parser;

pub use context::{DEFAULT_PAGE_SIZE, Pager, RequestContext};
pub use error::CollectError;
pub use input::{InputSource, VecInput};
pub use parser::{ParserFn, ResponseParser};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::client::{ApiClient, ApiRequest, ApiResponse, ResponseHandler};
use crate::progress::{Progress, TOTAL_UNKNOWN};
use crate::raw::{NewRawRecord, RawStore, quote_table};
use crate::template::UrlTemplate;

/// Default cap on input-driven dispatches per second.
pub const DEFAULT_INPUT_RATE_LIMIT: u32 = 50;

/// Reads the total page count from the first page's response.
pub type TotalPagesFn = Arc<dyn Fn(&ApiResponse) -> anyhow::Result<usize> + Send + Sync>;

/// Produces extra query pairs for one request.
pub type QueryFn =
    Arc<dyn Fn(&RequestContext) -> anyhow::Result<Vec<(String, String)>> + Send + Sync>;

/// Produces extra headers for one request.
pub type HeaderFn = Arc<dyn Fn(&RequestContext) -> anyhow::Result<HeaderMap> + Send + Sync>;

/// Collector configuration.
///
/// Required collaborators are plain fields; everything else defaults via
/// [`ApiCollectorArgs::new`] and can be overridden before construction.
pub struct ApiCollectorArgs {
    /// Destination staging table; also names the URL template in errors.
    pub table: String,
    /// Opaque run parameters; their serialization is the fingerprint
    /// written into every row and used for the purge step.
    pub params: Value,
    /// Templated endpoint with `{{ pager.* }}`, `{{ params.* }}`, and
    /// `{{ input.* }}` slots.
    pub url_template: String,
    /// Staging-store handle.
    pub store: RawStore,
    /// Async dispatch and quiescence barrier.
    pub client: ApiClient,
    /// Maps each response to its opaque records.
    pub response_parser: ResponseParser,
    /// Records per page; 0 collects in a single shot.
    pub page_size: usize,
    /// Stripe count for unknown-total pagination; values below 1 act as 1.
    pub concurrency: usize,
    /// When true, previously staged rows for this fingerprint are kept.
    pub incremental: bool,
    /// Driving iterator: one pagination pass per record.
    pub input: Option<Box<dyn InputSource>>,
    /// Input-driven dispatches per second; 0 means the default of 50.
    pub input_rate_limit: u32,
    /// Enables the known-total strategy when present.
    pub get_total_pages: Option<TotalPagesFn>,
    /// Optional per-request query callback.
    pub query: Option<QueryFn>,
    /// Optional per-request header callback.
    pub header: Option<HeaderFn>,
}

impl ApiCollectorArgs {
    /// Bundles the required collaborators; optional fields start at their
    /// defaults (single-shot, non-incremental, no input).
    pub fn new(
        table: impl Into<String>,
        params: Value,
        url_template: impl Into<String>,
        store: RawStore,
        client: ApiClient,
        response_parser: ResponseParser,
    ) -> Self {
        Self {
            table: table.into(),
            params,
            url_template: url_template.into(),
            store,
            client,
            response_parser,
            page_size: 0,
            concurrency: 1,
            incremental: false,
            input: None,
            input_rate_limit: 0,
            get_total_pages: None,
            query: None,
            header: None,
        }
    }
}

/// Shared, read-only state reachable from completion handlers.
struct CollectorCore {
    table: String,
    fingerprint: String,
    params: Value,
    template: UrlTemplate,
    page_size: usize,
    concurrency: usize,
    get_total_pages: Option<TotalPagesFn>,
    query: Option<QueryFn>,
    header: Option<HeaderFn>,
    parser: ResponseParser,
    store: RawStore,
    client: ApiClient,
    progress: Arc<Progress>,
}

/// One collection run.
///
/// Construct with [`ApiCollector::new`], then consume with
/// [`execute`](Self::execute); a collector runs exactly once.
pub struct ApiCollector {
    core: Arc<CollectorCore>,
    input: Option<Box<dyn InputSource>>,
    input_rate_limit: u32,
    incremental: bool,
}

impl ApiCollector {
    /// Validates the configuration and compiles the URL template.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::EmptyUrlTemplate`], a template parse error,
    /// or an invalid-table error. All configuration problems fail here,
    /// before anything touches the network or the database.
    pub fn new(args: ApiCollectorArgs) -> Result<Self, CollectError> {
        if args.url_template.is_empty() {
            return Err(CollectError::EmptyUrlTemplate);
        }
        quote_table(&args.table)?;

        let template = UrlTemplate::compile(&args.table, &args.url_template)?;
        let fingerprint = serde_json::to_string(&args.params).map_err(CollectError::Params)?;

        let input_rate_limit = if args.input_rate_limit == 0 {
            DEFAULT_INPUT_RATE_LIMIT
        } else {
            args.input_rate_limit
        };

        Ok(Self {
            core: Arc::new(CollectorCore {
                table: args.table,
                fingerprint,
                params: args.params,
                template,
                page_size: args.page_size,
                concurrency: args.concurrency.max(1),
                get_total_pages: args.get_total_pages,
                query: args.query,
                header: args.header,
                parser: args.response_parser,
                store: args.store,
                client: args.client,
                progress: Arc::new(Progress::new()),
            }),
            input: args.input,
            input_rate_limit,
            incremental: args.incremental,
        })
    }

    /// Returns the run's progress counter for the embedding caller.
    #[must_use]
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.core.progress)
    }

    /// Returns the normalized stripe count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.core.concurrency
    }

    /// Returns the effective input rate limit.
    #[must_use]
    pub fn input_rate_limit(&self) -> u32 {
        self.input_rate_limit
    }

    /// Runs the collection: prepare the table, purge prior rows (unless
    /// incremental), dispatch all fetches, and block on the client's
    /// quiescence barrier.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch or iterator error observed by the input
    /// loop; otherwise the first HTTP or handler error surfaced by the
    /// barrier. In-flight fetches are never cancelled by a sibling's
    /// failure — the barrier always waits for natural completion.
    #[instrument(skip(self), fields(table = %self.core.table))]
    pub async fn execute(mut self) -> Result<(), CollectError> {
        info!("starting api collection");

        self.core.store.prepare(&self.core.table).await?;

        if !self.incremental {
            self.core
                .store
                .purge(&self.core.table, &self.core.fingerprint)
                .await?;
        }

        let loop_result = match self.input.take() {
            Some(source) => self.run_input_loop(source).await,
            None => CollectorCore::dispatch(&self.core, None),
        };

        let barrier_result = self.core.client.wait_async().await;

        info!("api collection finished");

        loop_result?;
        barrier_result.map_err(CollectError::from)
    }

    /// Pulls driving records lazily and runs one dispatch per record,
    /// paced below the input rate limit. Stops on the first error without
    /// cancelling fetches already in flight; the source is closed on every
    /// exit path.
    async fn run_input_loop(&self, mut source: Box<dyn InputSource>) -> Result<(), CollectError> {
        self.core.progress.set(0, TOTAL_UNKNOWN);

        let gap = Duration::from_secs_f64(1.0 / f64::from(self.input_rate_limit));
        let mut next_dispatch = Instant::now();
        let mut result = Ok(());

        loop {
            match source.next().await {
                Ok(Some(record)) => {
                    tokio::time::sleep_until(next_dispatch).await;
                    next_dispatch = Instant::now() + gap;

                    if let Err(error) = CollectorCore::dispatch(&self.core, Some(record)) {
                        result = Err(error);
                        break;
                    }
                }
                Ok(None) => break,
                Err(source_error) => {
                    result = Err(CollectError::input(source_error));
                    break;
                }
            }
        }

        source.close().await;
        result
    }
}

impl CollectorCore {
    /// One scheduler pass for one driving record (or none).
    fn dispatch(core: &Arc<Self>, input: Option<Value>) -> Result<(), CollectError> {
        if core.page_size > 0 {
            return Self::fetch_pages(core, input);
        }

        // Single shot: one fetch with the implicit default pager.
        let context = core.context(None, input.clone());
        core.fetch_async(context, Self::page_handler(core, input, false))
    }

    /// Fans out one pagination pass using the configured strategy.
    fn fetch_pages(core: &Arc<Self>, input: Option<Value>) -> Result<(), CollectError> {
        if let Some(get_total) = &core.get_total_pages {
            let context = core.context(Some(Pager::first(core.page_size)), input.clone());
            let handler = Self::first_page_handler(core, Arc::clone(get_total), input.clone());
            core.fetch_async(context, handler)?;
        } else {
            for stripe in 0..core.concurrency {
                let pager = Pager::stripe_start(stripe, core.page_size);
                let context = core.context(Some(pager), input.clone());
                let handler = Self::stripe_handler(core, pager, input.clone());
                core.fetch_async(context, handler)?;
            }
        }

        // Input-driven runs count driving records, not pages.
        if input.is_some() {
            core.progress.inc(1);
        }
        Ok(())
    }

    /// Handler for page 1 of a known-total run: read the total from the
    /// buffered body, persist page 1, then enqueue pages `2..=N`.
    fn first_page_handler(
        core: &Arc<Self>,
        get_total: TotalPagesFn,
        input: Option<Value>,
    ) -> ResponseHandler {
        let core = Arc::clone(core);
        Box::new(move |response| {
            Box::pin(async move {
                let total = get_total(&response)?;

                core.save_page(&response, input.as_ref()).await?;
                if input.is_none() {
                    core.progress
                        .set(1, i64::try_from(total).unwrap_or(i64::MAX));
                }

                debug!(total, "fanning out remaining pages");
                for page in 2..=total {
                    let pager = Pager::at(page, core.page_size);
                    let context = core.context(Some(pager), input.clone());
                    let handler = Self::page_handler(&core, input.clone(), input.is_none());
                    core.fetch_async(context, handler)?;
                }
                Ok(())
            })
        })
    }

    /// Handler that persists one page and optionally ticks the progress
    /// counter.
    fn page_handler(core: &Arc<Self>, input: Option<Value>, count_progress: bool) -> ResponseHandler {
        let core = Arc::clone(core);
        Box::new(move |response| {
            Box::pin(async move {
                core.save_page(&response, input.as_ref()).await?;
                if count_progress {
                    core.progress.inc(1);
                }
                Ok(())
            })
        })
    }

    /// Handler for one page on a stripe: persist, then either stop (short
    /// page) or enqueue the next page `concurrency` steps ahead.
    fn stripe_handler(core: &Arc<Self>, pager: Pager, input: Option<Value>) -> ResponseHandler {
        let core = Arc::clone(core);
        Box::new(move |response| {
            Box::pin(async move {
                let count = core.save_page(&response, input.as_ref()).await?;

                if count < core.page_size {
                    debug!(page = pager.page, count, "short page ends stripe");
                    return Ok(());
                }

                let next = pager.next_on_stripe(core.concurrency);
                let context = core.context(Some(next), input.clone());
                let handler = Self::stripe_handler(&core, next, input);
                core.fetch_async(context, handler)?;
                Ok(())
            })
        })
    }

    fn context(&self, pager: Option<Pager>, input: Option<Value>) -> RequestContext {
        RequestContext {
            pager,
            params: self.params.clone(),
            input,
        }
    }

    /// Renders the URL, runs the query/header callbacks, and hands the
    /// request to the client. Returns immediately; the handler runs when
    /// the client completes the request.
    fn fetch_async(
        &self,
        mut context: RequestContext,
        handler: ResponseHandler,
    ) -> Result<(), CollectError> {
        if context.pager.is_none() {
            context.pager = Some(Pager::single_shot());
        }

        let url = self.template.render(&context)?;
        let mut request = ApiRequest::new(url);

        if let Some(query) = &self.query {
            request.query = query(&context).map_err(|e| CollectError::callback("query", e))?;
        }
        if let Some(header) = &self.header {
            request.headers = header(&context).map_err(|e| CollectError::callback("header", e))?;
        }

        self.client.get_async(request, handler);
        Ok(())
    }

    /// Parses a response and stages its records as one batch. Returns the
    /// number of records the parser produced (zero stages nothing).
    async fn save_page(&self, response: &ApiResponse, input: Option<&Value>) -> anyhow::Result<usize> {
        let records = self.parser.parse(response)?;
        if records.is_empty() {
            debug!(url = %response.url(), "empty page");
            return Ok(0);
        }

        let input_json = match input {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        let rows: Vec<NewRawRecord<'_>> = records
            .iter()
            .map(|record| NewRawRecord {
                params: &self.fingerprint,
                data: record.get(),
                url: response.url(),
                input: input_json.as_deref(),
            })
            .collect();

        self.store.insert_batch(&self.table, &rows).await?;
        debug!(url = %response.url(), count = rows.len(), "staged page");
        Ok(records.len())
    }
}
