//! Spider engine: a priority queue of tasks run by a bounded worker pool.
//!
//! Each task attempt runs in its own Tokio task with its own session, so no
//! request or document state is shared between attempts. Failed attempts go
//! back to the queue until the network try limit; a task given up is counted
//! as `error:<slug>` and reported to the spider.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use grabkit::spider::{Engine, HandlerError, Spider, SpiderConfig, Task, TaskResult};
//!
//! struct Titles;
//!
//! #[async_trait]
//! impl Spider for Titles {
//!     fn initial_urls(&self) -> Vec<String> {
//!         vec!["https://example.com/".to_string()]
//!     }
//!
//!     async fn handle(&self, task: &Task, result: TaskResult) -> Result<Vec<Task>, HandlerError> {
//!         if let Some(document) = result.document {
//!             println!("{} -> {}", task.url, document.status_code);
//!         }
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(SpiderConfig::default().with_thread_number(4))?;
//! let stats = engine.run(Arc::new(Titles)).await?;
//! print!("{}", stats.render());
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::base::Spider;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::stats::{
    DOWNLOAD_SIZE, HANDLER_ERROR, NETWORK_RETRY, REQUEST_NETWORK, REQUEST_OK, SpiderStats,
    TASK_COUNT_REJECTED,
};
use super::task::{INITIAL_TASK_NAME, Task, TaskFailure, TaskResult};
use crate::config::RequestConfig;
use crate::document::Document;
use crate::error::GrabError;
use crate::session::Session;
use crate::transport::{HttpTransport, TransportConfig};

/// Minimum allowed number of workers.
const MIN_THREAD_NUMBER: usize = 1;

/// Maximum allowed number of workers.
const MAX_THREAD_NUMBER: usize = 100;

/// Default number of workers.
pub const DEFAULT_THREAD_NUMBER: usize = 10;

/// Default limit of handler-driven retries per task.
pub const DEFAULT_TASK_TRY_LIMIT: u32 = 5;

/// Error type for engine operations.
///
/// Failures of individual tasks never end up here; they are counted and
/// reported to the spider.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count.
    #[error(
        "invalid thread number {value}: must be between {MIN_THREAD_NUMBER} and {MAX_THREAD_NUMBER}"
    )]
    InvalidThreadNumber {
        /// The rejected value.
        value: usize,
    },

    /// The spider is abstract and cannot be run.
    #[error("spider is abstract and cannot be run")]
    AbstractSpider,

    /// The shared transport could not be built.
    #[error("cannot build transport: {0}")]
    Transport(#[from] GrabError),

    /// The worker semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct SpiderConfig {
    /// Number of concurrent task attempts.
    pub thread_number: usize,
    /// Network retry limit and backoff.
    pub retry_policy: RetryPolicy,
    /// Maximum `task_try_count` a queued task may have.
    pub task_try_limit: u32,
    /// Request options for tasks without their own configuration.
    pub request: RequestConfig,
    /// Settings of the shared transport.
    pub transport: TransportConfig,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            thread_number: DEFAULT_THREAD_NUMBER,
            retry_policy: RetryPolicy::default(),
            task_try_limit: DEFAULT_TASK_TRY_LIMIT,
            request: RequestConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl SpiderConfig {
    /// Sets the number of workers.
    #[must_use]
    pub fn with_thread_number(mut self, thread_number: usize) -> Self {
        self.thread_number = thread_number;
        self
    }

    /// Sets the number of network attempts per task.
    #[must_use]
    pub fn with_network_try_limit(mut self, limit: u32) -> Self {
        self.retry_policy = RetryPolicy::with_max_attempts(limit);
        self
    }

    /// Enables exponential backoff between network attempts.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.retry_policy = self.retry_policy.with_backoff(base_delay, max_delay);
        self
    }

    /// Sets the handler-driven retry limit.
    #[must_use]
    pub fn with_task_try_limit(mut self, limit: u32) -> Self {
        self.task_try_limit = limit;
        self
    }

    /// Sets the base request configuration.
    #[must_use]
    pub fn with_request_config(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }
}

/// Runs spiders.
#[derive(Debug)]
pub struct Engine {
    config: SpiderConfig,
    transport: Arc<HttpTransport>,
    semaphore: Arc<Semaphore>,
}

/// State shared by every worker of a run.
struct WorkerContext<S> {
    spider: Arc<S>,
    transport: Arc<HttpTransport>,
    request: RequestConfig,
    retry_policy: RetryPolicy,
    stats: Arc<SpiderStats>,
}

impl Engine {
    /// Creates an engine with its own transport.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidThreadNumber`] outside 1-100 and
    /// [`EngineError::Transport`] if the transport cannot be built.
    pub fn new(config: SpiderConfig) -> Result<Self, EngineError> {
        let transport = Arc::new(HttpTransport::with_config(config.transport.clone())?);
        Self::with_transport(config, transport)
    }

    /// Creates an engine over an existing transport.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidThreadNumber`] outside 1-100.
    #[instrument(level = "debug", skip(transport))]
    pub fn with_transport(
        config: SpiderConfig,
        transport: Arc<HttpTransport>,
    ) -> Result<Self, EngineError> {
        if !(MIN_THREAD_NUMBER..=MAX_THREAD_NUMBER).contains(&config.thread_number) {
            return Err(EngineError::InvalidThreadNumber {
                value: config.thread_number,
            });
        }
        debug!(
            thread_number = config.thread_number,
            network_try_limit = config.retry_policy.max_attempts(),
            task_try_limit = config.task_try_limit,
            "creating spider engine"
        );
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.thread_number)),
            config,
            transport,
        })
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Runs `spider` until no task is left and returns the run statistics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AbstractSpider`] for abstract spiders and
    /// [`EngineError::SemaphoreClosed`] if the worker pool breaks. Task
    /// failures do not fail the run.
    #[instrument(skip(self, spider), fields(thread_number = self.config.thread_number))]
    pub async fn run<S: Spider>(&self, spider: Arc<S>) -> Result<Arc<SpiderStats>, EngineError> {
        if spider.meta().is_abstract {
            return Err(EngineError::AbstractSpider);
        }

        let context = Arc::new(WorkerContext {
            spider: Arc::clone(&spider),
            transport: Arc::clone(&self.transport),
            request: self.config.request.clone(),
            retry_policy: self.config.retry_policy.clone(),
            stats: Arc::new(SpiderStats::new()),
        });

        let mut queue = TaskQueue::default();
        for url in spider.initial_urls() {
            self.enqueue(&mut queue, &context.stats, Task::new(INITIAL_TASK_NAME, url));
        }
        for task in spider.task_generator() {
            self.enqueue(&mut queue, &context.stats, task);
        }

        info!(queued = queue.len(), "starting spider");
        let mut workers = JoinSet::new();
        loop {
            while let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                let Some(task) = queue.pop() else {
                    break;
                };
                let context = Arc::clone(&context);
                workers.spawn(async move {
                    let _permit = permit;
                    run_attempt(&context, task).await
                });
            }

            let Some(joined) = workers.join_next().await else {
                if queue.is_empty() {
                    break;
                }
                // Permits are only released by finished workers.
                let permit = Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::SemaphoreClosed)?;
                drop(permit);
                continue;
            };
            match joined {
                Ok(follow_ups) => {
                    for task in follow_ups {
                        self.enqueue(&mut queue, &context.stats, task);
                    }
                }
                Err(e) => warn!(error = %e, "task worker panicked"),
            }
        }

        let stats = Arc::clone(&context.stats);
        info!(
            requests = stats.get(REQUEST_NETWORK),
            ok = stats.get(REQUEST_OK),
            retries = stats.get(NETWORK_RETRY),
            "spider finished"
        );
        Ok(stats)
    }

    fn enqueue(&self, queue: &mut TaskQueue, stats: &SpiderStats, task: Task) {
        if task.task_try_count > self.config.task_try_limit {
            debug!(task = %task.name, url = %task.url, tries = task.task_try_count, "task try limit reached");
            stats.inc(TASK_COUNT_REJECTED);
            return;
        }
        queue.push(task);
    }
}

/// Performs one network attempt of `task` and returns the tasks to queue
/// next: the task itself on retry, or whatever its handler spawned.
#[instrument(skip(context, task), fields(task = %task.name, url = %task.url))]
async fn run_attempt<S: Spider>(context: &WorkerContext<S>, mut task: Task) -> Vec<Task> {
    task.network_try_count += 1;
    context.stats.inc(REQUEST_NETWORK);

    let mut session = Session::with_config(
        Arc::clone(&context.transport),
        task.request_config(&context.request),
    );
    let (failure_type, failure) = match session.request().await {
        Ok(document) if task.is_valid_status(document.status_code) => {
            context.stats.inc(REQUEST_OK);
            context.stats.inc_by(DOWNLOAD_SIZE, body_size(&document));
            return call_handler(context, &task, TaskResult::success(document)).await;
        }
        Ok(document) => (FailureType::Transient, TaskFailure::InvalidStatus(document)),
        Err(e) => (classify_error(&e), TaskFailure::Network(e)),
    };

    match context
        .retry_policy
        .should_retry(failure_type, task.network_try_count)
    {
        RetryDecision::Retry { delay, attempt } => {
            debug!(attempt, delay_ms = delay.as_millis(), counter = %failure.counter_key(), "retrying task");
            discard_body(&failure);
            context.stats.inc(NETWORK_RETRY);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            vec![task]
        }
        RetryDecision::DoNotRetry { reason } => {
            let counter = failure.counter_key();
            warn!(%reason, %counter, attempts = task.network_try_count, "task failed");
            context.stats.inc(&counter);
            if task.raw {
                let result = match failure {
                    TaskFailure::Network(e) => TaskResult::failure(e),
                    TaskFailure::InvalidStatus(document) => TaskResult {
                        document: Some(document),
                        exception: None,
                    },
                };
                return call_handler(context, &task, result).await;
            }
            context.spider.task_failed(&task, &failure).await;
            Vec::new()
        }
    }
}

async fn call_handler<S: Spider>(
    context: &WorkerContext<S>,
    task: &Task,
    result: TaskResult,
) -> Vec<Task> {
    match context.spider.handle(task, result).await {
        Ok(follow_ups) => follow_ups,
        Err(e) => {
            warn!(error = %e, "task handler failed");
            context.stats.inc(HANDLER_ERROR);
            context.spider.handler_failed(task, &e).await;
            Vec::new()
        }
    }
}

fn body_size(document: &Document) -> u64 {
    match (document.body_in_memory(), &document.body_path) {
        (Some(body), _) => body.len() as u64,
        (None, Some(path)) => std::fs::metadata(path).map_or(0, |meta| meta.len()),
        (None, None) => 0,
    }
}

/// Removes the body file of a response that is about to be retried.
fn discard_body(failure: &TaskFailure) {
    if let TaskFailure::InvalidStatus(document) = failure {
        if let Some(path) = &document.body_path {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "could not remove body file");
            }
        }
    }
}

/// A queued task with its scheduling key.
#[derive(Debug)]
struct QueuedTask {
    priority: u32,
    sequence: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Reversed: the max-heap pops the lowest priority, then the oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue, FIFO among equal priorities.
#[derive(Debug, Default)]
struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_sequence: u64,
}

impl TaskQueue {
    fn push(&mut self, task: Task) {
        self.heap.push(QueuedTask {
            priority: task.priority,
            sequence: self.next_sequence,
            task,
        });
        self.next_sequence += 1;
    }

    fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|queued| queued.task)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::spider::base::{BaseSpider, HandlerError};
    use crate::spider::meta::SpiderMeta;

    #[test]
    fn test_engine_valid_thread_number() {
        for value in [1, DEFAULT_THREAD_NUMBER, 100] {
            let engine = Engine::new(SpiderConfig::default().with_thread_number(value)).unwrap();
            assert_eq!(engine.config().thread_number, value);
        }
    }

    #[test]
    fn test_engine_invalid_thread_number() {
        for value in [0, 101] {
            let result = Engine::new(SpiderConfig::default().with_thread_number(value));
            assert!(matches!(
                result,
                Err(EngineError::InvalidThreadNumber { value: v }) if v == value
            ));
        }
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidThreadNumber { value: 0 }.to_string();
        assert!(msg.contains("invalid thread number"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_config_builders() {
        let config = SpiderConfig::default()
            .with_network_try_limit(1)
            .with_task_try_limit(2)
            .with_backoff(Duration::from_millis(10), Duration::from_millis(20));
        assert_eq!(config.retry_policy.max_attempts(), 1);
        assert_eq!(config.task_try_limit, 2);
    }

    #[test]
    fn test_queue_orders_by_priority_then_fifo() {
        let mut queue = TaskQueue::default();
        queue.push(Task::new("a", "http://a/").with_priority(5));
        queue.push(Task::new("b", "http://b/").with_priority(1));
        queue.push(Task::new("c", "http://c/").with_priority(5));
        queue.push(Task::new("d", "http://d/").with_priority(1));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop()).map(|t| t.name).collect();
        assert_eq!(order, ["b", "d", "a", "c"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_abstract_spider_is_refused() {
        let engine = Engine::new(SpiderConfig::default()).unwrap();
        let result = engine.run(Arc::new(BaseSpider)).await;
        assert!(matches!(result, Err(EngineError::AbstractSpider)));
    }

    struct Recorder {
        failures: Mutex<Vec<String>>,
        exceptions: Mutex<Vec<String>>,
        tasks: Vec<Task>,
    }

    #[async_trait]
    impl Spider for Recorder {
        fn meta(&self) -> SpiderMeta {
            SpiderMeta::base().inherit()
        }

        fn task_generator(&self) -> Vec<Task> {
            self.tasks.clone()
        }

        async fn handle(&self, _task: &Task, result: TaskResult) -> Result<Vec<Task>, HandlerError> {
            if let Some(e) = result.exception {
                self.exceptions.lock().unwrap().push(e.name().to_string());
            }
            Ok(Vec::new())
        }

        async fn task_failed(&self, _task: &Task, failure: &TaskFailure) {
            self.failures.lock().unwrap().push(failure.counter_key());
        }
    }

    fn recorder(tasks: Vec<Task>) -> Arc<Recorder> {
        Arc::new(Recorder {
            failures: Mutex::new(Vec::new()),
            exceptions: Mutex::new(Vec::new()),
            tasks,
        })
    }

    const INVALID_URL: &str = "http://13354&altProductId=6423589&productId=6423589\
        &altProductStoreId=13713&catalogId=10001\
        &categoryId=28678&productStoreId=13713\
        http://www.textbooksnow.com/webapp/wcs/stores\
        /servlet/ProductDisplay?langId=-1&storeId=";

    #[tokio::test]
    async fn test_invalid_url_is_counted_and_run_continues() {
        let engine = Engine::new(SpiderConfig::default()).unwrap();
        let spider = recorder(vec![
            Task::new("page", INVALID_URL),
            Task::new("page", "not a url"),
        ]);
        let stats = engine.run(Arc::clone(&spider)).await.unwrap();

        assert_eq!(stats.get("error:invalid-url"), 2);
        assert_eq!(stats.get(NETWORK_RETRY), 0);
        assert_eq!(spider.failures.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_raw_task_receives_exception() {
        let engine = Engine::new(SpiderConfig::default()).unwrap();
        let spider = recorder(vec![Task::new("page", INVALID_URL).raw()]);
        engine.run(Arc::clone(&spider)).await.unwrap();

        assert_eq!(*spider.exceptions.lock().unwrap(), ["InvalidUrl"]);
        assert!(spider.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_try_limit_rejects() {
        let engine = Engine::new(SpiderConfig::default().with_task_try_limit(1)).unwrap();
        let mut task = Task::new("page", "http://example.invalid/");
        task.task_try_count = 2;
        let spider = recorder(vec![task]);
        let stats = engine.run(spider).await.unwrap();

        assert_eq!(stats.get(TASK_COUNT_REJECTED), 1);
        assert_eq!(stats.get(REQUEST_NETWORK), 0);
    }
}
