//! Crawling core: tasks, retries and the concurrent engine that runs them.
//!
//! A [`Spider`] supplies the starting tasks and handles fetched documents.
//! The [`Engine`] schedules tasks by priority, retries timeouts and
//! connection faults up to the network try limit, and records every
//! terminal failure in [`SpiderStats`] under `error:<slug>`.

mod base;
mod engine;
mod meta;
mod retry;
pub mod stats;
mod task;

pub use base::{BaseSpider, HandlerError, Spider};
pub use engine::{DEFAULT_TASK_TRY_LIMIT, DEFAULT_THREAD_NUMBER, Engine, EngineError, SpiderConfig};
pub use meta::SpiderMeta;
pub use retry::{DEFAULT_NETWORK_TRY_LIMIT, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use stats::{SpiderStats, format_traffic_value};
pub use task::{DEFAULT_PRIORITY, INITIAL_TASK_NAME, Task, TaskFailure, TaskResult};
