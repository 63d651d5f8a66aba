//! The trait user crawlers implement.

use async_trait::async_trait;
use tracing::debug;

use super::meta::SpiderMeta;
use super::task::{Task, TaskFailure, TaskResult};

/// Error returned by a task handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler has no branch for this task name.
    #[error("no handler for task {name:?}")]
    UnknownTask {
        /// Task name.
        name: String,
    },

    /// The document could not be used.
    #[error("handler for task {name:?} failed: {message}")]
    Failed {
        /// Task name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// A library call inside the handler failed.
    #[error(transparent)]
    Grab(#[from] crate::error::GrabError),
}

impl HandlerError {
    /// Creates a [`HandlerError::Failed`].
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A crawler run by the [`Engine`](super::Engine).
///
/// Tasks come from [`initial_urls`](Self::initial_urls) (named `initial`)
/// and [`task_generator`](Self::task_generator); handlers return follow-up
/// tasks. Handlers run concurrently, so spider state needs interior
/// mutability.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    /// Metadata of this spider type. Concrete by default.
    fn meta(&self) -> SpiderMeta {
        SpiderMeta::default()
    }

    /// URLs queued as `initial` tasks when the run starts.
    fn initial_urls(&self) -> Vec<String> {
        Vec::new()
    }

    /// Tasks queued when the run starts, after the initial URLs.
    fn task_generator(&self) -> Vec<Task> {
        Vec::new()
    }

    /// Handles a finished task and returns the tasks it spawns.
    ///
    /// Raw tasks also land here when they fail; see [`TaskResult`].
    async fn handle(&self, task: &Task, result: TaskResult) -> Result<Vec<Task>, HandlerError>;

    /// Called once when a non-raw task is given up.
    async fn task_failed(&self, task: &Task, failure: &TaskFailure) {
        debug!(task = %task.name, url = %task.url, counter = %failure.counter_key(), "task given up");
    }

    /// Called when [`handle`](Self::handle) returns an error.
    async fn handler_failed(&self, task: &Task, error: &HandlerError) {
        debug!(task = %task.name, url = %task.url, error = %error, "handler failed");
    }
}

/// The abstract base spider. Its metadata is abstract, so the engine refuses
/// to run it.
#[derive(Debug, Default)]
pub struct BaseSpider;

#[async_trait]
impl Spider for BaseSpider {
    fn meta(&self) -> SpiderMeta {
        SpiderMeta::base()
    }

    async fn handle(&self, task: &Task, _result: TaskResult) -> Result<Vec<Task>, HandlerError> {
        Err(HandlerError::UnknownTask {
            name: task.name.clone(),
        })
    }
}
