//! Tasks: units of scheduled work, and what their handlers receive.

use std::collections::BTreeMap;

use crate::config::RequestConfig;
use crate::document::Document;
use crate::error::GrabError;

/// Priority given to tasks that do not set one. Lower runs first.
pub const DEFAULT_PRIORITY: u32 = 100;

/// Name of the tasks built from [`Spider::initial_urls`](super::Spider::initial_urls).
pub const INITIAL_TASK_NAME: &str = "initial";

/// One logical fetch, possibly spanning several network attempts.
#[derive(Debug, Clone)]
pub struct Task {
    /// Handler name, passed back to [`Spider::handle`](super::Spider::handle).
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Scheduling priority, lower first.
    pub priority: u32,
    /// Call the handler even when the task failed.
    pub raw: bool,
    /// Extra statuses accepted besides `< 400` and 404.
    pub valid_status: Vec<u16>,
    /// Network attempts made so far.
    pub network_try_count: u32,
    /// Times the task was re-queued by a handler, starting at 1.
    pub task_try_count: u32,
    /// Request options overriding the engine's base configuration.
    pub config: Option<RequestConfig>,
    /// Free-form data carried to the handler.
    pub meta: BTreeMap<String, String>,
}

impl Task {
    /// Creates a task for `url` handled by `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority: DEFAULT_PRIORITY,
            raw: false,
            valid_status: Vec::new(),
            network_try_count: 0,
            task_try_count: 1,
            config: None,
            meta: BTreeMap::new(),
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the task raw: its handler also sees failures.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Accepts `status` as a valid response.
    #[must_use]
    pub fn with_valid_status(mut self, status: u16) -> Self {
        self.valid_status.push(status);
        self
    }

    /// Uses `config` for this task. Its `url` is replaced by the task URL.
    #[must_use]
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Attaches a free-form value.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Copy of this task for a handler-driven retry.
    ///
    /// The task try count goes up and the network try count starts over.
    #[must_use]
    pub fn clone_for_retry(&self) -> Self {
        Self {
            network_try_count: 0,
            task_try_count: self.task_try_count + 1,
            ..self.clone()
        }
    }

    /// Whether a response with `status` is handed to the handler as success.
    #[must_use]
    pub fn is_valid_status(&self, status: u16) -> bool {
        status < 400 || status == 404 || self.valid_status.contains(&status)
    }

    /// Request configuration for the next attempt.
    #[must_use]
    pub(crate) fn request_config(&self, base: &RequestConfig) -> RequestConfig {
        let mut config = self.config.clone().unwrap_or_else(|| base.clone());
        config.url = Some(self.url.clone());
        config
    }
}

/// What a handler receives for one task.
///
/// For a successful task `document` is set and `exception` is empty. A raw
/// task that failed on the network carries the error in `exception`; a raw
/// task that ended with an unaccepted status carries its document.
#[derive(Debug, Default)]
pub struct TaskResult {
    /// Response document, if one was received.
    pub document: Option<Document>,
    /// Error that ended the task, if any.
    pub exception: Option<GrabError>,
}

impl TaskResult {
    /// Result of a successful fetch.
    #[must_use]
    pub fn success(document: Document) -> Self {
        Self {
            document: Some(document),
            exception: None,
        }
    }

    /// Result of a failed fetch.
    #[must_use]
    pub fn failure(exception: GrabError) -> Self {
        Self {
            document: None,
            exception: Some(exception),
        }
    }

    /// Whether the task ended with an error.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exception.is_some()
    }
}

/// Why a non-raw task was given up.
#[derive(Debug)]
pub enum TaskFailure {
    /// The last network attempt failed.
    Network(GrabError),
    /// The last response had a status the task does not accept.
    InvalidStatus(Document),
}

impl TaskFailure {
    /// Counter key recorded for this failure, e.g. `error:read-timeout-error`.
    #[must_use]
    pub fn counter_key(&self) -> String {
        match self {
            Self::Network(error) => format!("error:{}", error.slug()),
            Self::InvalidStatus(document) => format!("error:http-{}", document.status_code),
        }
    }
}
