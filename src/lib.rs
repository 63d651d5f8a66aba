//! Grabkit: a web-scraping toolkit.
//!
//! # Architecture
//!
//! - [`transport`] - turns a [`RequestConfig`] into one HTTP exchange and a
//!   [`Document`], with size and time limits on the body
//! - [`cookies`] - cookie store, Netscape cookie files and the bridge that
//!   moves cookies between configuration, requests and responses
//! - [`session`] - configuration and cookies kept across requests, redirect
//!   following
//! - [`spider`] - tasks, retries and the concurrent crawling engine
//! - [`error`] - the closed error taxonomy every operation reports in

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod document;
pub mod encoding;
pub mod error;
pub mod session;
pub mod spider;
pub mod transport;
pub mod upload;
pub mod user_agent;

// Re-export commonly used types
pub use config::{FormValue, MultipartPayload, PostPayload, ProxyType, RequestConfig};
pub use cookies::{Cookie, CookieStore};
pub use document::Document;
pub use error::{ErrorKind, GrabError};
pub use session::Session;
pub use spider::{Engine, EngineError, Spider, SpiderConfig, SpiderStats, Task, TaskResult};
pub use transport::{HttpTransport, RequestDescriptor, TransportConfig};
pub use upload::UploadItem;

// Note: errors are spelled out as `Result<T, GrabError>`; no crate-wide
// Result alias.
