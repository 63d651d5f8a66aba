//! HTTP transport: request descriptors, network execution and response
//! materialization.
//!
//! # Example
//!
//! ```no_run
//! use grabkit::config::RequestConfig;
//! use grabkit::cookies::CookieStore;
//! use grabkit::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), grabkit::GrabError> {
//! let transport = HttpTransport::new()?;
//! let mut cookies = CookieStore::new();
//! let config = RequestConfig::with_url("https://example.com/");
//! let document = transport.request(&config, &mut cookies).await?;
//! println!("{} {}", document.status_code, document.url);
//! # Ok(())
//! # }
//! ```

pub mod body;
mod client;
pub mod error_mapping;
pub mod multipart;
mod request;

pub use client::{HttpTransport, RawResponse, TransportConfig, TransportKind};
pub use request::{
    BodyLimits, HeaderList, ProxySettings, RequestDescriptor, ResponseSink, Timeouts,
    normalize_url,
};
