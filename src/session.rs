//! A browsing session: configuration, cookies and redirect following.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::RequestConfig;
use crate::cookies::CookieStore;
use crate::document::Document;
use crate::error::GrabError;
use crate::transport::HttpTransport;
use crate::transport::error_mapping::names;
use crate::user_agent::{generate_user_agent, user_agent_from_file};

/// Keeps configuration and cookies across requests over a shared transport.
///
/// The first User-Agent picked for the session is pinned into its
/// configuration, so every later request sends the same one.
#[derive(Debug)]
pub struct Session {
    transport: Arc<HttpTransport>,
    config: RequestConfig,
    cookies: CookieStore,
}

impl Session {
    /// Creates a session with its own transport and default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Misuse`] if the transport cannot be built.
    pub fn new() -> Result<Self, GrabError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?)))
    }

    /// Creates a session over a shared transport.
    #[must_use]
    pub fn with_transport(transport: Arc<HttpTransport>) -> Self {
        Self::with_config(transport, RequestConfig::default())
    }

    /// Creates a session over a shared transport with a base configuration.
    #[must_use]
    pub fn with_config(transport: Arc<HttpTransport>, config: RequestConfig) -> Self {
        Self {
            transport,
            config,
            cookies: CookieStore::new(),
        }
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Mutable session configuration.
    pub fn config_mut(&mut self) -> &mut RequestConfig {
        &mut self.config
    }

    /// Cookies collected so far.
    #[must_use]
    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    /// Mutable cookie store.
    pub fn cookies_mut(&mut self) -> &mut CookieStore {
        &mut self.cookies
    }

    /// Fetches `url` with the session configuration.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn go(&mut self, url: &str) -> Result<Document, GrabError> {
        self.config.url = Some(url.to_string());
        self.request().await
    }

    /// Runs the configured request, following redirects when enabled.
    ///
    /// 301, 302 and 303 switch a non-HEAD request to a body-less GET. Every
    /// hop gets a fresh descriptor; bodies of intermediate hops are dropped.
    ///
    /// # Errors
    ///
    /// Any transport error, or [`GrabError::InvalidResponse`] named
    /// `TooManyRedirects` once `redirect_limit` hops were followed.
    #[instrument(skip(self), fields(url = self.config.url.as_deref().unwrap_or_default()))]
    pub async fn request(&mut self) -> Result<Document, GrabError> {
        self.pin_user_agent()?;
        let mut config = self.config.clone();
        let mut hops = 0_u32;

        loop {
            let document = self.transport.request(&config, &mut self.cookies).await?;
            self.cookies.update(&document.cookies);

            if !(config.follow_location && document.is_redirect()) {
                return Ok(document);
            }
            if hops >= config.redirect_limit {
                return Err(GrabError::invalid_response(
                    names::TOO_MANY_REDIRECTS,
                    format!("more than {} redirects, last target {}", config.redirect_limit, document.url),
                    None,
                ));
            }
            hops += 1;
            debug!(hop = hops, status = document.status_code, target = %document.url, "following redirect");

            if let Some(path) = &document.body_path {
                if let Err(e) = std::fs::remove_file(path) {
                    debug!(path = %path.display(), error = %e, "could not remove redirect body file");
                }
            }
            if matches!(document.status_code, 301..=303)
                && !config
                    .detect_request_method()
                    .eq_ignore_ascii_case("HEAD")
            {
                config.method = Some("GET".to_string());
                config.post = None;
                config.multipart_post = None;
            }
            config.url = Some(document.url.to_string());
        }
    }

    fn pin_user_agent(&mut self) -> Result<(), GrabError> {
        if self.config.user_agent.is_none() {
            let user_agent = match &self.config.user_agent_file {
                Some(path) => user_agent_from_file(path)?,
                None => generate_user_agent(),
            };
            self.config.user_agent = Some(user_agent);
        }
        Ok(())
    }
}
