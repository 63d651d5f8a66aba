//! HTTP transport over `reqwest`.
//!
//! [`HttpTransport`] turns a [`RequestConfig`] into a [`RequestDescriptor`],
//! executes it and materializes the response into a [`Document`]. It keeps
//! one long-lived connection pool for the default timeouts, caches pools for
//! other timeout pairs and builds a fresh pool for every proxied request.
//! Redirects and retries are never handled here.

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Proxy};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::body::read_limited;
use super::error_mapping::{map_reqwest_error, names};
use super::multipart::{EncodedBody, encode_multipart_payload, encode_post_payload};
use super::request::{
    BodyLimits, HeaderList, ProxySettings, RequestDescriptor, ResponseSink, Timeouts,
    normalize_url, validate_http_url,
};
use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, RequestConfig};
use crate::cookies::{CookieStore, ResponseView, extract_cookies, process_cookie_options};
use crate::document::Document;
use crate::encoding::decode_utf8_ignore;
use crate::error::GrabError;
use crate::user_agent::{generate_user_agent, user_agent_from_file};

/// Statuses whose `Location` header defines the final URL.
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Prefix of generated body file names.
const BODY_FILE_PREFIX: &str = "grab-";

/// Network backends the transport can drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// `reqwest` over hyper with rustls.
    #[default]
    Reqwest,
}

/// Process-scoped transport settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Backend.
    pub kind: TransportKind,
    /// Connect timeout of the default pool.
    pub connect_timeout: Duration,
    /// Per-chunk read timeout of the default pool.
    pub read_timeout: Option<Duration>,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// How long idle connections are kept.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Reqwest,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Some(DEFAULT_TIMEOUT),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

type PoolKey = (Duration, Option<Duration>);

/// Network result awaiting materialization.
///
/// Holds the live response; dropping it releases the connection.
#[derive(Debug)]
pub struct RawResponse {
    response: reqwest::Response,
    started: Instant,
}

impl RawResponse {
    /// Status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }
}

/// Transport shared by every request of a process.
#[derive(Debug)]
pub struct HttpTransport {
    config: TransportConfig,
    default_pool: Client,
    pools: DashMap<PoolKey, Client>,
}

impl HttpTransport {
    /// Creates a transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Misuse`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, GrabError> {
        Self::with_config(TransportConfig::default())
    }

    /// Creates a transport with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::Misuse`] if the HTTP client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_config(config: TransportConfig) -> Result<Self, GrabError> {
        let default_pool = build_pool(&config, config.connect_timeout, config.read_timeout, None)?;
        Ok(Self {
            config,
            default_pool,
            pools: DashMap::new(),
        })
    }

    /// Settings the transport was built with.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Builds the request descriptor for `config`.
    ///
    /// Cookies from the configuration are merged into `cookies`, and the
    /// matching `Cookie` header is set. When the body goes to disk the output
    /// file is created here, after every other check has passed.
    ///
    /// # Errors
    ///
    /// - [`GrabError::InvalidUrl`] for a malformed URL.
    /// - [`GrabError::Misuse`] for a POST/PUT without payload, a text
    ///   multipart payload, unencodable text or a missing storage directory.
    /// - [`GrabError::Io`] when an upload, User-Agent file or body file fails.
    #[instrument(level = "debug", skip(self, config, cookies), fields(url = config.url.as_deref().unwrap_or_default()))]
    pub fn process_config(
        &self,
        config: &RequestConfig,
        cookies: &mut CookieStore,
    ) -> Result<RequestDescriptor, GrabError> {
        let raw_url = config
            .url
            .as_deref()
            .ok_or_else(|| GrabError::misuse("option url is not set"))?;
        let url = normalize_url(raw_url)?;

        let method = config.detect_request_method();
        if matches!(method.as_str(), "POST" | "PUT")
            && config.post.is_none()
            && config.multipart_post.is_none()
        {
            return Err(GrabError::misuse(format!(
                "neither post nor multipart_post was specified for the {method} request"
            )));
        }

        let mut headers = HeaderList::new();
        let encoded = match (&config.multipart_post, &config.post) {
            (Some(multipart), _) => Some(encode_multipart_payload(multipart, &config.charset)?),
            (None, Some(post)) => Some(encode_post_payload(post, &config.charset)?),
            (None, None) => None,
        };
        let body = encoded.map(|EncodedBody { bytes, content_type }| {
            if let Some(content_type) = content_type {
                headers.insert("Content-Type", content_type);
            }
            headers.insert("Content-Length", bytes.len().to_string());
            bytes
        });

        let user_agent = match (&config.user_agent, &config.user_agent_file) {
            (Some(user_agent), _) => user_agent.clone(),
            (None, Some(path)) => user_agent_from_file(path)?,
            (None, None) => generate_user_agent(),
        };
        headers.insert("User-Agent", user_agent);
        headers.extend(&config.common_headers);
        headers.extend(&config.headers);

        let proxy = config
            .proxy
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(|address| ProxySettings {
                address: address.to_string(),
                credentials: config.proxy_userpwd.clone(),
                scheme: config.proxy_type.unwrap_or_default(),
            });

        let response_sink = if config.body_inmemory {
            ResponseSink::InMemory
        } else {
            open_body_file(config)?
        };

        let mut descriptor = RequestDescriptor {
            method,
            url,
            body,
            headers,
            proxy,
            timeouts: Timeouts {
                connect: config.connect_timeout,
                read: config.effective_read_timeout(),
                total: config.timeout,
            },
            body_limits: BodyLimits {
                max_bytes: config.body_maxsize,
                no_body: config.nobody,
            },
            response_sink,
            document_charset: config.document_charset.clone(),
        };
        process_cookie_options(config, cookies, &mut descriptor);
        Ok(descriptor)
    }

    /// Sends the request and waits for the response headers.
    ///
    /// # Errors
    ///
    /// Network faults are mapped to [`GrabError::Timeout`],
    /// [`GrabError::Connection`] or [`GrabError::InvalidUrl`]; invalid
    /// methods, headers or proxies are [`GrabError::Misuse`].
    #[instrument(skip(self, descriptor), fields(method = %descriptor.method, url = %descriptor.url))]
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<RawResponse, GrabError> {
        let client = self.select_pool(descriptor)?;
        let method = Method::from_bytes(descriptor.method.as_bytes())
            .map_err(|_| GrabError::misuse(format!("invalid method: {}", descriptor.method)))?;
        let headers = build_header_map(&descriptor.headers)?;

        let mut request = client
            .request(method, descriptor.url.clone())
            .headers(headers);
        if let Some(body) = &descriptor.body {
            request = request.body(body.clone());
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, descriptor.url.as_str()))?;
        debug!(status = response.status().as_u16(), "response headers received");
        Ok(RawResponse { response, started })
    }

    /// Reads the body and assembles the document.
    ///
    /// Returns `Ok(None)` without a network result. The connection is
    /// released on every path, and a body file is removed if anything fails.
    ///
    /// # Errors
    ///
    /// - [`GrabError::InvalidResponse`] for an unparsable redirect location.
    /// - [`GrabError::Timeout`] or [`GrabError::Connection`] while streaming.
    /// - [`GrabError::Io`] when the body file cannot be written.
    #[instrument(skip(self, raw, descriptor), fields(url = %descriptor.url))]
    pub async fn materialize_response(
        &self,
        raw: Option<RawResponse>,
        descriptor: RequestDescriptor,
    ) -> Result<Option<Document>, GrabError> {
        let Some(RawResponse { response, started }) = raw else {
            descriptor.discard();
            return Ok(None);
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cookies = extract_cookies(Some(&headers as &dyn ResponseView), &descriptor);
        let RequestDescriptor {
            url,
            timeouts,
            body_limits,
            response_sink,
            document_charset,
            ..
        } = descriptor;

        let final_url = match resolve_final_url(status, &headers, &url) {
            Ok(final_url) => final_url,
            Err(e) => {
                drop(response);
                response_sink.discard();
                return Err(e);
            }
        };

        let deadline = timeouts.total.map(|total| started + total);
        let mut reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        let read_result = read_limited(&mut reader, body_limits, deadline, url.as_str()).await;
        drop(reader);
        let data = match read_result {
            Ok(data) => data,
            Err(e) => {
                response_sink.discard();
                return Err(e);
            }
        };

        let received = data.len();
        let mut document = Document::new(final_url);
        document.status_code = status;
        document.head = build_header_block(&headers);
        document.cookies = cookies;
        match response_sink {
            ResponseSink::InMemory => document.set_body(data)?,
            ResponseSink::FileAt { path, file } => {
                write_body_file(file, &path, &data).await?;
                document.body_path = Some(path);
            }
        }
        document.parse(document_charset.as_deref(), header_pairs(&headers));

        info!(status, url = %document.url, bytes = received, "response materialized");
        Ok(Some(document))
    }

    /// Runs one request: prepare, execute and materialize.
    ///
    /// # Errors
    ///
    /// Any error of [`process_config`](Self::process_config),
    /// [`execute`](Self::execute) or
    /// [`materialize_response`](Self::materialize_response).
    pub async fn request(
        &self,
        config: &RequestConfig,
        cookies: &mut CookieStore,
    ) -> Result<Document, GrabError> {
        let descriptor = self.process_config(config, cookies)?;
        let raw = match self.execute(&descriptor).await {
            Ok(raw) => raw,
            Err(e) => {
                descriptor.discard();
                return Err(e);
            }
        };
        let url = descriptor.url.to_string();
        self.materialize_response(Some(raw), descriptor)
            .await?
            .ok_or_else(|| GrabError::invalid_response(names::PROTOCOL, format!("no response from {url}"), None))
    }

    fn select_pool(&self, descriptor: &RequestDescriptor) -> Result<Client, GrabError> {
        let Timeouts { connect, read, .. } = descriptor.timeouts;
        if let Some(proxy) = &descriptor.proxy {
            debug!(proxy = %proxy.url(), "building proxy pool");
            return build_pool(&self.config, connect, read, Some(proxy));
        }
        if (connect, read) == (self.config.connect_timeout, self.config.read_timeout) {
            return Ok(self.default_pool.clone());
        }
        if let Some(pool) = self.pools.get(&(connect, read)) {
            return Ok(pool.clone());
        }
        let pool = build_pool(&self.config, connect, read, None)?;
        self.pools.insert((connect, read), pool.clone());
        Ok(pool)
    }
}

fn build_pool(
    config: &TransportConfig,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    proxy: Option<&ProxySettings>,
) -> Result<Client, GrabError> {
    let mut builder = Client::builder()
        .redirect(Policy::none())
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .retry(reqwest::retry::never())
        .gzip(true);
    if let Some(read_timeout) = read_timeout {
        builder = builder.read_timeout(read_timeout);
    }
    builder = match proxy {
        Some(proxy) => builder.proxy(build_proxy(proxy)?),
        None => builder.no_proxy(),
    };
    builder
        .build()
        .map_err(|e| GrabError::misuse(format!("failed to build HTTP client: {e}")))
}

fn build_proxy(settings: &ProxySettings) -> Result<Proxy, GrabError> {
    let invalid = |e: reqwest::Error| {
        GrabError::misuse(format!("invalid proxy {}: {e}", settings.url()))
    };
    match (settings.scheme, settings.user_password()) {
        (crate::config::ProxyType::Socks5, Some((user, password))) => Proxy::all(format!(
            "socks5://{}:{}@{}",
            urlencoding::encode(user),
            urlencoding::encode(password),
            settings.address
        ))
        .map_err(invalid),
        (_, Some((user, password))) => Ok(Proxy::all(settings.url())
            .map_err(invalid)?
            .basic_auth(user, password)),
        (_, None) => Proxy::all(settings.url()).map_err(invalid),
    }
}

fn build_header_map(headers: &HeaderList) -> Result<HeaderMap, GrabError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GrabError::misuse(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| GrabError::misuse(format!("invalid value for header {name}: {e}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn open_body_file(config: &RequestConfig) -> Result<ResponseSink, GrabError> {
    let dir = config
        .body_storage_dir
        .as_deref()
        .ok_or_else(|| GrabError::misuse("option body_storage_dir is not defined"))?;
    if config.body_storage_create_dir {
        std::fs::create_dir_all(dir).map_err(|e| GrabError::io(dir, e))?;
    }
    match &config.body_storage_filename {
        Some(filename) => {
            let path = dir.join(filename);
            let file = std::fs::File::create(&path).map_err(|e| GrabError::io(path.clone(), e))?;
            Ok(ResponseSink::FileAt { path, file })
        }
        None => {
            let (file, path) = tempfile::Builder::new()
                .prefix(BODY_FILE_PREFIX)
                .tempfile_in(dir)
                .map_err(|e| GrabError::io(dir, e))?
                .keep()
                .map_err(|e| GrabError::io(dir, e.error))?;
            Ok(ResponseSink::FileAt { path, file })
        }
    }
}

async fn write_body_file(file: std::fs::File, path: &Path, data: &[u8]) -> Result<(), GrabError> {
    let mut file = tokio::fs::File::from_std(file);
    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;
    drop(file);
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "removing body file after failed write");
        let _ = tokio::fs::remove_file(path).await;
        return Err(GrabError::io(path, e));
    }
    Ok(())
}

/// Target of a redirect response, else the request URL.
fn resolve_final_url(status: u16, headers: &HeaderMap, request_url: &Url) -> Result<Url, GrabError> {
    if !REDIRECT_STATUSES.contains(&status) {
        return Ok(request_url.clone());
    }
    let Some(location) = headers.get(LOCATION) else {
        return Ok(request_url.clone());
    };
    let location = decode_utf8_ignore(location.as_bytes());
    let target = request_url.join(location.trim()).map_err(|e| {
        GrabError::invalid_response(
            names::LOCATION_PARSE,
            format!("cannot parse redirect location {location:?}: {e}"),
            Some(Box::new(e)),
        )
    })?;
    validate_http_url(&target).map_err(|reason| {
        GrabError::invalid_response(
            names::LOCATION_PARSE,
            format!("invalid redirect location {location:?}: {reason}"),
            None,
        )
    })?;
    Ok(target)
}

/// Canonical `Key: Value` header name casing.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                canonical_header_name(name.as_str()),
                decode_utf8_ignore(value.as_bytes()),
            )
        })
        .collect()
}

/// Rebuilds the raw header block from the received headers.
fn build_header_block(headers: &HeaderMap) -> Vec<u8> {
    let mut head = String::new();
    for (name, value) in header_pairs(headers) {
        head.push_str(&name);
        head.push_str(": ");
        head.push_str(&value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head.into_bytes()
}
