use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, RANGE, USER_AGENT};
use reqwest::StatusCode;
use tokio::time::sleep;

use crate::error::{ClientError, Result};

/// `-A hostname=user:pass` credentials (spec §9 supplemented feature,
/// grounded in `clientcommand.c`'s `-A` option).
#[derive(Debug, Clone, Default)]
pub struct AuthTable {
    entries: HashMap<String, (String, String)>,
}

impl AuthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `-A` argument of the form `hostname=user:password`.
    pub fn insert_spec(&mut self, spec: &str) -> Result<()> {
        let (host, rest) = spec.split_once('=').ok_or_else(|| ClientError::ControlFileParseError {
            reason: format!("malformed -A argument: {spec}"),
        })?;
        let (user, pass) = rest.split_once(':').ok_or_else(|| ClientError::ControlFileParseError {
            reason: format!("malformed -A argument: {spec}"),
        })?;
        self.entries.insert(host.to_string(), (user.to_string(), pass.to_string()));
        Ok(())
    }

    fn lookup(&self, host: &str) -> Option<&(String, String)> {
        self.entries.get(host)
    }
}

#[derive(Debug, Clone)]
pub enum RangeBlock {
    Data { offset: u64, data: Vec<u8> },
    Eof,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpDriverError {
    #[error("range not supported by server (verified)")]
    RangeNotSupported,
    #[error("server ignored range and returned full content")]
    RangeIgnoredFull,
    #[error("http status error: {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

impl From<HttpDriverError> for ClientError {
    fn from(e: HttpDriverError) -> Self {
        ClientError::ControlFileUnavailable { location: e.to_string() }
    }
}

/// The HTTP capability a `RangeDownloader`/`FetchScheduler` is built on
/// (spec §6.2 `HttpCollaborator`). Modeled on `plugins/http/driver.rs`'s
/// retry/backoff shape, generalized from single-shot fetches to a
/// multi-range streaming handle.
#[async_trait]
pub trait HttpCollaborator: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
    async fn range_fetch_start(&self, url: &str) -> Result<Box<dyn RangeFetchHandle>>;
}

#[async_trait]
pub trait RangeFetchHandle: Send {
    /// Queue half-open `[start, end)` byte ranges for this fetch handle.
    async fn add_ranges(&mut self, ranges: &[(u64, u64)]) -> Result<()>;
    /// Pull the next block of received data, or `Eof` once every queued
    /// range has been delivered.
    async fn get_range_block(&mut self) -> Result<RangeBlock>;
    /// Bytes actually moved over the wire for this handle's lifetime.
    fn bytes_down(&self) -> u64;
}

/// `http_proxy`/`https_proxy`/`no_proxy` configuration (spec §6.5,
/// SPEC_FULL §9), threaded explicitly into the `reqwest::Client` builder
/// rather than relying on reqwest's own env-var sniffing.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

pub struct ReqwestHttpCollaborator {
    client: reqwest::Client,
    headers: HeaderMap,
    auth: AuthTable,
    timeout: Duration,
    retries: u32,
    retry_backoff_ms: u64,
}

impl ReqwestHttpCollaborator {
    pub fn new(
        user_agent: &str,
        extra_headers: &[(String, String)],
        auth: AuthTable,
        timeout: Duration,
        retries: u32,
        retry_backoff_ms: u64,
        proxy: ProxyConfig,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = &proxy.http_proxy {
            let mut p = reqwest::Proxy::http(url).map_err(HttpDriverError::from)?;
            if let Some(no_proxy) = &proxy.no_proxy {
                p = p.no_proxy(reqwest::NoProxy::from_string(no_proxy));
            }
            builder = builder.proxy(p);
        }
        if let Some(url) = &proxy.https_proxy {
            let mut p = reqwest::Proxy::https(url).map_err(HttpDriverError::from)?;
            if let Some(no_proxy) = &proxy.no_proxy {
                p = p.no_proxy(reqwest::NoProxy::from_string(no_proxy));
            }
            builder = builder.proxy(p);
        }

        let client = builder.build().map_err(HttpDriverError::from)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).map_err(HttpDriverError::from)?);
        for (k, v) in extra_headers {
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|_| ClientError::ControlFileParseError {
                reason: format!("invalid header name: {k}"),
            })?;
            let value = HeaderValue::from_str(v).map_err(HttpDriverError::from)?;
            headers.insert(name, value);
        }

        Ok(Self { client, headers, auth, timeout, retries, retry_backoff_ms })
    }

    fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
    }

    async fn sleep_backoff(&self, attempt: u32) {
        let base = self.retry_backoff_ms.max(1);
        let shift = attempt.min(16);
        let mul = 1u64 << shift;
        let ms = base.saturating_mul(mul).min(30_000);
        sleep(Duration::from_millis(ms)).await;
    }

    fn basic_auth_for(&self, url: &str) -> Option<(String, String)> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.auth.lookup(host).cloned()
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).headers(self.headers.clone()).timeout(self.timeout);
        if let Some((user, pass)) = self.basic_auth_for(url) {
            req = req.basic_auth(user, Some(pass));
        }
        req
    }
}

#[async_trait]
impl HttpCollaborator for ReqwestHttpCollaborator {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_err: Option<HttpDriverError> = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                self.sleep_backoff(attempt - 1).await;
            }
            let resp = match self.request(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            };
            if resp.status().is_success() {
                return Ok(resp.bytes().await.map_err(HttpDriverError::from)?.to_vec());
            }
            if Self::should_retry_status(resp.status()) {
                last_err = Some(HttpDriverError::Status(resp.status()));
                continue;
            }
            return Err(ClientError::ControlFileUnavailable {
                location: format!("{url}: {}", resp.status()),
            });
        }
        Err(last_err.unwrap_or(HttpDriverError::Status(StatusCode::REQUEST_TIMEOUT)).into())
    }

    async fn range_fetch_start(&self, url: &str) -> Result<Box<dyn RangeFetchHandle>> {
        let mut head_req = self.client.head(url).headers(self.headers.clone()).timeout(self.timeout);
        if let Some((user, pass)) = self.basic_auth_for(url) {
            head_req = head_req.basic_auth(user, Some(pass));
        }
        let accepts_ranges = {
            let head = head_req.send().await.map_err(HttpDriverError::from)?;
            let hint = head
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_ascii_lowercase().contains("bytes"))
                .unwrap_or(false);
            let _ = head.headers().get(CONTENT_LENGTH);
            hint
        };

        Ok(Box::new(ReqwestRangeFetchHandle {
            client: self.client.clone(),
            headers: self.headers.clone(),
            auth: self.basic_auth_for(url),
            url: url.to_string(),
            retries: self.retries,
            retry_backoff_ms: self.retry_backoff_ms,
            timeout: self.timeout,
            accepts_ranges,
            pending: VecDeque::new(),
            current: None,
            bytes_down: AtomicU64::new(0),
        }))
    }
}

struct ActiveRange {
    cursor: u64,
    end: u64,
    response: reqwest::Response,
}

struct ReqwestRangeFetchHandle {
    client: reqwest::Client,
    headers: HeaderMap,
    auth: Option<(String, String)>,
    url: String,
    retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
    accepts_ranges: bool,
    pending: VecDeque<(u64, u64)>,
    current: Option<ActiveRange>,
    bytes_down: AtomicU64,
}

impl ReqwestRangeFetchHandle {
    async fn sleep_backoff(&self, attempt: u32) {
        let base = self.retry_backoff_ms.max(1);
        let shift = attempt.min(16);
        let mul = 1u64 << shift;
        let ms = base.saturating_mul(mul).min(30_000);
        sleep(Duration::from_millis(ms)).await;
    }

    async fn open_next(&mut self) -> Result<bool> {
        let Some((start, end)) = self.pending.pop_front() else {
            return Ok(false);
        };
        if start >= end {
            return Box::pin(self.open_next()).await;
        }

        let range_value = if end == u64::MAX {
            format!("bytes={start}-")
        } else {
            format!("bytes={}-{}", start, end - 1)
        };
        let mut last_err: Option<HttpDriverError> = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                self.sleep_backoff(attempt - 1).await;
            }
            let mut req = self
                .client
                .get(&self.url)
                .headers(self.headers.clone())
                .timeout(self.timeout)
                .header(RANGE, range_value.clone());
            if let Some((user, pass)) = &self.auth {
                req = req.basic_auth(user, Some(pass));
            }
            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            };

            match resp.status() {
                StatusCode::PARTIAL_CONTENT => {
                    self.current = Some(ActiveRange { cursor: start, end, response: resp });
                    return Ok(true);
                }
                StatusCode::OK if start == 0 => {
                    // Server ignored Range and is sending the whole body;
                    // still usable since we asked for the leading span.
                    self.current = Some(ActiveRange { cursor: start, end, response: resp });
                    return Ok(true);
                }
                s if ReqwestHttpCollaborator::should_retry_status(s) => {
                    last_err = Some(HttpDriverError::Status(s));
                    continue;
                }
                StatusCode::RANGE_NOT_SATISFIABLE => return Err(HttpDriverError::RangeNotSupported.into()),
                s => return Err(ClientError::ControlFileUnavailable { location: format!("{}: {}", self.url, s) }),
            }
        }
        Err(last_err.unwrap_or(HttpDriverError::Status(StatusCode::REQUEST_TIMEOUT)).into())
    }
}

#[async_trait]
impl RangeFetchHandle for ReqwestRangeFetchHandle {
    async fn add_ranges(&mut self, ranges: &[(u64, u64)]) -> Result<()> {
        for &r in ranges {
            self.pending.push_back(r);
        }
        Ok(())
    }

    async fn get_range_block(&mut self) -> Result<RangeBlock> {
        loop {
            if self.current.is_none() {
                if !self.open_next().await? {
                    return Ok(RangeBlock::Eof);
                }
            }
            let active = self.current.as_mut().expect("just opened");
            match active.response.chunk().await.map_err(HttpDriverError::from)? {
                Some(bytes) => {
                    let offset = active.cursor;
                    let n = bytes.len() as u64;
                    active.cursor += n;
                    self.bytes_down.fetch_add(n, Ordering::Relaxed);
                    let done = active.cursor >= active.end;
                    let data = bytes.to_vec();
                    if done {
                        self.current = None;
                    }
                    return Ok(RangeBlock::Data { offset, data });
                }
                None => {
                    self.current = None;
                }
            }
        }
    }

    fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }
}
