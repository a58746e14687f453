//! The cache-aware fetch engine.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use fetchcache_core::{
    CacheKey, FetchResult, Method, Origin, Payload, RawResponse, RequestIdentity, ResponseHeaders,
    Transport, TransportError, TransportRequest,
};
use fetchcache_fs::{CacheEntry, CacheStore, CookieJar, DeleteStatus, PurgeStats};
use tracing::{Instrument, debug, debug_span, warn};

use crate::concurrency::{ConcurrencyManager, ConcurrencyPermit, NoopConcurrencyManager};
use crate::config::FetchConfig;
use crate::error::{Diagnostic, FetchError};
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::url::TargetUrl;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Fetches URLs through a [`Transport`], caching responses on disk.
///
/// ```no_run
/// # async fn run(transport: impl fetchcache_core::Transport) -> Result<(), fetchcache::FetchError> {
/// use fetchcache::{FetchConfig, FetchEngine, Payload};
///
/// let engine = FetchEngine::new(FetchConfig::default(), transport)?;
///
/// let page = engine.get("http://example.test/a").await?;
/// println!("{} from {}", page.status, page.origin);
///
/// let form = Payload::new().field("q", "rust");
/// let posted = engine.post("http://example.test/search", &form).await?;
/// if !posted.is_success() {
///     eprintln!("search failed: {}", posted.error_code());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FetchEngine<T, C = NoopConcurrencyManager> {
    transport: T,
    config: FetchConfig,
    headers: Vec<(String, String)>,
    store: CacheStore,
    cookies: CookieJar,
    retry: RetryPolicy,
    concurrency: C,
}

impl<T> FetchEngine<T, NoopConcurrencyManager>
where
    T: Transport,
{
    /// Validates `config` and creates an engine without single flight.
    pub fn new(config: FetchConfig, transport: T) -> Result<Self, FetchError> {
        config.validate()?;
        let headers = config.header_pairs()?;
        Ok(Self {
            transport,
            headers,
            store: CacheStore::new(&config.cache_dir),
            cookies: CookieJar::new(&config.cache_dir),
            retry: RetryPolicy::new(config.max_retries, config.retry_delay),
            concurrency: NoopConcurrencyManager,
            config,
        })
    }
}

impl<T, C> FetchEngine<T, C> {
    /// Replaces the concurrency manager, e.g. with
    /// [`KeyedConcurrencyManager`](crate::KeyedConcurrencyManager) for
    /// in-process single flight.
    pub fn with_concurrency<C2>(self, concurrency: C2) -> FetchEngine<T, C2>
    where
        C2: ConcurrencyManager,
    {
        FetchEngine {
            transport: self.transport,
            config: self.config,
            headers: self.headers,
            store: self.store,
            cookies: self.cookies,
            retry: self.retry,
            concurrency,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Underlying cache store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Cache directory shared by responses and cookie jars.
    pub fn cache_dir(&self) -> &Path {
        self.store.dir()
    }
}

impl<T, C> FetchEngine<T, C>
where
    T: Transport,
    C: ConcurrencyManager,
{
    /// `GET url`, cache allowed.
    pub async fn get(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.fetch(url, Method::Get, &Payload::new(), false).await
    }

    /// `HEAD url`, cache allowed.
    pub async fn head(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.fetch(url, Method::Head, &Payload::new(), false).await
    }

    /// `POST url` with a form payload, cache allowed.
    pub async fn post(&self, url: &str, payload: &Payload) -> Result<FetchResult, FetchError> {
        self.fetch(url, Method::Post, payload, false).await
    }

    /// Like [`fetch`](Self::fetch) with the method given by name.
    ///
    /// Anything other than `GET`, `POST` or `HEAD` is
    /// [`FetchError::InvalidRequest`].
    pub async fn fetch_with_method(
        &self,
        url: &str,
        method: &str,
        payload: &Payload,
        bypass_cache: bool,
    ) -> Result<FetchResult, FetchError> {
        let method: Method = method.parse()?;
        self.fetch(url, method, payload, bypass_cache).await
    }

    /// Fetches `url`, serving a valid cache entry when there is one.
    ///
    /// `payload` is only sent, and only part of the cache key, for POST.
    /// With `bypass_cache` the lookup is skipped but a cacheable response
    /// still refreshes the entry.
    ///
    /// Transport failures are returned as a degraded result with
    /// [`FetchResult::error`] set, or as [`FetchError::Transport`] when the
    /// engine is strict.
    #[tracing::instrument(skip(self, payload))]
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        payload: &Payload,
        bypass_cache: bool,
    ) -> Result<FetchResult, FetchError> {
        let started = Instant::now();
        let result = self.fetch_inner(url, method, payload, bypass_cache, started).await?;
        metrics::record_fetch(&result, started.elapsed());
        Ok(result)
    }

    /// Removes expired response entries and cookie jars.
    pub async fn purge_expired(&self) -> Result<PurgeStats, FetchError> {
        Ok(self.store.purge_expired().await?)
    }

    /// Removes one response entry by bare file name.
    pub async fn delete_entry(&self, filename: &str) -> Result<DeleteStatus, FetchError> {
        Ok(self.store.delete_entry(filename).await?)
    }

    async fn fetch_inner(
        &self,
        url: &str,
        method: Method,
        payload: &Payload,
        bypass_cache: bool,
        started: Instant,
    ) -> Result<FetchResult, FetchError> {
        let target = TargetUrl::parse(url)?;
        if target.is_secure() {
            self.check_trust_anchor().await?;
        }

        if self.config.purge_on_request
            && let Err(error) = self.store.purge_expired().await
        {
            warn!(%error, "Purge before fetch failed");
        }

        let payload = if method.has_body() {
            payload.clone()
        } else {
            Payload::new()
        };
        let request_body = payload.encode();
        let user_agent = self.config.user_agent().to_string();
        let identity = RequestIdentity::new(method, target.as_str())
            .headers(self.config.headers.clone())
            .payload(payload)
            .user_agent(user_agent.clone());
        let key = CacheKey::derive(&identity);

        let policy = self.config.ttl_policy();
        let lookup_allowed = policy.caching_enabled() && !bypass_cache;

        if lookup_allowed && let Some(hit) = self.lookup(&key, started).await {
            return Ok(hit);
        }

        let _permit = if policy.caching_enabled() {
            self.concurrency.acquire(&key).await
        } else {
            ConcurrencyPermit::unrestricted()
        };
        if lookup_allowed
            && self.concurrency.serializes()
            && let Some(hit) = self.lookup(&key, started).await
        {
            return Ok(hit);
        }

        let cookie_file = self.cookie_file(&target).await;

        let mut headers = self.headers.clone();
        let body = if method.has_body() {
            headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
            Some(request_body.clone())
        } else {
            None
        };
        let request = TransportRequest {
            method,
            url: target.as_str().to_string(),
            headers,
            body,
            user_agent: user_agent.clone(),
            cookie_file: cookie_file.clone(),
        };

        let transport_started = Instant::now();
        let span = debug_span!("transport", url = target.as_str(), %key);
        let outcome = self
            .retry
            .run(|attempt| {
                let request = request.clone();
                let transport = &self.transport;
                async move {
                    let attempt_started = Instant::now();
                    debug!(attempt, "Calling transport");
                    transport.execute(request).await.map_err(|error| {
                        if error.elapsed.is_zero() {
                            error.with_elapsed(attempt_started.elapsed())
                        } else {
                            error
                        }
                    })
                }
            })
            .instrument(span)
            .await;
        metrics::record_retries(outcome.retries);
        let execution_time = transport_started.elapsed();

        let base = FetchResult {
            url: target.as_str().to_string(),
            method,
            request_body,
            user_agent,
            headers: ResponseHeaders::new(),
            body: Default::default(),
            status: 0,
            cache_file: None,
            execution_time,
            cookie_file,
            origin: Origin::New,
            error: None,
        };

        match outcome.result {
            Ok(response) => {
                let mut result = with_response(base, response);
                if result.status == 200 && policy.caching_enabled() {
                    let ttl = policy.resolve(&result.headers, Utc::now());
                    if ttl > 0 {
                        result.cache_file = self.persist(&key, &result, ttl).await;
                    } else {
                        debug!(%key, "Response not cacheable");
                    }
                }
                Ok(result)
            }
            Err(error) => self.transport_failure(base, error, outcome.retries, started),
        }
    }

    async fn check_trust_anchor(&self) -> Result<(), FetchError> {
        let Some(ca_file) = &self.config.ca_file else {
            return Err(FetchError::Configuration(
                "https requests require ca_file".into(),
            ));
        };
        match tokio::fs::metadata(ca_file).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            _ => Err(FetchError::Configuration(format!(
                "unable to read trust anchor file {}",
                ca_file.display()
            ))),
        }
    }

    async fn lookup(&self, key: &CacheKey, started: Instant) -> Option<FetchResult> {
        match self.store.lookup(key).await {
            Ok(Some((path, entry))) => {
                debug!(%key, path = %path.display(), "Cache hit");
                Some(entry.into_cached_result(path, started.elapsed()))
            }
            Ok(None) => {
                debug!(%key, "Cache miss");
                None
            }
            Err(error) => {
                warn!(%key, %error, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn cookie_file(&self, target: &TargetUrl) -> Option<PathBuf> {
        if !self.config.cookies_enabled {
            return None;
        }
        match self
            .cookies
            .path_for(target.host(), self.config.cookie_max_age)
            .await
        {
            Ok(path) => Some(path),
            Err(error) => {
                warn!(host = target.host(), %error, "Cookie jar unavailable");
                None
            }
        }
    }

    async fn persist(&self, key: &CacheKey, result: &FetchResult, ttl: u64) -> Option<PathBuf> {
        match self.store.store(key, &CacheEntry::from_result(result), ttl).await {
            Ok(path) => Some(path),
            Err(error) => {
                warn!(%key, %error, "Failed to store cache entry");
                metrics::record_store_error();
                None
            }
        }
    }

    fn transport_failure(
        &self,
        base: FetchResult,
        error: TransportError,
        retries: u32,
        started: Instant,
    ) -> Result<FetchResult, FetchError> {
        warn!(
            url = %base.url,
            code = error.kind.code(),
            retries,
            error = %error,
            "Transport failed"
        );

        if self.config.strict {
            return Err(FetchError::Transport(Diagnostic {
                kind: error.kind,
                message: error.message,
                url: base.url,
                retries,
                status: error.status,
                attempt_time: error.elapsed,
                total_time: started.elapsed(),
            }));
        }

        Ok(FetchResult {
            error: Some(error.kind),
            ..base
        })
    }
}

fn with_response(base: FetchResult, response: RawResponse) -> FetchResult {
    FetchResult {
        status: response.status,
        headers: response.headers.into_iter().collect(),
        body: response.body,
        ..base
    }
}

