use std::time::Instant;

use async_trait::async_trait;
use fetchcache::{FetchConfig, FetchError};
use fetchcache_core::{
    Method, RawResponse, Transport, TransportError, TransportErrorKind, TransportRequest,
};
use reqwest::cookie::CookieStore;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, StatusCode, Url};
use tracing::{debug, trace, warn};

use crate::classify::transport_error;
use crate::cookies::{self, StoredCookie};

/// [`Transport`] backed by a [`reqwest::Client`].
///
/// Client-wide options come from the [`FetchConfig`] the transport is built
/// from: timeouts, redirect limit, trust anchors, HTTP/1.1 only and
/// connection reuse. Compressed bodies are decoded transparently.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    max_redirects: u32,
}

impl ReqwestTransport {
    /// Builds the client for `config`.
    ///
    /// When `ca_file` is set, only the certificates in that PEM bundle are
    /// trusted.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout())
            .gzip(true)
            .deflate(true)
            .brotli(true);
        if config.http1_only {
            builder = builder.http1_only();
        }
        if config.forbid_reuse {
            builder = builder.pool_max_idle_per_host(0);
        }
        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                FetchError::Configuration(format!(
                    "unable to read trust anchor file {}: {e}",
                    ca_file.display()
                ))
            })?;
            let certificates = Certificate::from_pem_bundle(&pem).map_err(|e| {
                FetchError::Configuration(format!(
                    "invalid trust anchor file {}: {e}",
                    ca_file.display()
                ))
            })?;
            builder = builder.tls_built_in_root_certs(false);
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Configuration(format!("unable to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config.max_redirects))
    }

    /// Wraps an existing client. It should not follow redirects itself.
    pub fn with_client(client: Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    async fn exchange(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let mut url = Url::parse(&request.url).map_err(|e| {
            TransportError::new(TransportErrorKind::Request, format!("invalid URL: {e}"))
        })?;
        let jar = match &request.cookie_file {
            Some(path) => Some(cookies::load(path, cookies::now()).await),
            None => None,
        };
        let mut method = request.method;
        let mut body = request.body;
        let mut redirects = 0;

        loop {
            let mut builder = self
                .client
                .request(http_method(method), url.clone())
                .header(USER_AGENT, &request.user_agent);
            for (name, value) in &request.headers {
                if body.is_none() && name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                    continue;
                }
                builder = builder.header(name, value);
            }
            if let Some(jar) = &jar
                && let Some(cookie) = jar.cookies(&url)
            {
                builder = builder.header(COOKIE, cookie);
            }
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            trace!(%method, %url, redirects, "Sending request");
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();

            if let (Some(jar), Some(path)) = (&jar, &request.cookie_file) {
                let now = cookies::now();
                let received: Vec<StoredCookie> = response
                    .cookies()
                    .map(|cookie| StoredCookie::received(&cookie, &url, now))
                    .collect();
                if !received.is_empty() {
                    for cookie in &received {
                        cookie.apply(jar, now);
                    }
                    if let Err(error) = cookies::persist(path, &received, now).await {
                        warn!(path = %path.display(), %error, "Failed to persist cookies");
                    }
                }
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok());
            if let Some(location) = location
                && status.is_redirection()
                && self.max_redirects > 0
            {
                if redirects >= self.max_redirects {
                    return Err(TransportError::new(
                        TransportErrorKind::TooManyRedirects,
                        format!("more than {} redirects", self.max_redirects),
                    )
                    .with_status(status.as_u16()));
                }
                let next = url.join(location).map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Request,
                        format!("invalid redirect location {location:?}: {e}"),
                    )
                })?;
                if rewrites_to_get(status, method) {
                    method = Method::Get;
                    body = None;
                }
                debug!(from = %url, to = %next, status = status.as_u16(), "Following redirect");
                redirects += 1;
                url = next;
                continue;
            }

            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|error| transport_error(error).with_status(status.as_u16()))?;
            return Ok(RawResponse {
                status: status.as_u16(),
                headers,
                body,
            });
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let started = Instant::now();
        self.exchange(request)
            .await
            .map_err(|error| error.with_elapsed(started.elapsed()))
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Head => reqwest::Method::HEAD,
    }
}

// 303 always switches to GET; 301 and 302 do so for POST, as browsers do.
fn rewrites_to_get(status: StatusCode, method: Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => method != Method::Head,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => method == Method::Post,
        _ => false,
    }
}
